#![no_main]

use libfuzzer_sys::fuzz_target;
use watchpost_source::{decode_snowflake_unix_ms, SourceMessage};

fuzz_target!(|data: &[u8]| {
    let Ok(messages) = serde_json::from_slice::<Vec<SourceMessage>>(data) else {
        return;
    };
    for message in &messages {
        if let Some(ms) = decode_snowflake_unix_ms(&message.id) {
            assert!(ms >= watchpost_source::snowflake::DISCORD_EPOCH_MS);
        }
        for reaction in &message.reactions {
            let _ = reaction.emoji.key();
        }
        let _ = message.is_reply_to(&message.id);
    }
});
