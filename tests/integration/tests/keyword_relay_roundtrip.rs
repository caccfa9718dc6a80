use chrono::{DateTime, Duration, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;
use watchpost_ledger::WatchLedger;
use watchpost_relay::{SlackRelayClient, SlackRelayTarget};
use watchpost_runtime::{run_once, KeywordFilter, RunConfig};
use watchpost_source::snowflake::DISCORD_EPOCH_MS;
use watchpost_source::{DiscordApiClient, DiscordApiConfig};

fn run_started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0)
        .single()
        .expect("fixed run time")
}

fn snowflake_at(at: DateTime<Utc>, sequence: u64) -> String {
    let ms = at.timestamp_millis() as u64 - DISCORD_EPOCH_MS;
    ((ms << 22) | sequence).to_string()
}

fn discord_client(base_url: String) -> DiscordApiClient {
    DiscordApiClient::new(DiscordApiConfig {
        api_base: base_url,
        token: "discord-token".to_string(),
        request_timeout_ms: 5_000,
        retry_max_attempts: 2,
        retry_base_delay_ms: 1,
    })
    .expect("discord client")
}

fn slack_client(base_url: String) -> SlackRelayClient {
    SlackRelayClient::new(SlackRelayTarget::WebApi {
        api_base: base_url,
        bot_token: "xoxb-test".to_string(),
        channel_id: "CNOTIFY".to_string(),
    })
    .expect("slack client")
}

fn run_config(ledger_path: std::path::PathBuf) -> RunConfig {
    let mut config = RunConfig::new(
        ledger_path,
        vec!["G1".to_string()],
        KeywordFilter::new(vec!["payment".to_string()], vec![], vec![], vec![]),
    );
    config.scan.channel_batch_delay = std::time::Duration::ZERO;
    config.watch.entry_delay = std::time::Duration::ZERO;
    config
}

#[tokio::test]
async fn integration_payment_match_is_relayed_threaded_and_tracked_across_runs() {
    let discord = MockServer::start();
    let slack = MockServer::start();
    let message_id = snowflake_at(run_started_at() - Duration::hours(1), 1);
    let reply_id = snowflake_at(run_started_at() - Duration::minutes(20), 2);

    discord.mock(|when, then| {
        when.method(GET)
            .path("/guilds/G1")
            .header("authorization", "Bot discord-token");
        then.status(200).json_body(json!({"id": "G1", "name": "Ops"}));
    });
    discord.mock(|when, then| {
        when.method(GET).path("/guilds/G1/channels");
        then.status(200).json_body(json!([
            {"id": "C-secret", "name": "leadership", "type": 0},
            {"id": "C1", "name": "billing", "type": 0}
        ]));
    });
    discord.mock(|when, then| {
        when.method(GET).path("/channels/C-secret/messages");
        then.status(403)
            .json_body(json!({"message": "Missing Access", "code": 50001}));
    });
    let watched = json!({
        "id": message_id.as_str(),
        "channel_id": "C1",
        "content": "please send payment by Friday",
        "author": {"id": "U1", "username": "alice", "global_name": "Alice"},
        "reactions": [{"count": 1, "emoji": {"id": "42", "name": "ack"}}]
    });
    let page = json!([
        {
            "id": reply_id.as_str(),
            "channel_id": "C1",
            "content": "done, sent this morning",
            "author": {"id": "U2", "username": "bob"},
            "message_reference": {"message_id": message_id.as_str(), "channel_id": "C1"}
        },
        watched.clone()
    ]);
    let page_mock = discord.mock(|when, then| {
        when.method(GET)
            .path("/channels/C1/messages")
            .query_param("limit", "100");
        then.status(200).json_body(page.clone());
    });
    discord.mock(|when, then| {
        when.method(GET)
            .path(format!("/channels/C1/messages/{message_id}"));
        then.status(200).json_body(watched.clone());
    });
    discord.mock(|when, then| {
        when.method(GET)
            .path(format!("/channels/C1/messages/{message_id}/reactions/ack:42"));
        then.status(200)
            .json_body(json!([{"id": "U3", "username": "carol"}]));
    });

    let match_post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .header("authorization", "Bearer xoxb-test")
            .body_includes("Keyword match");
        then.status(200)
            .json_body(json!({"ok": true, "ts": "1746100800.000100"}));
    });
    let follow_up_post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"thread_ts\":\"1746100800.000100\"");
        then.status(200)
            .json_body(json!({"ok": true, "ts": "1746100801.000200"}));
    });
    let summary_post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("watchpost run:");
        then.status(200)
            .json_body(json!({"ok": true, "ts": "1746100802.000300"}));
    });

    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("state").join("ledger.json");
    let config = run_config(ledger_path.clone());
    let source = discord_client(discord.base_url());
    let relay = slack_client(slack.base_url());

    let first = run_once(&source, &relay, &config, run_started_at()).await;
    assert_eq!(first.servers_scanned, 1);
    assert_eq!(first.channels_scanned, 1);
    assert_eq!(first.channels_skipped, 1);
    assert_eq!(first.messages_examined, 2);
    assert_eq!(first.matches_found, 1);
    assert_eq!(first.notifications_sent, 1);
    assert_eq!(first.reactions_relayed, 1);
    assert_eq!(first.replies_relayed, 1);
    assert!(first.errors.is_empty(), "errors: {:?}", first.errors);
    match_post.assert_calls(1);
    follow_up_post.assert_calls(2);
    summary_post.assert_calls(1);

    let ledger = WatchLedger::load(ledger_path.clone());
    let entry = ledger.get(&message_id, "C1").expect("tracked entry");
    assert_eq!(
        entry.notification_thread_ref.as_deref(),
        Some("1746100800.000100")
    );
    assert!(entry.has_notified_reaction("U3", "ack:42"));
    assert!(entry.has_notified_reply(&reply_id));
    assert_eq!(entry.author_name.as_deref(), Some("Alice"));

    let later = run_started_at() + Duration::minutes(30);
    let second = run_once(&source, &relay, &config, later).await;
    assert_eq!(second.matches_found, 1);
    assert_eq!(second.already_tracked, 1);
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(second.reactions_relayed + second.replies_relayed, 0);
    match_post.assert_calls(1);
    follow_up_post.assert_calls(2);
    summary_post.assert_calls(2);
    // Scan and watcher each read the page once per run.
    page_mock.assert_calls(4);

    let raw = std::fs::read_to_string(&ledger_path).expect("ledger file");
    let document: Value = serde_json::from_str(&raw).expect("ledger json");
    assert_eq!(document["schema_version"], 1);
    assert_eq!(document["entries"].as_array().map(Vec::len), Some(1));
    let last_checked = document["entries"][0]["last_checked_at"]
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|value| value.with_timezone(&Utc));
    assert_eq!(last_checked, Some(later));
}

#[tokio::test]
async fn integration_entries_past_retention_are_pruned_without_remote_calls() {
    let discord = MockServer::start();
    let slack = MockServer::start();
    discord.mock(|when, then| {
        when.method(GET).path("/guilds/G1");
        then.status(200).json_body(json!({"id": "G1", "name": "Ops"}));
    });
    discord.mock(|when, then| {
        when.method(GET).path("/guilds/G1/channels");
        then.status(200).json_body(json!([]));
    });
    let stale_lookup = discord.mock(|when, then| {
        when.method(GET).path("/channels/C-old/messages/M-old");
        then.status(200).json_body(json!({}));
    });
    let any_post = slack.mock(|when, then| {
        when.method(POST).path("/chat.postMessage");
        then.status(200).json_body(json!({"ok": true, "ts": "1.0"}));
    });

    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("ledger.json");
    let mut seeded = WatchLedger::empty(ledger_path.clone());
    seeded.upsert(watchpost_ledger::WatchEntry::new(
        "M-old",
        "C-old",
        "G1",
        Some("0.1".to_string()),
        run_started_at() - Duration::hours(72) - Duration::seconds(1),
    ));
    seeded.save().expect("seed ledger");

    let summary = run_once(
        &discord_client(discord.base_url()),
        &slack_client(slack.base_url()),
        &run_config(ledger_path.clone()),
        run_started_at(),
    )
    .await;

    assert_eq!(summary.entries_pruned, 1);
    assert_eq!(summary.entries_tracked, 0);
    assert_eq!(summary.messages_examined, 0);
    stale_lookup.assert_calls(0);
    any_post.assert_calls(0);
    assert!(WatchLedger::load(ledger_path).is_empty());
}
