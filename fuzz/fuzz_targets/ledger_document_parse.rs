#![no_main]

use libfuzzer_sys::fuzz_target;
use watchpost_ledger::{parse_ledger_document, render_ledger_document};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(entries) = parse_ledger_document(&raw) else {
        return;
    };
    let rendered = render_ledger_document(&entries).expect("parsed entries render");
    let reparsed = parse_ledger_document(&rendered).expect("rendered ledger parses");
    assert_eq!(reparsed, entries);
});
