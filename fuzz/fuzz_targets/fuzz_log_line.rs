//! Fuzz target: session log line reader
//!
//! Feeds arbitrary bytes to `LogRecord::parse_line` and verifies:
//! - No panics under arbitrary input
//! - Any line that parses re-encodes to a line that parses to the same
//!   record kind and timestamp
//!
//! cargo fuzz run fuzz_log_line

#![no_main]

use fluidsampler::datalog::LogRecord;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(record) = LogRecord::parse_line(text) else {
        return;
    };

    // Very large levels can exceed the fixed line capacity; that is an
    // encode error, never a panic.
    let Ok(line) = record.encode_line() else {
        return;
    };
    let again = LogRecord::parse_line(line.as_str()).expect("encoded line must parse");
    assert_eq!(again.kind(), record.kind());
    assert_eq!(again.timestamp, record.timestamp);
});
