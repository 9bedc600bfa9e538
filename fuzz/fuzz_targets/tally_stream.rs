#![no_main]

use libfuzzer_sys::fuzz_target;
use logtally_core::aggregate::tally_stream;
use logtally_core::stream::LineStream;
use logtally_core::ErrorPolicy;
use std::sync::atomic::AtomicBool;

// Arbitrary bytes as a log file: decoding and counting must never panic,
// and every line is either counted or skipped.
fuzz_target!(|data: &[u8]| {
    let cancel = AtomicBool::new(false);
    let mut stream = LineStream::from_reader("fuzz.log", data);
    if let Ok(tally) = tally_stream(&mut stream, ErrorPolicy::Isolate, 8, &cancel) {
        assert_eq!(tally.table.total(), tally.stats.lines);
        assert_eq!(tally.failures.total, tally.stats.skipped_lines);
    }
});
