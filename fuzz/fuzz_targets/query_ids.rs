#![no_main]

use libfuzzer_sys::fuzz_target;
use logtally_core::validate::query_ids;

fuzz_target!(|query: &str| {
    if let Ok(ids) = query_ids(query) {
        // Re-rendering the parsed set must parse back to the same set.
        let rendered = ids
            .iter()
            .map(|id| format!("id={id}"))
            .collect::<Vec<_>>()
            .join("&");
        assert_eq!(query_ids(&rendered).ok(), Some(ids));
    }
});
