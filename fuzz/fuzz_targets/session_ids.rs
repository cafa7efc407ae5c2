#![no_main]

use libfuzzer_sys::fuzz_target;
use sauce_reconcile_core::name_matcher::whole_word_pattern;
use sauce_reconcile_core::session_ids::extract;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    let references = extract(true, [Some(text.as_ref())]);
    let marker_lines = text
        .split(['\n', '\r'])
        .filter(|line| line.contains("SauceOnDemandSessionID="))
        .count();
    assert!(references.len() <= marker_lines);

    for reference in &references {
        assert!(!reference.session_id.is_empty());
        assert!(
            reference
                .session_id
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == '-')
        );
        if let Some(label) = &reference.job_name {
            assert!(!label.is_empty());
            assert_eq!(label.trim(), label);
        }
    }

    // Arbitrary job names must never panic the matcher's pattern builder.
    if let Ok(pattern) = whole_word_pattern(&text) {
        assert!(pattern.is_match(&text));
    }
});
