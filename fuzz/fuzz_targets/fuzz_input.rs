// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use docuflow::classifier::{extract_json, parse_response};
use docuflow::placement::{normalize_category, sanitize_filename};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    reply: &'a str,
    name: &'a str,
    category: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    if let Some(span) = extract_json(input.reply) {
        assert!(span.starts_with('{') && span.ends_with('}'));
    }
    let _ = parse_response(input.reply);

    let clean = sanitize_filename(input.name);
    assert!(!clean.is_empty());
    assert!(clean.chars().all(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-')));

    let category = normalize_category(input.category);
    assert!(!category.is_empty());
    assert!(!category.contains(' '));
});
