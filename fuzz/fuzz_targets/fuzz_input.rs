// SPDX-License-Identifier: PMPL-1.0
#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use photoatlas::labeler::{LabelSet, LABEL_COLUMNS};
use photoatlas::renamer::{parse_renamed_stem, slugify_place};
use photoatlas::sanitizer::strip_jpeg_metadata;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    reply: &'a str,
    stem: &'a str,
    prefix: &'a str,
    place: &'a str,
    jpeg: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    if let Some(set) = LabelSet::from_reply(input.reply) {
        assert_eq!(set.cells().len(), LABEL_COLUMNS.len());
        if let Some(c) = set.confidence {
            assert!((0.0..=1.0).contains(&c));
        }
    }

    let _ = parse_renamed_stem(input.stem, input.prefix);

    let slug = slugify_place(input.place);
    assert!(!slug.is_empty());
    assert!(!slug.starts_with('_') && !slug.ends_with('_'));

    if let Ok(clean) = strip_jpeg_metadata(input.jpeg) {
        assert!(clean.len() <= input.jpeg.len());
    }
});
