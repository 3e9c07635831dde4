// Text folding shared by the attendance normalizer and the name collation.
//
// Free-text labels arrive in whatever form the data-entry screens produced
// ("Thứ 5", "thu 5", "T5", "Có mặt", "co mat"), so every comparison goes
// through one of these keys instead of the raw string.
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Remove Vietnamese (and any other combining) diacritics.
///
/// `đ`/`Đ` are separate letters rather than `d` + mark, so they are mapped
/// explicitly.
pub fn strip_diacritics(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            other => other,
        })
        .collect()
}

/// Uppercase, diacritic-free, alphanumerics only: `"Thứ 5"` -> `"THU5"`.
pub fn compact_key(s: &str) -> String {
    strip_diacritics(s)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}
