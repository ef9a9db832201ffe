//! Student name normalization and matching.
//!
//! Spreadsheet rosters are typed by hand and often truncated ("Иванов Иван"),
//! while the portal always carries the full name with patronymic
//! ("Иванов Иван Иванович"). Matching is therefore prefix-based on a
//! normalized key, never a fuzzy distance.

use unicode_normalization::UnicodeNormalization;

/// Decode HTML entities the portal occasionally leaves in names.
pub(crate) fn decode_html_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    htmlize::unescape(s).to_string()
}

/// Normalize a name (or any label) into a compact comparison key.
///
/// Pipeline: NFC compose -> lowercase -> `ё` to `е` -> keep only
/// alphanumeric characters. Whitespace and punctuation vanish entirely.
///
/// # Examples
///
/// ```
/// use brs_marks::marks::names::normalize;
///
/// assert_eq!(normalize("Фёдоров  Пётр"), "федоровпетр");
/// assert_eq!(normalize("Задание №1."), "задание1");
/// ```
pub fn normalize(s: &str) -> String {
    decode_html_entities(s)
        .nfc()
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'ё' { 'е' } else { c })
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Whether a portal name refers to the given spreadsheet name.
///
/// True iff the normalized portal name starts with the normalized actual
/// name. The relation is asymmetric: the portal side may carry extra tokens.
/// An empty actual name matches everything, so blank rows must be filtered
/// before calling this.
pub fn matches(portal_name: &str, actual_name: &str) -> bool {
    normalize(portal_name).starts_with(&normalize(actual_name))
}

/// Exact equality after normalization. Used for labels (control actions,
/// group names, discipline names) where prefix matching would be too loose.
pub fn same_label(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
