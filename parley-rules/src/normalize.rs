//! Text normalization applied before rule matching.
//!
//! Policy:
//! - Drop control characters, except newline and tab (role markers are line-anchored).
//! - Drop common zero-width characters (ZWS/ZWNJ/ZWJ/WJ/BOM).
//! - Unicode-aware lowercasing (char.to_lowercase()).

/// Characters that render as nothing and are used to split keywords.
pub const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Normalize text for rule matching.
pub fn for_rules(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_control() && ch != '\n' && ch != '\t' {
            continue;
        }
        for lc in ch.to_lowercase() {
            if !ZERO_WIDTH.contains(&lc) {
                out.push(lc);
            }
        }
    }
    out
}
