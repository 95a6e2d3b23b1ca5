//! Privacy helpers for anything that leaves the pipeline as a diagnostic.

use serde::Serialize;

/// Expose only a short prefix of an identity plus a stable hash tag, so
/// records for the same identity can be correlated without revealing it.
/// The prefix never covers more than half the identity.
///
/// `redact_identity("user-123456", 4)` → `"user…#1a2b3c4d"`.
pub fn redact_identity(identity: &str, prefix_chars: usize) -> String {
    let shown = prefix_chars.min(identity.chars().count() / 2);
    let prefix: String = identity.chars().take(shown).collect();
    let digest = blake3::hash(identity.as_bytes()).to_hex();
    format!("{}…#{}", prefix, &digest.as_str()[..8])
}

/// A truncated, single-line view of user content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub text: String,
    pub truncated: bool,
}

/// First `max_chars` characters of `s` with newlines flattened to spaces.
pub fn preview(s: &str, max_chars: usize) -> Preview {
    let mut chars = s.chars();
    let text: String = chars
        .by_ref()
        .take(max_chars)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    Preview {
        text,
        truncated: chars.next().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keeps_only_prefix() {
        let r = redact_identity("guest-7f3a9c11-secret", 4);
        assert!(r.starts_with("gues…#"));
        assert!(!r.contains("secret"));
        assert_eq!(r, redact_identity("guest-7f3a9c11-secret", 4));
        assert_ne!(r, redact_identity("guest-7f3a9c11-other", 4));
    }

    #[test]
    fn short_identity_shows_at_most_half() {
        assert!(redact_identity("ab", 4).starts_with("a…#"));
        assert!(redact_identity("u", 4).starts_with("…#"));
        assert!(redact_identity("abcd", 4).starts_with("ab…#"));
        assert!(redact_identity("", 4).starts_with("…#"));
        assert_ne!(redact_identity("u", 4), redact_identity("v", 4));
    }

    #[test]
    fn preview_truncates_by_chars() {
        let long = "ä".repeat(150);
        let p = preview(&long, 100);
        assert_eq!(p.text.chars().count(), 100);
        assert!(p.truncated);

        let p = preview("line one\nline two", 100);
        assert_eq!(p.text, "line one line two");
        assert!(!p.truncated);
    }
}
