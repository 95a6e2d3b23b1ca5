//! Two-locale language heuristic and the user-facing strings per locale.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::services::validator::FormatCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "de")]
    German,
    #[serde(rename = "en")]
    English,
}

impl Locale {
    pub const PRIMARY: Locale = Locale::German;
    pub const SECONDARY: Locale = Locale::English;

    pub fn code(&self) -> &'static str {
        match self {
            Locale::German => "de",
            Locale::English => "en",
        }
    }

    pub fn from_code(code: &str) -> Option<Locale> {
        match code {
            "de" => Some(Locale::German),
            "en" => Some(Locale::English),
            _ => None,
        }
    }

    /// Substituted for the response when the backend fails.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Locale::German => {
                "Entschuldigung, gerade kann ich keine Antwort erzeugen. Bitte versuche es gleich noch einmal."
            }
            Locale::English => "Sorry, I can't generate a response right now. Please try again in a moment.",
        }
    }

    pub fn rejection_message(&self, error: &ValidationError) -> String {
        match (self, error) {
            (Locale::German, ValidationError::TooShort { .. }) => "Bitte gib eine Nachricht ein.".to_string(),
            (Locale::English, ValidationError::TooShort { .. }) => "Please enter a message.".to_string(),
            (Locale::German, ValidationError::TooLong { max, .. }) => {
                format!("Deine Nachricht ist zu lang (höchstens {} Zeichen).", max)
            }
            (Locale::English, ValidationError::TooLong { max, .. }) => {
                format!("Your message is too long (at most {} characters).", max)
            }
            (Locale::German, ValidationError::InvalidFormat(FormatCheck::Email)) => {
                "Bitte gib eine gültige E-Mail-Adresse ein.".to_string()
            }
            (Locale::English, ValidationError::InvalidFormat(FormatCheck::Email)) => {
                "Please enter a valid email address.".to_string()
            }
        }
    }

    pub fn rate_limited_message(&self, retry_after_ms: u64) -> String {
        let secs = retry_after_ms.div_ceil(1000).max(1);
        match self {
            Locale::German => format!(
                "Du hast gerade zu viele Nachrichten gesendet. Bitte warte {} Sekunden.",
                secs
            ),
            Locale::English => format!(
                "You've sent too many messages. Please wait {} seconds.",
                secs
            ),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// Function words only. Words shared by both languages ("in", "was") are left out.
const GERMAN_WORDS: &[&str] = &[
    "der", "die", "das", "und", "ist", "ich", "nicht", "ein", "eine", "mit", "bin", "du", "wie",
    "sie", "es", "auf", "für", "den", "dem", "mir", "bitte", "danke", "haben", "auch", "noch",
    "wir", "sind", "kann", "wo", "gibt",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "is", "and", "what", "are", "you", "i", "a", "to", "of", "it", "that", "have", "with",
    "for", "please", "thanks", "can", "do", "my", "this", "where", "how", "there", "not",
];

/// Counts distinct whole-word hits per locale; the strictly higher count wins
/// and ties go to [`Locale::SECONDARY`].
#[derive(Debug, Clone)]
pub struct LanguageDetector {
    primary: HashSet<&'static str>,
    secondary: HashSet<&'static str>,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self {
            primary: GERMAN_WORDS.iter().copied().collect(),
            secondary: ENGLISH_WORDS.iter().copied().collect(),
        }
    }
}

impl LanguageDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(&self, text: &str) -> Locale {
        let (primary, secondary) = self.scores(text);
        if primary > secondary {
            Locale::PRIMARY
        } else {
            Locale::SECONDARY
        }
    }

    /// Distinct-word hit counts as `(primary, secondary)`.
    pub fn scores(&self, text: &str) -> (usize, usize) {
        let lowered = text.to_lowercase();
        let words: HashSet<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let primary = words.iter().filter(|w| self.primary.contains(*w)).count();
        let secondary = words.iter().filter(|w| self.secondary.contains(*w)).count();
        (primary, secondary)
    }
}
