//! One parametrized length/format policy reused for every input class.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::IntakeConfig;
use crate::error::ValidationError;
use crate::services::sanitizer::{sanitize, SanitizedText};

// WHATWG "valid email address" grammar, plus at least one dot in the domain.
static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$",
    )
    .map_err(|e| tracing::error!(error = %e, "email grammar failed to compile"))
    .ok()
});

/// Format checks layered on top of the length bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCheck {
    Email,
}

impl FormatCheck {
    fn accepts(&self, text: &str) -> bool {
        match self {
            FormatCheck::Email => EMAIL_RE.as_ref().is_some_and(|re| re.is_match(text)),
        }
    }
}

impl fmt::Display for FormatCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatCheck::Email => f.write_str("email address"),
        }
    }
}

/// Result of [`InputPolicy::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ValidationOutcome {
    Accepted(SanitizedText),
    Rejected(ValidationError),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    pub fn into_result(self) -> Result<SanitizedText, ValidationError> {
        match self {
            ValidationOutcome::Accepted(t) => Ok(t),
            ValidationOutcome::Rejected(e) => Err(e),
        }
    }
}

/// Length bounds (in characters, after trimming) plus an optional format check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPolicy {
    pub min_chars: usize,
    pub max_chars: usize,
    pub format: Option<FormatCheck>,
    /// Lowercase the text before checking and returning it.
    pub casefold: bool,
}

impl InputPolicy {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
            format: None,
            casefold: false,
        }
    }

    pub fn with_format(mut self, format: FormatCheck) -> Self {
        self.format = Some(format);
        self
    }

    pub fn casefolded(mut self) -> Self {
        self.casefold = true;
        self
    }

    /// Chat messages: 1..=2000 by default.
    pub fn chat(cfg: &IntakeConfig) -> Self {
        Self::new(cfg.min_chars, cfg.max_chars)
    }

    /// Free-text search: 1..=200 by default.
    pub fn search(cfg: &IntakeConfig) -> Self {
        Self::new(cfg.min_chars, cfg.search_max_chars)
    }

    /// Human display name: 1..=100 by default.
    pub fn display_name(cfg: &IntakeConfig) -> Self {
        Self::new(cfg.min_chars, cfg.name_max_chars)
    }

    /// Email address: up to 254, grammar-checked, lowercased.
    pub fn email(cfg: &IntakeConfig) -> Self {
        Self::new(cfg.min_chars, cfg.email_max_chars)
            .with_format(FormatCheck::Email)
            .casefolded()
    }

    /// Check `text` against this policy and return its sanitized form.
    ///
    /// The upper bound applies to the trimmed input as submitted, before
    /// sanitizing can collapse it; the lower bound applies to what is left
    /// after sanitizing.
    pub fn validate(&self, text: &str) -> ValidationOutcome {
        let submitted = text.trim().chars().count();
        if submitted > self.max_chars {
            return ValidationOutcome::Rejected(ValidationError::TooLong {
                max: self.max_chars,
                actual: submitted,
            });
        }

        let clean = if self.casefold {
            sanitize(&text.to_lowercase())
        } else {
            sanitize(text)
        };
        if clean.char_len() < self.min_chars.max(1) {
            return ValidationOutcome::Rejected(ValidationError::TooShort { min: self.min_chars.max(1) });
        }
        if let Some(format) = self.format {
            if !format.accepts(clean.as_str()) {
                return ValidationOutcome::Rejected(ValidationError::InvalidFormat(format));
            }
        }
        ValidationOutcome::Accepted(clean)
    }
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::chat(&IntakeConfig::default())
    }
}
