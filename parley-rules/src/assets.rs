use anyhow::{Context, Result};
use std::{borrow::Cow, fs, path::Path};

use crate::types::RuleSet;

/// === Embedded canonical rule set ===
pub const INJECTION_TOML_NAME: &str = "injection.toml";
pub const INJECTION_TOML: &str = include_str!("../assets/injection.toml");

/// Every rule file shipped with the crate.
pub const DEFAULT_RULE_FILES: &[&str] = &[INJECTION_TOML_NAME];

/// Return the embedded text for a known rule file, if any.
pub fn default_rules_text(name: &str) -> Option<&'static str> {
    match name {
        INJECTION_TOML_NAME => Some(INJECTION_TOML),
        _ => None,
    }
}

/// Seed missing default rule files into a destination directory (idempotent).
/// Returns a list of files that were created.
pub fn write_default_rules(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("create_dir_all({:?})", dir))?;

    let mut created = Vec::new();
    for &name in DEFAULT_RULE_FILES {
        let Some(text) = default_rules_text(name) else {
            continue;
        };
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, text).with_context(|| format!("write {:?}", path))?;
            created.push(name.to_string());
        }
    }
    Ok(created)
}

/// Verified reader with "locked" mode.
///
/// - If `path` exists and its file name has an embedded copy:
///   - blake3(file) == blake3(embedded) → file contents.
///   - mismatch and `locked` → overwrite the file with the embedded copy and return it.
///   - mismatch and not locked → file contents (local edits are allowed).
/// - If `path` exists without an embedded copy → file contents as-is.
/// - If `path` is missing → embedded copy (written to disk best-effort), or an error
///   when there is nothing to fall back to.
pub fn read_verified_or_embedded(path: &Path, locked: bool) -> Result<Cow<'static, str>> {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    let embedded_opt = default_rules_text(name);

    if path.exists() {
        let file_bytes = fs::read(path).with_context(|| format!("read {:?}", path))?;
        let Some(embedded) = embedded_opt else {
            return Ok(Cow::Owned(String::from_utf8_lossy(&file_bytes).into_owned()));
        };
        if blake3::hash(&file_bytes) == blake3::hash(embedded.as_bytes()) {
            return Ok(Cow::Borrowed(embedded));
        }
        if locked {
            tracing::warn!(path = %path.display(), "rule file differs from canonical copy, restoring");
            fs::write(path, embedded).with_context(|| format!("restore embedded {:?}", path))?;
            return Ok(Cow::Borrowed(embedded));
        }
        tracing::info!(path = %path.display(), "using locally edited rule file");
        return Ok(Cow::Owned(String::from_utf8_lossy(&file_bytes).into_owned()));
    }

    match embedded_opt {
        Some(embedded) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).ok();
            }
            // Caller still gets the embedded copy if this write fails.
            let _ = fs::write(path, embedded);
            Ok(Cow::Borrowed(embedded))
        }
        None => anyhow::bail!("rule file {:?} not found and no embedded default exists", path),
    }
}

/// Read and parse a rule set through [`read_verified_or_embedded`].
pub fn load_rule_set(path: &Path, locked: bool) -> Result<RuleSet> {
    let text = read_verified_or_embedded(path, locked)?;
    RuleSet::from_toml(&text).with_context(|| format!("parse rule set {:?}", path))
}
