// src/utils/logbook.rs
use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, io::Write, path::Path};

/// Append one JSON value as a line to a JSONL file, creating parents as needed.
pub fn append_jsonl<S: Serialize>(path: &Path, value: &S) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all({:?})", parent))?;
    }
    let json = serde_json::to_string(value)?;
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {:?}", path))?;
    writeln!(f, "{}", json)?;
    Ok(())
}

/// Read every line of a JSONL file as a JSON value. Unparseable lines are skipped.
pub fn read_jsonl(path: &Path) -> Result<Vec<serde_json::Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_one_line_per_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logbook").join("audit.jsonl");
        append_jsonl(&path, &json!({"event": "a"})).unwrap();
        append_jsonl(&path, &json!({"event": "b"})).unwrap();
        let rows = read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["event"], "b");
    }
}
