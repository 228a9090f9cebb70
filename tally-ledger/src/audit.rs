//! Append-only JSON-lines audit trail of decided operations.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use tally_common::error::{Result, TallyError};

fn storage(path: &Path, e: impl std::fmt::Display) -> TallyError {
    TallyError::Storage(format!("{}: {e}", path.display()))
}

/// Appends one JSON record per line to `path`, creating parent directories.
pub fn append_audit<T: Serialize>(path: impl AsRef<Path>, entry: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| storage(path, e))?;
        }
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| storage(path, e))?;
    file.write_all(line.as_bytes()).map_err(|e| storage(path, e))?;
    Ok(())
}

/// Loads every record from an audit file written by [`append_audit`].
pub fn load_audit<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| storage(path, e))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(TallyError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
        committed: bool,
    }

    #[test]
    fn test_append_and_load_audit() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("audit-n1.jsonl");

        append_audit(&path, &Entry { id: "op1".into(), committed: true }).unwrap();
        append_audit(&path, &Entry { id: "op2".into(), committed: false }).unwrap();

        let loaded: Vec<Entry> = load_audit(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1], Entry { id: "op2".into(), committed: false });
    }

    #[test]
    fn test_unwritable_path_is_storage_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        // um arquivo no lugar do diretório pai
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let err = append_audit(blocker.join("audit.jsonl"), &Entry { id: "op1".into(), committed: true }).unwrap_err();
        assert_eq!(err.reason_code(), "storage_error");

        let err = load_audit::<Entry>(dir.path().join("missing.jsonl")).unwrap_err();
        assert!(matches!(err, TallyError::Storage(_)));
    }
}
