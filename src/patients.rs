//! Read-only access to processed patient text records.
//!
//! Each patient is one `{patient_id}.txt` file in the patient directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

const RECORD_EXTENSION: &str = "txt";
const MAX_PATIENT_ID_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Invalid patient id: {0:?}")]
    InvalidId(String),

    #[error("Patient not found: {0}")]
    NotFound(String),

    #[error("Failed to read patient record: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether `id` is safe to embed in a file name: ASCII letters, digits,
/// `_`, `.` and `-`, never `..`.
pub fn is_valid_patient_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PATIENT_ID_LEN
        && !id.contains("..")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

pub struct PatientStore {
    dir: PathBuf,
}

impl PatientStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Sorted patient ids. A missing directory lists no patients.
    pub fn list_patients(&self) -> Result<Vec<String>, PatientError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.dir.display(), "Patient directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION))
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .filter(|id| is_valid_patient_id(id))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn read_patient(&self, patient_id: &str) -> Result<String, PatientError> {
        if !is_valid_patient_id(patient_id) {
            return Err(PatientError::InvalidId(patient_id.to_string()));
        }

        let path = self.dir.join(format!("{patient_id}.{RECORD_EXTENSION}"));
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PatientError::NotFound(patient_id.to_string()),
            _ => PatientError::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_text_records_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p2.txt"), "b").unwrap();
        fs::write(dir.path().join("p1.txt"), "a").unwrap();
        fs::write(dir.path().join("notes.md"), "x").unwrap();
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let store = PatientStore::new(dir.path());
        assert_eq!(store.list_patients().unwrap(), vec!["p1", "p2"]);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatientStore::new(&dir.path().join("absent"));
        assert!(store.list_patients().unwrap().is_empty());
    }

    #[test]
    fn reads_record_by_id() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc-123.txt"), "Conditions: Asthma (disorder)").unwrap();

        let store = PatientStore::new(dir.path());
        assert_eq!(
            store.read_patient("abc-123").unwrap(),
            "Conditions: Asthma (disorder)"
        );
    }

    #[test]
    fn unknown_patient_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatientStore::new(dir.path());
        assert!(matches!(
            store.read_patient("nobody"),
            Err(PatientError::NotFound(_))
        ));
    }

    #[test]
    fn traversal_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatientStore::new(dir.path());
        for id in ["../secret", "a/b", "", "..", "a\\b", "x y"] {
            assert!(
                matches!(store.read_patient(id), Err(PatientError::InvalidId(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn id_validation_rules() {
        assert!(is_valid_patient_id("0b6a-44e1_v2.final"));
        assert!(!is_valid_patient_id(&"a".repeat(MAX_PATIENT_ID_LEN + 1)));
        assert!(!is_valid_patient_id("a..b"));
        assert!(!is_valid_patient_id("é"));
    }
}
