//! Single-use plan artifacts handed from the plan request to the PDF request.
//!
//! A stored plan lives as a JSON file under the temporary root. Consuming it
//! first renames it to a private claim name, so at most one request can read
//! it, and the claimed file is overwritten and unlinked when the read ends.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::patients::is_valid_patient_id;
use crate::plan::{TreatmentPlan, TreatmentPlanEntry};

/// File name suffix of stored plans.
pub const PLAN_SUFFIX: &str = "_plan.json";

const STAGING_PREFIX: &str = ".plan-";
const CLAIM_SUFFIX: &str = ".consuming";

/// Collision suffixes tried before giving up on a timestamp.
const MAX_NAME_ATTEMPTS: u32 = 100;

const OVERWRITE_CHUNK: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Plan location escapes the temporary directory: {0}")]
    InvalidPath(PathBuf),

    #[error("Plan file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid patient id: {0:?}")]
    InvalidPatientId(String),

    #[error("Plan file is not a valid plan: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ArtifactBroker {
    /// Root as configured, lexically normalized.
    root: PathBuf,
    /// Root with symlinks resolved.
    canonical_root: PathBuf,
}

impl ArtifactBroker {
    /// Open the broker, creating the temporary root if needed.
    pub fn new(root: &Path) -> Result<Self, ArtifactError> {
        fs::create_dir_all(root)?;
        let canonical_root = fs::canonicalize(root)?;
        let root = normalize_lexically(&absolutize(root)?);
        Ok(Self {
            root,
            canonical_root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.canonical_root
    }

    /// Persist a plan for later single consumption. An empty plan stores
    /// nothing and returns `None`.
    pub fn store(
        &self,
        patient_id: &str,
        plan: &[TreatmentPlanEntry],
    ) -> Result<Option<PathBuf>, ArtifactError> {
        if !is_valid_patient_id(patient_id) {
            return Err(ArtifactError::InvalidPatientId(patient_id.to_string()));
        }
        if plan.is_empty() {
            tracing::debug!(patient_id, "Empty plan, no artifact stored");
            return Ok(None);
        }

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.canonical_root)?;
        serde_json::to_writer(staged.as_file_mut(), plan)?;
        staged.as_file().sync_all()?;

        let timestamp = chrono::Utc::now().timestamp();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{patient_id}_{timestamp}{PLAN_SUFFIX}")
            } else {
                format!("{patient_id}_{timestamp}_{attempt}{PLAN_SUFFIX}")
            };
            let location = self.canonical_root.join(name);

            match staged.persist_noclobber(&location) {
                Ok(_) => {
                    tracing::info!(
                        patient_id,
                        path = %location.display(),
                        entries = plan.len(),
                        "Plan artifact stored"
                    );
                    return Ok(Some(location));
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    staged = e.file;
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(ArtifactError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free artifact name for {patient_id} at {timestamp}"),
        )))
    }

    /// Read a stored plan once. The file is deleted whether or not it
    /// decodes; a second call for the same location is `NotFound`.
    pub fn retrieve_and_consume(&self, location: &Path) -> Result<TreatmentPlan, ArtifactError> {
        let resolved = self.resolve_within_root(location)?;
        if !resolved.is_file() {
            return Err(ArtifactError::NotFound(location.to_path_buf()));
        }

        let file_name = resolved
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArtifactError::InvalidPath(location.to_path_buf()))?;
        // Unique claim name: same-named plans in different subdirectories
        // must not share a claim.
        let placeholder = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(CLAIM_SUFFIX)
            .tempfile_in(&self.canonical_root)?
            .into_temp_path();
        let claimed = placeholder.to_path_buf();

        match fs::rename(&resolved, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(location.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }
        let _guard = DeleteOnDrop(claimed.clone());

        let bytes = fs::read(&claimed)?;
        let plan: TreatmentPlan = serde_json::from_slice(&bytes)?;
        tracing::info!(path = %resolved.display(), entries = plan.len(), "Plan artifact consumed");
        Ok(plan)
    }

    /// Delete artifacts left over from earlier runs that are older than
    /// `max_age`. Returns the number of files removed.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let entries = match fs::read_dir(&self.canonical_root) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(path = %self.canonical_root.display(), "Cannot scan artifact directory: {e}");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut purged = 0usize;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_artifact_name(name) || !path.is_file() {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match secure_delete_file(&path) {
                Ok(()) => purged += 1,
                Err(e) => tracing::warn!(path = %path.display(), "Failed to purge stale artifact: {e}"),
            }
        }

        if purged > 0 {
            tracing::info!(files_purged = purged, "Purged stale plan artifacts");
        }
        purged
    }

    /// Normalize `location` and require it to sit strictly below the root,
    /// both lexically and after symlink resolution.
    fn resolve_within_root(&self, location: &Path) -> Result<PathBuf, ArtifactError> {
        let invalid = || ArtifactError::InvalidPath(location.to_path_buf());

        let normalized = normalize_lexically(&absolutize(location)?);
        let lexically_inside = is_strictly_within(&normalized, &self.canonical_root)
            || is_strictly_within(&normalized, &self.root);
        if !lexically_inside {
            tracing::warn!(path = %location.display(), "Rejected plan location outside temporary root");
            return Err(invalid());
        }

        match fs::canonicalize(&normalized) {
            Ok(real) if is_strictly_within(&real, &self.canonical_root) => Ok(real),
            Ok(_) => {
                tracing::warn!(path = %location.display(), "Plan location resolves outside temporary root");
                Err(invalid())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(location.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn is_artifact_name(name: &str) -> bool {
    name.ends_with(PLAN_SUFFIX)
        || name.ends_with(CLAIM_SUFFIX)
        || (name.starts_with(STAGING_PREFIX) && name.ends_with(".tmp"))
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Component-wise containment; the root itself does not count.
fn is_strictly_within(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

/// Removes the claimed artifact when consumption ends, on every path.
struct DeleteOnDrop(PathBuf);

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        match secure_delete_file(&self.0) {
            Ok(()) => tracing::debug!(path = %self.0.display(), "Plan artifact deleted"),
            Err(e) => tracing::warn!(path = %self.0.display(), "Failed to delete plan artifact: {e}"),
        }
    }
}

/// Overwrite a file with random bytes, sync it, then unlink it.
///
/// A missing file is not an error. If the overwrite fails the file is
/// still removed.
pub fn secure_delete_file(path: &Path) -> std::io::Result<()> {
    let mut file = match fs::OpenOptions::new().write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Cannot open artifact for overwrite: {e}");
            return remove_if_present(path);
        }
    };

    let len = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
    let mut noise = vec![0u8; len.min(OVERWRITE_CHUNK)];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = remaining.min(noise.len());
        OsRng.fill_bytes(&mut noise[..chunk]);
        if let Err(e) = file.write_all(&noise[..chunk]) {
            tracing::warn!(path = %path.display(), "Artifact overwrite failed: {e}");
            break;
        }
        remaining -= chunk;
    }
    if let Err(e) = file.sync_all() {
        tracing::warn!(path = %path.display(), "Sync after overwrite failed: {e}");
    }
    drop(file);

    remove_if_present(path)
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> TreatmentPlan {
        vec![
            TreatmentPlanEntry {
                condition: "Hypertension".into(),
                details: vec!["Reduce sodium".into(), "Monitor BP".into()],
            },
            TreatmentPlanEntry {
                condition: "Type 2 diabetes".into(),
                details: vec!["Metformin".into()],
            },
        ]
    }

    fn broker() -> (tempfile::TempDir, ArtifactBroker) {
        let dir = tempfile::tempdir().unwrap();
        let broker = ArtifactBroker::new(&dir.path().join("tmp")).unwrap();
        (dir, broker)
    }

    #[test]
    fn store_then_consume_round_trips() {
        let (_dir, broker) = broker();
        let plan = sample_plan();

        let location = broker.store("patient-1", &plan).unwrap().unwrap();
        assert!(location.exists());

        let restored = broker.retrieve_and_consume(&location).unwrap();
        assert_eq!(restored, plan);
        assert!(!location.exists());
    }

    #[test]
    fn second_consume_is_not_found() {
        let (_dir, broker) = broker();
        let location = broker.store("p1", &sample_plan()).unwrap().unwrap();

        broker.retrieve_and_consume(&location).unwrap();
        assert!(matches!(
            broker.retrieve_and_consume(&location),
            Err(ArtifactError::NotFound(_))
        ));
    }

    #[test]
    fn consume_leaves_no_files_behind() {
        let (_dir, broker) = broker();
        let location = broker.store("p1", &sample_plan()).unwrap().unwrap();
        broker.retrieve_and_consume(&location).unwrap();
        assert_eq!(fs::read_dir(broker.root()).unwrap().count(), 0);
    }

    #[test]
    fn empty_plan_stores_nothing() {
        let (_dir, broker) = broker();
        assert!(broker.store("p1", &[]).unwrap().is_none());
        assert_eq!(fs::read_dir(broker.root()).unwrap().count(), 0);
    }

    #[test]
    fn file_name_carries_patient_and_timestamp() {
        let (_dir, broker) = broker();
        let location = broker.store("p1", &sample_plan()).unwrap().unwrap();
        let name = location.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("p1_"));
        assert!(name.ends_with(PLAN_SUFFIX));
        let stamp = &name["p1_".len()..name.len() - PLAN_SUFFIX.len()];
        assert!(stamp.parse::<i64>().is_ok(), "timestamp segment was {stamp:?}");
    }

    #[test]
    fn same_second_stores_do_not_clobber() {
        let (_dir, broker) = broker();
        let first = broker.store("p1", &sample_plan()).unwrap().unwrap();
        let second = broker.store("p1", &sample_plan()[..1]).unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(broker.retrieve_and_consume(&first).unwrap().len(), 2);
        assert_eq!(broker.retrieve_and_consume(&second).unwrap().len(), 1);
    }

    #[test]
    fn unsafe_patient_ids_rejected() {
        let (_dir, broker) = broker();
        for id in ["../escape", "a/b", "", ".."] {
            assert!(matches!(
                broker.store(id, &sample_plan()),
                Err(ArtifactError::InvalidPatientId(_))
            ));
        }
    }

    #[test]
    fn existing_file_outside_root_rejected_and_untouched() {
        let (dir, broker) = broker();
        let outside = dir.path().join("victim_plan.json");
        fs::write(&outside, serde_json::to_vec(&sample_plan()).unwrap()).unwrap();

        assert!(matches!(
            broker.retrieve_and_consume(&outside),
            Err(ArtifactError::InvalidPath(_))
        ));
        assert!(outside.exists());
    }

    #[test]
    fn traversal_out_of_root_rejected() {
        let (dir, broker) = broker();
        let outside = dir.path().join("victim_plan.json");
        fs::write(&outside, "[]").unwrap();

        let sneaky = broker.root().join("..").join("victim_plan.json");
        assert!(matches!(
            broker.retrieve_and_consume(&sneaky),
            Err(ArtifactError::InvalidPath(_))
        ));
        assert!(outside.exists());
    }

    #[test]
    fn sibling_with_shared_prefix_rejected() {
        let (dir, broker) = broker();
        let sibling = dir.path().join("tmp-evil");
        fs::create_dir(&sibling).unwrap();
        let file = sibling.join("x_plan.json");
        fs::write(&file, "[]").unwrap();

        assert!(matches!(
            broker.retrieve_and_consume(&file),
            Err(ArtifactError::InvalidPath(_))
        ));
        assert!(file.exists());
    }

    #[test]
    fn root_itself_and_missing_outside_paths_rejected() {
        let (_dir, broker) = broker();
        assert!(matches!(
            broker.retrieve_and_consume(broker.root()),
            Err(ArtifactError::InvalidPath(_))
        ));
        assert!(matches!(
            broker.retrieve_and_consume(Path::new("/etc/passwd")),
            Err(ArtifactError::InvalidPath(_))
        ));
        assert!(matches!(
            broker.retrieve_and_consume(Path::new("relative_plan.json")),
            Err(ArtifactError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_rejected() {
        let (dir, broker) = broker();
        let outside = dir.path().join("secret.json");
        fs::write(&outside, "[]").unwrap();
        let link = broker.root().join("link_plan.json");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        assert!(matches!(
            broker.retrieve_and_consume(&link),
            Err(ArtifactError::InvalidPath(_))
        ));
        assert!(outside.exists());
    }

    #[test]
    fn missing_file_inside_root_is_not_found() {
        let (_dir, broker) = broker();
        let missing = broker.root().join("ghost_123_plan.json");
        assert!(matches!(
            broker.retrieve_and_consume(&missing),
            Err(ArtifactError::NotFound(_))
        ));
    }

    #[test]
    fn same_named_plans_in_subdirectories_claim_separately() {
        let (_dir, broker) = broker();
        let first = broker.root().join("a").join("p1_1_plan.json");
        let second = broker.root().join("b").join("p1_1_plan.json");
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::create_dir_all(second.parent().unwrap()).unwrap();

        let plan_a = vec![TreatmentPlanEntry {
            condition: "Asthma".into(),
            details: vec!["Inhaler".into()],
        }];
        fs::write(&first, serde_json::to_vec(&plan_a).unwrap()).unwrap();
        fs::write(&second, serde_json::to_vec(&sample_plan()).unwrap()).unwrap();

        // A claim left by another consumer under the bare file name
        let foreign_claim = broker.root().join(format!(".p1_1_plan.json{CLAIM_SUFFIX}"));
        fs::write(&foreign_claim, "in use").unwrap();

        assert_eq!(broker.retrieve_and_consume(&first).unwrap(), plan_a);
        assert_eq!(broker.retrieve_and_consume(&second).unwrap(), sample_plan());
        assert_eq!(fs::read_to_string(&foreign_claim).unwrap(), "in use");

        let leftovers: Vec<_> = fs::read_dir(broker.root())
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers, vec![foreign_claim.file_name().unwrap().to_owned()]);
    }

    #[test]
    fn corrupt_artifact_is_deleted_anyway() {
        let (_dir, broker) = broker();
        let location = broker.root().join("p1_1_plan.json");
        fs::write(&location, "not json").unwrap();

        assert!(matches!(
            broker.retrieve_and_consume(&location),
            Err(ArtifactError::Serialization(_))
        ));
        assert!(!location.exists());
        assert_eq!(fs::read_dir(broker.root()).unwrap().count(), 0);
    }

    #[test]
    fn purge_removes_only_old_artifacts() {
        let (_dir, broker) = broker();
        let location = broker.store("p1", &sample_plan()).unwrap().unwrap();
        let unrelated = broker.root().join("keep.txt");
        fs::write(&unrelated, "x").unwrap();

        assert_eq!(broker.purge_stale(Duration::from_secs(3600)), 0);
        assert!(location.exists());

        assert_eq!(broker.purge_stale(Duration::ZERO), 1);
        assert!(!location.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn secure_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, b"sensitive patient plan").unwrap();

        secure_delete_file(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn secure_delete_missing_and_empty_files_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(secure_delete_file(&dir.path().join("absent")).is_ok());

        let empty = dir.path().join("empty");
        fs::write(&empty, b"").unwrap();
        secure_delete_file(&empty).unwrap();
        assert!(!empty.exists());
    }

    #[test]
    fn lexical_normalization() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("/../x")), PathBuf::from("/x"));
    }
}
