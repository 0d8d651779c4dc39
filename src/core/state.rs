//! Lock file management: load, save (atomic), path derivation.

use super::types::StackLock;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Derive the lock file path for a stack within the state directory.
pub fn lock_file_path(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(stack).join("state.lock.yaml")
}

/// Load a stack's lock file. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, stack: &str) -> Result<Option<StackLock>> {
    let path = lock_file_path(state_dir, stack);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::io(format!("cannot read {}", path.display()), e))?;
    let lock: StackLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::State(format!("invalid lock file {}: {}", path.display(), e)))?;
    if lock.stack != stack {
        return Err(Error::State(format!(
            "lock file {} belongs to stack '{}'",
            path.display(),
            lock.stack
        )));
    }
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &StackLock) -> Result<()> {
    let path = lock_file_path(state_dir, &lock.stack);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("cannot create dir {}", parent.display()), e))?;
    }

    let yaml = serde_yaml_ng::to_string(lock)?;

    let tmp_path = path.with_extension("lock.yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| Error::io(format!("cannot write {}", tmp_path.display()), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        Error::io(
            format!("cannot rename {} to {}", tmp_path.display(), path.display()),
            e,
        )
    })?;

    Ok(())
}

/// Delete a stack's lock file once nothing is left in it.
pub fn remove_lock(state_dir: &Path, stack: &str) -> Result<()> {
    let path = lock_file_path(state_dir, stack);
    if path.exists() {
        std::fs::remove_file(&path)
            .map_err(|e| Error::io(format!("cannot remove {}", path.display()), e))?;
    }
    Ok(())
}

/// Create a new empty StackLock.
pub fn new_lock(stack: &str, prefix: &str, region: &str, backend: &str) -> StackLock {
    use crate::tripwire::eventlog::now_iso8601;
    StackLock {
        schema: "1.0".to_string(),
        stack: stack.to_string(),
        prefix: prefix.to_string(),
        region: region.to_string(),
        backend: backend.to_string(),
        generated_at: now_iso8601(),
        generator: format!("webstack {}", env!("CARGO_PKG_VERSION")),
        blake3_version: "1.8".to_string(),
        resources: indexmap::IndexMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ResourceKind, ResourceLock, ResourceStatus};

    fn entry(kind: ResourceKind, physical_id: &str) -> ResourceLock {
        ResourceLock {
            resource_type: kind,
            status: ResourceStatus::Converged,
            physical_id: Some(physical_id.to_string()),
            applied_at: Some("2026-02-16T14:00:00Z".to_string()),
            duration_seconds: Some(1.5),
            hash: "blake3:abc123".to_string(),
            live_hash: None,
            outputs: indexmap::IndexMap::new(),
        }
    }

    fn make_lock() -> StackLock {
        let mut lock = new_lock("test", "webserver", "us-east-1", "simulated");
        lock.resources
            .insert("webserver-vpc".to_string(), entry(ResourceKind::Network, "vpc-1"));
        lock
    }

    #[test]
    fn test_state_lock_file_path() {
        let p = lock_file_path(Path::new("/state"), "webserver-stack");
        assert_eq!(p, PathBuf::from("/state/webserver-stack/state.lock.yaml"));
    }

    #[test]
    fn test_state_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        save_lock(dir.path(), &make_lock()).unwrap();

        let loaded = load_lock(dir.path(), "test").unwrap().unwrap();
        assert_eq!(loaded.stack, "test");
        assert_eq!(loaded.backend, "simulated");
        assert_eq!(loaded.resources.len(), 1);
        let vpc = &loaded.resources["webserver-vpc"];
        assert_eq!(vpc.status, ResourceStatus::Converged);
        assert_eq!(vpc.physical_id.as_deref(), Some("vpc-1"));
    }

    #[test]
    fn test_state_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_lock(dir.path(), "ghost").unwrap().is_none());
    }

    #[test]
    fn test_state_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        save_lock(dir.path(), &make_lock()).unwrap();
        assert!(!dir.path().join("test").join("state.lock.yaml.tmp").exists());
        assert!(lock_file_path(dir.path(), "test").exists());
    }

    #[test]
    fn test_state_corrupt_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_file_path(dir.path(), "test");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "schema: [unterminated").unwrap();
        assert!(matches!(load_lock(dir.path(), "test"), Err(Error::State(_))));
    }

    #[test]
    fn test_state_foreign_stack_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let lock = make_lock();
        save_lock(dir.path(), &lock).unwrap();
        std::fs::rename(dir.path().join("test"), dir.path().join("other")).unwrap();
        assert!(matches!(load_lock(dir.path(), "other"), Err(Error::State(_))));
    }

    #[test]
    fn test_state_remove_lock() {
        let dir = tempfile::tempdir().unwrap();
        save_lock(dir.path(), &make_lock()).unwrap();
        remove_lock(dir.path(), "test").unwrap();
        assert!(load_lock(dir.path(), "test").unwrap().is_none());
        remove_lock(dir.path(), "test").unwrap();
    }

    #[test]
    fn test_state_roundtrip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = make_lock();
        lock.resources.insert(
            "aaa-first".to_string(),
            entry(ResourceKind::SecurityGroup, "sg-1"),
        );
        save_lock(dir.path(), &lock).unwrap();
        let loaded = load_lock(dir.path(), "test").unwrap().unwrap();
        let keys: Vec<_> = loaded.resources.keys().collect();
        assert_eq!(keys, vec!["webserver-vpc", "aaa-first"]);
    }
}
