use std::fs;
use std::io;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::domain::{DandisetId, DestinationName};
use crate::error::ProcessorError;

/// The local `<root>/<dandiset_id>` directory the `dandi` tool stages into.
/// Removed recursively when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: Utf8PathBuf,
}

impl WorkingDirectory {
    pub fn new(root: &Utf8Path, dandiset: &DandisetId) -> Result<Self, ProcessorError> {
        let root = absolute(root)?;
        Ok(Self {
            path: root.join(dandiset.as_str()),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn ensure_exists(&self) -> Result<(), ProcessorError> {
        fs::create_dir_all(self.path.as_std_path())
            .map_err(|err| ProcessorError::Filesystem(format!("create {}: {err}", self.path)))
    }

    /// Maps a destination name to a path under the working directory and
    /// checks, after normalization, that it stayed there.
    pub fn resolve(&self, name: &DestinationName) -> Result<Utf8PathBuf, ProcessorError> {
        let joined = normalize(&self.path.join(name.as_str()));
        let inside = joined != self.path && joined.starts_with(&self.path);
        if !inside {
            return Err(ProcessorError::InvariantViolation(format!(
                "destination {joined} is not inside working directory {}",
                self.path
            )));
        }
        Ok(joined)
    }

    pub fn remove_file(&self, path: &Utf8Path) -> Result<(), ProcessorError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ProcessorError::Filesystem(format!("remove {path}: {err}"))),
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        match fs::remove_dir_all(self.path.as_std_path()) {
            Ok(()) => tracing::debug!(path = %self.path, "removed working directory"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path, error = %err, "failed to remove working directory")
            }
        }
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, ProcessorError> {
    let absolute = std::path::absolute(path.as_std_path())
        .map_err(|err| ProcessorError::Filesystem(format!("resolve {path}: {err}")))?;
    let absolute = Utf8PathBuf::from_path_buf(absolute)
        .map_err(|_| ProcessorError::Filesystem("non-utf8 working directory".to_string()))?;
    Ok(normalize(&absolute))
}

// Lexical normalization; the destination does not exist yet, so it cannot be
// canonicalized.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workdir(root: &Utf8Path) -> WorkingDirectory {
        let id: DandisetId = "000123".parse().unwrap();
        WorkingDirectory::new(root, &id).unwrap()
    }

    #[test]
    fn resolves_nested_destination() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let dir = workdir(&root);
        let name: DestinationName = "sub-01/sub-01_ecephys.nwb".parse().unwrap();
        let resolved = dir.resolve(&name).unwrap();
        assert!(resolved.starts_with(dir.path()));
        assert!(resolved.ends_with("000123/sub-01/sub-01_ecephys.nwb"));
    }

    #[test]
    fn sibling_prefix_is_not_inside() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let dir = workdir(&root);
        let sibling = normalize(&dir.path().join("..").join("000123x"));
        assert!(!sibling.starts_with(dir.path()));
    }

    #[test]
    fn drop_removes_directory_and_tolerates_absence() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let dir = workdir(&root);
        dir.ensure_exists().unwrap();
        fs::write(dir.path().join("dandiset.yaml").as_std_path(), b"id: 000123").unwrap();
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.as_std_path().exists());

        let never_created = workdir(&root);
        drop(never_created);
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let dir = workdir(Utf8Path::new("."));
        assert!(dir.path().is_absolute());
        assert!(dir.path().ends_with("000123"));
    }
}
