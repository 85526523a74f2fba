use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::StorageError;

/// Storage capability handed to the orchestrator and every stage.
///
/// Paths are logical, `/`-separated and rooted at the backend's root
/// (`/data/input/a.txt`), never OS paths.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, StorageError>;
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;
    fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;
    /// Lists files below `path` recursively, as logical paths in sorted order.
    fn list(&self, path: &str) -> Result<Vec<String>, StorageError>;
    fn create_folders(&self, path: &str) -> Result<(), StorageError>;
    fn copy(&self, from: &str, to: &str) -> Result<(), StorageError>;
    fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError>;
    /// URI of the storage root, shared with external executors.
    fn root_uri(&self) -> String;

    fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| StorageError::ReadFile {
            path: PathBuf::from(path),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }
}

/// Renames `src` to `dst`, copying and deleting when the rename is refused
/// (e.g. across devices).
fn move_os_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Local-disk backend mapping logical paths below a root directory.
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a logical path to its OS path, rejecting `..` traversal.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(logical.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::PathTraversal(logical.to_string())),
            }
        }
        Ok(resolved)
    }

    fn to_logical(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(format!("/{}", parts.join("/")))
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        Ok(())
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.exists())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let os_path = self.resolve(path)?;
        std::fs::read(&os_path).map_err(|e| StorageError::ReadFile {
            path: os_path,
            source: e,
        })
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let os_path = self.resolve(path)?;
        self.ensure_parent(&os_path)?;
        std::fs::write(&os_path, content).map_err(|e| StorageError::WriteFile {
            path: os_path,
            source: e,
        })
    }

    fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let os_path = self.resolve(path)?;
        if !os_path.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&os_path).sort_by_file_name() {
            let entry = entry.map_err(|e| StorageError::List {
                path: os_path.clone(),
                source: e,
            })?;
            if entry.file_type().is_file() {
                if let Some(logical) = self.to_logical(entry.path()) {
                    files.push(logical);
                }
            }
        }
        Ok(files)
    }

    fn create_folders(&self, path: &str) -> Result<(), StorageError> {
        let os_path = self.resolve(path)?;
        std::fs::create_dir_all(&os_path).map_err(|e| StorageError::CreateDirectory {
            path: os_path,
            source: e,
        })
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        self.ensure_parent(&dst)?;
        std::fs::copy(&src, &dst).map_err(|e| StorageError::CopyFile {
            from: src,
            to: dst,
            source: e,
        })?;
        Ok(())
    }

    fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        self.ensure_parent(&dst)?;
        move_os_file(&src, &dst)
    }

    fn root_uri(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(temp_dir.path());

        fs.write("/data/out/hello.txt", b"Hello, World!").unwrap();

        assert!(fs.exists("/data/out/hello.txt").unwrap());
        assert_eq!(fs.read_to_string("/data/out/hello.txt").unwrap(), "Hello, World!");
        assert!(temp_dir.path().join("data/out/hello.txt").exists());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(temp_dir.path());

        let result = fs.write("/data/../../etc/passwd", b"x");
        assert!(matches!(result, Err(StorageError::PathTraversal(_))));
    }

    #[test]
    fn test_list_is_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(temp_dir.path());
        fs.write("/in/b.txt", b"b").unwrap();
        fs.write("/in/a.txt", b"a").unwrap();
        fs.write("/in/nested/c.txt", b"c").unwrap();

        let files = fs.list("/in").unwrap();
        assert_eq!(files, vec!["/in/a.txt", "/in/b.txt", "/in/nested/c.txt"]);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(temp_dir.path());
        assert!(fs.list("/nothing/here").unwrap().is_empty());
    }

    #[test]
    fn test_copy_and_move() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(temp_dir.path());
        fs.write("/src/file.txt", b"content").unwrap();

        fs.copy("/src/file.txt", "/copy/file.txt").unwrap();
        assert!(fs.exists("/src/file.txt").unwrap());
        assert!(fs.exists("/copy/file.txt").unwrap());

        fs.move_file("/src/file.txt", "/moved/deep/file.txt").unwrap();
        assert!(!fs.exists("/src/file.txt").unwrap());
        assert_eq!(fs.read("/moved/deep/file.txt").unwrap(), b"content");
    }

    #[test]
    fn test_create_nested_folders() {
        let temp_dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(temp_dir.path());
        fs.create_folders("/deep/nested/directory/structure").unwrap();
        assert!(temp_dir.path().join("deep/nested/directory/structure").is_dir());
    }
}
