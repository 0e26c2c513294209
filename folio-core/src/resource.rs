//! Resource handle abstraction consumed by the codecs
//!
//! Codecs only ever call the primitives on [`Resource`]; they never assume a
//! storage backend. [`FileResource`] is the local file system implementation.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// A readable, seekable byte stream
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Shared handle to a resource
pub type ResourceRef = Arc<dyn Resource>;

/// Byte access to one stored e-book
pub trait Resource: Send + Sync + fmt::Debug {
    /// Stable identity of the resource (a path for local files)
    fn key(&self) -> &str;

    /// Display name, usually the file name
    fn name(&self) -> &str;

    /// MIME type if the backend knows it
    fn mime_type(&self) -> Option<&str> {
        None
    }

    fn open_read(&self) -> io::Result<Box<dyn ReadSeek>>;

    fn size(&self) -> io::Result<u64>;

    fn modified_at(&self) -> io::Result<SystemTime>;

    /// Allocate an empty sibling used to stage a rewrite of this resource
    fn create_temporary(&self) -> io::Result<ResourceRef>;

    /// Open for writing, truncating any previous content
    fn open_write(&self) -> io::Result<Box<dyn Write>>;

    /// Move this resource over `target`
    fn atomic_move_to(&self, target: &dyn Resource, overwrite: bool) -> io::Result<()>;

    fn delete(&self) -> io::Result<()>;

    /// Read the whole resource into memory
    fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open_read()?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Read at most `limit` leading bytes
    fn read_prefix(&self, limit: usize) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(limit.min(64 * 1024));
        self.open_read()?.take(limit as u64).read_to_end(&mut data)?;
        Ok(data)
    }

    /// Lower-cased file extension of [`Resource::name`]
    fn extension(&self) -> Option<String> {
        Path::new(self.name())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// A resource backed by a local file
#[derive(Clone)]
pub struct FileResource {
    path: PathBuf,
    key: String,
    name: String,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = path.to_string_lossy().to_string();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| key.clone());
        Self { path, key, name }
    }

    /// Wrap a path into a shared handle
    pub fn shared(path: impl Into<PathBuf>) -> ResourceRef {
        Arc::new(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileResource").field(&self.path).finish()
    }
}

impl Resource for FileResource {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn open_read(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(io::BufReader::new(File::open(&self.path)?)))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn modified_at(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    fn create_temporary(&self) -> io::Result<ResourceRef> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = self
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.name))
            .suffix(&suffix)
            .tempfile_in(dir)?;
        let path = temp.into_temp_path().keep()?;
        Ok(Arc::new(FileResource::new(path)))
    }

    fn open_write(&self) -> io::Result<Box<dyn Write>> {
        Ok(Box::new(io::BufWriter::new(File::create(&self.path)?)))
    }

    fn atomic_move_to(&self, target: &dyn Resource, overwrite: bool) -> io::Result<()> {
        let target_path = Path::new(target.key());
        if !overwrite && target_path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target_path.display()),
            ));
        }
        fs::rename(&self.path, target_path)
    }

    fn delete(&self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_lives_next_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = FileResource::new(dir.path().join("book.epub"));
        fs::write(original.path(), b"old").unwrap();

        let temp = original.create_temporary().unwrap();
        assert!(temp.name().starts_with(".book.epub."));
        assert_eq!(temp.extension().as_deref(), Some("epub"));

        temp.open_write().unwrap().write_all(b"new").unwrap();
        temp.atomic_move_to(&original, true).unwrap();
        assert_eq!(fs::read(original.path()).unwrap(), b"new");
    }

    #[test]
    fn test_move_without_overwrite_refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let original = FileResource::new(dir.path().join("book.pdf"));
        fs::write(original.path(), b"old").unwrap();
        let temp = original.create_temporary().unwrap();

        let err = temp.atomic_move_to(&original, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(original.path()).unwrap(), b"old");
    }

    #[test]
    fn test_read_prefix_limits_length() {
        let dir = tempfile::tempdir().unwrap();
        let resource = FileResource::new(dir.path().join("page.html"));
        fs::write(resource.path(), b"<html><head>").unwrap();
        assert_eq!(resource.read_prefix(6).unwrap(), b"<html>");
    }
}
