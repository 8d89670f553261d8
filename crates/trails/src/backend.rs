use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::BackendError;
use crate::graph::{TrailDocument, DOCUMENT_FORMAT_VERSION};
use crate::util::write_atomic;

/// Durable storage for the trail document. A save replaces the whole document,
/// so it either lands completely or not at all.
/// 路徑文件的持久化介面；每次儲存都會整份取代。
pub trait StorageBackend {
    /// Loads the stored document, `Ok(None)` when nothing has been saved yet.
    fn load(&mut self) -> Result<Option<TrailDocument>, BackendError>;

    fn save(&mut self, document: &TrailDocument) -> Result<(), BackendError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn load(&mut self) -> Result<Option<TrailDocument>, BackendError> {
        (**self).load()
    }

    fn save(&mut self, document: &TrailDocument) -> Result<(), BackendError> {
        (**self).save(document)
    }
}

/// Persists the document as pretty JSON using atomic writes.
/// 以 JSON 搭配原子寫入方式儲存路徑文件。
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for JsonFileBackend {
    fn load(&mut self) -> Result<Option<TrailDocument>, BackendError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let document: TrailDocument =
                    serde_json::from_str(&contents).map_err(|source| BackendError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                if document.format_version > DOCUMENT_FORMAT_VERSION {
                    return Err(BackendError::UnsupportedVersion {
                        found: document.format_version,
                        supported: DOCUMENT_FORMAT_VERSION,
                    });
                }
                Ok(Some(document))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BackendError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&mut self, document: &TrailDocument) -> Result<(), BackendError> {
        let payload = serde_json::to_vec_pretty(document).map_err(BackendError::Serialize)?;
        write_atomic(&self.path, &payload).map_err(|source| BackendError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-process backend. Saves can be made to fail on demand.
/// 記憶體內的儲存後端，可指定接下來的儲存失敗。
#[derive(Debug, Default)]
pub struct MemoryBackend {
    document: Option<TrailDocument>,
    failing_saves: usize,
    saves: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: TrailDocument) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    /// Makes the next `count` saves fail with [`BackendError::Unavailable`].
    pub fn fail_next_saves(&mut self, count: usize) {
        self.failing_saves = count;
    }

    pub fn document(&self) -> Option<&TrailDocument> {
        self.document.as_ref()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&mut self) -> Result<Option<TrailDocument>, BackendError> {
        Ok(self.document.clone())
    }

    fn save(&mut self, document: &TrailDocument) -> Result<(), BackendError> {
        if self.failing_saves > 0 {
            self.failing_saves -= 1;
            return Err(BackendError::Unavailable("memory backend save refused".into()));
        }
        self.document = Some(document.clone());
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let mut backend = JsonFileBackend::new(dir.path().join("absent.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut backend = JsonFileBackend::new(dir.path().join("data").join("trails.json"));
        let document = TrailDocument {
            next_sequence: 7,
            ..TrailDocument::default()
        };
        backend.save(&document).unwrap();
        assert_eq!(backend.load().unwrap(), Some(document));
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trails.json");
        fs::write(&path, r#"{ "format_version": 99 }"#).unwrap();
        let err = JsonFileBackend::new(&path).load().unwrap_err();
        assert!(matches!(
            err,
            BackendError::UnsupportedVersion { found: 99, .. }
        ));
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trails.json");
        fs::write(&path, "[}").unwrap();
        let err = JsonFileBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, BackendError::Parse { .. }));
    }

    #[test]
    fn memory_backend_fails_on_request() {
        let mut backend = MemoryBackend::new();
        backend.fail_next_saves(1);
        assert!(backend.save(&TrailDocument::default()).is_err());
        assert!(backend.document().is_none());
        backend.save(&TrailDocument::default()).unwrap();
        assert_eq!(backend.save_count(), 1);
    }
}
