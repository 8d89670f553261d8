use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::entity_ref::EntityRef;
use crate::model::TrailId;

/// Errors returned by every store operation.
/// 所有儲存操作可能回傳的錯誤。
#[derive(Debug, Error)]
pub enum TrailStoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to persist trails during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("{0} not found")]
    NotFound(EntityRef),
}

impl TrailStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrailStoreError::NotFound(_))
    }
}

/// Input rejected before any state was touched.
/// 在變更狀態前即被拒絕的輸入。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("trail name must be 1-100 characters after trimming: {0:?}")]
    InvalidName(String),
    #[error("not an absolute URL: {0:?}")]
    InvalidUrl(String),
    #[error("trail {0} already has a note")]
    NoteAlreadyExists(TrailId),
    #[error("cannot move trail {trail} beneath {target}, which is itself or a descendant")]
    CyclicMove { trail: TrailId, target: TrailId },
    #[error("malformed trail markdown at line {line}: {reason}")]
    MalformedImport { line: usize, reason: String },
}

/// Failures raised by a [`crate::StorageBackend`].
/// [`crate::StorageBackend`] 可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("trail store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid trail document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialise trail document: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("unsupported trail document version {found} (newest known is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
