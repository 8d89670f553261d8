use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AreaId, FolderId, NoteId, PageId, TrailId};

const SCHEME: &str = "brie://";

/// Serialisable handle to any stored entity, used for drag-and-drop and bulk
/// operations. Resolving it again after a reload is always safe.
/// 可序列化的實體參照，用於拖放與批次操作；重新載入後仍可安全解析。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Trail(TrailId),
    Page(PageId),
    Area(AreaId),
    Folder(FolderId),
    Note(NoteId),
}

impl EntityRef {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityRef::Trail(_) => "trail",
            EntityRef::Page(_) => "page",
            EntityRef::Area(_) => "area",
            EntityRef::Folder(_) => "folder",
            EntityRef::Note(_) => "note",
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            EntityRef::Trail(id) => write!(f, "{SCHEME}{kind}/{id}"),
            EntityRef::Page(id) => write!(f, "{SCHEME}{kind}/{id}"),
            EntityRef::Area(id) => write!(f, "{SCHEME}{kind}/{id}"),
            EntityRef::Folder(id) => write!(f, "{SCHEME}{kind}/{id}"),
            EntityRef::Note(id) => write!(f, "{SCHEME}{kind}/{id}"),
        }
    }
}

/// Failure to parse a `brie://<kind>/<uuid>` reference.
/// 解析 `brie://<kind>/<uuid>` 參照失敗。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntityRefParseError {
    #[error("entity reference must start with `{SCHEME}`: {0}")]
    MissingScheme(String),
    #[error("unknown entity kind `{0}`")]
    UnknownKind(String),
    #[error("invalid entity id `{0}`")]
    InvalidId(String),
}

impl FromStr for EntityRef {
    type Err = EntityRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let rest = trimmed
            .strip_prefix(SCHEME)
            .ok_or_else(|| EntityRefParseError::MissingScheme(trimmed.to_string()))?;
        let (kind, id) = rest
            .split_once('/')
            .ok_or_else(|| EntityRefParseError::InvalidId(rest.to_string()))?;
        let invalid = || EntityRefParseError::InvalidId(id.to_string());
        match kind {
            "trail" => id.parse().map(EntityRef::Trail).map_err(|_| invalid()),
            "page" => id.parse().map(EntityRef::Page).map_err(|_| invalid()),
            "area" => id.parse().map(EntityRef::Area).map_err(|_| invalid()),
            "folder" => id.parse().map(EntityRef::Folder).map_err(|_| invalid()),
            "note" => id.parse().map(EntityRef::Note).map_err(|_| invalid()),
            other => Err(EntityRefParseError::UnknownKind(other.to_string())),
        }
    }
}

impl From<TrailId> for EntityRef {
    fn from(id: TrailId) -> Self {
        EntityRef::Trail(id)
    }
}

impl From<PageId> for EntityRef {
    fn from(id: PageId) -> Self {
        EntityRef::Page(id)
    }
}

impl From<AreaId> for EntityRef {
    fn from(id: AreaId) -> Self {
        EntityRef::Area(id)
    }
}

impl From<FolderId> for EntityRef {
    fn from(id: FolderId) -> Self {
        EntityRef::Folder(id)
    }
}

impl From<NoteId> for EntityRef {
    fn from(id: NoteId) -> Self {
        EntityRef::Note(id)
    }
}
