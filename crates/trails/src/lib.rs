//! Trail hierarchy store for the Brie browser: trails, sub/side trails,
//! pages, areas, folders and notes, with markdown export.
//! Brie 瀏覽器的路徑階層儲存：路徑、子路徑、旁支路徑、頁面、區域、資料夾與筆記。

mod serde_base64;
mod util;

pub mod backend;
pub mod config;
pub mod entity_ref;
pub mod error;
pub mod events;
pub mod export;
mod graph;
pub mod model;
pub mod store;
pub mod validate;

pub use backend::{JsonFileBackend, MemoryBackend, StorageBackend};
pub use config::{ConfigError, NamePolicy, StoreConfig, DEFAULT_EXPORT_TITLE, DEFAULT_TRAIL_NAME};
pub use entity_ref::{EntityRef, EntityRefParseError};
pub use error::{BackendError, TrailStoreError, ValidationError};
pub use events::{StoreEvent, SubscriptionId};
pub use export::{parse_markdown, OutlinePage, OutlineTrail};
pub use graph::{TrailDocument, DOCUMENT_FORMAT_VERSION};
pub use model::{
    Area, AreaId, Folder, FolderId, Group, Note, NoteId, Page, PageId, ParentContext, Trail,
    TrailId, TrailKind,
};
pub use store::{EntityView, ImportSummary, PageUpdate, TrailStore, TrailUpdate};
pub use validate::{abbreviate_url, parse_address, validate_trail_name, validate_url};
