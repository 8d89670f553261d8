use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

entity_id!(
    /// Stable identifier of a trail.
    /// 路徑節點的穩定識別碼。
    TrailId
);
entity_id!(
    /// Stable identifier of a page.
    /// 頁面的穩定識別碼。
    PageId
);
entity_id!(
    /// Stable identifier of an area.
    /// 區域的穩定識別碼。
    AreaId
);
entity_id!(
    /// Stable identifier of a folder.
    /// 資料夾的穩定識別碼。
    FolderId
);
entity_id!(
    /// Stable identifier of a note.
    /// 筆記的穩定識別碼。
    NoteId
);

/// Role a trail plays inside the hierarchy.
/// 路徑節點在階層中的角色。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrailKind {
    #[default]
    Trail,
    SubTrail,
    SideTrail,
    Area,
    Folder,
    Note,
}

impl TrailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrailKind::Trail => "trail",
            TrailKind::SubTrail => "subtrail",
            TrailKind::SideTrail => "sidetrail",
            TrailKind::Area => "area",
            TrailKind::Folder => "folder",
            TrailKind::Note => "note",
        }
    }
}

impl fmt::Display for TrailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trail hangs in the forest. Exactly one context per trail.
/// 路徑節點的上層位置；每個節點只會有一個。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParentContext {
    #[default]
    TopLevel,
    Trail(TrailId),
    Area(AreaId),
    Folder(FolderId),
}

impl ParentContext {
    pub fn is_top_level(&self) -> bool {
        matches!(self, ParentContext::TopLevel)
    }

    pub fn parent_trail(&self) -> Option<TrailId> {
        match self {
            ParentContext::Trail(id) => Some(*id),
            _ => None,
        }
    }
}

/// A node of the trail hierarchy.
/// 路徑階層中的節點。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trail {
    pub id: TrailId,
    pub name: String,
    pub kind: TrailKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub order_index: i32,
    #[serde(default)]
    pub is_collapsed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub parent: ParentContext,
    pub sequence: u64,
}

/// A single browsed URL owned by one trail.
/// 隸屬於單一路徑的瀏覽頁面。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: PageId,
    pub trail: TrailId,
    /// Address exactly as supplied; always parses as an absolute URL.
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub order_index: i32,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
    #[serde(
        default,
        with = "crate::serde_base64::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub snapshot: Option<Vec<u8>>,
}

impl Page {
    pub fn parsed_url(&self) -> Option<url::Url> {
        url::Url::parse(&self.url).ok()
    }
}

/// Top-level grouping container. Areas and folders share this shape.
/// 頂層分組容器；區域與資料夾共用此結構。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group<Id> {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

pub type Area = Group<AreaId>;
pub type Folder = Group<FolderId>;

/// Free-text annotation attached to a trail.
/// 附加於路徑上的文字筆記。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: NoteId,
    pub trail: TrailId,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sibling sort key: `order_index`, then creation order when indices collide.
pub(crate) fn sibling_key(order_index: i32, sequence: u64) -> (i32, u64) {
    (order_index, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_display_form() {
        let id = TrailId::new();
        let parsed: TrailId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<PageId>().is_err());

        let raw = Uuid::new_v4();
        let wrapped = NoteId::from_uuid(raw);
        assert_eq!(wrapped.as_uuid(), &raw);
        assert_eq!(wrapped.to_string(), raw.to_string());
    }

    #[test]
    fn parent_context_serialises_as_tagged_object() {
        let area = AreaId::new();
        let json = serde_json::to_value(ParentContext::Area(area)).unwrap();
        assert_eq!(json["kind"], "area");
        assert_eq!(json["id"], area.to_string());

        let top = serde_json::to_value(ParentContext::TopLevel).unwrap();
        assert_eq!(top["kind"], "top_level");
    }

    #[test]
    fn trail_kind_uses_lowercase_names() {
        let json = serde_json::to_string(&TrailKind::SideTrail).unwrap();
        assert_eq!(json, "\"sidetrail\"");
        assert_eq!(TrailKind::SubTrail.to_string(), "subtrail");
    }
}
