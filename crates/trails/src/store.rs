use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::backend::{JsonFileBackend, StorageBackend};
use crate::config::{NamePolicy, StoreConfig};
use crate::entity_ref::EntityRef;
use crate::error::{BackendError, TrailStoreError, ValidationError};
use crate::events::{Observers, StoreEvent, SubscriptionId};
use crate::export::{parse_markdown, render_markdown};
use crate::graph::TrailGraph;
use crate::model::{
    Area, AreaId, Folder, FolderId, Note, NoteId, Page, PageId, ParentContext, Trail, TrailId,
    TrailKind,
};
use crate::util::write_atomic;
use crate::validate::{is_absolute_url, normalize_trail_name, single_line, validate_trail_name};

type StoreResult<T> = Result<T, TrailStoreError>;

/// Fields to change on a trail; `None` leaves the value as is.
/// 路徑的更新欄位；`None` 代表保留原值。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrailUpdate {
    pub name: Option<String>,
    /// An empty string clears the icon.
    pub icon: Option<String>,
    pub is_collapsed: Option<bool>,
}

/// Fields to change on a page; `None` leaves the value as is.
/// 頁面的更新欄位；`None` 代表保留原值。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageUpdate {
    pub title: Option<String>,
    /// An empty string clears the icon.
    pub icon: Option<String>,
    pub is_active: Option<bool>,
}

/// What a markdown import created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub roots: Vec<TrailId>,
    pub trails: usize,
    pub pages: usize,
}

/// Borrowed view of a resolved [`EntityRef`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityView<'a> {
    Trail(&'a Trail),
    Page(&'a Page),
    Area(&'a Area),
    Folder(&'a Folder),
    Note(&'a Note),
}

/// Hands out strictly increasing timestamps even when the wall clock stalls.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    fn observe(&mut self, seen: Option<DateTime<Utc>>) {
        if let Some(seen) = seen {
            self.last = Some(self.last.map_or(seen, |last| last.max(seen)));
        }
    }

    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

/// Sorted id lists refreshed after every committed mutation.
#[derive(Debug, Default)]
struct Snapshots {
    trails: Vec<TrailId>,
    areas: Vec<AreaId>,
    folders: Vec<FolderId>,
}

/// Sole authority over trails, pages, areas, folders and notes.
///
/// Every mutation runs against a copy of the entity graph, is persisted
/// through the backend, and only then replaces the live graph. A failed save
/// leaves the store exactly as it was.
/// 路徑、頁面、區域、資料夾與筆記的唯一管理者；每次變更皆先寫入後端再套用。
#[derive(Debug)]
pub struct TrailStore<B: StorageBackend> {
    backend: B,
    config: StoreConfig,
    graph: TrailGraph,
    snapshots: Snapshots,
    observers: Observers,
    clock: MonotonicClock,
}

impl TrailStore<JsonFileBackend> {
    /// Opens the JSON store inside `data_dir` using the configured file name.
    /// 在資料目錄中開啟 JSON 儲存檔。
    pub fn open_in(data_dir: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let backend = JsonFileBackend::new(config.data_path(data_dir.as_ref()));
        Self::open(backend, config)
    }
}

impl<B: StorageBackend> TrailStore<B> {
    /// Loads the full entity set from the backend.
    /// 從後端載入完整的實體集合。
    pub fn open(mut backend: B, config: StoreConfig) -> StoreResult<Self> {
        let document = backend.load().map_err(|source| TrailStoreError::Persistence {
            operation: "load",
            source,
        })?;
        let graph = document.map(TrailGraph::from_document).unwrap_or_default();
        let mut store = Self {
            backend,
            config,
            graph: TrailGraph::default(),
            snapshots: Snapshots::default(),
            observers: Observers::default(),
            clock: MonotonicClock::default(),
        };
        store.adopt(graph);
        info!(
            "trail store loaded: {} trails, {} pages, {} areas, {} folders",
            store.graph.trails.len(),
            store.graph.pages.len(),
            store.graph.areas.len(),
            store.graph.folders.len()
        );
        Ok(store)
    }

    /// Discards in-memory state and loads the backend again.
    pub fn reload(&mut self) -> StoreResult<()> {
        let document = self
            .backend
            .load()
            .map_err(|source| TrailStoreError::Persistence {
                operation: "reload",
                source,
            })?;
        self.adopt(document.map(TrailGraph::from_document).unwrap_or_default());
        Ok(())
    }

    fn adopt(&mut self, graph: TrailGraph) {
        self.clock.observe(graph.latest_timestamp());
        self.graph = graph;
        self.refresh_snapshots();
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Registers an observer for change and failure notifications.
    /// 註冊變更與失敗通知的觀察者。
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + 'static,
    {
        self.observers.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn commit<T>(
        &mut self,
        operation: &'static str,
        apply: impl FnOnce(&mut TrailGraph) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut working = self.graph.clone();
        let value = apply(&mut working)?;
        working.reconcile_selection();

        if let Err(source) = self.backend.save(&working.to_document()) {
            warn!("{operation} was not persisted: {source}");
            self.observers.emit(&StoreEvent::PersistenceFailed {
                operation,
                message: source.to_string(),
            });
            return Err(TrailStoreError::Persistence { operation, source });
        }

        self.graph = working;
        self.refresh_snapshots();
        debug!("{operation} committed");
        self.observers.emit(&StoreEvent::Changed { operation });
        Ok(value)
    }

    fn refresh_snapshots(&mut self) {
        self.snapshots = Snapshots {
            trails: self
                .graph
                .siblings(&ParentContext::TopLevel)
                .into_iter()
                .map(|trail| trail.id)
                .collect(),
            areas: self.graph.sorted_areas().into_iter().map(|a| a.id).collect(),
            folders: self
                .graph
                .sorted_folders()
                .into_iter()
                .map(|f| f.id)
                .collect(),
        };
    }

    fn new_trail_name(&self, name: Option<&str>) -> StoreResult<String> {
        normalize_trail_name(name, self.config.name_policy, &self.config.default_trail_name)
            .map_err(TrailStoreError::from)
    }

    /// Creates a trail appended at the end of `parent`'s children.
    /// 建立新路徑，排在指定上層的最後。
    pub fn create_trail(
        &mut self,
        name: Option<&str>,
        kind: TrailKind,
        parent: ParentContext,
    ) -> StoreResult<Trail> {
        let name = self.new_trail_name(name)?;
        let now = self.clock.tick();
        self.commit("create trail", move |graph| {
            if let Some(missing) = graph.missing_context(&parent) {
                return Err(TrailStoreError::NotFound(missing));
            }
            Ok(insert_trail(graph, name, kind, parent, now))
        })
    }

    pub fn create_sub_trail(&mut self, parent: TrailId, name: Option<&str>) -> StoreResult<Trail> {
        self.create_trail(name, TrailKind::SubTrail, ParentContext::Trail(parent))
    }

    /// Inserts a side trail right after `sibling`, in the same context. Other
    /// siblings keep their indices, so the new trail may share one with them;
    /// creation order breaks the tie.
    /// 在指定路徑之後插入旁支路徑；其他兄弟節點的索引不會重新編號。
    pub fn create_side_trail(
        &mut self,
        sibling: TrailId,
        name: Option<&str>,
    ) -> StoreResult<Trail> {
        let name = self.new_trail_name(name)?;
        let now = self.clock.tick();
        self.commit("create side trail", move |graph| {
            let anchor = graph
                .trails
                .get(&sibling)
                .ok_or(TrailStoreError::NotFound(EntityRef::Trail(sibling)))?;
            let (context, anchor_index) = (anchor.parent, anchor.order_index);
            let mut trail = insert_trail(graph, name, TrailKind::SideTrail, context, now);
            trail.order_index = anchor_index.saturating_add(1);
            graph.trails.insert(trail.id, trail.clone());
            Ok(trail)
        })
    }

    pub fn create_area(&mut self, name: &str, icon: Option<&str>) -> StoreResult<Area> {
        let now = self.clock.tick();
        self.commit("create area", |graph| {
            let area = Area {
                id: AreaId::new(),
                name: name.to_string(),
                icon: non_empty(icon),
                order_index: to_index(graph.areas.len()),
                created_at: now,
                sequence: graph.next_sequence(),
            };
            graph.areas.insert(area.id, area.clone());
            Ok(area)
        })
    }

    pub fn create_folder(&mut self, name: &str, icon: Option<&str>) -> StoreResult<Folder> {
        let now = self.clock.tick();
        self.commit("create folder", |graph| {
            let folder = Folder {
                id: FolderId::new(),
                name: name.to_string(),
                icon: non_empty(icon),
                order_index: to_index(graph.folders.len()),
                created_at: now,
                sequence: graph.next_sequence(),
            };
            graph.folders.insert(folder.id, folder.clone());
            Ok(folder)
        })
    }

    /// Appends a page to `trail`. The title defaults to the URL; line breaks in
    /// it are flattened to spaces.
    /// 在路徑末端新增頁面；標題預設為網址。
    pub fn create_page(
        &mut self,
        trail: TrailId,
        url: &str,
        title: Option<&str>,
    ) -> StoreResult<Page> {
        if !is_absolute_url(url) {
            return Err(ValidationError::InvalidUrl(url.to_string()).into());
        }
        let now = self.clock.tick();
        self.commit("create page", |graph| {
            if !graph.trails.contains_key(&trail) {
                return Err(TrailStoreError::NotFound(EntityRef::Trail(trail)));
            }
            Ok(insert_page(graph, trail, url, title, now))
        })
    }

    /// Attaches a note to a trail. A trail holds at most one note.
    /// 為路徑附加筆記；每個路徑最多一則。
    pub fn create_note(&mut self, trail: TrailId, content: Option<&str>) -> StoreResult<Note> {
        let now = self.clock.tick();
        self.commit("create note", |graph| {
            if !graph.trails.contains_key(&trail) {
                return Err(TrailStoreError::NotFound(EntityRef::Trail(trail)));
            }
            if graph.note_for(trail).is_some() {
                return Err(ValidationError::NoteAlreadyExists(trail).into());
            }
            Ok(insert_note(graph, trail, content, now))
        })
    }

    /// Creates a `Note` kind trail and its note in one save.
    /// 一次建立筆記類型的路徑與其筆記。
    pub fn create_note_trail(
        &mut self,
        name: Option<&str>,
        content: Option<&str>,
        parent: ParentContext,
    ) -> StoreResult<(Trail, Note)> {
        let name = self.new_trail_name(name)?;
        let now = self.clock.tick();
        self.commit("create note trail", move |graph| {
            if let Some(missing) = graph.missing_context(&parent) {
                return Err(TrailStoreError::NotFound(missing));
            }
            let trail = insert_trail(graph, name, TrailKind::Note, parent, now);
            let note = insert_note(graph, trail.id, content, now);
            Ok((trail, note))
        })
    }

    /// Deletes a trail with its pages, note and descendant trails. Returns the
    /// number of removed records.
    pub fn delete_trail(&mut self, id: TrailId) -> StoreResult<usize> {
        self.delete(EntityRef::Trail(id), "delete trail")
    }

    pub fn delete_page(&mut self, id: PageId) -> StoreResult<usize> {
        self.delete(EntityRef::Page(id), "delete page")
    }

    /// Deletes an area and every trail grouped under it.
    pub fn delete_area(&mut self, id: AreaId) -> StoreResult<usize> {
        self.delete(EntityRef::Area(id), "delete area")
    }

    /// Deletes a folder and every trail grouped under it.
    pub fn delete_folder(&mut self, id: FolderId) -> StoreResult<usize> {
        self.delete(EntityRef::Folder(id), "delete folder")
    }

    pub fn delete_note(&mut self, id: NoteId) -> StoreResult<usize> {
        self.delete(EntityRef::Note(id), "delete note")
    }

    fn delete(&mut self, reference: EntityRef, operation: &'static str) -> StoreResult<usize> {
        self.commit(operation, |graph| {
            if !graph.contains(&reference) {
                return Err(TrailStoreError::NotFound(reference));
            }
            Ok(graph.remove(&reference))
        })
    }

    /// Deletes a mixed batch in one save. Every reference must resolve before
    /// the batch starts; ones already swept away by an earlier cascade in the
    /// same batch are skipped.
    /// 以單次儲存刪除多個實體。
    pub fn bulk_delete(&mut self, references: &[EntityRef]) -> StoreResult<usize> {
        self.commit("bulk delete", |graph| {
            if let Some(missing) = references.iter().find(|reference| !graph.contains(reference)) {
                return Err(TrailStoreError::NotFound(*missing));
            }
            Ok(references
                .iter()
                .map(|reference| graph.remove(reference))
                .sum())
        })
    }

    /// Applies the provided fields and bumps `updated_at`.
    /// 套用指定欄位並更新 `updated_at`。
    pub fn update_trail(&mut self, id: TrailId, update: TrailUpdate) -> StoreResult<Trail> {
        let name = match update.name {
            Some(name) if validate_trail_name(&name) => Some(name),
            Some(name) => match self.config.name_policy {
                NamePolicy::Fallback => {
                    debug!("ignoring invalid trail name {name:?}");
                    None
                }
                NamePolicy::Reject => return Err(ValidationError::InvalidName(name).into()),
            },
            None => None,
        };
        let now = self.clock.tick();
        self.commit("update trail", move |graph| {
            let trail = trail_mut(graph, id)?;
            if let Some(name) = name {
                trail.name = name;
            }
            if let Some(icon) = update.icon {
                trail.icon = non_empty(Some(icon.as_str()));
            }
            if let Some(collapsed) = update.is_collapsed {
                trail.is_collapsed = collapsed;
            }
            trail.updated_at = now;
            Ok(trail.clone())
        })
    }

    /// Applies the provided fields. Setting `is_active` here does not
    /// deactivate other pages; use [`TrailStore::set_active_page`] for that.
    /// Deactivating the selected page moves the selection to the earliest
    /// remaining active page, the same choice a reload makes.
    pub fn update_page(&mut self, id: PageId, update: PageUpdate) -> StoreResult<Page> {
        self.commit("update page", move |graph| {
            let page = page_mut(graph, id)?;
            if let Some(title) = update.title {
                page.title = single_line(&title);
            }
            if let Some(icon) = update.icon {
                page.icon = non_empty(Some(icon.as_str()));
            }
            if let Some(active) = update.is_active {
                page.is_active = active;
            }
            Ok(page.clone())
        })
    }

    pub fn update_note(&mut self, id: NoteId, content: &str) -> StoreResult<Note> {
        let now = self.clock.tick();
        self.commit("update note", |graph| {
            let note = graph
                .notes
                .get_mut(&id)
                .ok_or(TrailStoreError::NotFound(EntityRef::Note(id)))?;
            note.content = content.to_string();
            note.updated_at = now;
            Ok(note.clone())
        })
    }

    /// Reparents a trail and sets its `order_index` to `at_index` verbatim.
    /// Siblings at the source and destination are not renumbered.
    /// 移動路徑並直接設定其索引；來源與目的地的兄弟節點不會重新編號。
    pub fn move_trail(
        &mut self,
        id: TrailId,
        to: ParentContext,
        at_index: i32,
    ) -> StoreResult<Trail> {
        let now = self.clock.tick();
        self.commit("move trail", |graph| {
            if !graph.trails.contains_key(&id) {
                return Err(TrailStoreError::NotFound(EntityRef::Trail(id)));
            }
            if let Some(missing) = graph.missing_context(&to) {
                return Err(TrailStoreError::NotFound(missing));
            }
            if let ParentContext::Trail(target) = to {
                if graph.subtree(id).contains(&target) {
                    return Err(ValidationError::CyclicMove { trail: id, target }.into());
                }
            }
            let trail = trail_mut(graph, id)?;
            trail.parent = to;
            trail.order_index = at_index;
            trail.updated_at = now;
            Ok(trail.clone())
        })
    }

    /// Moves a page to another trail with `order_index = at_index`, without
    /// renumbering.
    pub fn move_page(&mut self, id: PageId, to_trail: TrailId, at_index: i32) -> StoreResult<Page> {
        self.commit("move page", |graph| {
            if !graph.trails.contains_key(&to_trail) {
                return Err(TrailStoreError::NotFound(EntityRef::Trail(to_trail)));
            }
            let page = page_mut(graph, id)?;
            page.trail = to_trail;
            page.order_index = at_index;
            Ok(page.clone())
        })
    }

    /// Makes `page` the single active page, or clears activity with `None`.
    /// 設定唯一的使用中頁面；傳入 `None` 則全部取消。
    pub fn set_active_page(&mut self, page: Option<PageId>) -> StoreResult<()> {
        self.commit("set active page", |graph| {
            if let Some(id) = page {
                if !graph.pages.contains_key(&id) {
                    return Err(TrailStoreError::NotFound(EntityRef::Page(id)));
                }
            }
            for candidate in graph.pages.values_mut() {
                candidate.is_active = page == Some(candidate.id);
            }
            graph.selected_page = page;
            Ok(())
        })
    }

    /// Flips `is_collapsed` and returns the new value.
    pub fn toggle_trail_collapsed(&mut self, id: TrailId) -> StoreResult<bool> {
        let now = self.clock.tick();
        self.commit("toggle trail collapsed", |graph| {
            let trail = trail_mut(graph, id)?;
            trail.is_collapsed = !trail.is_collapsed;
            trail.updated_at = now;
            Ok(trail.is_collapsed)
        })
    }

    /// Stores opaque renderer state for a page.
    pub fn save_page_snapshot(&mut self, id: PageId, snapshot: Option<Vec<u8>>) -> StoreResult<()> {
        self.commit("save page snapshot", |graph| {
            page_mut(graph, id)?.snapshot = snapshot;
            Ok(())
        })
    }

    pub fn page_snapshot(&self, id: PageId) -> Option<&[u8]> {
        self.graph
            .pages
            .get(&id)
            .and_then(|page| page.snapshot.as_deref())
    }

    /// Removes every entity in one save.
    /// 以單次儲存清除所有資料。
    pub fn clear_all(&mut self) -> StoreResult<()> {
        self.commit("clear all", |graph| {
            graph.clear();
            Ok(())
        })
    }

    /// Renders top-level trails (areas and folders are not included).
    /// 將頂層路徑匯出為 Markdown（不含區域與資料夾）。
    pub fn export_trails_to_markdown(&self) -> String {
        render_markdown(&self.graph, &self.config.export_title)
    }

    /// Writes the markdown export to `path` atomically.
    pub fn backup_to(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let markdown = self.export_trails_to_markdown();
        write_atomic(path, markdown.as_bytes()).map_err(|source| TrailStoreError::Persistence {
            operation: "backup",
            source: BackendError::Io {
                path: path.to_path_buf(),
                source,
            },
        })
    }

    /// Recreates the outline described by exported markdown as new top-level
    /// trails, in one save.
    /// 依匯出的 Markdown 重新建立路徑與頁面。
    pub fn import_markdown(&mut self, text: &str) -> StoreResult<ImportSummary> {
        let outline = parse_markdown(text)?;
        let names = outline
            .iter()
            .map(|node| self.new_trail_name(Some(&node.name)))
            .collect::<StoreResult<Vec<_>>>()?;
        let now = self.clock.tick();
        self.commit("import markdown", move |graph| {
            let mut summary = ImportSummary::default();
            let mut created: Vec<TrailId> = Vec::with_capacity(outline.len());
            for (node, name) in outline.into_iter().zip(names) {
                let (context, kind) = match node.parent {
                    Some(parent) => (ParentContext::Trail(created[parent]), TrailKind::SubTrail),
                    None => (ParentContext::TopLevel, TrailKind::Trail),
                };
                let trail = insert_trail(graph, name, kind, context, now);
                trail_mut(graph, trail.id)?.icon = node.icon;
                for page in &node.pages {
                    insert_page(graph, trail.id, &page.url, Some(page.title.as_str()), now);
                    summary.pages += 1;
                }
                if node.parent.is_none() {
                    summary.roots.push(trail.id);
                }
                summary.trails += 1;
                created.push(trail.id);
            }
            Ok(summary)
        })
    }

    /// Top-level trails (no parent trail, area or folder), in display order.
    pub fn trails(&self) -> Vec<&Trail> {
        self.snapshots
            .trails
            .iter()
            .filter_map(|id| self.graph.trails.get(id))
            .collect()
    }

    pub fn areas(&self) -> Vec<&Area> {
        self.snapshots
            .areas
            .iter()
            .filter_map(|id| self.graph.areas.get(id))
            .collect()
    }

    pub fn folders(&self) -> Vec<&Folder> {
        self.snapshots
            .folders
            .iter()
            .filter_map(|id| self.graph.folders.get(id))
            .collect()
    }

    pub fn trail(&self, id: TrailId) -> Option<&Trail> {
        self.graph.trails.get(&id)
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.graph.pages.get(&id)
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.graph.areas.get(&id)
    }

    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.graph.folders.get(&id)
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.graph.notes.get(&id)
    }

    pub fn note_for(&self, trail: TrailId) -> Option<&Note> {
        self.graph.note_for(trail)
    }

    pub fn child_trails(&self, id: TrailId) -> Vec<&Trail> {
        self.graph.siblings(&ParentContext::Trail(id))
    }

    pub fn pages_of(&self, id: TrailId) -> Vec<&Page> {
        self.graph.pages_of(id)
    }

    pub fn trails_in_area(&self, id: AreaId) -> Vec<&Trail> {
        self.graph.siblings(&ParentContext::Area(id))
    }

    pub fn trails_in_folder(&self, id: FolderId) -> Vec<&Trail> {
        self.graph.siblings(&ParentContext::Folder(id))
    }

    pub fn selected_page(&self) -> Option<&Page> {
        self.graph
            .selected_page
            .and_then(|id| self.graph.pages.get(&id))
    }

    pub fn active_pages(&self) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self
            .graph
            .pages
            .values()
            .filter(|page| page.is_active)
            .collect();
        pages.sort_by_key(|page| page.sequence);
        pages
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Resolves a serialised reference against the live graph.
    /// 依目前的實體集合解析參照。
    pub fn resolve(&self, reference: &EntityRef) -> StoreResult<EntityView<'_>> {
        let view = match reference {
            EntityRef::Trail(id) => self.graph.trails.get(id).map(EntityView::Trail),
            EntityRef::Page(id) => self.graph.pages.get(id).map(EntityView::Page),
            EntityRef::Area(id) => self.graph.areas.get(id).map(EntityView::Area),
            EntityRef::Folder(id) => self.graph.folders.get(id).map(EntityView::Folder),
            EntityRef::Note(id) => self.graph.notes.get(id).map(EntityView::Note),
        };
        view.ok_or_else(|| {
            warn!("stale reference {reference}");
            TrailStoreError::NotFound(*reference)
        })
    }
}

fn insert_trail(
    graph: &mut TrailGraph,
    name: String,
    kind: TrailKind,
    parent: ParentContext,
    now: DateTime<Utc>,
) -> Trail {
    let order_index = to_index(graph.siblings(&parent).len());
    let trail = Trail {
        id: TrailId::new(),
        name,
        kind,
        icon: None,
        order_index,
        is_collapsed: false,
        created_at: now,
        updated_at: now,
        parent,
        sequence: graph.next_sequence(),
    };
    graph.trails.insert(trail.id, trail.clone());
    trail
}

fn insert_note(
    graph: &mut TrailGraph,
    trail: TrailId,
    content: Option<&str>,
    now: DateTime<Utc>,
) -> Note {
    let note = Note {
        id: NoteId::new(),
        trail,
        content: content.unwrap_or_default().to_string(),
        created_at: now,
        updated_at: now,
    };
    graph.notes.insert(note.id, note.clone());
    note
}

fn insert_page(
    graph: &mut TrailGraph,
    trail: TrailId,
    url: &str,
    title: Option<&str>,
    now: DateTime<Utc>,
) -> Page {
    let order_index = to_index(graph.pages_of(trail).len());
    let page = Page {
        id: PageId::new(),
        trail,
        url: url.to_string(),
        title: single_line(title.unwrap_or(url)),
        icon: None,
        order_index,
        is_active: false,
        created_at: now,
        sequence: graph.next_sequence(),
        snapshot: None,
    };
    graph.pages.insert(page.id, page.clone());
    page
}

fn trail_mut(graph: &mut TrailGraph, id: TrailId) -> StoreResult<&mut Trail> {
    graph
        .trails
        .get_mut(&id)
        .ok_or(TrailStoreError::NotFound(EntityRef::Trail(id)))
}

fn page_mut(graph: &mut TrailGraph, id: PageId) -> StoreResult<&mut Page> {
    graph
        .pages
        .get_mut(&id)
        .ok_or(TrailStoreError::NotFound(EntityRef::Page(id)))
}

fn to_index(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|text| !text.is_empty()).map(single_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store() -> TrailStore<MemoryBackend> {
        TrailStore::open(MemoryBackend::new(), StoreConfig::default()).unwrap()
    }

    #[test]
    fn clock_never_repeats() {
        let mut clock = MonotonicClock::default();
        let future = Utc::now() + Duration::seconds(60);
        clock.observe(Some(future));
        let first = clock.tick();
        let second = clock.tick();
        assert!(first > future);
        assert!(second > first);
    }

    #[test]
    fn commit_failure_leaves_graph_untouched() {
        let mut store = store();
        let kept = store
            .create_trail(Some("Kept"), TrailKind::Trail, ParentContext::TopLevel)
            .unwrap();
        store.backend_mut().fail_next_saves(1);

        let err = store
            .update_trail(
                kept.id,
                TrailUpdate {
                    name: Some("Renamed".into()),
                    ..TrailUpdate::default()
                },
            )
            .unwrap_err();

        assert!(matches!(
            err,
            TrailStoreError::Persistence {
                operation: "update trail",
                ..
            }
        ));
        assert_eq!(store.trail(kept.id).unwrap().name, "Kept");
        assert_eq!(store.backend().save_count(), 1);
    }

    #[test]
    fn empty_icon_clears_existing_icon() {
        let mut store = store();
        let trail = store
            .create_trail(None, TrailKind::Trail, ParentContext::TopLevel)
            .unwrap();
        let with_icon = TrailUpdate {
            icon: Some("🌲".into()),
            ..TrailUpdate::default()
        };
        store.update_trail(trail.id, with_icon).unwrap();
        assert_eq!(store.trail(trail.id).unwrap().icon.as_deref(), Some("🌲"));

        let cleared = TrailUpdate {
            icon: Some(String::new()),
            ..TrailUpdate::default()
        };
        store.update_trail(trail.id, cleared).unwrap();
        assert!(store.trail(trail.id).unwrap().icon.is_none());
    }
}
