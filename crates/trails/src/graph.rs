use std::collections::{HashMap, HashSet};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::entity_ref::EntityRef;
use crate::model::{
    sibling_key, Area, AreaId, Folder, FolderId, Note, NoteId, Page, PageId, ParentContext, Trail,
    TrailId,
};

/// Current on-disk document format version.
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Persisted form of the whole entity set.
/// 整個實體集合的持久化格式。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrailDocument {
    pub format_version: u32,
    #[serde(default)]
    pub next_sequence: u64,
    #[serde(default)]
    pub trails: Vec<Trail>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub areas: Vec<Area>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_page: Option<PageId>,
}

impl Default for TrailDocument {
    fn default() -> Self {
        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            next_sequence: 0,
            trails: Vec::new(),
            pages: Vec::new(),
            areas: Vec::new(),
            folders: Vec::new(),
            notes: Vec::new(),
            selected_page: None,
        }
    }
}

/// Arena of entities keyed by id. Ownership is expressed by ids stored on the
/// child (`Trail::parent`, `Page::trail`, `Note::trail`), so cascades are a
/// reachability walk from the removed node.
/// 以識別碼為鍵的實體集合；擁有關係記錄在子節點上。
#[derive(Debug, Clone, Default)]
pub(crate) struct TrailGraph {
    pub(crate) trails: HashMap<TrailId, Trail>,
    pub(crate) pages: HashMap<PageId, Page>,
    pub(crate) areas: HashMap<AreaId, Area>,
    pub(crate) folders: HashMap<FolderId, Folder>,
    pub(crate) notes: HashMap<NoteId, Note>,
    /// Current selection; always an active page when set.
    pub(crate) selected_page: Option<PageId>,
    next_sequence: u64,
}

impl TrailGraph {
    pub(crate) fn from_document(document: TrailDocument) -> Self {
        let mut graph = Self {
            next_sequence: document.next_sequence,
            ..Self::default()
        };
        let mut highest = 0;
        for trail in document.trails {
            highest = highest.max(trail.sequence + 1);
            graph.trails.insert(trail.id, trail);
        }
        for page in document.pages {
            highest = highest.max(page.sequence + 1);
            graph.pages.insert(page.id, page);
        }
        for area in document.areas {
            highest = highest.max(area.sequence + 1);
            graph.areas.insert(area.id, area);
        }
        for folder in document.folders {
            highest = highest.max(folder.sequence + 1);
            graph.folders.insert(folder.id, folder);
        }
        for note in document.notes {
            graph.notes.insert(note.id, note);
        }
        graph.next_sequence = graph.next_sequence.max(highest);
        graph.repair_links();
        graph.selected_page = document.selected_page;
        graph.reconcile_selection();
        graph
    }

    /// Fixes links a hand-edited or partially written document may leave
    /// dangling: trails whose context is gone (or that only reach each other
    /// through a parent cycle) are lifted to top level, pages and notes of a
    /// missing trail are dropped, and only the oldest note per trail is kept.
    fn repair_links(&mut self) {
        let mut lifted: Vec<TrailId> = self
            .trails
            .values()
            .filter(|trail| self.missing_context(&trail.parent).is_some())
            .map(|trail| trail.id)
            .collect();
        lifted.sort_by_key(|id| self.trails[id].sequence);
        for id in lifted {
            warn!("trail {id} points at a missing parent, moving it to top level");
            if let Some(trail) = self.trails.get_mut(&id) {
                trail.parent = ParentContext::TopLevel;
            }
        }

        // Trails left unreached from any top-level or grouped root form cycles.
        loop {
            let mut reached = HashSet::new();
            for root in self
                .trails
                .values()
                .filter(|trail| !matches!(trail.parent, ParentContext::Trail(_)))
            {
                reached.extend(self.subtree(root.id));
            }
            let Some(id) = self
                .trails
                .values()
                .filter(|trail| !reached.contains(&trail.id))
                .min_by_key(|trail| trail.sequence)
                .map(|trail| trail.id)
            else {
                break;
            };
            warn!("trail {id} is part of a parent cycle, moving it to top level");
            if let Some(trail) = self.trails.get_mut(&id) {
                trail.parent = ParentContext::TopLevel;
            }
        }

        let trails = &self.trails;
        self.pages.retain(|id, page| {
            let kept = trails.contains_key(&page.trail);
            if !kept {
                warn!("dropping page {id} of missing trail {}", page.trail);
            }
            kept
        });

        let mut notes: Vec<&Note> = self.notes.values().collect();
        notes.sort_by_key(|note| (note.created_at, note.id));
        let mut owners = HashSet::new();
        let doomed: Vec<NoteId> = notes
            .into_iter()
            .filter(|note| !trails.contains_key(&note.trail) || !owners.insert(note.trail))
            .map(|note| note.id)
            .collect();
        for id in doomed {
            warn!("dropping note {id} without a trail of its own");
            self.notes.remove(&id);
        }
    }

    /// Serialises entities in creation order so documents diff cleanly.
    pub(crate) fn to_document(&self) -> TrailDocument {
        let mut trails: Vec<Trail> = self.trails.values().cloned().collect();
        trails.sort_by_key(|trail| trail.sequence);
        let mut pages: Vec<Page> = self.pages.values().cloned().collect();
        pages.sort_by_key(|page| page.sequence);
        let mut areas: Vec<Area> = self.areas.values().cloned().collect();
        areas.sort_by_key(|area| area.sequence);
        let mut folders: Vec<Folder> = self.folders.values().cloned().collect();
        folders.sort_by_key(|folder| folder.sequence);
        let mut notes: Vec<Note> = self.notes.values().cloned().collect();
        notes.sort_by_key(|note| (note.created_at, note.id));
        TrailDocument {
            format_version: DOCUMENT_FORMAT_VERSION,
            next_sequence: self.next_sequence,
            trails,
            pages,
            areas,
            folders,
            notes,
            selected_page: self.selected_page,
        }
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        let value = self.next_sequence;
        self.next_sequence += 1;
        value
    }

    pub(crate) fn contains(&self, reference: &EntityRef) -> bool {
        match reference {
            EntityRef::Trail(id) => self.trails.contains_key(id),
            EntityRef::Page(id) => self.pages.contains_key(id),
            EntityRef::Area(id) => self.areas.contains_key(id),
            EntityRef::Folder(id) => self.folders.contains_key(id),
            EntityRef::Note(id) => self.notes.contains_key(id),
        }
    }

    /// Returns the reference of a context that does not resolve, if any.
    pub(crate) fn missing_context(&self, context: &ParentContext) -> Option<EntityRef> {
        let reference = match context {
            ParentContext::TopLevel => return None,
            ParentContext::Trail(id) => EntityRef::Trail(*id),
            ParentContext::Area(id) => EntityRef::Area(*id),
            ParentContext::Folder(id) => EntityRef::Folder(*id),
        };
        (!self.contains(&reference)).then_some(reference)
    }

    /// Trails sharing a context, in display order.
    pub(crate) fn siblings(&self, context: &ParentContext) -> Vec<&Trail> {
        let mut siblings: Vec<&Trail> = self
            .trails
            .values()
            .filter(|trail| trail.parent == *context)
            .collect();
        siblings.sort_by_key(|trail| sibling_key(trail.order_index, trail.sequence));
        siblings
    }

    pub(crate) fn pages_of(&self, trail: TrailId) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self
            .pages
            .values()
            .filter(|page| page.trail == trail)
            .collect();
        pages.sort_by_key(|page| sibling_key(page.order_index, page.sequence));
        pages
    }

    pub(crate) fn note_for(&self, trail: TrailId) -> Option<&Note> {
        self.notes.values().find(|note| note.trail == trail)
    }

    pub(crate) fn sorted_areas(&self) -> Vec<&Area> {
        let mut areas: Vec<&Area> = self.areas.values().collect();
        areas.sort_by_key(|area| sibling_key(area.order_index, area.sequence));
        areas
    }

    pub(crate) fn sorted_folders(&self) -> Vec<&Folder> {
        let mut folders: Vec<&Folder> = self.folders.values().collect();
        folders.sort_by_key(|folder| sibling_key(folder.order_index, folder.sequence));
        folders
    }

    /// The trail itself plus every trail below it.
    pub(crate) fn subtree(&self, root: TrailId) -> HashSet<TrailId> {
        let mut reached = HashSet::new();
        let mut frontier = vec![root];
        while let Some(current) = frontier.pop() {
            if !reached.insert(current) {
                continue;
            }
            frontier.extend(
                self.trails
                    .values()
                    .filter(|trail| trail.parent == ParentContext::Trail(current))
                    .map(|trail| trail.id),
            );
        }
        reached
    }

    /// Removes a set of trails along with their pages and notes.
    fn remove_trails(&mut self, doomed: &HashSet<TrailId>) -> usize {
        let before = self.trails.len() + self.pages.len() + self.notes.len();
        self.trails.retain(|id, _| !doomed.contains(id));
        self.pages.retain(|_, page| !doomed.contains(&page.trail));
        self.notes.retain(|_, note| !doomed.contains(&note.trail));
        before - (self.trails.len() + self.pages.len() + self.notes.len())
    }

    /// Cascading removal of any entity. Returns the number of removed records.
    pub(crate) fn remove(&mut self, reference: &EntityRef) -> usize {
        match reference {
            EntityRef::Trail(id) => {
                if !self.trails.contains_key(id) {
                    return 0;
                }
                let doomed = self.subtree(*id);
                self.remove_trails(&doomed)
            }
            EntityRef::Page(id) => usize::from(self.pages.remove(id).is_some()),
            EntityRef::Note(id) => usize::from(self.notes.remove(id).is_some()),
            EntityRef::Area(id) => {
                if self.areas.remove(id).is_none() {
                    return 0;
                }
                1 + self.remove_grouped(ParentContext::Area(*id))
            }
            EntityRef::Folder(id) => {
                if self.folders.remove(id).is_none() {
                    return 0;
                }
                1 + self.remove_grouped(ParentContext::Folder(*id))
            }
        }
    }

    fn remove_grouped(&mut self, context: ParentContext) -> usize {
        let roots: Vec<TrailId> = self
            .trails
            .values()
            .filter(|trail| trail.parent == context)
            .map(|trail| trail.id)
            .collect();
        let mut doomed = HashSet::new();
        for root in roots {
            doomed.extend(self.subtree(root));
        }
        self.remove_trails(&doomed)
    }

    pub(crate) fn clear(&mut self) {
        self.trails.clear();
        self.pages.clear();
        self.areas.clear();
        self.folders.clear();
        self.notes.clear();
        self.selected_page = None;
    }

    /// Keeps the selection on an existing active page. A selection that was
    /// deleted or deactivated falls back to the earliest active page, if any.
    pub(crate) fn reconcile_selection(&mut self) {
        let still_active = self
            .selected_page
            .and_then(|id| self.pages.get(&id))
            .is_some_and(|page| page.is_active);
        if !still_active {
            self.selected_page = self
                .pages
                .values()
                .filter(|page| page.is_active)
                .min_by_key(|page| page.sequence)
                .map(|page| page.id);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.trails.is_empty()
            && self.pages.is_empty()
            && self.areas.is_empty()
            && self.folders.is_empty()
            && self.notes.is_empty()
    }

    pub(crate) fn latest_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let trails = self
            .trails
            .values()
            .flat_map(|trail| [trail.created_at, trail.updated_at]);
        let pages = self.pages.values().map(|page| page.created_at);
        let notes = self
            .notes
            .values()
            .flat_map(|note| [note.created_at, note.updated_at]);
        let groups = self
            .areas
            .values()
            .map(|area| area.created_at)
            .chain(self.folders.values().map(|folder| folder.created_at));
        trails.chain(pages).chain(notes).chain(groups).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrailKind;
    use chrono::Utc;

    fn trail(parent: ParentContext, sequence: u64) -> Trail {
        let now = Utc::now();
        Trail {
            id: TrailId::new(),
            name: format!("t{sequence}"),
            kind: TrailKind::Trail,
            icon: None,
            order_index: 0,
            is_collapsed: false,
            created_at: now,
            updated_at: now,
            parent,
            sequence,
        }
    }

    #[test]
    fn sequence_resumes_past_highest_loaded_entity() {
        let document = TrailDocument {
            next_sequence: 0,
            trails: vec![trail(ParentContext::TopLevel, 4)],
            ..TrailDocument::default()
        };
        let mut graph = TrailGraph::from_document(document);
        assert_eq!(graph.next_sequence(), 5);
        assert_eq!(graph.to_document().next_sequence, 6);
    }

    #[test]
    fn removing_area_takes_nested_trails() {
        let mut graph = TrailGraph::default();
        let area = Area {
            id: AreaId::new(),
            name: "Area".into(),
            icon: None,
            order_index: 0,
            created_at: Utc::now(),
            sequence: 0,
        };
        let grouped = trail(ParentContext::Area(area.id), 1);
        let nested = trail(ParentContext::Trail(grouped.id), 2);
        let outside = trail(ParentContext::TopLevel, 3);
        graph.areas.insert(area.id, area.clone());
        for entry in [grouped, nested, outside.clone()] {
            graph.trails.insert(entry.id, entry);
        }

        assert_eq!(graph.remove(&EntityRef::Area(area.id)), 3);
        assert_eq!(graph.trails.len(), 1);
        assert!(graph.trails.contains_key(&outside.id));
        assert_eq!(graph.remove(&EntityRef::Area(area.id)), 0);
    }

    #[test]
    fn parent_cycle_is_broken_at_oldest_trail() {
        let mut first = trail(ParentContext::TopLevel, 0);
        let second = trail(ParentContext::Trail(first.id), 1);
        first.parent = ParentContext::Trail(second.id);
        let document = TrailDocument {
            trails: vec![first.clone(), second.clone()],
            ..TrailDocument::default()
        };

        let graph = TrailGraph::from_document(document);
        assert_eq!(graph.trails[&first.id].parent, ParentContext::TopLevel);
        assert_eq!(graph.trails[&second.id].parent, ParentContext::Trail(first.id));
        assert_eq!(graph.subtree(first.id).len(), 2);
    }

    #[test]
    fn stored_selection_survives_when_still_active() {
        let now = Utc::now();
        let owner = trail(ParentContext::TopLevel, 0);
        let page = |sequence: u64| Page {
            id: PageId::new(),
            trail: owner.id,
            url: "https://example.com".into(),
            title: "Example".into(),
            icon: None,
            order_index: 0,
            is_active: true,
            created_at: now,
            sequence,
            snapshot: None,
        };
        let (older, newer) = (page(1), page(2));
        let document = TrailDocument {
            trails: vec![owner.clone()],
            pages: vec![older.clone(), newer.clone()],
            selected_page: Some(newer.id),
            ..TrailDocument::default()
        };
        let graph = TrailGraph::from_document(document.clone());
        assert_eq!(graph.selected_page, Some(newer.id));

        let stale = TrailDocument {
            selected_page: Some(PageId::new()),
            ..document
        };
        assert_eq!(TrailGraph::from_document(stale).selected_page, Some(older.id));
    }
}
