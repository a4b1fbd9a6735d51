//! Recursive candidate list with paging, focus tracking and deduplication.
//!
//! A `CandidateList` is a navigable view over the candidates of one
//! `Segment`. Each entry is either a leaf referencing a candidate by id
//! (negative ids are meta-candidates) or a nested sub-list, such as the
//! transliteration group shown as a single menu row.
//!
//! All levels live in one arena owned by the root. Leaves store plain ids, so
//! resolving what an id means is a single lookup in the owning `Segment` and
//! a rebuilt list never holds stale references.

use crate::transliteration::T13nAttributes;
use ahash::AHashMap;
use std::ops::Range;

const DEFAULT_PAGE_SIZE: usize = 9;
const ROOT: usize = 0;

/// Handle to a nested level inside a `CandidateList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubListId(usize);

/// One row of a candidate list level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Candidate {
        id: i32,
        value: String,
        attributes: T13nAttributes,
    },
    SubList(SubListId),
}

impl Entry {
    pub fn is_sub_list(&self) -> bool {
        matches!(self, Entry::SubList(_))
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    rotate: bool,
    focused_index: usize,
    entries: Vec<Entry>,
    /// value → entry index, for per-level dedup
    values: AHashMap<String, usize>,
    /// (parent node, entry index in parent)
    parent: Option<(usize, usize)>,
}

impl Node {
    fn new(rotate: bool, parent: Option<(usize, usize)>) -> Self {
        Self {
            name: String::new(),
            rotate,
            focused_index: 0,
            entries: Vec::new(),
            values: AHashMap::new(),
            parent,
        }
    }
}

/// A recursive, paged candidate list.
#[derive(Debug, Clone)]
pub struct CandidateList {
    nodes: Vec<Node>,
    page_size: usize,
    focused: bool,
    next_available_id: i32,
    /// id → (node, entry index) for every leaf in the tree
    locations: AHashMap<i32, (usize, usize)>,
    /// id skipped by dedup → id of the entry that holds its value
    alternative_ids: AHashMap<i32, i32>,
}

impl CandidateList {
    /// Create an empty, rotating root list.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            nodes: vec![Node::new(true, None)],
            page_size: page_size.max(1),
            focused: false,
            next_available_id: 0,
            locations: AHashMap::new(),
            alternative_ids: AHashMap::new(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    pub fn name(&self) -> &str {
        &self.nodes[ROOT].name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.nodes[ROOT].name = name.into();
    }

    pub fn set_rotate(&mut self, rotate: bool) {
        self.nodes[ROOT].rotate = rotate;
    }

    /// Whether any entry is focused.
    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// First regular candidate id not yet scanned into this list.
    pub fn next_available_id(&self) -> i32 {
        self.next_available_id
    }

    /// Number of rows at the root level.
    pub fn size(&self) -> usize {
        self.nodes[ROOT].entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn last_index(&self) -> Option<usize> {
        self.size().checked_sub(1)
    }

    pub fn focused_index(&self) -> usize {
        self.nodes[ROOT].focused_index
    }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.nodes[ROOT].entries.get(index)
    }

    pub fn focused_entry(&self) -> Option<&Entry> {
        self.entry(self.focused_index())
    }

    /// Read-only view of the root level.
    pub fn root(&self) -> ListView<'_> {
        ListView { list: self, node: ROOT }
    }

    /// Read-only view of a nested level.
    pub fn sub_list(&self, id: SubListId) -> Option<ListView<'_>> {
        (id.0 < self.nodes.len()).then_some(ListView { list: self, node: id.0 })
    }

    /// Id of the deepest focused candidate.
    pub fn focused_id(&self) -> Option<i32> {
        if self.is_empty() {
            return None;
        }
        self.root().focused_id()
    }

    /// Total number of leaves in the whole tree.
    pub fn leaf_count(&self) -> usize {
        self.locations.len()
    }

    /// Display attributes recorded for a candidate id.
    pub fn attributes_of(&self, id: i32) -> Option<T13nAttributes> {
        let id = self.resolve_id(id)?;
        let (node, index) = *self.locations.get(&id)?;
        match &self.nodes[node].entries[index] {
            Entry::Candidate { attributes, .. } => Some(*attributes),
            Entry::SubList(_) => None,
        }
    }

    /// Remove every entry and reset focus and the scan cursor.
    pub fn clear(&mut self) {
        let root = &mut self.nodes[ROOT];
        let name = std::mem::take(&mut root.name);
        let rotate = root.rotate;
        self.nodes.clear();
        let mut root = Node::new(rotate, None);
        root.name = name;
        self.nodes.push(root);
        self.focused = false;
        self.next_available_id = 0;
        self.locations.clear();
        self.alternative_ids.clear();
    }

    // ========== Building ==========

    /// Append a candidate unless its value is already present at the root level.
    pub fn add_candidate(&mut self, id: i32, value: &str) -> bool {
        self.add_to(ROOT, id, value, T13nAttributes::empty())
    }

    pub fn add_candidate_with_attributes(&mut self, id: i32, value: &str, attributes: T13nAttributes) -> bool {
        self.add_to(ROOT, id, value, attributes)
    }

    /// Append a nested group as the next root row and return a builder for it.
    pub fn add_sub_candidate_list(&mut self) -> CandidateListMut<'_> {
        let node = self.allocate_sub_list(ROOT);
        CandidateListMut { list: self, node }
    }

    fn allocate_sub_list(&mut self, parent: usize) -> usize {
        let node = self.nodes.len();
        let entry_index = self.nodes[parent].entries.len();
        self.nodes.push(Node::new(false, Some((parent, entry_index))));
        self.nodes[parent].entries.push(Entry::SubList(SubListId(node)));
        node
    }

    fn add_to(&mut self, node: usize, id: i32, value: &str, attributes: T13nAttributes) -> bool {
        if self.locations.contains_key(&id) || self.alternative_ids.contains_key(&id) {
            tracing::error!(id, "candidate id added twice to one candidate list");
            return false;
        }
        if id >= self.next_available_id {
            self.next_available_id = id.saturating_add(1);
        }
        if value.is_empty() {
            return false;
        }

        if let Some(&index) = self.nodes[node].values.get(value) {
            self.merge_duplicate(node, index, id, attributes);
            return false;
        }

        let index = self.nodes[node].entries.len();
        self.nodes[node].entries.push(Entry::Candidate {
            id,
            value: value.to_string(),
            attributes,
        });
        self.nodes[node].values.insert(value.to_string(), index);
        self.locations.insert(id, (node, index));
        true
    }

    /// Fold a duplicate value into the entry that already holds it.
    fn merge_duplicate(&mut self, node: usize, index: usize, id: i32, attributes: T13nAttributes) {
        let Entry::Candidate {
            id: existing_id,
            attributes: existing_attributes,
            ..
        } = &mut self.nodes[node].entries[index]
        else {
            return;
        };
        *existing_attributes |= attributes;

        let previous = *existing_id;
        if id >= 0 && previous < 0 {
            // A regular candidate takes over the row of a meta-candidate.
            *existing_id = id;
            self.locations.remove(&previous);
            self.locations.insert(id, (node, index));
            self.alternative_ids.insert(previous, id);
            for target in self.alternative_ids.values_mut() {
                if *target == previous {
                    *target = id;
                }
            }
        } else {
            self.alternative_ids.insert(id, previous);
        }
    }

    fn resolve_id(&self, id: i32) -> Option<i32> {
        if self.locations.contains_key(&id) {
            Some(id)
        } else {
            self.alternative_ids.get(&id).copied()
        }
    }

    // ========== Navigation ==========

    /// Focus the entry holding `id` (or a value deduplicated from it).
    pub fn move_to_id(&mut self, id: i32) -> bool {
        let Some(id) = self.resolve_id(id) else {
            return false;
        };
        let Some(&(node, index)) = self.locations.get(&id) else {
            return false;
        };
        self.focus_path(node, index);
        true
    }

    fn focus_path(&mut self, mut node: usize, mut index: usize) {
        loop {
            self.nodes[node].focused_index = index;
            match self.nodes[node].parent {
                Some((parent, parent_index)) => {
                    node = parent;
                    index = parent_index;
                }
                None => break,
            }
        }
        self.focused = true;
    }

    /// Focus the `index`-th row of the current page.
    pub fn move_to_page_index(&mut self, index: usize) -> bool {
        let (begin, end) = self.get_page_range(self.focused_index());
        let Some(target) = begin.checked_add(index) else {
            return false;
        };
        if target >= end {
            return false;
        }
        self.nodes[ROOT].focused_index = target;
        self.focused = true;
        true
    }

    pub fn move_next(&mut self) -> bool {
        let size = self.size();
        if size == 0 {
            return false;
        }
        let root = &mut self.nodes[ROOT];
        if root.focused_index + 1 < size {
            root.focused_index += 1;
        } else if root.rotate {
            root.focused_index = 0;
        } else {
            return false;
        }
        self.focused = true;
        true
    }

    pub fn move_prev(&mut self) -> bool {
        let size = self.size();
        if size == 0 {
            return false;
        }
        let root = &mut self.nodes[ROOT];
        if root.focused_index > 0 {
            root.focused_index -= 1;
        } else if root.rotate {
            root.focused_index = size - 1;
        } else {
            return false;
        }
        self.focused = true;
        true
    }

    /// Focus the first row of the next page; no-op on the last page.
    pub fn move_next_page(&mut self) -> bool {
        let (_, end) = self.get_page_range(self.focused_index());
        if end >= self.size() {
            return false;
        }
        self.nodes[ROOT].focused_index = end;
        self.focused = true;
        true
    }

    /// Focus the first row of the previous page; no-op on the first page.
    pub fn move_prev_page(&mut self) -> bool {
        let (begin, _) = self.get_page_range(self.focused_index());
        if begin == 0 {
            return false;
        }
        self.nodes[ROOT].focused_index = begin - self.page_size;
        self.focused = true;
        true
    }

    /// Focus the first leaf (depth-first) whose attributes contain `mask`.
    pub fn move_to_attributes(&mut self, mask: T13nAttributes) -> bool {
        if mask.is_empty() {
            return false;
        }
        let found = self
            .flatten_leaves()
            .into_iter()
            .find(|(_, attributes)| attributes.contains(mask));
        match found {
            Some((id, _)) => self.move_to_id(id),
            None => false,
        }
    }

    /// Focus the next leaf after the focused one whose attributes contain
    /// `mask`, wrapping around once.
    pub fn move_next_attributes(&mut self, mask: T13nAttributes) -> bool {
        if mask.is_empty() {
            return false;
        }
        let leaves = self.flatten_leaves();
        if leaves.is_empty() {
            return false;
        }
        let current = self
            .focused_id()
            .filter(|_| self.focused)
            .and_then(|id| leaves.iter().position(|(leaf, _)| *leaf == id));
        let start = current.map_or(0, |pos| pos + 1);
        let found = (0..leaves.len())
            .map(|offset| &leaves[(start + offset) % leaves.len()])
            .find(|(_, attributes)| attributes.contains(mask))
            .map(|(id, _)| *id);
        match found {
            Some(id) => self.move_to_id(id),
            None => false,
        }
    }

    /// Depth-first (id, attributes) of every leaf.
    fn flatten_leaves(&self) -> Vec<(i32, T13nAttributes)> {
        let mut out = Vec::with_capacity(self.locations.len());
        self.collect_leaves(ROOT, &mut out);
        out
    }

    fn collect_leaves(&self, node: usize, out: &mut Vec<(i32, T13nAttributes)>) {
        for entry in &self.nodes[node].entries {
            match entry {
                Entry::Candidate { id, attributes, .. } => out.push((*id, *attributes)),
                Entry::SubList(sub) => self.collect_leaves(sub.0, out),
            }
        }
    }

    // ========== Paging ==========

    /// Half-open page `[begin, end)` containing `focused_index` at the root level.
    pub fn get_page_range(&self, focused_index: usize) -> (usize, usize) {
        self.root().get_page_range(focused_index)
    }

    pub fn page_range(&self) -> Range<usize> {
        let (begin, end) = self.get_page_range(self.focused_index());
        begin..end
    }
}

impl Default for CandidateList {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a nested level, returned by `add_sub_candidate_list`.
pub struct CandidateListMut<'a> {
    list: &'a mut CandidateList,
    node: usize,
}

impl CandidateListMut<'_> {
    pub fn id(&self) -> SubListId {
        SubListId(self.node)
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.list.nodes[self.node].name = name.into();
        self
    }

    pub fn set_rotate(&mut self, rotate: bool) -> &mut Self {
        self.list.nodes[self.node].rotate = rotate;
        self
    }

    pub fn add_candidate(&mut self, id: i32, value: &str) -> bool {
        self.list.add_to(self.node, id, value, T13nAttributes::empty())
    }

    pub fn add_candidate_with_attributes(&mut self, id: i32, value: &str, attributes: T13nAttributes) -> bool {
        self.list.add_to(self.node, id, value, attributes)
    }

    pub fn add_sub_candidate_list(&mut self) -> CandidateListMut<'_> {
        let node = self.list.allocate_sub_list(self.node);
        CandidateListMut { list: &mut *self.list, node }
    }

    pub fn size(&self) -> usize {
        self.list.nodes[self.node].entries.len()
    }
}

/// Read-only view of one level of a `CandidateList`.
#[derive(Debug, Clone, Copy)]
pub struct ListView<'a> {
    list: &'a CandidateList,
    node: usize,
}

impl<'a> ListView<'a> {
    pub fn name(&self) -> &'a str {
        &self.list.nodes[self.node].name
    }

    pub fn size(&self) -> usize {
        self.list.nodes[self.node].entries.len()
    }

    pub fn entries(&self) -> &'a [Entry] {
        &self.list.nodes[self.node].entries
    }

    pub fn entry(&self, index: usize) -> Option<&'a Entry> {
        self.entries().get(index)
    }

    pub fn focused_index(&self) -> usize {
        self.list.nodes[self.node].focused_index
    }

    pub fn focused_entry(&self) -> Option<&'a Entry> {
        self.entry(self.focused_index())
    }

    pub fn sub_list(&self, id: SubListId) -> Option<ListView<'a>> {
        self.list.sub_list(id)
    }

    /// Id shown for a row: the candidate id, or the focused id of a sub-list.
    pub fn entry_id(&self, entry: &Entry) -> Option<i32> {
        match entry {
            Entry::Candidate { id, .. } => Some(*id),
            Entry::SubList(sub) => self.sub_list(*sub)?.focused_id(),
        }
    }

    /// Id of the deepest focused candidate below this level.
    pub fn focused_id(&self) -> Option<i32> {
        self.entry_id(self.focused_entry()?)
    }

    pub fn get_page_range(&self, focused_index: usize) -> (usize, usize) {
        let size = self.size();
        if size == 0 {
            return (0, 0);
        }
        let page_size = self.list.page_size;
        let index = focused_index.min(size - 1);
        let begin = index - index % page_size;
        (begin, (begin + page_size).min(size))
    }
}
