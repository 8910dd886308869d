//! Annotation storage for a single response.
//!
//! The set is kept sorted ascending by start offset and pairwise
//! non-overlapping. Inserting over existing annotations replaces them.

use std::fmt;
use std::ops::Range;

use crate::types::{Annotation, AnnotationId, AnnotationKind};

/// Max chars shown per entry in an annotation list preview.
pub const LIST_PREVIEW_CHARS: usize = 80;

/// The annotations made on one response.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    next_seq: u64,
    revision: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new annotation over `range`, replacing any it overlaps.
    ///
    /// Empty or reversed ranges are ignored. Bounds against the response
    /// text are the caller's responsibility.
    pub fn add(
        &mut self,
        kind: AnnotationKind,
        text: impl Into<String>,
        range: Range<usize>,
    ) -> Option<AnnotationId> {
        if range.start >= range.end {
            tracing::debug!(?range, "ignoring empty annotation range");
            return None;
        }

        let before = self.annotations.len();
        self.annotations.retain(|a| !a.overlaps(&range));
        let replaced = before - self.annotations.len();

        self.next_seq += 1;
        let id = AnnotationId::from_seq(self.next_seq);
        self.annotations.push(Annotation {
            id: id.clone(),
            kind,
            source_text: text.into(),
            start_offset: range.start,
            end_offset: range.end,
            created_at: self.next_seq,
        });
        self.annotations
            .sort_by_key(|a| (a.start_offset, a.created_at));
        self.revision += 1;

        tracing::debug!(annotation = %id, %kind, ?range, replaced, "annotation added");
        Some(id)
    }

    /// Remove the annotation with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &AnnotationId) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| &a.id != id);
        let removed = self.annotations.len() != before;
        if removed {
            self.revision += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.annotations.is_empty() {
            self.annotations.clear();
            self.revision += 1;
        }
    }

    /// Annotations sorted ascending by start offset.
    pub fn as_slice(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn get(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| &a.id == id)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn has_annotations(&self) -> bool {
        !self.is_empty()
    }

    /// Annotations of one kind, in store order.
    pub fn by_kind(&self, kind: AnnotationKind) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.kind == kind)
    }

    pub fn count(&self, kind: AnnotationKind) -> usize {
        self.by_kind(kind).count()
    }

    pub fn counts(&self) -> KindCounts {
        KindCounts::from_annotations(&self.annotations)
    }

    /// First annotation intersecting `range`.
    pub fn find_overlapping(&self, range: &Range<usize>) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.overlaps(range))
    }

    /// Changes on every mutation. Used to detect stale derived views.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Number of annotations per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub keep: usize,
    pub drop: usize,
    pub explore_deeper: usize,
    pub verify: usize,
}

impl KindCounts {
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        let mut counts = Self::default();
        for a in annotations {
            match a.kind {
                AnnotationKind::Keep => counts.keep += 1,
                AnnotationKind::Drop => counts.drop += 1,
                AnnotationKind::ExploreDeeper => counts.explore_deeper += 1,
                AnnotationKind::Verify => counts.verify += 1,
            }
        }
        counts
    }

    pub fn get(&self, kind: AnnotationKind) -> usize {
        match kind {
            AnnotationKind::Keep => self.keep,
            AnnotationKind::Drop => self.drop,
            AnnotationKind::ExploreDeeper => self.explore_deeper,
            AnnotationKind::Verify => self.verify,
        }
    }

    pub fn total(&self) -> usize {
        self.keep + self.drop + self.explore_deeper + self.verify
    }
}

/// Summary like `2 keep, 1 verify`. Kinds with no annotations are omitted.
impl fmt::Display for KindCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in AnnotationKind::ALL {
            let n = self.get(kind);
            if n == 0 {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", n, kind.label())?;
            first = false;
        }
        Ok(())
    }
}

/// Shorten annotation text for a list entry.
pub fn list_preview(text: &str) -> String {
    crate::format::truncate_quote(text, LIST_PREVIEW_CHARS).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(store: &AnnotationStore) {
        let anns = store.as_slice();
        for pair in anns.windows(2) {
            assert!(pair[0].start_offset <= pair[1].start_offset, "sorted");
            assert!(pair[0].end_offset <= pair[1].start_offset, "non-overlapping");
        }
        for a in anns {
            assert!(a.start_offset < a.end_offset);
        }
    }

    #[test]
    fn test_add_keeps_sorted() {
        let mut store = AnnotationStore::new();
        store.add(AnnotationKind::Keep, "c", 20..25);
        store.add(AnnotationKind::Drop, "a", 0..4);
        store.add(AnnotationKind::Verify, "b", 10..12);
        let starts: Vec<_> = store.iter().map(|a| a.start_offset).collect();
        assert_eq!(starts, vec![0, 10, 20]);
        assert_invariants(&store);
    }

    #[test]
    fn test_add_replaces_every_overlap() {
        let mut store = AnnotationStore::new();
        store.add(AnnotationKind::Keep, "one", 0..5);
        store.add(AnnotationKind::Keep, "two", 6..10);
        store.add(AnnotationKind::Keep, "three", 12..20);
        store.add(AnnotationKind::Keep, "four", 30..35);
        assert_eq!(store.len(), 4);

        // Overlaps "two" and "three" (N = 2): size changes by 1 - 2.
        let id = store.add(AnnotationKind::Drop, "wide", 8..14).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(&id).unwrap().kind, AnnotationKind::Drop);
        let texts: Vec<_> = store.iter().map(|a| a.source_text.as_str()).collect();
        assert_eq!(texts, vec!["one", "wide", "four"]);
        assert_invariants(&store);
    }

    #[test]
    fn test_touching_ranges_coexist() {
        let mut store = AnnotationStore::new();
        store.add(AnnotationKind::Keep, "ab", 0..2);
        store.add(AnnotationKind::Drop, "cd", 2..4);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_identical_range_replaces() {
        let mut store = AnnotationStore::new();
        let first = store.add(AnnotationKind::Keep, "x", 3..9).unwrap();
        let second = store.add(AnnotationKind::Verify, "x", 3..9).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert!(store.get(&first).is_none());
    }

    #[test]
    fn test_empty_range_is_noop() {
        let mut store = AnnotationStore::new();
        assert!(store.add(AnnotationKind::Keep, "", 4..4).is_none());
        assert_eq!(store.revision(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = AnnotationStore::new();
        let a = store.add(AnnotationKind::Keep, "a", 0..1).unwrap();
        store.add(AnnotationKind::Drop, "b", 2..3);
        assert!(store.remove(&a));
        assert!(!store.remove(&a));
        assert_eq!(store.len(), 1);
        let rev = store.revision();
        store.clear();
        assert!(!store.has_annotations());
        assert_eq!(store.revision(), rev + 1);
        store.clear();
        assert_eq!(store.revision(), rev + 1);
    }

    #[test]
    fn test_kind_views() {
        let mut store = AnnotationStore::new();
        store.add(AnnotationKind::Keep, "a", 0..1);
        store.add(AnnotationKind::Keep, "b", 2..3);
        store.add(AnnotationKind::Verify, "c", 4..5);
        assert_eq!(store.count(AnnotationKind::Keep), 2);
        assert_eq!(store.count(AnnotationKind::Drop), 0);
        assert_eq!(store.counts().total(), 3);
        assert_eq!(store.counts().to_string(), "2 keep, 1 verify");
        assert_eq!(
            store.find_overlapping(&(4..9)).map(|a| a.source_text.as_str()),
            Some("c")
        );
        assert!(store.find_overlapping(&(5..9)).is_none());
    }

    #[test]
    fn test_list_preview() {
        assert_eq!(list_preview("short"), "short");
        let long = "word ".repeat(30);
        let preview = list_preview(&long);
        assert!(preview.ends_with("..."));
        assert!(preview.chars().count() <= LIST_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_random_adds_hold_invariants() {
        // Deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x5eed;
        let mut next = |bound: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) as usize) % bound
        };
        let mut store = AnnotationStore::new();
        for _ in 0..500 {
            let start = next(200);
            let end = start + 1 + next(20);
            let overlapping = store.iter().filter(|a| a.overlaps(&(start..end))).count();
            let before = store.len();
            store.add(AnnotationKind::ALL[next(4)], "t", start..end);
            assert_eq!(store.len() as isize, before as isize + 1 - overlapping as isize);
            assert_invariants(&store);
        }
    }
}
