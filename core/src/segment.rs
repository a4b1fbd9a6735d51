//! Segments produced by the converter.
//!
//! A `Segment` is one phonetic unit of the composition together with its
//! ranked candidates. `Segments` is the whole ordered sequence: a prefix of
//! history segments (immutable past context) followed by the conversion
//! segments under active editing.

use crate::candidate::Candidate;
use serde::{Deserialize, Serialize};

/// Role of a segment inside `Segments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentType {
    /// Boundary and value may still change.
    #[default]
    Free,
    /// The user fixed the value of this segment.
    FixedValue,
    /// Already committed; kept as context for the converter.
    History,
}

/// One phonetic unit with its ranked candidates.
///
/// Candidate ids: `0..candidates_size()` address regular candidates in
/// ranking order, `-1..=-meta_candidates_size()` address meta-candidates
/// (transliterations), `-1` being the first one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Segment {
    key: String,
    segment_type: SegmentType,
    candidates: Vec<Candidate>,
    meta_candidates: Vec<Candidate>,
}

impl Segment {
    pub fn new<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Build a free segment from a key and a list of values.
    pub fn with_values<K: Into<String>>(key: K, values: &[&str]) -> Self {
        let mut segment = Self::new(key);
        for value in values {
            segment.push_candidate(Candidate::new(segment.key.clone(), *value));
        }
        segment
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key length in chars.
    pub fn key_len(&self) -> usize {
        self.key.chars().count()
    }

    pub fn segment_type(&self) -> SegmentType {
        self.segment_type
    }

    pub fn set_segment_type(&mut self, segment_type: SegmentType) {
        self.segment_type = segment_type;
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidates_size(&self) -> usize {
        self.candidates.len()
    }

    pub fn meta_candidates(&self) -> &[Candidate] {
        &self.meta_candidates
    }

    pub fn meta_candidates_size(&self) -> usize {
        self.meta_candidates.len()
    }

    pub fn set_meta_candidates(&mut self, meta_candidates: Vec<Candidate>) {
        self.meta_candidates = meta_candidates;
    }

    pub fn push_candidate(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    /// Insert `candidates` in front of the existing ones, keeping their order.
    pub fn push_front_candidates<I: IntoIterator<Item = Candidate>>(&mut self, candidates: I) {
        let mut merged: Vec<Candidate> = candidates.into_iter().collect();
        merged.append(&mut self.candidates);
        self.candidates = merged;
    }

    pub fn is_valid_index(&self, id: i32) -> bool {
        self.candidate(id).is_some()
    }

    /// Resolve a candidate id (negative ids are meta-candidates).
    pub fn candidate(&self, id: i32) -> Option<&Candidate> {
        if id >= 0 {
            self.candidates.get(id as usize)
        } else {
            self.meta_candidates.get(meta_index(id))
        }
    }

    /// Whether the segment has produced any result at all.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.meta_candidates.is_empty()
    }
}

/// Meta-candidate slot for a negative id (`-1` → `0`).
pub(crate) fn meta_index(id: i32) -> usize {
    debug_assert!(id < 0);
    (-(id as i64) - 1) as usize
}

/// Candidate id of the meta-candidate in slot `index`.
pub(crate) fn meta_id(index: usize) -> i32 {
    -(index as i32) - 1
}

/// The full segment sequence: history prefix followed by conversion segments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Segments {
    segments: Vec<Segment>,
}

impl Segments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn push_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn segments_size(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Number of leading history segments.
    pub fn history_segments_size(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| s.segment_type == SegmentType::History)
            .count()
    }

    pub fn history_segments(&self) -> &[Segment] {
        &self.segments[..self.history_segments_size()]
    }

    pub fn conversion_segments(&self) -> &[Segment] {
        &self.segments[self.history_segments_size()..]
    }

    pub fn conversion_segments_size(&self) -> usize {
        self.segments.len() - self.history_segments_size()
    }

    pub fn conversion_segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(self.history_segments_size() + index)
    }

    pub fn conversion_segment_mut(&mut self, index: usize) -> Option<&mut Segment> {
        let offset = self.history_segments_size();
        self.segments.get_mut(offset + index)
    }

    /// Concatenated keys of all conversion segments.
    pub fn conversion_key(&self) -> String {
        self.conversion_segments().iter().map(|s| s.key()).collect()
    }

    /// Turn the first `count` conversion segments into history segments.
    pub fn mark_as_history(&mut self, count: usize) {
        let offset = self.history_segments_size();
        for segment in self.segments.iter_mut().skip(offset).take(count) {
            segment.segment_type = SegmentType::History;
        }
    }

    pub fn clear_conversion_segments(&mut self) {
        let history = self.history_segments_size();
        self.segments.truncate(history);
    }

    pub fn clear_history_segments(&mut self) {
        let history = self.history_segments_size();
        self.segments.drain(..history);
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(key: &str, value: &str) -> Segment {
        let mut s = Segment::with_values(key, &[value]);
        s.set_segment_type(SegmentType::History);
        s
    }

    #[test]
    fn test_candidate_ids() {
        let mut seg = Segment::with_values("きょうと", &["京都", "今日と"]);
        seg.set_meta_candidates(vec![Candidate::new("きょうと", "きょうと"), Candidate::new("きょうと", "キョウト")]);
        assert_eq!(seg.candidate(0).unwrap().value, "京都");
        assert_eq!(seg.candidate(-1).unwrap().value, "きょうと");
        assert_eq!(seg.candidate(-2).unwrap().value, "キョウト");
        assert!(seg.candidate(2).is_none());
        assert!(seg.candidate(-3).is_none());
        assert_eq!(meta_id(0), -1);
        assert_eq!(meta_index(-2), 1);
    }

    #[test]
    fn test_push_front_candidates() {
        let mut seg = Segment::with_values("a", &["x", "y"]);
        seg.push_front_candidates(vec![Candidate::new("a", "s1"), Candidate::new("a", "x")]);
        let values: Vec<_> = seg.candidates().iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["s1", "x", "x", "y"]);
    }

    #[test]
    fn test_history_and_conversion_ranges() {
        let mut segments = Segments::new();
        segments.push_segment(history("わたし", "私"));
        segments.push_segment(Segment::with_values("の", &["の"]));
        segments.push_segment(Segment::with_values("なまえ", &["名前"]));

        assert_eq!(segments.history_segments_size(), 1);
        assert_eq!(segments.conversion_segments_size(), 2);
        assert_eq!(segments.conversion_segment(0).unwrap().key(), "の");
        assert_eq!(segments.conversion_key(), "のなまえ");

        segments.mark_as_history(1);
        assert_eq!(segments.history_segments_size(), 2);
        assert_eq!(segments.conversion_segments_size(), 1);

        segments.clear_conversion_segments();
        assert_eq!(segments.segments_size(), 2);
        segments.clear_history_segments();
        assert_eq!(segments.segments_size(), 0);
    }
}
