// core/src/converter.rs
//
// The converter seam: the phonetic-to-text decoding engine the session drives.
// Dictionary lookup and lattice scoring live behind this trait.

use crate::segment::{Segment, Segments};

/// What kind of result the session asks the converter for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// Segmented conversion of the whole key.
    Conversion,
    /// Short, cheap suggestion list shown while typing.
    Suggestion,
    /// Full prediction list.
    Prediction,
    /// Suggestion for the part of the key before the cursor.
    PartialSuggestion,
    /// Prediction for the part of the key before the cursor.
    PartialPrediction,
}

/// A request for a fresh set of conversion segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub request_type: RequestType,
    /// Phonetic key to convert.
    pub key: String,
    /// History segments to use as left context.
    pub history: Vec<Segment>,
    /// When false the converter must neither read nor update user history.
    pub enable_user_history: bool,
}

impl ConversionRequest {
    pub fn new<K: Into<String>>(request_type: RequestType, key: K) -> Self {
        Self {
            request_type,
            key: key.into(),
            history: Vec::new(),
            enable_user_history: true,
        }
    }

    pub fn with_history(mut self, segments: &Segments) -> Self {
        self.history = segments.history_segments().to_vec();
        self
    }

    pub fn without_user_history(mut self) -> Self {
        self.enable_user_history = false;
        self
    }

    pub fn is_partial(&self) -> bool {
        matches!(
            self.request_type,
            RequestType::PartialSuggestion | RequestType::PartialPrediction
        )
    }
}

/// Trait that conversion engines implement to be driven by a `ConversionSession`.
///
/// Calls are synchronous and may fail by returning `None`/`false`. A failing
/// call must leave `segments` untouched. Candidate order is owned by the
/// converter: `commit_segment` and `focus_segment` mark segments but must not
/// reorder candidates; selections are tracked by candidate id.
///
/// Methods take `&self`; implementations that learn keep their state behind
/// interior mutability (`RefCell`, `Mutex`, ...).
pub trait Converter {
    /// Convert `request.key`; the returned segments start with `request.history`.
    fn start_conversion(&self, request: &ConversionRequest) -> Option<Segments>;

    /// Suggest or predict for `request.key`; the result has one conversion segment.
    fn start_prediction(&self, request: &ConversionRequest) -> Option<Segments>;

    /// Grow (`delta > 0`) or shrink the key of conversion segment `index`,
    /// resegmenting everything after it.
    fn resize_segment(&self, segments: &mut Segments, index: usize, delta: i32) -> bool;

    /// Fix conversion segment `index` to `candidate_id`.
    fn commit_segment(&self, segments: &mut Segments, index: usize, candidate_id: i32) -> bool;

    /// Commit the first `candidate_ids.len()` conversion segments; on success
    /// they become history segments.
    fn commit_segments(&self, segments: &mut Segments, candidate_ids: &[i32]) -> bool;

    /// Tell the converter `candidate_id` is focused in conversion segment
    /// `index` so later segments can be re-ranked.
    fn focus_segment(&self, segments: &mut Segments, index: usize, candidate_id: i32) -> bool;

    /// Learn from a full commit and turn the conversion segments into history.
    fn finish_conversion(&self, segments: &mut Segments);

    /// Drop the conversion segments, keeping history as context.
    fn cancel_conversion(&self, segments: &mut Segments);

    /// Undo the most recent learning update.
    fn revert(&self, segments: &mut Segments);

    /// Forget the learned entry `id` of segment `absolute_index` (history included).
    fn delete_candidate_from_history(&self, segments: &Segments, absolute_index: usize, id: i32) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentType;

    #[test]
    fn test_request_carries_history_only() {
        let mut segments = Segments::new();
        let mut history = Segment::with_values("わたし", &["私"]);
        history.set_segment_type(SegmentType::History);
        segments.push_segment(history);
        segments.push_segment(Segment::with_values("の", &["の"]));

        let request = ConversionRequest::new(RequestType::Conversion, "なまえ").with_history(&segments);
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].key(), "わたし");
        assert!(request.enable_user_history);
        assert!(!request.is_partial());
        assert!(!request.without_user_history().enable_user_history);
    }
}
