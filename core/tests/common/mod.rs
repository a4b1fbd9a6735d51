//! Shared test harness: a scripted converter that records every call.
#![allow(dead_code)]

use ahash::AHashMap;
use libconversion_core::transliteration::make_meta_candidates;
use libconversion_core::{
    Candidate, CandidateAttributes, ConversionRequest, ConversionSession, Converter, InputBuffer, RequestType,
    Segment, SegmentType, Segments, SessionConfig,
};
use std::cell::{Cell, RefCell};
use std::sync::Arc;

/// One recorded converter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartConversion(String),
    StartPrediction {
        request_type: RequestType,
        key: String,
        user_history: bool,
    },
    ResizeSegment(usize, i32),
    CommitSegment(usize, i32),
    CommitSegments(Vec<i32>),
    FocusSegment(usize, i32),
    FinishConversion,
    CancelConversion,
    Revert,
    DeleteFromHistory(usize, i32),
}

/// Converter answering from fixed tables.
///
/// - `segmentation`: how a conversion key splits into segment keys
/// - `words`: regular candidates per segment key (unknown keys echo the key)
/// - `suggestions` / `predictions`: results of `start_prediction`
/// - `transliterations`: meta-candidates per segment key
#[derive(Default)]
pub struct MockConverter {
    segmentation: AHashMap<String, Vec<String>>,
    words: AHashMap<String, Vec<Candidate>>,
    suggestions: AHashMap<String, Vec<Candidate>>,
    predictions: AHashMap<String, Vec<Candidate>>,
    transliterations: AHashMap<String, Vec<Candidate>>,
    calls: RefCell<Vec<Call>>,
    fail_resize: Cell<bool>,
    fail_commit_segment: Cell<bool>,
    fail_prediction: Cell<bool>,
}

fn candidates(key: &str, values: &[&str]) -> Vec<Candidate> {
    values.iter().map(|v| Candidate::new(key, *v)).collect()
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segmentation(mut self, key: &str, keys: &[&str]) -> Self {
        self.segmentation
            .insert(key.to_string(), keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn with_words(self, key: &str, values: &[&str]) -> Self {
        self.with_word_candidates(key, candidates(key, values))
    }

    pub fn with_word_candidates(mut self, key: &str, list: Vec<Candidate>) -> Self {
        self.words.insert(key.to_string(), list);
        self
    }

    pub fn with_suggestions(self, key: &str, values: &[&str]) -> Self {
        self.with_suggestion_candidates(key, candidates(key, values))
    }

    pub fn with_suggestion_candidates(mut self, key: &str, list: Vec<Candidate>) -> Self {
        self.suggestions.insert(key.to_string(), list);
        self
    }

    pub fn with_predictions(mut self, key: &str, values: &[&str]) -> Self {
        self.predictions.insert(key.to_string(), candidates(key, values));
        self
    }

    pub fn with_transliterations(mut self, key: &str, full_katakana: &str, half_katakana: &str, ascii: &str) -> Self {
        let metas = make_meta_candidates(key, key, full_katakana, half_katakana, ascii);
        self.transliterations.insert(key.to_string(), metas);
        self
    }

    pub fn fail_resize(&self, fail: bool) {
        self.fail_resize.set(fail);
    }

    pub fn fail_commit_segment(&self, fail: bool) {
        self.fail_commit_segment.set(fail);
    }

    pub fn fail_prediction(&self, fail: bool) {
        self.fail_prediction.set(fail);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn called(&self, call: &Call) -> bool {
        self.calls.borrow().contains(call)
    }

    pub fn prediction_calls(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::StartPrediction { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn segment_for(&self, key: &str) -> Segment {
        let mut segment = Segment::new(key);
        match self.words.get(key) {
            Some(list) => {
                for candidate in list {
                    segment.push_candidate(candidate.clone());
                }
            }
            None => segment.push_candidate(Candidate::new(key, key)),
        }
        if let Some(metas) = self.transliterations.get(key) {
            segment.set_meta_candidates(metas.clone());
        }
        segment
    }

    fn split(&self, key: &str) -> Vec<String> {
        match self.segmentation.get(key) {
            Some(keys) => keys.clone(),
            None if key.is_empty() => Vec::new(),
            None => vec![key.to_string()],
        }
    }

    fn with_history(request: &ConversionRequest) -> Segments {
        let mut segments = Segments::new();
        for segment in &request.history {
            segments.push_segment(segment.clone());
        }
        segments
    }
}

impl Converter for MockConverter {
    fn start_conversion(&self, request: &ConversionRequest) -> Option<Segments> {
        self.record(Call::StartConversion(request.key.clone()));
        let known = self.segmentation.contains_key(&request.key) || self.words.contains_key(&request.key);
        if !known {
            return None;
        }
        let mut segments = Self::with_history(request);
        for key in self.split(&request.key) {
            segments.push_segment(self.segment_for(&key));
        }
        Some(segments)
    }

    fn start_prediction(&self, request: &ConversionRequest) -> Option<Segments> {
        self.record(Call::StartPrediction {
            request_type: request.request_type,
            key: request.key.clone(),
            user_history: request.enable_user_history,
        });
        if self.fail_prediction.get() {
            return None;
        }
        let table = match request.request_type {
            RequestType::Suggestion | RequestType::PartialSuggestion => &self.suggestions,
            RequestType::Prediction | RequestType::PartialPrediction => &self.predictions,
            RequestType::Conversion => return None,
        };
        let mut list = table
            .get(&request.key)
            .or_else(|| self.suggestions.get(&request.key))?
            .clone();
        if !request.enable_user_history {
            list.retain(|c| !c.is_deletable());
        }
        if request.is_partial() {
            let consumed = request.key.chars().count();
            list = list
                .into_iter()
                .map(|c| c.with_consumed_key_size(consumed))
                .collect();
        }

        let mut segment = Segment::new(request.key.clone());
        for candidate in list {
            segment.push_candidate(candidate);
        }
        let mut segments = Self::with_history(request);
        segments.push_segment(segment);
        Some(segments)
    }

    fn resize_segment(&self, segments: &mut Segments, index: usize, delta: i32) -> bool {
        self.record(Call::ResizeSegment(index, delta));
        if self.fail_resize.get() {
            return false;
        }
        let keys: Vec<String> = segments.conversion_segments().iter().map(|s| s.key().to_string()).collect();
        let Some(current) = keys.get(index) else {
            return false;
        };
        let rest: String = keys[index..].concat();
        let new_len = current.chars().count() as i64 + delta as i64;
        if new_len <= 0 || new_len > rest.chars().count() as i64 {
            return false;
        }

        let head: String = rest.chars().take(new_len as usize).collect();
        let tail: String = rest.chars().skip(new_len as usize).collect();
        let mut resized = Segments::new();
        for segment in segments.history_segments() {
            resized.push_segment(segment.clone());
        }
        for segment in &segments.conversion_segments()[..index] {
            resized.push_segment(segment.clone());
        }
        resized.push_segment(self.segment_for(&head));
        for key in self.split(&tail) {
            resized.push_segment(self.segment_for(&key));
        }
        *segments = resized;
        true
    }

    fn commit_segment(&self, segments: &mut Segments, index: usize, candidate_id: i32) -> bool {
        self.record(Call::CommitSegment(index, candidate_id));
        if self.fail_commit_segment.get() {
            return false;
        }
        match segments.conversion_segment_mut(index) {
            Some(segment) if segment.is_valid_index(candidate_id) => {
                segment.set_segment_type(SegmentType::FixedValue);
                true
            }
            _ => false,
        }
    }

    fn commit_segments(&self, segments: &mut Segments, candidate_ids: &[i32]) -> bool {
        self.record(Call::CommitSegments(candidate_ids.to_vec()));
        let valid = candidate_ids.iter().enumerate().all(|(i, id)| {
            segments
                .conversion_segment(i)
                .is_some_and(|segment| segment.is_valid_index(*id))
        });
        if !valid {
            return false;
        }
        segments.mark_as_history(candidate_ids.len());
        true
    }

    fn focus_segment(&self, segments: &mut Segments, index: usize, candidate_id: i32) -> bool {
        self.record(Call::FocusSegment(index, candidate_id));
        segments
            .conversion_segment(index)
            .is_some_and(|segment| segment.is_valid_index(candidate_id))
    }

    fn finish_conversion(&self, segments: &mut Segments) {
        self.record(Call::FinishConversion);
        let count = segments.conversion_segments_size();
        segments.mark_as_history(count);
    }

    fn cancel_conversion(&self, segments: &mut Segments) {
        self.record(Call::CancelConversion);
        segments.clear_conversion_segments();
    }

    fn revert(&self, _segments: &mut Segments) {
        self.record(Call::Revert);
    }

    fn delete_candidate_from_history(&self, segments: &Segments, absolute_index: usize, id: i32) -> bool {
        self.record(Call::DeleteFromHistory(absolute_index, id));
        segments
            .segment(absolute_index)
            .and_then(|segment| segment.candidate(id))
            .is_some_and(Candidate::is_deletable)
    }
}

/// Session over `converter`, returning the shared converter for inspection.
pub fn session_with(
    converter: MockConverter,
    config: SessionConfig,
) -> (Arc<MockConverter>, ConversionSession<MockConverter>) {
    let converter = Arc::new(converter);
    let session = ConversionSession::new(Arc::clone(&converter), config);
    (converter, session)
}

pub fn session(converter: MockConverter) -> (Arc<MockConverter>, ConversionSession<MockConverter>) {
    session_with(converter, SessionConfig::default())
}

pub fn composer(text: &str) -> InputBuffer {
    InputBuffer::from_text(text)
}

/// きょうと with three regular candidates and the full transliteration set.
pub fn kyoto_converter() -> MockConverter {
    MockConverter::new()
        .with_words("きょうと", &["京都", "今日と", "きょうと"])
        .with_transliterations("きょうと", "キョウト", "ｷｮｳﾄ", "kyouto")
}

/// わたしのなまえは split into three segments, with resegmentation entries.
pub fn watashi_converter() -> MockConverter {
    MockConverter::new()
        .with_segmentation("わたしのなまえは", &["わたしの", "なまえ", "は"])
        .with_segmentation("わたしのなまえ", &["わたしの", "なまえ"])
        .with_segmentation("なまえは", &["なまえ", "は"])
        .with_words("わたしの", &["私の", "渡しの"])
        .with_words("なまえ", &["名前", "名まえ"])
        .with_words("わたしのな", &["私のな"])
        .with_words("まえ", &["前", "まえ"])
        .with_words("は", &["は", "葉"])
}

pub fn user_history(key: &str, value: &str) -> Candidate {
    Candidate::new(key, value).with_attributes(CandidateAttributes::USER_HISTORY)
}
