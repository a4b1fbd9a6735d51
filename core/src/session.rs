//! Conversion session management.
//!
//! `ConversionSession` is the state machine sitting between a `Composer` and
//! a `Converter`. It owns the segments returned by the converter, the
//! candidate list of the focused segment and the per-segment selection
//! array, and it produces the output projections after every operation.
//!
//! Every operation runs to completion synchronously. A failed converter
//! call never leaves the session half-updated: conversion-starting calls
//! reset to COMPOSITION, and boundary or focus fixes leave the session
//! exactly as it was.

use crate::candidate::{split_at_char, Candidate, CandidateAttributes, CandidateCommand};
use crate::candidate_list::CandidateList;
use crate::converter::{ConversionRequest, Converter, RequestType};
use crate::error::{Result, SessionError};
use crate::input_buffer::Composer;
use crate::output::{self, Category, CommitResult, Output};
use crate::segment::{Segment, SegmentType, Segments};
use crate::stats::UsageStats;
use crate::transliteration::{T13nAttributes, TransliterationType};
use crate::{utils, SessionConfig};
use bitflags::bitflags;
use serde::Serialize;
use std::sync::Arc;

/// Current state of a conversion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SessionState {
    /// Raw composition, no converter result shown
    #[default]
    Composition,
    /// Short suggestion list shown while typing
    Suggestion,
    /// Full prediction list, one segment
    Prediction,
    /// Segmented conversion
    Conversion,
}

bitflags! {
    /// Set of states an operation is legal in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateSet: u8 {
        const COMPOSITION = 1 << 0;
        const SUGGESTION = 1 << 1;
        const PREDICTION = 1 << 2;
        const CONVERSION = 1 << 3;
    }
}

impl SessionState {
    pub fn as_set(self) -> StateSet {
        match self {
            Self::Composition => StateSet::COMPOSITION,
            Self::Suggestion => StateSet::SUGGESTION,
            Self::Prediction => StateSet::PREDICTION,
            Self::Conversion => StateSet::CONVERSION,
        }
    }

    fn category(self) -> Category {
        match self {
            Self::Suggestion | Self::Composition => Category::Suggestion,
            Self::Prediction => Category::Prediction,
            Self::Conversion => Category::Conversion,
        }
    }
}

const CANDIDATE_STATES: StateSet = StateSet::SUGGESTION
    .union(StateSet::PREDICTION)
    .union(StateSet::CONVERSION);

/// What a commit operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Text was committed; the caller trims this many chars from its composer.
    Committed { consumed_key_size: usize },
    /// A command candidate was selected; nothing was committed.
    CommandPerformed(CandidateCommand),
}

/// One logical editing session driving a `Converter`.
///
/// The converter is shared through an `Arc`; clones of a session and any
/// number of parallel sessions drive the same engine.
pub struct ConversionSession<C: Converter> {
    converter: Arc<C>,
    config: SessionConfig,
    state: SessionState,
    segments: Segments,
    /// Focused conversion segment
    segment_index: usize,
    candidate_list: CandidateList,
    candidate_list_visible: bool,
    /// Last suggestion segment, spliced in front of prediction results
    previous_suggestions: Segment,
    /// Shadow result computed without user history
    incognito_segments: Option<Segments>,
    /// Selected candidate id per conversion segment
    selected_candidate_ids: Vec<i32>,
    result: Option<CommitResult>,
    usage_stats: UsageStats,
}

impl<C: Converter> ConversionSession<C> {
    /// Create a session in COMPOSITION state.
    pub fn new(converter: Arc<C>, config: SessionConfig) -> Self {
        let candidate_list = CandidateList::with_page_size(config.page_size);
        Self {
            converter,
            config,
            state: SessionState::Composition,
            segments: Segments::new(),
            segment_index: 0,
            candidate_list,
            candidate_list_visible: false,
            previous_suggestions: Segment::default(),
            incognito_segments: None,
            selected_candidate_ids: Vec::new(),
            result: None,
            usage_stats: UsageStats::new(),
        }
    }

    // ========== Accessors ==========

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a converter result is being shown.
    pub fn is_active(&self) -> bool {
        self.state != SessionState::Composition
    }

    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    pub fn candidate_list(&self) -> &CandidateList {
        &self.candidate_list
    }

    pub fn is_candidate_list_visible(&self) -> bool {
        self.candidate_list_visible
    }

    pub fn selected_candidate_ids(&self) -> &[i32] {
        &self.selected_candidate_ids
    }

    pub fn previous_suggestions(&self) -> &Segment {
        &self.previous_suggestions
    }

    pub fn incognito_segments(&self) -> Option<&Segments> {
        self.incognito_segments.as_ref()
    }

    /// Result of the last operation, if it committed something.
    pub fn result(&self) -> Option<&CommitResult> {
        self.result.as_ref()
    }

    pub fn usage_stats(&self) -> &UsageStats {
        &self.usage_stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn converter(&self) -> &Arc<C> {
        &self.converter
    }

    // ========== State helpers ==========

    fn check_state(&self, allowed: StateSet) -> bool {
        allowed.contains(self.state.as_set())
    }

    fn require(&self, operation: &'static str, allowed: StateSet) -> Result<()> {
        if self.check_state(allowed) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn set_state(&mut self, to: SessionState, operation: &'static str) {
        if self.state != to {
            tracing::debug!(from = ?self.state, to = ?to, operation, "session state changed");
        }
        self.state = to;
    }

    /// Back to COMPOSITION, keeping history segments as context.
    fn reset_state(&mut self) {
        self.set_state(SessionState::Composition, "reset");
        self.segment_index = 0;
        self.previous_suggestions = Segment::default();
        self.incognito_segments = None;
        self.candidate_list_visible = false;
        self.candidate_list.clear();
        self.selected_candidate_ids.clear();
        self.segments.clear_conversion_segments();
    }

    /// Rebuild the candidate list from the focused segment.
    fn update_candidate_list(&mut self) {
        self.candidate_list.clear();
        self.candidate_list.set_page_size(self.config.page_size);

        let Some(segment) = self.segments.conversion_segment(self.segment_index) else {
            tracing::error!(
                segment_index = self.segment_index,
                segments = self.segments.conversion_segments_size(),
                "focused segment does not exist"
            );
            return;
        };

        let force_visible = append_new_candidates(&mut self.candidate_list, segment);

        if self.state == SessionState::Conversion && segment.meta_candidates_size() > 0 {
            let metas = segment.meta_candidates().iter().enumerate().map(|(index, candidate)| {
                let attributes = TransliterationType::from_meta_index(index)
                    .map(TransliterationType::attributes)
                    .unwrap_or_default();
                (crate::segment::meta_id(index), candidate.value.as_str(), attributes)
            });
            if self.config.use_cascading_window {
                let mut group = self.candidate_list.add_sub_candidate_list();
                group
                    .set_name(self.config.output.transliteration_group_name.clone())
                    .set_rotate(false);
                for (id, value, attributes) in metas {
                    group.add_candidate_with_attributes(id, value, attributes);
                }
            } else {
                for (id, value, attributes) in metas {
                    self.candidate_list.add_candidate_with_attributes(id, value, attributes);
                }
            }
        }

        self.candidate_list
            .set_focused(matches!(self.state, SessionState::Prediction | SessionState::Conversion));
        if force_visible {
            self.candidate_list_visible = true;
        }
    }

    /// Rebuild the list and focus the candidate selected for the focused segment.
    fn refocus_segment(&mut self) {
        self.update_candidate_list();
        if let Some(&id) = self.selected_candidate_ids.get(self.segment_index) {
            self.candidate_list.move_to_id(id);
        }
    }

    fn new_request(&self, request_type: RequestType, key: String) -> ConversionRequest {
        ConversionRequest::new(request_type, key).with_history(&self.segments)
    }

    /// Request type and key for suggest/predict.
    fn prediction_request(&self, composer: &dyn Composer, prediction_quality: bool) -> ConversionRequest {
        let text = composer.current_text();
        let cursor = composer.cursor_position();
        let partial = self.config.use_partial_composition && cursor > 0 && cursor < composer.length();
        let request_type = match (prediction_quality, partial) {
            (false, false) => RequestType::Suggestion,
            (true, false) => RequestType::Prediction,
            (false, true) => RequestType::PartialSuggestion,
            (true, true) => RequestType::PartialPrediction,
        };
        let key = if partial {
            split_at_char(&text, cursor).0.to_string()
        } else {
            text
        };
        self.new_request(request_type, key)
    }

    fn has_regular_candidates(segments: &Segments) -> bool {
        segments
            .conversion_segment(0)
            .is_some_and(|segment| segment.candidates_size() > 0)
    }

    // ========== Starting conversion ==========

    /// Convert the whole composition into segments.
    pub fn convert(&mut self, composer: &dyn Composer) -> Result<()> {
        self.result = None;
        self.require(
            "convert",
            StateSet::COMPOSITION | StateSet::SUGGESTION | StateSet::CONVERSION,
        )?;

        let request = self.new_request(RequestType::Conversion, composer.current_text());
        let segments = match self.converter.start_conversion(&request) {
            Some(segments) if segments.conversion_segments_size() > 0 => segments,
            _ => {
                tracing::warn!(key = %request.key, "conversion failed");
                self.reset_state();
                return Err(SessionError::ConverterFailed { operation: "convert" });
            }
        };

        self.segments = segments;
        self.segment_index = 0;
        self.previous_suggestions = Segment::default();
        self.incognito_segments = None;
        self.selected_candidate_ids = vec![0; self.segments.conversion_segments_size()];
        self.candidate_list_visible = false;
        self.set_state(SessionState::Conversion, "convert");
        self.update_candidate_list();
        Ok(())
    }

    /// Show suggestions for the composition (or the part before the cursor).
    pub fn suggest(&mut self, composer: &dyn Composer) -> Result<()> {
        self.result = None;
        self.require("suggest", StateSet::COMPOSITION | StateSet::SUGGESTION)?;

        let request = self.prediction_request(composer, self.config.use_prediction_candidate);
        let Some(segments) = self.converter.start_prediction(&request) else {
            tracing::warn!(key = %request.key, "suggestion failed");
            self.converter.cancel_conversion(&mut self.segments);
            self.reset_state();
            return Err(SessionError::ConverterFailed { operation: "suggest" });
        };
        if !Self::has_regular_candidates(&segments) {
            self.converter.cancel_conversion(&mut self.segments);
            self.reset_state();
            return Err(SessionError::NoCandidates);
        }

        self.segments = segments;
        self.segment_index = 0;
        self.selected_candidate_ids = vec![0; self.segments.conversion_segments_size()];
        self.previous_suggestions = self.segments.conversion_segment(0).cloned().unwrap_or_default();
        self.incognito_segments = self.fetch_incognito(&request);
        self.candidate_list_visible = true;
        self.set_state(SessionState::Suggestion, "suggest");
        self.update_candidate_list();
        Ok(())
    }

    fn fetch_incognito(&self, request: &ConversionRequest) -> Option<Segments> {
        if !self.config.fill_incognito_candidate_words {
            return None;
        }
        self.converter
            .start_prediction(&request.clone().without_user_history())
    }

    fn is_last_candidate_focused(&self) -> bool {
        self.candidate_list.last_index() == Some(self.candidate_list.focused_index())
    }

    /// Show the full prediction list, or fetch more when the last entry is focused.
    pub fn predict(&mut self, composer: &dyn Composer) -> Result<()> {
        self.result = None;

        let has_cache = self.previous_suggestions.candidates_size() > 0;
        let predicting = self.state == SessionState::Prediction;
        let predict_first = !predicting && !has_cache;
        let predict_expand = predicting && has_cache && self.is_last_candidate_focused();
        if predicting && !predict_expand {
            return Ok(());
        }

        let previous_focus = self.candidate_list.focused_id();
        if predict_first || predict_expand {
            let request = self.prediction_request(composer, true);
            let Some(mut segments) = self.converter.start_prediction(&request) else {
                tracing::warn!(key = %request.key, expand = predict_expand, "prediction failed");
                self.reset_state();
                return Err(SessionError::ConverterFailed { operation: "predict" });
            };
            if predict_expand {
                let cached = std::mem::take(&mut self.previous_suggestions);
                if let Some(segment) = segments.conversion_segment_mut(0) {
                    segment.push_front_candidates(cached.candidates().iter().cloned());
                }
            }
            if !Self::has_regular_candidates(&segments) {
                self.converter.cancel_conversion(&mut self.segments);
                self.reset_state();
                return Err(SessionError::NoCandidates);
            }
            self.incognito_segments = self.fetch_incognito(&request);
            self.segments = segments;
        } else {
            let mut segments = self.segments.clone();
            segments.clear_conversion_segments();
            segments.push_segment(self.previous_suggestions.clone());
            self.segments = segments;
        }

        self.segment_index = 0;
        self.selected_candidate_ids = vec![0; self.segments.conversion_segments_size()];
        self.candidate_list_visible = true;
        self.set_state(SessionState::Prediction, "predict");
        self.update_candidate_list();
        if predict_expand {
            if let Some(id) = previous_focus {
                self.candidate_list.move_to_id(id);
            }
        }
        Ok(())
    }

    fn maybe_expand_prediction(&mut self, composer: &dyn Composer) -> Result<()> {
        if self.state == SessionState::Prediction
            && self.previous_suggestions.candidates_size() > 0
            && self.is_last_candidate_focused()
        {
            self.predict(composer)?;
        }
        Ok(())
    }

    // ========== Candidate navigation ==========

    /// Record a candidate focus change after a move.
    fn after_candidate_move(&mut self, moved: bool) -> bool {
        self.candidate_list_visible = true;
        if !moved {
            return false;
        }
        let Some(id) = self.candidate_list.focused_id() else {
            return true;
        };
        if self.state == SessionState::Conversion
            && !self
                .converter
                .focus_segment(&mut self.segments, self.segment_index, id)
        {
            tracing::warn!(segment_index = self.segment_index, id, "converter rejected focus change");
        }
        if self.state != SessionState::Suggestion {
            match self.selected_candidate_ids.get_mut(self.segment_index) {
                Some(slot) => *slot = id,
                None => tracing::error!(
                    segment_index = self.segment_index,
                    size = self.selected_candidate_ids.len(),
                    "selection array out of sync with segments"
                ),
            }
        }
        true
    }

    /// Focus the next candidate, fetching more predictions at the end of the list.
    pub fn candidate_next(&mut self, composer: &dyn Composer) -> Result<bool> {
        self.result = None;
        self.require("candidate_next", CANDIDATE_STATES)?;
        self.maybe_expand_prediction(composer)?;
        let moved = self.candidate_list.move_next();
        Ok(self.after_candidate_move(moved))
    }

    /// Focus the previous candidate.
    pub fn candidate_prev(&mut self) -> Result<bool> {
        self.result = None;
        self.require("candidate_prev", CANDIDATE_STATES)?;
        let moved = self.candidate_list.move_prev();
        Ok(self.after_candidate_move(moved))
    }

    /// Focus the first candidate of the next page.
    pub fn candidate_next_page(&mut self, composer: &dyn Composer) -> Result<bool> {
        self.result = None;
        self.require("candidate_next_page", CANDIDATE_STATES)?;
        self.maybe_expand_prediction(composer)?;
        let moved = self.candidate_list.move_next_page();
        Ok(self.after_candidate_move(moved))
    }

    /// Focus the first candidate of the previous page.
    pub fn candidate_prev_page(&mut self) -> Result<bool> {
        self.result = None;
        self.require("candidate_prev_page", CANDIDATE_STATES)?;
        let moved = self.candidate_list.move_prev_page();
        Ok(self.after_candidate_move(moved))
    }

    /// Focus the candidate with `id`.
    pub fn candidate_move_to_id(&mut self, id: i32) -> Result<bool> {
        self.result = None;
        self.require("candidate_move_to_id", CANDIDATE_STATES)?;
        let moved = self.candidate_list.move_to_id(id);
        Ok(self.after_candidate_move(moved))
    }

    /// Focus the `index`-th row of the current page.
    pub fn candidate_move_to_page_index(&mut self, index: usize) -> Result<bool> {
        self.result = None;
        self.require("candidate_move_to_page_index", CANDIDATE_STATES)?;
        let moved = self.candidate_list.move_to_page_index(index);
        Ok(self.after_candidate_move(moved))
    }

    /// Focus the page row labelled with selection key `ch`.
    pub fn candidate_move_to_shortcut(&mut self, ch: char) -> Result<bool> {
        self.result = None;
        self.require("candidate_move_to_shortcut", StateSet::PREDICTION | StateSet::CONVERSION)?;
        let Some(index) = self.config.selection_key_index(ch) else {
            return Ok(false);
        };
        let moved = self.candidate_list.move_to_page_index(index);
        Ok(self.after_candidate_move(moved))
    }

    // ========== Segment focus and width ==========

    /// Tell the converter which candidate the focused segment settled on.
    fn fix_focused_segment(&mut self, operation: &'static str) -> Result<()> {
        let Some(id) = self.candidate_list.focused_id() else {
            tracing::error!(segment_index = self.segment_index, "no focused candidate to fix");
            return Err(SessionError::InvariantViolation(format!(
                "segment {} has an empty candidate list",
                self.segment_index
            )));
        };
        if !self
            .converter
            .commit_segment(&mut self.segments, self.segment_index, id)
        {
            tracing::warn!(segment_index = self.segment_index, id, operation, "converter refused to fix segment");
            return Err(SessionError::ConverterFailed { operation });
        }
        if let Some(slot) = self.selected_candidate_ids.get_mut(self.segment_index) {
            *slot = id;
        }
        Ok(())
    }

    fn move_segment_focus(&mut self, operation: &'static str, target: Option<usize>) -> Result<bool> {
        self.result = None;
        if self.state == SessionState::Prediction {
            return Ok(false);
        }
        self.require(operation, StateSet::CONVERSION)?;
        let Some(next) = target.filter(|next| *next != self.segment_index) else {
            return Ok(false);
        };
        self.fix_focused_segment(operation)?;
        self.segment_index = next;
        self.candidate_list_visible = false;
        self.refocus_segment();
        Ok(true)
    }

    /// Fix the focused segment and move focus one segment right.
    pub fn segment_focus_right(&mut self) -> Result<bool> {
        let size = self.segments.conversion_segments_size();
        let target = (self.segment_index + 1 < size).then(|| self.segment_index + 1);
        self.move_segment_focus("segment_focus_right", target)
    }

    /// Fix the focused segment and move focus one segment left.
    pub fn segment_focus_left(&mut self) -> Result<bool> {
        let target = self.segment_index.checked_sub(1);
        self.move_segment_focus("segment_focus_left", target)
    }

    /// Move focus to the first segment.
    pub fn segment_focus_left_edge(&mut self) -> Result<bool> {
        self.move_segment_focus("segment_focus_left_edge", Some(0))
    }

    /// Move focus to the last segment.
    pub fn segment_focus_last(&mut self) -> Result<bool> {
        let target = self.segments.conversion_segments_size().checked_sub(1);
        self.move_segment_focus("segment_focus_last", target)
    }

    /// Grow (`delta > 0`) or shrink the focused segment's key.
    ///
    /// Every selection at or after the focused segment goes back to 0.
    pub fn resize_segment_width(&mut self, delta: i32) -> Result<bool> {
        self.result = None;
        if self.state == SessionState::Prediction {
            return Ok(false);
        }
        self.require("resize_segment_width", StateSet::CONVERSION)?;
        if !self
            .converter
            .resize_segment(&mut self.segments, self.segment_index, delta)
        {
            tracing::warn!(segment_index = self.segment_index, delta, "converter refused to resize segment");
            return Err(SessionError::ConverterFailed {
                operation: "resize_segment_width",
            });
        }

        let size = self.segments.conversion_segments_size();
        if self.segment_index >= size {
            tracing::error!(segment_index = self.segment_index, size, "resize dropped the focused segment");
            self.reset_state();
            return Err(SessionError::InvariantViolation(format!(
                "focused segment {} missing after resize ({} segments)",
                self.segment_index, size
            )));
        }
        self.selected_candidate_ids.resize(size, 0);
        for id in &mut self.selected_candidate_ids[self.segment_index..] {
            *id = 0;
        }
        self.candidate_list_visible = false;
        self.update_candidate_list();
        Ok(true)
    }

    /// Grow the focused segment by one char.
    pub fn segment_width_expand(&mut self) -> Result<bool> {
        self.resize_segment_width(1)
    }

    /// Shrink the focused segment by one char.
    pub fn segment_width_shrink(&mut self) -> Result<bool> {
        self.resize_segment_width(-1)
    }

    // ========== Commit ==========

    fn sync_selected_from_list(&mut self) {
        if let (Some(id), Some(slot)) = (
            self.candidate_list.focused_id(),
            self.selected_candidate_ids.get_mut(self.segment_index),
        ) {
            *slot = id;
        }
    }

    /// First command among the selected candidates of the first `count` segments.
    fn find_command(&self, count: usize) -> Option<CandidateCommand> {
        self.segments
            .conversion_segments()
            .iter()
            .take(count)
            .enumerate()
            .find_map(|(i, segment)| {
                let id = self.selected_candidate_ids.get(i).copied().unwrap_or(0);
                segment
                    .candidate(id)
                    .filter(|candidate| candidate.is_command())
                    .and_then(|candidate| candidate.command)
            })
    }

    /// Apply a command candidate and cancel instead of committing.
    fn perform_command(&mut self, command: CandidateCommand) -> CommitOutcome {
        match command {
            CandidateCommand::EnableIncognitoMode => self.config.incognito_mode = true,
            CandidateCommand::DisableIncognitoMode => self.config.incognito_mode = false,
            CandidateCommand::EnablePresentationMode => self.config.presentation_mode = true,
            CandidateCommand::DisablePresentationMode => self.config.presentation_mode = false,
        }
        tracing::info!(?command, "command candidate performed");
        self.converter.cancel_conversion(&mut self.segments);
        self.reset_state();
        CommitOutcome::CommandPerformed(command)
    }

    /// Result text of the selected candidates of the first `count` segments.
    fn build_result(&self, count: usize) -> Result<CommitResult> {
        let mut key = String::new();
        let mut value = String::new();
        let mut candidates = Vec::with_capacity(count);
        for (i, segment) in self.segments.conversion_segments().iter().take(count).enumerate() {
            let id = self.selected_candidate_ids.get(i).copied().unwrap_or(0);
            let Some(candidate) = segment.candidate(id) else {
                tracing::error!(segment = i, id, "selected candidate missing from segment");
                return Err(SessionError::InvariantViolation(format!(
                    "segment {} has no candidate {}",
                    i, id
                )));
            };
            key.push_str(segment.key());
            value.push_str(&candidate.value);
            candidates.push(candidate);
        }
        let mut result = CommitResult::new(key, value);
        for candidate in candidates {
            result.add_tokens_from(candidate);
        }
        Ok(result)
    }

    /// Commit every conversion segment and return to COMPOSITION.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        self.result = None;
        self.require("commit", StateSet::PREDICTION | StateSet::CONVERSION)?;
        self.sync_selected_from_list();

        let count = self.segments.conversion_segments_size();
        if let Some(command) = self.find_command(count) {
            return Ok(self.perform_command(command));
        }
        let result = self.build_result(count)?;

        let ids = self.selected_candidate_ids.clone();
        for (index, &id) in ids.iter().enumerate() {
            if !self.converter.commit_segment(&mut self.segments, index, id) {
                tracing::warn!(segment = index, id, "converter refused to commit segment");
            }
        }
        self.converter.finish_conversion(&mut self.segments);
        self.usage_stats.record_commit(self.state, &ids);

        let consumed_key_size = result.key.chars().count();
        self.result = Some(result);
        self.reset_state();
        Ok(CommitOutcome::Committed { consumed_key_size })
    }

    /// Commit the first `count` segments, keeping the rest in conversion.
    fn commit_head(&mut self, operation: &'static str, count: usize) -> Result<CommitOutcome> {
        self.result = None;
        self.require(operation, StateSet::PREDICTION | StateSet::CONVERSION)?;
        let size = self.segments.conversion_segments_size();
        if count >= size {
            return self.commit();
        }
        self.sync_selected_from_list();

        if let Some(command) = self.find_command(count) {
            return Ok(self.perform_command(command));
        }
        let result = self.build_result(count)?;

        let ids = self.selected_candidate_ids[..count].to_vec();
        if !self.converter.commit_segments(&mut self.segments, &ids) {
            tracing::warn!(count, "converter refused to commit segments");
            self.reset_state();
            return Err(SessionError::ConverterFailed { operation });
        }
        let remaining = self.segments.conversion_segments_size();
        if remaining != size - count {
            tracing::error!(expected = size - count, remaining, "partial commit left unexpected segments");
            self.reset_state();
            return Err(SessionError::InvariantViolation(format!(
                "expected {} segments after committing {}, found {}",
                size - count,
                count,
                remaining
            )));
        }
        self.usage_stats.record_commit(self.state, &ids);

        self.selected_candidate_ids.drain(..count);
        self.segment_index = self.segment_index.saturating_sub(count);
        let consumed_key_size = result.key.chars().count();
        self.result = Some(result);
        self.candidate_list_visible = false;
        self.refocus_segment();
        Ok(CommitOutcome::Committed { consumed_key_size })
    }

    /// Commit only the first segment.
    pub fn commit_first_segment(&mut self) -> Result<CommitOutcome> {
        self.commit_head("commit_first_segment", 1)
    }

    /// Commit every segment up to and including the focused one.
    pub fn commit_head_to_focused_segments(&mut self) -> Result<CommitOutcome> {
        let count = self.segment_index + 1;
        self.commit_head("commit_head_to_focused_segments", count)
    }

    /// Commit the suggestion at root `index` of the candidate list.
    pub fn commit_suggestion_by_index(&mut self, index: usize, composer: &dyn Composer) -> Result<CommitOutcome> {
        self.result = None;
        self.require("commit_suggestion", StateSet::SUGGESTION | StateSet::PREDICTION)?;
        let size = self.candidate_list.size();
        let id = self
            .candidate_list
            .entry(index)
            .and_then(|entry| self.candidate_list.root().entry_id(entry))
            .ok_or(SessionError::IndexOutOfRange { index, size })?;
        self.commit_suggestion_internal(id, composer)
    }

    /// Commit the suggestion with candidate `id`.
    pub fn commit_suggestion_by_id(&mut self, id: i32, composer: &dyn Composer) -> Result<CommitOutcome> {
        self.result = None;
        self.require("commit_suggestion", StateSet::SUGGESTION | StateSet::PREDICTION)?;
        if !self
            .segments
            .conversion_segment(self.segment_index)
            .is_some_and(|segment| segment.is_valid_index(id))
        {
            return Err(SessionError::CandidateNotFound(id));
        }
        self.commit_suggestion_internal(id, composer)
    }

    fn commit_suggestion_internal(&mut self, id: i32, composer: &dyn Composer) -> Result<CommitOutcome> {
        let Some(candidate) = self
            .segments
            .conversion_segment(self.segment_index)
            .and_then(|segment| segment.candidate(id))
            .cloned()
        else {
            tracing::error!(id, "suggestion candidate missing from segment");
            return Err(SessionError::CandidateNotFound(id));
        };
        if let Some(command) = candidate.command.filter(|_| candidate.is_command()) {
            return Ok(self.perform_command(command));
        }

        let text = composer.current_text();
        let (key, consumed_key_size) = if candidate.is_partially_key_consumed() {
            let consumed = candidate.consumed_key_size.min(composer.length());
            (split_at_char(&text, consumed).0.to_string(), consumed)
        } else {
            (text, composer.length())
        };

        let mut result = CommitResult::new(key, candidate.value.clone());
        result.add_tokens_from(&candidate);

        if !self
            .converter
            .commit_segment(&mut self.segments, self.segment_index, id)
        {
            tracing::warn!(id, "converter refused to commit suggestion");
        }
        self.converter.finish_conversion(&mut self.segments);
        self.usage_stats.record_commit(self.state, &[id]);

        self.result = Some(result);
        self.reset_state();
        Ok(CommitOutcome::Committed { consumed_key_size })
    }

    /// Commit the raw composition text as is.
    pub fn commit_preedit(&mut self, composer: &dyn Composer) -> Result<CommitOutcome> {
        self.result = None;
        self.require("commit_preedit", StateSet::COMPOSITION | StateSet::SUGGESTION)?;
        let text = composer.current_text();
        if text.is_empty() {
            return Ok(CommitOutcome::Committed { consumed_key_size: 0 });
        }

        let mut segment = Segment::with_values(text.clone(), &[text.as_str()]);
        segment.set_segment_type(SegmentType::FixedValue);
        self.segments.clear_conversion_segments();
        self.segments.push_segment(segment);
        self.converter.finish_conversion(&mut self.segments);
        self.usage_stats.record_commit(SessionState::Composition, &[]);

        let mut result = CommitResult::new(text.clone(), text.clone());
        result.add_tokens_from(&Candidate::new(text.clone(), text));
        let consumed_key_size = composer.length();
        self.result = Some(result);
        self.reset_state();
        Ok(CommitOutcome::Committed { consumed_key_size })
    }

    // ========== Cancel, reset, revert ==========

    /// Drop the in-progress conversion; history stays as context.
    pub fn cancel(&mut self) {
        self.result = None;
        if self.state == SessionState::Composition {
            return;
        }
        self.converter.cancel_conversion(&mut self.segments);
        self.reset_state();
    }

    /// Back to a fresh session, history included.
    pub fn reset(&mut self) {
        self.result = None;
        self.reset_state();
        self.segments.clear();
    }

    /// Undo the converter's most recent learning update.
    pub fn revert(&mut self) {
        self.result = None;
        self.converter.revert(&mut self.segments);
    }

    /// Forget a learned candidate of the focused segment.
    ///
    /// With `None` the focused candidate is used. Returns `Ok(false)` when the
    /// id does not exist or the converter kept the entry.
    pub fn delete_candidate_from_history(&mut self, id: Option<i32>) -> Result<bool> {
        self.result = None;
        self.require("delete_candidate_from_history", CANDIDATE_STATES)?;
        let Some(id) = id.or_else(|| self.candidate_list.focused_id()) else {
            return Ok(false);
        };
        let present = self
            .segments
            .conversion_segment(self.segment_index)
            .is_some_and(|segment| segment.is_valid_index(id));
        if !present {
            return Ok(false);
        }
        let absolute_index = self.segments.history_segments_size() + self.segment_index;
        let deleted = self
            .converter
            .delete_candidate_from_history(&self.segments, absolute_index, id);
        if !deleted {
            tracing::warn!(absolute_index, id, "converter did not delete history entry");
        }
        Ok(deleted)
    }

    // ========== Transliteration ==========

    /// Implicit convert of the whole composition into one segment.
    fn convert_as_single_segment(&mut self, composer: &dyn Composer) -> Result<()> {
        self.convert(composer)?;
        if self.segments.conversion_segments_size() <= 1 {
            return Ok(());
        }
        let first_len = self
            .segments
            .conversion_segment(0)
            .map_or(0, Segment::key_len);
        let delta = composer.length() as i64 - first_len as i64;
        if !self
            .converter
            .resize_segment(&mut self.segments, 0, delta as i32)
        {
            tracing::warn!(delta, "converter refused to merge segments");
            self.reset_state();
            return Err(SessionError::ConverterFailed {
                operation: "convert_to_transliteration",
            });
        }
        self.selected_candidate_ids = vec![0; self.segments.conversion_segments_size()];
        self.update_candidate_list();
        Ok(())
    }

    fn after_transliteration(&mut self, moved: bool) {
        self.after_candidate_move(moved);
        self.candidate_list_visible = false;
    }

    /// Show the composition in script `kind`, cycling variants while converting.
    pub fn convert_to_transliteration(&mut self, composer: &dyn Composer, kind: TransliterationType) -> Result<()> {
        self.result = None;
        self.require(
            "convert_to_transliteration",
            StateSet::COMPOSITION | StateSet::SUGGESTION | StateSet::CONVERSION,
        )?;
        let mut mask = kind.attributes();

        if self.state != SessionState::Conversion {
            self.convert_as_single_segment(composer)?;
            let moved = self.candidate_list.move_to_attributes(mask);
            self.after_transliteration(moved);
            return Ok(());
        }

        let current = self
            .candidate_list
            .focused_id()
            .and_then(|id| self.candidate_list.attributes_of(id))
            .unwrap_or_default();
        let width_only = mask.intersects(T13nAttributes::ASCII)
            && current.intersects(T13nAttributes::ASCII)
            && !mask.intersects(T13nAttributes::CASE_MASK)
            && (mask & (T13nAttributes::HALF_WIDTH | T13nAttributes::FULL_WIDTH))
                != (current & (T13nAttributes::HALF_WIDTH | T13nAttributes::FULL_WIDTH));
        if width_only {
            mask |= current & T13nAttributes::CASE_MASK;
        }
        let moved = self.candidate_list.move_next_attributes(mask);
        self.after_transliteration(moved);
        Ok(())
    }

    /// Half-width katakana for kana or kanji text, half-width ASCII otherwise.
    pub fn convert_to_half_width(&mut self, composer: &dyn Composer) -> Result<()> {
        let text = match self.state {
            SessionState::Conversion => self
                .candidate_list
                .focused_id()
                .and_then(|id| self.segments.conversion_segment(self.segment_index)?.candidate(id))
                .map(|candidate| candidate.value.clone())
                .unwrap_or_else(|| composer.current_text()),
            _ => composer.current_text(),
        };
        let kind = if utils::contains_kana_or_kanji(&text) {
            TransliterationType::HalfKatakana
        } else {
            TransliterationType::HalfAscii
        };
        self.convert_to_transliteration(composer, kind)
    }

    /// Cycle hiragana → full katakana → half katakana → hiragana.
    pub fn switch_kana_type(&mut self, composer: &dyn Composer) -> Result<()> {
        self.result = None;
        self.require(
            "switch_kana_type",
            StateSet::COMPOSITION | StateSet::SUGGESTION | StateSet::CONVERSION,
        )?;

        let mask = if self.state != SessionState::Conversion {
            self.convert_as_single_segment(composer)?;
            TransliterationType::FullKatakana.attributes()
        } else {
            let current = self
                .candidate_list
                .focused_id()
                .and_then(|id| self.candidate_list.attributes_of(id))
                .unwrap_or_default();
            if current.contains(T13nAttributes::HIRAGANA) {
                TransliterationType::FullKatakana.attributes()
            } else if current.contains(T13nAttributes::FULL_WIDTH | T13nAttributes::KATAKANA) {
                TransliterationType::HalfKatakana.attributes()
            } else {
                TransliterationType::Hiragana.attributes()
            }
        };
        let moved = self.candidate_list.move_to_attributes(mask);
        self.after_transliteration(moved);
        Ok(())
    }

    // ========== Output ==========

    /// Assemble every projection of the current state.
    pub fn fill_output(&self, composer: &dyn Composer) -> Output {
        let mut output = Output {
            result: self.result.clone(),
            ..Default::default()
        };

        let position = match self.state {
            SessionState::Composition | SessionState::Suggestion => {
                output.preedit = output::fill_composition_preedit(composer);
                0
            }
            SessionState::Prediction | SessionState::Conversion => {
                let focused_id = self.candidate_list.focused_id().unwrap_or_else(|| {
                    self.selected_candidate_ids
                        .get(self.segment_index)
                        .copied()
                        .unwrap_or(0)
                });
                output.preedit = output::fill_conversion_preedit(
                    &self.segments,
                    self.segment_index,
                    focused_id,
                    &self.selected_candidate_ids,
                );
                output
                    .preedit
                    .as_ref()
                    .and_then(|preedit| preedit.highlighted_position)
                    .unwrap_or(0)
            }
        };
        if self.state == SessionState::Composition {
            return output;
        }

        let Some(segment) = self.segments.conversion_segment(self.segment_index) else {
            return output;
        };
        let category = self.state.category();
        if self.candidate_list_visible && !self.candidate_list.is_empty() {
            let shortcuts = self
                .check_state(StateSet::PREDICTION | StateSet::CONVERSION)
                .then_some(self.config.select_keys.as_str());
            output.candidate_window = output::fill_candidate_window(
                segment,
                &self.candidate_list,
                position,
                category,
                shortcuts,
                &self.config.output,
            );
        }
        output.all_candidate_words = output::fill_all_candidate_words(segment, &self.candidate_list, category);

        if self.config.fill_incognito_candidate_words {
            if let Some(segment) = self
                .incognito_segments
                .as_ref()
                .and_then(|segments| segments.conversion_segment(0))
            {
                let mut list = CandidateList::with_page_size(self.config.page_size);
                append_new_candidates(&mut list, segment);
                output.incognito_candidate_words = output::fill_all_candidate_words(segment, &list, category);
            }
        }
        output
    }
}

/// Add the regular candidates of `segment` not yet scanned into `list`.
///
/// Returns true when one of them is a spelling correction.
fn append_new_candidates(list: &mut CandidateList, segment: &Segment) -> bool {
    let start = list.next_available_id().max(0) as usize;
    let mut spelling_correction = false;
    for (id, candidate) in segment.candidates().iter().enumerate().skip(start) {
        list.add_candidate(id as i32, &candidate.value);
        spelling_correction |= candidate
            .attributes
            .contains(CandidateAttributes::SPELLING_CORRECTION);
    }
    spelling_correction
}

impl<C: Converter> Clone for ConversionSession<C> {
    /// Copy the session; the candidate list is rebuilt and refocused by id.
    fn clone(&self) -> Self {
        let mut session = Self {
            converter: Arc::clone(&self.converter),
            config: self.config.clone(),
            state: self.state,
            segments: self.segments.clone(),
            segment_index: self.segment_index,
            candidate_list: CandidateList::with_page_size(self.config.page_size),
            candidate_list_visible: self.candidate_list_visible,
            previous_suggestions: self.previous_suggestions.clone(),
            incognito_segments: self.incognito_segments.clone(),
            selected_candidate_ids: self.selected_candidate_ids.clone(),
            result: self.result.clone(),
            usage_stats: self.usage_stats.clone(),
        };
        if session.state != SessionState::Composition {
            session.update_candidate_list();
            if let Some(id) = self.candidate_list.focused_id() {
                session.candidate_list.move_to_id(id);
            }
            session.candidate_list.set_focused(self.candidate_list.focused());
        }
        session
    }
}

impl<C: Converter> std::fmt::Debug for ConversionSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionSession")
            .field("state", &self.state)
            .field("segment_index", &self.segment_index)
            .field("segments", &self.segments.segments_size())
            .field("selected_candidate_ids", &self.selected_candidate_ids)
            .field("candidate_list_visible", &self.candidate_list_visible)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_set_membership() {
        assert!(CANDIDATE_STATES.contains(SessionState::Conversion.as_set()));
        assert!(!CANDIDATE_STATES.contains(SessionState::Composition.as_set()));
        let mixed = StateSet::COMPOSITION | StateSet::SUGGESTION;
        assert!(mixed.contains(SessionState::Suggestion.as_set()));
        assert!(!mixed.contains(SessionState::Prediction.as_set()));
    }

    #[test]
    fn test_append_new_candidates_scans_only_new_ones() {
        let mut segment = Segment::with_values("きょう", &["今日", "京"]);
        let mut list = CandidateList::new();
        assert!(!append_new_candidates(&mut list, &segment));
        assert_eq!(list.size(), 2);

        segment.push_candidate(
            Candidate::new("きょう", "強").with_attributes(CandidateAttributes::SPELLING_CORRECTION),
        );
        assert!(append_new_candidates(&mut list, &segment));
        assert_eq!(list.size(), 3);
        assert_eq!(list.next_available_id(), 3);
        assert!(!append_new_candidates(&mut list, &segment));
        assert_eq!(list.size(), 3);
    }

    #[test]
    fn test_default_state_is_composition() {
        assert_eq!(SessionState::default(), SessionState::Composition);
        assert_eq!(SessionState::Prediction.category(), Category::Prediction);
    }
}
