//! Candidate types for segment conversion.
//!
//! This module provides:
//! - `Candidate`: one concrete text alternative for a segment
//! - `CandidateAttributes`: bit-set describing where a candidate came from
//! - `CandidateCommand`: configuration side effect carried by command candidates
//! - `InnerSegmentBoundary`: sub-key boundaries inside a multi-word candidate

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Origin and behaviour markers attached to a candidate by the converter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CandidateAttributes: u32 {
        /// Highest ranked candidate of the segment.
        const BEST_CANDIDATE = 1 << 0;
        /// Produced by spelling correction; forces the candidate window open.
        const SPELLING_CORRECTION = 1 << 1;
        /// Looked up from the user dictionary.
        const USER_DICTIONARY = 1 << 2;
        /// Learned from the user's conversion history.
        const USER_HISTORY = 1 << 3;
        /// Predicted from the user's input history.
        const USER_HISTORY_PREDICTION = 1 << 4;
        /// Selecting this candidate triggers a `CandidateCommand` instead of a commit.
        const COMMAND_CANDIDATE = 1 << 5;
        /// Only a prefix of the typed key was consumed (see `consumed_key_size`).
        const PARTIALLY_KEY_CONSUMED = 1 << 6;
        /// Candidate carries an `inner_segment_boundary` list.
        const INNER_SEGMENT_BOUNDARY = 1 << 7;
        /// Produced by realtime (whole composition) conversion.
        const REALTIME_CONVERSION = 1 << 8;
        /// Produced by typing correction.
        const TYPING_CORRECTION = 1 << 9;
        /// Converter must not learn from this candidate.
        const NO_LEARNING = 1 << 10;
    }
}

/// Side effect performed when a command candidate is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateCommand {
    EnableIncognitoMode,
    DisableIncognitoMode,
    EnablePresentationMode,
    DisablePresentationMode,
}

/// Char lengths of one word inside a candidate spanning several sub-keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InnerSegmentBoundary {
    pub key_len: usize,
    pub value_len: usize,
    pub content_key_len: usize,
    pub content_value_len: usize,
}

impl InnerSegmentBoundary {
    pub fn new(key_len: usize, value_len: usize, content_key_len: usize, content_value_len: usize) -> Self {
        Self {
            key_len,
            value_len,
            content_key_len,
            content_value_len,
        }
    }
}

/// A borrowed view of one inner segment of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerSegment<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub content_key: &'a str,
    pub content_value: &'a str,
}

impl<'a> InnerSegment<'a> {
    /// Trailing inflection part of the key (key minus content key).
    pub fn functional_key(&self) -> &'a str {
        self.key.get(self.content_key.len()..).unwrap_or("")
    }

    /// Trailing inflection part of the value (value minus content value).
    pub fn functional_value(&self) -> &'a str {
        self.value.get(self.content_value.len()..).unwrap_or("")
    }
}

/// One concrete text alternative for a segment.
///
/// `value` is the surface text. `content_key`/`content_value` are the parts
/// without trailing inflection; they default to the full key and value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub key: String,
    pub value: String,
    pub content_key: String,
    pub content_value: String,
    /// Number of key chars consumed when `PARTIALLY_KEY_CONSUMED` is set.
    pub consumed_key_size: usize,
    pub prefix: String,
    pub suffix: String,
    pub description: String,
    pub usage_id: Option<u32>,
    pub usage_title: String,
    pub usage_description: String,
    pub attributes: CandidateAttributes,
    pub command: Option<CandidateCommand>,
    pub inner_segment_boundary: Vec<InnerSegmentBoundary>,
}

impl Candidate {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        Candidate {
            content_key: key.clone(),
            content_value: value.clone(),
            key,
            value,
            ..Default::default()
        }
    }

    pub fn with_content<K: Into<String>, V: Into<String>>(mut self, content_key: K, content_value: V) -> Self {
        self.content_key = content_key.into();
        self.content_value = content_value.into();
        self
    }

    pub fn with_attributes(mut self, attributes: CandidateAttributes) -> Self {
        self.attributes |= attributes;
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_usage<T: Into<String>, D: Into<String>>(mut self, id: u32, title: T, description: D) -> Self {
        self.usage_id = Some(id);
        self.usage_title = title.into();
        self.usage_description = description.into();
        self
    }

    /// Turn this candidate into a command candidate.
    pub fn with_command(mut self, command: CandidateCommand) -> Self {
        self.command = Some(command);
        self.attributes |= CandidateAttributes::COMMAND_CANDIDATE;
        self
    }

    /// Mark that only the first `size` chars of the typed key were used.
    pub fn with_consumed_key_size(mut self, size: usize) -> Self {
        self.consumed_key_size = size;
        self.attributes |= CandidateAttributes::PARTIALLY_KEY_CONSUMED;
        self
    }

    pub fn with_inner_segments(mut self, boundaries: Vec<InnerSegmentBoundary>) -> Self {
        self.inner_segment_boundary = boundaries;
        self.attributes |= CandidateAttributes::INNER_SEGMENT_BOUNDARY;
        self
    }

    pub fn is_command(&self) -> bool {
        self.attributes.contains(CandidateAttributes::COMMAND_CANDIDATE)
    }

    pub fn is_partially_key_consumed(&self) -> bool {
        self.attributes.contains(CandidateAttributes::PARTIALLY_KEY_CONSUMED)
    }

    /// Whether the user may remove this candidate from the learned history.
    pub fn is_deletable(&self) -> bool {
        self.attributes
            .intersects(CandidateAttributes::USER_HISTORY | CandidateAttributes::USER_HISTORY_PREDICTION)
    }

    pub fn functional_key(&self) -> &str {
        self.key.strip_prefix(self.content_key.as_str()).unwrap_or("")
    }

    pub fn functional_value(&self) -> &str {
        self.value.strip_prefix(self.content_value.as_str()).unwrap_or("")
    }

    /// Whether `inner_segment_boundary` exactly tiles `key` and `value`.
    pub fn has_valid_inner_segments(&self) -> bool {
        if self.inner_segment_boundary.is_empty() {
            return false;
        }
        let mut key_total = 0;
        let mut value_total = 0;
        for b in &self.inner_segment_boundary {
            if b.key_len == 0 || b.value_len == 0 || b.content_key_len > b.key_len || b.content_value_len > b.value_len {
                return false;
            }
            key_total += b.key_len;
            value_total += b.value_len;
        }
        key_total == self.key.chars().count() && value_total == self.value.chars().count()
    }

    /// Split the candidate into its inner segments.
    ///
    /// Without a valid boundary list the whole candidate is one segment.
    pub fn inner_segments(&self) -> Vec<InnerSegment<'_>> {
        if !self.has_valid_inner_segments() {
            return vec![InnerSegment {
                key: &self.key,
                value: &self.value,
                content_key: &self.content_key,
                content_value: &self.content_value,
            }];
        }

        let mut segments = Vec::with_capacity(self.inner_segment_boundary.len());
        let mut key_rest = self.key.as_str();
        let mut value_rest = self.value.as_str();
        for b in &self.inner_segment_boundary {
            let (key, k) = split_at_char(key_rest, b.key_len);
            let (value, v) = split_at_char(value_rest, b.value_len);
            segments.push(InnerSegment {
                key,
                value,
                content_key: split_at_char(key, b.content_key_len).0,
                content_value: split_at_char(value, b.content_value_len).0,
            });
            key_rest = k;
            value_rest = v;
        }
        segments
    }
}

/// Split `s` after `n` chars (clamped to the string length).
pub(crate) fn split_at_char(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((pos, _)) => s.split_at(pos),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults_content_to_full_text() {
        let c = Candidate::new("きょうと", "京都");
        assert_eq!(c.content_key, "きょうと");
        assert_eq!(c.content_value, "京都");
        assert_eq!(c.functional_key(), "");
        assert!(c.attributes.is_empty());
    }

    #[test]
    fn test_functional_parts() {
        let c = Candidate::new("はしった", "走った").with_content("はしっ", "走っ");
        assert_eq!(c.functional_key(), "た");
        assert_eq!(c.functional_value(), "た");
    }

    #[test]
    fn test_command_sets_attribute() {
        let c = Candidate::new("ひみつ", "シークレットモードをオン").with_command(CandidateCommand::EnableIncognitoMode);
        assert!(c.is_command());
        assert_eq!(c.command, Some(CandidateCommand::EnableIncognitoMode));
    }

    #[test]
    fn test_deletable() {
        let c = Candidate::new("a", "A").with_attributes(CandidateAttributes::USER_HISTORY_PREDICTION);
        assert!(c.is_deletable());
        assert!(!Candidate::new("a", "A").is_deletable());
    }

    #[test]
    fn test_inner_segments_split() {
        // わたしの|なまえ → 私の|名前
        let c = Candidate::new("わたしのなまえ", "私の名前").with_inner_segments(vec![
            InnerSegmentBoundary::new(4, 2, 3, 1),
            InnerSegmentBoundary::new(3, 2, 3, 2),
        ]);
        let segs = c.inner_segments();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].key, "わたしの");
        assert_eq!(segs[0].content_value, "私");
        assert_eq!(segs[0].functional_key(), "の");
        assert_eq!(segs[0].functional_value(), "の");
        assert_eq!(segs[1].value, "名前");
        assert_eq!(segs[1].functional_value(), "");
    }

    #[test]
    fn test_invalid_boundary_falls_back_to_whole() {
        let c = Candidate::new("あいう", "阿胃鵜").with_inner_segments(vec![InnerSegmentBoundary::new(2, 2, 2, 2)]);
        assert!(!c.has_valid_inner_segments());
        let segs = c.inner_segments();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].value, "阿胃鵜");
    }

    #[test]
    fn test_split_at_char() {
        assert_eq!(split_at_char("きょうと", 2), ("きょ", "うと"));
        assert_eq!(split_at_char("ab", 5), ("ab", ""));
    }
}
