//! Commit counters derived from the per-segment selection array.

use crate::session::SessionState;
use ahash::AHashMap;

/// Named usage counters, e.g. `CommitFromConversion` or `ConversionCandidates2`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageStats {
    counters: AHashMap<String, u64>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &str) {
        *self.counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Record one commit made from `state` with the given selected ids.
    pub fn record_commit(&mut self, state: SessionState, selected_ids: &[i32]) {
        let source = match state {
            SessionState::Composition => "Composition",
            SessionState::Suggestion => "Suggestion",
            SessionState::Prediction => "Prediction",
            SessionState::Conversion => "Conversion",
        };
        self.increment("Commit");
        self.increment(&format!("CommitFrom{}", source));
        if state == SessionState::Composition {
            return;
        }
        for &id in selected_ids {
            self.increment(&format!("{}Candidates{}", source, bucket(id)));
        }
        tracing::debug!(source, segments = selected_ids.len(), "commit recorded");
    }
}

fn bucket(id: i32) -> String {
    match id {
        i32::MIN..=-1 => "Transliteration".to_string(),
        0..=9 => id.to_string(),
        _ => "GE10".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_commit_buckets() {
        let mut stats = UsageStats::new();
        stats.record_commit(SessionState::Conversion, &[0, 3, 12, -2]);
        assert_eq!(stats.get("Commit"), 1);
        assert_eq!(stats.get("CommitFromConversion"), 1);
        assert_eq!(stats.get("ConversionCandidates0"), 1);
        assert_eq!(stats.get("ConversionCandidates3"), 1);
        assert_eq!(stats.get("ConversionCandidatesGE10"), 1);
        assert_eq!(stats.get("ConversionCandidatesTransliteration"), 1);
    }

    #[test]
    fn test_composition_commit_has_no_buckets() {
        let mut stats = UsageStats::new();
        stats.record_commit(SessionState::Composition, &[]);
        assert_eq!(stats.get("CommitFromComposition"), 1);
        assert_eq!(stats.get("Commit"), 1);
    }
}
