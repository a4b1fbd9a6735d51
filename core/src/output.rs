//! Output projections for renderers and transports.
//!
//! After each session operation the host reads an `Output`: the preedit to
//! draw inline, the committed result (if any), the paged candidate window and
//! the flattened list of every candidate word. These are plain data; encoding
//! them for the wire is the transport's business.
//!
//! Design philosophy matches the old platform context: zero abstraction, just
//! data with public fields. Platform-specific strings come from `OutputConfig`.

use crate::candidate::Candidate;
use crate::candidate_list::{CandidateList, Entry, ListView};
use crate::input_buffer::Composer;
use crate::segment::{Segment, Segments};
use crate::OutputConfig;
use ahash::AHashMap;
use serde::Serialize;
use std::collections::VecDeque;

/// How a preedit segment is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Annotation {
    Underline,
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreeditSegment {
    pub annotation: Annotation,
    pub value: String,
    /// Length of `value` in chars.
    pub value_length: usize,
    pub key: String,
}

/// Inline, not yet committed text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Preedit {
    pub segments: Vec<PreeditSegment>,
    /// Cursor offset in chars.
    pub cursor: usize,
    /// Char offset of the focused segment while converting.
    pub highlighted_position: Option<usize>,
}

impl Preedit {
    /// Concatenated text of all segments.
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.value.as_str()).collect()
    }

    fn add_segment(&mut self, key: &str, value: &str, annotation: Annotation) {
        if value.is_empty() {
            return;
        }
        self.segments.push(PreeditSegment {
            annotation,
            value: value.to_string(),
            value_length: value.chars().count(),
            key: key.to_string(),
        });
    }
}

/// One learned word of a committed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultToken {
    pub content_key: String,
    pub content_value: String,
    pub functional_key: String,
    pub functional_value: String,
}

/// Committed text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CommitResult {
    pub key: String,
    pub value: String,
    /// Cursor move after insertion; -1 lands between a bracket pair.
    pub cursor_offset: i32,
    pub tokens: Vec<ResultToken>,
}

impl CommitResult {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            cursor_offset: cursor_offset_for(&value),
            value,
            tokens: Vec::new(),
        }
    }

    /// Append one token per inner segment of `candidate`.
    pub fn add_tokens_from(&mut self, candidate: &Candidate) {
        for inner in candidate.inner_segments() {
            self.tokens.push(ResultToken {
                content_key: inner.content_key.to_string(),
                content_value: inner.content_value.to_string(),
                functional_key: inner.functional_key().to_string(),
                functional_value: inner.functional_value().to_string(),
            });
        }
    }
}

/// Which list the candidate window is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Conversion,
    Prediction,
    Suggestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayType {
    Main,
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CandidateAnnotation {
    pub prefix: String,
    pub suffix: String,
    pub description: String,
    pub shortcut: Option<String>,
    pub deletable: bool,
}

/// One row of the candidate window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowCandidate {
    pub index: usize,
    pub id: i32,
    pub value: String,
    pub annotation: CandidateAnnotation,
    /// Index into `UsagePanel::information`.
    pub information_id: Option<usize>,
}

/// Usage explanation shared by every candidate with the same usage id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Information {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub candidate_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UsagePanel {
    pub information: Vec<Information>,
    pub focused_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Footer {
    pub label: String,
    pub index_visible: bool,
    pub logo_visible: bool,
}

/// Paged slice of the focused candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateWindow {
    pub category: Category,
    pub display_type: DisplayType,
    /// Rows at this level.
    pub size: usize,
    pub page_size: usize,
    /// Char offset in the preedit (main window) or row in the parent (sub window).
    pub position: usize,
    pub focused_index: Option<usize>,
    pub candidates: Vec<WindowCandidate>,
    pub sub_window: Option<Box<CandidateWindow>>,
    pub usages: Option<UsagePanel>,
    pub footer: Option<Footer>,
}

/// One entry of the flattened candidate list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateWord {
    pub id: i32,
    pub index: usize,
    /// Present only when it differs from the segment key.
    pub key: Option<String>,
    pub value: String,
    pub annotation: CandidateAnnotation,
}

/// Every candidate of the focused list, breadth-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllCandidateWords {
    pub category: Category,
    pub candidates: Vec<CandidateWord>,
    pub focused_index: Option<usize>,
}

/// Everything a renderer needs after one session operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Output {
    pub preedit: Option<Preedit>,
    pub result: Option<CommitResult>,
    pub candidate_window: Option<CandidateWindow>,
    pub all_candidate_words: Option<AllCandidateWords>,
    pub incognito_candidate_words: Option<AllCandidateWords>,
}

// ========== Builders ==========

const BRACKET_PAIRS: &[(char, char)] = &[
    ('(', ')'),
    ('[', ']'),
    ('{', '}'),
    ('<', '>'),
    ('"', '"'),
    ('\'', '\''),
    ('（', '）'),
    ('［', '］'),
    ('｛', '｝'),
    ('＜', '＞'),
    ('「', '」'),
    ('『', '』'),
    ('【', '】'),
    ('〔', '〕'),
    ('〈', '〉'),
    ('《', '》'),
    ('〘', '〙'),
    ('〚', '〛'),
    ('“', '”'),
    ('‘', '’'),
];

/// -1 when `value` is exactly an open/close bracket pair, else 0.
pub fn cursor_offset_for(value: &str) -> i32 {
    let mut chars = value.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(open), Some(close), None) if BRACKET_PAIRS.contains(&(open, close)) => -1,
        _ => 0,
    }
}

/// Preedit for raw composition: one underlined segment, composer cursor.
pub fn fill_composition_preedit<C: Composer + ?Sized>(composer: &C) -> Option<Preedit> {
    if composer.is_empty() {
        return None;
    }
    let text = composer.current_text();
    let mut preedit = Preedit {
        cursor: composer.cursor_position(),
        ..Default::default()
    };
    preedit.add_segment(&text, &text, Annotation::Underline);
    Some(preedit)
}

/// Preedit while converting: highlighted focused segment, underlined others.
///
/// `selected_ids[i]` is the candidate shown for conversion segment `i`; the
/// focused segment shows `focused_id`.
pub fn fill_conversion_preedit(
    segments: &Segments,
    segment_index: usize,
    focused_id: i32,
    selected_ids: &[i32],
) -> Option<Preedit> {
    let mut preedit = Preedit::default();
    let mut position = 0;
    for (i, segment) in segments.conversion_segments().iter().enumerate() {
        let (id, annotation) = if i == segment_index {
            preedit.highlighted_position = Some(position);
            (focused_id, Annotation::Highlight)
        } else {
            (selected_ids.get(i).copied().unwrap_or(0), Annotation::Underline)
        };
        let Some(candidate) = segment.candidate(id) else {
            tracing::error!(segment = i, id, "selected candidate missing from segment");
            return None;
        };
        preedit.add_segment(segment.key(), &candidate.value, annotation);
        position += candidate.value.chars().count();
    }
    preedit.cursor = position;
    Some(preedit)
}

fn annotation_for(candidate: &Candidate) -> CandidateAnnotation {
    CandidateAnnotation {
        prefix: candidate.prefix.clone(),
        suffix: candidate.suffix.clone(),
        description: candidate.description.clone(),
        shortcut: None,
        deletable: candidate.is_deletable(),
    }
}

/// Paged candidate window for `list` over `segment`.
///
/// `shortcuts` are the selection keys to label the page with, if any.
pub fn fill_candidate_window(
    segment: &Segment,
    list: &CandidateList,
    position: usize,
    category: Category,
    shortcuts: Option<&str>,
    config: &OutputConfig,
) -> Option<CandidateWindow> {
    let mut window = fill_level(segment, list.root(), list.focused(), position, category)?;

    if let Some(keys) = shortcuts {
        for (row, key) in window.candidates.iter_mut().zip(keys.chars()) {
            row.annotation.shortcut = Some(key.to_string());
        }
    }

    let usages = fill_usages(segment, list, &mut window.candidates);
    if !usages.information.is_empty() {
        window.usages = Some(usages);
    }

    window.footer = Some(fill_footer(category, &window, config));
    Some(window)
}

fn fill_level(
    segment: &Segment,
    level: ListView<'_>,
    focused: bool,
    position: usize,
    category: Category,
) -> Option<CandidateWindow> {
    let (begin, end) = level.get_page_range(level.focused_index());
    let mut candidates = Vec::with_capacity(end - begin);
    for index in begin..end {
        let entry = level.entry(index)?;
        let row = match entry {
            Entry::Candidate { id, .. } => {
                let Some(candidate) = segment.candidate(*id) else {
                    tracing::error!(id, "candidate list refers to a missing candidate");
                    return None;
                };
                WindowCandidate {
                    index,
                    id: *id,
                    value: candidate.value.clone(),
                    annotation: annotation_for(candidate),
                    information_id: None,
                }
            }
            Entry::SubList(sub) => {
                let sub = level.sub_list(*sub)?;
                WindowCandidate {
                    index,
                    id: sub.focused_id().unwrap_or(0),
                    value: sub.name().to_string(),
                    annotation: CandidateAnnotation::default(),
                    information_id: None,
                }
            }
        };
        candidates.push(row);
    }

    let sub_window = match level.focused_entry() {
        Some(Entry::SubList(sub)) if focused => {
            let sub = level.sub_list(*sub)?;
            fill_level(segment, sub, focused, level.focused_index(), category).map(Box::new)
        }
        _ => None,
    };

    Some(CandidateWindow {
        category,
        display_type: if sub_window.is_some() {
            DisplayType::Cascade
        } else {
            DisplayType::Main
        },
        size: level.size(),
        page_size: end - begin,
        position,
        focused_index: focused.then(|| level.focused_index()),
        candidates,
        sub_window,
        usages: None,
        footer: None,
    })
}

/// Merge usage information of the page rows by usage id.
fn fill_usages(segment: &Segment, list: &CandidateList, rows: &mut [WindowCandidate]) -> UsagePanel {
    let mut panel = UsagePanel::default();
    if !list.focused() {
        return panel;
    }
    let focused_id = list.focused_id();
    let mut by_usage_id: AHashMap<u32, usize> = AHashMap::new();
    for row in rows.iter_mut() {
        if matches!(list.entry(row.index), Some(Entry::SubList(_))) {
            continue;
        }
        let Some(candidate) = segment.candidate(row.id) else {
            continue;
        };
        if candidate.usage_title.is_empty() {
            continue;
        }
        let usage_id = candidate.usage_id.unwrap_or(0);
        let index = *by_usage_id.entry(usage_id).or_insert_with(|| {
            panel.information.push(Information {
                id: usage_id,
                title: candidate.usage_title.clone(),
                description: candidate.usage_description.clone(),
                candidate_ids: Vec::new(),
            });
            panel.information.len() - 1
        });
        panel.information[index].candidate_ids.push(row.id);
        row.information_id = Some(index);
        if Some(row.id) == focused_id {
            panel.focused_index = Some(index);
        }
    }
    panel
}

fn fill_footer(category: Category, window: &CandidateWindow, config: &OutputConfig) -> Footer {
    if category == Category::Suggestion {
        return Footer {
            label: config.suggestion_footer_label.clone(),
            ..Default::default()
        };
    }
    let focused_deletable = window.focused_index.is_some_and(|focused| {
        window
            .candidates
            .iter()
            .any(|row| row.index == focused && row.annotation.deletable)
    });
    Footer {
        label: if focused_deletable {
            config.delete_instruction_label.clone()
        } else {
            String::new()
        },
        index_visible: config.show_index,
        logo_visible: config.show_logo,
    }
}

/// Flatten `list` breadth-first: every root row, then every depth-1 row, ...
pub fn fill_all_candidate_words(segment: &Segment, list: &CandidateList, category: Category) -> Option<AllCandidateWords> {
    let mut words = Vec::with_capacity(list.leaf_count());
    let mut queue = VecDeque::from([list.root()]);
    while let Some(level) = queue.pop_front() {
        for entry in level.entries() {
            match entry {
                Entry::Candidate { id, .. } => {
                    let Some(candidate) = segment.candidate(*id) else {
                        tracing::error!(id, "candidate list refers to a missing candidate");
                        return None;
                    };
                    words.push(CandidateWord {
                        id: *id,
                        index: words.len(),
                        key: (candidate.key != segment.key()).then(|| candidate.key.clone()),
                        value: candidate.value.clone(),
                        annotation: annotation_for(candidate),
                    });
                }
                Entry::SubList(sub) => queue.extend(level.sub_list(*sub)),
            }
        }
    }

    let focused_index = list
        .focused_id()
        .filter(|_| list.focused())
        .and_then(|id| words.iter().position(|w| w.id == id));
    Some(AllCandidateWords {
        category,
        candidates: words,
        focused_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateAttributes;
    use crate::input_buffer::InputBuffer;

    fn segment(key: &str, values: &[&str]) -> Segment {
        Segment::with_values(key, values)
    }

    fn list_for(segment: &Segment) -> CandidateList {
        let mut list = CandidateList::with_page_size(3);
        for (i, c) in segment.candidates().iter().enumerate() {
            list.add_candidate(i as i32, &c.value);
        }
        list
    }

    #[test]
    fn test_cursor_offset_for_brackets() {
        assert_eq!(cursor_offset_for("「」"), -1);
        assert_eq!(cursor_offset_for("()"), -1);
        assert_eq!(cursor_offset_for("(a)"), 0);
        assert_eq!(cursor_offset_for(")("), 0);
        assert_eq!(cursor_offset_for("京都"), 0);
    }

    #[test]
    fn test_composition_preedit() {
        let mut buf = InputBuffer::from_text("きょうと");
        buf.move_left();
        let preedit = fill_composition_preedit(&buf).unwrap();
        assert_eq!(preedit.text(), "きょうと");
        assert_eq!(preedit.cursor, 3);
        assert_eq!(preedit.segments[0].annotation, Annotation::Underline);
        assert!(fill_composition_preedit(&InputBuffer::new()).is_none());
    }

    #[test]
    fn test_conversion_preedit_highlights_focused_segment() {
        let segments = Segments::from_segments(vec![
            segment("わたしの", &["私の", "渡しの"]),
            segment("なまえ", &["名前", "名まえ"]),
        ]);
        let preedit = fill_conversion_preedit(&segments, 1, 1, &[1, 0]).unwrap();
        assert_eq!(preedit.text(), "渡しの名まえ");
        assert_eq!(preedit.segments[0].annotation, Annotation::Underline);
        assert_eq!(preedit.segments[1].annotation, Annotation::Highlight);
        assert_eq!(preedit.highlighted_position, Some(3));
        assert_eq!(preedit.cursor, 6);
        assert!(fill_conversion_preedit(&segments, 0, 7, &[0, 0]).is_none());
    }

    #[test]
    fn test_result_tokens() {
        let mut result = CommitResult::new("はしった", "走った");
        result.add_tokens_from(&Candidate::new("はしった", "走った").with_content("はしっ", "走っ"));
        assert_eq!(result.cursor_offset, 0);
        assert_eq!(result.tokens.len(), 1);
        assert_eq!(result.tokens[0].content_value, "走っ");
        assert_eq!(result.tokens[0].functional_key, "た");
    }

    #[test]
    fn test_candidate_window_page_and_shortcuts() {
        let seg = segment("a", &["a0", "a1", "a2", "a3", "a4"]);
        let mut list = list_for(&seg);
        list.set_focused(true);
        list.move_to_id(4);
        let config = OutputConfig::default();
        let window = fill_candidate_window(&seg, &list, 2, Category::Conversion, Some("123"), &config).unwrap();
        assert_eq!(window.size, 5);
        assert_eq!(window.position, 2);
        assert_eq!(window.focused_index, Some(4));
        let values: Vec<_> = window.candidates.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["a3", "a4"]);
        assert_eq!(window.candidates[1].annotation.shortcut.as_deref(), Some("2"));
        let footer = window.footer.unwrap();
        assert!(footer.index_visible);
        assert!(footer.label.is_empty());
    }

    #[test]
    fn test_footer_for_suggestion_and_deletable() {
        let mut seg = segment("き", &["京都"]);
        seg.push_candidate(Candidate::new("き", "木").with_attributes(CandidateAttributes::USER_HISTORY_PREDICTION));
        let mut list = list_for(&seg);
        let config = OutputConfig::default();

        let window = fill_candidate_window(&seg, &list, 0, Category::Suggestion, None, &config).unwrap();
        assert_eq!(window.footer.unwrap().label, config.suggestion_footer_label);
        assert_eq!(window.focused_index, None);

        list.move_to_id(1);
        let window = fill_candidate_window(&seg, &list, 0, Category::Prediction, None, &config).unwrap();
        assert!(window.candidates[1].annotation.deletable);
        assert_eq!(window.footer.unwrap().label, config.delete_instruction_label);
    }

    #[test]
    fn test_usages_merge_by_id() {
        let mut seg = Segment::new("かえる");
        seg.push_candidate(Candidate::new("かえる", "帰る").with_usage(7, "帰る", "home"));
        seg.push_candidate(Candidate::new("かえる", "蛙").with_usage(8, "蛙", "frog"));
        seg.push_candidate(Candidate::new("かえる", "帰る").with_usage(7, "帰る", "home"));
        seg.push_candidate(Candidate::new("かえる", "還る").with_usage(7, "帰る", "home"));
        let mut list = CandidateList::with_page_size(9);
        for (i, c) in seg.candidates().iter().enumerate() {
            list.add_candidate(i as i32, &c.value);
        }
        list.move_to_id(2);

        let window = fill_candidate_window(&seg, &list, 0, Category::Conversion, None, &OutputConfig::default()).unwrap();
        let usages = window.usages.unwrap();
        assert_eq!(usages.information.len(), 2);
        assert_eq!(usages.information[0].candidate_ids, vec![0, 3]);
        assert_eq!(usages.focused_index, Some(0));
        assert_eq!(window.candidates[2].information_id, Some(0));
    }

    #[test]
    fn test_sub_window_for_focused_sub_list() {
        let mut seg = segment("きょうと", &["京都"]);
        seg.set_meta_candidates(vec![Candidate::new("きょうと", "きょうと"), Candidate::new("きょうと", "キョウト")]);
        let mut list = CandidateList::with_page_size(9);
        list.add_candidate(0, "京都");
        {
            let mut sub = list.add_sub_candidate_list();
            sub.set_name("そのほかの文字種");
            sub.add_candidate(-1, "きょうと");
            sub.add_candidate(-2, "キョウト");
        }
        list.move_to_id(-2);

        let window = fill_candidate_window(&seg, &list, 0, Category::Conversion, None, &OutputConfig::default()).unwrap();
        assert_eq!(window.display_type, DisplayType::Cascade);
        assert_eq!(window.candidates[1].value, "そのほかの文字種");
        assert_eq!(window.candidates[1].id, -2);
        let sub = window.sub_window.unwrap();
        assert_eq!(sub.position, 1);
        assert_eq!(sub.focused_index, Some(1));
        assert_eq!(sub.candidates[1].value, "キョウト");
    }

    #[test]
    fn test_all_candidate_words_breadth_first() {
        let mut seg = Segment::new("k");
        for v in ["0", "1", "2", "3", "4", "5"] {
            seg.push_candidate(Candidate::new("k", v));
        }
        seg.push_candidate(Candidate::new("other", "6"));
        let mut list = CandidateList::new();
        list.add_candidate(0, "0");
        {
            let mut sub1 = list.add_sub_candidate_list();
            sub1.add_candidate(1, "1");
            {
                let mut sub2 = sub1.add_sub_candidate_list();
                sub2.add_candidate(4, "4");
            }
            sub1.add_candidate(2, "2");
        }
        {
            let mut sub3 = list.add_sub_candidate_list();
            sub3.add_candidate(3, "3");
            sub3.add_candidate(6, "6");
        }
        list.add_candidate(5, "5");
        list.move_to_id(4);

        let words = fill_all_candidate_words(&seg, &list, Category::Conversion).unwrap();
        let ids: Vec<i32> = words.candidates.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![0, 5, 1, 2, 3, 6, 4]);
        let indices: Vec<usize> = words.candidates.iter().map(|w| w.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(words.focused_index, Some(6));
        assert_eq!(words.candidates[5].key.as_deref(), Some("other"));
        assert_eq!(words.candidates[0].key, None);
    }

    #[test]
    fn test_output_serializes() {
        let output = Output {
            result: Some(CommitResult::new("きょうと", "京都")),
            ..Default::default()
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["result"]["value"], "京都");
        assert!(json["preedit"].is_null());
    }
}
