//! libconversion-core
//!
//! Conversion-session core of a phonetic input method: turns composed
//! phonetic text into navigable candidates, tracks the chosen candidate per
//! segment and produces the committed text plus every UI-facing projection.
//!
//! The phonetic-to-text engine and the keystroke composer are collaborators
//! behind the `Converter` and `Composer` traits.
//!
//! Public API:
//! - `ConversionSession` - State machine over one editing session
//! - `CandidateList` - Recursive, paged candidate list
//! - `Segment` / `Segments` - Converter output
//! - `Converter` / `Composer` - Collaborator seams
//! - `Output` - Preedit, result, candidate window and flattened words
//! - `SessionConfig` - Configuration and platform strings
use serde::{Deserialize, Serialize};

pub mod candidate;
pub use candidate::{Candidate, CandidateAttributes, CandidateCommand, InnerSegmentBoundary};

pub mod segment;
pub use segment::{Segment, SegmentType, Segments};

pub mod transliteration;
pub use transliteration::{T13nAttributes, TransliterationType};

pub mod candidate_list;
pub use candidate_list::{CandidateList, CandidateListMut, Entry, ListView, SubListId};

pub mod input_buffer;
pub use input_buffer::{Composer, InputBuffer};

pub mod converter;
pub use converter::{ConversionRequest, Converter, RequestType};

pub mod error;
pub use error::{Result, SessionError};

pub mod output;
pub use output::{AllCandidateWords, CandidateWindow, Category, CommitResult, Output, Preedit};

pub mod stats;
pub use stats::UsageStats;

pub mod session;
pub use session::{CommitOutcome, ConversionSession, SessionState, StateSet};

/// Platform-specific strings and footer toggles used by the output builders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Footer label while suggesting
    pub suggestion_footer_label: String,
    /// Footer label when the focused candidate can be deleted from history
    pub delete_instruction_label: String,
    /// Row name of the nested transliteration group
    pub transliteration_group_name: String,
    pub show_logo: bool,
    pub show_index: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suggestion_footer_label: "Tabキーで選択".to_string(),
            delete_instruction_label: "Ctrl+Delで履歴から削除".to_string(),
            transliteration_group_name: "そのほかの文字種".to_string(),
            show_logo: true,
            show_index: true,
        }
    }
}

/// Configuration of a conversion session.
///
/// Any field may be omitted from a TOML document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Rows per candidate window page
    pub page_size: usize,

    /// Keys for selecting candidates (default: "123456789", alternative: "asdfghjkl")
    /// Also the shortcut labels of the candidate window.
    pub select_keys: String,

    /// Put transliterations in a nested group instead of the main list
    pub use_cascading_window: bool,

    // Suggestion Settings
    /// Ask for prediction-quality results when suggesting
    pub use_prediction_candidate: bool,
    /// Suggest for the text before the cursor when it sits inside the composition
    pub use_partial_composition: bool,
    /// Also compute candidates without user history for the incognito projection
    pub fill_incognito_candidate_words: bool,

    // Toggled by command candidates
    pub incognito_mode: bool,
    pub presentation_mode: bool,

    pub output: OutputConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: 9,
            select_keys: "123456789".to_string(),
            use_cascading_window: true,
            use_prediction_candidate: false,
            use_partial_composition: true,
            fill_incognito_candidate_words: false,
            incognito_mode: false,
            presentation_mode: false,
            output: OutputConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: SessionConfig = toml::from_str(&content)?;
        config.page_size = config.page_size.max(1);
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let mut config: SessionConfig = toml::from_str(content)?;
        config.page_size = config.page_size.max(1);
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    // ========== Selection Keys Management ==========

    /// Set the selection keys string. Empty strings are ignored.
    ///
    /// # Example
    /// ```
    /// # use libconversion_core::SessionConfig;
    /// let mut config = SessionConfig::default();
    /// config.set_select_keys("asdfghjkl"); // Use home row keys
    /// assert_eq!(config.selection_key_index('d'), Some(2));
    /// ```
    pub fn set_select_keys(&mut self, keys: &str) {
        if !keys.is_empty() {
            self.select_keys = keys.to_string();
        }
    }

    /// Index (0-based) of a selection key, or None if `ch` is not one.
    pub fn selection_key_index(&self, ch: char) -> Option<usize> {
        self.select_keys.chars().position(|c| c == ch)
    }
}

/// Utility helpers.
pub mod utils {
    use unicode_normalization::UnicodeNormalization;

    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        s.nfc().collect::<String>().trim().to_string()
    }

    /// Convert ASCII characters to full-width equivalents.
    ///
    /// Space becomes the ideographic space; other printable ASCII maps to
    /// U+FF01..U+FF5E. Non-ASCII characters are passed through unchanged.
    pub fn to_fullwidth(s: &str) -> String {
        s.chars()
            .map(|ch| match ch {
                ' ' => '\u{3000}',
                '!'..='~' => char::from_u32(ch as u32 - 0x21 + 0xFF01).unwrap_or(ch),
                _ => ch,
            })
            .collect()
    }

    /// Convert full-width characters back to ASCII (half-width).
    pub fn to_halfwidth(s: &str) -> String {
        s.chars()
            .map(|ch| match ch {
                '\u{3000}' => ' ',
                '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFF01 + 0x21).unwrap_or(ch),
                _ => ch,
            })
            .collect()
    }

    fn is_kana_or_kanji(ch: char) -> bool {
        matches!(ch,
            '\u{3041}'..='\u{309F}'   // hiragana
            | '\u{30A0}'..='\u{30FF}' // katakana
            | '\u{31F0}'..='\u{31FF}' // katakana extensions
            | '\u{3400}'..='\u{4DBF}' // CJK extension A
            | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
            | '\u{F900}'..='\u{FAFF}' // CJK compatibility ideographs
            | '\u{3005}'              // 々
        )
    }

    /// Whether `s` contains kana or kanji after NFKC folding.
    ///
    /// Folding maps half-width katakana to full-width first, so "ｷｮｳﾄ" counts.
    pub fn contains_kana_or_kanji(s: &str) -> bool {
        s.nfkc().any(is_kana_or_kanji)
    }
}
