//! Transliteration (T13N) kinds and their display attributes.
//!
//! Every segment carries a fixed array of meta-candidates, one per
//! `TransliterationType`, stored in `TransliterationType::ALL` order. The
//! candidate list tags each meta-candidate with the `T13nAttributes` of its
//! kind so transliteration cycling can search by attribute.

use crate::candidate::Candidate;
use crate::segment::meta_id;
use crate::utils::to_fullwidth;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Script, width and case properties of a transliterated candidate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct T13nAttributes: u8 {
        const HALF_WIDTH = 1 << 0;
        const FULL_WIDTH = 1 << 1;
        const ASCII = 1 << 2;
        const HIRAGANA = 1 << 3;
        const KATAKANA = 1 << 4;
        const UPPER = 1 << 5;
        const LOWER = 1 << 6;
        const CAPITALIZED = 1 << 7;
    }
}

impl T13nAttributes {
    /// Case bits of an ASCII transliteration.
    pub const CASE_MASK: Self = Self::UPPER.union(Self::LOWER).union(Self::CAPITALIZED);
}

/// Transliteration kinds in meta-candidate slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransliterationType {
    Hiragana,
    FullKatakana,
    HalfAscii,
    HalfAsciiUpper,
    HalfAsciiLower,
    HalfAsciiCapitalized,
    FullAscii,
    FullAsciiUpper,
    FullAsciiLower,
    FullAsciiCapitalized,
    HalfKatakana,
}

impl TransliterationType {
    pub const ALL: [TransliterationType; 11] = [
        TransliterationType::Hiragana,
        TransliterationType::FullKatakana,
        TransliterationType::HalfAscii,
        TransliterationType::HalfAsciiUpper,
        TransliterationType::HalfAsciiLower,
        TransliterationType::HalfAsciiCapitalized,
        TransliterationType::FullAscii,
        TransliterationType::FullAsciiUpper,
        TransliterationType::FullAsciiLower,
        TransliterationType::FullAsciiCapitalized,
        TransliterationType::HalfKatakana,
    ];

    pub fn attributes(self) -> T13nAttributes {
        use T13nAttributes as A;
        match self {
            Self::Hiragana => A::FULL_WIDTH | A::HIRAGANA,
            Self::FullKatakana => A::FULL_WIDTH | A::KATAKANA,
            Self::HalfAscii => A::HALF_WIDTH | A::ASCII,
            Self::HalfAsciiUpper => A::HALF_WIDTH | A::ASCII | A::UPPER,
            Self::HalfAsciiLower => A::HALF_WIDTH | A::ASCII | A::LOWER,
            Self::HalfAsciiCapitalized => A::HALF_WIDTH | A::ASCII | A::CAPITALIZED,
            Self::FullAscii => A::FULL_WIDTH | A::ASCII,
            Self::FullAsciiUpper => A::FULL_WIDTH | A::ASCII | A::UPPER,
            Self::FullAsciiLower => A::FULL_WIDTH | A::ASCII | A::LOWER,
            Self::FullAsciiCapitalized => A::FULL_WIDTH | A::ASCII | A::CAPITALIZED,
            Self::HalfKatakana => A::HALF_WIDTH | A::KATAKANA,
        }
    }

    /// Slot of this kind in a segment's meta-candidate array.
    pub fn meta_index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    /// Candidate id of this kind's meta-candidate.
    pub fn meta_id(self) -> i32 {
        meta_id(self.meta_index())
    }

    pub fn from_meta_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Build the full meta-candidate array for one reading.
///
/// `ascii` is the raw romaji as typed; its case and width variants are
/// derived here.
pub fn make_meta_candidates(
    key: &str,
    hiragana: &str,
    full_katakana: &str,
    half_katakana: &str,
    ascii: &str,
) -> Vec<Candidate> {
    TransliterationType::ALL
        .iter()
        .map(|t| {
            let value = match t {
                TransliterationType::Hiragana => hiragana.to_string(),
                TransliterationType::FullKatakana => full_katakana.to_string(),
                TransliterationType::HalfKatakana => half_katakana.to_string(),
                TransliterationType::HalfAscii => ascii.to_string(),
                TransliterationType::HalfAsciiUpper => ascii.to_uppercase(),
                TransliterationType::HalfAsciiLower => ascii.to_lowercase(),
                TransliterationType::HalfAsciiCapitalized => capitalize(ascii),
                TransliterationType::FullAscii => to_fullwidth(ascii),
                TransliterationType::FullAsciiUpper => to_fullwidth(&ascii.to_uppercase()),
                TransliterationType::FullAsciiLower => to_fullwidth(&ascii.to_lowercase()),
                TransliterationType::FullAsciiCapitalized => to_fullwidth(&capitalize(ascii)),
            };
            Candidate::new(key, value)
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
