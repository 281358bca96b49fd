use std::fmt;
use std::str::Chars;

use serde::{Deserialize, Serialize};

use crate::error::RedirectError;

pub const IDENTIFIER_LEN: usize = 6;
/// Index of the character that differs between regional releases of a game.
pub const REGION_SLOT: usize = 3;

/// A validated six-character game identifier such as `GALE01`.
///
/// Only the length is checked. Characters that some pattern syntaxes treat
/// specially are kept as-is and matched literally by [`RegionPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameIdentifier {
    value: String,
    chars: [char; IDENTIFIER_LEN],
}

impl GameIdentifier {
    /// Accept `raw` iff it is present and exactly six characters long.
    pub fn parse(raw: Option<&str>) -> Result<Self, RedirectError> {
        let raw = raw.ok_or(RedirectError::InvalidIdentifier { length: None })?;
        let chars: [char; IDENTIFIER_LEN] = raw
            .chars()
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|chars: Vec<char>| RedirectError::InvalidIdentifier {
                length: Some(chars.len()),
            })?;
        Ok(Self {
            value: raw.to_string(),
            chars,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn chars(&self) -> &[char; IDENTIFIER_LEN] {
        &self.chars
    }

    pub fn region(&self) -> char {
        self.chars[REGION_SLOT]
    }
}

impl fmt::Display for GameIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Which characters the region slot accepts during lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionSlot {
    /// Any single character.
    #[default]
    Any,
    /// A single ASCII uppercase letter, as the legacy wiki lookup did.
    Uppercase,
}

impl RegionSlot {
    pub fn accepts(self, ch: char) -> bool {
        match self {
            Self::Any => true,
            Self::Uppercase => ch.is_ascii_uppercase(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Uppercase => "uppercase",
        }
    }
}

/// Lookup pattern: five fixed characters around a one-character wildcard at
/// [`REGION_SLOT`]. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPattern {
    prefix: [char; REGION_SLOT],
    suffix: [char; IDENTIFIER_LEN - REGION_SLOT - 1],
    slot: RegionSlot,
}

impl RegionPattern {
    pub fn for_identifier(identifier: &GameIdentifier, slot: RegionSlot) -> Self {
        let chars = identifier.chars();
        Self {
            prefix: [chars[0], chars[1], chars[2]],
            suffix: [chars[4], chars[5]],
            slot,
        }
    }

    pub fn prefix(&self) -> String {
        self.prefix.iter().collect()
    }

    pub fn suffix(&self) -> String {
        self.suffix.iter().collect()
    }

    pub fn slot(&self) -> RegionSlot {
        self.slot
    }

    pub fn matches(&self, title: &str) -> bool {
        let mut chars = title.chars();
        if !take_exact(&mut chars, &self.prefix) {
            return false;
        }
        match chars.next() {
            Some(region) if self.slot.accepts(region) => {}
            _ => return false,
        }
        take_exact(&mut chars, &self.suffix) && chars.next().is_none()
    }
}

fn take_exact(chars: &mut Chars<'_>, expected: &[char]) -> bool {
    expected
        .iter()
        .all(|expected| chars.next() == Some(*expected))
}

impl fmt::Display for RegionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = match self.slot {
            RegionSlot::Any => "?",
            RegionSlot::Uppercase => "[A-Z]",
        };
        write!(f, "{}{}{}", self.prefix(), slot, self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> GameIdentifier {
        GameIdentifier::parse(Some(raw)).expect("valid identifier")
    }

    #[test]
    fn parse_rejects_absent_and_wrong_lengths() {
        for raw in [None, Some(""), Some("ABCDE"), Some("ABCDEFG")] {
            let error = GameIdentifier::parse(raw).expect_err("must reject");
            assert!(error.is_invalid_identifier(), "{raw:?}");
        }
    }

    #[test]
    fn parse_accepts_any_six_characters() {
        for raw in ["GALE01", "ab def", "%_*?[]", "ÄÖÜäöü"] {
            let parsed = GameIdentifier::parse(Some(raw)).expect("accepted");
            assert_eq!(parsed.as_str(), raw);
        }
    }

    #[test]
    fn parse_counts_characters_not_bytes() {
        assert!(GameIdentifier::parse(Some("ÄBCDEF")).is_ok());
        let error = GameIdentifier::parse(Some("ÄBCDE")).expect_err("five characters");
        assert!(matches!(
            error,
            RedirectError::InvalidIdentifier { length: Some(5) }
        ));
    }

    #[test]
    fn region_is_fourth_character() {
        assert_eq!(id("GALE01").region(), 'E');
    }

    #[test]
    fn pattern_wildcards_only_the_region_slot() {
        let pattern = RegionPattern::for_identifier(&id("ABCDEF"), RegionSlot::Any);
        assert!(pattern.matches("ABCDEF"));
        assert!(pattern.matches("ABCXEF"));
        assert!(!pattern.matches("ABXCEF"));
        assert!(!pattern.matches("ABCDEX"));
        assert!(!pattern.matches("XBCDEF"));
    }

    #[test]
    fn pattern_requires_exactly_six_characters() {
        let pattern = RegionPattern::for_identifier(&id("ABCDEF"), RegionSlot::Any);
        assert!(!pattern.matches("ABCEF"));
        assert!(!pattern.matches("ABCDEFG"));
        assert!(!pattern.matches("ABCXXEF"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn pattern_is_case_sensitive() {
        let pattern = RegionPattern::for_identifier(&id("ABCDEF"), RegionSlot::Any);
        assert!(!pattern.matches("abcDef"));
        assert!(!pattern.matches("ABCDEf"));
    }

    #[test]
    fn pattern_treats_special_characters_literally() {
        let pattern = RegionPattern::for_identifier(&id("A%_D*?"), RegionSlot::Any);
        assert!(pattern.matches("A%_X*?"));
        assert!(!pattern.matches("ABCX*?"));
        assert!(!pattern.matches("A%_XEF"));
    }

    #[test]
    fn uppercase_slot_rejects_other_region_characters() {
        let pattern = RegionPattern::for_identifier(&id("GALE01"), RegionSlot::Uppercase);
        assert!(pattern.matches("GALP01"));
        assert!(!pattern.matches("GAL001"));
        assert!(!pattern.matches("GALe01"));
    }

    #[test]
    fn pattern_display_marks_the_wildcard() {
        let any = RegionPattern::for_identifier(&id("GALE01"), RegionSlot::Any);
        let upper = RegionPattern::for_identifier(&id("GALE01"), RegionSlot::Uppercase);
        assert_eq!(any.to_string(), "GAL?01");
        assert_eq!(upper.to_string(), "GAL[A-Z]01");
        assert_eq!(any.prefix(), "GAL");
        assert_eq!(any.suffix(), "01");
    }
}
