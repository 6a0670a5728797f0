//! Shared types used across postcode-sweep.
//!
//! A [`SearchKey`] is a postal code prefix: the three character forward
//! sortation area (FSA) followed by zero to three local delivery unit (LDU)
//! characters. Keys are stored in a compact canonical form with no separator,
//! so the string length is always the semantic length.

use crate::error::KeyError;
use crate::keygen::Alphabets;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Length of a forward sortation area.
pub const FSA_LEN: usize = 3;

/// Length of a full postal code (FSA + LDU).
pub const MAX_KEY_LEN: usize = 6;

/// Separators accepted (and stripped) when parsing legacy key renderings.
const SEPARATORS: [char; 2] = ['+', ' '];

/// Newtype for a validated postal code prefix.
///
/// Parsing accepts `"k1a"`, `"K1A0"`, `"K1A+0B"` and `"K1A 0B1"`; all are
/// normalised to uppercase with separators removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SearchKey(String);

impl SearchKey {
    /// Parse and validate a search key.
    ///
    /// # Errors
    /// Returns [`KeyError::InvalidKey`] if the length is outside 3..=6, the
    /// FSA is not letter-digit-letter, or an LDU character is outside the
    /// alphabet of its position.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let compact: String = input
            .trim()
            .chars()
            .filter(|c| !SEPARATORS.contains(c))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self::validate(&compact, input)?;
        Ok(Self(compact))
    }

    fn validate(compact: &str, raw: &str) -> Result<(), KeyError> {
        static FSA_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = FSA_REGEX.get_or_init(|| Regex::new(r"^[A-Z][0-9][A-Z]$").expect("valid regex"));

        let invalid = |reason: String| KeyError::InvalidKey {
            key: raw.to_string(),
            reason,
        };

        if !compact.is_ascii() {
            return Err(invalid("non-ASCII characters".to_string()));
        }
        if compact.len() < FSA_LEN || compact.len() > MAX_KEY_LEN {
            return Err(invalid(format!(
                "length must be {FSA_LEN}-{MAX_KEY_LEN} characters, got {}",
                compact.len()
            )));
        }
        if !regex.is_match(&compact[..FSA_LEN]) {
            return Err(invalid("FSA must be letter-digit-letter".to_string()));
        }

        let alphabets = Alphabets::CANADA;
        for (rank, ch) in Rank::ALL.iter().zip(compact[FSA_LEN..].chars()) {
            if !alphabets.for_rank(*rank).contains(&ch) {
                return Err(invalid(format!(
                    "character '{ch}' is not allowed at LDU position {}",
                    rank.number()
                )));
            }
        }

        Ok(())
    }

    /// Append one refinement character. Callers guarantee the character
    /// belongs to the next rank's alphabet.
    pub(crate) fn child(&self, ch: char) -> Self {
        let mut key = String::with_capacity(self.0.len() + 1);
        key.push_str(&self.0);
        key.push(ch);
        Self(key)
    }

    /// Get the compact key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True length of the key (no separators).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Keys are never empty; provided for clippy's `len_without_is_empty`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forward sortation area (first three characters).
    #[must_use]
    pub fn fsa(&self) -> &str {
        &self.0[..FSA_LEN]
    }

    /// LDU characters appended so far (possibly empty).
    #[must_use]
    pub fn ldu(&self) -> &str {
        &self.0[FSA_LEN..]
    }

    /// Rank that produced this key, `None` for a bare FSA.
    #[must_use]
    pub fn rank(&self) -> Option<Rank> {
        Rank::of_key_len(self.0.len())
    }

    /// Rendering sent to the registry: FSA, a space, then the LDU characters.
    #[must_use]
    pub fn wire(&self) -> String {
        if self.ldu().is_empty() {
            self.fsa().to_string()
        } else {
            format!("{} {}", self.fsa(), self.ldu())
        }
    }

    /// Rendering used in raw record file names (`K1A+0B`).
    #[must_use]
    pub fn file_stem(&self) -> String {
        if self.ldu().is_empty() {
            self.fsa().to_string()
        } else {
            format!("{}+{}", self.fsa(), self.ldu())
        }
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SearchKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SearchKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SearchKey> for String {
    fn from(key: SearchKey) -> Self {
        key.0
    }
}

/// Refinement depth: how many LDU characters a rank appends up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rank {
    /// Appends the first LDU digit (FSA -> 4 characters)
    One,
    /// Appends the LDU letter (4 -> 5 characters)
    Two,
    /// Appends the final LDU digit (5 -> 6 characters)
    Three,
}

impl Rank {
    /// All ranks in refinement order.
    pub const ALL: [Rank; 3] = [Rank::One, Rank::Two, Rank::Three];

    /// Convert a numeric rank.
    ///
    /// # Errors
    /// Returns [`KeyError::InvalidRank`] for anything outside 1..=3.
    pub fn from_number(n: u8) -> Result<Self, KeyError> {
        match n {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            other => Err(KeyError::InvalidRank(other)),
        }
    }

    /// Numeric rank (1, 2 or 3).
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Length a key must have to be expanded at this rank.
    #[must_use]
    pub fn input_len(self) -> usize {
        FSA_LEN + usize::from(self.number()) - 1
    }

    /// Length of keys produced at this rank.
    #[must_use]
    pub fn output_len(self) -> usize {
        self.input_len() + 1
    }

    /// Next rank, `None` after [`Rank::Three`].
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::One => Some(Self::Two),
            Self::Two => Some(Self::Three),
            Self::Three => None,
        }
    }

    /// Rank that produces keys of the given length.
    #[must_use]
    pub fn of_key_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|rank| rank.output_len() == len)
    }

    /// Name of the key-set file holding this rank's candidates (`FSA_LDU1`).
    #[must_use]
    pub fn key_set_name(self) -> String {
        format!("FSA_LDU{}", self.number())
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<u8> for Rank {
    type Error = KeyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_number(value)
    }
}

impl From<Rank> for u8 {
    fn from(rank: Rank) -> Self {
        rank.number()
    }
}

/// Physician category filter accepted by the registry search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorType {
    /// No category filter
    #[default]
    Any,
    /// Family doctors only
    FamilyDoctor,
    /// Specialists only
    Specialist,
}

impl DoctorType {
    /// Label used in raw record file names.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::FamilyDoctor => "Family+Doctor",
            Self::Specialist => "Specialist",
        }
    }

    /// Value sent in the `doctorType` form field.
    #[must_use]
    pub fn wire(self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::FamilyDoctor => "Family Doctor",
            Self::Specialist => "Specialist",
        }
    }
}

impl FromStr for DoctorType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['+', ' ', '_'], "-").as_str() {
            "any" => Ok(Self::Any),
            "family-doctor" => Ok(Self::FamilyDoctor),
            "specialist" => Ok(Self::Specialist),
            _ => Err(KeyError::InvalidKey {
                key: s.to_string(),
                reason: "doctor type must be any, family-doctor or specialist".to_string(),
            }),
        }
    }
}

/// Search filters applied to every query of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Physician category
    pub doctor_type: DoctorType,
    /// Optional last name filter
    pub last_name: Option<String>,
}

impl SearchParams {
    /// Create parameters, treating an empty or `"Any"` last name as absent.
    #[must_use]
    pub fn new(doctor_type: DoctorType, last_name: Option<String>) -> Self {
        let last_name = last_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("any"));
        Self {
            doctor_type,
            last_name,
        }
    }

    /// Label of the last name filter used in file names.
    #[must_use]
    pub fn last_name_label(&self) -> &str {
        self.last_name.as_deref().unwrap_or("Any")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_separators_and_case() {
        assert_eq!(SearchKey::parse("k1a").expect("fsa").as_str(), "K1A");
        assert_eq!(SearchKey::parse("K1A+0").expect("rank 1").as_str(), "K1A0");
        assert_eq!(SearchKey::parse("K1A 0B").expect("rank 2").as_str(), "K1A0B");
        assert_eq!(SearchKey::parse(" M5V3L9 ").expect("full").as_str(), "M5V3L9");
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(SearchKey::parse("K1").is_err());
        assert!(SearchKey::parse("K1A0B1X").is_err());
        assert!(SearchKey::parse("11A").is_err());
        // D is excluded from the LDU letter alphabet
        assert!(SearchKey::parse("K1A0D").is_err());
        // position 1 of the LDU must be a digit
        assert!(SearchKey::parse("K1AB").is_err());
        assert!(SearchKey::parse("K1É").is_err());
    }

    #[test]
    fn test_key_renderings() {
        let key = SearchKey::parse("K1A0B").expect("valid key");
        assert_eq!(key.fsa(), "K1A");
        assert_eq!(key.ldu(), "0B");
        assert_eq!(key.wire(), "K1A 0B");
        assert_eq!(key.file_stem(), "K1A+0B");
        assert_eq!(key.len(), 5);
        assert_eq!(key.rank(), Some(Rank::Two));

        let fsa = SearchKey::parse("K1A").expect("valid fsa");
        assert_eq!(fsa.wire(), "K1A");
        assert_eq!(fsa.rank(), None);
    }

    #[test]
    fn test_key_serde_roundtrip_uses_compact_string() {
        let key = SearchKey::parse("K1A+0").expect("valid key");
        let json = serde_json::to_string(&key).expect("serialize key");
        assert_eq!(json, "\"K1A0\"");

        let parsed: SearchKey = serde_json::from_str("\"K1A 0\"").expect("deserialize key");
        assert_eq!(parsed, key);
        assert!(serde_json::from_str::<SearchKey>("\"nope\"").is_err());
    }

    #[test]
    fn test_rank_lengths() {
        assert_eq!(Rank::One.input_len(), 3);
        assert_eq!(Rank::Two.input_len(), 4);
        assert_eq!(Rank::Three.input_len(), 5);
        assert_eq!(Rank::Three.output_len(), 6);
        assert_eq!(Rank::of_key_len(4), Some(Rank::One));
        assert_eq!(Rank::of_key_len(3), None);
        assert_eq!(Rank::One.next(), Some(Rank::Two));
        assert_eq!(Rank::Three.next(), None);
        assert_eq!(Rank::Two.key_set_name(), "FSA_LDU2");
    }

    #[test]
    fn test_rank_from_number() {
        assert_eq!(Rank::from_number(2), Ok(Rank::Two));
        assert_eq!(Rank::from_number(0), Err(KeyError::InvalidRank(0)));
        assert_eq!(Rank::from_number(4), Err(KeyError::InvalidRank(4)));
    }

    #[test]
    fn test_doctor_type_parsing() {
        assert_eq!("any".parse::<DoctorType>(), Ok(DoctorType::Any));
        assert_eq!(
            "Family+Doctor".parse::<DoctorType>(),
            Ok(DoctorType::FamilyDoctor)
        );
        assert_eq!("specialist".parse::<DoctorType>(), Ok(DoctorType::Specialist));
        assert!("surgeon".parse::<DoctorType>().is_err());
    }

    #[test]
    fn test_search_params_last_name_normalisation() {
        let params = SearchParams::new(DoctorType::Any, Some("Any".to_string()));
        assert_eq!(params.last_name, None);
        assert_eq!(params.last_name_label(), "Any");

        let params = SearchParams::new(DoctorType::FamilyDoctor, Some(" Smith ".to_string()));
        assert_eq!(params.last_name.as_deref(), Some("Smith"));
    }
}
