//! Key expansion: one refinement rank at a time.
//!
//! Ranks 1 and 3 append a digit, rank 2 appends a letter from the postal
//! letter alphabet (A-Z without D, F, I, O, Q and U).

use crate::error::KeyError;
use crate::types::{Rank, SearchKey};
use tracing::warn;

/// Digits appended at ranks 1 and 3.
pub const DIGITS: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

/// Letters appended at rank 2.
pub const LETTERS: [char; 20] = [
    'A', 'B', 'C', 'E', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'R', 'S', 'T', 'V', 'W', 'X', 'Y',
    'Z',
];

/// Per-rank alphabets used for expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alphabets {
    /// Alphabet for ranks 1 and 3
    pub digits: &'static [char],
    /// Alphabet for rank 2
    pub letters: &'static [char],
}

impl Alphabets {
    /// Canadian postal code alphabets.
    pub const CANADA: Alphabets = Alphabets {
        digits: &DIGITS,
        letters: &LETTERS,
    };

    /// Alphabet appended at the given rank.
    #[must_use]
    pub fn for_rank(&self, rank: Rank) -> &'static [char] {
        match rank {
            Rank::One | Rank::Three => self.digits,
            Rank::Two => self.letters,
        }
    }
}

impl Default for Alphabets {
    fn default() -> Self {
        Self::CANADA
    }
}

/// Pure expansion of search keys by one rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator {
    alphabets: Alphabets,
}

impl KeyGenerator {
    /// Create a generator over the given alphabets.
    #[must_use]
    pub fn new(alphabets: Alphabets) -> Self {
        Self { alphabets }
    }

    /// Expand `key` by one character of `rank`'s alphabet.
    ///
    /// # Errors
    /// - [`KeyError::InvalidRank`] if `rank` is not 1, 2 or 3
    /// - [`KeyError::LengthMismatch`] if `key` is not `rank`'s input length
    pub fn expand(&self, key: &SearchKey, rank: u8) -> Result<Vec<SearchKey>, KeyError> {
        let rank = Rank::from_number(rank)?;
        self.expand_rank(key, rank)
    }

    /// Expand `key` at an already validated rank.
    pub fn expand_rank(&self, key: &SearchKey, rank: Rank) -> Result<Vec<SearchKey>, KeyError> {
        if key.len() != rank.input_len() {
            return Err(KeyError::LengthMismatch {
                key: key.to_string(),
                rank: rank.number(),
                expected: rank.input_len(),
                actual: key.len(),
            });
        }

        Ok(self
            .alphabets
            .for_rank(rank)
            .iter()
            .map(|ch| key.child(*ch))
            .collect())
    }

    /// Expand every key that fits `rank`, in input order.
    ///
    /// Keys of the wrong length are logged and returned separately; they are
    /// never retried. Duplicate parents produce their children once.
    #[must_use]
    pub fn expand_all(&self, keys: &[SearchKey], rank: Rank) -> Expansion {
        let mut expansion = Expansion::default();
        let mut seen = std::collections::HashSet::new();

        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            match self.expand_rank(key, rank) {
                Ok(children) => expansion.children.extend(children),
                Err(e) => {
                    warn!(key = %key, rank = rank.number(), error = %e, "dropping key");
                    expansion.dropped.push((key.clone(), e));
                }
            }
        }

        expansion
    }
}

/// Output of [`KeyGenerator::expand_all`].
#[derive(Debug, Default)]
pub struct Expansion {
    /// Generated children, grouped by parent in input order
    pub children: Vec<SearchKey>,
    /// Parents rejected by the length filter
    pub dropped: Vec<(SearchKey, KeyError)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SearchKey {
        SearchKey::parse(s).expect("valid test key")
    }

    #[test]
    fn test_letter_alphabet_excludes_ambiguous_letters() {
        assert_eq!(LETTERS.len(), 20);
        for excluded in ['D', 'F', 'I', 'O', 'Q', 'U'] {
            assert!(!LETTERS.contains(&excluded));
        }
    }

    #[test]
    fn test_expand_child_counts_per_rank() {
        let generator = KeyGenerator::default();

        let rank1 = generator.expand(&key("K1A"), 1).expect("rank 1");
        assert_eq!(rank1.len(), 10);
        assert!(rank1.iter().all(|child| child.len() == 4));
        assert_eq!(rank1[0].as_str(), "K1A0");
        assert_eq!(rank1[9].as_str(), "K1A9");

        let rank2 = generator.expand(&key("K1A0"), 2).expect("rank 2");
        assert_eq!(rank2.len(), 20);
        assert!(rank2.iter().all(|child| child.len() == 5));
        assert_eq!(rank2[0].as_str(), "K1A0A");
        assert_eq!(rank2[19].as_str(), "K1A0Z");

        let rank3 = generator.expand(&key("K1A0B"), 3).expect("rank 3");
        assert_eq!(rank3.len(), 10);
        assert!(rank3.iter().all(|child| child.len() == 6));
    }

    #[test]
    fn test_expand_children_reparse() {
        let generator = KeyGenerator::default();
        let mut frontier = vec![key("M5V")];
        for rank in Rank::ALL {
            frontier = generator.expand_all(&frontier, rank).children;
            for child in &frontier {
                assert_eq!(&key(child.as_str()), child);
            }
        }
        assert_eq!(frontier.len(), 10 * 20 * 10);
    }

    #[test]
    fn test_expand_is_deterministic() {
        let generator = KeyGenerator::default();
        let first = generator.expand(&key("L4C0"), 2).expect("expand");
        let second = generator.expand(&key("L4C0"), 2).expect("expand");
        assert_eq!(first, second);
    }

    #[test]
    fn test_expand_rejects_invalid_rank() {
        let generator = KeyGenerator::default();
        assert_eq!(
            generator.expand(&key("K1A"), 0),
            Err(KeyError::InvalidRank(0))
        );
        assert_eq!(
            generator.expand(&key("K1A"), 4),
            Err(KeyError::InvalidRank(4))
        );
    }

    #[test]
    fn test_expand_rejects_length_mismatch() {
        let generator = KeyGenerator::default();
        let err = generator.expand(&key("K1A0"), 1).expect_err("wrong length");
        assert_eq!(
            err,
            KeyError::LengthMismatch {
                key: "K1A0".to_string(),
                rank: 1,
                expected: 3,
                actual: 4,
            }
        );
        assert!(generator.expand(&key("K1A"), 3).is_err());
    }

    #[test]
    fn test_expand_all_drops_mismatched_and_duplicate_parents() {
        let generator = KeyGenerator::default();
        let input = vec![key("K1A0"), key("K1A"), key("K1A0"), key("K1B0")];
        let expansion = generator.expand_all(&input, Rank::Two);

        assert_eq!(expansion.children.len(), 40);
        assert_eq!(expansion.dropped.len(), 1);
        assert_eq!(expansion.dropped[0].0.as_str(), "K1A");
        assert_eq!(expansion.children[20].as_str(), "K1B0A");
    }
}
