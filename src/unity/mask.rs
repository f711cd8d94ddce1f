//! Unity addressing.
//!
//! A unity is addressed by its rank and a numeric prefix. The familiar
//! string form (`"12XXX"`) is only a rendering: the prefix digits followed by
//! one placeholder per decimal digit of the span. Children and parents are
//! derived arithmetically from the prefix, never by editing strings.

use super::Rank;
use crate::store::LeafId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder character in rendered masks.
pub const PLACEHOLDER: char = 'X';

/// Longest prefix accepted; keeps leaf ranges inside `u64`.
const MAX_PREFIX_WIDTH: usize = 14;

/// Mask parsing and construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    /// The mask is empty.
    #[error("empty mask")]
    Empty,
    /// A character other than a digit or placeholder.
    #[error("invalid character {0:?} in mask")]
    InvalidCharacter(char),
    /// The placeholder count matches no rank.
    #[error("{0} placeholders do not address a supported rank")]
    UnsupportedRank(usize),
    /// The prefix needs more digits than the mask allows.
    #[error("prefix {prefix} does not fit in {width} digits")]
    PrefixOverflow {
        /// Requested prefix.
        prefix: u64,
        /// Available digits.
        width: usize,
    },
}

/// Address of one unity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnityMask {
    rank: Rank,
    prefix: u64,
    prefix_width: usize,
}

impl UnityMask {
    /// Creates an address, checking that `prefix` fits in `prefix_width` digits.
    pub fn new(rank: Rank, prefix: u64, prefix_width: usize) -> Result<Self, MaskError> {
        if prefix_width > MAX_PREFIX_WIDTH || prefix >= 10u64.pow(prefix_width as u32).max(1) {
            return Err(MaskError::PrefixOverflow {
                prefix,
                width: prefix_width,
            });
        }
        Ok(Self {
            rank,
            prefix,
            prefix_width,
        })
    }

    /// Address of the unity of `rank` containing `leaf`, rendered with
    /// `mask_width` characters in total.
    pub fn containing(leaf: LeafId, rank: Rank, mask_width: usize) -> Result<Self, MaskError> {
        let width = mask_width.saturating_sub(rank.placeholders());
        Self::new(rank, leaf / rank.span(), width)
    }

    /// Parses the rendered form, e.g. `"12XXX"`.
    pub fn parse(mask: &str) -> Result<Self, MaskError> {
        if mask.is_empty() {
            return Err(MaskError::Empty);
        }

        let digits: String = mask.chars().take_while(|c| c.is_ascii_digit()).collect();
        let mut placeholders = 0;
        for c in mask.chars().skip(digits.len()) {
            if c != PLACEHOLDER {
                return Err(MaskError::InvalidCharacter(c));
            }
            placeholders += 1;
        }

        let rank =
            Rank::from_placeholders(placeholders).ok_or(MaskError::UnsupportedRank(placeholders))?;
        let prefix = if digits.is_empty() {
            0
        } else {
            digits.parse().map_err(|_| MaskError::PrefixOverflow {
                prefix: u64::MAX,
                width: digits.len(),
            })?
        };

        Self::new(rank, prefix, digits.len())
    }

    /// Rank addressed by the mask.
    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Numeric value of the prefix digits.
    #[inline]
    pub fn prefix(&self) -> u64 {
        self.prefix
    }

    /// First leaf id covered.
    #[inline]
    pub fn start(&self) -> LeafId {
        self.prefix * self.rank.span()
    }

    /// Last leaf id covered (inclusive).
    #[inline]
    pub fn end(&self) -> LeafId {
        self.start() + self.rank.span() - 1
    }

    /// Returns true if `leaf` falls inside this unity.
    pub fn contains(&self, leaf: LeafId) -> bool {
        (self.start()..=self.end()).contains(&leaf)
    }

    /// The ten child unities, or `None` at rank 100 whose children are leaves.
    pub fn children(&self) -> Option<[UnityMask; 10]> {
        let rank = self.rank.child()?;
        let mut children = [*self; 10];
        for (digit, child) in children.iter_mut().enumerate() {
            *child = UnityMask {
                rank,
                prefix: self.prefix * 10 + digit as u64,
                prefix_width: self.prefix_width + 1,
            };
        }
        Some(children)
    }

    /// The enclosing unity, or `None` at the top rank or without a prefix digit.
    pub fn parent(&self) -> Option<UnityMask> {
        let rank = self.rank.parent()?;
        if self.prefix_width == 0 {
            return None;
        }
        Some(UnityMask {
            rank,
            prefix: self.prefix / 10,
            prefix_width: self.prefix_width - 1,
        })
    }
}

impl fmt::Display for UnityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix_width > 0 {
            write!(f, "{:0width$}", self.prefix, width = self.prefix_width)?;
        }
        for _ in 0..self.rank.placeholders() {
            write!(f, "{}", PLACEHOLDER)?;
        }
        Ok(())
    }
}

impl FromStr for UnityMask {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_of_thousand() {
        let mask = UnityMask::parse("12XXX").unwrap();
        assert_eq!(mask.rank(), Rank::Thousand);

        let children: Vec<String> = mask
            .children()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        let expected: Vec<String> = (0..10).map(|d| format!("12{}XX", d)).collect();
        assert_eq!(children, expected);
    }

    #[test]
    fn test_hundred_has_no_unity_children() {
        let mask = UnityMask::parse("123XX").unwrap();
        assert!(mask.children().is_none());
        assert_eq!(mask.start(), 12_300);
        assert_eq!(mask.end(), 12_399);
    }

    #[test]
    fn test_zero_padded_masks_keep_width() {
        let mask = UnityMask::parse("00XXXX").unwrap();
        assert_eq!(mask.rank(), Rank::TenThousand);

        let first = mask.children().unwrap()[0];
        assert_eq!(first.to_string(), "000XXX");
        assert_eq!(first.children().unwrap()[9].to_string(), "0009XX");
    }

    #[test]
    fn test_parent_inverts_children() {
        let mask = UnityMask::parse("03XXXX").unwrap();
        for child in mask.children().unwrap() {
            assert_eq!(child.parent(), Some(mask));
        }
        assert_eq!(mask.parent(), None);
    }

    #[test]
    fn test_containing() {
        let mask = UnityMask::containing(12_345, Rank::Hundred, 6).unwrap();
        assert_eq!(mask.to_string(), "0123XX");
        assert!(mask.contains(12_345));
        assert!(!mask.contains(12_400));

        let top = UnityMask::containing(12_345, Rank::TenThousand, 6).unwrap();
        assert_eq!(top.to_string(), "01XXXX");
    }

    #[test]
    fn test_bare_placeholders() {
        let mask = UnityMask::parse("XXXX").unwrap();
        assert_eq!(mask.rank(), Rank::TenThousand);
        assert_eq!(mask.start(), 0);
        assert_eq!(mask.children().unwrap()[3].to_string(), "3XXX");
    }

    #[test]
    fn test_rejects_bad_masks() {
        assert_eq!(UnityMask::parse(""), Err(MaskError::Empty));
        assert_eq!(UnityMask::parse("1X2X"), Err(MaskError::InvalidCharacter('2')));
        assert_eq!(UnityMask::parse("12X"), Err(MaskError::UnsupportedRank(1)));
        assert!(matches!(
            UnityMask::new(Rank::Hundred, 100, 2),
            Err(MaskError::PrefixOverflow { .. })
        ));
    }
}
