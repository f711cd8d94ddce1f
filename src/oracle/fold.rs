//! Folding grid cells into a normalised draw.
//!
//! The grid bytes are packed into one big-endian word, the word is
//! bit-reversed and passed through a 64-bit avalanche finalizer. Both steps
//! are bijections, so distinct grids always produce distinct words; the
//! finalizer spreads every input bit over the high bits kept by
//! [`normalize`].

use super::grid::Grid;

/// Packs the grid into a word, first cell in the most-significant byte.
#[inline]
pub fn fold(grid: &Grid) -> u64 {
    u64::from_be_bytes(*grid.cells())
}

/// Mixes a folded word.
#[inline]
pub fn mix(word: u64) -> u64 {
    let mut k = word.reverse_bits();
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Maps a word onto `[0, 1)` using its top 53 bits.
#[inline]
pub fn normalize(word: u64) -> f64 {
    (word >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fold_first_cell_is_most_significant() {
        let grid = Grid::from_cells([1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(fold(&grid), 1u64 << 56);

        let grid = Grid::from_cells([0, 0, 0, 0, 0, 0, 0, 0xff]);
        assert_eq!(fold(&grid), 0xff);
    }

    #[test]
    fn test_zero_maps_to_zero() {
        assert_eq!(mix(0), 0);
        assert_eq!(normalize(0), 0.0);
    }

    #[test]
    fn test_normalize_upper_bound() {
        let top = normalize(u64::MAX);
        assert!(top < 1.0);
        assert!(top > 0.999_999);
    }

    proptest! {
        #[test]
        fn prop_normalized_in_unit_interval(word in any::<u64>()) {
            let value = normalize(mix(word));
            prop_assert!((0.0..1.0).contains(&value));
        }

        #[test]
        fn prop_single_cell_change_changes_draw(
            cells in any::<[u8; 8]>(),
            index in 0usize..8,
            delta in 1u8..=255,
        ) {
            let mut changed = cells;
            changed[index] = changed[index].wrapping_add(delta);

            let a = normalize(mix(fold(&Grid::from_cells(cells))));
            let b = normalize(mix(fold(&Grid::from_cells(changed))));
            prop_assert_ne!(a, b);
        }
    }
}
