//! Layout allocation: share a fixed vertical budget between one report's
//! fragments.
//!
//! Each fragment receives a slice of the target height proportional to its
//! own pixel height, and a width that preserves its aspect ratio, scaled
//! down by the display factor. Heights are computed from cumulative
//! boundaries so the rounded slices add up to the target exactly.

use crate::pipeline::trim::ContentFragment;
use serde::{Deserialize, Serialize};

/// Display size of one fragment, in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentLayout {
    pub width_emu: u64,
    pub height_emu: u64,
}

/// Why sizes could not be allocated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("fragment {index} has a zero dimension ({width}x{height} px)")]
    EmptyFragment { index: usize, width: u32, height: u32 },

    #[error("fragment {index} was allocated no height")]
    ZeroAllocation { index: usize },
}

/// Allocate display sizes for fragments given as `(width_px, height_px)`.
///
/// An empty input yields an empty layout.
pub fn allocate_dimensions(
    dims: &[(u32, u32)],
    target_height_emu: u64,
    display_scale: f64,
) -> Result<Vec<FragmentLayout>, LayoutError> {
    if let Some((index, &(width, height))) = dims
        .iter()
        .enumerate()
        .find(|(_, (w, h))| *w == 0 || *h == 0)
    {
        return Err(LayoutError::EmptyFragment {
            index,
            width,
            height,
        });
    }

    let total: u128 = dims.iter().map(|&(_, h)| h as u128).sum();
    if total == 0 {
        return Ok(Vec::new());
    }
    let target = target_height_emu as u128;

    let mut layouts = Vec::with_capacity(dims.len());
    let mut cumulative: u128 = 0;
    let mut previous: u128 = 0;
    for (index, &(width, height)) in dims.iter().enumerate() {
        cumulative += height as u128;
        // round(cumulative * target / total), half up
        let boundary = (cumulative * target * 2 + total) / (2 * total);
        let height_emu = (boundary - previous) as u64;
        previous = boundary;
        if height_emu == 0 {
            return Err(LayoutError::ZeroAllocation { index });
        }

        let width_emu =
            (height_emu as f64 * width as f64 / height as f64 * display_scale).round() as u64;
        layouts.push(FragmentLayout {
            width_emu: width_emu.max(1),
            height_emu,
        });
    }
    Ok(layouts)
}

/// [`allocate_dimensions`] over trimmed fragments.
pub fn allocate(
    fragments: &[ContentFragment],
    target_height_emu: u64,
    display_scale: f64,
) -> Result<Vec<FragmentLayout>, LayoutError> {
    let dims: Vec<(u32, u32)> = fragments.iter().map(|f| (f.width(), f.height())).collect();
    allocate_dimensions(&dims, target_height_emu, display_scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: u64 = 8_686_800; // 9.5 in

    #[test]
    fn empty_input_empty_layout() {
        assert!(allocate_dimensions(&[], TARGET, 0.85).unwrap().is_empty());
    }

    #[test]
    fn single_fragment_takes_full_height() {
        let l = allocate_dimensions(&[(1000, 500)], TARGET, 0.85).unwrap();
        assert_eq!(l[0].height_emu, TARGET);
        let expected_w = (TARGET as f64 * 2.0 * 0.85).round() as u64;
        assert_eq!(l[0].width_emu, expected_w);
    }

    #[test]
    fn heights_are_proportional() {
        let l = allocate_dimensions(&[(600, 100), (600, 300)], 4000, 1.0).unwrap();
        assert_eq!(l[0].height_emu, 1000);
        assert_eq!(l[1].height_emu, 3000);
        assert_eq!(l[0].width_emu, 6000);
        assert_eq!(l[1].width_emu, 6000);
    }

    #[test]
    fn rounded_heights_sum_to_target() {
        let dims = [(700, 333), (700, 333), (700, 334), (500, 7), (900, 1201)];
        let l = allocate_dimensions(&dims, TARGET, 0.85).unwrap();
        let sum: u64 = l.iter().map(|f| f.height_emu).sum();
        assert_eq!(sum, TARGET);
    }

    #[test]
    fn every_layout_fills_target_and_keeps_scaled_aspect() {
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = |lo: u32, hi: u32| {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            lo + ((seed >> 33) as u32) % (hi - lo)
        };
        for len in 1..=12 {
            for _ in 0..20 {
                let dims: Vec<(u32, u32)> = (0..len).map(|_| (next(50, 2000), next(5, 3000))).collect();
                let total: u64 = dims.iter().map(|&(_, h)| h as u64).sum();
                let l = allocate_dimensions(&dims, TARGET, 0.85).unwrap();

                assert_eq!(l.len(), dims.len());
                assert_eq!(l.iter().map(|f| f.height_emu).sum::<u64>(), TARGET, "{dims:?}");
                for (f, &(w, h)) in l.iter().zip(&dims) {
                    let share = TARGET as f64 * h as f64 / total as f64;
                    assert!((f.height_emu as f64 - share).abs() <= 1.0, "{dims:?}");
                    let expected = f.height_emu as f64 * w as f64 / h as f64 * 0.85;
                    assert!((f.width_emu as f64 - expected).abs() <= 0.5 + 1e-6, "{dims:?}");
                }
            }
        }
    }

    #[test]
    fn zero_dimension_rejected() {
        let err = allocate_dimensions(&[(100, 10), (0, 10)], TARGET, 0.85).unwrap_err();
        assert_eq!(
            err,
            LayoutError::EmptyFragment {
                index: 1,
                width: 0,
                height: 10
            }
        );
    }

    #[test]
    fn vanishing_share_rejected() {
        let err = allocate_dimensions(&[(10, 1), (10, 1_000_000)], 100, 1.0).unwrap_err();
        assert_eq!(err, LayoutError::ZeroAllocation { index: 0 });
    }
}
