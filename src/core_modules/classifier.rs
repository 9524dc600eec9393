// THEORY:
// The classifier decides, pixel by pixel, whether a segmented region is
// vegetation. Two independent rule sets are evaluated and OR-ed together:
//
// 1.  **Direct light**: moderately dark in red and blue, not blown out in
//     green, and a green excess above the adaptive threshold picked by
//     `graythresh` for this tile.
// 2.  **Shadow**: every channel dark, with a small fixed green excess. Shaded
//     foliage is too dark for the adaptive threshold to separate reliably, so
//     this rule ignores it entirely.
//
// The adaptive threshold is confined to an empirically chosen operating band
// before use. The band and the channel caps are named constants on purpose:
// they are tuned values for street-level vegetation, not derived quantities.

pub use crate::core_modules::graythresh::DEFAULT_FALLBACK_LEVEL;
use crate::core_modules::graythresh::{ThresholdSelection, select_threshold};
use crate::core_modules::green_index::GreenIndex;
use crate::core_modules::pixel_array::{GreenMask, IndexArray};
use crate::error::Result;

/// Lower bound of the classification threshold band.
pub const THRESHOLD_FLOOR: f64 = 0.05;
/// Upper bound of the classification threshold band.
pub const THRESHOLD_CEILING: f64 = 0.10;

/// Channel caps for vegetation in direct light (normalized units).
pub const DIRECT_RED_MAX: f64 = 0.6;
pub const DIRECT_GREEN_MAX: f64 = 0.9;
pub const DIRECT_BLUE_MAX: f64 = 0.6;

/// Every channel must stay below this for the shadow rule.
pub const SHADOW_CHANNEL_MAX: f64 = 0.3;
/// Fixed green-excess threshold of the shadow rule.
pub const SHADOW_EXG_THRESHOLD: f64 = 0.05;

/// Restricts a raw threshold to `[THRESHOLD_FLOOR, THRESHOLD_CEILING]`.
pub fn clamp_threshold(raw: f64) -> f64 {
    if raw > THRESHOLD_CEILING {
        THRESHOLD_CEILING
    } else if raw < THRESHOLD_FLOOR {
        THRESHOLD_FLOOR
    } else {
        raw
    }
}

/// The Otsu selection for a tile and the clamped value actually used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveThreshold {
    pub selection: ThresholdSelection,
    pub clamped: f64,
}

impl AdaptiveThreshold {
    /// Runs `graythresh` over `exg` with fallback `level` and clamps the result.
    pub fn select(exg: &IndexArray, level: f64) -> Self {
        let selection = select_threshold(exg.values(), level);
        Self {
            selection,
            clamped: clamp_threshold(selection.threshold),
        }
    }
}

/// Direct-light vegetation rule for one normalized pixel.
pub fn is_direct_light_vegetation(red: f64, green: f64, blue: f64, exg: f64, threshold: f64) -> bool {
    red < DIRECT_RED_MAX && green < DIRECT_GREEN_MAX && blue < DIRECT_BLUE_MAX && exg > threshold
}

/// Shadowed vegetation rule for one normalized pixel.
pub fn is_shadowed_vegetation(red: f64, green: f64, blue: f64, exg: f64) -> bool {
    red < SHADOW_CHANNEL_MAX
        && green < SHADOW_CHANNEL_MAX
        && blue < SHADOW_CHANNEL_MAX
        && exg > SHADOW_EXG_THRESHOLD
}

/// Flags every pixel matching either vegetation rule.
///
/// `threshold` is used as given; callers pass the clamped adaptive value.
pub fn classify(index: &GreenIndex, threshold: f64) -> Result<GreenMask> {
    index.ensure_consistent()?;

    let flags = index
        .red
        .iter()
        .zip(index.green.iter())
        .zip(index.blue.iter())
        .zip(index.exg.iter())
        .map(|(((&r, &g), &b), &exg)| {
            is_direct_light_vegetation(r, g, b, exg, threshold) || is_shadowed_vegetation(r, g, b, exg)
        })
        .collect();

    GreenMask::new(index.width(), index.height(), flags)
}
