// THEORY:
// The aggregator turns a vegetation mask into the tile's green percentage.
// Historically the denominator is the canonical tile area (400 x 400) rather
// than the mask's own size, and published green view values depend on that.
// `AreaPolicy` keeps the canonical denominator as the default and makes the
// per-image denominator an explicit opt-in, so the output for non-canonical
// tiles never changes silently.

use crate::core_modules::pixel_array::GreenMask;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CANONICAL_TILE_WIDTH: usize = 400;
pub const CANONICAL_TILE_HEIGHT: usize = 400;
pub const CANONICAL_TILE_AREA: usize = CANONICAL_TILE_WIDTH * CANONICAL_TILE_HEIGHT;

/// Which pixel count a green percentage is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaPolicy {
    /// Always divide by `CANONICAL_TILE_AREA`.
    #[default]
    CanonicalTile,
    /// Divide by the mask's own `width * height`.
    ActualDimensions,
}

impl AreaPolicy {
    pub fn denominator(&self, mask: &GreenMask) -> usize {
        match self {
            AreaPolicy::CanonicalTile => CANONICAL_TILE_AREA,
            AreaPolicy::ActualDimensions => mask.len(),
        }
    }
}

/// Percentage of vegetation pixels in `mask`, within [0,100].
pub fn green_percent(mask: &GreenMask, policy: AreaPolicy) -> f64 {
    let green = mask.count_green() as f64;
    let percent = green / policy.denominator(mask) as f64 * 100.0;
    if percent > 100.0 {
        warn!(
            width = mask.width(),
            height = mask.height(),
            percent,
            "green percent exceeds 100 for an oversized tile; capping"
        );
        return 100.0;
    }
    percent
}
