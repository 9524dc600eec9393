// THEORY:
// `graythresh` picks a binarization threshold for the green-excess index with
// Otsu's method: build a 256-bin histogram and choose the split that maximizes
// the between-class variance
//
//     sigma_b(k) = (mu_t * omega(k) - mu(k))^2 / (omega(k) * (1 - omega(k)))
//
// where omega is the cumulative probability and mu the cumulative first
// moment (bin positions counted from 1).
//
// Rules that make the selector total:
// - Bins where omega is 0 or 1 have no defined variance and are never
//   candidates. When no bin is defined (a single-valued histogram) the
//   caller's fallback `level` is returned.
// - Several bins can share the maximum. The selected position is the
//   arithmetic mean of all of them, enumerated in ascending order.
// - A non-finite result of any kind resolves to `level` too.
// - `level` itself is clamped into [0,1]; a NaN or infinite `level` is
//   replaced by `DEFAULT_FALLBACK_LEVEL`, so the output is always finite.
//
// Cumulative sums are kept as integer counts and only divided at the end, so
// omega hits exactly 0 and 1 where it should and tied bins produce bitwise
// identical variances.

use tracing::warn;

pub const HISTOGRAM_BINS: usize = 256;

/// Fallback level used when no Otsu split exists.
pub const DEFAULT_FALLBACK_LEVEL: f64 = 0.1;

/// How the selector arrived at its threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdSource {
    /// Selected from the histogram at the given (possibly fractional) bin.
    Otsu { index: f64 },
    /// Every bin was undefined; the fallback level was used.
    DegenerateHistogram,
    /// The computed value was not finite; the fallback level was used.
    NonFinite,
}

/// The selector's output: a finite threshold in [0,1] and its provenance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub source: ThresholdSource,
}

/// Rescales the index into the byte range [0,255] and clips negatives to 0.
fn to_byte_range(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    values
        .iter()
        .map(|&v| {
            let scaled = if max <= 1.0 {
                v * 255.0
            } else if max >= 256.0 {
                (v - min) / (max - min) * 255.0
            } else {
                v
            };
            if scaled < 0.0 { 0.0 } else { scaled }
        })
        .collect()
}

/// Counts values into 256 unit-width bins; the last bin is closed at 256.
fn histogram(values: &[f64]) -> [u64; HISTOGRAM_BINS] {
    let mut counts = [0u64; HISTOGRAM_BINS];
    for &v in values {
        if !(0.0..=HISTOGRAM_BINS as f64).contains(&v) {
            continue;
        }
        let bin = (v.floor() as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    counts
}

/// Between-class variance for every bin; `None` where it is undefined.
fn between_class_variance(counts: &[u64; HISTOGRAM_BINS]) -> [Option<f64>; HISTOGRAM_BINS] {
    let mut sigma = [None; HISTOGRAM_BINS];
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return sigma;
    }

    let moment_total: u64 = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| (i as u64 + 1) * c)
        .sum();
    let total_f = total as f64;
    let mu_t = moment_total as f64 / total_f;

    let mut cumulative = 0u64;
    let mut moment = 0u64;
    for (k, &count) in counts.iter().enumerate() {
        cumulative += count;
        moment += (k as u64 + 1) * count;
        if cumulative == 0 || cumulative == total {
            continue;
        }
        let omega = cumulative as f64 / total_f;
        let mu = moment as f64 / total_f;
        let value = (mu_t * omega - mu).powi(2) / (omega * (1.0 - omega));
        if value.is_finite() {
            sigma[k] = Some(value);
        }
    }
    sigma
}

/// Mean position of every bin sharing the maximum defined variance.
fn tied_argmax(sigma: &[Option<f64>; HISTOGRAM_BINS]) -> Option<f64> {
    let best = sigma
        .iter()
        .flatten()
        .copied()
        .fold(None, |best: Option<f64>, v| match best {
            Some(b) if b >= v => Some(b),
            _ => Some(v),
        })?;

    let (sum, count) = sigma
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == Some(best))
        .fold((0usize, 0usize), |(sum, count), (k, _)| (sum + k, count + 1));

    Some(sum as f64 / count as f64)
}

/// A usable fallback: `level` clamped into [0,1], or the default if not finite.
fn fallback_level(level: f64) -> f64 {
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        warn!(level, "non-finite fallback level; using the default");
        DEFAULT_FALLBACK_LEVEL
    }
}

/// Selects an Otsu threshold in [0,1] for `values`, falling back to `level`.
pub fn select_threshold(values: &[f64], level: f64) -> ThresholdSelection {
    let level = fallback_level(level);
    let bytes = to_byte_range(values);
    let counts = histogram(&bytes);
    let sigma = between_class_variance(&counts);

    let Some(index) = tied_argmax(&sigma) else {
        return ThresholdSelection {
            threshold: level,
            source: ThresholdSource::DegenerateHistogram,
        };
    };

    let threshold = (index - 1.0) / 255.0;
    if !threshold.is_finite() {
        return ThresholdSelection {
            threshold: level,
            source: ThresholdSource::NonFinite,
        };
    }

    ThresholdSelection {
        threshold: threshold.clamp(0.0, 1.0),
        source: ThresholdSource::Otsu { index },
    }
}

/// Otsu threshold for `values`; `level` whenever no threshold is defined.
pub fn graythresh(values: &[f64], level: f64) -> f64 {
    select_threshold(values, level).threshold
}
