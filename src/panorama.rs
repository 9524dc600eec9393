// THEORY:
// A sample point's green view index is the mean green percent of six
// horizontal tiles taken around one panorama, 60 degrees apart. Acquiring
// those tiles is someone else's job; this module only defines the seam
// (`TileSource`), averages the six tile results, and applies the batch
// failure policy: if any heading cannot be fetched or classified, for any
// reason, the whole panorama is reported with a sentinel value instead of
// aborting the batch.
//
// Panoramas are frequently shared between neighboring sample points. The
// `PanoramaLedger` remembers which IDs were already measured so each one is
// processed once. It is owned by the caller and passed in explicitly; no
// module-level state is involved. A ledger can be seeded from an earlier
// report file so an interrupted run resumes where it stopped.

use crate::core_modules::pixel_array::PixelArray;
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::{GreenViewError, Result};
use crate::pipeline::GreenViewPipeline;
use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Headings (degrees) of the six horizontal tiles per panorama.
pub const HEADINGS: [u32; 6] = [0, 60, 120, 180, 240, 300];

/// Value reported for a panorama whose measurement failed.
///
/// Reported as is, not averaged over headings; consumers only test for `< 0`.
pub const FAILURE_SENTINEL: f64 = -1000.0;

const REPORT_ID_PREFIX: &str = "panoID: ";
const REPORT_VALUE_SEPARATOR: &str = ", greenview: ";

/// Supplies one directional tile of a panorama.
pub trait TileSource: Send + Sync {
    fn fetch(&self, pano_id: &str, heading: u32) -> Result<PixelArray>;
}

/// Reads tiles named `<pano_id>_<heading>.<extension>` from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryTileSource {
    root: PathBuf,
    extension: String,
}

impl DirectoryTileSource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn tile_path(&self, pano_id: &str, heading: u32) -> PathBuf {
        self.root
            .join(format!("{pano_id}_{heading}.{}", self.extension))
    }

    /// Panorama IDs with at least one tile in the directory, sorted.
    pub fn panorama_ids(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            GreenViewError::image_load(format!("cannot list {}", self.root.display()), e)
        })?;

        let mut ids = HashSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some((pano_id, heading)) = stem.rsplit_once('_') {
                if heading.parse::<u32>().is_ok_and(|h| HEADINGS.contains(&h)) {
                    ids.insert(pano_id.to_string());
                }
            }
        }

        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        Ok(ids)
    }
}

impl TileSource for DirectoryTileSource {
    fn fetch(&self, pano_id: &str, heading: u32) -> Result<PixelArray> {
        let path = self.tile_path(pano_id, heading);
        if !path.is_file() {
            return Err(GreenViewError::TileUnavailable {
                pano_id: pano_id.to_string(),
                heading,
                reason: format!("{} does not exist", path.display()),
            });
        }
        image_helper::load(&path)
    }
}

/// The green view index of one panorama, or why it could not be measured.
#[derive(Debug, Clone, PartialEq)]
pub enum GreenView {
    /// Mean green percent over all headings.
    Measured(f64),
    /// A heading failed, or the worker measuring it did; the panorama
    /// carries the sentinel value. `heading` is `None` for worker failures.
    Failed {
        heading: Option<u32>,
        reason: String,
    },
}

impl GreenView {
    /// The reported number: the measured mean or `FAILURE_SENTINEL`.
    pub fn value(&self) -> f64 {
        match self {
            GreenView::Measured(value) => *value,
            GreenView::Failed { .. } => FAILURE_SENTINEL,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, GreenView::Measured(_))
    }
}

/// Result of measuring one panorama.
#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaReport {
    pub pano_id: String,
    /// `(heading, green percent)` for every heading measured before any failure.
    pub headings: Vec<(u32, f64)>,
    pub green_view: GreenView,
}

impl fmt::Display for PanoramaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{REPORT_ID_PREFIX}{}{REPORT_VALUE_SEPARATOR}{}",
            self.pano_id,
            self.green_view.value()
        )
    }
}

impl PanoramaReport {
    /// Report for a panorama whose measurement never produced a result.
    pub fn failed(pano_id: impl Into<String>, heading: Option<u32>, reason: impl Into<String>) -> Self {
        Self {
            pano_id: pano_id.into(),
            headings: Vec::new(),
            green_view: GreenView::Failed {
                heading,
                reason: reason.into(),
            },
        }
    }
}

/// Measures every heading of `pano_id` and averages the six percentages.
///
/// Any failure ends the panorama as `GreenView::Failed`. Missing or
/// undecodable tiles are logged as warnings, anything else (a malformed tile
/// from the source, for instance) as an error.
pub fn measure_panorama(
    pipeline: &GreenViewPipeline,
    source: &dyn TileSource,
    pano_id: &str,
) -> PanoramaReport {
    let mut headings = Vec::with_capacity(HEADINGS.len());

    for heading in HEADINGS {
        let percent = source
            .fetch(pano_id, heading)
            .and_then(|tile| pipeline.green_percent(&tile));

        match percent {
            Ok(percent) => headings.push((heading, percent)),
            Err(err) => {
                if err.is_recoverable() {
                    warn!(pano_id, heading, error = %err, "heading failed; reporting sentinel");
                } else {
                    error!(pano_id, heading, error = %err, "heading failed; reporting sentinel");
                }
                return PanoramaReport {
                    pano_id: pano_id.to_string(),
                    headings,
                    green_view: GreenView::Failed {
                        heading: Some(heading),
                        reason: err.to_string(),
                    },
                };
            }
        }
    }

    let total: f64 = headings.iter().map(|(_, percent)| percent).sum();
    let green_view = total / HEADINGS.len() as f64;
    info!(pano_id, green_view, "measured panorama");

    PanoramaReport {
        pano_id: pano_id.to_string(),
        headings,
        green_view: GreenView::Measured(green_view),
    }
}

/// Panorama IDs that have already been measured in this run.
#[derive(Debug, Clone, Default)]
pub struct PanoramaLedger {
    done: HashSet<String>,
}

impl PanoramaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a ledger with every panorama ID found in report lines.
    ///
    /// Lines that are not report lines are skipped.
    pub fn from_report_lines(reader: impl BufRead) -> Result<Self> {
        let mut ledger = Self::new();
        for line in reader.lines() {
            let line = line.map_err(|e| GreenViewError::report("cannot read report lines", e))?;
            let pano_id = line
                .strip_prefix(REPORT_ID_PREFIX)
                .and_then(|rest| rest.split_once(REPORT_VALUE_SEPARATOR))
                .map(|(pano_id, _)| pano_id);
            if let Some(pano_id) = pano_id {
                ledger.claim(pano_id);
            }
        }
        Ok(ledger)
    }

    /// Records `pano_id`; returns false if it was already recorded.
    pub fn claim(&mut self, pano_id: &str) -> bool {
        self.done.insert(pano_id.to_string())
    }

    pub fn contains(&self, pano_id: &str) -> bool {
        self.done.contains(pano_id)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, SegmentationMethod};
    use crate::core_modules::aggregator::AreaPolicy;
    use crate::core_modules::pixel::pixel::Pixel;
    use std::collections::HashMap;

    /// Serves synthetic tiles; headings missing from `tiles` are unavailable.
    struct MapSource {
        tiles: HashMap<u32, PixelArray>,
    }

    impl TileSource for MapSource {
        fn fetch(&self, pano_id: &str, heading: u32) -> Result<PixelArray> {
            self.tiles
                .get(&heading)
                .cloned()
                .ok_or_else(|| GreenViewError::TileUnavailable {
                    pano_id: pano_id.to_string(),
                    heading,
                    reason: "not in map".to_string(),
                })
        }
    }

    fn pipeline() -> GreenViewPipeline {
        GreenViewPipeline::new(PipelineConfig {
            area_policy: AreaPolicy::ActualDimensions,
            segmentation: SegmentationMethod::Identity,
            ..PipelineConfig::default()
        })
        .unwrap()
    }

    fn half_green(width: usize) -> PixelArray {
        let pixels = (0..width * 2)
            .map(|i| {
                if i < width {
                    Pixel::new(0.1, 0.6, 0.1)
                } else {
                    Pixel::new(0.0, 0.0, 0.0)
                }
            })
            .collect();
        PixelArray::new(width, 2, pixels).unwrap()
    }

    #[test]
    fn test_six_headings_are_averaged() {
        let green = PixelArray::filled(4, 2, Pixel::new(0.1, 0.6, 0.1)).unwrap();
        let black = PixelArray::filled(4, 2, Pixel::new(0.0, 0.0, 0.0)).unwrap();
        let tiles = HEADINGS
            .iter()
            .map(|&h| match h {
                0 | 60 => (h, green.clone()),
                120 => (h, half_green(4)),
                _ => (h, black.clone()),
            })
            .collect();
        let report = measure_panorama(&pipeline(), &MapSource { tiles }, "pano");

        assert_eq!(report.headings.len(), 6);
        assert_eq!(report.green_view, GreenView::Measured(250.0 / 6.0));
        assert_eq!(report.to_string(), format!("panoID: pano, greenview: {}", 250.0 / 6.0));
    }

    #[test]
    fn test_missing_heading_reports_sentinel() {
        let green = PixelArray::filled(4, 2, Pixel::new(0.1, 0.6, 0.1)).unwrap();
        let tiles = [(0, green.clone()), (60, green)].into_iter().collect();
        let report = measure_panorama(&pipeline(), &MapSource { tiles }, "gap");

        assert_eq!(report.headings, vec![(0, 100.0), (60, 100.0)]);
        assert!(matches!(report.green_view, GreenView::Failed { heading: Some(120), .. }));
        assert_eq!(report.green_view.value(), FAILURE_SENTINEL);
        assert_eq!(report.to_string(), "panoID: gap, greenview: -1000");
    }

    /// Hands out an empty-shaped tile error for one heading.
    struct MalformedSource;

    impl TileSource for MalformedSource {
        fn fetch(&self, _pano_id: &str, heading: u32) -> Result<PixelArray> {
            if heading == 180 {
                return Err(GreenViewError::invalid_shape(400, 400, 0));
            }
            PixelArray::filled(4, 2, Pixel::new(0.1, 0.6, 0.1))
        }
    }

    #[test]
    fn test_malformed_tile_reports_sentinel() {
        let report = measure_panorama(&pipeline(), &MalformedSource, "bad");

        assert_eq!(report.headings.len(), 3);
        match &report.green_view {
            GreenView::Failed { heading, reason } => {
                assert_eq!(*heading, Some(180));
                assert!(reason.contains("400x400"));
            }
            other => panic!("unexpected green view {other:?}"),
        }
        assert_eq!(report.green_view.value(), FAILURE_SENTINEL);
    }

    #[test]
    fn test_failed_report_has_no_headings() {
        let report = PanoramaReport::failed("lost", None, "worker stopped");
        assert!(report.headings.is_empty());
        assert!(!report.green_view.is_measured());
        assert_eq!(report.to_string(), "panoID: lost, greenview: -1000");
    }

    #[test]
    fn test_ledger_claims_once() {
        let mut ledger = PanoramaLedger::new();
        assert!(ledger.claim("a"));
        assert!(!ledger.claim("a"));
        assert!(ledger.claim("b"));
        assert!(ledger.contains("a"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_ledger_from_report_lines() {
        let lines = "panoID: a_1, greenview: 12.5\n\
                     some unrelated line\n\
                     panoID: b, greenview: -1000\n\
                     panoID: truncated";
        let ledger = PanoramaLedger::from_report_lines(lines.as_bytes()).unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("a_1"));
        assert!(ledger.contains("b"));
        assert!(!ledger.contains("truncated"));

        let empty = PanoramaLedger::from_report_lines(&b""[..]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_directory_source_lists_and_loads() {
        let root = std::env::temp_dir().join("green_view_directory_source");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        let source = DirectoryTileSource::new(&root, "png");

        let tile = PixelArray::filled(3, 3, Pixel::new(0.0, 1.0, 0.0)).unwrap();
        image_helper::save(&source.tile_path("abc_def", 0), &tile).unwrap();
        image_helper::save(&source.tile_path("xyz", 60), &tile).unwrap();
        std::fs::write(root.join("notes_0.txt"), "ignored").unwrap();
        std::fs::write(root.join("xyz_45.png"), "ignored").unwrap();

        assert_eq!(source.panorama_ids().unwrap(), vec!["abc_def", "xyz"]);
        assert_eq!(source.fetch("abc_def", 0).unwrap().len(), 9);
        let err = source.fetch("abc_def", 60).unwrap_err();
        assert!(matches!(err, GreenViewError::TileUnavailable { heading: 60, .. }));

        let _ = std::fs::remove_dir_all(root);
    }
}
