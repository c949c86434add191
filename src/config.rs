//! Configuration types for report conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The geometry of the upstream report
//! layout lives in [`ReportGeometry`]; every number in it describes the one
//! report generator this tool targets and is not a universal constant.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// English Metric Units per inch (the unit DrawingML uses for extents).
pub const EMU_PER_INCH: u64 = 914_400;

/// Word measures page size in twentieths of a point.
pub const TWIPS_PER_INCH: f64 = 1440.0;

/// Configuration for a conversion run.
///
/// # Example
/// ```rust
/// use pcad2docx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .template_path("template.docx")
///     .base_path("default.docx")
///     .build()
///     .unwrap();
/// assert_eq!(config.geometry.display_scale, 0.85);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 150.
    ///
    /// Margin offsets are stored in points and scaled to this resolution, so
    /// changing it keeps the crop aligned with the printed frame.
    pub dpi: u32,

    /// Fixed layout of the upstream report pages.
    pub geometry: ReportGeometry,

    /// Per-report template carrying the `Cable Name` placeholder table.
    pub template_path: PathBuf,

    /// Base document whose styles the composite inherits.
    pub base_path: PathBuf,

    /// Placeholder text replaced by each report's identifier. Default: "Cable Name".
    pub placeholder: String,

    /// Paragraph style applied to the replaced title. Default: "CommentsStyle".
    pub title_style_id: String,

    /// Typeface of the title style. Default: "Arial".
    pub title_font: String,

    /// Output page size in inches (width, height). Default: A4, 8.27 × 11.69.
    pub page_size_in: (f64, f64),

    /// File name of the composite, written into the PDF directory.
    pub output_file_name: String,

    /// File name of the CSV summary, written into the PDF directory.
    pub summary_file_name: String,

    /// Explicit pdfium location: a directory holding the platform library or
    /// the library file itself. `None` binds to the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Receives phase and file events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            geometry: ReportGeometry::default(),
            template_path: PathBuf::from("template.docx"),
            base_path: PathBuf::from("default.docx"),
            placeholder: "Cable Name".to_string(),
            title_style_id: "CommentsStyle".to_string(),
            title_font: "Arial".to_string(),
            page_size_in: (8.27, 11.69),
            output_file_name: "concatenated.docx".to_string(),
            summary_file_name: "0cable_info.csv".to_string(),
            pdfium_library: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("geometry", &self.geometry)
            .field("template_path", &self.template_path)
            .field("base_path", &self.base_path)
            .field("placeholder", &self.placeholder)
            .field("title_style_id", &self.title_style_id)
            .field("page_size_in", &self.page_size_in)
            .field("output_file_name", &self.output_file_name)
            .field("summary_file_name", &self.summary_file_name)
            .field("pdfium_library", &self.pdfium_library)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Target height of one report's image strip, in EMU.
    pub fn target_height_emu(&self) -> u64 {
        (self.geometry.target_height_in * EMU_PER_INCH as f64).round() as u64
    }

    /// Output page size in twips (width, height).
    pub fn page_size_twips(&self) -> (u32, u32) {
        (
            (self.page_size_in.0 * TWIPS_PER_INCH).round() as u32,
            (self.page_size_in.1 * TWIPS_PER_INCH).round() as u32,
        )
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn geometry(mut self, geometry: ReportGeometry) -> Self {
        self.config.geometry = geometry;
        self
    }

    pub fn blank_row_rule(mut self, rule: BlankRowRule) -> Self {
        self.config.geometry.blank_row_rule = rule;
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = path.into();
        self
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.config.placeholder = text.into();
        self
    }

    pub fn title_style(mut self, style_id: impl Into<String>, font: impl Into<String>) -> Self {
        self.config.title_style_id = style_id.into();
        self.config.title_font = font.into();
        self
    }

    pub fn page_size_in(mut self, width: f64, height: f64) -> Self {
        self.config.page_size_in = (width, height);
        self
    }

    pub fn output_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_file_name = name.into();
        self
    }

    pub fn summary_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.summary_file_name = name.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, BatchError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(BatchError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        c.geometry.validate()?;
        if c.placeholder.is_empty() {
            return Err(BatchError::InvalidConfig("Placeholder text must not be empty".into()));
        }
        if c.title_style_id.is_empty() || c.title_style_id.contains(char::is_whitespace) {
            return Err(BatchError::InvalidConfig(format!(
                "Title style id must be a single token, got '{}'",
                c.title_style_id
            )));
        }
        if !(c.page_size_in.0 > 0.0 && c.page_size_in.1 > 0.0) {
            return Err(BatchError::InvalidConfig(format!(
                "Page size must be positive, got {:?}",
                c.page_size_in
            )));
        }
        if c.output_file_name.is_empty() || c.summary_file_name.is_empty() {
            return Err(BatchError::InvalidConfig("Output file names must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Report geometry ──────────────────────────────────────────────────────

/// Margins in points (1/72 in) around the printed frame of a report page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMargins {
    pub left_pt: f64,
    pub top_pt: f64,
    pub right_pt: f64,
    pub bottom_pt: f64,
}

impl Default for PageMargins {
    /// Offsets of the upstream report frame. At 150 DPI they are exactly
    /// 85 / 391 / 85 / 70 px; the top band holds the report header, which
    /// the template table replaces.
    fn default() -> Self {
        Self {
            left_pt: 40.8,
            top_pt: 187.68,
            right_pt: 40.8,
            bottom_pt: 33.6,
        }
    }
}

/// Margins converted to whole pixels for one render resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelMargins {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PageMargins {
    /// Scale the margins to pixels at `dpi`.
    pub fn to_pixels(&self, dpi: u32) -> PixelMargins {
        let scale = dpi as f64 / 72.0;
        let px = |pt: f64| (pt * scale).round().max(0.0) as u32;
        PixelMargins {
            left: px(self.left_pt),
            top: px(self.top_pt),
            right: px(self.right_pt),
            bottom: px(self.bottom_pt),
        }
    }
}

/// How the trimmer decides that a row above the baseline is printed content.
///
/// The upstream pages are dark ink on white paper, so the default treats a
/// row as content once its intensity sum drops below the bottom-row
/// baseline. This is a heuristic; the other variants exist for deployments
/// whose pages do not match that assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlankRowRule {
    /// Content is darker than the baseline (row sum < baseline). (default)
    #[default]
    DarkerThanBaseline,
    /// Content is lighter than the baseline (row sum > baseline).
    LighterThanBaseline,
    /// Any row whose sum differs from the baseline is content.
    DiffersFromBaseline,
}

impl BlankRowRule {
    /// Whether a row with intensity `row_sum` is content given `baseline`.
    pub fn is_content(self, row_sum: u64, baseline: u64) -> bool {
        match self {
            BlankRowRule::DarkerThanBaseline => row_sum < baseline,
            BlankRowRule::LighterThanBaseline => row_sum > baseline,
            BlankRowRule::DiffersFromBaseline => row_sum != baseline,
        }
    }
}

/// Fixed geometry of the upstream report layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGeometry {
    /// Frame margins stripped from every rendered page.
    pub margins: PageMargins,

    /// Vertical space on the output page shared by one report's fragments,
    /// in inches. Default: 9.5 (A4 minus the template title table).
    pub target_height_in: f64,

    /// Width multiplier applied after aspect-ratio scaling, leaving lateral
    /// margin. Range (0, 1]. Default: 0.85.
    pub display_scale: f64,

    /// Fragments with fewer content rows than this are discarded as empty.
    /// Default: 5.
    pub min_fragment_height_px: u32,

    /// Blank-row classification used by the trimmer.
    pub blank_row_rule: BlankRowRule,
}

impl Default for ReportGeometry {
    fn default() -> Self {
        Self {
            margins: PageMargins::default(),
            target_height_in: 9.5,
            display_scale: 0.85,
            min_fragment_height_px: 5,
            blank_row_rule: BlankRowRule::default(),
        }
    }
}

impl ReportGeometry {
    fn validate(&self) -> Result<(), BatchError> {
        let m = &self.margins;
        if [m.left_pt, m.top_pt, m.right_pt, m.bottom_pt]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(BatchError::InvalidConfig(format!(
                "Margins must be non-negative, got {m:?}"
            )));
        }
        if !(self.target_height_in.is_finite() && self.target_height_in > 0.0) {
            return Err(BatchError::InvalidConfig(format!(
                "Target height must be positive, got {}",
                self.target_height_in
            )));
        }
        if !(self.display_scale > 0.0 && self.display_scale <= 1.0) {
            return Err(BatchError::InvalidConfig(format!(
                "Display scale must be in (0, 1], got {}",
                self.display_scale
            )));
        }
        if self.min_fragment_height_px == 0 {
            return Err(BatchError::InvalidConfig(
                "Minimum fragment height must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_margins_match_150_dpi_frame() {
        let px = PageMargins::default().to_pixels(150);
        assert_eq!(
            px,
            PixelMargins {
                left: 85,
                top: 391,
                right: 85,
                bottom: 70
            }
        );
    }

    #[test]
    fn margins_scale_with_dpi() {
        let px = PageMargins::default().to_pixels(300);
        assert_eq!(px.left, 170);
        assert_eq!(px.top, 782);
        assert_eq!(px.bottom, 140);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ConversionConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
    }

    #[test]
    fn builder_rejects_bad_scale() {
        let geometry = ReportGeometry {
            display_scale: 1.5,
            ..ReportGeometry::default()
        };
        let err = ConversionConfig::builder().geometry(geometry).build();
        assert!(matches!(err, Err(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_spaced_style_id() {
        let err = ConversionConfig::builder()
            .title_style("Comments Style", "Arial")
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn a4_in_twips() {
        let c = ConversionConfig::default();
        assert_eq!(c.page_size_twips(), (11909, 16834));
    }

    #[test]
    fn target_height_in_emu() {
        let c = ConversionConfig::default();
        assert_eq!(c.target_height_emu(), 8_686_800);
    }

    #[test]
    fn blank_row_rules() {
        assert!(BlankRowRule::DarkerThanBaseline.is_content(10, 20));
        assert!(!BlankRowRule::DarkerThanBaseline.is_content(20, 20));
        assert!(!BlankRowRule::DarkerThanBaseline.is_content(30, 20));
        assert!(BlankRowRule::LighterThanBaseline.is_content(30, 20));
        assert!(BlankRowRule::DiffersFromBaseline.is_content(19, 20));
        assert!(!BlankRowRule::DiffersFromBaseline.is_content(20, 20));
    }
}
