//! Blank-tail trimming: keep only the printed part of a rendered page.
//!
//! Every upstream report page has the same frame, so a fixed margin crop
//! removes the border and the header band. What remains is content followed
//! by a variable run of empty paper. The bottom row of the cropped image is
//! taken as the reference for "empty" (the baseline) and rows are walked
//! upward until one is classified as content by the configured
//! [`BlankRowRule`]; everything below that row is dropped.
//!
//! Known limitation: when printed content touches the very last row, the
//! baseline itself is dark, no row above is darker, and the page collapses
//! to a near-zero crop that is then discarded.

use crate::config::{BlankRowRule, PixelMargins, ReportGeometry};
use image::{imageops, DynamicImage, RgbImage};
use tracing::debug;

/// The trimmed, content-only region of one page.
#[derive(Debug, Clone)]
pub struct ContentFragment {
    /// 1-based page number in the source PDF.
    pub page_num: usize,
    pub image: RgbImage,
}

impl ContentFragment {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Strip the fixed frame. `None` when the page is smaller than its margins.
pub fn crop_margins(page: &RgbImage, margins: PixelMargins) -> Option<RgbImage> {
    let width = page
        .width()
        .checked_sub(margins.left.checked_add(margins.right)?)
        .filter(|w| *w > 0)?;
    let height = page
        .height()
        .checked_sub(margins.top.checked_add(margins.bottom)?)
        .filter(|h| *h > 0)?;
    Some(imageops::crop_imm(page, margins.left, margins.top, width, height).to_image())
}

/// Sum of every channel value of row `y`.
pub fn row_intensity(img: &RgbImage, y: u32) -> u64 {
    (0..img.width())
        .map(|x| {
            let p = img.get_pixel(x, y);
            p[0] as u64 + p[1] as u64 + p[2] as u64
        })
        .sum()
}

/// Exclusive bottom boundary of the content in `img`.
///
/// The bottom row defines the baseline and is never part of the content.
/// The returned value is the number of rows to keep: the row just above it
/// is the first content row found walking upward. Zero means the whole
/// image is blank under `rule`.
pub fn content_bottom(img: &RgbImage, rule: BlankRowRule) -> u32 {
    let height = img.height();
    if height == 0 {
        return 0;
    }
    let baseline = row_intensity(img, height - 1);

    let mut bottom = height - 1;
    while bottom > 0 {
        if rule.is_content(row_intensity(img, bottom - 1), baseline) {
            break;
        }
        bottom -= 1;
    }
    bottom
}

/// Crop, trim, and keep the page if enough content remains.
pub fn trim_page(
    page: &DynamicImage,
    page_num: usize,
    geometry: &ReportGeometry,
    dpi: u32,
) -> Option<ContentFragment> {
    let rgb = page.to_rgb8();
    let Some(cropped) = crop_margins(&rgb, geometry.margins.to_pixels(dpi)) else {
        debug!(
            "Page {} ({}x{} px) is smaller than its margins",
            page_num,
            rgb.width(),
            rgb.height()
        );
        return None;
    };
    drop(rgb);

    let bottom = content_bottom(&cropped, geometry.blank_row_rule);
    if bottom < geometry.min_fragment_height_px {
        debug!(
            "Page {}: {} content rows, below the {} px floor; discarded",
            page_num, bottom, geometry.min_fragment_height_px
        );
        return None;
    }

    debug!(
        "Page {}: kept {}x{} px, trimmed {} blank rows",
        page_num,
        cropped.width(),
        bottom,
        cropped.height() - bottom
    );
    let width = cropped.width();
    let image = imageops::crop_imm(&cropped, 0, 0, width, bottom).to_image();
    Some(ContentFragment { page_num, image })
}
