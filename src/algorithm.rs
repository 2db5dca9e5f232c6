// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! GelScan finds the bands in a scanned electrophoresis gel and measures how
//! bright each one is. Given a colour scan, it returns the band outlines, an
//! approximate centroid for each band, and a luminance value suitable for
//! labelling the band on the image.
//!
//! # Algorithm
//!
//! 1. The blue channel is bright over the gel body and dark over the scanner
//!    bed. Thresholding it at [GEL_THRESHOLD] gives a gel mask, from which a
//!    greedy search finds the rectangle with the highest gel coverage (see
//!    [crate::bounding_box]). Everything outside it is discarded.
//! 2. Within the crop, the red channel peaks on the stained bands.
//!    Thresholding it at the configured band threshold gives a band mask
//!    whose 4-connected components are band candidates (see
//!    [crate::blob_funcs]). Candidates that are too small, too large, or not
//!    compact enough are rejected.
//! 3. Each surviving band gets a centroid and a luminance (see
//!    [crate::luminance_funcs]). Optionally the glow of the gel body, measured
//!    on the red channel wherever the blue channel shows bare gel, is
//!    subtracted first.
//!
//! # Tuning
//!
//! The band threshold matters most. Inspect the band mask (written as
//! `blob_binary.png` by the `gel-scan` tool) and adjust the threshold until
//! the bands are cleanly separated, before adjusting the area and
//! circularity bounds.
//!
//! # Caveats
//!
//! * Scans should be cropped to the bands and lane markings where possible;
//!   the gel search only removes uniform background.
//! * The luminance scale is set by the first band found (top-most, then
//!   left-most). Values are comparable within one scan but not across scans.

use std::time::Instant;

use image::{GrayImage, RgbImage};
use log::{error, info};

use crate::blob_funcs::{find_blobs, BlobExtraction, BlobFilter};
use crate::bounding_box::{find_largest_bounding_box, Rectangle};
use crate::error::{GelScanError, Result};
use crate::image_funcs::{crop_field, split_channels, threshold_field};
use crate::luminance_funcs::{aggregate_luminance, CentroidSampling,
                             LuminanceMode, LuminanceRecord};

/// Blue channel values above this are gel; at or below are background.
pub const GEL_THRESHOLD: u8 = 100;

/// Quantifies how much resolution a scan has; default area bounds scale with
/// it.
pub fn resolutionality(width: u32, height: u32) -> f64 {
    (width as f64 + height as f64) / 2.0
}

/// Parameters for [scan_gel()].
#[derive(Clone, Debug, PartialEq)]
pub struct ScanConfig {
    /// Red channel values above this are band pixels. Raise it if the band
    /// mask is mostly on; lower it if it is mostly off.
    pub threshold: u8,

    /// Smallest band area in pixels. Defaults to 0.4 x resolutionality.
    pub min_area: Option<usize>,

    /// Largest band area in pixels. Defaults to 10 x resolutionality.
    pub max_area: Option<usize>,

    /// Smallest acceptable circularity score.
    pub min_circularity: f64,

    /// Accept every candidate regardless of the three bounds above.
    pub no_filters: bool,

    pub mode: LuminanceMode,

    /// Subtract the gel's background glow from band luminances.
    pub demean: bool,

    /// Bounding box search granularity in pixels.
    pub step: u32,

    pub sampling: CentroidSampling,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig{threshold: 100,
                   min_area: None,
                   max_area: None,
                   min_circularity: 0.4,
                   no_filters: false,
                   mode: LuminanceMode::Total,
                   demean: true,
                   step: 10,
                   sampling: CentroidSampling::default()}
    }
}

impl ScanConfig {
    /// Band acceptance bounds for a scan of the given size, with defaults
    /// filled in.
    pub fn blob_filter(&self, width: u32, height: u32) -> BlobFilter {
        if self.no_filters {
            return BlobFilter::permissive();
        }
        let resolutionality = resolutionality(width, height);
        // Areas are integers, so "area < 0.4 * r" is "area < ceil(0.4 * r)"
        // and "area > 10 * r" is "area > floor(10 * r)".
        BlobFilter{
            min_area: self.min_area.unwrap_or((0.4 * resolutionality).ceil() as usize),
            max_area: self.max_area.unwrap_or((10.0 * resolutionality).floor() as usize),
            min_circularity: self.min_circularity,
        }
    }

    /// Checks the configuration for a scan of the given size, returning the
    /// resolved band filter.
    pub fn validate(&self, width: u32, height: u32) -> Result<BlobFilter> {
        if self.step == 0 {
            return Err(GelScanError::Configuration(
                "bounding box step must be positive".to_string()));
        }
        let fraction = self.sampling.fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(GelScanError::Configuration(format!(
                "centroid sample fraction {} must be within (0, 1]", fraction)));
        }
        let filter = self.blob_filter(width, height);
        filter.validate()?;
        Ok(filter)
    }
}

/// Everything [scan_gel()] produces, including intermediate images useful
/// for diagnosing a poor threshold choice.
#[derive(Debug)]
pub struct GelScan {
    /// Red channel of the whole scan.
    pub red: GrayImage,
    /// Blue channel of the whole scan.
    pub blue: GrayImage,
    /// Blue channel thresholded at [GEL_THRESHOLD].
    pub gel_mask: GrayImage,
    /// Location of the gel within the scan.
    pub bounds: Rectangle,
    /// Red channel cropped to `bounds`.
    pub band_field: GrayImage,
    /// `band_field` thresholded at the configured band threshold.
    pub band_mask: GrayImage,
    /// The band filter that was applied.
    pub filter: BlobFilter,
    /// Bands and their contours, in `band_field` coordinates.
    pub extraction: BlobExtraction,
    /// One record per band in `extraction.blobs`, in the same order.
    pub records: Vec<LuminanceRecord>,
}

/// Runs the full band detection pipeline on a colour gel scan.
///
/// # Arguments
///   `image` - The scan. Large scans should be downscaled first (see
///   [crate::image_funcs::downscale_to_height()]); default area bounds are
///   derived from this image's size.
///
///   `config` - See [ScanConfig].
///
/// # Returns
/// [GelScan] on success. Configuration problems are reported before any
/// processing; the only other failure is a first band whose luminance is not
/// positive after background subtraction. A scan with no bands is not an
/// error.
pub fn scan_gel(image: &RgbImage, config: &ScanConfig) -> Result<GelScan> {
    let scan_start = Instant::now();
    let (width, height) = image.dimensions();
    let filter = config.validate(width, height)?;
    info!("Scanning {}x{}: min_area={} max_area={} min_circularity={} threshold={} demean={} mode={:?}",
          width, height, filter.min_area, filter.max_area, filter.min_circularity,
          config.threshold, config.demean, config.mode);

    let (red, blue) = split_channels(image);
    let gel_mask = threshold_field(&blue, GEL_THRESHOLD);
    let bounds = find_largest_bounding_box(&gel_mask, config.step);

    let band_field = crop_field(&red, &bounds);
    let band_mask = threshold_field(&band_field, config.threshold);
    let extraction = find_blobs(&band_mask, &filter);
    if extraction.blobs.is_empty() {
        error!("{}; inspect the band mask and adjust the threshold or filters",
               extraction.report());
    } else {
        info!("{}", extraction.report());
    }

    let background = if config.demean {
        Some(crop_field(&blue, &bounds))
    } else {
        None
    };
    let records = aggregate_luminance(&extraction.blobs, &band_field,
                                      background.as_ref(), config.mode,
                                      &config.sampling)?;
    info!("Scan completed in {:?}", scan_start.elapsed());
    Ok(GelScan{red, blue, gel_mask, bounds, band_field, band_mask,
               filter, extraction, records})
}

// mod tests.
