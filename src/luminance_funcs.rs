// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Per-band luminance. For each retained blob we report an approximate
//! centroid (for placing a label) and a luminance value: the sum or mean of
//! the band channel over the blob's pixels, optionally with the gel's
//! background glow subtracted.
//!
//! The reported values are rescaled so that they share one order of magnitude
//! chosen from the first blob: if the first blob's luminance is L, every value
//! is divided by 10^(ceil(log10(L)) - 1), which puts the first one in (1, 10]
//! and keeps the others comparable to it. Because only the first blob sets the
//! scale, reordering blobs changes the displayed magnitudes (but never their
//! ratios).

use std::time::Instant;

use image::GrayImage;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::blob_funcs::Blob;
use crate::error::{GelScanError, Result};
use crate::histogram_funcs::{histogram_where_above, stats_for_histogram, HistogramStats};

/// Background field positions brighter than this are gel body without
/// bands; the band channel there measures the background glow.
pub const BACKGROUND_CUTOFF: u8 = 100;

/// Blob location in field coordinates: `x` is the column, `y` the row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

/// Whether a band's luminance is the total over its pixels or the
/// per-pixel mean.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LuminanceMode {
    Total,
    Average,
}

/// Controls the random subsample used for centroids. Large bands have
/// thousands of pixels; a tenth of them places a label just as well.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CentroidSampling {
    /// Fraction of a blob's pixels used, in (0, 1]. At least one pixel is
    /// always used.
    pub fraction: f64,
    /// Seed for the sampler; equal seeds give identical centroids.
    pub seed: u64,
}

impl Default for CentroidSampling {
    fn default() -> Self {
        CentroidSampling{fraction: 0.1, seed: 0}
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LuminanceRecord {
    pub centroid: Centroid,
    /// Normalized luminance; see module docs.
    pub luminance: f64,
}

fn check_same_shape(primary: &GrayImage, background: &GrayImage) -> Result<()> {
    if primary.dimensions() != background.dimensions() {
        return Err(GelScanError::FieldShapeMismatch{
            primary: primary.dimensions(),
            background: background.dimensions()});
    }
    Ok(())
}

/// Statistics of the `primary` field over the positions where `background`
/// exceeds [BACKGROUND_CUTOFF]. The whole field is considered, not just the
/// neighborhood of any band. Returns None if no position qualifies.
pub fn estimate_background_noise(primary: &GrayImage, background: &GrayImage)
                                 -> Result<Option<HistogramStats>> {
    check_same_shape(primary, background)?;
    let histogram = histogram_where_above(primary, background, BACKGROUND_CUTOFF);
    let stats = stats_for_histogram(&histogram);
    if stats.count == 0 {
        return Ok(None);
    }
    Ok(Some(stats))
}

/// Number of pixels sampled from a blob of `area` pixels.
pub fn sample_size(area: usize, fraction: f64) -> usize {
    let size = (area as f64 * fraction) as usize;
    size.clamp(1, usize::max(area, 1))
}

/// Mean position of a random subsample of `blob`'s pixels.
pub fn sampled_centroid(blob: &Blob, fraction: f64, rng: &mut StdRng) -> Centroid {
    let pixels = blob.pixels();
    let amount = sample_size(pixels.len(), fraction);
    let mut row_sum = 0.0;
    let mut col_sum = 0.0;
    for i in index::sample(rng, pixels.len(), amount).iter() {
        row_sum += pixels[i].row as f64;
        col_sum += pixels[i].col as f64;
    }
    Centroid{x: col_sum / amount as f64, y: row_sum / amount as f64}
}

/// Luminance of `blob` before normalization: the sum of `primary` over the
/// blob, less `noise` per pixel if given, divided by the area for
/// [LuminanceMode::Average].
///
/// # Panics
/// If a blob pixel lies outside `primary`.
pub fn raw_luminance(blob: &Blob, primary: &GrayImage, noise: Option<f64>,
                     mode: LuminanceMode) -> f64 {
    let mut sum: u64 = 0;
    for p in blob.pixels() {
        sum += primary.get_pixel(p.col as u32, p.row as u32).0[0] as u64;
    }
    let mut luminance = sum as f64;
    if let Some(noise) = noise {
        luminance -= noise * blob.area() as f64;
    }
    match mode {
        LuminanceMode::Total => luminance,
        LuminanceMode::Average => luminance / blob.area() as f64,
    }
}

/// Rescales `raw` values by the order of magnitude of the first one.
pub fn normalize_luminances(raw: &[f64]) -> Result<Vec<f64>> {
    let baseline = match raw.first() {
        Some(&baseline) => baseline,
        None => return Ok(Vec::new()),
    };
    if !(baseline > 0.0) || !baseline.is_finite() {
        return Err(GelScanError::NonPositiveLuminance{blob_index: 0,
                                                      luminance: baseline});
    }
    let exponent = baseline.log10().ceil();
    let scale = 10_f64.powf(exponent - 1.0);
    debug!("Luminance baseline {} sets scale {}", baseline, scale);
    Ok(raw.iter().map(|l| l / scale).collect())
}

/// Computes a [LuminanceRecord] for each blob.
///
/// # Arguments
///   `blobs` - Retained blobs, as from [crate::blob_funcs::find_blobs()]. The
///   first blob sets the normalization scale.
///
///   `primary` - The band channel, same coordinates as the blob mask.
///
///   `background` - If given, the gel-body channel used to estimate the
///   background glow, which is then subtracted from each band. Must match
///   `primary` in size.
///
///   `mode` - Total or per-pixel average luminance.
///
///   `sampling` - Centroid subsampling policy.
///
/// # Returns
/// One record per blob, in blob order. Fails with
/// [GelScanError::NonPositiveLuminance] if the first blob's luminance is not
/// positive (possible after background subtraction), and with
/// [GelScanError::FieldShapeMismatch] for mismatched fields.
pub fn aggregate_luminance(blobs: &[Blob], primary: &GrayImage,
                           background: Option<&GrayImage>, mode: LuminanceMode,
                           sampling: &CentroidSampling)
                           -> Result<Vec<LuminanceRecord>> {
    let aggregate_start = Instant::now();
    let noise = match background {
        Some(background) => {
            match estimate_background_noise(primary, background)? {
                Some(stats) => {
                    info!("Background noise {:.2} (stddev {:.2}) over {} pixels",
                          stats.mean, stats.stddev, stats.count);
                    Some(stats.mean)
                },
                None => {
                    warn!("No background pixels above {}; not subtracting noise",
                          BACKGROUND_CUTOFF);
                    Some(0.0)
                },
            }
        },
        None => None,
    };

    let mut rng = StdRng::seed_from_u64(sampling.seed);
    let mut centroids = Vec::<Centroid>::with_capacity(blobs.len());
    let mut raw = Vec::<f64>::with_capacity(blobs.len());
    for (blob_index, blob) in blobs.iter().enumerate() {
        let centroid = sampled_centroid(blob, sampling.fraction, &mut rng);
        let luminance = raw_luminance(blob, primary, noise, mode);
        debug!("Blob #{}: centroid ({:.1}, {:.1}), raw luminance {}",
               blob_index, centroid.x, centroid.y, luminance);
        centroids.push(centroid);
        raw.push(luminance);
    }
    let normalized = normalize_luminances(&raw)?;
    let records: Vec<LuminanceRecord> = centroids.into_iter().zip(normalized)
        .map(|(centroid, luminance)| LuminanceRecord{centroid, luminance})
        .collect();
    info!("Found luminances of {} blobs in {:?}",
          records.len(), aggregate_start.elapsed());
    Ok(records)
}

// mod tests.
