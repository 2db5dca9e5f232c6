// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Band candidate extraction. The input is a binary mask of the cropped gel in
//! which "on" pixels exceed the band threshold. Each maximal 4-connected group
//! of on pixels is a candidate band ("blob"). While flood filling a blob we
//! also collect its contour: every position 4-adjacent to the blob that is
//! itself off or outside the mask.
//!
//! Candidates are screened by area and by a circularity score. Electrophoresis
//! bands are compact, roughly elliptical smudges; long thin streaks (lane
//! edges, scratches) and tiny specks (dust, noise) are rejected.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::time::Instant;

use image::GrayImage;
use log::{debug, info};

use crate::error::{GelScanError, Result};

/// Position within a field. Signed so that contours can record positions
/// just outside the mask (row or col of -1, or equal to the height/width).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PixelCoord {
    pub row: i32,
    pub col: i32,
}

impl PixelCoord {
    pub fn new(row: i32, col: i32) -> PixelCoord {
        PixelCoord{row, col}
    }

    // Order matches the flood fill's historical neighbor order: down, up,
    // right, left.
    fn neighbors(&self) -> [PixelCoord; 4] {
        [PixelCoord::new(self.row + 1, self.col),
         PixelCoord::new(self.row - 1, self.col),
         PixelCoord::new(self.row, self.col + 1),
         PixelCoord::new(self.row, self.col - 1)]
    }
}

/// A maximal 4-connected set of on pixels. Never empty. Pixels are in flood
/// fill (breadth first) order starting from the seed.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pixels: Vec<PixelCoord>,
}

impl Blob {
    pub fn pixels(&self) -> &[PixelCoord] {
        &self.pixels
    }

    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}

/// The distinct positions adjacent to a [Blob] that are off or out of
/// bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    pixels: Vec<PixelCoord>,
}

impl Contour {
    pub fn pixels(&self) -> &[PixelCoord] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Acceptance bounds for band candidates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlobFilter {
    pub min_area: usize,
    pub max_area: usize,
    pub min_circularity: f64,
}

impl BlobFilter {
    /// Bounds that accept every candidate.
    pub fn permissive() -> BlobFilter {
        BlobFilter{min_area: 0, max_area: 9_999_999, min_circularity: 0.0}
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_area > self.max_area {
            return Err(GelScanError::Configuration(format!(
                "min_area {} exceeds max_area {}", self.min_area, self.max_area)));
        }
        if !(0.0..=1.0).contains(&self.min_circularity) {
            return Err(GelScanError::Configuration(format!(
                "min_circularity {} must be within [0, 1]", self.min_circularity)));
        }
        Ok(())
    }
}

/// Number of candidates rejected by each criterion.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FilterCounts {
    pub too_small: usize,
    pub too_large: usize,
    pub not_circular: usize,
}

impl FilterCounts {
    pub fn total(&self) -> usize {
        self.too_small + self.too_large + self.not_circular
    }
}

/// Outcome of screening one candidate. Criteria are checked in declaration
/// order; the first failing one is reported.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Classification {
    TooSmall,
    TooLarge,
    NotCircular,
    Retained,
}

/// Receives per-candidate results from [find_blobs_with_observer()].
pub trait ExtractionObserver {
    /// Called once per connected component, in discovery order.
    /// `candidate_index` counts all components, retained or not.
    fn candidate_classified(&mut self, _candidate_index: usize, _seed: PixelCoord,
                            _area: usize, _contour_len: usize, _circularity: f64,
                            _classification: Classification) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl ExtractionObserver for NullObserver {}

/// Result of [find_blobs()]. `blobs[i]` and `contours[i]` describe the same
/// band; both are in discovery order.
#[derive(Debug)]
pub struct BlobExtraction {
    pub blobs: Vec<Blob>,
    pub contours: Vec<Contour>,
    pub filtered: FilterCounts,
}

impl BlobExtraction {
    /// Number of connected components found before filtering.
    pub fn candidate_count(&self) -> usize {
        self.blobs.len() + self.filtered.total()
    }

    /// One-line human readable summary of what was kept and why the rest was
    /// dropped.
    pub fn report(&self) -> String {
        let mut reasons = Vec::<String>::new();
        for (count, phrase) in [(self.filtered.too_small, "area too small"),
                                (self.filtered.too_large, "area too large"),
                                (self.filtered.not_circular, "not circular enough")] {
            if count != 0 {
                reasons.push(format!("filtered {} because {}", count, phrase));
            }
        }
        if reasons.is_empty() {
            format!("found {} blobs", self.blobs.len())
        } else {
            format!("found {} blobs ({})", self.blobs.len(), reasons.join(", "))
        }
    }
}

/// Isoperimetric-style shape score `4π·area / |contour|²`. Uses the contour
/// cardinality rather than a true perimeter length, so it is only a rough
/// measure: a filled square scores π/4 and large digital disks approach
/// π²/8.
pub fn circularity(area: usize, contour_len: usize) -> f64 {
    4.0 * PI * area as f64 / (contour_len as f64 * contour_len as f64)
}

// Working state for flood filling every blob of one mask. The contour stamp
// grid is padded by one position on each side so out-of-bounds contour
// positions have a slot; each slot holds the (1-based) ordinal of the last
// blob that recorded it, which deduplicates contours without clearing.
struct FloodFill<'a> {
    mask: &'a GrayImage,
    width: i32,
    height: i32,
    visited: Vec<bool>,
    contour_stamp: Vec<u32>,
    queue: VecDeque<PixelCoord>,
}

impl<'a> FloodFill<'a> {
    fn new(mask: &'a GrayImage) -> FloodFill<'a> {
        let (width, height) = mask.dimensions();
        let num_pixels = (width * height) as usize;
        let num_padded = ((width + 2) * (height + 2)) as usize;
        FloodFill{mask, width: width as i32, height: height as i32,
                  visited: vec![false; num_pixels],
                  contour_stamp: vec![0; num_padded],
                  queue: VecDeque::new()}
    }

    fn in_bounds(&self, p: PixelCoord) -> bool {
        p.row >= 0 && p.row < self.height && p.col >= 0 && p.col < self.width
    }

    // Caller ensures `p` is in bounds.
    fn index(&self, p: PixelCoord) -> usize {
        (p.row * self.width + p.col) as usize
    }

    fn padded_index(&self, p: PixelCoord) -> usize {
        ((p.row + 1) * (self.width + 2) + (p.col + 1)) as usize
    }

    fn is_on(&self, p: PixelCoord) -> bool {
        self.in_bounds(p) &&
            self.mask.get_pixel(p.col as u32, p.row as u32).0[0] > 0
    }

    fn is_unvisited_seed(&self, p: PixelCoord) -> bool {
        self.is_on(p) && !self.visited[self.index(p)]
    }

    // Breadth first fill from `seed`, which must be an unvisited on pixel.
    // `ordinal` must be unique per call and non-zero.
    fn fill(&mut self, seed: PixelCoord, ordinal: u32) -> (Blob, Contour) {
        debug_assert!(ordinal > 0);
        let mut blob_pixels = vec![seed];
        let mut contour_pixels = Vec::<PixelCoord>::new();
        let seed_index = self.index(seed);
        self.visited[seed_index] = true;
        self.queue.clear();
        self.queue.push_back(seed);
        while let Some(current) = self.queue.pop_front() {
            for neighbor in current.neighbors() {
                if self.is_on(neighbor) {
                    let index = self.index(neighbor);
                    if !self.visited[index] {
                        self.visited[index] = true;
                        blob_pixels.push(neighbor);
                        self.queue.push_back(neighbor);
                    }
                } else {
                    let padded = self.padded_index(neighbor);
                    if self.contour_stamp[padded] != ordinal {
                        self.contour_stamp[padded] = ordinal;
                        contour_pixels.push(neighbor);
                    }
                }
            }
        }
        (Blob{pixels: blob_pixels}, Contour{pixels: contour_pixels})
    }
}

fn classify(area: usize, circularity: f64, filter: &BlobFilter) -> Classification {
    if area < filter.min_area {
        Classification::TooSmall
    } else if area > filter.max_area {
        Classification::TooLarge
    } else if circularity < filter.min_circularity {
        Classification::NotCircular
    } else {
        Classification::Retained
    }
}

/// Partitions the on pixels of `mask` into 4-connected blobs and screens them
/// with `filter`. See [find_blobs_with_observer()].
pub fn find_blobs(mask: &GrayImage, filter: &BlobFilter) -> BlobExtraction {
    find_blobs_with_observer(mask, filter, &mut NullObserver)
}

/// Extracts band candidates from `mask`.
///
/// # Arguments
///   `mask` - Binary mask; any non-zero value is on.
///
///   `filter` - Acceptance bounds. Not validated here; see
///   [BlobFilter::validate()].
///
///   `observer` - Told about every candidate, retained or not.
///
/// # Returns
/// [BlobExtraction] holding retained blobs and their contours in discovery
/// order (seeds are taken in raster scan order), plus counts of rejected
/// candidates. Every on pixel belongs to exactly one candidate, so the
/// rejected counts plus the number of retained blobs equals the number of
/// connected components. An all-off mask yields empty results.
pub fn find_blobs_with_observer(mask: &GrayImage, filter: &BlobFilter,
                                observer: &mut dyn ExtractionObserver)
                                -> BlobExtraction {
    let extraction_start = Instant::now();
    let mut fill = FloodFill::new(mask);
    let mut blobs = Vec::<Blob>::new();
    let mut contours = Vec::<Contour>::new();
    let mut filtered = FilterCounts::default();
    let mut candidate_index = 0_usize;

    for row in 0..fill.height {
        for col in 0..fill.width {
            let seed = PixelCoord::new(row, col);
            if !fill.is_unvisited_seed(seed) {
                continue;
            }
            let (blob, contour) = fill.fill(seed, candidate_index as u32 + 1);
            let area = blob.area();
            let circularity = circularity(area, contour.len());
            let classification = classify(area, circularity, filter);
            debug!("Candidate #{} seeded at {:?}: area {}, contour {}, circularity {:.3} -> {:?}",
                   candidate_index, seed, area, contour.len(), circularity,
                   classification);
            observer.candidate_classified(candidate_index, seed, area, contour.len(),
                                          circularity, classification);
            match classification {
                Classification::TooSmall => filtered.too_small += 1,
                Classification::TooLarge => filtered.too_large += 1,
                Classification::NotCircular => filtered.not_circular += 1,
                Classification::Retained => {
                    blobs.push(blob);
                    contours.push(contour);
                },
            }
            candidate_index += 1;
        }
    }
    info!("Blob extraction found {} candidates, kept {} in {:?}",
          candidate_index, blobs.len(), extraction_start.elapsed());
    BlobExtraction{blobs, contours, filtered}
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use std::collections::HashSet;

    use approx::assert_abs_diff_eq;
    use image::Luma;
    use imageproc::gray_image;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::image_funcs::threshold_field;

    fn square_field(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> GrayImage {
        // Each square is (top row, left col, side); squares are bright (250)
        // on a dim (10) background.
        GrayImage::from_fn(width, height, |x, y| {
            let inside = squares.iter().any(|&(top, left, side)| {
                y >= top && y < top + side && x >= left && x < left + side
            });
            Luma([if inside { 250 } else { 10 }])
        })
    }

    fn disk_mask(radius: i32) -> GrayImage {
        let size = (2 * radius + 7) as u32;
        let center = (size / 2) as i32;
        GrayImage::from_fn(size, size, |x, y| {
            let dx = x as i32 - center;
            let dy = y as i32 - center;
            Luma([if dx * dx + dy * dy <= radius * radius { 255 } else { 0 }])
        })
    }

    fn coord_set(coords: &[PixelCoord]) -> HashSet<PixelCoord> {
        coords.iter().copied().collect()
    }

    #[test]
    fn test_single_square() {
        let field = square_field(20, 20, &[(5, 5, 5)]);
        let mask = threshold_field(&field, 200);
        let filter = BlobFilter{min_area: 1, max_area: 9999, min_circularity: 0.4};
        let extraction = find_blobs(&mask, &filter);
        assert_eq!(extraction.blobs.len(), 1);
        assert_eq!(extraction.contours.len(), 1);
        assert_eq!(extraction.filtered, FilterCounts::default());

        let blob = &extraction.blobs[0];
        assert_eq!(blob.area(), 25);
        let mut expected_blob = HashSet::new();
        for row in 5..10 {
            for col in 5..10 {
                expected_blob.insert(PixelCoord::new(row, col));
            }
        }
        assert_eq!(coord_set(blob.pixels()), expected_blob);

        // Contour is the 20 pixel ring of edge neighbors (no corners).
        let contour = &extraction.contours[0];
        assert_eq!(contour.len(), 20);
        let mut expected_contour = HashSet::new();
        for i in 5..10 {
            expected_contour.insert(PixelCoord::new(4, i));
            expected_contour.insert(PixelCoord::new(10, i));
            expected_contour.insert(PixelCoord::new(i, 4));
            expected_contour.insert(PixelCoord::new(i, 10));
        }
        assert_eq!(coord_set(contour.pixels()), expected_contour);
        assert_abs_diff_eq!(circularity(blob.area(), contour.len()),
                            0.785, epsilon = 0.001);
    }

    #[test]
    fn test_two_squares() {
        let field = square_field(30, 20, &[(2, 2, 4), (10, 20, 4)]);
        let mask = threshold_field(&field, 200);
        let extraction = find_blobs(&mask, &BlobFilter::permissive());
        assert_eq!(extraction.blobs.len(), 2);
        assert_eq!(extraction.candidate_count(), 2);
        // Raster order discovery: the upper-left square comes first.
        assert_eq!(extraction.blobs[0].pixels()[0], PixelCoord::new(2, 2));
        assert_eq!(extraction.blobs[1].pixels()[0], PixelCoord::new(10, 20));
        let first = coord_set(extraction.contours[0].pixels());
        let second = coord_set(extraction.contours[1].pixels());
        assert!(first.is_disjoint(&second));
    }

    #[test]
    fn test_too_small() {
        let field = square_field(20, 20, &[(5, 5, 3)]);
        let mask = threshold_field(&field, 200);
        let filter = BlobFilter{min_area: 10, max_area: 9999, min_circularity: 0.0};
        let extraction = find_blobs(&mask, &filter);
        assert!(extraction.blobs.is_empty());
        assert!(extraction.contours.is_empty());
        assert_eq!(extraction.filtered,
                   FilterCounts{too_small: 1, too_large: 0, not_circular: 0});
        assert_eq!(extraction.report(),
                   "found 0 blobs (filtered 1 because area too small)");
    }

    #[test]
    fn test_too_large_and_not_circular() {
        let mask = gray_image!(
            255, 255, 255, 255, 255, 255, 0,   0;
              0,   0,   0,   0,   0,   0, 0,   0;
            255, 255,   0,   0,   0,   0, 0, 255;
            255, 255,   0,   0,   0,   0, 0,   0);
        // Components: a 1x6 streak (area 6, contour 14, circularity 0.38), a
        // 2x2 square (area 4, contour 8, circularity 0.79) and a single pixel.
        let filter = BlobFilter{min_area: 2, max_area: 5, min_circularity: 0.5};
        let extraction = find_blobs(&mask, &filter);
        assert_eq!(extraction.filtered,
                   FilterCounts{too_small: 1, too_large: 1, not_circular: 0});
        assert_eq!(extraction.blobs.len(), 1);
        assert_eq!(extraction.blobs[0].area(), 4);

        // With a larger max_area the streak is rejected for its shape.
        let filter = BlobFilter{min_area: 2, max_area: 10, min_circularity: 0.5};
        let extraction = find_blobs(&mask, &filter);
        assert_eq!(extraction.filtered,
                   FilterCounts{too_small: 1, too_large: 0, not_circular: 1});
        assert_eq!(extraction.report(),
                   "found 1 blobs (filtered 1 because area too small, \
                    filtered 1 because not circular enough)");
    }

    #[test]
    fn test_filter_priority() {
        // A single pixel is both too small and (with a high bound) not
        // circular enough; only the area rejection is counted.
        let mask = gray_image!(
            0,   0, 0;
            0, 255, 0;
            0,   0, 0);
        let filter = BlobFilter{min_area: 2, max_area: 10, min_circularity: 1.0};
        let extraction = find_blobs(&mask, &filter);
        assert_eq!(extraction.filtered,
                   FilterCounts{too_small: 1, too_large: 0, not_circular: 0});
    }

    #[test]
    fn test_all_off_mask() {
        let mask = GrayImage::new(16, 9);
        let extraction = find_blobs(&mask, &BlobFilter::permissive());
        assert!(extraction.blobs.is_empty());
        assert!(extraction.contours.is_empty());
        assert_eq!(extraction.filtered, FilterCounts::default());
        assert_eq!(extraction.report(), "found 0 blobs");

        let empty = GrayImage::new(0, 0);
        assert_eq!(find_blobs(&empty, &BlobFilter::permissive()).candidate_count(), 0);
    }

    #[test]
    fn test_contour_includes_out_of_bounds() {
        let mask = gray_image!(
            255, 0, 0;
              0, 0, 0);
        let extraction = find_blobs(&mask, &BlobFilter::permissive());
        assert_eq!(extraction.blobs.len(), 1);
        assert_eq!(coord_set(extraction.contours[0].pixels()),
                   [PixelCoord::new(-1, 0), PixelCoord::new(0, -1),
                    PixelCoord::new(1, 0), PixelCoord::new(0, 1)]
                   .into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn test_contour_deduplicated() {
        // An L shape: the off pixel in the concave corner touches two blob
        // pixels but is recorded once.
        let mask = gray_image!(
            0,   0,   0, 0, 0;
            0, 255,   0, 0, 0;
            0, 255, 255, 0, 0;
            0,   0,   0, 0, 0;
            0,   0,   0, 0, 0);
        let extraction = find_blobs(&mask, &BlobFilter::permissive());
        assert_eq!(extraction.blobs[0].area(), 3);
        assert_eq!(extraction.contours[0].len(), 7);
        assert_eq!(coord_set(extraction.contours[0].pixels()).len(), 7);
    }

    #[test]
    fn test_every_on_pixel_in_exactly_one_blob() {
        let mut rng = StdRng::seed_from_u64(7);
        for _trial in 0..10 {
            let width = rng.gen_range(1..40);
            let height = rng.gen_range(1..40);
            let mask = GrayImage::from_fn(width, height, |_x, _y| {
                Luma([if rng.gen_bool(0.45) { 255 } else { 0 }])
            });
            let extraction = find_blobs(&mask, &BlobFilter::permissive());
            let mut seen = HashSet::<PixelCoord>::new();
            for blob in &extraction.blobs {
                assert!(blob.area() > 0);
                for p in blob.pixels() {
                    assert_eq!(mask.get_pixel(p.col as u32, p.row as u32).0[0], 255);
                    assert!(seen.insert(*p), "pixel {:?} in two blobs", p);
                }
            }
            let on_count = mask.pixels().filter(|p| p.0[0] > 0).count();
            assert_eq!(seen.len(), on_count);

            // Whatever the filter, each component is either retained or
            // counted once.
            let filter = BlobFilter{min_area: 3, max_area: 12, min_circularity: 0.5};
            let screened = find_blobs(&mask, &filter);
            assert_eq!(screened.candidate_count(), extraction.blobs.len());
            assert_eq!(screened.blobs.len(), screened.contours.len());
        }
    }

    #[test]
    fn test_disk_circularity_converges() {
        // The contour of a large digital disk has ~4·sqrt(2)·r positions, so
        // circularity tends to π²/8 rather than 1.
        let mut previous = 0.0;
        for radius in [5, 10, 20, 40] {
            let extraction = find_blobs(&disk_mask(radius), &BlobFilter::permissive());
            assert_eq!(extraction.blobs.len(), 1);
            let c = circularity(extraction.blobs[0].area(), extraction.contours[0].len());
            assert!(c > previous, "radius {}: {} <= {}", radius, c, previous);
            previous = c;
        }
        let extraction = find_blobs(&disk_mask(60), &BlobFilter::permissive());
        let c = circularity(extraction.blobs[0].area(), extraction.contours[0].len());
        assert_abs_diff_eq!(c, PI * PI / 8.0, epsilon = 0.01);
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Vec<(usize, usize, Classification)>,
    }

    impl ExtractionObserver for RecordingObserver {
        fn candidate_classified(&mut self, candidate_index: usize, _seed: PixelCoord,
                                area: usize, _contour_len: usize, _circularity: f64,
                                classification: Classification) {
            self.events.push((candidate_index, area, classification));
        }
    }

    #[test]
    fn test_observer_sees_every_candidate() {
        let field = square_field(30, 20, &[(1, 1, 2), (10, 20, 4)]);
        let mask = threshold_field(&field, 200);
        let filter = BlobFilter{min_area: 5, max_area: 100, min_circularity: 0.0};
        let mut observer = RecordingObserver::default();
        let extraction = find_blobs_with_observer(&mask, &filter, &mut observer);
        assert_eq!(extraction.blobs.len(), 1);
        assert_eq!(observer.events,
                   vec![(0, 4, Classification::TooSmall),
                        (1, 16, Classification::Retained)]);
    }

    #[test]
    fn test_blob_filter_validate() {
        assert!(BlobFilter::permissive().validate().is_ok());
        assert!(BlobFilter{min_area: 5, max_area: 4, min_circularity: 0.4}
                .validate().is_err());
        assert!(BlobFilter{min_area: 1, max_area: 4, min_circularity: 1.5}
                .validate().is_err());
        assert!(BlobFilter{min_area: 1, max_area: 4, min_circularity: f64::NAN}
                .validate().is_err());
    }
}  // mod tests.
