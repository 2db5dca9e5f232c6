// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::GrayImage;

#[derive(Debug)]
pub struct HistogramStats {
    pub count: u64,
    pub mean: f64,
    pub median: usize,
    pub stddev: f64,
}

pub fn stats_for_histogram(histogram: &[u32]) -> HistogramStats {
    // Moments are accumulated in u64; a full-resolution gel scan can exceed
    // u32 range for the first moment.
    let mut count: u64 = 0;
    let mut first_moment: u64 = 0;
    for (h, &bin_count) in histogram.iter().enumerate() {
        count += bin_count as u64;
        first_moment += bin_count as u64 * h as u64;
    }
    if count == 0 {
        return HistogramStats{count: 0, mean: 0.0, median: 0, stddev: 0.0};
    }
    let mean = first_moment as f64 / count as f64;
    let mut second_moment: f64 = 0.0;
    let mut sub_count: u64 = 0;
    let mut median = 0;
    let half = (count + 1) / 2;
    for (h, &bin_count) in histogram.iter().enumerate() {
        second_moment += bin_count as f64 * (h as f64 - mean) * (h as f64 - mean);
        if sub_count < half {
            sub_count += bin_count as u64;
            if sub_count >= half {
                median = h;
            }
        }
    }
    let stddev = (second_moment / count as f64).sqrt();
    HistogramStats{count, mean, median, stddev}
}

/// Histogram of `values` restricted to the positions where `selector` is
/// strictly greater than `cutoff`. The two images must have the same
/// dimensions.
pub fn histogram_where_above(values: &GrayImage, selector: &GrayImage, cutoff: u8)
                             -> [u32; 256] {
    debug_assert_eq!(values.dimensions(), selector.dimensions());
    let mut histogram = [0_u32; 256];
    for (value, select) in values.as_raw().iter().zip(selector.as_raw().iter()) {
        if *select > cutoff {
            histogram[*value as usize] += 1;
        }
    }
    histogram
}

#[cfg(test)]
mod tests {
    use imageproc::gray_image;
    use crate::histogram_funcs::{histogram_where_above, stats_for_histogram};

    #[test]
    fn test_stats_for_histogram() {
        let mut histogram = [0_u32; 256];
        histogram[10] = 2;
        histogram[20] = 2;
        let stats = stats_for_histogram(&histogram);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 15.0);
        assert_eq!(stats.median, 10);
        assert_eq!(stats.stddev, 5.0);
    }

    #[test]
    fn test_stats_for_empty_histogram() {
        let stats = stats_for_histogram(&[0_u32; 256]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn test_stats_for_single_sample() {
        let mut histogram = [0_u32; 256];
        histogram[42] = 1;
        let stats = stats_for_histogram(&histogram);
        assert_eq!(stats.median, 42);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn test_histogram_where_above() {
        let values = gray_image!(
            10, 20, 30;
            40, 50, 60);
        let selector = gray_image!(
            101, 100, 255;
              0, 200,  99);
        let histogram = histogram_where_above(&values, &selector, 100);
        // Only the 101, 255 and 200 positions qualify; 100 is not strictly
        // above the cutoff.
        assert_eq!(histogram[10], 1);
        assert_eq!(histogram[30], 1);
        assert_eq!(histogram[50], 1);
        assert_eq!(histogram.iter().sum::<u32>(), 3);
    }
}  // mod tests.
