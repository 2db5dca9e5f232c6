// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Locates the gel within a scan. The input is a binary mask whose "on"
//! pixels are gel and whose "off" pixels are the scanner bed or other
//! background; we look for the axis-aligned rectangle with the greatest mean
//! mask value.
//!
//! The search is greedy coordinate ascent: starting from the full image, each
//! side is in turn pulled inward by `step` pixels if doing so raises the mean.
//! This is not guaranteed to find the global optimum (the result depends on
//! the side order), but it converges in a handful of iterations on real gel
//! scans.

use std::time::Instant;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::rect::Rect;
use log::{debug, info};

/// Axis-aligned region of a field. `row_max` and `col_max` are exclusive, so
/// the region covers rows `row_min..row_max` and columns `col_min..col_max`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rectangle {
    pub row_min: u32,
    pub col_min: u32,
    pub row_max: u32,
    pub col_max: u32,
}

#[derive(Copy, Clone, Debug)]
enum Side {
    Top,
    Left,
    Bottom,
    Right,
}

impl Rectangle {
    /// Rectangle covering an entire `width` x `height` field.
    pub fn full(width: u32, height: u32) -> Rectangle {
        Rectangle{row_min: 0, col_min: 0, row_max: height, col_max: width}
    }

    pub fn width(&self) -> u32 {
        self.col_max.saturating_sub(self.col_min)
    }

    pub fn height(&self) -> u32 {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// The equivalent imageproc rectangle, for drawing. None if empty.
    pub fn to_rect(&self) -> Option<Rect> {
        if self.is_empty() {
            return None;
        }
        Some(Rect::at(self.col_min as i32, self.row_min as i32)
             .of_size(self.width(), self.height()))
    }

    // Moves one side inward by `step`. Returns None if that would leave no
    // pixels.
    fn shrink(&self, side: Side, step: u32) -> Option<Rectangle> {
        let mut shrunk = *self;
        match side {
            Side::Top => shrunk.row_min = self.row_min.checked_add(step)?,
            Side::Left => shrunk.col_min = self.col_min.checked_add(step)?,
            Side::Bottom => shrunk.row_max = self.row_max.checked_sub(step)?,
            Side::Right => shrunk.col_max = self.col_max.checked_sub(step)?,
        }
        if shrunk.row_min >= shrunk.row_max || shrunk.col_min >= shrunk.col_max {
            return None;
        }
        Some(shrunk)
    }
}

type IntegralImage = ImageBuffer<Luma<u64>, Vec<u64>>;

// Mean mask value within `bounds`. Empty regions have no mean; they score
// negative infinity so they are never preferred.
fn mean_within(integral: &IntegralImage, bounds: &Rectangle) -> f64 {
    if bounds.is_empty() {
        return f64::NEG_INFINITY;
    }
    // sum_image_pixels() takes inclusive bounds.
    let sum = sum_image_pixels(integral,
                               bounds.col_min, bounds.row_min,
                               bounds.col_max - 1, bounds.row_max - 1)[0];
    sum as f64 / bounds.area() as f64
}

/// Finds the rectangle of `mask` with the greatest mean value by greedily
/// shrinking the full-extent rectangle.
///
/// # Arguments
///   `mask` - Binary mask; gel pixels are on (non-zero), background off.
///
///   `step` - How many pixels a side moves per attempt. Smaller values give a
///   tighter crop at the cost of more iterations. Typical value: 10.
///
/// # Returns
/// The final rectangle. Its mean is never below the mean of the whole mask;
/// a uniform mask yields the full extent.
pub fn find_largest_bounding_box(mask: &GrayImage, step: u32) -> Rectangle {
    let search_start = Instant::now();
    let (width, height) = mask.dimensions();
    let mut bounds = Rectangle::full(width, height);
    if bounds.is_empty() {
        return bounds;
    }
    let integral: IntegralImage = integral_image(mask);
    let mut bounds_mean = mean_within(&integral, &bounds);
    let mut iterations = 0;
    loop {
        iterations += 1;
        let iteration_start = bounds;
        // Each side is tried against whatever rectangle the previous side
        // left us with.
        for side in [Side::Top, Side::Left, Side::Bottom, Side::Right] {
            let candidate = match bounds.shrink(side, step) {
                Some(candidate) => candidate,
                None => continue,
            };
            let candidate_mean = mean_within(&integral, &candidate);
            if candidate_mean > bounds_mean {
                debug!("Moved {:?} side: {:?} mean {}", side, candidate, candidate_mean);
                bounds = candidate;
                bounds_mean = candidate_mean;
            }
        }
        if bounds == iteration_start {
            break;
        }
    }
    info!("Bounding box {:?} (mean {:.1}) found after {} iterations in {:?}",
          bounds, bounds_mean, iterations, search_start.elapsed());
    bounds
}

// mod tests.
