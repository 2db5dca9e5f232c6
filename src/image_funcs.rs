// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use log::debug;

use crate::bounding_box::Rectangle;

/// Mask value for "on" pixels produced by [threshold_field()]. Consumers treat
/// any non-zero value as on.
pub const MASK_ON: u8 = 255;

/// Splits a colour gel scan into its two fields of interest: the red channel,
/// whose peaks correspond to the stained bands, and the blue channel, which is
/// bright over the gel body and dark over the surrounding background.
pub fn split_channels(image: &RgbImage) -> (/*red*/GrayImage, /*blue*/GrayImage) {
    let (width, height) = image.dimensions();
    let red = GrayImage::from_fn(width, height,
                                 |x, y| Luma([image.get_pixel(x, y).0[0]]));
    let blue = GrayImage::from_fn(width, height,
                                  |x, y| Luma([image.get_pixel(x, y).0[2]]));
    (red, blue)
}

/// Resizes `image` to `new_height` rows, preserving the aspect ratio. Scans
/// are downscaled before processing to bound the cost of blob extraction.
pub fn downscale_to_height(image: &RgbImage, new_height: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if height == 0 || width == 0 || new_height == 0 {
        return image.clone();
    }
    let aspect_ratio = width as f64 / height as f64;
    let new_width = u32::max((new_height as f64 * aspect_ratio) as u32, 1);
    debug!("Resizing {}x{} to {}x{}", width, height, new_width, new_height);
    imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

/// Converts a field to a binary mask: pixels strictly greater than `cutoff`
/// become [MASK_ON], all others 0.
pub fn threshold_field(field: &GrayImage, cutoff: u8) -> GrayImage {
    let (width, height) = field.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if field.get_pixel(x, y).0[0] > cutoff {
            Luma([MASK_ON])
        } else {
            Luma([0])
        }
    })
}

/// Copies the portion of `field` covered by `bounds`.
pub fn crop_field(field: &GrayImage, bounds: &Rectangle) -> GrayImage {
    imageops::crop_imm(field, bounds.col_min, bounds.row_min,
                       bounds.width(), bounds.height()).to_image()
}

/// Colour counterpart of [crop_field()], used for the annotated output.
pub fn crop_rgb(image: &RgbImage, bounds: &Rectangle) -> RgbImage {
    imageops::crop_imm(image, bounds.col_min, bounds.row_min,
                       bounds.width(), bounds.height()).to_image()
}

// mod tests.
