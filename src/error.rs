// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use thiserror::Error;

/// Failures surfaced by the gel scanning pipeline. Degenerate inputs (an
/// all-off mask, an empty image) are not errors; they yield empty results.
#[derive(Error, Debug, PartialEq)]
pub enum GelScanError {
    /// Filter bounds or search parameters that cannot produce a meaningful
    /// scan. Raised before any pipeline stage runs.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The luminance that sets the normalization baseline must be positive,
    /// otherwise its order of magnitude is undefined.
    #[error("blob #{blob_index} has non-positive luminance {luminance}; cannot establish normalization baseline")]
    NonPositiveLuminance {
        blob_index: usize,
        luminance: f64,
    },

    #[error("background field is {background:?} (WxH) but primary field is {primary:?}")]
    FieldShapeMismatch {
        primary: (u32, u32),
        background: (u32, u32),
    },
}

pub type Result<T> = std::result::Result<T, GelScanError>;
