// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Band detection for scanned electrophoresis gels. See [algorithm] for an
//! overview; [algorithm::scan_gel()] runs the whole pipeline.

pub mod algorithm;
pub mod blob_funcs;
pub mod bounding_box;
pub mod error;
pub mod histogram_funcs;
pub mod image_funcs;
pub mod luminance_funcs;

pub use algorithm::{scan_gel, GelScan, ScanConfig};
pub use error::{GelScanError, Result};
