// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use env_logger;
use image::{ImageReader, Rgb};
use imageproc::drawing;
use log::info;

use gel_scan::algorithm::{scan_gel, GelScan, ScanConfig};
use gel_scan::image_funcs::{crop_rgb, downscale_to_height};
use gel_scan::luminance_funcs::{CentroidSampling, LuminanceMode};

/// Finds the bands in a gel scan and reports their luminance.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Path of the gel scan to process.
    #[arg(short, long)]
    input: String,

    /// Path of the annotated output image.
    #[arg(short, long)]
    output: String,

    /// Red channel cutoff for band pixels.
    #[arg(short, long, default_value_t = 100)]
    threshold: u8,

    /// Smallest band area in pixels. Default scales with image size.
    #[arg(long)]
    min_area: Option<usize>,

    /// Largest band area in pixels. Default scales with image size.
    #[arg(long)]
    max_area: Option<usize>,

    /// Smallest acceptable band circularity, within [0, 1].
    #[arg(short, long, default_value_t = 0.4)]
    circularity: f64,

    /// Disable all band filters.
    #[arg(short, long, default_value_t = false)]
    none: std::primitive::bool,

    /// Do not subtract the gel's background glow.
    #[arg(short = 'm', long, default_value_t = false)]
    no_demean: std::primitive::bool,

    /// Report average rather than total band luminance.
    #[arg(short, long, default_value_t = false)]
    avg: std::primitive::bool,

    /// Process the scan at its original size.
    #[arg(short, long, default_value_t = false)]
    keep: std::primitive::bool,

    /// Height scans are resized to unless --keep is given.
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Bounding box search granularity in pixels.
    #[arg(long, default_value_t = 10)]
    step: u32,

    /// Fraction of each band's pixels used for its centroid.
    #[arg(long, default_value_t = 0.1)]
    sample_fraction: f64,

    /// Seed for centroid sampling.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory where intermediate images are written.
    #[arg(short, long)]
    diagnostics: Option<String>,
}

impl Args {
    fn scan_config(&self) -> ScanConfig {
        ScanConfig{
            threshold: self.threshold,
            min_area: self.min_area,
            max_area: self.max_area,
            min_circularity: self.circularity,
            no_filters: self.none,
            mode: if self.avg { LuminanceMode::Average } else { LuminanceMode::Total },
            demean: !self.no_demean,
            step: self.step,
            sampling: CentroidSampling{fraction: self.sample_fraction, seed: self.seed},
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Processing {}", args.input);
    let img = ImageReader::open(&args.input)?.decode()?.into_rgb8();
    let img = if args.keep {
        img
    } else {
        downscale_to_height(&img, args.height)
    };
    let (width, height) = img.dimensions();

    let scan_start = Instant::now();
    let scan = scan_gel(&img, &args.scan_config())?;
    let elapsed = scan_start.elapsed();
    info!("WxH: {}x{}; gel bounds {:?}", width, height, scan.bounds);
    info!("Found {} bands in {:?}", scan.records.len(), elapsed);

    if let Some(dir) = &args.diagnostics {
        write_diagnostics(Path::new(dir), &scan)?;
    }

    // Scribble contours and centroid markers into the gel crop.
    let mut annotated = crop_rgb(&img, &scan.bounds);
    let (crop_width, crop_height) = annotated.dimensions();
    for contour in &scan.extraction.contours {
        for pixel in contour.pixels() {
            if pixel.row >= 0 && pixel.col >= 0 &&
                (pixel.col as u32) < crop_width && (pixel.row as u32) < crop_height
            {
                annotated.put_pixel(pixel.col as u32, pixel.row as u32,
                                    Rgb::<u8>([255, 0, 0]));
            }
        }
    }
    let mut records_str = String::new();
    records_str.push_str("# (x, y, luminance)\n");
    for record in &scan.records {
        drawing::draw_hollow_circle_mut(
            &mut annotated,
            (record.centroid.x.round() as i32, record.centroid.y.round() as i32),
            3,
            Rgb::<u8>([0, 255, 0]));
        records_str.push_str(format!(
            "({:.1}, {:.1}, {:.3}),\n",
            record.centroid.x, record.centroid.y, record.luminance).as_str());
    }
    info!("{}", records_str);
    annotated.save(&args.output)?;
    Ok(())
}

fn write_diagnostics(dir: &Path, scan: &GelScan)
                     -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let outputs = [("red.png", &scan.red),
                   ("blue.png", &scan.blue),
                   ("gel_binary.png", &scan.gel_mask),
                   ("newred.png", &scan.band_field),
                   ("blob_binary.png", &scan.band_mask)];
    for (name, field) in outputs {
        let mut path = PathBuf::from(dir);
        path.push(name);
        field.save(&path)?;
    }
    info!("Wrote diagnostic images to {:?}", dir);
    Ok(())
}
