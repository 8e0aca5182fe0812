//! Page image clean-up before OCR.
//!
//! Steps run in a fixed order: grayscale, median denoise, adaptive
//! threshold, deskew. Every step is optional and panic-isolated: if a step
//! panics (imageproc asserts on degenerate sizes, for instance) it is logged
//! and skipped, and the image from the previous step carries on. The worst
//! case is therefore the grayscale original, never an error.
//!
//! Running [`preprocess`] on its own output is stable: a binarised page stays
//! binary under the median filter and threshold, and a straightened page
//! measures below the minimum skew angle so it is not rotated again.

use crate::config::PreprocessConfig;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Pixel standard deviation below which a page counts as blank.
const UNIFORM_CONTRAST: f32 = 2.0;
/// Skew angles smaller than this are left alone.
const MIN_SKEW_DEGREES: f32 = 0.5;
/// Share of dark pixels needed before skew can be measured.
const MIN_INK_RATIO: f32 = 0.02;
const INK_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessStep {
    Grayscale,
    Denoise,
    Threshold,
    Deskew,
}

impl PreprocessStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessStep::Grayscale => "grayscale",
            PreprocessStep::Denoise => "denoise",
            PreprocessStep::Threshold => "threshold",
            PreprocessStep::Deskew => "deskew",
        }
    }
}

impl fmt::Display for PreprocessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of [`preprocess`].
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: DynamicImage,
    /// Steps that changed the image, in order.
    pub applied: Vec<PreprocessStep>,
    /// Steps that were not applied, with the reason.
    pub skipped: Vec<(PreprocessStep, String)>,
    /// Correction applied by the deskew step, in degrees.
    pub skew_degrees: Option<f32>,
}

impl Preprocessed {
    /// Applied step names, for [`crate::output::PageResult::preprocessing`].
    pub fn applied_names(&self) -> Vec<String> {
        self.applied.iter().map(|s| s.as_str().to_string()).collect()
    }

    /// `step: reason` for each step left out, for
    /// [`crate::output::PageResult::preprocessing_skipped`].
    pub fn skipped_notes(&self) -> Vec<String> {
        self.skipped
            .iter()
            .map(|(step, reason)| format!("{step}: {reason}"))
            .collect()
    }
}

enum StepOutcome {
    Applied(GrayImage),
    NotNeeded(&'static str),
}

/// Clean up a page image for OCR. Never fails.
pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> Preprocessed {
    let mut out = Preprocessed {
        image: image.clone(),
        applied: Vec::new(),
        skipped: Vec::new(),
        skew_degrees: None,
    };

    let gray = match catch_unwind(AssertUnwindSafe(|| image.to_luma8())) {
        Ok(g) => g,
        Err(panic) => {
            let reason = panic_message(panic);
            warn!("Preprocess step 'grayscale' panicked, using original image: {reason}");
            out.skipped.push((PreprocessStep::Grayscale, reason));
            return out;
        }
    };
    out.applied.push(PreprocessStep::Grayscale);

    if !config.enabled {
        out.image = DynamicImage::ImageLuma8(gray);
        return out;
    }

    let mut current = gray;

    if config.denoise {
        let radius = config.median_radius;
        current = run_step(&mut out, PreprocessStep::Denoise, current, |img| {
            if radius == 0 {
                return StepOutcome::NotNeeded("radius 0");
            }
            StepOutcome::Applied(median_filter(img, radius, radius))
        });
    }

    if config.threshold {
        let block_radius = config.threshold_block_radius;
        current = run_step(&mut out, PreprocessStep::Threshold, current, |img| {
            if contrast_score(img) < UNIFORM_CONTRAST {
                return StepOutcome::NotNeeded("uniform page");
            }
            let radius = if block_radius == 0 {
                auto_block_radius(img)
            } else {
                block_radius
            };
            StepOutcome::Applied(adaptive_threshold(img, radius))
        });
    }

    if config.deskew {
        let max = config.max_skew_degrees;
        let step = config.skew_step_degrees;
        let mut measured = None;
        current = run_step(&mut out, PreprocessStep::Deskew, current, |img| {
            match detect_skew_angle(img, max, step) {
                Some(angle) => {
                    measured = Some(angle);
                    StepOutcome::Applied(rotate_about_center(
                        img,
                        -angle.to_radians(),
                        Interpolation::Bilinear,
                        Luma([255u8]),
                    ))
                }
                None => StepOutcome::NotNeeded("no measurable skew"),
            }
        });
        if out.applied.contains(&PreprocessStep::Deskew) {
            out.skew_degrees = measured;
        }
    }

    out.image = DynamicImage::ImageLuma8(current);
    out
}

fn run_step<F>(
    out: &mut Preprocessed,
    step: PreprocessStep,
    input: GrayImage,
    f: F,
) -> GrayImage
where
    F: FnOnce(&GrayImage) -> StepOutcome,
{
    match catch_unwind(AssertUnwindSafe(|| f(&input))) {
        Ok(StepOutcome::Applied(next)) => {
            debug!("Preprocess step '{step}' applied");
            out.applied.push(step);
            next
        }
        Ok(StepOutcome::NotNeeded(reason)) => {
            debug!("Preprocess step '{step}' skipped: {reason}");
            out.skipped.push((step, reason.to_string()));
            input
        }
        Err(panic) => {
            let reason = panic_message(panic);
            warn!("Preprocess step '{step}' panicked, skipping: {reason}");
            out.skipped.push((step, format!("panicked: {reason}")));
            input
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Threshold window radius scaled to the page: about 1/40 of the short edge.
fn auto_block_radius(img: &GrayImage) -> u32 {
    (img.width().min(img.height()) / 40).clamp(5, 60)
}

/// RMS contrast: standard deviation of pixel intensities (0 for a blank page).
pub fn contrast_score(img: &GrayImage) -> f32 {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let val = pixel.0[0] as f64;
        sum += val;
        sum_sq += val * val;
        count += 1;
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0).sqrt() as f32
}

/// Estimate the text-line angle in degrees via the projection profile.
///
/// Dark pixels are projected onto the vertical axis of a frame rotated by
/// each candidate angle; the angle whose row histogram has the sharpest
/// transitions (largest sum of squared neighbour differences) is the skew.
/// Positive means lines fall to the right.
///
/// Returns `None` for small or nearly empty images, and for angles under
/// half a degree.
pub fn detect_skew_angle(img: &GrayImage, max_degrees: f32, step_degrees: f32) -> Option<f32> {
    let (w, h) = (img.width(), img.height());
    if w < 50 || h < 50 || max_degrees <= 0.0 || step_degrees <= 0.0 {
        return None;
    }

    // Every row, every other column: row subsampling would alias the profile.
    let ink: Vec<(f32, f32)> = (0..h)
        .flat_map(|y| (0..w).step_by(2).map(move |x| (x, y)))
        .filter(|&(x, y)| img.get_pixel(x, y).0[0] < INK_THRESHOLD)
        .map(|(x, y)| (x as f32, y as f32))
        .collect();
    let sampled = (w as usize).div_ceil(2) * h as usize;
    if (ink.len() as f32 / sampled as f32) < MIN_INK_RATIO {
        return None;
    }

    let diag = ((w as f32).hypot(h as f32)).ceil() as usize;
    let offset = diag as f32;
    let mut bins = vec![0u32; 2 * diag + 1];

    let mut best_angle = 0.0f32;
    let mut best_score = f64::NEG_INFINITY;
    let steps = (2.0 * max_degrees / step_degrees).round() as i32;

    for i in 0..=steps {
        let angle = -max_degrees + i as f32 * step_degrees;
        let (sin, cos) = angle.to_radians().sin_cos();
        bins.iter_mut().for_each(|b| *b = 0);
        for &(x, y) in &ink {
            let row = (y * cos - x * sin + offset).round();
            if row >= 0.0 && (row as usize) < bins.len() {
                bins[row as usize] += 1;
            }
        }
        let score: f64 = bins
            .windows(2)
            .map(|pair| {
                let d = pair[1] as f64 - pair[0] as f64;
                d * d
            })
            .sum();
        // Ties go to the smallest absolute angle.
        if score > best_score || (score == best_score && angle.abs() < best_angle.abs()) {
            best_score = score;
            best_angle = angle;
        }
    }

    if best_angle.abs() < MIN_SKEW_DEGREES {
        None
    } else {
        Some(best_angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// White page with horizontal black bars standing in for text lines.
    fn lined_page(w: u32, h: u32, slope: f32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([255]));
        for line in 0..8u32 {
            let y0 = 40 + line * 40;
            for x in 20..w - 20 {
                let y = y0 as f32 + x as f32 * slope;
                for dy in 0..8 {
                    let yy = y as i64 + dy;
                    if yy >= 0 && (yy as u32) < h {
                        img.put_pixel(x, yy as u32, Luma([0]));
                    }
                }
            }
        }
        img
    }

    #[test]
    fn blank_page_survives_every_step() {
        let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([255, 255, 255])));
        let out = preprocess(&blank, &PreprocessConfig::default());
        let gray = out.image.to_luma8();
        assert!(gray.pixels().all(|p| p.0[0] == 255), "blank page must stay white");
        assert!(out.applied.contains(&PreprocessStep::Grayscale));
        assert!(!out.applied.contains(&PreprocessStep::Threshold));
        assert!(out.skew_degrees.is_none());
    }

    #[test]
    fn disabled_only_converts_to_grayscale() {
        let cfg = PreprocessConfig {
            enabled: false,
            ..PreprocessConfig::default()
        };
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([10, 200, 30])));
        let out = preprocess(&img, &cfg);
        assert_eq!(out.applied, vec![PreprocessStep::Grayscale]);
        assert!(matches!(out.image, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn panicking_step_is_skipped() {
        let mut out = Preprocessed {
            image: DynamicImage::new_luma8(1, 1),
            applied: vec![],
            skipped: vec![],
            skew_degrees: None,
        };
        let input = GrayImage::from_pixel(3, 3, Luma([7]));
        let result = run_step(&mut out, PreprocessStep::Threshold, input.clone(), |_| {
            panic!("boom")
        });
        assert_eq!(result, input);
        assert_eq!(out.skipped.len(), 1);
        assert!(out.skipped[0].1.contains("boom"));
    }

    #[test]
    fn straight_lines_have_no_skew() {
        let page = lined_page(400, 400, 0.0);
        assert_eq!(detect_skew_angle(&page, 5.0, 0.25), None);
    }

    #[test]
    fn sloped_lines_are_measured() {
        // tan(3°) ≈ 0.0524
        let page = lined_page(400, 400, 0.0524);
        let angle = detect_skew_angle(&page, 5.0, 0.25).expect("skew detected");
        assert!((angle - 3.0).abs() <= 0.5, "got {angle}");
    }

    #[test]
    fn deskew_straightens_a_tilted_page() {
        let page = DynamicImage::ImageLuma8(lined_page(400, 400, 0.0524));
        let out = preprocess(&page, &PreprocessConfig::default());
        assert!(out.applied.contains(&PreprocessStep::Deskew));
        let corrected = out.skew_degrees.expect("correction recorded");
        assert!((corrected - 3.0).abs() <= 0.5, "got {corrected}");

        let residual = detect_skew_angle(&out.image.to_luma8(), 10.0, 0.25);
        assert!(
            residual.map_or(true, |a| a.abs() <= 0.5),
            "page still tilted by {residual:?}"
        );
    }

    #[test]
    fn skipped_steps_carry_reasons() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        let notes = preprocess(&blank, &PreprocessConfig::default()).skipped_notes();
        assert!(notes.iter().any(|n| n == "threshold: uniform page"), "{notes:?}");
    }

    #[test]
    fn preprocess_is_stable_when_repeated() {
        let page = DynamicImage::ImageLuma8(lined_page(300, 400, 0.0));
        let cfg = PreprocessConfig::default();
        let once = preprocess(&page, &cfg);
        let twice = preprocess(&once.image, &cfg);
        let a = once.image.to_luma8();
        let b = twice.image.to_luma8();
        let differing = a
            .pixels()
            .zip(b.pixels())
            .filter(|(p, q)| p.0[0] != q.0[0])
            .count();
        assert!(
            (differing as f32) < 0.01 * (a.width() * a.height()) as f32,
            "{differing} pixels changed on the second pass"
        );
    }

    #[test]
    fn contrast_of_blank_is_zero() {
        let img = GrayImage::from_pixel(20, 20, Luma([200]));
        assert_eq!(contrast_score(&img), 0.0);
    }
}
