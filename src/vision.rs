//! Multi-scale template search over screen captures.
//!
//! Scores are zero-mean normalized cross-correlation (the correlation
//! coefficient of template and window, in [-1, 1]), swept over a fixed scale
//! range. Everything here works on in-memory grayscale images, so the search
//! itself needs no display.

use image::{GrayImage, imageops};

/// Correlation below this is no match
pub const MATCH_THRESHOLD: f32 = 0.8;
/// Smallest template scale tried
pub const MIN_SCALE: f32 = 0.5;
/// Scale step of the sweep
pub const SCALE_STEP: f32 = 0.1;
/// Number of scales tried: 0.5, 0.6, .. 1.4
pub const SCALE_STEPS: u32 = 10;

/// Best placement of a template within a larger image
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match {
	/// Top-left corner in image coordinates
	pub x: u32,
	pub y: u32,
	/// Matched size (template size after scaling)
	pub width: u32,
	pub height: u32,
	/// Correlation coefficient at this placement
	pub score: f32,
	/// Template scale that produced this placement
	pub scale: f32,
}

impl Match {
	/// Center point of the matched rectangle, the spot to click
	pub fn center(&self) -> (u32, u32) {
		(self.x + self.width / 2, self.y + self.height / 2)
	}
}

/// Sweep the scale range and keep the globally best correlation peak.
/// Returns None when no scaled template fits inside the image at all.
pub fn best_match(screen: &GrayImage, template: &GrayImage) -> Option<Match> {
	let (tw, th) = template.dimensions();
	if tw == 0 || th == 0 {
		return None;
	}
	let mut best: Option<Match> = None;
	for step in 0..SCALE_STEPS {
		let scale = MIN_SCALE + step as f32 * SCALE_STEP;
		let width = (tw as f32 * scale).round().max(1.0) as u32;
		let height = (th as f32 * scale).round().max(1.0) as u32;
		if width > screen.width() || height > screen.height() {
			continue;
		}
		let resized = imageops::resize(template, width, height, imageops::FilterType::Triangle);
		let Some((x, y, score)) = best_correlation(screen, &resized) else { continue };
		if best.as_ref().is_none_or(|b| score > b.score) {
			best = Some(Match { x, y, width, height, score, scale });
		}
	}
	best
}

/// Best match at or above the correlation threshold
pub fn locate(screen: &GrayImage, template: &GrayImage, threshold: f32) -> Option<Match> {
	best_match(screen, template).filter(|m| m.score >= threshold)
}

/// Exhaustive single-scale search: correlation coefficient of the template
/// against every placement, highest wins. Flat templates and flat windows
/// carry no signal and are skipped.
fn best_correlation(screen: &GrayImage, template: &GrayImage) -> Option<(u32, u32, f32)> {
	let (sw, sh) = screen.dimensions();
	let (tw, th) = template.dimensions();
	if tw > sw || th > sh {
		return None;
	}

	let n = (tw as u64 * th as u64) as f64;
	let t_raw = template.as_raw();
	let t_mean = t_raw.iter().map(|&p| p as f64).sum::<f64>() / n;
	let t_dev: Vec<f64> = t_raw.iter().map(|&p| p as f64 - t_mean).collect();
	let t_norm = t_dev.iter().map(|d| d * d).sum::<f64>().sqrt();
	if t_norm == 0.0 {
		return None;
	}

	let s_raw = screen.as_raw();
	let mut best: Option<(u32, u32, f32)> = None;
	for oy in 0..=(sh - th) {
		for ox in 0..=(sw - tw) {
			// One pass per window: with a zero-mean template, the window mean
			// drops out of the cross term, leaving plain running sums.
			let mut sum_w = 0.0f64;
			let mut sum_w2 = 0.0f64;
			let mut cross = 0.0f64;
			for y in 0..th {
				let row_start = ((oy + y) * sw + ox) as usize;
				let row = &s_raw[row_start..row_start + tw as usize];
				let t_row = &t_dev[(y * tw) as usize..((y + 1) * tw) as usize];
				for (t, &p) in t_row.iter().zip(row.iter()) {
					let w = p as f64;
					sum_w += w;
					sum_w2 += w * w;
					cross += t * w;
				}
			}
			let w_var = sum_w2 - sum_w * sum_w / n;
			if w_var <= 0.0 {
				continue;
			}
			let score = (cross / (t_norm * w_var.sqrt())) as f32;
			if best.is_none_or(|(_, _, s)| score > s) {
				best = Some((ox, oy, score));
			}
		}
	}
	best
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Deterministic, non-repeating texture: every window is distinctive
	fn textured(width: u32, height: u32) -> GrayImage {
		GrayImage::from_fn(width, height, |x, y| image::Luma([((x * 37 + y * 61) ^ x.wrapping_mul(y)) as u8]))
	}

	/// A gradient background with two solid blobs: unambiguous under both
	/// translation and rescaling, and resample-friendly
	fn blobbed(width: u32, height: u32) -> GrayImage {
		GrayImage::from_fn(width, height, |x, y| {
			if (34..38).contains(&x) && (24..28).contains(&y) {
				image::Luma([255])
			} else if (40..46).contains(&x) && (30..34).contains(&y) {
				image::Luma([0])
			} else {
				image::Luma([(x * 3) as u8])
			}
		})
	}

	fn crop(img: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
		imageops::crop_imm(img, x, y, w, h).to_image()
	}

	#[test]
	fn exact_crop_is_found_at_full_score() {
		let screen = textured(120, 90);
		let template = crop(&screen, 30, 40, 20, 20);

		let m = best_match(&screen, &template).unwrap();
		assert_eq!((m.x, m.y), (30, 40));
		assert!(m.score > 0.999, "score was {}", m.score);
		assert!((m.scale - 1.0).abs() < 1e-6);
		assert_eq!(m.center(), (40, 50));
	}

	#[test]
	fn no_match_below_threshold() {
		let screen = textured(120, 90);
		// anti-correlated everywhere: the inverted crop
		let base = crop(&screen, 30, 40, 20, 20);
		let inverted = GrayImage::from_fn(20, 20, |x, y| image::Luma([255 - base.get_pixel(x, y)[0]]));

		let m = best_match(&screen, &inverted).unwrap();
		assert!(m.score < MATCH_THRESHOLD, "score was {}", m.score);
		assert!(locate(&screen, &inverted, MATCH_THRESHOLD).is_none());
	}

	#[test]
	fn locate_honors_the_threshold_boundary() {
		let screen = textured(120, 90);
		let template = crop(&screen, 10, 10, 16, 16);

		let best = best_match(&screen, &template).unwrap();
		assert!(locate(&screen, &template, best.score).is_some());
		assert!(locate(&screen, &template, best.score + 0.001).is_none());
	}

	#[test]
	fn scale_sweep_finds_a_resized_template() {
		let screen = blobbed(80, 60);
		// the reference image is twice the on-screen size; the sweep's small steps recover it
		let on_screen = crop(&screen, 30, 20, 20, 20);
		let template = imageops::resize(&on_screen, 40, 40, imageops::FilterType::Triangle);

		let m = best_match(&screen, &template).unwrap();
		assert!(m.scale < 0.65, "scale was {}", m.scale);
		assert!(m.x.abs_diff(30) <= 2 && m.y.abs_diff(20) <= 2, "matched at ({}, {})", m.x, m.y);
		assert!(m.score > 0.85, "score was {}", m.score);
	}

	#[test]
	fn flat_template_matches_nothing() {
		let screen = textured(60, 60);
		let flat = GrayImage::from_pixel(10, 10, image::Luma([128]));
		assert!(best_match(&screen, &flat).is_none());
	}

	#[test]
	fn oversized_template_matches_nothing() {
		let screen = textured(30, 30);
		let template = textured(200, 200);
		// even the smallest scale (0.5) does not fit into a 30x30 screen
		assert!(best_match(&screen, &template).is_none());
	}
}
