//! Screen-based fallback: watch the screen for the portal's start buttons and
//! click through them with synthetic input, no DOM access at all.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use image::GrayImage;
use mpl_autopilot::vision;
use rustautogui::RustAutoGui;
use v_utils::{elog, log};

#[derive(Debug, Parser)]
#[command(name = "screen_watch")]
#[command(about = "Clicks lesson start buttons found by on-screen image search", long_about = None)]
struct Args {
	/// Reference image of the in-lesson start button
	#[arg(long, default_value = "click.png")]
	click_template: PathBuf,

	/// Reference image of the start-of-test button
	#[arg(long, default_value = "to_test.png")]
	test_template: PathBuf,

	/// Polling interval in milliseconds
	#[arg(long, default_value_t = 500)]
	interval_ms: u64,

	/// Minimum correlation for a hit
	#[arg(long, default_value_t = vision::MATCH_THRESHOLD)]
	threshold: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
	let args = Args::parse();

	let click_template = Arc::new(load_template(&args.click_template)?);
	let test_template = Arc::new(load_template(&args.test_template)?);
	log!("Watching the screen every {}ms. Press Ctrl+C to stop.", args.interval_ms);

	let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));
	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				log!("Stopped.");
				break;
			}
			_ = ticker.tick() => {
				let click = click_template.clone();
				let test = test_template.clone();
				let threshold = args.threshold;
				// capture + search + input are all blocking
				match tokio::task::spawn_blocking(move || watch_tick(&click, &test, threshold)).await {
					Ok(Ok(())) => {}
					Ok(Err(e)) => elog!("Tick failed: {}", e),
					Err(e) => elog!("Tick panicked: {}", e),
				}
			}
		}
	}
	Ok(())
}

fn load_template(path: &std::path::Path) -> Result<GrayImage> {
	let img = image::open(path).map_err(|e| eyre!("Failed to load template {}: {}", path.display(), e))?;
	Ok(img.into_luma8())
}

/// One poll: capture the screen once, search both templates against it
fn watch_tick(click_template: &GrayImage, test_template: &GrayImage, threshold: f32) -> Result<()> {
	let screen = capture_primary()?;

	if let Some(m) = vision::locate(&screen, click_template, threshold) {
		let (x, y) = m.center();
		log!("Start button at ({}, {}) (score {:.3}, scale {:.1})", x, y, m.score, m.scale);
		click_and_confirm(x, y, false)?;
	}

	if let Some(m) = vision::locate(&screen, test_template, threshold) {
		let (x, y) = m.center();
		log!("Test button at ({}, {}) (score {:.3}, scale {:.1})", x, y, m.score, m.scale);
		click_and_confirm(x, y, true)?;
	}

	Ok(())
}

/// Grab the primary monitor as grayscale
fn capture_primary() -> Result<GrayImage> {
	let monitors = xcap::Monitor::all().map_err(|e| eyre!("Failed to enumerate monitors: {}", e))?;
	let monitor = monitors.iter().find(|m| m.is_primary()).or_else(|| monitors.first()).ok_or_else(|| eyre!("No monitor found"))?;
	let shot = monitor.capture_image().map_err(|e| eyre!("Failed to capture screen: {}", e))?;
	Ok(image::DynamicImage::ImageRgba8(shot).into_luma8())
}

/// Click the matched spot, then send the portal's fixed confirmation keys:
/// Tab then Space, plus Enter for the start-of-test dialog.
fn click_and_confirm(x: u32, y: u32, press_enter: bool) -> Result<()> {
	let mut gui = RustAutoGui::new(false).map_err(|e| eyre!("Failed to initialize input driver: {}", e))?;
	gui.move_mouse_to_pos(x, y, 0.0).map_err(|e| eyre!("Failed to move mouse: {}", e))?;
	gui.left_click().map_err(|e| eyre!("Failed to click: {}", e))?;
	std::thread::sleep(Duration::from_millis(300));
	gui.keyboard_command("tab").map_err(|e| eyre!("Failed to press tab: {}", e))?;
	std::thread::sleep(Duration::from_millis(100));
	gui.keyboard_command("space").map_err(|e| eyre!("Failed to press space: {}", e))?;
	if press_enter {
		std::thread::sleep(Duration::from_millis(100));
		gui.keyboard_command("return").map_err(|e| eyre!("Failed to press enter: {}", e))?;
	}
	Ok(())
}
