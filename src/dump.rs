//! Timestamped HTML snapshots of every open browser window

use std::path::{Path, PathBuf};

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::{elog, log};

use crate::session::{Session, page_title};

/// Dump every open window's DOM into `dir`. A window that fails to serialize
/// is logged and skipped; the rest are still written. Returns the saved paths.
pub async fn dump_all_windows(session: &Session, dir: &Path) -> Result<Vec<PathBuf>> {
	let pages = session.pages().await?;
	let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
	log!("Dumping {} window(s)", pages.len());

	let mut saved = Vec::new();
	for (index, page) in pages.iter().enumerate() {
		match dump_window(page, dir, &timestamp, index).await {
			Ok(path) => {
				log!("Saved {}", path.display());
				saved.push(path);
			}
			Err(e) => elog!("Failed to dump window {}: {}", index, e),
		}
	}
	Ok(saved)
}

async fn dump_window(page: &Page, dir: &Path, timestamp: &str, index: usize) -> Result<PathBuf> {
	let title = page_title(page).await.unwrap_or_default();
	let label = sanitize_title(&title, index);

	let html = page.evaluate("document.documentElement.outerHTML").await.map_err(|e| eyre!("Failed to get page HTML: {}", e))?;
	let html_str = html.value().and_then(|v| v.as_str()).unwrap_or("<html></html>");

	let filepath = dir.join(format!("dump_{timestamp}_{index}_{label}.html"));
	tokio::fs::write(&filepath, html_str).await.map_err(|e| eyre!("Failed to write {}: {}", filepath.display(), e))?;
	Ok(filepath)
}

/// Filesystem-safe window label: keep alphanumerics and `._- `, replace the
/// rest with `_`, cap at 30 chars. Titleless windows fall back to their index.
pub fn sanitize_title(title: &str, index: usize) -> String {
	let safe: String = title.chars().map(|c| if c.is_alphanumeric() || "._- ".contains(c) { c } else { '_' }).take(30).collect();
	if safe.trim().is_empty() { format!("window_{index}") } else { safe }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitize_keeps_word_characters() {
		assert_eq!(sanitize_title("Lesson 3 - intro.html", 0), "Lesson 3 - intro.html");
		// unicode letters count as alphanumeric, same as the portal titles
		assert_eq!(sanitize_title("確認テスト", 0), "確認テスト");
	}

	#[test]
	fn sanitize_replaces_separators() {
		assert_eq!(sanitize_title("a/b:c?d", 0), "a_b_c_d");
	}

	#[test]
	fn sanitize_truncates_to_thirty_chars() {
		let long = "x".repeat(50);
		assert_eq!(sanitize_title(&long, 0).chars().count(), 30);
	}

	#[test]
	fn empty_title_falls_back_to_index() {
		assert_eq!(sanitize_title("", 2), "window_2");
		assert_eq!(sanitize_title("   ", 7), "window_7");
	}
}
