//! Browser session bootstrap and window tracking

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};
use v_utils::log;

use crate::is_lesson_window_title;

/// A live browser session: the browser handle, its CDP event drain, and the
/// main portal window. Popup/lesson windows are re-discovered on demand
/// rather than tracked here, since the portal replaces them on every advance.
pub struct Session {
	browser: Mutex<Browser>,
	event_drain: JoinHandle<()>,
	main_page: Page,
}

impl Session {
	/// Launch Chromium with popup blocking disabled and open the login page.
	/// The user logs in by hand; automation only starts on command.
	pub async fn launch(login_url: &str, visible: bool) -> Result<Self> {
		let mut builder = BrowserConfig::builder().arg("--start-maximized").arg("--disable-popup-blocking");
		if visible {
			builder = builder.with_head();
		}
		let config = builder.build().map_err(|e| eyre!("Failed to build browser config: {}", e))?;

		let (browser, mut handler) = Browser::launch(config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

		// Drain CDP events so the browser doesn't stall on a full channel
		let event_drain = tokio::spawn(async move {
			while let Some(_event) = handler.next().await {}
		});

		let main_page = browser.new_page(login_url).await.map_err(|e| eyre!("Failed to open login page: {}", e))?;
		log!("Opened login page: {}", login_url);

		Ok(Self {
			browser: Mutex::new(browser),
			event_drain,
			main_page,
		})
	}

	/// The main portal window opened at launch
	pub fn main_page(&self) -> &Page {
		&self.main_page
	}

	/// All currently open windows/tabs
	pub async fn pages(&self) -> Result<Vec<Page>> {
		self.browser.lock().await.pages().await.map_err(|e| eyre!("Failed to list browser windows: {}", e))
	}

	/// Number of currently open windows/tabs
	pub async fn window_count(&self) -> Result<usize> {
		Ok(self.pages().await?.len())
	}

	/// Locate the popup window hosting the lesson player, by title.
	/// Windows whose title cannot be read (already closing) are skipped.
	pub async fn find_lesson_window(&self) -> Result<Option<Page>> {
		for page in self.pages().await? {
			let Ok(title) = page_title(&page).await else { continue };
			if is_lesson_window_title(&title) {
				return Ok(Some(page));
			}
		}
		Ok(None)
	}

	/// Close the browser and stop the event drain
	pub async fn close(&self) -> Result<()> {
		self.browser.lock().await.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
		self.event_drain.abort();
		Ok(())
	}
}

/// Read a window's `document.title`
pub async fn page_title(page: &Page) -> Result<String> {
	let result = page.evaluate("document.title").await.map_err(|e| eyre!("Failed to read page title: {}", e))?;
	Ok(result.value().and_then(|v| v.as_str()).unwrap_or_default().to_string())
}

/// Read a window's current URL
pub async fn page_url(page: &Page) -> Result<String> {
	let url = page.url().await.map_err(|e| eyre!("Failed to read page URL: {}", e))?;
	Ok(url.unwrap_or_default())
}
