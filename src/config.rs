use std::path::Path;

use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;
use v_utils::log;

/// Runtime settings. Loaded from an optional TOML file; CLI flags override on top.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	/// Portal login page opened at startup
	#[serde(default = "default_login_url")]
	pub login_url: String,
	/// Dashboard page continuous mode navigates to between lessons
	#[serde(default = "default_dashboard_url")]
	pub dashboard_url: String,
	/// Polling cadence of the monitor loop in milliseconds (default: 1000)
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Trigger playback right after advancing to a new lesson (default: true)
	#[serde(default = "default_auto_play_on_advance")]
	pub auto_play_on_advance: bool,
	/// Command to run when continuous mode finishes or aborts (receives message as argument)
	#[serde(default)]
	pub stop_hook: Option<String>,
	/// Number of retries for browser button clicks (default: 3)
	#[serde(default = "default_button_click_retries")]
	pub button_click_retries: u32,
	/// Run with visible browser window (default: true; login is manual)
	#[serde(default = "default_visible")]
	pub visible: bool,
}

fn default_login_url() -> String {
	"https://www.mp-learning.com/Login.aspx".to_string()
}

fn default_dashboard_url() -> String {
	"https://www.mp-learning.com/StudyCenter.aspx".to_string()
}

fn default_poll_interval_ms() -> u64 {
	1000
}

fn default_auto_play_on_advance() -> bool {
	true
}

fn default_button_click_retries() -> u32 {
	3
}

fn default_visible() -> bool {
	true
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			login_url: default_login_url(),
			dashboard_url: default_dashboard_url(),
			poll_interval_ms: default_poll_interval_ms(),
			auto_play_on_advance: default_auto_play_on_advance(),
			stop_hook: None,
			button_click_retries: default_button_click_retries(),
			visible: default_visible(),
		}
	}
}

impl AppConfig {
	/// Read settings from a TOML file; absent path means all defaults
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let Some(path) = path else {
			return Ok(Self::default());
		};
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read config {}: {}", path.display(), e))?;
		toml::from_str(&raw).map_err(|e| eyre!("Failed to parse config {}: {}", path.display(), e))
	}

	/// Run the stop hook with a message if configured
	pub fn fire_stop_hook(&self, message: &str) {
		if let Some(ref hook) = self.stop_hook {
			log!("Running stop hook: {} {:?}", hook, message);
			// Escape single quotes for shell: replace ' with '\''
			let escaped = message.replace('\'', "'\\''");
			let _ = tokio::process::Command::new("sh").arg("-c").arg(format!("{} '{}'", hook, escaped)).spawn();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_site_constants() {
		let config = AppConfig::default();
		assert_eq!(config.login_url, "https://www.mp-learning.com/Login.aspx");
		assert_eq!(config.poll_interval_ms, 1000);
		assert!(config.auto_play_on_advance);
		assert!(config.visible);
		assert!(config.stop_hook.is_none());
	}

	#[test]
	fn partial_toml_fills_in_defaults() {
		let config: AppConfig = toml::from_str(
			r#"
			poll_interval_ms = 250
			stop_hook = "notify-send done"
		"#,
		)
		.unwrap();
		assert_eq!(config.poll_interval_ms, 250);
		assert_eq!(config.stop_hook.as_deref(), Some("notify-send done"));
		assert_eq!(config.dashboard_url, "https://www.mp-learning.com/StudyCenter.aspx");
		assert_eq!(config.button_click_retries, 3);
	}
}
