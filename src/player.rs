//! Playback trigger - three escalating strategies, all best-effort

use chromiumoxide::Page;
use color_eyre::Result;
use v_utils::{elog, log};

use crate::ID_PLAYER;

/// Call the page-level player API: resume only if actually paused
const PLAY_API_JS: &str = r#"
	(function() {
		if (typeof player !== 'undefined' && player && player.accessor) {
			try {
				if (player.accessor.isPaused() === true) {
					player.accessor.play();
					return 'play() called';
				}
				return 'already playing';
			} catch (e) {
				return 'play() error: ' + e.toString();
			}
		}
		return 'player not ready';
	})()
"#;

/// Last resort: drive the video element inside the player iframe directly.
/// Muted playback sidesteps the browser's autoplay policy.
const IFRAME_VIDEO_JS: &str = r#"
	(function() {
		var iframe = document.querySelector('#eqPlayer iframe');
		if (iframe && iframe.contentDocument) {
			var video = iframe.contentDocument.querySelector('video');
			if (video) {
				video.muted = true;
				video.play();
				return 'video.play() called';
			}
		}
		return 'no reachable video';
	})()
"#;

/// Resume or start video playback. Strategies escalate and every one is
/// best-effort: a failure is logged and the next strategy still runs, and no
/// success confirmation is required before handing back to the polling loop.
pub async fn trigger_playback(page: &Page) -> Result<()> {
	// Strategy 1: a native click on the player region, the user gesture the
	// autoplay policy wants to see before a scripted play() is honored.
	match page.find_element(&format!("#{ID_PLAYER}")).await {
		Ok(element) => {
			if let Err(e) = element.click().await {
				elog!("Player region click failed: {}", e);
			}
			tokio::time::sleep(std::time::Duration::from_millis(500)).await;
		}
		Err(_) => log!("No player region on this page"),
	}

	// Strategy 2: the player's own scripting API, retried while it boots
	for attempt in 1..=3u32 {
		match page.evaluate(PLAY_API_JS).await {
			Ok(result) => {
				let outcome = result.value().and_then(|v| v.as_str()).unwrap_or("no result");
				log!("Play API attempt {}: {}", attempt, outcome);
				if outcome.contains("called") || outcome.contains("already playing") {
					return Ok(());
				}
			}
			Err(e) => elog!("Play API attempt {} failed: {}", attempt, e),
		}
		tokio::time::sleep(std::time::Duration::from_millis(500)).await;
	}

	// Strategy 3: cross-origin frames make this throw; that lands in Err and is swallowed
	match page.evaluate(IFRAME_VIDEO_JS).await {
		Ok(result) => log!("Iframe video fallback: {}", result.value().and_then(|v| v.as_str()).unwrap_or("no result")),
		Err(e) => elog!("Iframe video fallback failed (likely cross-origin): {}", e),
	}

	Ok(())
}
