//! Lesson queue and continuous mode

use std::sync::{
	Arc, Mutex,
	atomic::{AtomicBool, Ordering},
};

use chromiumoxide::Page;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use v_utils::{elog, log};

use crate::{
	PageState,
	config::AppConfig,
	monitor::{self, SharedStatus, TickOutcome, set_status},
	player,
	session::Session,
};

/// Consecutive windowless ticks after which a started lesson counts as finished
const WINDOW_GONE_TICKS: u32 = 5;
/// Ticks to wait for a launched lesson's window before giving up on it
const WINDOW_WAIT_TICKS: u32 = 30;

/// FIFO queue of lesson identifiers. Uniqueness is advisory: enqueue refuses
/// an identifier that is already waiting.
#[derive(Clone, Debug, Default)]
pub struct LessonQueue {
	items: Vec<String>,
}

impl LessonQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append an identifier. Returns false (and leaves the queue unchanged)
	/// when it is already queued.
	pub fn enqueue(&mut self, id: impl Into<String>) -> bool {
		let id = id.into();
		if self.items.contains(&id) {
			return false;
		}
		self.items.push(id);
		true
	}

	/// Remove the entry at `index`, preserving the order of the rest
	pub fn remove(&mut self, index: usize) -> Option<String> {
		if index < self.items.len() { Some(self.items.remove(index)) } else { None }
	}

	/// Take the next identifier in FIFO order
	pub fn pop_front(&mut self) -> Option<String> {
		if self.items.is_empty() { None } else { Some(self.items.remove(0)) }
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Queued identifiers in play order
	pub fn items(&self) -> &[String] {
		&self.items
	}
}

/// Lock the shared queue, recovering from a poisoned mutex
pub fn lock_queue(queue: &Arc<Mutex<LessonQueue>>) -> std::sync::MutexGuard<'_, LessonQueue> {
	queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Spawn continuous mode: consume the queue lesson by lesson until it drains
/// or `running` is cleared. Fires the stop hook on completion or abort.
pub fn spawn_continuous(session: Arc<Session>, config: AppConfig, queue: Arc<Mutex<LessonQueue>>, running: Arc<AtomicBool>, status: SharedStatus) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		log!("Continuous mode started ({} lesson(s) queued)", lock_queue(&queue).len());
		match run_continuous(&session, &config, &queue, &running, &status).await {
			Ok(completed) => {
				log!("Continuous mode finished: {} lesson(s) completed", completed);
				config.fire_stop_hook(&format!("Continuous mode finished: {} lesson(s) completed", completed));
			}
			Err(e) => {
				elog!("Continuous mode aborted: {}", e);
				config.fire_stop_hook(&format!("Continuous mode aborted: {}", e));
			}
		}
		running.store(false, Ordering::Relaxed);
		set_status(&status, "stopped");
	})
}

async fn run_continuous(session: &Session, config: &AppConfig, queue: &Arc<Mutex<LessonQueue>>, running: &Arc<AtomicBool>, status: &SharedStatus) -> Result<u32> {
	let mut completed = 0u32;
	while running.load(Ordering::Relaxed) {
		let Some(lesson_id) = lock_queue(queue).pop_front() else {
			break; // queue drained
		};
		let remaining = lock_queue(queue).len();
		log!("==== Lesson {} ({} more queued) ====", lesson_id, remaining);
		set_status(status, format!("advancing to lesson {lesson_id}"));

		if let Err(e) = advance(session, config, &lesson_id).await {
			elog!("Failed to launch lesson {}: {}", lesson_id, e);
			continue; // move on to the next queued lesson
		}

		match play_through(session, config, running, status).await {
			Ok(true) => {
				completed += 1;
				log!("Lesson {} complete", lesson_id);
			}
			Ok(false) => break, // stopped by the user mid-lesson
			Err(e) => elog!("Lesson {} did not finish cleanly: {}", lesson_id, e),
		}
	}
	Ok(completed)
}

/// Navigate the main window to the dashboard and activate the lesson's launch
/// control, then hand playback off to the reactor.
pub async fn advance(session: &Session, config: &AppConfig, lesson_id: &str) -> Result<()> {
	let page = session.main_page();
	page.goto(&config.dashboard_url).await.map_err(|e| eyre!("Failed to open dashboard: {}", e))?;
	page.wait_for_navigation().await.map_err(|e| eyre!("Failed waiting for dashboard: {}", e))?;
	tokio::time::sleep(std::time::Duration::from_secs(2)).await;

	let strategy = activate_lesson(page, lesson_id).await?;
	log!("Lesson {} launched via {}", lesson_id, strategy);
	tokio::time::sleep(std::time::Duration::from_secs(3)).await;

	if config.auto_play_on_advance {
		if let Some(popup) = session.find_lesson_window().await? {
			tokio::time::sleep(std::time::Duration::from_secs(2)).await;
			player::trigger_playback(&popup).await?;
		}
	}
	Ok(())
}

/// Activate the launch control for a lesson on the dashboard. Three fallbacks:
/// direct element-ID lookup, anchor-href pattern search, and the WebForms
/// postback entry point. Returns the strategy that fired.
async fn activate_lesson(page: &Page, lesson_id: &str) -> Result<String> {
	let script = format!(
		r#"
		(function() {{
			const id = "{lesson_id}";
			const direct = document.getElementById('lesson-' + id);
			if (direct) {{
				direct.click();
				return 'direct lookup';
			}}
			const anchors = document.querySelectorAll('a[href*="' + id + '"]');
			for (const a of anchors) {{
				if (a.href.toLowerCase().includes('lessonid=' + id.toLowerCase())) {{
					a.click();
					return 'href search';
				}}
			}}
			if (typeof __doPostBack === 'function') {{
				__doPostBack('lesson', id);
				return 'postback';
			}}
			return 'none';
		}})()
		"#
	);

	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to activate lesson: {}", e))?;
	match result.value().and_then(|v| v.as_str()) {
		None | Some("none") => Err(eyre!("No launch control found for lesson {}", lesson_id)),
		Some(strategy) => Ok(strategy.to_string()),
	}
}

/// Drive the reactor until the lesson's terminal state: the survey is ended,
/// or the lesson window disappears after having been seen. Returns false when
/// stopped by the user instead.
async fn play_through(session: &Session, config: &AppConfig, running: &Arc<AtomicBool>, status: &SharedStatus) -> Result<bool> {
	let mut popup: Option<Page> = None;
	let mut seen_window = false;
	let mut missing = 0u32;
	let mut waited = 0u32;
	loop {
		if !running.load(Ordering::Relaxed) {
			return Ok(false);
		}
		match monitor::tick(session, config, status, &mut popup).await {
			Ok(TickOutcome::Reacted(PageState::Survey)) => return Ok(true),
			Ok(TickOutcome::Reacted(_)) => {
				seen_window = true;
				missing = 0;
			}
			Ok(TickOutcome::NoWindow) =>
				if seen_window {
					missing += 1;
					if missing >= WINDOW_GONE_TICKS {
						// the portal closed the popup itself; that ends the lesson too
						return Ok(true);
					}
				} else {
					waited += 1;
					if waited >= WINDOW_WAIT_TICKS {
						bail!("Lesson window never appeared");
					}
				},
			Err(e) => elog!("Tick failed: {}", e),
		}
		tokio::time::sleep(std::time::Duration::from_millis(config.poll_interval_ms)).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enqueue_rejects_duplicates() {
		let mut queue = LessonQueue::new();
		assert!(queue.enqueue("A101"));
		assert!(queue.enqueue("A102"));
		assert!(!queue.enqueue("A101"));
		assert_eq!(queue.len(), 2);
		assert_eq!(queue.items(), ["A101", "A102"]);
	}

	#[test]
	fn remove_preserves_order_of_the_rest() {
		let mut queue = LessonQueue::new();
		for id in ["A101", "A102", "A103", "A104"] {
			assert!(queue.enqueue(id));
		}
		assert_eq!(queue.remove(1), Some("A102".to_string()));
		assert_eq!(queue.items(), ["A101", "A103", "A104"]);
		assert_eq!(queue.remove(10), None);
		assert_eq!(queue.len(), 3);
	}

	#[test]
	fn pop_front_is_fifo() {
		let mut queue = LessonQueue::new();
		queue.enqueue("A101");
		queue.enqueue("A102");
		assert_eq!(queue.pop_front(), Some("A101".to_string()));
		assert_eq!(queue.pop_front(), Some("A102".to_string()));
		assert_eq!(queue.pop_front(), None);
		assert!(queue.is_empty());
	}

	#[test]
	fn removed_id_can_be_requeued() {
		let mut queue = LessonQueue::new();
		queue.enqueue("A101");
		assert_eq!(queue.remove(0), Some("A101".to_string()));
		assert!(queue.enqueue("A101"));
	}
}
