//! The polling loop: probe the lesson window, classify it, react once per tick

use std::sync::{
	Arc, Mutex,
	atomic::{AtomicBool, Ordering},
};

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::{elog, log};

use crate::{ID_EXPLANATION_NEXT, ID_NEXT_STUDY, ID_QUIZ_SUBMIT, ID_SURVEY_END, PageProbe, PageState, config::AppConfig, player, session::Session};

/// Status text shared between the polling task and the command shell
pub type SharedStatus = Arc<Mutex<String>>;

/// Update the shared status line
pub fn set_status(status: &SharedStatus, text: impl Into<String>) {
	*status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = text.into();
}

/// Read the shared status line
pub fn get_status(status: &SharedStatus) -> String {
	status.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
}

/// Outcome of one polling tick
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
	/// No lesson window could be located
	NoWindow,
	/// A state was classified and its reaction performed
	Reacted(PageState),
}

/// Spawn the background monitor loop. Clearing `running` stops it at the next
/// tick boundary; the in-flight tick always finishes its step first.
pub fn spawn(session: Arc<Session>, config: AppConfig, running: Arc<AtomicBool>, status: SharedStatus) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		log!("Monitoring started");
		set_status(&status, "monitoring...");
		let mut popup: Option<Page> = None;
		while running.load(Ordering::Relaxed) {
			// Tick failures never escalate past the tick: log and keep polling
			if let Err(e) = tick(&session, &config, &status, &mut popup).await {
				elog!("Monitor tick failed: {}", e);
			}
			tokio::time::sleep(std::time::Duration::from_millis(config.poll_interval_ms)).await;
		}
		log!("Monitoring stopped");
		set_status(&status, "stopped");
	})
}

/// One iteration of the reactor: re-resolve the lesson window if needed,
/// probe it, classify, perform the single matching reaction.
pub async fn tick(session: &Session, config: &AppConfig, status: &SharedStatus, popup: &mut Option<Page>) -> Result<TickOutcome> {
	if popup.is_none() {
		*popup = session.find_lesson_window().await?;
	}
	let Some(page) = popup.clone() else {
		set_status(status, "searching for the lesson window...");
		return Ok(TickOutcome::NoWindow);
	};

	let probe = match probe_page(&page).await {
		Ok(probe) => probe,
		Err(e) => {
			// The window likely closed mid-poll; drop the handle and re-resolve next tick
			log!("Probe failed ({}), re-resolving lesson window", e);
			*popup = None;
			return Ok(TickOutcome::NoWindow);
		}
	};

	let state = PageState::classify(&probe);
	match &state {
		PageState::NextLesson { label } => react_next_lesson(session, config, status, popup, label.as_deref()).await?,
		PageState::Quiz => react_quiz(&page, config, status).await?,
		PageState::QuizExplanation => react_explanation(&page, config, status).await?,
		PageState::Survey => react_survey(&page, config, status).await?,
		PageState::Paused => {
			log!("Player is paused, resuming");
			set_status(status, "resuming playback...");
			player::trigger_playback(&page).await?;
		}
		PageState::Idle =>
			if probe.player_paused == Some(false) {
				set_status(status, "video playing...");
			} else {
				set_status(status, "waiting for a button...");
			},
	}
	Ok(TickOutcome::Reacted(state))
}

/// Gather a [`PageProbe`] from the live page in a single script evaluation
pub async fn probe_page(page: &Page) -> Result<PageProbe> {
	let script = r#"
		(function() {
			function visible(id) {
				const el = document.getElementById(id);
				return !!(el && el.offsetParent !== null);
			}
			const probe = {
				title: document.title || '',
				next_study_visible: visible('btn-next-study'),
				next_study_label: null,
				quiz_submit_visible: visible('ctl00_examBody_lnkExamAnswerSubmit'),
				explanation_next_visible: visible('ctl00_examBody_cmdNext'),
				survey_end_visible: visible('panel-end-label'),
				player_paused: null
			};
			const link = document.getElementById('btn-next-study-link');
			if (link) probe.next_study_label = link.textContent.trim();
			try {
				if (typeof player !== 'undefined' && player && player.accessor) {
					probe.player_paused = player.accessor.isPaused() === true;
				}
			} catch (e) {}
			return JSON.stringify(probe);
		})()
	"#;

	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to probe page: {}", e))?;
	let json_str = result.value().and_then(|v| v.as_str()).ok_or_else(|| eyre!("Probe script returned nothing"))?;
	serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse probe JSON: {}", e))
}

/// Click the "next lesson" button, then re-find the popup the portal replaces
/// it with and start playback there.
async fn react_next_lesson(session: &Session, config: &AppConfig, status: &SharedStatus, popup: &mut Option<Page>, label: Option<&str>) -> Result<()> {
	let Some(page) = popup.clone() else { return Ok(()) };
	let label = label.unwrap_or("next");
	log!("Button detected: {}", label);
	set_status(status, format!("clicking: {label}"));

	if !click_by_id_with_retry(&page, ID_NEXT_STUDY, config.button_click_retries).await? {
		return Err(eyre!("Next-lesson button vanished before the click"));
	}
	log!("Clicked: {}", label);

	// Page transition; the portal usually swaps the popup window here
	tokio::time::sleep(std::time::Duration::from_secs(3)).await;
	*popup = session.find_lesson_window().await?;

	if let Some(new_page) = popup.as_ref() {
		tokio::time::sleep(std::time::Duration::from_secs(2)).await;
		if config.auto_play_on_advance {
			player::trigger_playback(new_page).await?;
		}
		set_status(status, "playback started");
	}
	Ok(())
}

/// Select the first option of every question group, then submit the answers
async fn react_quiz(page: &Page, config: &AppConfig, status: &SharedStatus) -> Result<()> {
	log!("Quiz page detected, answering");
	set_status(status, "answering quiz...");

	let answered = select_first_options(page).await?;
	log!("Selected the first option of {} question(s)", answered);
	tokio::time::sleep(std::time::Duration::from_secs(1)).await;

	if !click_by_id_with_retry(page, ID_QUIZ_SUBMIT, config.button_click_retries).await? {
		return Err(eyre!("Quiz submit control vanished before the click"));
	}
	log!("Answers submitted");
	set_status(status, "answers submitted");
	tokio::time::sleep(std::time::Duration::from_secs(3)).await;
	Ok(())
}

/// Click "next" on the quiz explanation page
async fn react_explanation(page: &Page, config: &AppConfig, status: &SharedStatus) -> Result<()> {
	log!("Explanation page detected, clicking next");
	set_status(status, "explanation page - next");
	if !click_by_id_with_retry(page, ID_EXPLANATION_NEXT, config.button_click_retries).await? {
		return Err(eyre!("Explanation next control vanished before the click"));
	}
	tokio::time::sleep(std::time::Duration::from_secs(3)).await;
	Ok(())
}

/// Click the end label on the survey page, the last step of a lesson
async fn react_survey(page: &Page, config: &AppConfig, status: &SharedStatus) -> Result<()> {
	log!("Survey page detected, ending");
	set_status(status, "survey page - end");
	if !click_by_id_with_retry(page, ID_SURVEY_END, config.button_click_retries).await? {
		return Err(eyre!("Survey end label vanished before the click"));
	}
	tokio::time::sleep(std::time::Duration::from_secs(2)).await;
	Ok(())
}

/// Check every radio group's first option. Returns the number of groups answered.
async fn select_first_options(page: &Page) -> Result<u64> {
	let script = r#"
		(function() {
			var groups = {};
			var radios = document.querySelectorAll('input[type="radio"]');
			radios.forEach(function(radio) {
				if (!groups[radio.name]) {
					groups[radio.name] = [];
				}
				groups[radio.name].push(radio);
			});
			var count = 0;
			for (var name in groups) {
				if (groups[name].length > 0) {
					groups[name][0].checked = true;
					count++;
				}
			}
			return count;
		})()
	"#;

	let result = page.evaluate(script).await.map_err(|e| eyre!("Failed to select quiz answers: {}", e))?;
	Ok(result.value().and_then(|v| v.as_u64()).unwrap_or(0))
}

/// Click an element by ID using chromiumoxide's native click.
/// Returns Ok(false) if the element is not on the page.
async fn click_by_id(page: &Page, id: &str) -> Result<bool> {
	match page.find_element(&format!("#{id}")).await {
		Ok(element) => {
			element.click().await.map_err(|e| eyre!("Failed to click #{}: {}", id, e))?;
			Ok(true)
		}
		Err(_) => Ok(false),
	}
}

/// Click with retry on transient failures; a missing element is not retried
pub(crate) async fn click_by_id_with_retry(page: &Page, id: &str, max_retries: u32) -> Result<bool> {
	for attempt in 1..=max_retries {
		match click_by_id(page, id).await {
			Ok(true) => return Ok(true),
			Ok(false) => return Ok(false),
			Err(e) =>
				if attempt < max_retries {
					elog!("Click on #{id} failed (attempt {attempt}/{max_retries}): {e}");
					tokio::time::sleep(std::time::Duration::from_millis(500)).await;
				} else {
					return Err(e);
				},
		}
	}
	Ok(false)
}
