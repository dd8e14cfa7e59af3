use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod dump;
pub mod monitor;
pub mod player;
pub mod queue;
pub mod session;
pub mod vision;

/// "next lesson" button on the video end screen
pub const ID_NEXT_STUDY: &str = "btn-next-study";
/// Label link inside the "next lesson" button
pub const ID_NEXT_STUDY_LINK: &str = "btn-next-study-link";
/// Answer submission control on the quiz page
pub const ID_QUIZ_SUBMIT: &str = "ctl00_examBody_lnkExamAnswerSubmit";
/// "next" control on the quiz explanation page
pub const ID_EXPLANATION_NEXT: &str = "ctl00_examBody_cmdNext";
/// End label on the survey page
pub const ID_SURVEY_END: &str = "panel-end-label";
/// Embedded video player region
pub const ID_PLAYER: &str = "eqPlayer";
/// Title fragment of the quiz page
pub const QUIZ_TITLE: &str = "確認テスト";
/// Title fragment of the survey page
pub const SURVEY_TITLE: &str = "アンケート";
/// Title fragments that mark a window as the lesson popup
pub const LESSON_WINDOW_MARKERS: [&str; 2] = ["レッスン", "Lesson"];
/// Query parameter carrying the lesson identifier on lesson URLs
pub const LESSON_ID_PARAM: &str = "lessonid";

/// Detects whether a window title belongs to a lesson popup
pub fn is_lesson_window_title(title: &str) -> bool {
	LESSON_WINDOW_MARKERS.iter().any(|marker| title.contains(marker))
}

/// Extracts the lesson identifier from a lesson URL's query string
pub fn extract_lesson_id(url: &str) -> Option<String> {
	let re = regex::Regex::new(&format!(r"(?i)[?&]{}=([^&#]+)", LESSON_ID_PARAM)).ok()?;
	let caps = re.captures(url)?;
	Some(caps.get(1)?.as_str().to_string())
}

/// Facts gathered from the lesson window in one polling tick.
/// Filled by a single injected script so the classifier never touches the live page.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PageProbe {
	/// `document.title` of the probed window
	#[serde(default)]
	pub title: String,
	/// The "next lesson" button is present and visible
	#[serde(default)]
	pub next_study_visible: bool,
	/// Text of the "next lesson" label link, when present
	#[serde(default)]
	pub next_study_label: Option<String>,
	/// The quiz answer-submit control is present and visible
	#[serde(default)]
	pub quiz_submit_visible: bool,
	/// The explanation "next" control is present and visible
	#[serde(default)]
	pub explanation_next_visible: bool,
	/// The survey end label is present and visible
	#[serde(default)]
	pub survey_end_visible: bool,
	/// Player pause state; None when the player API is unreachable
	#[serde(default)]
	pub player_paused: Option<bool>,
}

/// Mutually-exclusive UI states of the lesson window
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PageState {
	/// The "next lesson" button is on screen
	NextLesson {
		/// Text of the button's label link ("次の学習へ", "テストへ", ...)
		label: Option<String>,
	},
	/// Quiz answer page
	Quiz,
	/// Quiz explanation page
	QuizExplanation,
	/// Survey page
	Survey,
	/// Player is paused with no terminal button visible
	Paused,
	/// Video playing, or nothing actionable on screen
	Idle,
}

impl PageState {
	/// Classify a probe into exactly one state.
	///
	/// First match wins, in this order: NextLesson, Quiz, QuizExplanation, Survey, Paused.
	/// The quiz and survey checks require both the page title and their control, matching
	/// the portal markup. The pause check runs last so a finished video (next button up,
	/// player reporting paused) never restarts playback.
	pub fn classify(probe: &PageProbe) -> Self {
		if probe.next_study_visible {
			return PageState::NextLesson { label: probe.next_study_label.clone() };
		}
		if probe.title.contains(QUIZ_TITLE) && probe.quiz_submit_visible {
			return PageState::Quiz;
		}
		if probe.explanation_next_visible {
			return PageState::QuizExplanation;
		}
		if probe.title.contains(SURVEY_TITLE) && probe.survey_end_visible {
			return PageState::Survey;
		}
		if probe.player_paused == Some(true) {
			return PageState::Paused;
		}
		PageState::Idle
	}
}

impl fmt::Display for PageState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PageState::NextLesson { label: Some(label) } => write!(f, "next lesson ({label})"),
			PageState::NextLesson { label: None } => write!(f, "next lesson"),
			PageState::Quiz => write!(f, "quiz"),
			PageState::QuizExplanation => write!(f, "quiz explanation"),
			PageState::Survey => write!(f, "survey"),
			PageState::Paused => write!(f, "paused"),
			PageState::Idle => write!(f, "idle"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lesson_id_found_anywhere_in_query() {
		assert_eq!(extract_lesson_id("https://example.com/Lesson.aspx?lessonid=A102"), Some("A102".to_string()));
		assert_eq!(extract_lesson_id("https://example.com/Lesson.aspx?mode=play&lessonid=A102&x=1"), Some("A102".to_string()));
		assert_eq!(extract_lesson_id("https://example.com/Lesson.aspx?LESSONID=A102"), Some("A102".to_string()));
	}

	#[test]
	fn lesson_id_absent_yields_none() {
		assert_eq!(extract_lesson_id("https://example.com/Lesson.aspx"), None);
		assert_eq!(extract_lesson_id("https://example.com/Lesson.aspx?lesson=A102"), None);
		// must be a query parameter, not a path fragment
		assert_eq!(extract_lesson_id("https://example.com/lessonid=A102"), None);
	}

	#[test]
	fn lesson_window_titles() {
		assert!(is_lesson_window_title("レッスン - 第3回"));
		assert!(is_lesson_window_title("Lesson 3"));
		assert!(!is_lesson_window_title("MPラーニング ホーム"));
	}

	fn probe_all_set() -> PageProbe {
		PageProbe {
			title: format!("{QUIZ_TITLE} / {SURVEY_TITLE}"),
			next_study_visible: true,
			next_study_label: Some("テストへ".to_string()),
			quiz_submit_visible: true,
			explanation_next_visible: true,
			survey_end_visible: true,
			player_paused: Some(true),
		}
	}

	#[test]
	fn classify_precedence_is_fixed() {
		// every check matches: the highest-precedence state wins
		let mut probe = probe_all_set();
		assert_eq!(PageState::classify(&probe), PageState::NextLesson { label: Some("テストへ".to_string()) });

		probe.next_study_visible = false;
		assert_eq!(PageState::classify(&probe), PageState::Quiz);

		probe.quiz_submit_visible = false;
		assert_eq!(PageState::classify(&probe), PageState::QuizExplanation);

		probe.explanation_next_visible = false;
		assert_eq!(PageState::classify(&probe), PageState::Survey);

		probe.survey_end_visible = false;
		assert_eq!(PageState::classify(&probe), PageState::Paused);

		probe.player_paused = Some(false);
		assert_eq!(PageState::classify(&probe), PageState::Idle);
	}

	#[test]
	fn quiz_needs_title_and_control() {
		let probe = PageProbe { quiz_submit_visible: true, ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Idle);

		let probe = PageProbe { title: QUIZ_TITLE.to_string(), ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Idle);

		let probe = PageProbe { title: QUIZ_TITLE.to_string(), quiz_submit_visible: true, ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Quiz);
	}

	#[test]
	fn survey_needs_title_and_control() {
		let probe = PageProbe { survey_end_visible: true, ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Idle);

		let probe = PageProbe { title: SURVEY_TITLE.to_string(), survey_end_visible: true, ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Survey);
	}

	#[test]
	fn empty_probe_is_idle() {
		assert_eq!(PageState::classify(&PageProbe::default()), PageState::Idle);
	}

	#[test]
	fn paused_only_when_player_reports_it() {
		let probe = PageProbe { player_paused: None, ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Idle);

		let probe = PageProbe { player_paused: Some(true), ..Default::default() };
		assert_eq!(PageState::classify(&probe), PageState::Paused);
	}
}
