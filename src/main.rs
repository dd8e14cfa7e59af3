use std::{
	path::PathBuf,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use clap::Parser;
use color_eyre::Result;
use mpl_autopilot::{
	config::AppConfig,
	dump, extract_lesson_id,
	monitor::{self, SharedStatus, get_status},
	queue::{self, LessonQueue, lock_queue},
	session::{Session, page_url},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use v_utils::{elog, io::confirm, log};

#[derive(Debug, Parser)]
#[command(name = "mpl_autopilot")]
#[command(about = "Automated MP-Learning lesson progression", long_about = None)]
struct Args {
	/// Path to a TOML config file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Portal login page to open at startup
	#[arg(long)]
	login_url: Option<String>,

	/// Dashboard page used by continuous mode
	#[arg(long)]
	dashboard_url: Option<String>,

	/// Polling interval in milliseconds
	#[arg(long)]
	poll_interval_ms: Option<u64>,

	/// Run without a visible browser window
	#[arg(long)]
	headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
	let args = Args::parse();

	let mut config = AppConfig::load(args.config.as_deref())?;
	if let Some(url) = args.login_url {
		config.login_url = url;
	}
	if let Some(url) = args.dashboard_url {
		config.dashboard_url = url;
	}
	if let Some(interval) = args.poll_interval_ms {
		config.poll_interval_ms = interval;
	}
	if args.headless {
		config.visible = false;
	}

	log!("Launching browser...");
	let session = Arc::new(Session::launch(&config.login_url, config.visible).await?);
	log!("Log in, open a lesson window, then type `start` (or `help` for commands).");

	let mut controller = Controller::new(session.clone(), config);
	run_command_loop(&mut controller).await?;

	controller.stop().await;
	if confirm("Close the browser too?").await {
		if let Err(e) = session.close().await {
			elog!("Failed to close browser: {}", e);
		}
	}
	Ok(())
}

/// Glue between the command shell and the background tasks: owns the running
/// flag, the shared status line, the lesson queue, and the active task handle.
struct Controller {
	session: Arc<Session>,
	config: AppConfig,
	queue: Arc<Mutex<LessonQueue>>,
	running: Arc<AtomicBool>,
	status: SharedStatus,
	task: Option<tokio::task::JoinHandle<()>>,
}

impl Controller {
	fn new(session: Arc<Session>, config: AppConfig) -> Self {
		Self {
			session,
			config,
			queue: Arc::new(Mutex::new(LessonQueue::new())),
			running: Arc::new(AtomicBool::new(false)),
			status: Arc::new(Mutex::new("stopped".to_string())),
			task: None,
		}
	}

	fn is_running(&self) -> bool {
		self.running.load(Ordering::Relaxed)
	}

	fn start_monitoring(&mut self) {
		if self.is_running() {
			log!("Already running");
			return;
		}
		self.running.store(true, Ordering::Relaxed);
		self.task = Some(monitor::spawn(self.session.clone(), self.config.clone(), self.running.clone(), self.status.clone()));
	}

	fn start_continuous(&mut self) {
		if self.is_running() {
			log!("Already running");
			return;
		}
		if lock_queue(&self.queue).is_empty() {
			log!("Queue is empty - `add` some lessons first");
			return;
		}
		self.running.store(true, Ordering::Relaxed);
		self.task = Some(queue::spawn_continuous(
			self.session.clone(),
			self.config.clone(),
			self.queue.clone(),
			self.running.clone(),
			self.status.clone(),
		));
	}

	/// Clear the running flag and wait for the task to finish its current step
	async fn stop(&mut self) {
		if !self.is_running() && self.task.is_none() {
			return;
		}
		self.running.store(false, Ordering::Relaxed);
		if let Some(task) = self.task.take() {
			log!("Stopping after the current step...");
			let _ = task.await;
		}
	}

	/// Queue a lesson: from an explicit URL, or from the current lesson window
	async fn add(&self, url_arg: Option<&str>) {
		let url = match url_arg {
			Some(url) => url.to_string(),
			None => {
				let popup = match self.session.find_lesson_window().await {
					Ok(Some(page)) => page,
					Ok(None) => {
						log!("No lesson window open - pass a URL, or open a lesson first");
						return;
					}
					Err(e) => {
						elog!("Failed to look for the lesson window: {}", e);
						return;
					}
				};
				match page_url(&popup).await {
					Ok(url) => url,
					Err(e) => {
						elog!("Failed to read the lesson window URL: {}", e);
						return;
					}
				}
			}
		};

		let Some(lesson_id) = extract_lesson_id(&url) else {
			log!("No lesson identifier in {}", url);
			return;
		};
		let mut queue = lock_queue(&self.queue);
		if queue.enqueue(lesson_id.clone()) {
			log!("Queued lesson {} ({} queued)", lesson_id, queue.len());
		} else {
			log!("Lesson {} is already queued", lesson_id);
		}
	}

	fn remove(&self, index_arg: Option<&str>) {
		let Some(index) = index_arg.and_then(|s| s.parse::<usize>().ok()) else {
			log!("Usage: remove <index> (see `list`)");
			return;
		};
		match lock_queue(&self.queue).remove(index) {
			Some(id) => log!("Removed lesson {} from the queue", id),
			None => log!("No queue entry at index {}", index),
		}
	}

	fn list(&self) {
		let queue = lock_queue(&self.queue);
		if queue.is_empty() {
			log!("Queue is empty");
			return;
		}
		for (i, id) in queue.items().iter().enumerate() {
			log!("  [{}] {}", i, id);
		}
	}

	async fn print_status(&self) {
		let windows = self.session.window_count().await.unwrap_or(0);
		log!("status: {}", get_status(&self.status));
		log!("running: {}, queued: {}, windows: {}", self.is_running(), lock_queue(&self.queue).len(), windows);
	}
}

fn print_help() {
	eprintln!("Commands:");
	eprintln!("  start           watch the lesson window and click through it");
	eprintln!("  continuous      play every queued lesson in order");
	eprintln!("  stop            stop watching");
	eprintln!("  add [url]       queue a lesson (current lesson window if no url)");
	eprintln!("  remove <index>  drop a queue entry");
	eprintln!("  list            show the queue");
	eprintln!("  status          show what the watcher is doing");
	eprintln!("  dump            save every window's HTML to the current directory");
	eprintln!("  quit            exit");
}

async fn run_command_loop(controller: &mut Controller) -> Result<()> {
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		eprint!("> ");
		let Some(line) = lines.next_line().await? else {
			break; // stdin closed
		};
		let line = line.trim();
		let (command, rest) = match line.split_once(char::is_whitespace) {
			Some((command, rest)) => (command, Some(rest.trim())),
			None => (line, None),
		};
		match command {
			"" => {}
			"help" => print_help(),
			"start" => controller.start_monitoring(),
			"continuous" => controller.start_continuous(),
			"stop" => controller.stop().await,
			"add" => controller.add(rest.filter(|s| !s.is_empty())).await,
			"remove" => controller.remove(rest),
			"list" => controller.list(),
			"status" => controller.print_status().await,
			"dump" => match dump::dump_all_windows(&controller.session, std::path::Path::new(".")).await {
				Ok(saved) => log!("Saved {} file(s)", saved.len()),
				Err(e) => elog!("Dump failed: {}", e),
			},
			"quit" | "exit" => break,
			other => log!("Unknown command {:?} - try `help`", other),
		}
	}
	Ok(())
}
