//! Diagnostic companion: open the portal, let the user navigate anywhere, and
//! save every open window's HTML on demand. Used to recover the element IDs
//! the main tool keys on whenever the portal markup shifts.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use mpl_autopilot::{dump, session::Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use v_utils::{elog, io::confirm, log};

#[derive(Debug, Parser)]
#[command(name = "dump_html")]
#[command(about = "Saves timestamped HTML snapshots of every open browser window", long_about = None)]
struct Args {
	/// Portal login page to open at startup
	#[arg(long, default_value = "https://www.mp-learning.com/Login.aspx")]
	login_url: String,

	/// Directory snapshots are written to
	#[arg(long, default_value = ".")]
	out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
	let args = Args::parse();

	let session = Session::launch(&args.login_url, true).await?;
	log!("Navigate to the screen you want captured (popups included),");
	log!("then press Enter or type `dump`. `quit` exits.");

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		eprint!("> ");
		let Some(line) = lines.next_line().await? else {
			break; // stdin closed
		};
		match line.trim() {
			"" | "dump" => match dump::dump_all_windows(&session, &args.out_dir).await {
				Ok(saved) => {
					log!("Saved {} file(s) to {}:", saved.len(), args.out_dir.display());
					for path in &saved {
						log!("  {}", path.display());
					}
				}
				Err(e) => elog!("Dump failed: {}", e),
			},
			"quit" | "exit" => break,
			other => log!("Unknown command {:?} - press Enter to dump, `quit` to exit", other),
		}
	}

	if confirm("Close the browser too?").await {
		if let Err(e) = session.close().await {
			elog!("Failed to close browser: {}", e);
		}
	}
	Ok(())
}
