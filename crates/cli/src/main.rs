mod app;
mod cli;
mod dashboard;
mod logging;
mod prompt;

use clap::Parser;
use tracing::error;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose, cli.log_format);

	let ok = match app::run(cli).await {
		Ok(ok) => ok,
		Err(err) => {
			error!(target: "usagewatch", error = %err, "fatal");
			eprintln!("usagewatch: {err:#}");
			false
		}
	};
	// Exit directly: a pending stdin read would otherwise hold the runtime open.
	std::process::exit(if ok { 0 } else { 1 });
}
