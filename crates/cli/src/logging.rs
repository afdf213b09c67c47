use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Installs the process-wide subscriber on stderr; stdout belongs to the dashboard.
///
/// `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: u8, format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true);

	// A second init keeps the first subscriber.
	let _ = match format {
		LogFormat::Text => builder.try_init(),
		LogFormat::Json => builder.json().try_init(),
	};
}

fn default_directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "usagewatch=info",
		1 => "usagewatch=debug",
		_ => "usagewatch=trace",
	}
}
