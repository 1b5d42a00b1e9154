use std::process::ExitCode;

use pkgdep::download::{DownloadReport, DownloadResult};
use pkgdep::extractor::IndexPageExtractor;
use pkgdep::fetcher::ReqwestClient;
use pkgdep::{CancelToken, Config, PackageName, Session};

const EXIT_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",         "Show help");
		opts.optflag( "v", "verbose",      "Increased verbosity");
		opts.optopt(  "c", "config",       "Config file to use instead of the default", "FILE");
		opts.optopt(  "o", "output",       "Directory workspaces are created in", "DIR");
		opts.optopt(  "i", "installed",    "apt list style manifest of packages to skip", "FILE");
		opts.optopt(  "j", "jobs",         "Maximum concurrent requests", "N");
		opts.optopt(  "d", "distribution", "Distribution to resolve against", "NAME");
		opts.optopt(  "a", "architecture", "Architecture to resolve against", "NAME");
		opts.optopt(  "r", "report",       "Write a JSON report of every root to FILE", "FILE");
		opts.optflag( "",  "resolve-only", "Print the resolved packages without downloading");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { return usage_error(&opts, &e.to_string()) }
		};

		if parsed_options.opt_present("h") {
			println!("{}", opts.usage("Usage: pkgdep [options] <package>..."));
			return ExitCode::SUCCESS;
		}

		parsed_options
	};

	let default_level = if parsed_options.opt_present("v") { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

	let config = match build_config(&parsed_options) {
		Ok(config) => config,
		Err(e) => return exit_for(&opts, e),
	};

	let roots = match parse_roots(&parsed_options.free) {
		Ok(roots) => roots,
		Err(e) => return exit_for(&opts, e),
	};

	match run(config, &roots, parsed_options.opt_present("resolve-only"), parsed_options.opt_str("r")).await {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::from(EXIT_FAILED),
		Err(e) => exit_for(&opts, e),
	}
}

fn usage_error(opts: &getopts::Options, message: &str) -> ExitCode {
	eprintln!("{}", message);
	eprintln!("{}", opts.usage("Usage: pkgdep [options] <package>..."));
	ExitCode::from(EXIT_USAGE)
}

fn exit_for(opts: &getopts::Options, error: Error) -> ExitCode {
	match error {
		Error::Usage(_) | Error::InvalidValue { .. } => usage_error(opts, &error.to_string()),
		Error::Pkgdep(pkgdep::Error::Cancelled) => {
			eprintln!("Cancelled.");
			ExitCode::from(EXIT_CANCELLED)
		},
		e => {
			log::error!("{}", e);
			ExitCode::from(EXIT_FAILED)
		},
	}
}

fn build_config(options: &getopts::Matches) -> Result<Config, Error> {
	let mut config = match options.opt_str("c") {
		Some(path) => Config::load_from_file(&path)?,
		None => Config::load_from_disk().unwrap_or_else(|e| {
			log::warn!("Failed to read config file: {}", e);
			log::warn!("Using default config.");
			Config::default()
		}),
	};

	if let Some(dir) = options.opt_str("o") {
		config.set_download_dir(dir);
	}
	if let Some(path) = options.opt_str("i") {
		config.set_installed_list(Some(path.into()));
	}
	if let Some(jobs) = options.opt_str("j") {
		let jobs = jobs
			.parse::<usize>()
			.ok()
			.filter(|j| *j > 0)
			.ok_or(Error::InvalidValue { option: "--jobs", value: jobs })?;
		config.set_concurrency(jobs);
	}
	if let Some(distribution) = options.opt_str("d") {
		config.set_distribution(distribution);
	}
	if let Some(architecture) = options.opt_str("a") {
		config.set_architecture(architecture);
	}

	Ok(config)
}

fn parse_roots(free: &[String]) -> Result<Vec<PackageName>, Error> {
	if free.is_empty() {
		return Err(Error::Usage("No package names given.".to_string()));
	}
	free.iter()
		.map(|name| PackageName::new(name).map_err(|e| Error::Usage(e.to_string())))
		.collect()
}

/// Processes every root in turn. Returns whether everything succeeded.
async fn run(config: Config, roots: &[PackageName], resolve_only: bool, report_path: Option<String>) -> Result<bool, Error> {
	let client = ReqwestClient::new(&config)?;

	let cancel = CancelToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				log::warn!("Interrupted, stopping.");
				cancel.cancel();
			}
		});
	}

	let session = Session::new(client, IndexPageExtractor::new(), config, cancel);
	let mut all_ok = true;
	let mut reports = Vec::new();

	for root in roots {
		if resolve_only {
			let resolution = session.resolve(root).await?;
			println!("{}:", root);
			for package in &resolution.order {
				println!("\t{}", package);
			}
			for failure in &resolution.failures {
				println!("\tcould not expand {}: {}", failure.package, failure.cause);
			}
			all_ok &= resolution.is_complete();
			reports.push(serde_json::to_value(&resolution)?);
			continue;
		}

		let report = match session.run(root).await {
			Ok(report) => report,
			Err(pkgdep::Error::Cancelled) => return Err(pkgdep::Error::Cancelled.into()),
			Err(e) => {
				log::error!("Failed to process {}: {}", root, e);
				all_ok = false;
				continue;
			},
		};

		println!("{}:", root);
		for download in &report.downloads {
			println!("\t{} {}", download.package, status_text(download));
			if !download.is_success() {
				log::error!("Unable to download package: {}", download.package);
			}
		}
		println!(
			"{}: {} of {} packages downloaded into {}",
			root,
			report.succeeded().count(),
			report.downloads.len(),
			report.workspace.display()
		);
		all_ok &= report.is_success();
		reports.push(serde_json::to_value(&report)?);
	}

	if let Some(path) = report_path {
		let file = std::fs::File::create(&path)?;
		serde_json::to_writer_pretty(file, &reports)?;
		log::info!("Wrote report to {}", path);
	}

	Ok(all_ok)
}

fn status_text(report: &DownloadReport) -> &'static str {
	match report.result {
		DownloadResult::VerifiedSaved { .. } => "ok (verified)",
		DownloadResult::UnverifiedSaved { .. } => "ok (unverified)",
		DownloadResult::VerificationFailed => "FAILED (hash mismatch)",
		DownloadResult::FetchFailed => "FAILED (fetch)",
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Usage(String),
	#[error("invalid value \"{value}\" for {option}")]
	InvalidValue { option: &'static str, value: String },
	#[error("pkgdep error: {0}")]
	Pkgdep(#[from] pkgdep::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
}
