use anyhow::Context;
use clap::Parser;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, warn};

use photo_uploader::args::Args;
use photo_uploader::processor::progress_bar;
use photo_uploader::prompt::Terminal;
use photo_uploader::remote::HttpPhotoService;
use photo_uploader::summary::RunSummary;
use photo_uploader::uploader::{exit_code, request_stop, upload_directory, FORCED_EXIT_CODE};

fn main() {
    let args = Args::parse();
    if let Err(e) = photo_uploader::logging::init(&args.log_file, args.verbose) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }

    let result = run(&args);
    if let Err(e) = &result {
        error!("{:#}", e);
        // Verbose mode already echoes log events to stderr
        if !args.verbose {
            eprintln!("Error: {:#}", e);
        }
    }
    process::exit(exit_code(&result));
}

fn run(args: &Args) -> anyhow::Result<RunSummary> {
    args.validate()?;

    let service = HttpPhotoService::new(&args.endpoint)
        .with_context(|| format!("Failed to set up client for {}", args.endpoint))?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || {
            if request_stop(&stop) {
                eprintln!("Interrupted again, abandoning in-flight uploads");
                process::exit(FORCED_EXIT_CODE);
            }
            eprintln!("Interrupted, finishing in-flight uploads (Ctrl-C again to quit now)");
        }) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let summary = upload_directory(&args.run_options(), service, &mut Terminal, progress_bar(), stop)?;
    summary.print();
    Ok(summary)
}
