use clap::builder::TypedValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::processor::DEFAULT_WORKERS;
use crate::retry::RetryPolicy;
use crate::uploader::RunOptions;

pub const DEFAULT_ENDPOINT: &str = "https://photos.example.com/api/v1";
pub const DEFAULT_LOG_FILE: &str = "photo_upload.log";

const UPLOAD_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Upload JPEG photos from a directory to a remote photo library.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory containing photos to upload (scanned recursively)
    pub directory: PathBuf,

    /// Account username/email
    #[arg(short, long)]
    pub username: String,

    /// Account password (prompted if not provided)
    #[arg(short, long, env = "PHOTO_UPLOAD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Album to upload to (default collection if omitted)
    #[arg(short, long)]
    pub album: Option<String>,

    /// Number of upload threads
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_WORKERS,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub threads: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Base URL of the photo service API
    #[arg(long, env = "PHOTO_UPLOAD_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Where to write the upload log
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Times to retry a file after a network or server error
    #[arg(long, default_value_t = 0)]
    pub upload_retries: u32,
}

impl Args {
    /// Check the parts of the configuration clap cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.directory.exists() {
            return Err(ConfigError::NotFound(self.directory.clone()));
        }
        if !self.directory.is_dir() {
            return Err(ConfigError::NotADirectory(self.directory.clone()));
        }
        Ok(())
    }

    pub fn upload_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.upload_retries, UPLOAD_RETRY_BACKOFF)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            directory: self.directory.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            album: self.album.clone(),
            workers: self.threads,
            upload_retries: self.upload_retry_policy(),
            auth_retries: RetryPolicy::AUTHENTICATION,
        }
    }
}
