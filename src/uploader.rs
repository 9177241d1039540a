//! One full run: scan, sign in, resolve the album, upload everything.

use anyhow::Context;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::ConfigError;
use crate::processor::Processor;
use crate::prompt::Prompt;
use crate::retry::RetryPolicy;
use crate::scanner::Scanner;
use crate::session::{authenticate, resolve_collection, PhotoService};
use crate::summary::RunSummary;

/// Exit status used when a second interrupt abandons in-flight uploads
pub const FORCED_EXIT_CODE: i32 = 130;

/// Everything a run needs besides the service and the terminal
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub directory: PathBuf,
    pub username: String,
    /// Prompted for when absent
    pub password: Option<String>,
    pub album: Option<String>,
    pub workers: usize,
    pub upload_retries: RetryPolicy,
    pub auth_retries: RetryPolicy,
}

/// Upload every photo under `options.directory`.
///
/// Any error returned happens before the first upload is dispatched.
/// Per-file failures are reported in the summary instead.
pub fn upload_directory<S, P>(
    options: &RunOptions,
    mut service: S,
    prompt: &mut P,
    progress: ProgressBar,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<RunSummary>
where
    S: PhotoService + 'static,
    P: Prompt + ?Sized,
{
    let scanner = Scanner::new(&options.directory)?;
    let files = scanner.collect();
    if files.is_empty() {
        return Err(ConfigError::NoCandidates(scanner.root().to_path_buf()).into());
    }

    let password = match &options.password {
        Some(password) => password.clone(),
        None => prompt
            .password(&options.username)
            .map_err(ConfigError::Prompt)?,
    };

    authenticate(
        &mut service,
        &options.username,
        &password,
        prompt,
        options.auth_retries,
    )
    .context("Authentication failed")?;
    drop(password);

    // No re-authentication past this point
    let service = Arc::new(service);

    let collection = resolve_collection(service.as_ref(), options.album.as_deref())
        .with_context(|| {
            format!(
                "Could not find or create album: {}",
                options.album.as_deref().unwrap_or_default()
            )
        })?;

    let summary = Processor::new(service, options.workers)
        .collection(collection)
        .retries(options.upload_retries)
        .progress(progress)
        .stop_flag(stop)
        .run(files);

    info!(
        "Upload finished: {} succeeded, {} failed, {} not attempted",
        summary.succeeded, summary.failed, summary.not_dispatched
    );
    Ok(summary)
}

/// Zero only when every photo was uploaded
pub fn exit_code(result: &anyhow::Result<RunSummary>) -> i32 {
    match result {
        Ok(summary) if summary.is_success() => 0,
        _ => 1,
    }
}

/// Ask the dispatcher to stop. Returns true if a stop was already requested.
pub fn request_stop(stop: &AtomicBool) -> bool {
    stop.swap(true, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, UploadError};
    use crate::testing::{FakeService, ScriptedPrompt, PASSWORD};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    const QUICK: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::ZERO,
    };

    fn options(dir: &Path, password: Option<&str>) -> RunOptions {
        RunOptions {
            directory: dir.to_path_buf(),
            username: "me@example.com".into(),
            password: password.map(str::to_string),
            album: None,
            workers: 2,
            upload_retries: RetryPolicy::NONE,
            auth_retries: QUICK,
        }
    }

    fn photo_dir(count: usize) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for i in 0..count {
            fs::write(tmp.path().join(format!("photo{}.jpg", i)), b"jpeg").unwrap();
        }
        tmp
    }

    fn run(options: &RunOptions, service: FakeService, prompt: &mut ScriptedPrompt) -> anyhow::Result<RunSummary> {
        upload_directory(
            options,
            service,
            prompt,
            ProgressBar::hidden(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_wrong_password_uploads_nothing() {
        let tmp = photo_dir(3);
        let service = FakeService::new();
        let handle = service.clone();

        let result = run(&options(tmp.path(), Some("wrong")), service, &mut ScriptedPrompt::default());

        assert_eq!(exit_code(&result), 1);
        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::Rejected(_))));
        assert_eq!(handle.upload_calls(), 0);
        assert_eq!(handle.list_calls(), 0);
    }

    #[test]
    fn test_wrong_verification_code_uploads_nothing() {
        let tmp = photo_dir(3);
        let service = FakeService::new().with_second_factor("123456");
        let handle = service.clone();
        let mut prompt = ScriptedPrompt::with_codes(&["000000", "123456"]);

        let result = run(&options(tmp.path(), Some(PASSWORD)), service, &mut prompt);

        assert_eq!(exit_code(&result), 1);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::SecondFactorRejected)
        ));
        // One wrong code is final
        assert_eq!(prompt.codes_asked(), 1);
        assert_eq!(handle.upload_calls(), 0);
    }

    #[test]
    fn test_unreachable_service_uploads_nothing() {
        let tmp = photo_dir(3);
        let service = FakeService::new().with_transient_sign_in_failures(10);
        let handle = service.clone();

        let result = run(&options(tmp.path(), Some(PASSWORD)), service, &mut ScriptedPrompt::default());

        assert_eq!(exit_code(&result), 1);
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::Transient { attempts: 3, .. })
        ));
        assert_eq!(handle.sign_in_calls(), 3);
        assert_eq!(handle.upload_calls(), 0);
    }

    #[test]
    fn test_empty_directory_never_signs_in() {
        let tmp = photo_dir(0);
        fs::write(tmp.path().join("notes.txt"), b"n").unwrap();
        let service = FakeService::new();
        let handle = service.clone();

        let result = run(&options(tmp.path(), Some(PASSWORD)), service, &mut ScriptedPrompt::default());

        assert_eq!(exit_code(&result), 1);
        assert!(matches!(
            result.unwrap_err().downcast_ref::<ConfigError>(),
            Some(ConfigError::NoCandidates(_))
        ));
        assert_eq!(handle.sign_in_calls(), 0);
    }

    #[test]
    fn test_prompted_password_and_album_upload_everything() {
        let tmp = photo_dir(4);
        let service = FakeService::new().with_second_factor("123456");
        let handle = service.clone();
        let mut prompt = ScriptedPrompt::with_codes(&["123456"]);
        let mut options = options(tmp.path(), None);
        options.album = Some("Trip".into());

        let result = run(&options, service, &mut prompt);

        assert_eq!(exit_code(&result), 0);
        let summary = result.unwrap();
        assert_eq!(summary.succeeded, 4);
        assert_eq!(handle.created(), vec!["Trip".to_string()]);
        assert_eq!(handle.upload_calls(), 4);
    }

    #[test]
    fn test_failed_upload_gives_failing_exit_code() {
        let tmp = photo_dir(3);
        let service = FakeService::new().failing("photo2.jpg", u32::MAX, UploadError::QuotaExceeded);

        let result = run(&options(tmp.path(), Some(PASSWORD)), service, &mut ScriptedPrompt::default());

        let summary = result.as_ref().unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(exit_code(&result), 1);
    }

    #[test]
    fn test_second_stop_request_is_reported() {
        let stop = AtomicBool::new(false);
        assert!(!request_stop(&stop));
        assert!(stop.load(Ordering::SeqCst));
        assert!(request_stop(&stop));
    }
}
