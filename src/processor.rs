use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::metadata::MetadataExtractor;
use crate::retry::RetryPolicy;
use crate::scanner::CandidateFile;
use crate::session::{CollectionId, PhotoService};
use crate::summary::{Outcome, RunSummary};

pub const DEFAULT_WORKERS: usize = 5;

/// Lifecycle of one upload task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// Uploads candidate files through a fixed pool of worker threads
pub struct Processor<S> {
    service: Arc<S>,
    workers: usize,
    collection: Option<CollectionId>,
    retries: RetryPolicy,
    progress: ProgressBar,
    stop: Arc<AtomicBool>,
}

impl<S: PhotoService + 'static> Processor<S> {
    pub fn new(service: Arc<S>, workers: usize) -> Self {
        Processor {
            service,
            workers: workers.max(1),
            collection: None,
            retries: RetryPolicy::NONE,
            progress: ProgressBar::hidden(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Upload into this collection instead of the default one
    pub fn collection(mut self, collection: Option<CollectionId>) -> Self {
        self.collection = collection;
        self
    }

    /// Per-file retry policy; only network and server errors are retried
    pub fn retries(mut self, policy: RetryPolicy) -> Self {
        self.retries = policy;
        self
    }

    pub fn progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Once set, no further files are dispatched
    pub fn stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Upload every file and return when all dispatched tasks are finished
    pub fn run(&self, files: Vec<CandidateFile>) -> RunSummary {
        let total = files.len();
        let mut summary = RunSummary::new(total);

        if total == 0 {
            return summary;
        }

        let num_workers = self.workers.min(total);
        info!(
            "Starting upload of {} photos with {} workers{}",
            total,
            num_workers,
            self.collection
                .as_ref()
                .map(|c| format!(" to album {}", c))
                .unwrap_or_default()
        );

        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        // Create channels
        let (work_sender, work_receiver) = bounded::<CandidateFile>(num_workers * 2);
        let (result_sender, result_receiver) = bounded::<Outcome>(num_workers * 2);

        // Spawn worker threads
        let mut worker_handles = Vec::new();
        for worker_id in 0..num_workers {
            let worker = Worker {
                id: worker_id,
                service: Arc::clone(&self.service),
                collection: self.collection.clone(),
                retries: self.retries,
            };
            let work_rx = work_receiver.clone();
            let result_tx = result_sender.clone();

            worker_handles.push(thread::spawn(move || worker.run(work_rx, result_tx)));
        }

        // Drop our copies so the channels close when the other ends finish
        drop(work_receiver);
        drop(result_sender);

        let stop = Arc::clone(&self.stop);
        let dispatcher = thread::spawn(move || dispatch(files, work_sender, &stop));

        for outcome in result_receiver {
            match &outcome {
                Outcome::Succeeded { path, attempts, .. } => {
                    info!("Uploaded {} (attempts: {})", path.display(), attempts);
                }
                Outcome::Failed { path, reason, attempts } => {
                    error!(
                        "Error uploading {}: {} (attempts: {})",
                        path.display(),
                        reason,
                        attempts
                    );
                }
            }
            summary.record(outcome);
            self.progress.inc(1);
        }

        for handle in worker_handles {
            if handle.join().is_err() {
                error!("Upload worker panicked");
            }
        }

        let dispatched = match dispatcher.join() {
            Ok(count) => count,
            Err(_) => {
                error!("Dispatcher panicked");
                summary.attempted
            }
        };
        summary.not_dispatched = total - dispatched.min(total);

        if summary.attempted < dispatched {
            error!(
                "{} uploads ended without reporting a result",
                dispatched - summary.attempted
            );
        }

        if summary.not_dispatched > 0 {
            warn!("Interrupted: {} photos were not attempted", summary.not_dispatched);
        }
        self.progress.finish();

        summary
    }
}

/// Feed files to the workers until done or stopped. Returns how many were sent.
fn dispatch(files: Vec<CandidateFile>, work_sender: Sender<CandidateFile>, stop: &AtomicBool) -> usize {
    let mut dispatched = 0;
    for file in files {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if work_sender.send(file).is_err() {
            break; // Workers have shut down
        }
        dispatched += 1;
    }
    dispatched
}

struct Worker<S> {
    id: usize,
    service: Arc<S>,
    collection: Option<CollectionId>,
    retries: RetryPolicy,
}

impl<S: PhotoService> Worker<S> {
    fn run(self, work_receiver: Receiver<CandidateFile>, result_sender: Sender<Outcome>) {
        // Each worker owns its own exiftool process
        let mut extractor = MetadataExtractor::new();

        for file in work_receiver {
            debug!("Worker {}: {} {:?}", self.id, file.path.display(), TaskState::Pending);
            // A panicking upload still reports, so every dispatched file is accounted for
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.upload_one(&mut extractor, &file.path)
            }))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("Worker {}: upload of {} panicked: {}", self.id, file.path.display(), message);
                Outcome::Failed {
                    path: file.path.clone(),
                    reason: UploadError::Aborted(message),
                    attempts: 1,
                }
            });
            if result_sender.send(outcome).is_err() {
                break; // Consumer has shut down
            }
        }
    }

    fn upload_one(&self, extractor: &mut MetadataExtractor, path: &Path) -> Outcome {
        debug!("Worker {}: {} {:?}", self.id, path.display(), TaskState::InFlight);
        let metadata = extractor.extract(path);

        let (result, attempts) = self.retries.run(
            "Upload",
            || self.service.upload(path, &metadata, self.collection.as_ref()),
            UploadError::is_retryable,
        );

        match result {
            Ok(bytes) => {
                debug!("Worker {}: {} {:?}", self.id, path.display(), TaskState::Succeeded);
                Outcome::Succeeded {
                    path: path.to_path_buf(),
                    bytes,
                    attempts,
                }
            }
            Err(reason) => {
                debug!("Worker {}: {} {:?}", self.id, path.display(), TaskState::Failed);
                Outcome::Failed {
                    path: path.to_path_buf(),
                    reason,
                    attempts,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Progress bar showing completed/total uploads
pub fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) Uploading",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
