use std::path::PathBuf;

use crate::error::UploadError;

/// Terminal result of one upload task, reported by a worker
#[derive(Debug)]
pub enum Outcome {
    Succeeded {
        path: PathBuf,
        bytes: u64,
        attempts: u32,
    },
    Failed {
        path: PathBuf,
        reason: UploadError,
        attempts: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: PathBuf,
    pub reason: UploadError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Never handed to a worker because the run was interrupted
    pub not_dispatched: usize,
    pub bytes_uploaded: u64,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        RunSummary {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.attempted += 1;
        match outcome {
            Outcome::Succeeded { bytes, .. } => {
                self.succeeded += 1;
                self.bytes_uploaded += bytes;
            }
            Outcome::Failed { path, reason, .. } => {
                self.failed += 1;
                self.failures.push(Failure { path, reason });
            }
        }
    }

    /// Every candidate was uploaded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_dispatched == 0 && self.succeeded == self.total
    }

    pub fn print(&self) {
        println!();
        println!("=== UPLOAD COMPLETE ===");
        println!("Photos found: {}", self.total);
        println!("Attempted: {}", self.attempted);
        println!(
            "Uploaded: {} ({})",
            self.succeeded,
            format_size(self.bytes_uploaded)
        );
        println!("Failed: {}", self.failed);

        if self.not_dispatched > 0 {
            println!("Not attempted (interrupted): {}", self.not_dispatched);
        }

        if !self.failures.is_empty() {
            println!();
            println!("=== FAILED UPLOADS ===");
            let mut failures = self.failures.clone();
            failures.sort_by(|a, b| a.path.cmp(&b.path));
            for failure in &failures {
                println!("✗ {}: {}", failure.path.display(), failure.reason);
            }
        }
    }
}

/// Convert bytes to human readable format
pub fn format_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} TB", size)
}
