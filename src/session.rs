//! The remote photo service seam and the one-time sign-in flow around it.
//!
//! Authentication needs `&mut` access to the service; uploads only need
//! `&self`. Once [`authenticate`] returns, the service is meant to be moved
//! into an `Arc` and shared by the workers, which leaves no way for a worker
//! to re-authenticate on its own.

use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{AuthError, ServiceError, TransientError, UploadError};
use crate::metadata::PhotoMetadata;
use crate::prompt::Prompt;
use crate::retry::RetryPolicy;

/// Result of one sign-in step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    Authenticated,
    NeedsSecondFactor { prompt: String },
    Rejected { reason: String },
}

/// Opaque handle to a remote collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionId(pub String);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: CollectionId,
    pub title: String,
}

/// Calls made into the remote photo service
pub trait PhotoService: Send + Sync {
    fn sign_in(&mut self, username: &str, password: &str) -> Result<AuthStep, TransientError>;

    fn submit_code(&mut self, code: &str) -> Result<AuthStep, TransientError>;

    fn list_collections(&self) -> Result<Vec<Collection>, ServiceError>;

    fn create_collection(&self, name: &str) -> Result<Collection, ServiceError>;

    /// Upload one file, returning the number of bytes sent
    fn upload(
        &self,
        path: &Path,
        metadata: &PhotoMetadata,
        collection: Option<&CollectionId>,
    ) -> Result<u64, UploadError>;
}

/// Sign in once, prompting for a second factor if the service asks for one.
///
/// Transient failures are retried under `policy`. A rejected password or a
/// rejected code is fatal immediately.
pub fn authenticate<S, P>(
    service: &mut S,
    username: &str,
    password: &str,
    prompt: &mut P,
    policy: RetryPolicy,
) -> Result<(), AuthError>
where
    S: PhotoService + ?Sized,
    P: Prompt + ?Sized,
{
    info!("Authenticating as {}", username);

    let (step, attempts) = policy.run("Sign-in", || service.sign_in(username, password), |_| true);
    let step = step.map_err(|source| AuthError::Transient { attempts, source })?;

    match step {
        AuthStep::Authenticated => {
            info!("Authenticated as {}", username);
            Ok(())
        }
        AuthStep::Rejected { reason } => {
            warn!("Sign-in rejected: {}", reason);
            Err(AuthError::Rejected(reason))
        }
        AuthStep::NeedsSecondFactor { prompt: message } => {
            info!("Two-factor authentication required");
            let code = prompt.verification_code(&message).map_err(AuthError::Prompt)?;

            let (step, attempts) =
                policy.run("Code verification", || service.submit_code(&code), |_| true);
            let step = step.map_err(|source| AuthError::Transient { attempts, source })?;

            debug!("Second-factor result: {:?}", step);
            match step {
                AuthStep::Authenticated => {
                    info!("Authenticated as {}", username);
                    Ok(())
                }
                AuthStep::Rejected { .. } | AuthStep::NeedsSecondFactor { .. } => {
                    warn!("Failed to verify second-factor code");
                    Err(AuthError::SecondFactorRejected)
                }
            }
        }
    }
}

/// Find a collection by exact title, creating it if absent.
/// `None` means the default collection.
pub fn resolve_collection<S>(service: &S, name: Option<&str>) -> Result<Option<CollectionId>, ServiceError>
where
    S: PhotoService + ?Sized,
{
    let Some(name) = name else {
        return Ok(None);
    };

    let existing = service.list_collections()?;
    if let Some(collection) = existing.into_iter().find(|c| c.title == name) {
        debug!("Using existing album '{}' ({})", name, collection.id);
        return Ok(Some(collection.id));
    }

    info!("Creating new album: {}", name);
    let created = service.create_collection(name)?;
    Ok(Some(created.id))
}
