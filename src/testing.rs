//! In-memory service and prompt used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::error::{ServiceError, TransientError, UploadError};
use crate::metadata::PhotoMetadata;
use crate::prompt::Prompt;
use crate::session::{AuthStep, Collection, CollectionId, PhotoService};

pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created(String),
    Uploaded(PathBuf, Option<CollectionId>),
}

#[derive(Default)]
struct State {
    authenticated: bool,
    awaiting_code: bool,
    sign_in_calls: u32,
    transient_sign_in_failures: u32,
    list_calls: u32,
    collections: Vec<Collection>,
    events: Vec<Event>,
    upload_calls: HashMap<PathBuf, u32>,
    // file name -> (failures before success, error); u32::MAX fails forever
    upload_failures: HashMap<String, (u32, UploadError)>,
    panics_on: Option<String>,
}

/// Clones share state, so a test can keep a handle on a service it hands off
#[derive(Clone)]
pub struct FakeService {
    second_factor: Option<String>,
    upload_delay: Duration,
    state: Arc<Mutex<State>>,
}

impl FakeService {
    pub fn new() -> Self {
        FakeService {
            second_factor: None,
            upload_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A service that is already signed in
    pub fn signed_in() -> Self {
        let service = Self::new();
        service.state.lock().unwrap().authenticated = true;
        service
    }

    pub fn with_second_factor(mut self, code: &str) -> Self {
        self.second_factor = Some(code.to_string());
        self
    }

    pub fn with_transient_sign_in_failures(self, count: u32) -> Self {
        self.state.lock().unwrap().transient_sign_in_failures = count;
        self
    }

    pub fn with_collection(self, id: &str, title: &str) -> Self {
        self.state.lock().unwrap().collections.push(Collection {
            id: CollectionId(id.to_string()),
            title: title.to_string(),
        });
        self
    }

    /// Make uploads of `file_name` fail `times` times with `error`
    pub fn failing(self, file_name: &str, times: u32, error: UploadError) -> Self {
        self.state
            .lock()
            .unwrap()
            .upload_failures
            .insert(file_name.to_string(), (times, error));
        self
    }

    /// Make uploads of `file_name` panic inside the worker
    pub fn panicking(self, file_name: &str) -> Self {
        self.state.lock().unwrap().panics_on = Some(file_name.to_string());
        self
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().authenticated
    }

    pub fn sign_in_calls(&self) -> u32 {
        self.state.lock().unwrap().sign_in_calls
    }

    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    pub fn created(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Created(name) => Some(name),
                Event::Uploaded(..) => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Uploaded(path, _) => Some(path),
                Event::Created(_) => None,
            })
            .collect()
    }

    /// Total upload calls, including failed ones
    pub fn upload_calls(&self) -> u32 {
        self.state.lock().unwrap().upload_calls.values().sum()
    }

    pub fn upload_calls_for(&self, path: &Path) -> u32 {
        self.state
            .lock()
            .unwrap()
            .upload_calls
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl PhotoService for FakeService {
    fn sign_in(&mut self, _username: &str, password: &str) -> Result<AuthStep, TransientError> {
        let mut state = self.state.lock().unwrap();
        state.sign_in_calls += 1;
        if state.transient_sign_in_failures > 0 {
            state.transient_sign_in_failures -= 1;
            return Err(TransientError("connection reset".into()));
        }

        if password != PASSWORD {
            return Ok(AuthStep::Rejected {
                reason: "invalid account name or password".into(),
            });
        }

        if self.second_factor.is_some() {
            state.awaiting_code = true;
            return Ok(AuthStep::NeedsSecondFactor {
                prompt: "Enter the verification code".into(),
            });
        }

        state.authenticated = true;
        Ok(AuthStep::Authenticated)
    }

    fn submit_code(&mut self, code: &str) -> Result<AuthStep, TransientError> {
        let mut state = self.state.lock().unwrap();
        if state.awaiting_code && self.second_factor.as_deref() == Some(code) {
            state.awaiting_code = false;
            state.authenticated = true;
            return Ok(AuthStep::Authenticated);
        }
        Ok(AuthStep::Rejected {
            reason: "incorrect code".into(),
        })
    }

    fn list_collections(&self) -> Result<Vec<Collection>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if !state.authenticated {
            return Err(ServiceError::NotAuthenticated);
        }
        state.list_calls += 1;
        Ok(state.collections.clone())
    }

    fn create_collection(&self, name: &str) -> Result<Collection, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if !state.authenticated {
            return Err(ServiceError::NotAuthenticated);
        }
        let collection = Collection {
            id: CollectionId(format!("created-{}", state.collections.len())),
            title: name.to_string(),
        };
        state.collections.push(collection.clone());
        state.events.push(Event::Created(name.to_string()));
        Ok(collection)
    }

    fn upload(
        &self,
        path: &Path,
        _metadata: &PhotoMetadata,
        collection: Option<&CollectionId>,
    ) -> Result<u64, UploadError> {
        if !self.upload_delay.is_zero() {
            thread::sleep(self.upload_delay);
        }

        let mut state = self.state.lock().unwrap();
        *state.upload_calls.entry(path.to_path_buf()).or_insert(0) += 1;

        if !state.authenticated {
            return Err(UploadError::NotAuthenticated);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if state.panics_on.as_deref() == Some(name.as_str()) {
            drop(state);
            panic!("upload of {} blew up", name);
        }
        if let Some((remaining, error)) = state.upload_failures.get_mut(&name) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(error.clone());
            }
        }

        state
            .events
            .push(Event::Uploaded(path.to_path_buf(), collection.cloned()));
        Ok(std::fs::metadata(path).map(|m| m.len()).unwrap_or(0))
    }
}

/// Answers prompts from a fixed script
#[derive(Default)]
pub struct ScriptedPrompt {
    codes: VecDeque<String>,
    codes_asked: usize,
}

impl ScriptedPrompt {
    pub fn with_codes(codes: &[&str]) -> Self {
        ScriptedPrompt {
            codes: codes.iter().map(|c| c.to_string()).collect(),
            codes_asked: 0,
        }
    }

    pub fn codes_asked(&self) -> usize {
        self.codes_asked
    }
}

impl Prompt for ScriptedPrompt {
    fn password(&mut self, _username: &str) -> io::Result<String> {
        Ok(PASSWORD.to_string())
    }

    fn verification_code(&mut self, _message: &str) -> io::Result<String> {
        self.codes_asked += 1;
        self.codes
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }
}
