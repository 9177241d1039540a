//! HTTP client for the photo service API.

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ServiceError, TransientError, UploadError};
use crate::metadata::PhotoMetadata;
use crate::session::{AuthStep, Collection, CollectionId, PhotoService};

/// Header carrying the capture timestamp of an uploaded photo
pub const CAPTURE_DATE_HEADER: &str = "X-Capture-Date";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    account_name: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Debug)]
struct SignInResponse {
    token: String,
    #[serde(default, rename = "requires2fa")]
    requires_second_factor: bool,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize, Debug)]
struct VerifyResponse {
    token: String,
}

#[derive(Deserialize, Debug)]
struct AlbumList {
    albums: Vec<Album>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Album {
    id: String,
    title: String,
}

impl From<Album> for Collection {
    fn from(album: Album) -> Self {
        Collection {
            id: CollectionId(album.id),
            title: album.title,
        }
    }
}

/// Photo service reached over HTTP(S)
#[derive(Debug)]
pub struct HttpPhotoService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPhotoService {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            // Uploads of large photos can take a while
            .timeout(None)
            .build()?;

        Ok(HttpPhotoService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let token = self.token.as_deref().ok_or(ServiceError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }
}

fn status_error(response: Response) -> ServiceError {
    let status = response.status().as_u16();
    let reason = response.text().unwrap_or_default();
    ServiceError::Status { status, reason }
}

/// Map a sign-in or verification HTTP status onto the auth flow.
/// `None` means the body should be parsed as a success.
fn classify_auth_status(status: StatusCode, body: &str) -> Option<Result<AuthStep, TransientError>> {
    if status.is_success() {
        return None;
    }
    let reason = if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_string()
    };
    Some(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Ok(AuthStep::Rejected { reason })
        }
        _ => Err(TransientError(format!("HTTP {}: {}", status.as_u16(), reason))),
    })
}

/// Map an upload response status onto an outcome
pub fn classify_upload_status(status: StatusCode, body: &str) -> Result<(), UploadError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body.trim().to_string()
    };
    Err(match status.as_u16() {
        409 => UploadError::Duplicate,
        413 | 507 => UploadError::QuotaExceeded,
        415 | 422 => UploadError::Malformed(reason),
        code => UploadError::Server { status: code, reason },
    })
}

impl PhotoService for HttpPhotoService {
    fn sign_in(&mut self, username: &str, password: &str) -> Result<AuthStep, TransientError> {
        let response = self
            .client
            .post(self.url("auth/signin"))
            .json(&SignInRequest {
                account_name: username,
                password,
            })
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if let Some(step) = classify_auth_status(status, &body) {
            return step;
        }

        let parsed: SignInResponse = serde_json::from_str(&body)
            .map_err(|e| TransientError(format!("Invalid sign-in response: {}", e)))?;
        self.token = Some(parsed.token);

        if parsed.requires_second_factor {
            Ok(AuthStep::NeedsSecondFactor {
                prompt: parsed
                    .prompt
                    .unwrap_or_else(|| "Enter the verification code".to_string()),
            })
        } else {
            Ok(AuthStep::Authenticated)
        }
    }

    fn submit_code(&mut self, code: &str) -> Result<AuthStep, TransientError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(AuthStep::Rejected {
                reason: "no sign-in in progress".to_string(),
            });
        };

        let response = self
            .client
            .post(self.url("auth/verify"))
            .bearer_auth(token)
            .json(&VerifyRequest { code })
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if let Some(step) = classify_auth_status(status, &body) {
            return step;
        }

        let parsed: VerifyResponse = serde_json::from_str(&body)
            .map_err(|e| TransientError(format!("Invalid verification response: {}", e)))?;
        self.token = Some(parsed.token);
        Ok(AuthStep::Authenticated)
    }

    fn list_collections(&self) -> Result<Vec<Collection>, ServiceError> {
        let response = self.authorized(self.client.get(self.url("albums")))?.send()?;
        if !response.status().is_success() {
            return Err(status_error(response));
        }
        let list: AlbumList = response.json()?;
        Ok(list.albums.into_iter().map(Collection::from).collect())
    }

    fn create_collection(&self, name: &str) -> Result<Collection, ServiceError> {
        let response = self
            .authorized(self.client.post(self.url("albums")))?
            .json(&serde_json::json!({ "title": name }))
            .send()?;
        if !response.status().is_success() {
            return Err(status_error(response));
        }
        let album: Album = response.json()?;
        Ok(album.into())
    }

    fn upload(
        &self,
        path: &Path,
        metadata: &PhotoMetadata,
        collection: Option<&CollectionId>,
    ) -> Result<u64, UploadError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::Malformed("path has no file name".to_string()))?;

        let mut query = vec![("filename", file_name)];
        if let Some(id) = collection {
            query.push(("album", id.0.clone()));
        }

        let request = self
            .authorized(self.client.post(self.url("photos")))
            .map_err(|_| UploadError::NotAuthenticated)?
            .query(&query)
            .header(CONTENT_TYPE, "image/jpeg")
            .header(CAPTURE_DATE_HEADER, metadata.captured_at.to_rfc3339())
            .body(Body::sized(file, size));

        debug!("Uploading {} ({} bytes)", path.display(), size);
        let response = request
            .send()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        classify_upload_status(status, &body)?;
        Ok(size)
    }
}
