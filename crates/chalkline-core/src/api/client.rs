use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::auth::{CredentialStore, RefreshCoordinator, RefreshOutcome};

const DEFAULT_USER_AGENT: &str = "chalkline-rs/0.1.0";

/// Errors returned by the authenticated call wrapper.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    Status { status: StatusCode, body: String },
    /// No usable credentials remain. This is the signal to send the user
    /// back to the login boundary.
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("failed to serialize or deserialize payload: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone)]
enum RequestBody {
    Empty,
    Json(Bytes),
    Raw { content_type: String, bytes: Bytes },
}

/// A protected-endpoint request, held in a replayable form.
///
/// The body is captured as bytes up front so a retry reissues exactly the
/// same payload; only the authorization header differs between attempts.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body, serialized once and reused verbatim on retry.
    pub fn json<T: Serialize>(mut self, body: &T) -> ApiResult<Self> {
        self.body = RequestBody::Json(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Attach an opaque payload (file upload, multipart, ...) that is passed
    /// through unmodified on every attempt.
    pub fn raw(mut self, content_type: impl Into<String>, bytes: Bytes) -> Self {
        self.body = RequestBody::Raw {
            content_type: content_type.into(),
            bytes,
        };
        self
    }
}

/// Response from a protected endpoint, body fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    bytes: Bytes,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

/// Issues calls against protected endpoints, transparently recovering from
/// access-credential expiry.
///
/// Per invocation: with no stored credential the call fails locally before
/// touching the network. Otherwise the request goes out with the current
/// access credential; a 401/403 hands off to the [`RefreshCoordinator`] and,
/// if the refresh succeeds, the request is reissued exactly once with the
/// new credential. Whatever that retry yields is final. A failed refresh
/// clears the session and surfaces [`ApiError::AuthenticationRequired`].
/// Application code talks to protected endpoints only through this type.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        base_url: Url,
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> ApiResult<Self> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url,
            store,
            refresher,
        })
    }

    /// Perform one protected call, refreshing and retrying at most once.
    pub async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let Some(access) = self.store.access_credential().await else {
            return Err(ApiError::AuthenticationRequired);
        };

        let response = self.attempt(request, &access).await?;
        if !is_auth_rejected(response.status()) {
            return Self::finalize(response).await;
        }

        match self.refresher.refresh().await {
            RefreshOutcome::SessionEnded => Err(ApiError::AuthenticationRequired),
            RefreshOutcome::Refreshed => {
                let Some(access) = self.store.access_credential().await else {
                    return Err(ApiError::AuthenticationRequired);
                };
                // Terminal either way: a second rejection is returned as-is.
                let response = self.attempt(request, &access).await?;
                Self::finalize(response).await
            }
        }
    }

    /// `send` plus JSON deserialization of a 2xx body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> ApiResult<T> {
        self.send(request).await?.json()
    }

    async fn attempt(&self, request: &ApiRequest, access: &str) -> ApiResult<reqwest::Response> {
        let url = self.base_url.join(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .bearer_auth(access);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            RequestBody::Raw {
                content_type,
                bytes,
            } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(bytes.clone()),
        };

        Ok(builder.send().await?)
    }

    async fn finalize(response: reqwest::Response) -> ApiResult<ApiResponse> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(ApiResponse { status, bytes });
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }
}

fn is_auth_rejected(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialPair, Identity, Role};
    use crate::registry::{RegistryClient, RegistryEndpoints};
    use httpmock::prelude::*;
    use std::time::Duration;

    fn sample_identity() -> Identity {
        Identity {
            id: "user-1".into(),
            email: "ada@example.edu".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            role: Role::Student,
        }
    }

    async fn client_for(server: &MockServer, seed: bool) -> (ApiClient, Arc<CredentialStore>) {
        let store = Arc::new(CredentialStore::in_memory());
        if seed {
            store
                .set(CredentialPair::new("acc-1", "ref-1"), sample_identity())
                .await
                .unwrap();
        }
        let base_url = Url::parse(&server.base_url()).unwrap();
        let registry = RegistryClient::new(RegistryEndpoints::new(base_url.clone())).unwrap();
        let refresher = Arc::new(RefreshCoordinator::new(store.clone(), registry));
        let client = ApiClient::new(base_url, store.clone(), refresher).unwrap();
        (client, store)
    }

    fn mock_refresh_rotation(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/auth/refresh")
                .json_body_partial(r#"{"refreshCredential": "ref-1"}"#);
            then.status(200).json_body_obj(&serde_json::json!({
                "accessCredential": "acc-2",
                "refreshCredential": "ref-2",
            }));
        })
    }

    #[tokio::test]
    async fn fails_locally_without_credentials() {
        let server = MockServer::start();
        let protected = server.mock(|when, then| {
            when.method(GET).path("/courses");
            then.status(200);
        });

        let (client, _store) = client_for(&server, false).await;
        let err = client.send(&ApiRequest::get("/courses")).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRequired));
        protected.assert_hits(0);
    }

    #[tokio::test]
    async fn expired_access_is_refreshed_and_retried_once() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-1");
            then.status(401).json_body_obj(&serde_json::json!({
                "code": "TOKEN_INVALID",
                "message": "access credential expired",
            }));
        });
        let refresh = mock_refresh_rotation(&server);
        let accepted = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-2");
            then.status(200)
                .json_body_obj(&serde_json::json!({ "courses": [] }));
        });

        let (client, store) = client_for(&server, true).await;
        let response = client.send(&ApiRequest::get("/courses")).await.unwrap();

        rejected.assert();
        refresh.assert();
        accepted.assert();
        assert_eq!(response.status(), StatusCode::OK);
        let session = store.snapshot().await.unwrap();
        assert_eq!(session.pair, CredentialPair::new("acc-2", "ref-2"));
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-1");
            then.status(401);
        });
        let refresh = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/refresh")
                .json_body_partial(r#"{"refreshCredential": "ref-1"}"#);
            then.status(200)
                .delay(Duration::from_millis(100))
                .json_body_obj(&serde_json::json!({
                    "accessCredential": "acc-2",
                    "refreshCredential": "ref-2",
                }));
        });
        let accepted = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-2");
            then.status(200)
                .json_body_obj(&serde_json::json!({ "courses": [] }));
        });

        let (client, _store) = client_for(&server, true).await;
        let request = ApiRequest::get("/courses");
        let (a, b) = tokio::join!(client.send(&request), client.send(&request));

        rejected.assert_hits(2);
        refresh.assert();
        accepted.assert_hits(2);
        assert_eq!(a.unwrap().status(), StatusCode::OK);
        assert_eq!(b.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn failed_refresh_logs_out_every_caller() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-1");
            then.status(401);
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/auth/refresh");
            then.status(401)
                .delay(Duration::from_millis(100))
                .json_body_obj(&serde_json::json!({
                    "code": "TOKEN_INVALID",
                    "message": "refresh credential already consumed",
                }));
        });

        let (client, store) = client_for(&server, true).await;
        let request = ApiRequest::get("/courses");
        let (a, b) = tokio::join!(client.send(&request), client.send(&request));

        rejected.assert_hits(2);
        refresh.assert();
        assert!(matches!(a.unwrap_err(), ApiError::AuthenticationRequired));
        assert!(matches!(b.unwrap_err(), ApiError::AuthenticationRequired));
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn rejection_after_retry_is_terminal() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-1");
            then.status(401);
        });
        let refresh = mock_refresh_rotation(&server);
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("authorization", "Bearer acc-2");
            then.status(401).body("still rejected");
        });

        let (client, _store) = client_for(&server, true).await;
        let err = client.send(&ApiRequest::get("/courses")).await.unwrap_err();

        first.assert();
        refresh.assert();
        second.assert();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "still rejected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_auth_failures_do_not_trigger_refresh() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/courses");
            then.status(500).body("boom");
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/auth/refresh");
            then.status(200);
        });

        let (client, store) = client_for(&server, true).await;
        let err = client.send(&ApiRequest::get("/courses")).await.unwrap_err();

        refresh.assert_hits(0);
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Transport-level and server-side failures leave the session alone.
        assert!(store.is_authenticated().await);
    }

    #[tokio::test]
    async fn raw_body_is_reissued_unmodified_on_retry() {
        let server = MockServer::start();
        let payload = "opaque-upload-payload";
        let first = server.mock(|when, then| {
            when.method(POST)
                .path("/assignments/42/submission")
                .header("authorization", "Bearer acc-1")
                .header("content-type", "application/octet-stream")
                .body(payload);
            then.status(401);
        });
        let refresh = mock_refresh_rotation(&server);
        let second = server.mock(|when, then| {
            when.method(POST)
                .path("/assignments/42/submission")
                .header("authorization", "Bearer acc-2")
                .header("content-type", "application/octet-stream")
                .body(payload);
            then.status(201);
        });

        let (client, _store) = client_for(&server, true).await;
        let request = ApiRequest::post("/assignments/42/submission")
            .raw("application/octet-stream", Bytes::from_static(payload.as_bytes()));
        let response = client.send(&request).await.unwrap();

        first.assert();
        refresh.assert();
        second.assert();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn json_body_round_trips() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/discussions")
                .header("authorization", "Bearer acc-1")
                .header("content-type", "application/json")
                .json_body_obj(&serde_json::json!({ "title": "Week 3 questions" }));
            then.status(200)
                .json_body_obj(&serde_json::json!({ "id": "disc-1" }));
        });

        let (client, _store) = client_for(&server, true).await;
        let request = ApiRequest::post("/discussions")
            .json(&serde_json::json!({ "title": "Week 3 questions" }))
            .unwrap();
        let body: serde_json::Value = client.send_json(&request).await.unwrap();

        mock.assert();
        assert_eq!(body["id"], "disc-1");
    }
}
