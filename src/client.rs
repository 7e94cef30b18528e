//! BigIP iControl REST client.
//!
//! [`ApiClient`] wraps a single connection-pooling `reqwest::Client` and is
//! shared by every resource operation. It is safe to use concurrently without
//! external locking. Transient failures (timeouts, connection errors, 5xx) are
//! retried per the configured [`RetryPolicy`]; 4xx responses are returned
//! immediately with the remote error payload attached.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder, Url};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiErrorKind, ProviderError};
use crate::retry::RetryPolicy;

/// Path of the token login endpoint.
const LOGIN_PATH: &str = "/mgmt/shared/authn/login";

/// Header carrying the auth token when token auth is enabled.
const TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// How requests are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// HTTP basic auth on every request.
    Basic,
    /// Token obtained once from the login endpoint.
    Token {
        /// Login provider reference, `tmos` for local users.
        login_provider: String,
    },
}

/// Username and password for the BigIP.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// BigIP user.
    pub username: String,
    /// BigIP password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The effective, fully resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Scheme, host and port of the management interface.
    pub base_url: Url,
    /// Login credentials.
    pub credentials: Credentials,
    /// Authentication method.
    pub auth: AuthMethod,
    /// Accept certificates that fail verification (BigIP ships self-signed).
    pub accept_self_signed: bool,
    /// Extra PEM bundle to trust.
    pub ca_cert_path: Option<PathBuf>,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Deadline for a whole resource operation, retries included.
    pub operation_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

/// Shared client for the BigIP REST API.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    settings: ClientSettings,
    token: OnceCell<String>,
}

impl ApiClient {
    /// Build a client. TLS trust is fixed here for the client's lifetime.
    ///
    /// No network I/O happens until the first request.
    pub fn new(settings: ClientSettings) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("hemmer-provider-bigip/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(settings.accept_self_signed);

        if let Some(path) = &settings.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                ProviderError::configuration(
                    "ca_cert_path",
                    format!("cannot read {}: {}", path.display(), e),
                )
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ProviderError::configuration("ca_cert_path", format!("invalid PEM bundle: {}", e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| ProviderError::configuration("tls", e.to_string()))?;

        Ok(Self {
            http,
            settings,
            token: OnceCell::new(),
        })
    }

    /// The settings this client was built from.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// GET a JSON document.
    pub async fn get(&self, path: &str) -> Result<Value, ProviderError> {
        self.call(Method::GET, path, None).await
    }

    /// POST a JSON document, returning the response document.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        self.call(Method::POST, path, Some(body)).await
    }

    /// PATCH a partial JSON document, returning the response document.
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        self.call(Method::PATCH, path, Some(body)).await
    }

    /// DELETE an object.
    pub async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.call(Method::DELETE, path, None).await.map(|_| ())
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let url = self
            .settings
            .base_url
            .join(path)
            .map_err(|e| ApiError::new(ApiErrorKind::Rejected, format!("bad path {}: {}", path, e)))?;

        let retry = &self.settings.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(method.clone(), url.clone(), body).await {
                Ok(value) => {
                    debug!(%method, path, attempt, "BigIP request succeeded");
                    return Ok(value);
                }
                Err(mut err) => {
                    err.attempts = attempt;
                    if err.is_retryable() && retry.should_retry(attempt) {
                        let delay = retry.delay_for(attempt);
                        warn!(
                            %method,
                            path,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient BigIP API failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    debug!(%method, path, attempt, error = %err, "BigIP request failed");
                    return Err(err.into());
                }
            }
        }
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value, ApiError> {
        let mut request = self
            .http
            .request(method, url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        request = self.authorize(request).await?;
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify)?;
        read_response(response).await
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let creds = &self.settings.credentials;
        match &self.settings.auth {
            AuthMethod::Basic => Ok(request.basic_auth(&creds.username, Some(&creds.password))),
            AuthMethod::Token { login_provider } => {
                // TODO: refresh on 401 once applies outlive the 20 minute token lifetime.
                let token = self
                    .token
                    .get_or_try_init(|| self.login(login_provider))
                    .await?;
                Ok(request.header(TOKEN_HEADER, token.as_str()))
            }
        }
    }

    async fn login(&self, login_provider: &str) -> Result<String, ApiError> {
        let url = self
            .settings
            .base_url
            .join(LOGIN_PATH)
            .map_err(|e| ApiError::new(ApiErrorKind::Rejected, e.to_string()))?;
        let creds = &self.settings.credentials;
        let body = json!({
            "username": creds.username,
            "password": creds.password,
            "loginProviderName": login_provider,
        });

        debug!(username = %creds.username, login_provider, "Requesting BigIP auth token");
        let response = self.http.post(url).json(&body).send().await.map_err(classify)?;
        let payload = read_response(response).await?;
        payload
            .pointer("/token/token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::new(ApiErrorKind::Decode, "login response has no token"))
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(classify)?;
    let parsed: Option<Value> = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };

    if status.is_success() {
        return match parsed {
            Some(value) => Ok(value),
            None if bytes.is_empty() => Ok(Value::Null),
            None => Err(ApiError::new(
                ApiErrorKind::Decode,
                format!("HTTP {} response is not JSON", status.as_u16()),
            )),
        };
    }

    let body = parsed.or_else(|| {
        (!bytes.is_empty()).then(|| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    });
    Err(ApiError::from_status(status.as_u16(), body))
}

fn classify(err: reqwest::Error) -> ApiError {
    let kind = if err.is_timeout() {
        ApiErrorKind::Timeout
    } else if err.is_decode() {
        ApiErrorKind::Decode
    } else if err.is_builder() {
        ApiErrorKind::Rejected
    } else {
        ApiErrorKind::Connection
    };
    ApiError::new(kind, error_chain(&err))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;
    use std::time::Instant;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"fullPath": "/Common/web"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_settings(&server.uri())).unwrap();
        let started = Instant::now();
        let value = client.get("/mgmt/tm/ltm/pool/~Common~web").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(value["fullPath"], "/Common/web");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);

        let retry = client.settings().retry;
        assert!(retry.delay_for(1) < retry.delay_for(2));
        assert!(elapsed >= retry.delay_for(1) + retry.delay_for(2));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/pool"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "message": "01020066:3: The requested Pool (/Common/web) already exists.",
                "errorStack": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_settings(&server.uri())).unwrap();
        let err = client
            .post("/mgmt/tm/ltm/pool", &json!({"name": "/Common/web"}))
            .await
            .unwrap_err();

        match err {
            ProviderError::Api(api) => {
                assert_eq!(api.kind, ApiErrorKind::Rejected);
                assert_eq!(api.status, Some(400));
                assert_eq!(api.attempts, 1);
                assert!(api.message.contains("already exists"));
                assert_eq!(api.body.unwrap()["code"], 400);
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn not_found_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 404,
                "message": "01020036:3: The requested Node (/Common/gone) was not found."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_settings(&server.uri())).unwrap();
        let err = client.get("/mgmt/tm/ltm/node/~Common~gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let settings = test_settings(&server.uri());
        let max_attempts = settings.retry.max_attempts;
        let client = ApiClient::new(settings).unwrap();
        let err = client.get("/mgmt/tm/ltm/node").await.unwrap_err();

        match err {
            ProviderError::Api(api) => {
                assert_eq!(api.kind, ApiErrorKind::Server);
                assert_eq!(api.attempts, max_attempts);
                assert_eq!(api.body, Some(Value::String("upstream exploded".into())));
            }
            other => panic!("expected API error, got {:?}", other),
        }
        assert_eq!(
            server.received_requests().await.unwrap().len() as u32,
            max_attempts
        );
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut settings = test_settings(&server.uri());
        settings.request_timeout = Duration::from_millis(50);
        settings.retry = RetryPolicy::none();
        let client = ApiClient::new(settings).unwrap();

        match client.get("/mgmt/tm/ltm/node").await.unwrap_err() {
            ProviderError::Api(api) => assert_eq!(api.kind, ApiErrorKind::Timeout),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn refused_connections_are_connection_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut settings = test_settings(&format!("http://{}", addr));
        settings.retry.max_attempts = 2;
        let client = ApiClient::new(settings).unwrap();

        match client.get("/mgmt/tm/ltm/node").await.unwrap_err() {
            ProviderError::Api(api) => {
                assert_eq!(api.kind, ApiErrorKind::Connection);
                assert_eq!(api.attempts, 2);
            }
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn basic_auth_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_settings(&server.uri())).unwrap();
        client.delete("/mgmt/tm/ltm/node/~Common~n1").await.unwrap();
    }

    #[tokio::test]
    async fn token_auth_logs_in_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({
                "username": "admin",
                "password": "secret",
                "loginProviderName": "tmos"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"token": {"token": "T0KEN"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool"))
            .and(header(TOKEN_HEADER, "T0KEN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(2)
            .mount(&server)
            .await;

        let mut settings = test_settings(&server.uri());
        settings.auth = AuthMethod::Token {
            login_provider: "tmos".to_string(),
        };
        let client = ApiClient::new(settings).unwrap();

        client.get("/mgmt/tm/ltm/pool").await.unwrap();
        client.get("/mgmt/tm/ltm/pool").await.unwrap();
    }

    #[tokio::test]
    async fn non_json_success_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(test_settings(&server.uri())).unwrap();
        match client.get("/mgmt/tm/ltm/node").await.unwrap_err() {
            ProviderError::Api(api) => assert_eq!(api.kind, ApiErrorKind::Decode),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn missing_ca_bundle_is_configuration_error() {
        let mut settings = test_settings("https://bigip.example.com");
        settings.ca_cert_path = Some(PathBuf::from("/nonexistent/ca.pem"));
        let err = ApiClient::new(settings).unwrap_err();
        match err {
            ProviderError::Configuration(errors) => assert!(errors.mentions("ca_cert_path")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}
