//! Provider configuration.
//!
//! The host hands the provider a JSON document once, in `Configure`. It is
//! validated against [`provider_config_schema`], unset keys are filled from
//! `BIGIP_*` environment variables, defaults are applied, and every problem
//! found along the way is reported together in one
//! [`ProviderError::Configuration`].

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::client::{ApiClient, AuthMethod, ClientSettings, Credentials};
use crate::error::{ConfigErrors, ProviderError};
use crate::retry::RetryPolicy;
use crate::schema::{Attribute, Schema, Validator};
use crate::validation::validate;

/// Default management port.
pub const DEFAULT_PORT: i64 = 443;
/// Default login provider for token auth.
pub const DEFAULT_LOGIN_REF: &str = "tmos";
/// Default single-request timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 30;
/// Default whole-operation deadline, in seconds.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: i64 = 300;
/// Default connect timeout, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: i64 = 10;

const MAX_RETRY_ATTEMPTS: i64 = 20;

/// Environment variables consulted for unset keys.
pub mod env {
    /// Management address.
    pub const HOST: &str = "BIGIP_HOST";
    /// Management port.
    pub const PORT: &str = "BIGIP_PORT";
    /// Username.
    pub const USER: &str = "BIGIP_USER";
    /// Password.
    pub const PASSWORD: &str = "BIGIP_PASSWORD";
    /// Enable token auth.
    pub const TOKEN_AUTH: &str = "BIGIP_TOKEN_AUTH";
    /// Login provider for token auth.
    pub const LOGIN_REF: &str = "BIGIP_LOGIN_REF";
}

/// Schema of the provider configuration block.
pub fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_description("Connection settings for the BigIP management interface")
        .with_attribute(
            "address",
            Attribute::optional_string()
                .with_description("Host or URL of the management interface (env BIGIP_HOST)")
                .with_validator(Validator::NonEmpty),
        )
        .with_attribute(
            "port",
            Attribute::optional_int64()
                .with_description("Management port (env BIGIP_PORT)")
                .with_default(Value::from(DEFAULT_PORT)),
        )
        .with_attribute(
            "username",
            Attribute::optional_string()
                .with_description("Username (env BIGIP_USER)")
                .with_validator(Validator::NonEmpty),
        )
        .with_attribute(
            "password",
            Attribute::optional_string()
                .with_description("Password (env BIGIP_PASSWORD)")
                .sensitive(),
        )
        .with_attribute(
            "token_auth",
            Attribute::optional_bool()
                .with_description("Authenticate with a token instead of basic auth (env BIGIP_TOKEN_AUTH)")
                .with_default(Value::Bool(false)),
        )
        .with_attribute(
            "login_ref",
            Attribute::optional_string()
                .with_description("Login provider used for token auth (env BIGIP_LOGIN_REF)")
                .with_default(Value::from(DEFAULT_LOGIN_REF)),
        )
        .with_attribute(
            "accept_self_signed",
            Attribute::optional_bool()
                .with_description("Accept certificates that fail verification")
                .with_default(Value::Bool(true)),
        )
        .with_attribute(
            "ca_cert_path",
            Attribute::optional_string().with_description("PEM bundle of extra trusted CAs"),
        )
        .with_attribute(
            "request_timeout_secs",
            Attribute::optional_int64()
                .with_default(Value::from(DEFAULT_REQUEST_TIMEOUT_SECS)),
        )
        .with_attribute(
            "operation_timeout_secs",
            Attribute::optional_int64()
                .with_description("Deadline for one resource operation, retries included")
                .with_default(Value::from(DEFAULT_OPERATION_TIMEOUT_SECS)),
        )
        .with_attribute(
            "connect_timeout_secs",
            Attribute::optional_int64()
                .with_default(Value::from(DEFAULT_CONNECT_TIMEOUT_SECS)),
        )
        .with_attribute(
            "retry_max_attempts",
            Attribute::optional_int64().with_default(Value::from(5)),
        )
        .with_attribute(
            "retry_base_delay_ms",
            Attribute::optional_int64().with_default(Value::from(1000)),
        )
        .with_attribute(
            "retry_max_delay_ms",
            Attribute::optional_int64().with_default(Value::from(16000)),
        )
        .with_attribute(
            "check_connectivity",
            Attribute::optional_bool()
                .with_description("Open a TCP connection to the BigIP during configure")
                .with_default(Value::Bool(false)),
        )
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    address: Option<String>,
    port: Option<i64>,
    username: Option<String>,
    password: Option<String>,
    token_auth: Option<bool>,
    login_ref: Option<String>,
    accept_self_signed: Option<bool>,
    ca_cert_path: Option<String>,
    request_timeout_secs: Option<i64>,
    operation_timeout_secs: Option<i64>,
    connect_timeout_secs: Option<i64>,
    retry_max_attempts: Option<i64>,
    retry_base_delay_ms: Option<i64>,
    retry_max_delay_ms: Option<i64>,
    check_connectivity: Option<bool>,
}

/// The effective provider configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Everything the API client needs.
    pub settings: ClientSettings,
    /// Probe the endpoint during configure.
    pub check_connectivity: bool,
}

impl ProviderConfig {
    /// Resolve from host JSON, falling back to the process environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |key| std::env::var(key).ok())
    }

    /// Resolve from host JSON with an explicit environment lookup.
    ///
    /// Pure: the same input and environment always give the same result.
    pub fn from_value_with_env<F>(config: &Value, env_lookup: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schema = provider_config_schema();
        let diagnostics = validate(&schema, config);
        if !diagnostics.is_empty() {
            let mut errors = ConfigErrors::default();
            for d in diagnostics {
                let field = d.attribute.unwrap_or_else(|| "config".to_string());
                errors.push(field, d.detail.unwrap_or(d.summary));
            }
            return Err(ProviderError::Configuration(errors));
        }

        let mut raw: RawConfig = if config.is_null() {
            RawConfig::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                ProviderError::configuration("config", format!("cannot decode: {}", e))
            })?
        };

        let mut errors = ConfigErrors::default();
        fill_from_env(&mut raw, &env_lookup, &mut errors);

        let address = required(raw.address.take(), "address", env::HOST, &mut errors);
        let username = required(raw.username.take(), "username", env::USER, &mut errors);
        let password = required(raw.password.take(), "password", env::PASSWORD, &mut errors);

        let port = raw.port.unwrap_or(DEFAULT_PORT);
        let port = match u16::try_from(port) {
            Ok(p) if p > 0 => Some(p),
            _ => {
                errors.push("port", format!("{} is outside 1-65535", port));
                None
            }
        };

        let base_url = match (&address, port) {
            (Some(address), Some(port)) => match endpoint_url(address, port) {
                Ok(url) => Some(url),
                Err(reason) => {
                    errors.push("address", reason);
                    None
                }
            },
            _ => None,
        };

        let ca_cert_path = raw.ca_cert_path.take().map(PathBuf::from);
        if let Some(path) = &ca_cert_path {
            if let Err(e) = std::fs::File::open(path) {
                errors.push(
                    "ca_cert_path",
                    format!("cannot read {}: {}", path.display(), e),
                );
            }
        }

        let request_timeout = seconds(
            raw.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
            "request_timeout_secs",
            &mut errors,
        );
        let operation_timeout = seconds(
            raw.operation_timeout_secs,
            DEFAULT_OPERATION_TIMEOUT_SECS,
            "operation_timeout_secs",
            &mut errors,
        );
        let connect_timeout = seconds(
            raw.connect_timeout_secs,
            DEFAULT_CONNECT_TIMEOUT_SECS,
            "connect_timeout_secs",
            &mut errors,
        );
        let retry = retry_policy(&raw, &mut errors);

        let auth = if raw.token_auth.unwrap_or(false) {
            AuthMethod::Token {
                login_provider: raw
                    .login_ref
                    .unwrap_or_else(|| DEFAULT_LOGIN_REF.to_string()),
            }
        } else {
            AuthMethod::Basic
        };

        errors.into_result()?;

        // Every Option below is Some once no violations were recorded.
        match (base_url, username, password) {
            (Some(base_url), Some(username), Some(password)) => Ok(Self {
                settings: ClientSettings {
                    base_url,
                    credentials: Credentials { username, password },
                    auth,
                    accept_self_signed: raw.accept_self_signed.unwrap_or(true),
                    ca_cert_path,
                    request_timeout,
                    connect_timeout,
                    operation_timeout,
                    retry,
                },
                check_connectivity: raw.check_connectivity.unwrap_or(false),
            }),
            _ => Err(ProviderError::configuration(
                "address",
                "endpoint could not be resolved",
            )),
        }
    }

    /// Build the shared API client, probing the endpoint first if requested.
    pub async fn connect(self) -> Result<ApiClient, ProviderError> {
        if self.check_connectivity {
            check_connectivity(&self.settings.base_url, self.settings.connect_timeout).await?;
        }
        let client = ApiClient::new(self.settings)?;
        info!(
            endpoint = %client.settings().base_url,
            username = %client.settings().credentials.username,
            token_auth = matches!(client.settings().auth, AuthMethod::Token { .. }),
            "BigIP client configured"
        );
        Ok(client)
    }
}

/// Resolve `config` and build the API client.
pub async fn resolve(config: &Value) -> Result<ApiClient, ProviderError> {
    ProviderConfig::from_value(config)?.connect().await
}

fn fill_from_env<F>(raw: &mut RawConfig, env_lookup: &F, errors: &mut ConfigErrors)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env_lookup(key).filter(|v| !v.trim().is_empty());

    if raw.address.is_none() {
        raw.address = lookup(env::HOST);
    }
    if raw.username.is_none() {
        raw.username = lookup(env::USER);
    }
    if raw.password.is_none() {
        raw.password = lookup(env::PASSWORD);
    }
    if raw.login_ref.is_none() {
        raw.login_ref = lookup(env::LOGIN_REF);
    }
    if raw.port.is_none() {
        if let Some(value) = lookup(env::PORT) {
            match value.trim().parse::<i64>() {
                Ok(port) => raw.port = Some(port),
                Err(_) => errors.push("port", format!("{}={:?} is not a number", env::PORT, value)),
            }
        }
    }
    if raw.token_auth.is_none() {
        if let Some(value) = lookup(env::TOKEN_AUTH) {
            match parse_bool(&value) {
                Some(flag) => raw.token_auth = Some(flag),
                None => errors.push(
                    "token_auth",
                    format!("{}={:?} is not a boolean", env::TOKEN_AUTH, value),
                ),
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn required(
    value: Option<String>,
    field: &str,
    env_var: &str,
    errors: &mut ConfigErrors,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.push(field, format!("is required (set it or {})", env_var));
            None
        }
    }
}

fn seconds(value: Option<i64>, default: i64, field: &str, errors: &mut ConfigErrors) -> Duration {
    let secs = value.unwrap_or(default);
    if secs < 1 {
        errors.push(field, format!("must be at least 1, got {}", secs));
        return Duration::from_secs(default as u64);
    }
    Duration::from_secs(secs as u64)
}

fn retry_policy(raw: &RawConfig, errors: &mut ConfigErrors) -> RetryPolicy {
    let mut policy = RetryPolicy::default();

    match raw.retry_max_attempts {
        Some(n) if !(1..=MAX_RETRY_ATTEMPTS).contains(&n) => errors.push(
            "retry_max_attempts",
            format!("must be between 1 and {}, got {}", MAX_RETRY_ATTEMPTS, n),
        ),
        Some(n) => policy.max_attempts = n as u32,
        None => {}
    }
    match raw.retry_base_delay_ms {
        Some(ms) if ms < 1 => errors.push(
            "retry_base_delay_ms",
            format!("must be at least 1, got {}", ms),
        ),
        Some(ms) => policy.base_delay = Duration::from_millis(ms as u64),
        None => {}
    }
    match raw.retry_max_delay_ms {
        Some(ms) if ms < 1 => errors.push(
            "retry_max_delay_ms",
            format!("must be at least 1, got {}", ms),
        ),
        Some(ms) => policy.max_delay = Duration::from_millis(ms as u64),
        None => {}
    }
    if policy.max_delay < policy.base_delay {
        errors.push(
            "retry_max_delay_ms",
            format!(
                "must not be below retry_base_delay_ms ({} < {})",
                policy.max_delay.as_millis(),
                policy.base_delay.as_millis()
            ),
        );
    }
    policy
}

/// Turn a host or URL into the management base URL.
///
/// Bare hosts get `https`. A port in the address wins over `port`.
fn endpoint_url(address: &str, port: u16) -> Result<Url, String> {
    let address = address.trim();
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("https://{}", address)
    };
    let mut url =
        Url::parse(&candidate).map_err(|e| format!("{:?} is not a valid host: {}", address, e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(format!(
                "unsupported scheme '{}', expected http or https",
                other
            ))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("{:?} has no host", address));
    }
    if url.port().is_none() && !has_explicit_default_port(address) {
        url.set_port(Some(port))
            .map_err(|_| format!("cannot set port on {:?}", address))?;
    }
    Ok(url)
}

fn has_explicit_default_port(address: &str) -> bool {
    let authority = address
        .split("://")
        .last()
        .unwrap_or(address)
        .split('/')
        .next()
        .unwrap_or("");
    match authority.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

async fn check_connectivity(url: &Url, timeout: Duration) -> Result<(), ProviderError> {
    let host = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url.port_or_known_default().unwrap_or(443);

    debug!(%host, port, "Checking BigIP connectivity");
    match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(ProviderError::configuration(
            "address",
            format!("cannot reach {}:{}: {}", host, port, e),
        )),
        Err(_) => Err(ProviderError::configuration(
            "address",
            format!(
                "timed out after {}s connecting to {}:{}",
                timeout.as_secs(),
                host,
                port
            ),
        )),
    }
}
