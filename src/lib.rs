//! Hemmer Provider for F5 BigIP
//!
//! This crate implements a Hemmer provider that manages F5 BigIP Local Traffic
//! Manager (LTM) objects through the iControl REST API. The host spawns the
//! provider binary, reads a handshake line from stdout, and drives it over
//! gRPC.
//!
//! # Overview
//!
//! - **Provider configuration** ([`config`]): address, credentials, TLS trust,
//!   timeouts and retry policy, with `BIGIP_*` environment fallbacks
//! - **REST client** ([`client`]): authenticated iControl REST calls with
//!   bounded exponential backoff
//! - **Resources** ([`resources`]): `bigip_ltm_node`, `bigip_ltm_pool`,
//!   `bigip_ltm_pool_member`, `bigip_ltm_monitor` and
//!   `bigip_ltm_virtual_server`
//! - **Server** ([`server`]): the gRPC adapter, handshake and graceful
//!   shutdown
//! - **Logging** ([`logging`]): `tracing` subscriber writing to stderr, a
//!   file, or syslog
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_bigip::{provider, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     hemmer_provider_bigip::try_init_logging();
//!     serve(provider()).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it outputs a handshake string to
//! stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`
//!
//! # Provider Protocol
//!
//! - **GetMetadata**: Returns provider capabilities and resource type names
//! - **GetSchema**: Returns the provider config schema and every resource schema
//! - **ValidateProviderConfig**: Validates provider configuration
//! - **Configure**: Builds the authenticated BigIP client
//! - **Stop**: Gracefully shuts down the provider
//! - **ValidateResourceConfig**: Validates resource configuration
//! - **Plan**: Calculates required changes
//! - **Create/Read/Update/Delete**: CRUD operations against iControl REST
//! - **ImportResourceState**: Imports existing LTM objects by full path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use client::{ApiClient, AuthMethod, ClientSettings, Credentials};
pub use config::ProviderConfig;
pub use error::{ApiError, ApiErrorKind, ProviderError};
pub use logging::{
    init_logging, try_init_logging, FileRotation, LogFormat, LogSink, LoggingConfig, LoggingError,
    DEFAULT_MAX_LOG_FILES,
};
pub use provider::{provider, BigipProvider};
pub use resources::ResourceRegistry;
pub use retry::RetryPolicy;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;
