//! The BigIP provider.
//!
//! [`provider()`] builds an unconfigured [`BigipProvider`] without any I/O.
//! `Configure` resolves the connection settings and installs one shared
//! [`ApiClient`]; every resource operation after that runs against it under
//! the configured operation deadline.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::config::{self, provider_config_schema};
use crate::diff;
use crate::error::ProviderError;
use crate::resource::{required_str, ResourceClient, ResourceKind};
use crate::resources::ResourceRegistry;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

/// Build the provider. Performs no I/O.
pub fn provider() -> BigipProvider {
    BigipProvider::new(ResourceRegistry::ltm())
}

/// Provider for F5 BigIP LTM.
#[derive(Debug)]
pub struct BigipProvider {
    registry: ResourceRegistry,
    client: OnceLock<Arc<ApiClient>>,
}

impl BigipProvider {
    /// An unconfigured provider serving `registry`.
    pub fn new(registry: ResourceRegistry) -> Self {
        Self {
            registry,
            client: OnceLock::new(),
        }
    }

    /// A provider that is already configured with `client`.
    pub fn with_client(registry: ResourceRegistry, client: Arc<ApiClient>) -> Self {
        let provider = Self::new(registry);
        let _ = provider.client.set(client);
        provider
    }

    /// Whether `Configure` has succeeded.
    pub fn is_configured(&self) -> bool {
        self.client.get().is_some()
    }

    fn client(&self) -> Result<&ApiClient, ProviderError> {
        self.client
            .get()
            .map(Arc::as_ref)
            .ok_or(ProviderError::NotConfigured)
    }

    /// Run one resource operation under the operation deadline.
    ///
    /// Every API call the operation makes is bounded by the same instant; a
    /// call still in flight at expiry is dropped and fails with a
    /// timeout-classified error.
    async fn run<'a, T, F, Fut>(
        &'a self,
        operation: &'static str,
        resource_type: &str,
        f: F,
    ) -> Result<T, ProviderError>
    where
        F: FnOnce(ResourceClient<'a>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let api = self.client()?;
        let kind = self.registry.get(resource_type)?;
        let timeout = api.settings().operation_timeout;
        debug!(
            operation,
            resource_type,
            deadline_secs = timeout.as_secs_f64(),
            "Running resource operation"
        );

        let deadline = Instant::now() + timeout;
        f(ResourceClient::new(kind, api).with_deadline(deadline)).await
    }
}

fn into_object(value: Value, what: &str) -> Result<Map<String, Value>, ProviderError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ProviderError::Validation(format!(
            "{} must be an object, got {}",
            what, other
        ))),
    }
}

fn remote_id(kind: &dyn ResourceKind, state: &Map<String, Value>) -> Result<String, ProviderError> {
    match state.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        Some(id) => Ok(id.to_string()),
        None => required_str(state, kind.name_attribute()).map(str::to_string),
    }
}

fn check_desired(kind: &dyn ResourceKind, desired: &Map<String, Value>) -> Result<(), ProviderError> {
    let diagnostics = validate(&kind.schema(), &Value::Object(desired.clone()));
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| match &d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary.clone(),
        })
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors.join("; ")))
    }
}

#[async_trait::async_trait]
impl ProviderService for BigipProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry.provider_schema()
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::from_schema(
            &self.schema(),
            ServerCapabilities { plan_destroy: true },
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&provider_config_schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.is_configured() {
            warn!("Configure called on an already configured provider");
            return Ok(vec![Diagnostic::warning("Provider is already configured")
                .with_detail("The existing connection settings are kept.")]);
        }

        let client = config::resolve(&config).await?;
        if self.client.set(Arc::new(client)).is_err() {
            return Ok(vec![Diagnostic::warning("Provider is already configured")
                .with_detail("A concurrent Configure won; its settings are kept.")]);
        }
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!(configured = self.is_configured(), "Stopping BigIP provider");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let kind = self.registry.get(resource_type)?;
        Ok(validate(&kind.schema(), &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let kind = self.registry.get(resource_type)?;
        Ok(diff::plan(&kind.schema(), prior_state.as_ref(), &proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let desired = into_object(planned_state, "planned state")?;
        check_desired(self.registry.get(resource_type)?, &desired)?;

        let state = self
            .run("create", resource_type, |client| async move {
                client.create(&desired).await
            })
            .await?;
        Ok(state.into_value())
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let current = into_object(current_state, "current state")?;
        let id = remote_id(self.registry.get(resource_type)?, &current)?;
        debug!(resource_type, id = %id, "Refreshing resource");

        let state = self
            .run("read", resource_type, |client| async move {
                client.read(&id, &current).await
            })
            .await?;
        Ok(state.into_value())
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let prior = into_object(prior_state, "prior state")?;
        let desired = into_object(planned_state, "planned state")?;
        let kind = self.registry.get(resource_type)?;
        check_desired(kind, &desired)?;
        let id = remote_id(kind, &prior)?;

        let state = self
            .run("update", resource_type, |client| async move {
                client.update(&id, &prior, &desired).await
            })
            .await?;
        Ok(state.into_value())
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let current = into_object(current_state, "current state")?;
        let id = remote_id(self.registry.get(resource_type)?, &current)?;

        self.run("delete", resource_type, |client| async move {
            client.delete(&id, &current).await
        })
        .await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = self
            .run("import", resource_type, |client| async move {
                client.import(id).await
            })
            .await?;
        Ok(vec![ImportedResource::new(resource_type, state.into_value())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorKind;
    use crate::testing::test_settings;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn configured(uri: &str) -> BigipProvider {
        let client = ApiClient::new(test_settings(uri)).unwrap();
        BigipProvider::with_client(ResourceRegistry::ltm(), Arc::new(client))
    }

    fn node_object() -> Value {
        json!({
            "name": "n1",
            "partition": "Common",
            "fullPath": "/Common/n1",
            "address": "10.0.0.1",
            "connectionLimit": 0,
            "dynamicRatio": 1,
            "monitor": "default",
            "rateLimit": "disabled",
            "ratio": 1
        })
    }

    #[test]
    fn test_factory_is_unconfigured() {
        let p = provider();
        assert!(!p.is_configured());
        assert_eq!(p.schema().resources.len(), 5);
        assert!(p.metadata().capabilities.plan_destroy);
    }

    #[tokio::test]
    async fn test_operations_require_configure() {
        let p = provider();
        let err = p
            .read("bigip_ltm_node", json!({"id": "/Common/n1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn test_configure_failure_lists_violations() {
        let p = provider();
        let err = p
            .configure(json!({
                "address": "bigip.example.com",
                "username": "admin",
                "password": "",
                "port": 0
            }))
            .await
            .unwrap_err();
        match err {
            ProviderError::Configuration(errors) => {
                assert!(errors.mentions("port"));
                assert!(errors.mentions("password"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
        assert!(!p.is_configured());
    }

    #[tokio::test]
    async fn test_second_configure_warns() {
        let p = provider();
        let config = json!({
            "address": "https://bigip.example.com",
            "username": "admin",
            "password": "secret"
        });
        assert!(p.configure(config.clone()).await.unwrap().is_empty());
        let diagnostics = p.configure(config).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let p = provider();
        let err = p
            .validate_resource_config("bigip_gtm_pool", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let p = provider();
        let diagnostics = p
            .validate_resource_config(
                "bigip_ltm_pool",
                json!({"name": "web", "load_balancing_mode": "fastest"}),
            )
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_state() {
        let server = MockServer::start().await;
        let p = configured(&server.uri());
        let err = p
            .create("bigip_ltm_node", json!({"name": "/Common/n1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/node"))
            .respond_with(ResponseTemplate::new(200).set_body_json(node_object()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/node/~Common~n1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(node_object()))
            .mount(&server)
            .await;

        let p = configured(&server.uri());
        let created = p
            .create(
                "bigip_ltm_node",
                json!({"name": "/Common/n1", "address": "10.0.0.1"}),
            )
            .await
            .unwrap();
        assert_eq!(created["id"], "/Common/n1");
        assert_eq!(created["rate_limit"], "disabled");

        let read = p.read("bigip_ltm_node", created.clone()).await.unwrap();
        assert_eq!(created, read);
    }

    #[tokio::test]
    async fn test_operation_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(node_object())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut settings = test_settings(&server.uri());
        settings.operation_timeout = Duration::from_millis(100);
        let client = ApiClient::new(settings).unwrap();
        let p = BigipProvider::with_client(ResourceRegistry::ltm(), Arc::new(client));

        let err = p
            .read("bigip_ltm_node", json!({"id": "/Common/n1"}))
            .await
            .unwrap_err();
        match err {
            ProviderError::Api(api) => assert_eq!(api.kind, ApiErrorKind::Timeout),
            other => panic!("expected deadline error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_read_back_keeps_created_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/node"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "n1",
                "partition": "Common",
                "fullPath": "/Common/n1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(node_object())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut settings = test_settings(&server.uri());
        settings.operation_timeout = Duration::from_millis(300);
        let client = ApiClient::new(settings).unwrap();
        let p = BigipProvider::with_client(ResourceRegistry::ltm(), Arc::new(client));

        let err = p
            .create(
                "bigip_ltm_node",
                json!({"name": "/Common/n1", "address": "10.0.0.1"}),
            )
            .await
            .unwrap_err();
        match err {
            ProviderError::PartialFailure { remote_id, source } => {
                assert_eq!(remote_id, "/Common/n1");
                match *source {
                    ProviderError::Api(api) => assert_eq!(api.kind, ApiErrorKind::Timeout),
                    other => panic!("expected deadline error, got {:?}", other),
                }
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/node/~Common~n1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(node_object()))
            .expect(1)
            .mount(&server)
            .await;

        let p = configured(&server.uri());
        let imported = p.import_resource("bigip_ltm_node", "/Common/n1").await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "bigip_ltm_node");
        assert_eq!(imported[0].state["address"], "10.0.0.1");
    }

    #[tokio::test]
    async fn test_plan_replacement_on_address_change() {
        let p = provider();
        let prior = json!({"id": "/Common/n1", "name": "/Common/n1", "address": "10.0.0.1", "ratio": 1});
        let result = p
            .plan(
                "bigip_ltm_node",
                Some(prior),
                json!({"name": "/Common/n1", "address": "10.0.0.2"}),
                Value::Null,
            )
            .await
            .unwrap();
        assert!(result.requires_replace);
        assert_eq!(result.planned_state["ratio"], 1);
    }
}
