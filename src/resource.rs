//! Generic resource client.
//!
//! Every BigIP object type is described by a [`ResourceKind`]: its schema,
//! the REST collection it lives in, and a declarative attribute to API field
//! mapping. [`ResourceClient`] drives create/read/update/delete/import for
//! any kind against the shared [`ApiClient`].
//!
//! State returned to the host is always built from an API read. Create and
//! update re-read the object before returning.

use std::fmt;
use std::future::Future;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::diff::payload_delta;
use crate::error::{ApiError, ProviderError};
use crate::schema::{is_full_path, Attribute, AttributeType, Schema};

/// Root of the LTM REST namespace.
pub const LTM: &str = "/mgmt/tm/ltm";

/// Encode a full path for use in a URL: `/Common/web` becomes `~Common~web`.
pub fn encode_full_path(path: &str) -> String {
    path.replace('/', "~")
}

/// How an attribute value is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Same value on both sides.
    Identity,
    /// `bool` ↔ `"yes"`/`"no"`.
    YesNo,
    /// `bool` ↔ `"enabled"`/`"disabled"`.
    EnabledDisabled,
    /// Set of monitor paths ↔ `"/Common/http and /Common/tcp"`.
    MonitorRule,
    /// String ↔ `{"type": "<string>"}`.
    TypeObject,
}

impl Conversion {
    /// Attribute value to API value.
    pub fn to_api(self, value: &Value) -> Value {
        match self {
            Self::Identity => value.clone(),
            Self::YesNo => match value.as_bool() {
                Some(true) => Value::from("yes"),
                Some(false) => Value::from("no"),
                None => value.clone(),
            },
            Self::EnabledDisabled => match value.as_bool() {
                Some(true) => Value::from("enabled"),
                Some(false) => Value::from("disabled"),
                None => value.clone(),
            },
            Self::MonitorRule => match value.as_array() {
                Some(items) => {
                    let mut monitors: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                    monitors.sort_unstable();
                    monitors.dedup();
                    Value::from(monitors.join(" and "))
                }
                None => value.clone(),
            },
            Self::TypeObject => match value.as_str() {
                Some(kind) => serde_json::json!({ "type": kind }),
                None => value.clone(),
            },
        }
    }

    /// API value to attribute value.
    pub fn from_api(self, value: &Value) -> Value {
        match self {
            Self::Identity => value.clone(),
            Self::YesNo => match value.as_str() {
                Some(s) => Value::Bool(s == "yes"),
                None => value.clone(),
            },
            Self::EnabledDisabled => match value.as_str() {
                Some(s) => Value::Bool(s.ends_with("enabled")),
                None => value.clone(),
            },
            Self::MonitorRule => match value.as_str() {
                Some(rule) => {
                    let mut monitors: Vec<&str> = rule
                        .split(" and ")
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .collect();
                    monitors.sort_unstable();
                    monitors.dedup();
                    Value::from(monitors)
                }
                None => value.clone(),
            },
            Self::TypeObject => value.get("type").cloned().unwrap_or(Value::Null),
        }
    }
}

/// Maps one attribute to one API field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Attribute name in state.
    pub attribute: &'static str,
    /// Field name in the iControl REST object.
    pub api: &'static str,
    /// Value conversion between the two.
    pub conversion: Conversion,
}

impl Field {
    /// A field with [`Conversion::Identity`].
    pub const fn new(attribute: &'static str, api: &'static str) -> Self {
        Self::with(attribute, api, Conversion::Identity)
    }

    /// A field with an explicit conversion.
    pub const fn with(attribute: &'static str, api: &'static str, conversion: Conversion) -> Self {
        Self {
            attribute,
            api,
            conversion,
        }
    }
}

/// A BigIP object type.
pub trait ResourceKind: Send + Sync + 'static {
    /// Host-facing type name, such as `bigip_ltm_pool`.
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Attribute ↔ API field mappings, excluding the name.
    fn fields(&self) -> &'static [Field];

    /// REST collection for objects of this kind.
    ///
    /// `attributes` is the desired or current state; scoped kinds read their
    /// scope from it.
    fn collection_path(&self, attributes: &Map<String, Value>) -> Result<String, ProviderError>;

    /// Attribute holding the object's full path.
    fn name_attribute(&self) -> &'static str {
        "name"
    }

    /// Attribute that scopes the object (e.g. the owning pool), if any.
    fn scope_attribute(&self) -> Option<&'static str> {
        None
    }

    /// Parse an import id into the attributes needed to read the object.
    ///
    /// Unscoped kinds take a full path. Scoped kinds take `scope|full_path`.
    fn parse_import_id(&self, id: &str) -> Result<Map<String, Value>, ProviderError> {
        let mut attributes = Map::new();
        let name = match self.scope_attribute() {
            Some(scope) => {
                let (scope_value, name) = id.split_once('|').ok_or_else(|| {
                    ProviderError::Validation(format!(
                        "import id for {} must look like <{}>|<full path>, got {:?}",
                        self.type_name(),
                        scope,
                        id
                    ))
                })?;
                if !is_full_path(scope_value) {
                    return Err(ProviderError::Validation(format!(
                        "{} in import id must be a full path, got {:?}",
                        scope, scope_value
                    )));
                }
                attributes.insert(scope.to_string(), Value::from(scope_value));
                name
            }
            None => id,
        };
        if !is_full_path(name.split(':').next().unwrap_or(name)) {
            return Err(ProviderError::Validation(format!(
                "import id must contain a full path like /Common/name, got {:?}",
                name
            )));
        }
        attributes.insert(self.name_attribute().to_string(), Value::from(name));
        Ok(attributes)
    }

    /// URL path of a single object.
    fn object_path(
        &self,
        remote_id: &str,
        attributes: &Map<String, Value>,
    ) -> Result<String, ProviderError> {
        Ok(format!(
            "{}/{}",
            self.collection_path(attributes)?,
            encode_full_path(remote_id)
        ))
    }
}

/// Read a string attribute that must be present.
pub fn required_str<'a>(
    attributes: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, ProviderError> {
    attributes
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::Validation(format!("attribute '{}' is required", name)))
}

/// State of a remote object as last read from the API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteState {
    /// Full path of the object.
    pub id: String,
    /// Attribute values, including `id`.
    pub attributes: Map<String, Value>,
}

impl RemoteState {
    /// The state as the host sees it.
    pub fn into_value(self) -> Value {
        Value::Object(self.attributes)
    }
}

/// Where a resource is in its lifecycle. Only `Present` is trusted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not on the BigIP.
    Absent,
    /// POST sent, not yet read back.
    Creating,
    /// Read back from the API.
    Present,
    /// PATCH sent, not yet read back.
    Updating,
    /// DELETE sent.
    Deleting,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Present => "present",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        f.write_str(name)
    }
}

/// Drives CRUD for one resource kind.
pub struct ResourceClient<'a> {
    kind: &'a dyn ResourceKind,
    api: &'a ApiClient,
    deadline: Option<Instant>,
}

impl<'a> ResourceClient<'a> {
    /// Bind a kind to the shared API client.
    pub fn new(kind: &'a dyn ResourceKind, api: &'a ApiClient) -> Self {
        Self {
            kind,
            api,
            deadline: None,
        }
    }

    /// Fail every API call that is still running at `deadline`.
    ///
    /// The deadline is checked per call so that a create whose POST already
    /// succeeded still reports the remote id.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Create the object, then read it back.
    ///
    /// If the POST succeeds but the read-back fails, the error is
    /// [`ProviderError::PartialFailure`] carrying the remote id.
    pub async fn create(&self, desired: &Map<String, Value>) -> Result<RemoteState, ProviderError> {
        let name = required_str(desired, self.kind.name_attribute())?;
        let collection = self.kind.collection_path(desired)?;
        let schema = self.kind.schema();

        let mut payload = self.field_payload(&schema, desired);
        payload.insert("name".to_string(), Value::from(name));

        self.transition(name, LifecycleState::Absent, LifecycleState::Creating);
        let response = self
            .within("create", self.api.post(&collection, &Value::Object(payload)))
            .await?;

        let remote_id = response
            .get("fullPath")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();

        match self.read(&remote_id, desired).await {
            Ok(state) => {
                self.transition(&remote_id, LifecycleState::Creating, LifecycleState::Present);
                Ok(state)
            }
            Err(source) => {
                warn!(
                    resource_type = self.kind.type_name(),
                    remote_id = %remote_id,
                    error = %source,
                    "Created object could not be read back"
                );
                Err(ProviderError::PartialFailure {
                    remote_id,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Read the object. A missing object is [`ProviderError::NotFound`].
    pub async fn read(
        &self,
        remote_id: &str,
        context: &Map<String, Value>,
    ) -> Result<RemoteState, ProviderError> {
        let path = self.kind.object_path(remote_id, context)?;
        let object = self.within("read", self.api.get(&path)).await?;
        Ok(self.state_from_api(remote_id, &object, context))
    }

    /// PATCH only the fields that differ, then read back.
    ///
    /// Optional attributes dropped from the configuration are written as
    /// their cleared value. No request is written when nothing differs.
    pub async fn update(
        &self,
        remote_id: &str,
        prior: &Map<String, Value>,
        desired: &Map<String, Value>,
    ) -> Result<RemoteState, ProviderError> {
        let schema = self.kind.schema();
        let mut delta = payload_delta(
            &self.field_payload(&schema, prior),
            &self.field_payload(&schema, desired),
        );
        delta.extend(self.cleared_fields(&schema, prior, desired));

        if delta.is_empty() {
            debug!(
                resource_type = self.kind.type_name(),
                remote_id,
                "No API fields differ, skipping write"
            );
            return self.read(remote_id, desired).await;
        }

        let path = self.kind.object_path(remote_id, desired)?;
        self.transition(remote_id, LifecycleState::Present, LifecycleState::Updating);
        debug!(
            resource_type = self.kind.type_name(),
            remote_id,
            fields = ?delta.keys().collect::<Vec<_>>(),
            "Patching object"
        );
        self.within("update", self.api.patch(&path, &Value::Object(delta)))
            .await?;

        let state = self.read(remote_id, desired).await?;
        self.transition(remote_id, LifecycleState::Updating, LifecycleState::Present);
        Ok(state)
    }

    /// Delete the object. An already missing object counts as deleted.
    pub async fn delete(
        &self,
        remote_id: &str,
        context: &Map<String, Value>,
    ) -> Result<(), ProviderError> {
        let path = self.kind.object_path(remote_id, context)?;
        self.transition(remote_id, LifecycleState::Present, LifecycleState::Deleting);
        match self.within("delete", self.api.delete(&path)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(
                    resource_type = self.kind.type_name(),
                    remote_id, "Object already gone"
                );
            }
            Err(err) => return Err(err),
        }
        self.transition(remote_id, LifecycleState::Deleting, LifecycleState::Absent);
        Ok(())
    }

    /// Read an existing object identified by an import id.
    pub async fn import(&self, id: &str) -> Result<RemoteState, ProviderError> {
        let context = self.kind.parse_import_id(id)?;
        let remote_id = required_str(&context, self.kind.name_attribute())?.to_string();
        self.read(&remote_id, &context).await
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        let Some(deadline) = self.deadline else {
            return call.await;
        };
        match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    resource_type = self.kind.type_name(),
                    "Operation deadline exceeded"
                );
                Err(ApiError::deadline(format!(
                    "{} of {} did not finish before the operation deadline",
                    operation,
                    self.kind.type_name()
                ))
                .into())
            }
        }
    }

    /// API fields for optional attributes set in `prior` but not in `desired`.
    fn cleared_fields(
        &self,
        schema: &Schema,
        prior: &Map<String, Value>,
        desired: &Map<String, Value>,
    ) -> Map<String, Value> {
        let is_set = |attrs: &Map<String, Value>, name: &str| {
            attrs.get(name).is_some_and(|v| !v.is_null())
        };
        self.kind
            .fields()
            .iter()
            .filter(|field| is_set(prior, field.attribute) && !is_set(desired, field.attribute))
            .filter_map(|field| {
                let attr = schema.attribute(field.attribute)?;
                if !attr.flags.is_configurable() || attr.flags.computed {
                    return None;
                }
                let cleared = cleared_value(&attr.attr_type)?;
                Some((field.api.to_string(), cleared))
            })
            .collect()
    }

    fn field_payload(&self, schema: &Schema, attributes: &Map<String, Value>) -> Map<String, Value> {
        self.kind
            .fields()
            .iter()
            .filter(|field| {
                schema
                    .attribute(field.attribute)
                    .is_some_and(|a| a.flags.is_configurable())
            })
            .filter_map(|field| {
                let value = attributes.get(field.attribute).filter(|v| !v.is_null())?;
                Some((field.api.to_string(), field.conversion.to_api(value)))
            })
            .collect()
    }

    fn state_from_api(
        &self,
        requested_id: &str,
        object: &Value,
        context: &Map<String, Value>,
    ) -> RemoteState {
        let id = object
            .get("fullPath")
            .and_then(Value::as_str)
            .unwrap_or(requested_id)
            .to_string();

        let schema = self.kind.schema();
        let mut attributes = Map::new();
        attributes.insert("id".to_string(), Value::from(id.as_str()));
        attributes.insert(
            self.kind.name_attribute().to_string(),
            Value::from(id.as_str()),
        );
        for field in self.kind.fields() {
            if let Some(value) = object.get(field.api).filter(|v| !v.is_null()) {
                let converted = field.conversion.from_api(value);
                if !converted.is_null() && !is_cleared(schema.attribute(field.attribute), &converted) {
                    attributes.insert(field.attribute.to_string(), converted);
                }
            }
        }
        if let Some(scope) = self.kind.scope_attribute() {
            if let Some(value) = context.get(scope).filter(|v| !v.is_null()) {
                attributes.insert(scope.to_string(), value.clone());
            }
        }

        RemoteState { id, attributes }
    }

    fn transition(&self, id: &str, from: LifecycleState, to: LifecycleState) {
        info!(
            resource_type = self.kind.type_name(),
            id,
            %from,
            %to,
            "Resource state transition"
        );
    }
}

/// The API value that unsets an optional attribute of this type.
fn cleared_value(attr_type: &AttributeType) -> Option<Value> {
    match attr_type {
        AttributeType::String => Some(Value::from("")),
        _ => None,
    }
}

/// An empty string read back for an optional attribute means unset.
fn is_cleared(attr: Option<&Attribute>, value: &Value) -> bool {
    attr.is_some_and(|a| !a.flags.computed && !a.flags.required)
        && value.as_str().is_some_and(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Pool, PoolMember};
    use crate::testing::test_settings;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn pool_object(description: &str) -> Value {
        json!({
            "kind": "tm:ltm:pool:poolstate",
            "name": "web",
            "partition": "Common",
            "fullPath": "/Common/web",
            "loadBalancingMode": "round-robin",
            "monitor": "/Common/http and /Common/tcp ",
            "description": description,
            "allowNat": "yes"
        })
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Conversion::YesNo.to_api(&json!(true)), json!("yes"));
        assert_eq!(Conversion::YesNo.from_api(&json!("no")), json!(false));
        assert_eq!(Conversion::EnabledDisabled.to_api(&json!(false)), json!("disabled"));
        assert_eq!(Conversion::EnabledDisabled.from_api(&json!("enabled")), json!(true));
        assert_eq!(
            Conversion::MonitorRule.to_api(&json!(["/Common/tcp", "/Common/http"])),
            json!("/Common/http and /Common/tcp")
        );
        assert_eq!(
            Conversion::MonitorRule.from_api(&json!("/Common/tcp and /Common/http ")),
            json!(["/Common/http", "/Common/tcp"])
        );
        assert_eq!(Conversion::TypeObject.to_api(&json!("automap")), json!({"type": "automap"}));
        assert_eq!(Conversion::TypeObject.from_api(&json!({"type": "none"})), json!("none"));
    }

    #[test]
    fn test_encode_full_path() {
        assert_eq!(encode_full_path("/Common/web"), "~Common~web");
        assert_eq!(encode_full_path("/Common/10.0.0.1:80"), "~Common~10.0.0.1:80");
    }

    #[test]
    fn test_import_id_parsing() {
        let attrs = Pool.parse_import_id("/Common/web").unwrap();
        assert_eq!(attrs.get("name"), Some(&json!("/Common/web")));
        assert!(Pool.parse_import_id("web").is_err());

        let attrs = PoolMember
            .parse_import_id("/Common/web|/Common/10.0.0.1:80")
            .unwrap();
        assert_eq!(attrs.get("pool"), Some(&json!("/Common/web")));
        assert_eq!(attrs.get("name"), Some(&json!("/Common/10.0.0.1:80")));
        assert!(PoolMember.parse_import_id("/Common/10.0.0.1:80").is_err());
    }

    #[tokio::test]
    async fn test_create_reads_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mgmt/tm/ltm/pool"))
            .and(body_json(json!({
                "name": "/Common/web",
                "monitor": "/Common/http and /Common/tcp",
                "description": "web tier"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("web tier")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("web tier")))
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let client = ResourceClient::new(&Pool, &api);
        let desired = obj(json!({
            "name": "/Common/web",
            "monitors": ["/Common/tcp", "/Common/http"],
            "description": "web tier"
        }));

        let created = client.create(&desired).await.unwrap();
        assert_eq!(created.id, "/Common/web");
        assert_eq!(created.attributes["load_balancing_mode"], "round-robin");
        assert_eq!(created.attributes["allow_nat"], true);
        assert_eq!(
            created.attributes["monitors"],
            json!(["/Common/http", "/Common/tcp"])
        );

        let read = client.read(&created.id, &desired).await.unwrap();
        assert_eq!(created, read);
    }

    #[tokio::test]
    async fn test_update_without_differences_issues_no_write() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("web tier")))
            .expect(2)
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let client = ResourceClient::new(&Pool, &api);
        let current = client.read("/Common/web", &Map::new()).await.unwrap();

        let updated = client
            .update("/Common/web", &current.attributes, &current.attributes)
            .await
            .unwrap();
        assert_eq!(updated, current);
    }

    #[tokio::test]
    async fn test_update_patches_only_delta() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .and(body_json(json!({"description": "new"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("new")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("new")))
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let client = ResourceClient::new(&Pool, &api);
        let prior = obj(json!({
            "id": "/Common/web",
            "name": "/Common/web",
            "monitors": ["/Common/http", "/Common/tcp"],
            "description": "old",
            "load_balancing_mode": "round-robin"
        }));
        let mut desired = prior.clone();
        desired.insert("description".into(), json!("new"));

        let state = client.update("/Common/web", &prior, &desired).await.unwrap();
        assert_eq!(state.attributes["description"], "new");
    }

    #[tokio::test]
    async fn test_update_clears_removed_optional_attribute() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .and(body_json(json!({"description": ""})))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pool_object("")))
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let client = ResourceClient::new(&Pool, &api);
        let prior = obj(json!({
            "id": "/Common/web",
            "name": "/Common/web",
            "monitors": ["/Common/http", "/Common/tcp"],
            "description": "old",
            "load_balancing_mode": "round-robin"
        }));
        let mut desired = prior.clone();
        desired.remove("description");

        let state = client.update("/Common/web", &prior, &desired).await.unwrap();
        assert!(!state.attributes.contains_key("description"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 404,
                "message": "01020036:3: The requested Pool (/Common/web) was not found."
            })))
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let client = ResourceClient::new(&Pool, &api);
        client.delete("/Common/web", &Map::new()).await.unwrap();
        client.delete("/Common/web", &Map::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 404, "message": "not found"})))
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let err = ResourceClient::new(&Pool, &api)
            .read("/Common/web", &Map::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_scoped_member_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mgmt/tm/ltm/pool/~Common~web/members/~Common~10.0.0.1:80"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "10.0.0.1:80",
                "fullPath": "/Common/10.0.0.1:80",
                "address": "10.0.0.1",
                "ratio": 1,
                "session": "monitor-enabled"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(test_settings(&server.uri())).unwrap();
        let state = ResourceClient::new(&PoolMember, &api)
            .import("/Common/web|/Common/10.0.0.1:80")
            .await
            .unwrap();
        assert_eq!(state.attributes["pool"], "/Common/web");
        assert_eq!(state.attributes["address"], "10.0.0.1");
        assert_eq!(state.attributes["ratio"], 1);
        assert!(state.attributes.get("session").is_none());
    }

    /// Reads one HTTP request off `socket`, headers and body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        use tokio::io::AsyncReadExt;

        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    #[tokio::test]
    async fn test_read_back_failure_is_partial_failure() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    if request.starts_with("POST") {
                        let body = r#"{"name":"42","partition":"Common","fullPath":"/Common/42"}"#;
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    // Reads are answered by closing the connection.
                });
            }
        });

        let api = ApiClient::new(test_settings(&format!("http://{}", addr))).unwrap();
        let client = ResourceClient::new(&Pool, &api);
        let err = client
            .create(&obj(json!({"name": "/Common/42"})))
            .await
            .unwrap_err();

        match err {
            ProviderError::PartialFailure { remote_id, source } => {
                assert_eq!(remote_id, "/Common/42");
                assert!(matches!(*source, ProviderError::Api(_)));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }
}
