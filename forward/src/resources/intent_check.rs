//! Intent check resource implementation

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder, StringKind};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::{import_state_passthrough_id, split_import_id};

use crate::api::intent_checks::{CheckDefinition, CheckResult, NewCheckRequest};
use crate::provider_data::{from_configure, unconfigured_provider, Component};
use crate::ForwardProviderData;

#[derive(Default)]
pub struct IntentCheckResource {
    provider_data: Option<ForwardProviderData>,
}

impl IntentCheckResource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn definition_path() -> AttributePath {
    AttributePath::new("definition_json")
}

/// Parse definition_json into the object sent to the API
fn parse_definition(value: Option<&Dynamic>) -> Result<CheckDefinition, Diagnostic> {
    let Some(Dynamic::String(raw)) = value else {
        return Err(
            Diagnostic::error("Missing Definition", "definition_json must be provided.")
                .with_attribute(definition_path()),
        );
    };

    serde_json::from_str::<CheckDefinition>(raw).map_err(|e| {
        Diagnostic::error("Invalid Definition JSON", e.to_string())
            .with_attribute(definition_path())
    })
}

/// Optional bools are only sent when set
fn optional_bool(config: &DynamicValue, name: &str) -> Option<bool> {
    config.get_bool(&AttributePath::new(name)).ok()
}

fn build_check_request(
    plan: &DynamicValue,
    definition: CheckDefinition,
) -> NewCheckRequest {
    NewCheckRequest {
        definition: Some(definition),
        enabled: optional_bool(plan, "enabled"),
        name: plan
            .get_string(&AttributePath::new("name"))
            .unwrap_or_default(),
        note: plan
            .get_string(&AttributePath::new("note"))
            .unwrap_or_default(),
        perf_monitoring_enabled: optional_bool(plan, "perf_monitoring_enabled"),
        priority: plan
            .get_string(&AttributePath::new("priority"))
            .unwrap_or_default(),
        tags: plan
            .get_string_list(&AttributePath::new("tags"))
            .unwrap_or_default(),
    }
}

/// Overwrite the API-reported fields; absent values become null
fn apply_check(state: &mut DynamicValue, check: &CheckResult) {
    let fields = [
        ("status", Dynamic::string_or_null(&check.status)),
        ("name", Dynamic::string_or_null(&check.name)),
        ("note", Dynamic::string_or_null(&check.note)),
        ("enabled", Dynamic::bool_or_null(check.enabled)),
        (
            "perf_monitoring_enabled",
            Dynamic::bool_or_null(check.perf_monitoring_enabled),
        ),
        ("priority", Dynamic::string_or_null(&check.priority)),
        ("tags", Dynamic::string_list_or_null(&check.tags)),
        ("num_violations", Dynamic::int_or_null(check.num_violations)),
        (
            "execution_date_millis",
            Dynamic::int_or_null(check.execution_date_millis),
        ),
        (
            "execution_duration_millis",
            Dynamic::int_or_null(check.execution_duration_millis),
        ),
    ];

    for (name, value) in fields {
        let _ = state.set(&AttributePath::new(name), value);
    }
}

#[async_trait]
impl Resource for IntentCheckResource {
    fn type_name(&self) -> &str {
        "forward_intent_check"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manage Forward Enterprise intent checks against a specific snapshot.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Identifier assigned by Forward Enterprise for the intent check.")
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("snapshot_id", AttributeType::String)
                    .description("Snapshot identifier the check is evaluated against.")
                    .required()
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("persistent", AttributeType::Bool)
                    .description("Whether the intent check should persist to future snapshots.")
                    .optional()
                    .default(StaticDefault::bool(true))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("definition_json", AttributeType::String)
                    .description("Raw JSON payload describing the Forward intent check definition (as expected by the Forward API).")
                    .required()
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Optional human readable name for the intent check.")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("note", AttributeType::String)
                    .description("Optional descriptive note stored with the check.")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enabled", AttributeType::Bool)
                    .description("Whether the intent check should be enabled when created.")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("perf_monitoring_enabled", AttributeType::Bool)
                    .description("Enable performance monitoring (supported for existential checks only).")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("priority", AttributeType::String)
                    .description("Intent check priority (NOT_SET, LOW, MEDIUM, HIGH).")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("tags", AttributeType::list_of(AttributeType::String))
                    .description("Tags assigned to the intent check.")
                    .optional()
                    .default(StaticDefault::null())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .description("Last known Forward Enterprise status for the check.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("num_violations", AttributeType::Number)
                    .description("Number of violations detected by the check.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("execution_date_millis", AttributeType::Number)
                    .description("Execution timestamp (milliseconds since epoch).")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("execution_duration_millis", AttributeType::Number)
                    .description("Execution duration in milliseconds.")
                    .computed()
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let mut diagnostics = vec![];

        // Unknown definitions (from other resources) are checked at apply
        match request.config.get(&definition_path()) {
            Some(Dynamic::Unknown) => {}
            value => {
                if let Err(diag) = parse_definition(value) {
                    diagnostics.push(diag);
                }
            }
        }

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics: vec![unconfigured_provider()],
            };
        };

        let mut state = request.planned_state;
        let definition = match parse_definition(state.get(&definition_path())) {
            Ok(definition) => definition,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![diag],
                };
            }
        };

        let snapshot_id = state
            .get_string(&AttributePath::new("snapshot_id"))
            .unwrap_or_default();
        let persistent = optional_bool(&state, "persistent");
        let check_request = build_check_request(&state, definition);

        let check = match provider_data
            .client
            .intent_checks()
            .add(&ctx, &snapshot_id, &check_request, persistent)
            .await
        {
            Ok(check) => check,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![Diagnostic::error(
                        "Error creating intent check",
                        e.to_string(),
                    )],
                };
            }
        };

        tracing::info!("Created intent check {} on snapshot {}", check.id, snapshot_id);
        let _ = state.set_string(&AttributePath::new("id"), check.id.clone());
        apply_check(&mut state, &check);

        CreateResourceResponse {
            new_state: state,
            private: vec![],
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![unconfigured_provider()],
                private: request.private,
            };
        };

        let mut state = request.current_state;
        let snapshot_id = state
            .get_string(&AttributePath::new("snapshot_id"))
            .unwrap_or_default();
        let check_id = state
            .get_string(&AttributePath::new("id"))
            .unwrap_or_default();

        match provider_data
            .client
            .intent_checks()
            .get(&ctx, &snapshot_id, &check_id)
            .await
        {
            Ok(check) => {
                apply_check(&mut state, &check.result);
                ReadResourceResponse {
                    new_state: Some(state),
                    diagnostics: vec![],
                    private: request.private,
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Intent check {} no longer exists, removing from state", check_id);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                    private: request.private,
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics: vec![Diagnostic::error("Error reading intent check", e.to_string())],
                private: request.private,
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        // Remote fields either force replacement or are only sent on create
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics: vec![],
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![unconfigured_provider()],
            };
        };

        let snapshot_id = request
            .prior_state
            .get_string(&AttributePath::new("snapshot_id"))
            .unwrap_or_default();
        let check_id = request
            .prior_state
            .get_string(&AttributePath::new("id"))
            .unwrap_or_default();

        let mut diagnostics = vec![];
        match provider_data
            .client
            .intent_checks()
            .deactivate(&ctx, &snapshot_id, &check_id)
            .await
        {
            Ok(()) => tracing::info!("Deactivated intent check {}", check_id),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(Diagnostic::error(
                "Error deleting intent check",
                e.to_string(),
            )),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for IntentCheckResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        match from_configure(request.provider_data, Component::Resource) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureResourceResponse {
                    diagnostics: vec![],
                }
            }
            Err(diag) => ConfigureResourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl ResourceWithImportState for IntentCheckResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        // `snapshot_id/check_id` also fills the snapshot so the next read works
        if let Some(parts) = split_import_id(&request.id, 2) {
            let mut state = DynamicValue::object();
            let _ = state.set_string(&AttributePath::new("snapshot_id"), parts[0].clone());
            let _ = state.set_string(&AttributePath::new("id"), parts[1].clone());
            let _ = state.set_bool(&AttributePath::new("persistent"), true);
            response.imported_resources.push(ImportedResource {
                type_name: request.type_name,
                state,
                private: vec![],
            });
            return response;
        }

        import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::provider_data::test_support::{as_any, provider_data};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::collections::HashMap;
    use tfplug::types::ClientCapabilities;

    fn values(entries: &[(&str, Dynamic)]) -> DynamicValue {
        let map: HashMap<String, Dynamic> = entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        DynamicValue::new(Dynamic::Map(map))
    }

    async fn configured(url: &str) -> IntentCheckResource {
        let mut resource = IntentCheckResource::new();
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: as_any(provider_data(url)),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
        resource
    }

    fn validate_request(config: DynamicValue) -> ValidateResourceConfigRequest {
        ValidateResourceConfigRequest {
            type_name: "forward_intent_check".to_string(),
            config,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[tokio::test]
    async fn validate_rejects_malformed_definition() {
        let resource = IntentCheckResource::new();
        let response = resource
            .validate(
                Context::new(),
                validate_request(values(&[(
                    "definition_json",
                    Dynamic::String("{not json".into()),
                )])),
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Invalid Definition JSON");
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("definition_json"))
        );
    }

    #[tokio::test]
    async fn validate_rejects_non_object_definition() {
        let resource = IntentCheckResource::new();
        let response = resource
            .validate(
                Context::new(),
                validate_request(values(&[("definition_json", Dynamic::String("[1]".into()))])),
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Invalid Definition JSON");
    }

    #[tokio::test]
    async fn validate_defers_unknown_definition() {
        let resource = IntentCheckResource::new();
        let response = resource
            .validate(
                Context::new(),
                validate_request(values(&[("definition_json", Dynamic::Unknown)])),
            )
            .await;
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn create_sends_definition_and_records_result() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/snapshots/snap-1/checks")
            .match_query(Matcher::UrlEncoded("persistent".into(), "true".into()))
            .match_body(Matcher::Json(json!({
                "definition": {"checkType": "Isolation"},
                "name": "web-isolated",
                "tags": ["prod"]
            })))
            .with_body(
                json!({
                    "id": "chk-7",
                    "name": "web-isolated",
                    "status": "PASS",
                    "priority": "HIGH",
                    "tags": ["prod"],
                    "enabled": true,
                    "numViolations": 0,
                    "executionDateMillis": 1700000000000i64
                })
                .to_string(),
            )
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let plan = values(&[
            ("id", Dynamic::Unknown),
            ("snapshot_id", Dynamic::String("snap-1".into())),
            ("persistent", Dynamic::Bool(true)),
            (
                "definition_json",
                Dynamic::String(r#"{"checkType":"Isolation"}"#.into()),
            ),
            ("name", Dynamic::String("web-isolated".into())),
            ("priority", Dynamic::Unknown),
            ("tags", Dynamic::List(vec![Dynamic::String("prod".into())])),
            ("status", Dynamic::Unknown),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "forward_intent_check".to_string(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.new_state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "chk-7");
        assert_eq!(state.get_string(&AttributePath::new("status")).unwrap(), "PASS");
        assert_eq!(state.get_string(&AttributePath::new("priority")).unwrap(), "HIGH");
        assert!(state.get_bool(&AttributePath::new("enabled")).unwrap());
        assert_eq!(state.get_i64(&AttributePath::new("num_violations")).unwrap(), 0);
        assert!(state.get(&AttributePath::new("note")).unwrap().is_null());
        assert!(state
            .get(&AttributePath::new("execution_duration_millis"))
            .unwrap()
            .is_null());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_reports_api_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/snapshots/snap-1/checks")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("unsupported check type")
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let plan = values(&[
            ("snapshot_id", Dynamic::String("snap-1".into())),
            ("definition_json", Dynamic::String("{}".into())),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "forward_intent_check".to_string(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Error creating intent check");
        assert!(response.diagnostics[0].detail.contains("unsupported check type"));
    }

    #[tokio::test]
    async fn read_removes_missing_check() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/snapshots/snap-1/checks/chk-7")
            .with_status(404)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "forward_intent_check".to_string(),
                    current_state: values(&[
                        ("id", Dynamic::String("chk-7".into())),
                        ("snapshot_id", Dynamic::String("snap-1".into())),
                    ]),
                    private: vec![],
                    provider_meta: None,
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response.new_state.is_none());
    }

    #[tokio::test]
    async fn read_refreshes_status_and_clears_empty_tags() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/snapshots/snap-1/checks/chk-7")
            .with_body(r#"{"id":"chk-7","status":"FAIL","numViolations":3,"tags":[],"diagnosis":{"summary":"3 violations"}}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "forward_intent_check".to_string(),
                    current_state: values(&[
                        ("id", Dynamic::String("chk-7".into())),
                        ("snapshot_id", Dynamic::String("snap-1".into())),
                        ("tags", Dynamic::List(vec![Dynamic::String("old".into())])),
                    ]),
                    private: vec![],
                    provider_meta: None,
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;

        let state = response.new_state.unwrap();
        assert_eq!(state.get_string(&AttributePath::new("status")).unwrap(), "FAIL");
        assert_eq!(state.get_i64(&AttributePath::new("num_violations")).unwrap(), 3);
        assert!(state.get(&AttributePath::new("tags")).unwrap().is_null());
    }

    #[tokio::test]
    async fn delete_deactivates_check() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/snapshots/snap-1/checks/chk-7")
            .with_status(200)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "forward_intent_check".to_string(),
                    prior_state: values(&[
                        ("id", Dynamic::String("chk-7".into())),
                        ("snapshot_id", Dynamic::String("snap-1".into())),
                    ]),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_reports_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/api/snapshots/snap-1/checks/chk-7")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "forward_intent_check".to_string(),
                    prior_state: values(&[
                        ("id", Dynamic::String("chk-7".into())),
                        ("snapshot_id", Dynamic::String("snap-1".into())),
                    ]),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Error deleting intent check");
    }

    #[tokio::test]
    async fn import_accepts_bare_and_qualified_ids() {
        let resource = IntentCheckResource::new();

        let bare = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "forward_intent_check".to_string(),
                    id: "chk-7".to_string(),
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;
        let state = &bare.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "chk-7");

        let qualified = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "forward_intent_check".to_string(),
                    id: "snap-1/chk-7".to_string(),
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;
        let state = &qualified.imported_resources[0].state;
        assert_eq!(
            state.get_string(&AttributePath::new("snapshot_id")).unwrap(),
            "snap-1"
        );
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "chk-7");
    }
}
