//! NQE query definition resource
//!
//! References an existing NQE library entry. The API offers no way to create
//! or delete library queries, so create only resolves the entry and delete
//! only forgets it.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{RequiresReplace, RequiresReplaceIf, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{
    AttributeBuilder, AttributeType, PlanModifierRequest, SchemaBuilder, StringKind,
};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::import_state_passthrough_id;

use crate::api::nqe::NqeQuery;
use crate::provider_data::{from_configure, unconfigured_provider, Component};
use crate::ForwardProviderData;

const DEFAULT_REPOSITORY: &str = "ORG";

#[derive(Default)]
pub struct NqeQueryResource {
    provider_data: Option<ForwardProviderData>,
}

impl NqeQueryResource {
    pub fn new() -> Self {
        Self::default()
    }
}

/// How a library entry is located
enum QueryKey<'a> {
    Path { path: &'a str, repository: &'a str },
    /// After import only the query id is known
    Id(&'a str),
}

impl QueryKey<'_> {
    fn matches(&self, query: &NqeQuery) -> bool {
        match self {
            QueryKey::Path { path, repository } => {
                query.path == *path && query.repository.eq_ignore_ascii_case(repository)
            }
            QueryKey::Id(id) => query.query_id == *id,
        }
    }
}

/// Repository names compare case-insensitively
fn repository_changed(request: &PlanModifierRequest) -> bool {
    match (&request.state_value.value, &request.plan_value.value) {
        (Dynamic::String(state), Dynamic::String(plan)) => !state.eq_ignore_ascii_case(plan),
        (Dynamic::Unknown, _) | (_, Dynamic::Unknown) => true,
        (state, plan) => state != plan,
    }
}

fn apply_query(state: &mut DynamicValue, query: &NqeQuery) {
    let _ = state.set_string(&AttributePath::new("query_id"), query.query_id.clone());
    let _ = state.set_string(&AttributePath::new("id"), query.query_id.clone());
    let _ = state.set_string(&AttributePath::new("path"), query.path.clone());
    let _ = state.set(
        &AttributePath::new("repository"),
        Dynamic::string_or_null(&query.repository),
    );
    let _ = state.set(
        &AttributePath::new("intent"),
        Dynamic::string_or_null(&query.intent),
    );
}

impl NqeQueryResource {
    async fn lookup(
        &self,
        ctx: &Context,
        provider_data: &ForwardProviderData,
        key: QueryKey<'_>,
    ) -> Result<Option<NqeQuery>, Diagnostic> {
        if let QueryKey::Path { path, .. } = &key {
            if path.trim().is_empty() {
                return Err(Diagnostic::error("Missing Path", "path must be provided.")
                    .with_attribute(AttributePath::new("path")));
            }
        }

        let queries = provider_data
            .client
            .nqe()
            .list_queries(ctx, "")
            .await
            .map_err(|e| Diagnostic::error("Error listing NQE queries", e.to_string()))?;

        tracing::debug!("Searching {} NQE library entries", queries.len());
        Ok(queries.into_iter().find(|query| key.matches(query)))
    }
}

#[async_trait]
impl Resource for NqeQueryResource {
    fn type_name(&self) -> &str {
        "forward_nqe_query_definition"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Reference a Forward Enterprise NQE library entry by path and repository.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Internal Terraform identifier (mirrors query_id).")
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("path", AttributeType::String)
                    .description("Unique NQE library path (for example, /L3/MtuConsistency).")
                    .required()
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("repository", AttributeType::String)
                    .description("Source repository for the query (e.g. ORG or FWD).")
                    .optional()
                    .default(StaticDefault::string(DEFAULT_REPOSITORY))
                    .plan_modifier(RequiresReplaceIf::create(
                        repository_changed,
                        "Changing the repository (ignoring case) replaces the resource.",
                    ))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("intent", AttributeType::String)
                    .description("Intent string associated with the query.")
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("query_id", AttributeType::String)
                    .description("Forward Enterprise query identifier.")
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
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
        let path = state
            .get_string(&AttributePath::new("path"))
            .unwrap_or_default();
        let repository = state
            .get_string(&AttributePath::new("repository"))
            .unwrap_or_else(|_| DEFAULT_REPOSITORY.to_string());

        let key = QueryKey::Path {
            path: &path,
            repository: &repository,
        };
        let diagnostics = match self.lookup(&ctx, provider_data, key).await {
            Ok(Some(query)) => {
                tracing::info!("Resolved NQE query {} to {}", path, query.query_id);
                apply_query(&mut state, &query);
                return CreateResourceResponse {
                    new_state: state,
                    private: vec![],
                    diagnostics: vec![],
                };
            }
            Ok(None) => vec![Diagnostic::error(
                "NQE query not found",
                "The specified NQE query does not exist in the Forward library. New query creation is not currently supported via API; create the query in Forward Enterprise and re-run Terraform.",
            )],
            Err(diag) => vec![diag],
        };

        CreateResourceResponse {
            new_state: DynamicValue::null(),
            private: vec![],
            diagnostics,
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
        let path = state.get_string(&AttributePath::new("path")).ok();
        let repository = state
            .get_string(&AttributePath::new("repository"))
            .unwrap_or_else(|_| DEFAULT_REPOSITORY.to_string());
        let query_id = state
            .get_string(&AttributePath::new("query_id"))
            .unwrap_or_default();

        let key = match &path {
            Some(path) => QueryKey::Path {
                path,
                repository: &repository,
            },
            None => QueryKey::Id(&query_id),
        };

        match self.lookup(&ctx, provider_data, key).await {
            Ok(Some(query)) => {
                apply_query(&mut state, &query);
                ReadResourceResponse {
                    new_state: Some(state),
                    diagnostics: vec![],
                    private: request.private,
                }
            }
            Ok(None) => {
                tracing::info!("NQE query {} no longer exists, removing from state", query_id);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                    private: request.private,
                }
            }
            Err(diag) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics: vec![diag],
                private: request.private,
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: request.planned_state,
            private: request.planned_private,
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        // Library entries are never removed remotely
        DeleteResourceResponse {
            diagnostics: vec![],
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for NqeQueryResource {
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
impl ResourceWithImportState for NqeQueryResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(&ctx, AttributePath::new("query_id"), &request, &mut response);
        response
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::provider_data::test_support::{as_any, provider_data};
    use mockito::{Mock, Server, ServerGuard};
    use std::collections::HashMap;
    use tfplug::types::ClientCapabilities;

    const LIBRARY: &str = r#"[
        {"queryId":"Q_mtu","repository":"ORG","path":"/L3/MtuConsistency","intent":"MTU matches"},
        {"queryId":"Q_fwd","repository":"FWD","path":"/L3/MtuConsistency","intent":""}
    ]"#;

    fn values(entries: &[(&str, Dynamic)]) -> DynamicValue {
        let map: HashMap<String, Dynamic> = entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        DynamicValue::new(Dynamic::Map(map))
    }

    async fn library(server: &mut ServerGuard) -> Mock {
        server
            .mock("GET", "/api/nqe/queries")
            .with_body(LIBRARY)
            .create_async()
            .await
    }

    async fn configured(url: &str) -> NqeQueryResource {
        let mut resource = NqeQueryResource::new();
        resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: as_any(provider_data(url)),
                },
            )
            .await;
        resource
    }

    fn create_request(plan: DynamicValue) -> CreateResourceRequest {
        CreateResourceRequest {
            type_name: "forward_nqe_query_definition".to_string(),
            planned_state: plan.clone(),
            config: plan,
            planned_private: vec![],
            provider_meta: None,
        }
    }

    fn read_request(state: DynamicValue) -> ReadResourceRequest {
        ReadResourceRequest {
            type_name: "forward_nqe_query_definition".to_string(),
            current_state: state,
            private: vec![],
            provider_meta: None,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[tokio::test]
    async fn create_matches_repository_case_insensitively() {
        let mut server = Server::new_async().await;
        let mock = library(&mut server).await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                create_request(values(&[
                    ("path", Dynamic::String("/L3/MtuConsistency".into())),
                    ("repository", Dynamic::String("fwd".into())),
                    ("id", Dynamic::Unknown),
                    ("query_id", Dynamic::Unknown),
                    ("intent", Dynamic::Unknown),
                ])),
            )
            .await;

        assert!(response.diagnostics.is_empty());
        let state = response.new_state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "Q_fwd");
        assert_eq!(state.get_string(&AttributePath::new("query_id")).unwrap(), "Q_fwd");
        assert_eq!(state.get_string(&AttributePath::new("repository")).unwrap(), "FWD");
        assert!(state.get(&AttributePath::new("intent")).unwrap().is_null());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_reports_missing_library_entry() {
        let mut server = Server::new_async().await;
        let _mock = library(&mut server).await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                create_request(values(&[
                    ("path", Dynamic::String("/L3/Unknown".into())),
                    ("repository", Dynamic::String("ORG".into())),
                ])),
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "NQE query not found");
        assert!(response.diagnostics[0]
            .detail
            .contains("New query creation is not currently supported via API"));
    }

    #[tokio::test]
    async fn create_rejects_blank_path() {
        let resource = configured("http://127.0.0.1:9").await;
        let response = resource
            .create(
                Context::new(),
                create_request(values(&[("path", Dynamic::String("  ".into()))])),
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Missing Path");
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("path"))
        );
    }

    #[tokio::test]
    async fn create_reports_list_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/nqe/queries")
            .with_status(500)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                create_request(values(&[("path", Dynamic::String("/L3/MtuConsistency".into()))])),
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Error listing NQE queries");
    }

    #[tokio::test]
    async fn read_after_import_resolves_by_query_id() {
        let mut server = Server::new_async().await;
        let _mock = library(&mut server).await;

        let resource = configured(&server.url()).await;
        let imported = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "forward_nqe_query_definition".to_string(),
                    id: "Q_mtu".to_string(),
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;
        let state = imported.imported_resources[0].state.clone();

        let response = resource.read(Context::new(), read_request(state)).await;
        let state = response.new_state.unwrap();
        assert_eq!(
            state.get_string(&AttributePath::new("path")).unwrap(),
            "/L3/MtuConsistency"
        );
        assert_eq!(state.get_string(&AttributePath::new("repository")).unwrap(), "ORG");
        assert_eq!(
            state.get_string(&AttributePath::new("intent")).unwrap(),
            "MTU matches"
        );
    }

    #[tokio::test]
    async fn read_removes_deleted_library_entry() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/nqe/queries")
            .with_body("[]")
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .read(
                Context::new(),
                read_request(values(&[
                    ("path", Dynamic::String("/L3/MtuConsistency".into())),
                    ("repository", Dynamic::String("ORG".into())),
                    ("query_id", Dynamic::String("Q_mtu".into())),
                ])),
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response.new_state.is_none());
    }

    #[tokio::test]
    async fn delete_makes_no_api_call() {
        let resource = configured("http://127.0.0.1:9").await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "forward_nqe_query_definition".to_string(),
                    prior_state: values(&[("query_id", Dynamic::String("Q_mtu".into()))]),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    fn repository_case_change_keeps_resource() {
        let request = |state: &str, plan: &str| PlanModifierRequest {
            config_value: DynamicValue::new(Dynamic::String(plan.into())),
            state_value: DynamicValue::new(Dynamic::String(state.into())),
            plan_value: DynamicValue::new(Dynamic::String(plan.into())),
            path: AttributePath::new("repository"),
        };

        assert!(!repository_changed(&request("ORG", "org")));
        assert!(repository_changed(&request("ORG", "FWD")));
    }
}
