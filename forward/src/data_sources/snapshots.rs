//! Snapshots data source implementation

use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder, StringKind};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::api::snapshots::{Snapshot, SnapshotListOptions};
use crate::provider_data::{client_not_configured, from_configure, Component};
use crate::ForwardProviderData;

#[derive(Default)]
pub struct SnapshotsDataSource {
    provider_data: Option<ForwardProviderData>,
}

impl SnapshotsDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn snapshot_object_type() -> AttributeType {
    AttributeType::object([
        ("id", AttributeType::String),
        ("state", AttributeType::String),
        ("processing_trigger", AttributeType::String),
        ("parent_snapshot_id", AttributeType::String),
        ("note", AttributeType::String),
        ("is_draft", AttributeType::Bool),
        ("creation_date_millis", AttributeType::Number),
        ("processed_at_millis", AttributeType::Number),
        ("restored_at_millis", AttributeType::Number),
        ("favorited_by", AttributeType::String),
        ("favorited_by_user_id", AttributeType::String),
        ("favorited_at_millis", AttributeType::Number),
    ])
}

fn snapshot_item(snapshot: &Snapshot) -> Dynamic {
    let item: HashMap<String, Dynamic> = [
        ("id", Dynamic::String(snapshot.id.clone())),
        ("state", Dynamic::string_or_null(&snapshot.state)),
        (
            "processing_trigger",
            Dynamic::string_or_null(&snapshot.processing_trigger),
        ),
        (
            "parent_snapshot_id",
            Dynamic::string_or_null(&snapshot.parent_snapshot_id),
        ),
        ("note", Dynamic::string_or_null(&snapshot.note)),
        ("is_draft", Dynamic::bool_or_null(snapshot.is_draft)),
        (
            "creation_date_millis",
            Dynamic::int_or_null(snapshot.creation_date_millis),
        ),
        (
            "processed_at_millis",
            Dynamic::int_or_null(snapshot.processed_at_millis),
        ),
        (
            "restored_at_millis",
            Dynamic::int_or_null(snapshot.restored_at_millis),
        ),
        ("favorited_by", Dynamic::string_or_null(&snapshot.favorited_by)),
        (
            "favorited_by_user_id",
            Dynamic::string_or_null(&snapshot.favorited_by_user_id),
        ),
        (
            "favorited_at_millis",
            Dynamic::int_or_null(snapshot.favorited_at_millis),
        ),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect();

    Dynamic::Map(item)
}

fn failed(diagnostic: Diagnostic) -> ReadDataSourceResponse {
    ReadDataSourceResponse {
        state: DynamicValue::null(),
        diagnostics: vec![diagnostic],
    }
}

#[async_trait]
impl DataSource for SnapshotsDataSource {
    fn type_name(&self) -> &str {
        "forward_snapshots"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Retrieve Forward Enterprise snapshots for a network.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("network_id", AttributeType::String)
                    .description("Network ID to query. Defaults to the provider `network_id` when omitted.")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("limit", AttributeType::Number)
                    .description("Maximum number of snapshots to return.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("include_archived", AttributeType::Bool)
                    .description("Include archived snapshots in the result set.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("snapshots", AttributeType::list_of(snapshot_object_type()))
                    .description("Snapshots returned by the Forward Enterprise API.")
                    .computed()
                    .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return failed(client_not_configured());
        };

        let config = request.config;
        let network_id =
            provider_data.network_or(config.get_string(&AttributePath::new("network_id")).ok());
        if network_id.is_empty() {
            return failed(
                Diagnostic::error(
                    "Missing Network ID",
                    "Network ID must be specified either on the provider or data source.",
                )
                .with_attribute(AttributePath::new("network_id")),
            );
        }

        let mut options = SnapshotListOptions::default();
        if let Ok(limit) = config.get_i64(&AttributePath::new("limit")) {
            if limit < 0 {
                return failed(
                    Diagnostic::error("Invalid Limit", "Limit must be zero or a positive integer.")
                        .with_attribute(AttributePath::new("limit")),
                );
            }
            options.limit = Some(limit);
        }
        options.include_archived = config.get_bool(&AttributePath::new("include_archived")).ok();

        let snapshots = match provider_data
            .client
            .snapshots()
            .list(&ctx, &network_id, &options)
            .await
        {
            Ok(snapshots) => snapshots,
            Err(e) => return failed(Diagnostic::error("Unable to Retrieve Snapshots", e.to_string())),
        };

        tracing::debug!("Retrieved {} snapshots for network {}", snapshots.len(), network_id);

        let mut state = config;
        let _ = state.set_string(&AttributePath::new("network_id"), network_id);
        let _ = state.set_list(
            &AttributePath::new("snapshots"),
            snapshots.iter().map(snapshot_item).collect(),
        );

        ReadDataSourceResponse {
            state,
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for SnapshotsDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        match from_configure(request.provider_data, Component::DataSource) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureDataSourceResponse {
                    diagnostics: vec![],
                }
            }
            Err(diag) => ConfigureDataSourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use crate::provider_data::test_support::{as_any, provider_data};
    use mockito::{Matcher, Server};
    use tfplug::types::ClientCapabilities;

    fn read_request(entries: &[(&str, Dynamic)]) -> ReadDataSourceRequest {
        let config: HashMap<String, Dynamic> = entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        ReadDataSourceRequest {
            type_name: "forward_snapshots".to_string(),
            config: DynamicValue::new(Dynamic::Map(config)),
            provider_meta: None,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    async fn configured(data: ForwardProviderData) -> SnapshotsDataSource {
        let mut data_source = SnapshotsDataSource::new();
        data_source
            .configure(
                Context::new(),
                ConfigureDataSourceRequest {
                    provider_data: as_any(data),
                },
            )
            .await;
        data_source
    }

    #[tokio::test]
    async fn read_uses_provider_network_and_options() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/networks/net-1/snapshots")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "5".into()),
                Matcher::UrlEncoded("includeArchived".into(), "true".into()),
            ]))
            .with_body(
                r#"{"snapshots":[
                    {"id":"s-2","state":"PROCESSED","isDraft":false,"creationDateMillis":20},
                    {"id":"s-1","note":"","favoritedBy":"alice"}
                ]}"#,
            )
            .create_async()
            .await;

        let data_source = configured(provider_data(&server.url())).await;
        let response = data_source
            .read(
                Context::new(),
                read_request(&[
                    ("limit", Dynamic::Number(5.0)),
                    ("include_archived", Dynamic::Bool(true)),
                ]),
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state;
        assert_eq!(
            state.get_string(&AttributePath::new("network_id")).unwrap(),
            "net-1"
        );
        let snapshots = state.get_list(&AttributePath::new("snapshots")).unwrap();
        assert_eq!(snapshots.len(), 2);

        let first = DynamicValue::new(snapshots[0].clone());
        assert_eq!(first.get_string(&AttributePath::new("state")).unwrap(), "PROCESSED");
        assert!(!first.get_bool(&AttributePath::new("is_draft")).unwrap());
        assert_eq!(
            first.get_i64(&AttributePath::new("creation_date_millis")).unwrap(),
            20
        );

        let second = DynamicValue::new(snapshots[1].clone());
        assert!(second.get(&AttributePath::new("note")).unwrap().is_null());
        assert!(second.get(&AttributePath::new("state")).unwrap().is_null());
        assert_eq!(
            second.get_string(&AttributePath::new("favorited_by")).unwrap(),
            "alice"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn explicit_network_overrides_provider() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/networks/net-9/snapshots")
            .with_body(r#"{"snapshots":[]}"#)
            .create_async()
            .await;

        let data_source = configured(provider_data(&server.url())).await;
        let response = data_source
            .read(
                Context::new(),
                read_request(&[("network_id", Dynamic::String("net-9".into()))]),
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response
            .state
            .get_list(&AttributePath::new("snapshots"))
            .unwrap()
            .is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_network_is_reported() {
        let data = ForwardProviderData::new(create_test_client("http://127.0.0.1:9"), "");
        let data_source = configured(data).await;
        let response = data_source.read(Context::new(), read_request(&[])).await;

        assert_eq!(response.diagnostics[0].summary, "Missing Network ID");
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("network_id"))
        );
    }

    #[tokio::test]
    async fn negative_limit_is_rejected() {
        let data_source = configured(provider_data("http://127.0.0.1:9")).await;
        let response = data_source
            .read(Context::new(), read_request(&[("limit", Dynamic::Number(-1.0))]))
            .await;

        assert_eq!(response.diagnostics[0].summary, "Invalid Limit");
        assert_eq!(
            response.diagnostics[0].detail,
            "Limit must be zero or a positive integer."
        );
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/networks/net-1/snapshots")
            .with_status(500)
            .create_async()
            .await;

        let data_source = configured(provider_data(&server.url())).await;
        let response = data_source.read(Context::new(), read_request(&[])).await;
        assert_eq!(response.diagnostics[0].summary, "Unable to Retrieve Snapshots");
    }
}
