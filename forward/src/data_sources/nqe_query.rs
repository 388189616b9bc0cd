//! NQE query data source implementation

use async_trait::async_trait;
use serde_json::{Map, Value};
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder, StringKind};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::api::nqe::{NqeQueryOptions, NqeQueryRequest};
use crate::provider_data::{client_not_configured, from_configure, Component};
use crate::ForwardProviderData;

#[derive(Default)]
pub struct NqeQueryDataSource {
    provider_data: Option<ForwardProviderData>,
}

impl NqeQueryDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn non_empty_string(config: &DynamicValue, name: &str) -> Option<String> {
    config
        .get_string(&AttributePath::new(name))
        .ok()
        .filter(|value| !value.is_empty())
}

/// Decode each parameter value as JSON. Keys are visited in sorted order so
/// the first reported error is stable.
fn parse_parameters(config: &DynamicValue) -> Result<Map<String, Value>, Diagnostic> {
    let Ok(raw) = config.get_map(&AttributePath::new("parameters")) else {
        return Ok(Map::new());
    };

    let mut keys: Vec<&String> = raw.keys().collect();
    keys.sort();

    let mut parameters = Map::new();
    for key in keys {
        let Some(Dynamic::String(encoded)) = raw.get(key) else {
            continue;
        };
        let decoded: Value = serde_json::from_str(encoded).map_err(|e| {
            Diagnostic::error(
                "Invalid Parameter JSON",
                format!("Parameter {:?} must be valid JSON: {}", key, e),
            )
            .with_attribute(AttributePath::new("parameters").key(key))
        })?;
        parameters.insert(key.clone(), decoded);
    }
    Ok(parameters)
}

fn non_negative(
    config: &DynamicValue,
    name: &str,
    summary: &str,
) -> Result<Option<i64>, Diagnostic> {
    match config.get_i64(&AttributePath::new(name)) {
        Ok(value) if value < 0 => Err(Diagnostic::error(
            summary,
            format!("{} must be zero or positive.", name),
        )
        .with_attribute(AttributePath::new(name))),
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

fn build_request(config: &DynamicValue) -> Result<NqeQueryRequest, Diagnostic> {
    let parameters = parse_parameters(config)?;
    let limit = non_negative(config, "limit", "Invalid Limit")?;
    let offset = non_negative(config, "offset", "Invalid Offset")?;

    let options = NqeQueryOptions {
        limit,
        offset,
        ..Default::default()
    };

    Ok(NqeQueryRequest {
        query: non_empty_string(config, "query"),
        query_id: non_empty_string(config, "query_id"),
        commit_id: non_empty_string(config, "commit_id"),
        parameters,
        query_options: (!options.is_empty()).then_some(options),
    })
}

/// One JSON document per row, a null row included
fn encode_item(item: &Value) -> Dynamic {
    Dynamic::String(item.to_string())
}

fn failed(diagnostic: Diagnostic) -> ReadDataSourceResponse {
    ReadDataSourceResponse {
        state: DynamicValue::null(),
        diagnostics: vec![diagnostic],
    }
}

#[async_trait]
impl DataSource for NqeQueryDataSource {
    fn type_name(&self) -> &str {
        "forward_nqe_query"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Execute a Forward Enterprise NQE query against a snapshot or network.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("snapshot_id", AttributeType::String)
                    .description("Snapshot ID to query. If omitted, the latest processed snapshot of `network_id` is used.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("network_id", AttributeType::String)
                    .description("Network ID to query. Defaults to the provider `network_id` when omitted.")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("query", AttributeType::String)
                    .description("Inline NQE query to execute.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("query_id", AttributeType::String)
                    .description("Identifier of a stored NQE query in the Forward Enterprise library.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("commit_id", AttributeType::String)
                    .description("Specific query commit ID to execute when using query_id.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("parameters", AttributeType::map_of(AttributeType::String))
                    .description("Parameter values to supply to the query (JSON-encoded).")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("limit", AttributeType::Number)
                    .description("Limit number of results returned.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("offset", AttributeType::Number)
                    .description("Offset into the result set.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("result_snapshot_id", AttributeType::String)
                    .description("Snapshot ID used for query execution.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("total_items", AttributeType::Number)
                    .description("Total items reported by the Forward Enterprise API.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("items_json", AttributeType::list_of(AttributeType::String))
                    .description("Query results serialized as JSON strings.")
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

        let mut state = request.config;
        let network_id =
            provider_data.network_or(state.get_string(&AttributePath::new("network_id")).ok());
        let snapshot_id = non_empty_string(&state, "snapshot_id").unwrap_or_default();

        if network_id.is_empty() && snapshot_id.is_empty() {
            return failed(Diagnostic::error(
                "Missing Network Or Snapshot",
                "Provide either network_id or snapshot_id to execute an NQE query.",
            ));
        }

        let query_request = match build_request(&state) {
            Ok(request) => request,
            Err(diag) => return failed(diag),
        };
        if query_request.query.is_none() && query_request.query_id.is_none() {
            return failed(
                Diagnostic::error(
                    "Missing Query",
                    "Either query or query_id must be provided to execute an NQE query.",
                )
                .with_attribute(AttributePath::new("query")),
            );
        }

        let result = match provider_data
            .client
            .nqe()
            .run_query(&ctx, &network_id, &snapshot_id, &query_request)
            .await
        {
            Ok(result) => result,
            Err(e) => return failed(Diagnostic::error("Unable to Execute NQE Query", e.to_string())),
        };

        tracing::debug!("NQE query returned {} items", result.items.len());

        let total = result
            .total_num_items
            .unwrap_or(result.items.len() as i64);
        let _ = state.set(
            &AttributePath::new("network_id"),
            Dynamic::string_or_null(&network_id),
        );
        let _ = state.set(
            &AttributePath::new("result_snapshot_id"),
            Dynamic::string_or_null(&result.snapshot_id),
        );
        let _ = state.set_number(&AttributePath::new("total_items"), total as f64);
        let _ = state.set_list(
            &AttributePath::new("items_json"),
            result.items.iter().map(encode_item).collect(),
        );

        ReadDataSourceResponse {
            state,
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for NqeQueryDataSource {
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
