//! Intent checks data source implementation

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

use crate::api::intent_checks::{CheckListOptions, CheckResult};
use crate::provider_data::{client_not_configured, from_configure, Component};
use crate::ForwardProviderData;

#[derive(Default)]
pub struct IntentChecksDataSource {
    provider_data: Option<ForwardProviderData>,
}

impl IntentChecksDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result tallies reported alongside the check list
#[derive(Debug, Default, PartialEq)]
struct StatusCounts {
    pass: i64,
    fail: i64,
    error: i64,
    timeout: i64,
}

impl StatusCounts {
    fn tally(checks: &[CheckResult]) -> Self {
        let mut counts = Self::default();
        for check in checks {
            match check.status.as_str() {
                "PASS" => counts.pass += 1,
                "FAIL" => counts.fail += 1,
                "ERROR" => counts.error += 1,
                "TIMEOUT" => counts.timeout += 1,
                _ => {}
            }
        }
        counts
    }
}

fn check_object_type() -> AttributeType {
    AttributeType::object([
        ("id", AttributeType::String),
        ("name", AttributeType::String),
        ("status", AttributeType::String),
        ("priority", AttributeType::String),
        ("description", AttributeType::String),
        ("note", AttributeType::String),
        ("enabled", AttributeType::Bool),
        ("perf_monitoring_enabled", AttributeType::Bool),
        ("num_violations", AttributeType::Number),
        ("creation_date_millis", AttributeType::Number),
        ("execution_date_millis", AttributeType::Number),
        ("execution_duration_millis", AttributeType::Number),
        ("tags", AttributeType::list_of(AttributeType::String)),
    ])
}

fn check_item(check: &CheckResult) -> Dynamic {
    let item: HashMap<String, Dynamic> = [
        ("id", Dynamic::String(check.id.clone())),
        ("name", Dynamic::string_or_null(&check.name)),
        ("status", Dynamic::string_or_null(&check.status)),
        ("priority", Dynamic::string_or_null(&check.priority)),
        ("description", Dynamic::string_or_null(&check.description)),
        ("note", Dynamic::string_or_null(&check.note)),
        ("enabled", Dynamic::bool_or_null(check.enabled)),
        (
            "perf_monitoring_enabled",
            Dynamic::bool_or_null(check.perf_monitoring_enabled),
        ),
        ("num_violations", Dynamic::int_or_null(check.num_violations)),
        (
            "creation_date_millis",
            Dynamic::int_or_null(check.creation_date_millis),
        ),
        (
            "execution_date_millis",
            Dynamic::int_or_null(check.execution_date_millis),
        ),
        (
            "execution_duration_millis",
            Dynamic::int_or_null(check.execution_duration_millis),
        ),
        ("tags", Dynamic::string_list_or_null(&check.tags)),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect();

    Dynamic::Map(item)
}

fn filter_list(config: &DynamicValue, name: &str) -> Vec<String> {
    config
        .get_string_list(&AttributePath::new(name))
        .unwrap_or_default()
}

#[async_trait]
impl DataSource for IntentChecksDataSource {
    fn type_name(&self) -> &str {
        "forward_intent_checks"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Retrieve Forward Enterprise intent checks and their result status for a specific snapshot.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("snapshot_id", AttributeType::String)
                    .description("Snapshot identifier to query.")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::list_of(AttributeType::String))
                    .description("Filter checks by status (e.g. PASS, FAIL).")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("priority", AttributeType::list_of(AttributeType::String))
                    .description("Filter checks by priority (e.g. HIGH).")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("type", AttributeType::list_of(AttributeType::String))
                    .description("Filter checks by type (e.g. NQE, Predefined).")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("pass_count", AttributeType::Number)
                    .description("Number of checks that passed.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("fail_count", AttributeType::Number)
                    .description("Number of checks that failed.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("error_count", AttributeType::Number)
                    .description("Number of checks that errored.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("timeout_count", AttributeType::Number)
                    .description("Number of checks that timed out.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("checks", AttributeType::list_of(check_object_type()))
                    .description("Intent checks returned by the Forward Enterprise API.")
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
            return ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![client_not_configured()],
            };
        };

        let mut state = request.config;
        let snapshot_id = state
            .get_string(&AttributePath::new("snapshot_id"))
            .unwrap_or_default();
        if snapshot_id.is_empty() {
            return ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error(
                    "Missing Snapshot ID",
                    "The snapshot_id attribute is required to query intent checks.",
                )
                .with_attribute(AttributePath::new("snapshot_id"))],
            };
        }

        let options = CheckListOptions {
            statuses: filter_list(&state, "status"),
            priorities: filter_list(&state, "priority"),
            types: filter_list(&state, "type"),
        };

        let checks = match provider_data
            .client
            .intent_checks()
            .list(&ctx, &snapshot_id, &options)
            .await
        {
            Ok(checks) => checks,
            Err(e) => {
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics: vec![Diagnostic::error(
                        "Unable to Retrieve Intent Checks",
                        e.to_string(),
                    )],
                };
            }
        };

        tracing::debug!("Retrieved {} intent checks for snapshot {}", checks.len(), snapshot_id);

        let counts = StatusCounts::tally(&checks);
        let _ = state.set_number(&AttributePath::new("pass_count"), counts.pass as f64);
        let _ = state.set_number(&AttributePath::new("fail_count"), counts.fail as f64);
        let _ = state.set_number(&AttributePath::new("error_count"), counts.error as f64);
        let _ = state.set_number(&AttributePath::new("timeout_count"), counts.timeout as f64);
        let _ = state.set_list(
            &AttributePath::new("checks"),
            checks.iter().map(check_item).collect(),
        );

        ReadDataSourceResponse {
            state,
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for IntentChecksDataSource {
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
