//! Snapshot resource implementation

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder, StringKind};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::NumberAtLeast;
use tfplug::split_import_id;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::snapshots::{Snapshot, SnapshotCreateRequest};
use crate::api::{ApiError, Client};
use crate::provider_data::{from_configure, unconfigured_provider, Component};
use crate::ForwardProviderData;

const DEFAULT_POLL_INTERVAL_SECONDS: i64 = 10;
const DEFAULT_TIMEOUT_SECONDS: i64 = 600;

#[derive(Debug, Error)]
pub(crate) enum WaitError {
    #[error("snapshot processing timed out")]
    TimedOut,

    #[error("snapshot {0} failed")]
    Failed(String),

    #[error("context canceled")]
    Cancelled,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Default)]
pub struct SnapshotResource {
    provider_data: Option<ForwardProviderData>,
}

impl SnapshotResource {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Copy server-managed fields into state
fn apply_snapshot(state: &mut DynamicValue, snapshot: &Snapshot) {
    let _ = state.set(
        &AttributePath::new("state"),
        Dynamic::string_or_null(&snapshot.state),
    );
    let _ = state.set(
        &AttributePath::new("creation_date_millis"),
        Dynamic::int_or_null(snapshot.creation_date_millis),
    );
    let _ = state.set(
        &AttributePath::new("processed_at_millis"),
        Dynamic::int_or_null(snapshot.processed_at_millis),
    );
    let _ = state.set(
        &AttributePath::new("restored_at_millis"),
        Dynamic::int_or_null(snapshot.restored_at_millis),
    );
}

fn seconds_or(state: &DynamicValue, name: &str, fallback: i64) -> Duration {
    let seconds = state
        .get_i64(&AttributePath::new(name))
        .ok()
        .filter(|s| *s > 0)
        .unwrap_or(fallback);
    Duration::from_secs(seconds.unsigned_abs())
}

/// Poll until the snapshot is PROCESSED. The first poll happens one interval
/// after the call. Each poll refreshes `state`.
pub(crate) async fn wait_for_processed(
    ctx: &Context,
    client: &Client,
    network_id: &str,
    snapshot_id: &str,
    interval: Duration,
    timeout: Duration,
    state: &mut DynamicValue,
) -> Result<(), WaitError> {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = ctx.done() => return Err(WaitError::Cancelled),
            _ = &mut deadline => return Err(WaitError::TimedOut),
            _ = ticker.tick() => {}
        }

        let snapshot = match client.snapshots().get(ctx, network_id, snapshot_id).await {
            Ok(snapshot) => snapshot,
            Err(ApiError::Cancelled) => return Err(WaitError::Cancelled),
            Err(e) if e.is_not_found() => return Err(e.into()),
            Err(e) => {
                tracing::debug!("Polling snapshot {} failed, retrying: {}", snapshot_id, e);
                continue;
            }
        };

        apply_snapshot(state, &snapshot);
        tracing::debug!("Snapshot {} is {}", snapshot_id, snapshot.state);

        if snapshot.state.eq_ignore_ascii_case("PROCESSED") {
            return Ok(());
        }
        if snapshot.state.eq_ignore_ascii_case("FAILED") {
            return Err(WaitError::Failed(snapshot_id.to_string()));
        }
    }
}

#[async_trait]
impl Resource for SnapshotResource {
    fn type_name(&self) -> &str {
        "forward_snapshot"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manage Forward Enterprise snapshots (capture, poll, and archive).")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Snapshot identifier assigned by Forward Enterprise.")
                    .computed()
                    .plan_modifier(UseStateForUnknown::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("network_id", AttributeType::String)
                    .description("Network identifier associated with the snapshot.")
                    .required()
                    .plan_modifier(RequiresReplace::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("note", AttributeType::String)
                    .description("Optional note attached to the snapshot.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("wait_for_processed", AttributeType::Bool)
                    .description("Wait for the snapshot to reach PROCESSED state before completing create.")
                    .optional()
                    .default(StaticDefault::bool(true))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("poll_interval_seconds", AttributeType::Number)
                    .description("Interval in seconds between polling attempts when wait_for_processed is true.")
                    .optional()
                    .default(StaticDefault::number(DEFAULT_POLL_INTERVAL_SECONDS as f64))
                    .validator(NumberAtLeast::create(1.0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("timeout_seconds", AttributeType::Number)
                    .description("Maximum seconds to wait for the snapshot to reach PROCESSED.")
                    .optional()
                    .default(StaticDefault::number(DEFAULT_TIMEOUT_SECONDS as f64))
                    .validator(NumberAtLeast::create(1.0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("Current snapshot state.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("creation_date_millis", AttributeType::Number)
                    .description("Snapshot creation timestamp (milliseconds).")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("processed_at_millis", AttributeType::Number)
                    .description("Snapshot processed timestamp (milliseconds).")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("restored_at_millis", AttributeType::Number)
                    .description("Snapshot restored timestamp (milliseconds).")
                    .computed()
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
        let network_id = state
            .get_string(&AttributePath::new("network_id"))
            .unwrap_or_default();
        let create_request = SnapshotCreateRequest {
            note: state
                .get_string(&AttributePath::new("note"))
                .unwrap_or_default(),
        };

        let snapshot = match provider_data
            .client
            .snapshots()
            .create(&ctx, &network_id, &create_request)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![Diagnostic::error("Error creating snapshot", e.to_string())],
                };
            }
        };

        tracing::info!("Created snapshot {} in network {}", snapshot.id, network_id);
        let _ = state.set_string(&AttributePath::new("id"), snapshot.id.clone());
        apply_snapshot(&mut state, &snapshot);

        let mut diagnostics = vec![];
        let wait = state
            .get_bool(&AttributePath::new("wait_for_processed"))
            .unwrap_or(false);
        if wait {
            let interval = seconds_or(&state, "poll_interval_seconds", DEFAULT_POLL_INTERVAL_SECONDS);
            let timeout = seconds_or(&state, "timeout_seconds", DEFAULT_TIMEOUT_SECONDS);
            if let Err(e) = wait_for_processed(
                &ctx,
                &provider_data.client,
                &network_id,
                &snapshot.id,
                interval,
                timeout,
                &mut state,
            )
            .await
            {
                // The snapshot exists; returning state lets Terraform track it as tainted
                diagnostics.push(Diagnostic::error("Error waiting for snapshot", e.to_string()));
            }
        }

        CreateResourceResponse {
            new_state: state,
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
        let network_id = state
            .get_string(&AttributePath::new("network_id"))
            .unwrap_or_default();
        let snapshot_id = state
            .get_string(&AttributePath::new("id"))
            .unwrap_or_default();

        match provider_data
            .client
            .snapshots()
            .get(&ctx, &network_id, &snapshot_id)
            .await
        {
            Ok(snapshot) => {
                apply_snapshot(&mut state, &snapshot);
                ReadResourceResponse {
                    new_state: Some(state),
                    diagnostics: vec![],
                    private: request.private,
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Snapshot {} no longer exists, removing from state", snapshot_id);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                    private: request.private,
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(state),
                diagnostics: vec![Diagnostic::error("Error reading snapshot", e.to_string())],
                private: request.private,
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        // Every remote field forces replacement; only local settings change here
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
            .get_string(&AttributePath::new("id"))
            .unwrap_or_default();

        let mut diagnostics = vec![];
        match provider_data.client.snapshots().delete(&ctx, &snapshot_id).await {
            Ok(()) => tracing::info!("Deleted snapshot {}", snapshot_id),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(Diagnostic::error("Error deleting snapshot", e.to_string())),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for SnapshotResource {
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
impl ResourceWithImportState for SnapshotResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let Some(parts) = split_import_id(&request.id, 2) else {
            return ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![Diagnostic::error(
                    "Invalid import format",
                    "Use: network_id/snapshot_id",
                )],
            };
        };

        let mut state = DynamicValue::object();
        let _ = state.set_string(&AttributePath::new("network_id"), parts[0].clone());
        let _ = state.set_string(&AttributePath::new("id"), parts[1].clone());
        // Seed the local settings with their defaults so the next plan is clean
        let _ = state.set_bool(&AttributePath::new("wait_for_processed"), true);
        let _ = state.set_number(
            &AttributePath::new("poll_interval_seconds"),
            DEFAULT_POLL_INTERVAL_SECONDS as f64,
        );
        let _ = state.set_number(
            &AttributePath::new("timeout_seconds"),
            DEFAULT_TIMEOUT_SECONDS as f64,
        );

        ImportResourceStateResponse {
            imported_resources: vec![ImportedResource {
                type_name: request.type_name,
                state,
                private: vec![],
            }],
            diagnostics: vec![],
        }
    }
}
