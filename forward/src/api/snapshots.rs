//! Snapshot API implementation

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tfplug::Context;

use super::client::{decode_json, encode_json, expect_status, require, Client};
use super::error::ApiError;

/// A network snapshot. Absent strings decode as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub state: String,
    pub processing_trigger: String,
    pub parent_snapshot_id: String,
    pub note: String,
    pub favorited_by: String,
    pub favorited_by_user_id: String,
    pub creation_date_millis: Option<i64>,
    pub processed_at_millis: Option<i64>,
    pub restored_at_millis: Option<i64>,
    pub favorited_at_millis: Option<i64>,
    pub is_draft: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotListOptions {
    pub limit: Option<i64>,
    pub include_archived: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotCreateRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotList {
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

/// Snapshots API for snapshot operations
pub struct SnapshotsApi<'a> {
    client: &'a Client,
}

impl<'a> SnapshotsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /api/networks/{network}/snapshots
    pub async fn list(
        &self,
        ctx: &Context,
        network_id: &str,
        options: &SnapshotListOptions,
    ) -> Result<Vec<Snapshot>, ApiError> {
        let network_id = require(network_id, "networkID")?;

        let mut query = Vec::new();
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(include_archived) = options.include_archived {
            query.push(("includeArchived", include_archived.to_string()));
        }

        let url = self
            .client
            .endpoint(&["api", "networks", network_id, "snapshots"], &query);
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        let response = expect_status(response, &[StatusCode::OK], "retrieving snapshots").await?;
        let list: SnapshotList = decode_json(response, "snapshots response").await?;
        Ok(list.snapshots)
    }

    /// POST /api/networks/{network}/snapshots
    pub async fn create(
        &self,
        ctx: &Context,
        network_id: &str,
        request: &SnapshotCreateRequest,
    ) -> Result<Snapshot, ApiError> {
        let network_id = require(network_id, "networkID")?;
        let body = encode_json(request, "snapshot request")?;

        let url = self
            .client
            .endpoint(&["api", "networks", network_id, "snapshots"], &[]);
        let response = self.client.send(ctx, Method::POST, url, Some(body)).await?;
        let response = expect_status(
            response,
            &[StatusCode::OK, StatusCode::CREATED, StatusCode::ACCEPTED],
            "creating snapshot",
        )
        .await?;
        decode_json(response, "snapshot create response").await
    }

    /// GET /api/networks/{network}/snapshots/{snapshot}
    pub async fn get(
        &self,
        ctx: &Context,
        network_id: &str,
        snapshot_id: &str,
    ) -> Result<Snapshot, ApiError> {
        let (network_id, snapshot_id) =
            match (require(network_id, "networkID"), require(snapshot_id, "snapshotID")) {
                (Ok(n), Ok(s)) => (n, s),
                _ => return Err(ApiError::missing("networkID and snapshotID")),
            };

        let url = self.client.endpoint(
            &["api", "networks", network_id, "snapshots", snapshot_id],
            &[],
        );
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!(
                "snapshot {} not found",
                snapshot_id
            )));
        }
        let response = expect_status(response, &[StatusCode::OK], "retrieving snapshot").await?;
        decode_json(response, "snapshot response").await
    }

    /// DELETE /api/snapshots/{snapshot}; an already deleted snapshot is success
    pub async fn delete(&self, ctx: &Context, snapshot_id: &str) -> Result<(), ApiError> {
        let snapshot_id = require(snapshot_id, "snapshotID")?;

        let url = self.client.endpoint(&["api", "snapshots", snapshot_id], &[]);
        let response = self.client.send(ctx, Method::DELETE, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("snapshot {} already deleted", snapshot_id);
            return Ok(());
        }
        expect_status(
            response,
            &[StatusCode::OK, StatusCode::NO_CONTENT],
            "deleting snapshot",
        )
        .await?;
        Ok(())
    }
}
