//! Network Query Engine API implementation

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tfplug::Context;

use super::client::{decode_json, encode_json, expect_status, Client};
use super::error::ApiError;

/// Body for executing a query. Either `query` (inline source) or
/// `query_id` (committed library query) identifies what runs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NqeQueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_options: Option<NqeQueryOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NqeQueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortOrder>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub column_filters: Vec<ColumnFilter>,
}

impl NqeQueryOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOrder {
    pub column_name: String,
    /// ASC or DESC
    #[serde(skip_serializing_if = "String::is_empty")]
    pub order: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnFilter {
    pub column_name: String,
    pub operator: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub lower_bound: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub upper_bound: String,
}

/// Rows are kept as untyped JSON; their shape depends on the query
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NqeRunResult {
    pub snapshot_id: String,
    pub items: Vec<Value>,
    pub total_num_items: Option<i64>,
}

/// A committed query from the NQE library
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NqeQuery {
    pub query_id: String,
    pub repository: String,
    pub path: String,
    pub intent: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NqeDiffRequest {
    pub query_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<NqeQueryOptions>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NqeDiffResult {
    pub rows: Vec<NqeDiffEntry>,
    pub total_num_rows: Option<i32>,
}

/// One changed row; `before` is absent for additions, `after` for deletions
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NqeDiffEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub before: Option<NqeRecord>,
    pub after: Option<NqeRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NqeRecord {
    pub fields: HashMap<String, Value>,
}

/// NQE API for query execution and the query library
pub struct NqeApi<'a> {
    client: &'a Client,
}

impl<'a> NqeApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// POST /api/nqe?snapshotId=&networkId=
    pub async fn run_query(
        &self,
        ctx: &Context,
        network_id: &str,
        snapshot_id: &str,
        request: &NqeQueryRequest,
    ) -> Result<NqeRunResult, ApiError> {
        if request.query.is_none() && request.query_id.is_none() {
            return Err(ApiError::missing("either query or query_id"));
        }

        let mut query = Vec::new();
        if !snapshot_id.is_empty() {
            query.push(("snapshotId", snapshot_id.to_string()));
        }
        if !network_id.is_empty() {
            query.push(("networkId", network_id.to_string()));
        }
        if query.is_empty() {
            return Err(ApiError::InvalidArgument(
                "either snapshotID or networkID must be supplied".to_string(),
            ));
        }

        let body = encode_json(request, "nqe request")?;
        let url = self.client.endpoint(&["api", "nqe"], &query);
        let response = self.client.send(ctx, Method::POST, url, Some(body)).await?;
        let response = expect_status(response, &[StatusCode::OK], "running NQE query").await?;
        decode_json(response, "NQE response").await
    }

    /// GET /api/nqe/queries?dir=
    pub async fn list_queries(&self, ctx: &Context, dir: &str) -> Result<Vec<NqeQuery>, ApiError> {
        let query: Vec<(&str, String)> = if dir.trim().is_empty() {
            Vec::new()
        } else {
            vec![("dir", dir.to_string())]
        };

        let url = self.client.endpoint(&["api", "nqe", "queries"], &query);
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        let response = expect_status(response, &[StatusCode::OK], "listing NQE queries").await?;
        decode_json(response, "NQE query list").await
    }

    /// POST /api/nqe-diffs/{before}/{after}
    pub async fn run_diff(
        &self,
        ctx: &Context,
        before_snapshot_id: &str,
        after_snapshot_id: &str,
        request: &NqeDiffRequest,
    ) -> Result<NqeDiffResult, ApiError> {
        let before = before_snapshot_id.trim();
        let after = after_snapshot_id.trim();
        if before.is_empty() || after.is_empty() {
            return Err(ApiError::missing("beforeSnapshotID and afterSnapshotID"));
        }
        if request.query_id.is_empty() {
            return Err(ApiError::missing("queryId"));
        }

        let body = encode_json(request, "NQE diff request")?;
        let url = self.client.endpoint(&["api", "nqe-diffs", before, after], &[]);
        let response = self.client.send(ctx, Method::POST, url, Some(body)).await?;
        let response = expect_status(response, &[StatusCode::OK], "running NQE diff").await?;
        decode_json(response, "NQE diff response").await
    }
}
