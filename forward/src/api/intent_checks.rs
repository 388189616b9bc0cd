//! Intent check API implementation

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tfplug::Context;

use super::client::{decode_json, encode_json, expect_status, require, Client};
use super::error::ApiError;

/// The check definition is passed through as an opaque JSON object
pub type CheckDefinition = serde_json::Map<String, serde_json::Value>;

/// Payload for adding a check to a snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCheckRequest {
    pub definition: Option<CheckDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf_monitoring_enabled: Option<bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub priority: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Outcome of an intent check execution
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckResult {
    pub id: String,
    pub name: String,
    pub status: String,
    pub priority: String,
    pub description: String,
    pub note: String,
    pub creator: String,
    pub creator_id: String,
    pub editor: String,
    pub editor_id: String,
    pub enabled: Option<bool>,
    pub perf_monitoring_enabled: Option<bool>,
    pub tags: Vec<String>,
    pub num_violations: Option<i64>,
    pub creation_date_millis: Option<i64>,
    pub definition_date_millis: Option<i64>,
    pub edit_date_millis: Option<i64>,
    pub execution_date_millis: Option<i64>,
    pub execution_duration_millis: Option<i64>,
    pub definition: serde_json::Value,
}

/// A single check lookup also carries the violation diagnosis
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResultWithDiagnosis {
    #[serde(flatten)]
    pub result: CheckResult,
    #[serde(default)]
    pub diagnosis: Option<CheckDiagnosis>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckDiagnosis {
    pub summary: String,
    pub details: Vec<DiagnosisDetail>,
    pub details_incomplete: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiagnosisDetail {
    pub query: String,
    pub references: Vec<DiagnosisReference>,
}

/// Links a finding to device files
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiagnosisReference {
    pub key: String,
    pub value: String,
    pub files: HashMap<String, Vec<LineRange>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LineRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

/// Filters for listing checks; blank entries are ignored
#[derive(Debug, Clone, Default)]
pub struct CheckListOptions {
    pub types: Vec<String>,
    pub statuses: Vec<String>,
    pub priorities: Vec<String>,
}

impl CheckListOptions {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        for (key, values) in [
            ("status", &self.statuses),
            ("priority", &self.priorities),
            ("type", &self.types),
        ] {
            query.extend(
                values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v.to_string())),
            );
        }
        query
    }
}

/// Intent checks API for check operations
pub struct IntentChecksApi<'a> {
    client: &'a Client,
}

impl<'a> IntentChecksApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /api/snapshots/{snapshot}/checks
    pub async fn list(
        &self,
        ctx: &Context,
        snapshot_id: &str,
        options: &CheckListOptions,
    ) -> Result<Vec<CheckResult>, ApiError> {
        let snapshot_id = require(snapshot_id, "snapshotID")?;

        let url = self
            .client
            .endpoint(&["api", "snapshots", snapshot_id, "checks"], &options.query());
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        let response = expect_status(response, &[StatusCode::OK], "retrieving checks").await?;
        decode_json(response, "checks response").await
    }

    /// POST /api/snapshots/{snapshot}/checks
    pub async fn add(
        &self,
        ctx: &Context,
        snapshot_id: &str,
        request: &NewCheckRequest,
        persistent: Option<bool>,
    ) -> Result<CheckResult, ApiError> {
        let snapshot_id = require(snapshot_id, "snapshotID")?;
        if request.definition.is_none() {
            return Err(ApiError::missing("definition"));
        }
        let body = encode_json(request, "check payload")?;

        let query: Vec<(&str, String)> = persistent
            .map(|p| ("persistent", p.to_string()))
            .into_iter()
            .collect();
        let url = self
            .client
            .endpoint(&["api", "snapshots", snapshot_id, "checks"], &query);
        let response = self.client.send(ctx, Method::POST, url, Some(body)).await?;
        let response = expect_status(response, &[StatusCode::OK], "creating check").await?;
        decode_json(response, "create check response").await
    }

    /// GET /api/snapshots/{snapshot}/checks/{check}
    pub async fn get(
        &self,
        ctx: &Context,
        snapshot_id: &str,
        check_id: &str,
    ) -> Result<CheckResultWithDiagnosis, ApiError> {
        let (snapshot_id, check_id) = both(snapshot_id, check_id)?;

        let url = self
            .client
            .endpoint(&["api", "snapshots", snapshot_id, "checks", check_id], &[]);
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("check {} not found", check_id)));
        }
        let response = expect_status(response, &[StatusCode::OK], "retrieving check").await?;
        decode_json(response, "check response").await
    }

    /// DELETE /api/snapshots/{snapshot}/checks/{check}
    pub async fn deactivate(
        &self,
        ctx: &Context,
        snapshot_id: &str,
        check_id: &str,
    ) -> Result<(), ApiError> {
        let (snapshot_id, check_id) = both(snapshot_id, check_id)?;

        let url = self
            .client
            .endpoint(&["api", "snapshots", snapshot_id, "checks", check_id], &[]);
        let response = self.client.send(ctx, Method::DELETE, url, None).await?;
        expect_status(response, &[StatusCode::OK], "deactivating check").await?;
        Ok(())
    }

    /// DELETE /api/snapshots/{snapshot}/checks
    pub async fn deactivate_all(&self, ctx: &Context, snapshot_id: &str) -> Result<(), ApiError> {
        let snapshot_id = require(snapshot_id, "snapshotID")?;

        let url = self
            .client
            .endpoint(&["api", "snapshots", snapshot_id, "checks"], &[]);
        let response = self.client.send(ctx, Method::DELETE, url, None).await?;
        expect_status(response, &[StatusCode::OK], "deactivating checks").await?;
        Ok(())
    }
}

fn both<'s>(snapshot_id: &'s str, check_id: &'s str) -> Result<(&'s str, &'s str), ApiError> {
    match (require(snapshot_id, "snapshotID"), require(check_id, "checkID")) {
        (Ok(s), Ok(c)) => Ok((s, c)),
        _ => Err(ApiError::missing("snapshotID and checkID")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    #[test]
    fn list_query_skips_blank_filters() {
        let options = CheckListOptions {
            types: vec!["NQE".into()],
            statuses: vec![" FAIL ".into(), "".into(), "PASS".into()],
            priorities: vec!["   ".into()],
        };
        assert_eq!(
            options.query(),
            vec![
                ("status", "FAIL".to_string()),
                ("status", "PASS".to_string()),
                ("type", "NQE".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn list_sends_repeated_filters() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/snapshots/s-1/checks")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "FAIL".into()),
                Matcher::UrlEncoded("priority".into(), "HIGH".into()),
            ]))
            .with_body(r#"[{"id":"c-1","status":"FAIL","numViolations":3,"tags":["core"]}]"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let checks = client
            .intent_checks()
            .list(
                &Context::new(),
                "s-1",
                &CheckListOptions {
                    statuses: vec!["FAIL".into()],
                    priorities: vec!["HIGH".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].num_violations, Some(3));
        assert_eq!(checks[0].tags, vec!["core".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn add_requires_definition() {
        let client = create_test_client("http://127.0.0.1:9");
        let err = client
            .intent_checks()
            .add(&Context::new(), "s-1", &NewCheckRequest::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "definition must be provided");
    }

    #[tokio::test]
    async fn add_posts_definition_with_persistence_flag() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/snapshots/s-1/checks")
            .match_query(Matcher::UrlEncoded("persistent".into(), "false".into()))
            .match_body(Matcher::PartialJsonString(
                r#"{"definition":{"checkType":"Existential"},"name":"web reachable","tags":["edge"]}"#
                    .into(),
            ))
            .with_body(r#"{"id":"c-7","status":"PASS","enabled":true}"#)
            .create_async()
            .await;

        let mut definition = CheckDefinition::new();
        definition.insert("checkType".into(), "Existential".into());

        let client = create_test_client(&server.url());
        let result = client
            .intent_checks()
            .add(
                &Context::new(),
                "s-1",
                &NewCheckRequest {
                    definition: Some(definition),
                    name: "web reachable".into(),
                    tags: vec!["edge".into()],
                    ..Default::default()
                },
                Some(false),
            )
            .await
            .unwrap();

        assert_eq!(result.id, "c-7");
        assert_eq!(result.enabled, Some(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_decodes_diagnosis() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/snapshots/s-1/checks/c-1")
            .with_body(
                r#"{"id":"c-1","status":"FAIL","diagnosis":{
                    "summary":"2 violations",
                    "details":[{"query":"q","references":[{"key":"device","value":"r1",
                        "files":{"r1.cfg":[{"start":3,"end":9}]}}]}],
                    "detailsIncomplete":false}}"#,
            )
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let check = client
            .intent_checks()
            .get(&Context::new(), "s-1", "c-1")
            .await
            .unwrap();

        assert_eq!(check.result.status, "FAIL");
        let diagnosis = check.diagnosis.unwrap();
        assert_eq!(diagnosis.summary, "2 violations");
        let range = &diagnosis.details[0].references[0].files["r1.cfg"][0];
        assert_eq!((range.start, range.end), (Some(3), Some(9)));
    }

    #[tokio::test]
    async fn get_maps_404_to_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/snapshots/s-1/checks/c-gone")
            .with_status(404)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let err = client
            .intent_checks()
            .get(&Context::new(), "s-1", "c-gone")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn deactivate_single_and_all() {
        let mut server = Server::new_async().await;
        let one = server
            .mock("DELETE", "/api/snapshots/s-1/checks/c-1")
            .create_async()
            .await;
        let all = server
            .mock("DELETE", "/api/snapshots/s-1/checks")
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let api = client.intent_checks();
        api.deactivate(&Context::new(), "s-1", "c-1").await.unwrap();
        api.deactivate_all(&Context::new(), "s-1").await.unwrap();

        one.assert_async().await;
        all.assert_async().await;
    }

    #[tokio::test]
    async fn deactivate_requires_both_ids() {
        let client = create_test_client("http://127.0.0.1:9");
        let err = client
            .intent_checks()
            .deactivate(&Context::new(), "s-1", " ")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "snapshotID and checkID must be provided");
    }
}
