//! Path analysis API implementation

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tfplug::Context;

use super::client::{decode_json, expect_status, require, Client};
use super::error::ApiError;

/// Query options for a path search. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct PathSearchParams {
    pub from: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub intent: String,
    pub snapshot_id: String,
    pub ip_proto: Option<i64>,
    pub src_port: String,
    pub dst_port: String,
    pub icmp_type: Option<i64>,
    pub tcp_flags: PathTcpFlags,
    pub app_id: String,
    pub user_id: String,
    pub user_group_id: String,
    pub url: String,
    pub include_tags: Option<bool>,
    pub include_network_functions: Option<bool>,
    pub max_candidates: Option<i64>,
    pub max_results: Option<i64>,
    pub max_return_path_results: Option<i64>,
    pub max_seconds: Option<i64>,
}

/// TCP flag filters, each 0 or 1
#[derive(Debug, Clone, Default)]
pub struct PathTcpFlags {
    pub fin: Option<i64>,
    pub syn: Option<i64>,
    pub rst: Option<i64>,
    pub psh: Option<i64>,
    pub ack: Option<i64>,
    pub urg: Option<i64>,
}

impl PathSearchParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();

        let mut text = |key: &'static str, value: &str| {
            if !value.is_empty() {
                query.push((key, value.to_string()));
            }
        };
        text("from", &self.from);
        text("srcIp", &self.src_ip);
        text("dstIp", &self.dst_ip);
        text("intent", &self.intent);
        text("snapshotId", &self.snapshot_id);

        let numbers = [
            ("ipProto", self.ip_proto),
            ("icmpType", self.icmp_type),
            ("fin", self.tcp_flags.fin),
            ("syn", self.tcp_flags.syn),
            ("rst", self.tcp_flags.rst),
            ("psh", self.tcp_flags.psh),
            ("ack", self.tcp_flags.ack),
            ("urg", self.tcp_flags.urg),
        ];
        query.extend(
            numbers
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v.to_string()))),
        );

        for (key, value) in [
            ("srcPort", &self.src_port),
            ("dstPort", &self.dst_port),
            ("appId", &self.app_id),
            ("userId", &self.user_id),
            ("userGroupId", &self.user_group_id),
            ("url", &self.url),
        ] {
            if !value.is_empty() {
                query.push((key, value.clone()));
            }
        }

        for (key, value) in [
            ("includeTags", self.include_tags),
            ("includeNetworkFunctions", self.include_network_functions),
        ] {
            if let Some(v) = value {
                query.push((key, v.to_string()));
            }
        }

        for (key, value) in [
            ("maxCandidates", self.max_candidates),
            ("maxResults", self.max_results),
            ("maxReturnPathResults", self.max_return_path_results),
            ("maxSeconds", self.max_seconds),
        ] {
            if let Some(v) = value {
                query.push((key, v.to_string()));
            }
        }

        query
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathSearchResult {
    pub src_ip_location_type: String,
    pub dst_ip_location_type: String,
    pub info: PathCollection,
    pub return_path_info: PathCollection,
    pub timed_out: bool,
    pub query_url: String,
    #[serde(rename = "unrecognizedValues")]
    pub unrecognized: PathUnrecognizedValues,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathCollection {
    pub paths: Vec<Path>,
    pub total_hits: TotalHits,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TotalHits {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: i64,
}

/// Values in the request the platform did not recognise
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathUnrecognizedValues {
    pub app_id: Vec<String>,
    pub user_id: Vec<String>,
    pub user_group_id: Vec<String>,
}

/// A single path through the network. Serializable so callers can hand
/// it back out as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Path {
    pub forwarding_outcome: String,
    pub security_outcome: String,
    pub hops: Vec<PathHop>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathHop {
    pub device_name: String,
    pub display_name: String,
    pub device_type: String,
    pub tags: Vec<String>,
    pub parse_error: Option<bool>,
    pub ingress_interface: String,
    pub egress_interface: String,
    pub behaviors: Vec<String>,
    pub network_functions: Option<PathNetworkFunction>,
    pub backfilled_from: String,
}

/// ACL and zone context for a hop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathNetworkFunction {
    pub acl: Vec<PathAcl>,
    pub ingress: PathInterfaceDetail,
    pub egress: PathInterfaceDetail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathAcl {
    pub name: String,
    pub context: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathInterfaceDetail {
    pub l2: PathInterface,
    pub l3: PathInterface,
    pub security_zone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathInterface {
    pub interface_name: String,
    pub vrf: String,
}

/// Path analysis API
pub struct PathAnalysisApi<'a> {
    client: &'a Client,
}

impl<'a> PathAnalysisApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /api/networks/{network}/paths
    pub async fn search(
        &self,
        ctx: &Context,
        network_id: &str,
        params: &PathSearchParams,
    ) -> Result<PathSearchResult, ApiError> {
        let network_id = require(network_id, "networkID")?;
        if params.dst_ip.is_empty() {
            return Err(ApiError::missing("dstIP"));
        }
        if params.from.is_empty() && params.src_ip.is_empty() {
            return Err(ApiError::missing("either from or srcIp"));
        }

        let url = self
            .client
            .endpoint(&["api", "networks", network_id, "paths"], &params.query());
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        let response = expect_status(response, &[StatusCode::OK], "searching paths").await?;
        decode_json(response, "path search response").await
    }
}
