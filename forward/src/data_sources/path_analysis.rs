//! Path analysis data source implementation

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

use crate::api::path_analysis::{Path, PathSearchParams, PathTcpFlags, PathUnrecognizedValues};
use crate::provider_data::{from_configure, unconfigured_provider, Component};
use crate::ForwardProviderData;

const STRING_INPUTS: [(&str, &str); 10] = [
    ("from", "Source device name."),
    ("src_ip", "Source IP address."),
    ("intent", "Path analysis intent (for example PREFER_DELIVERED)."),
    ("snapshot_id", "Snapshot to search. Defaults to the latest processed snapshot."),
    ("src_port", "Source port or port range."),
    ("dst_port", "Destination port or port range."),
    ("app_id", "Application identifier."),
    ("user_id", "User identifier."),
    ("user_group_id", "User group identifier."),
    ("url", "URL matched by application-aware devices."),
];

const NUMBER_INPUTS: [(&str, &str); 12] = [
    ("ip_proto", "IP protocol number."),
    ("icmp_type", "ICMP type."),
    ("tcp_fin", "TCP FIN flag (0 or 1)."),
    ("tcp_syn", "TCP SYN flag (0 or 1)."),
    ("tcp_rst", "TCP RST flag (0 or 1)."),
    ("tcp_psh", "TCP PSH flag (0 or 1)."),
    ("tcp_ack", "TCP ACK flag (0 or 1)."),
    ("tcp_urg", "TCP URG flag (0 or 1)."),
    ("max_candidates", "Maximum number of candidate paths to consider."),
    ("max_results", "Maximum number of paths to return."),
    ("max_return_path_results", "Maximum number of return paths to return."),
    ("max_seconds", "Search time budget in seconds."),
];

#[derive(Default)]
pub struct PathAnalysisDataSource {
    provider_data: Option<ForwardProviderData>,
}

impl PathAnalysisDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn text(config: &DynamicValue, name: &str) -> String {
    config
        .get_string(&AttributePath::new(name))
        .unwrap_or_default()
}

fn int(config: &DynamicValue, name: &str) -> Option<i64> {
    config.get_i64(&AttributePath::new(name)).ok()
}

fn flag(config: &DynamicValue, name: &str) -> Option<bool> {
    config.get_bool(&AttributePath::new(name)).ok()
}

fn build_params(config: &DynamicValue) -> PathSearchParams {
    PathSearchParams {
        from: text(config, "from"),
        src_ip: text(config, "src_ip"),
        dst_ip: text(config, "dst_ip"),
        intent: text(config, "intent"),
        snapshot_id: text(config, "snapshot_id"),
        ip_proto: int(config, "ip_proto"),
        src_port: text(config, "src_port"),
        dst_port: text(config, "dst_port"),
        icmp_type: int(config, "icmp_type"),
        tcp_flags: PathTcpFlags {
            fin: int(config, "tcp_fin"),
            syn: int(config, "tcp_syn"),
            rst: int(config, "tcp_rst"),
            psh: int(config, "tcp_psh"),
            ack: int(config, "tcp_ack"),
            urg: int(config, "tcp_urg"),
        },
        app_id: text(config, "app_id"),
        user_id: text(config, "user_id"),
        user_group_id: text(config, "user_group_id"),
        url: text(config, "url"),
        include_tags: flag(config, "include_tags"),
        include_network_functions: flag(config, "include_network_functions"),
        max_candidates: int(config, "max_candidates"),
        max_results: int(config, "max_results"),
        max_return_path_results: int(config, "max_return_path_results"),
        max_seconds: int(config, "max_seconds"),
    }
}

/// One JSON document per path; no paths is null
fn encode_paths(paths: &[Path]) -> Result<Dynamic, serde_json::Error> {
    if paths.is_empty() {
        return Ok(Dynamic::Null);
    }
    let encoded = paths
        .iter()
        .map(|path| serde_json::to_string(path).map(Dynamic::String))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Dynamic::List(encoded))
}

fn unrecognized_map(values: &PathUnrecognizedValues) -> Dynamic {
    let map: HashMap<String, Dynamic> = [
        ("app_id", &values.app_id),
        ("user_id", &values.user_id),
        ("user_group_id", &values.user_group_id),
    ]
    .into_iter()
    .map(|(key, list)| (key.to_string(), Dynamic::string_list_or_null(list)))
    .collect();
    Dynamic::Map(map)
}

#[async_trait]
impl DataSource for PathAnalysisDataSource {
    fn type_name(&self) -> &str {
        "forward_path_analysis"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description("Execute a path analysis query using the Forward Networks API.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("network_id", AttributeType::String)
                    .description("Network identifier. Defaults to the provider `network_id` when omitted.")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("dst_ip", AttributeType::String)
                    .description("Destination IP address.")
                    .required()
                    .build(),
            );

        for (name, description) in STRING_INPUTS {
            builder = builder.attribute(
                AttributeBuilder::new(name, AttributeType::String)
                    .description(description)
                    .optional()
                    .build(),
            );
        }
        for (name, description) in NUMBER_INPUTS {
            builder = builder.attribute(
                AttributeBuilder::new(name, AttributeType::Number)
                    .description(description)
                    .optional()
                    .build(),
            );
        }

        let schema = builder
            .attribute(
                AttributeBuilder::new("include_tags", AttributeType::Bool)
                    .description("Include device tags in hop details.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("include_network_functions", AttributeType::Bool)
                    .description("Include ACL and zone details for each hop.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("src_ip_location_type", AttributeType::String)
                    .description("How the source address was located.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("dst_ip_location_type", AttributeType::String)
                    .description("How the destination address was located.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("timed_out", AttributeType::Bool)
                    .description("Whether the search hit its time budget.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("query_url", AttributeType::String)
                    .description("Link to the search in the Forward Enterprise UI.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("paths_json", AttributeType::list_of(AttributeType::String))
                    .description("Path results encoded as JSON strings.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "return_paths_json",
                    AttributeType::list_of(AttributeType::String),
                )
                .description("Return path results encoded as JSON strings.")
                .computed()
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "unrecognized_values",
                    AttributeType::map_of(AttributeType::list_of(AttributeType::String)),
                )
                .description("Input values the platform did not recognize, keyed by input.")
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
                diagnostics: vec![unconfigured_provider()],
            };
        };

        let mut state = request.config;
        let params = build_params(&state);
        if params.from.is_empty() && params.src_ip.is_empty() {
            return ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error(
                    "Invalid configuration",
                    "Either from or src_ip must be supplied.",
                )
                .with_attribute(AttributePath::new("from"))],
            };
        }

        let network_id =
            provider_data.network_or(state.get_string(&AttributePath::new("network_id")).ok());
        let result = match provider_data
            .client
            .path_analysis()
            .search(&ctx, &network_id, &params)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics: vec![Diagnostic::error(
                        "Error executing path analysis",
                        e.to_string(),
                    )],
                };
            }
        };

        tracing::debug!(
            "Path search returned {} paths and {} return paths",
            result.info.paths.len(),
            result.return_path_info.paths.len()
        );

        let (paths, return_paths) = match (
            encode_paths(&result.info.paths),
            encode_paths(&result.return_path_info.paths),
        ) {
            (Ok(paths), Ok(return_paths)) => (paths, return_paths),
            (Err(e), _) | (_, Err(e)) => {
                return ReadDataSourceResponse {
                    state: DynamicValue::null(),
                    diagnostics: vec![Diagnostic::error("Failed to marshal path", e.to_string())],
                };
            }
        };

        let _ = state.set_string(&AttributePath::new("network_id"), network_id);
        let _ = state.set_string(
            &AttributePath::new("src_ip_location_type"),
            result.src_ip_location_type,
        );
        let _ = state.set_string(
            &AttributePath::new("dst_ip_location_type"),
            result.dst_ip_location_type,
        );
        let _ = state.set_bool(&AttributePath::new("timed_out"), result.timed_out);
        let _ = state.set_string(&AttributePath::new("query_url"), result.query_url);
        let _ = state.set(&AttributePath::new("paths_json"), paths);
        let _ = state.set(&AttributePath::new("return_paths_json"), return_paths);
        let _ = state.set(
            &AttributePath::new("unrecognized_values"),
            unrecognized_map(&result.unrecognized),
        );

        ReadDataSourceResponse {
            state,
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for PathAnalysisDataSource {
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
    use crate::provider_data::test_support::{as_any, provider_data};
    use mockito::{Matcher, Server};
    use tfplug::types::ClientCapabilities;

    fn config(entries: &[(&str, Dynamic)]) -> DynamicValue {
        let map: HashMap<String, Dynamic> = entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        DynamicValue::new(Dynamic::Map(map))
    }

    fn read_request(entries: &[(&str, Dynamic)]) -> ReadDataSourceRequest {
        ReadDataSourceRequest {
            type_name: "forward_path_analysis".to_string(),
            config: config(entries),
            provider_meta: None,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    async fn configured(url: &str) -> PathAnalysisDataSource {
        let mut data_source = PathAnalysisDataSource::new();
        data_source
            .configure(
                Context::new(),
                ConfigureDataSourceRequest {
                    provider_data: as_any(provider_data(url)),
                },
            )
            .await;
        data_source
    }

    #[test]
    fn params_copy_set_inputs_only() {
        let params = build_params(&config(&[
            ("src_ip", Dynamic::String("10.0.0.1".into())),
            ("dst_ip", Dynamic::String("10.0.1.1".into())),
            ("ip_proto", Dynamic::Number(6.0)),
            ("tcp_syn", Dynamic::Number(1.0)),
            ("include_tags", Dynamic::Bool(true)),
            ("from", Dynamic::Null),
        ]));

        assert_eq!(params.src_ip, "10.0.0.1");
        assert!(params.from.is_empty());
        assert_eq!(params.ip_proto, Some(6));
        assert_eq!(params.tcp_flags.syn, Some(1));
        assert_eq!(params.tcp_flags.ack, None);
        assert_eq!(params.include_tags, Some(true));
        assert_eq!(params.max_seconds, None);
    }

    #[test]
    fn schema_lists_every_input() {
        let data_source = PathAnalysisDataSource::new();
        let schema = tokio_test::block_on(
            data_source.schema(Context::new(), DataSourceSchemaRequest),
        )
        .schema;

        for name in STRING_INPUTS
            .iter()
            .chain(NUMBER_INPUTS.iter())
            .map(|(name, _)| *name)
            .chain(["network_id", "dst_ip", "include_tags", "include_network_functions"])
        {
            let attribute = schema.block.attribute(name).unwrap();
            assert!(attribute.optional || attribute.required, "{} is an input", name);
        }
        assert!(schema.block.attribute("dst_ip").unwrap().required);
    }

    #[tokio::test]
    async fn read_encodes_paths_and_unrecognized_values() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/networks/net-1/paths")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("srcIp".into(), "10.0.0.1".into()),
                Matcher::UrlEncoded("dstIp".into(), "10.0.1.1".into()),
            ]))
            .with_body(
                r#"{
                    "srcIpLocationType": "INTERFACE",
                    "dstIpLocationType": "HOST",
                    "info": {
                        "paths": [{"forwardingOutcome": "DELIVERED", "securityOutcome": "PERMITTED", "hops": [{"deviceName": "edge-1"}]}],
                        "totalHits": {"type": "EXACT", "value": 1}
                    },
                    "returnPathInfo": {"paths": []},
                    "timedOut": false,
                    "queryUrl": "https://fwd.example.com/search?q=1",
                    "unrecognizedValues": {"appId": ["crm"]}
                }"#,
            )
            .create_async()
            .await;

        let data_source = configured(&server.url()).await;
        let response = data_source
            .read(
                Context::new(),
                read_request(&[
                    ("src_ip", Dynamic::String("10.0.0.1".into())),
                    ("dst_ip", Dynamic::String("10.0.1.1".into())),
                ]),
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state;
        assert_eq!(
            state.get_string(&AttributePath::new("src_ip_location_type")).unwrap(),
            "INTERFACE"
        );
        assert!(!state.get_bool(&AttributePath::new("timed_out")).unwrap());

        let paths = state.get_string_list(&AttributePath::new("paths_json")).unwrap();
        assert_eq!(paths.len(), 1);
        let path: serde_json::Value = serde_json::from_str(&paths[0]).unwrap();
        assert_eq!(path["forwardingOutcome"], "DELIVERED");
        assert_eq!(path["hops"][0]["deviceName"], "edge-1");

        assert!(state
            .get(&AttributePath::new("return_paths_json"))
            .unwrap()
            .is_null());
        assert_eq!(
            state
                .get_string_list(&AttributePath::new("unrecognized_values").key("app_id"))
                .unwrap(),
            vec!["crm".to_string()]
        );
        assert!(state
            .get(&AttributePath::new("unrecognized_values").key("user_id"))
            .unwrap()
            .is_null());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn read_requires_source() {
        let data_source = configured("http://127.0.0.1:9").await;
        let response = data_source
            .read(
                Context::new(),
                read_request(&[("dst_ip", Dynamic::String("10.0.1.1".into()))]),
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Invalid configuration");
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("from"))
        );
    }

    #[tokio::test]
    async fn read_reports_search_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/networks/net-1/paths")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("unknown device")
            .create_async()
            .await;

        let data_source = configured(&server.url()).await;
        let response = data_source
            .read(
                Context::new(),
                read_request(&[
                    ("from", Dynamic::String("edge-9".into())),
                    ("dst_ip", Dynamic::String("10.0.1.1".into())),
                ]),
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Error executing path analysis");
    }

    #[tokio::test]
    async fn unconfigured_provider_is_reported() {
        let data_source = PathAnalysisDataSource::new();
        let response = data_source
            .read(
                Context::new(),
                read_request(&[("dst_ip", Dynamic::String("10.0.1.1".into()))]),
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Unconfigured Provider");
    }
}
