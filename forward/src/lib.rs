pub mod api;
pub mod data_sources;
pub mod provider_data;
pub mod resources;

pub use provider_data::ForwardProviderData;

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder, StringKind};
use tfplug::types::{AttributePath, Diagnostic};
use tfplug::validator::StringNotBlank;

const ENV_BASE_URL: &str = "FORWARD_BASE_URL";
const ENV_API_KEY: &str = "FORWARD_API_KEY";
const ENV_API_KEY_LEGACY: &str = "FORWARD_API_TOKEN";
const ENV_NETWORK_ID: &str = "FORWARD_NETWORK_ID";

pub struct ForwardProvider {
    version: String,
}

impl Default for ForwardProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardProvider {
    pub fn new() -> Self {
        Self::with_version(env!("CARGO_PKG_VERSION"))
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// Non-empty config string, else the first non-empty environment variable
fn config_or_env(config: Option<String>, vars: &[&str]) -> Option<String> {
    config.filter(|v| !v.is_empty()).or_else(|| {
        vars.iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.is_empty())
    })
}

#[async_trait]
impl Provider for ForwardProvider {
    fn type_name(&self) -> &str {
        "forward"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description(
                "Use the Forward Enterprise provider to interact with the Forward Networks platform APIs.",
            )
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("base_url", AttributeType::String)
                    .description("Base URL for the Forward Networks API, for example `https://fwd.app`. Falls back to `FORWARD_BASE_URL`.")
                    .optional()
                    .validator(StringNotBlank::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("api_key", AttributeType::String)
                    .description("API key used to authenticate requests. Falls back to `FORWARD_API_KEY`, then `FORWARD_API_TOKEN`.")
                    .optional()
                    .sensitive()
                    .validator(StringNotBlank::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("insecure", AttributeType::Bool)
                    .description("Disable TLS certificate verification (not recommended).")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("network_id", AttributeType::String)
                    .description("Default network used by resources and data sources that do not set one. Falls back to `FORWARD_NETWORK_ID`.")
                    .optional()
                    .validator(StringNotBlank::create())
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let config = &request.config;
        let mut diagnostics = vec![];

        let base_url = config_or_env(
            config.get_string(&AttributePath::new("base_url")).ok(),
            &[ENV_BASE_URL],
        );
        let api_key = config_or_env(
            config.get_string(&AttributePath::new("api_key")).ok(),
            &[ENV_API_KEY, ENV_API_KEY_LEGACY],
        );
        let network_id = config_or_env(
            config.get_string(&AttributePath::new("network_id")).ok(),
            &[ENV_NETWORK_ID],
        );
        let insecure = config
            .get_bool(&AttributePath::new("insecure"))
            .unwrap_or(false);

        let (base_url, api_key, network_id) = match (base_url, api_key, network_id) {
            (None, _, _) => {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing Base URL",
                        "The provider cannot create the Forward Networks client because the `base_url` attribute is empty. \
                         Set the `base_url` attribute in the Terraform configuration or define the `FORWARD_BASE_URL` environment variable.",
                    )
                    .with_attribute(AttributePath::new("base_url")),
                );
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
            (_, None, _) => {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing API Key",
                        "The provider cannot create the Forward Networks client because the `api_key` attribute is empty. \
                         Set the `api_key` attribute or the `FORWARD_API_KEY` environment variable.",
                    )
                    .with_attribute(AttributePath::new("api_key")),
                );
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
            (_, _, None) => {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing Network ID",
                        "The provider cannot create the Forward Networks client because the `network_id` attribute is empty. \
                         Set the `network_id` attribute in the Terraform configuration or define the `FORWARD_NETWORK_ID` environment variable.",
                    )
                    .with_attribute(AttributePath::new("network_id")),
                );
                return ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                };
            }
            (Some(b), Some(k), Some(n)) => (b, k, n),
        };

        let client_config = api::ClientConfig {
            insecure,
            user_agent: format!("terraform-provider-forward/{}", self.version),
            ..api::ClientConfig::new(base_url, api_key)
        };

        match api::Client::new(client_config) {
            Ok(client) => {
                tracing::info!(
                    "Configured Forward Networks client for {} (network {})",
                    client.base_url(),
                    network_id
                );
                let data = ForwardProviderData::new(client, network_id);
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: Some(Arc::new(data) as Arc<dyn Any + Send + Sync>),
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Unable to Configure Forward Networks Client",
                    e.to_string(),
                ));
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                }
            }
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert("forward_snapshot".to_string(), || {
            Box::new(resources::SnapshotResource::new()) as Box<dyn ResourceWithConfigure>
        });
        resources.insert("forward_intent_check".to_string(), || {
            Box::new(resources::IntentCheckResource::new()) as Box<dyn ResourceWithConfigure>
        });
        resources.insert("forward_nqe_query_definition".to_string(), || {
            Box::new(resources::NqeQueryResource::new()) as Box<dyn ResourceWithConfigure>
        });
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert("forward_version".to_string(), || {
            Box::new(data_sources::VersionDataSource::new()) as Box<dyn DataSourceWithConfigure>
        });
        data_sources.insert("forward_snapshots".to_string(), || {
            Box::new(data_sources::SnapshotsDataSource::new()) as Box<dyn DataSourceWithConfigure>
        });
        data_sources.insert("forward_intent_checks".to_string(), || {
            Box::new(data_sources::IntentChecksDataSource::new())
                as Box<dyn DataSourceWithConfigure>
        });
        data_sources.insert("forward_nqe_query".to_string(), || {
            Box::new(data_sources::NqeQueryDataSource::new()) as Box<dyn DataSourceWithConfigure>
        });
        data_sources.insert("forward_path_analysis".to_string(), || {
            Box::new(data_sources::PathAnalysisDataSource::new())
                as Box<dyn DataSourceWithConfigure>
        });
        data_sources
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tfplug::types::{ClientCapabilities, Dynamic, DynamicValue};

    const ALL_VARS: [&str; 4] = [ENV_BASE_URL, ENV_API_KEY, ENV_API_KEY_LEGACY, ENV_NETWORK_ID];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    fn request(entries: &[(&str, Dynamic)]) -> ConfigureProviderRequest {
        let mut values: HashMap<String, Dynamic> = ["base_url", "api_key", "insecure", "network_id"]
            .iter()
            .map(|name| (name.to_string(), Dynamic::Null))
            .collect();
        for (name, value) in entries {
            values.insert(name.to_string(), value.clone());
        }
        ConfigureProviderRequest {
            terraform_version: "1.9.0".to_string(),
            config: DynamicValue::new(Dynamic::Map(values)),
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[tokio::test]
    #[serial]
    async fn provider_configures_successfully_with_env_vars() {
        clear_env();
        std::env::set_var(ENV_BASE_URL, "https://fwd.example.com");
        std::env::set_var(ENV_API_KEY_LEGACY, "legacy-token");
        std::env::set_var(ENV_NETWORK_ID, "net-env");

        let mut provider = ForwardProvider::new();
        let response = provider.configure(Context::new(), request(&[])).await;

        assert!(response.diagnostics.is_empty());
        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<ForwardProviderData>().unwrap();
        assert_eq!(data.network_id, "net-env");
        assert_eq!(data.client.base_url().as_str(), "https://fwd.example.com/");

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn config_values_take_precedence_over_env() {
        clear_env();
        std::env::set_var(ENV_NETWORK_ID, "net-env");

        let mut provider = ForwardProvider::new();
        let response = provider
            .configure(
                Context::new(),
                request(&[
                    ("base_url", Dynamic::String("https://fwd.example.com".into())),
                    ("api_key", Dynamic::String("key".into())),
                    ("network_id", Dynamic::String("net-config".into())),
                    ("insecure", Dynamic::Bool(true)),
                ]),
            )
            .await;

        assert!(response.diagnostics.is_empty());
        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<ForwardProviderData>().unwrap();
        assert_eq!(data.network_id, "net-config");

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn provider_configure_reports_first_missing_value() {
        clear_env();
        let mut provider = ForwardProvider::new();

        let response = provider.configure(Context::new(), request(&[])).await;
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Missing Base URL");
        assert!(response.provider_data.is_none());

        let response = provider
            .configure(
                Context::new(),
                request(&[("base_url", Dynamic::String("https://fwd.example.com".into()))]),
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Missing API Key");

        let response = provider
            .configure(
                Context::new(),
                request(&[
                    ("base_url", Dynamic::String("https://fwd.example.com".into())),
                    ("api_key", Dynamic::String("key".into())),
                ]),
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Missing Network ID");
        assert_eq!(
            response.diagnostics[0].attribute.as_ref().unwrap().to_string(),
            "network_id"
        );
    }

    #[tokio::test]
    #[serial]
    async fn invalid_base_url_reports_client_error() {
        clear_env();
        let mut provider = ForwardProvider::new();
        let response = provider
            .configure(
                Context::new(),
                request(&[
                    ("base_url", Dynamic::String("fwd.example.com".into())),
                    ("api_key", Dynamic::String("key".into())),
                    ("network_id", Dynamic::String("net-1".into())),
                ]),
            )
            .await;

        assert_eq!(
            response.diagnostics[0].summary,
            "Unable to Configure Forward Networks Client"
        );
        assert!(response.diagnostics[0].detail.contains("scheme"));
    }

    #[test]
    fn registers_all_components() {
        let provider = ForwardProvider::new();

        let mut resources: Vec<_> = provider.resources().into_keys().collect();
        resources.sort();
        assert_eq!(
            resources,
            vec![
                "forward_intent_check",
                "forward_nqe_query_definition",
                "forward_snapshot"
            ]
        );

        let mut data_sources: Vec<_> = provider.data_sources().into_keys().collect();
        data_sources.sort();
        assert_eq!(
            data_sources,
            vec![
                "forward_intent_checks",
                "forward_nqe_query",
                "forward_path_analysis",
                "forward_snapshots",
                "forward_version"
            ]
        );

        for (name, factory) in provider.resources() {
            assert_eq!(factory().type_name(), name);
        }
        for (name, factory) in provider.data_sources() {
            assert_eq!(factory().type_name(), name);
        }
    }
}
