//! Version data source implementation

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder, StringKind};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::provider_data::{client_not_configured, from_configure, Component};
use crate::ForwardProviderData;

#[derive(Default)]
pub struct VersionDataSource {
    provider_data: Option<ForwardProviderData>,
}

impl VersionDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataSource for VersionDataSource {
    fn type_name(&self) -> &str {
        "forward_version"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Retrieve Forward Enterprise API version information.")
            .description_kind(StringKind::Markdown)
            .attribute(
                AttributeBuilder::new("build", AttributeType::String)
                    .description("Build hash of the Forward Enterprise deployment.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("release", AttributeType::String)
                    .description("Release identifier of the Forward Enterprise deployment.")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("version", AttributeType::String)
                    .description("API version of the Forward Enterprise deployment.")
                    .computed()
                    .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, _request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![client_not_configured()],
            };
        };

        match provider_data.client.version().get(&ctx).await {
            Ok(version) => {
                tracing::debug!("Forward Enterprise release {}", version.release);
                let mut state = DynamicValue::object();
                let _ = state.set(
                    &AttributePath::new("build"),
                    Dynamic::string_or_null(&version.build),
                );
                let _ = state.set(
                    &AttributePath::new("release"),
                    Dynamic::string_or_null(&version.release),
                );
                let _ = state.set(
                    &AttributePath::new("version"),
                    Dynamic::string_or_null(&version.version),
                );

                ReadDataSourceResponse {
                    state,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadDataSourceResponse {
                state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error("Unable to Retrieve Version", e.to_string())],
            },
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for VersionDataSource {
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
