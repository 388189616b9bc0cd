//! Provider data structure passed to resources and data sources

use crate::api::Client;
use std::any::Any;
use std::sync::Arc;
use tfplug::Diagnostic;

#[derive(Clone)]
pub struct ForwardProviderData {
    pub client: Client,
    /// Network used when a resource or data source does not name one
    pub network_id: String,
}

impl ForwardProviderData {
    pub fn new(client: Client, network_id: impl Into<String>) -> Self {
        Self {
            client,
            network_id: network_id.into(),
        }
    }

    /// The configured network unless `explicit` names another one
    pub fn network_or(&self, explicit: Option<String>) -> String {
        explicit
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.network_id.clone())
    }
}

/// Component kind, used in the configure type mismatch summary
#[derive(Debug, Clone, Copy)]
pub(crate) enum Component {
    Resource,
    DataSource,
}

/// Extract provider data handed to `configure`. `Ok(None)` means the provider
/// has not been configured yet, which happens during validation.
pub(crate) fn from_configure(
    provider_data: Option<Arc<dyn Any + Send + Sync>>,
    component: Component,
) -> Result<Option<ForwardProviderData>, Diagnostic> {
    let Some(data) = provider_data else {
        return Ok(None);
    };

    match data.downcast_ref::<ForwardProviderData>() {
        Some(data) => Ok(Some(data.clone())),
        None => {
            let summary = match component {
                Component::Resource => "Unexpected Resource Configure Type",
                Component::DataSource => "Unexpected Data Source Configure Type",
            };
            Err(Diagnostic::error(
                summary,
                "Expected ForwardProviderData. Please report this issue to the provider developers.",
            ))
        }
    }
}

/// Reported by resources (and path analysis) when used before configure
pub(crate) fn unconfigured_provider() -> Diagnostic {
    Diagnostic::error(
        "Unconfigured Provider",
        "The provider client was not configured. Re-run terraform init or review provider configuration.",
    )
}

/// Reported by data sources when used before configure
pub(crate) fn client_not_configured() -> Diagnostic {
    Diagnostic::error(
        "Client Not Configured",
        "The provider client was not configured. Ensure the provider block is present before using this data source.",
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;

    #[test]
    fn missing_provider_data_is_not_an_error() {
        assert!(from_configure(None, Component::Resource).unwrap().is_none());
    }

    #[test]
    fn wrong_type_reports_component() {
        let data: Arc<dyn Any + Send + Sync> = Arc::new(42u32);

        let err = from_configure(Some(data.clone()), Component::Resource)
            .err()
            .unwrap();
        assert_eq!(err.summary, "Unexpected Resource Configure Type");

        let err = from_configure(Some(data), Component::DataSource)
            .err()
            .unwrap();
        assert_eq!(err.summary, "Unexpected Data Source Configure Type");
    }

    #[test]
    fn network_falls_back_to_provider_default() {
        let data = ForwardProviderData::new(create_test_client("http://127.0.0.1:9"), "net-1");
        assert_eq!(data.network_or(None), "net-1");
        assert_eq!(data.network_or(Some(String::new())), "net-1");
        assert_eq!(data.network_or(Some("net-2".into())), "net-2");
    }
}
