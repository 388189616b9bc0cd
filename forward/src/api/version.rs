use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tfplug::Context;

use super::client::{decode_json, expect_status, Client};
use super::error::ApiError;

/// Platform build information
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Version {
    pub build: String,
    pub release: String,
    pub version: String,
}

pub struct VersionApi<'a> {
    client: &'a Client,
}

impl<'a> VersionApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /api/version
    pub async fn get(&self, ctx: &Context) -> Result<Version, ApiError> {
        let url = self.client.endpoint(&["api", "version"], &[]);
        let response = self.client.send(ctx, Method::GET, url, None).await?;
        let response = expect_status(response, &[StatusCode::OK], "retrieving version").await?;
        decode_json(response, "version response").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::Server;

    #[tokio::test]
    async fn get_version() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/version")
            .match_header("user-agent", crate::api::DEFAULT_USER_AGENT)
            .with_body(r#"{"build":"b42","release":"24.3","version":"24.3.1"}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let version = client.version().get(&Context::new()).await.unwrap();

        assert_eq!(version.build, "b42");
        assert_eq!(version.version, "24.3.1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_version_rejects_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/version")
            .with_body("not json")
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let err = client.version().get(&Context::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::ParseError { .. }));
    }
}
