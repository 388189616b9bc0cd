//! Server module for running Terraform providers
//!
//! Terraform starts the provider binary, reads a single handshake line from
//! stdout and then talks gRPC to the advertised address. Everything else the
//! process writes should go to stderr.

use crate::error::{Result, TfplugError};
use crate::grpc::GrpcProviderServer;
use crate::proto::ProviderServer;
use crate::provider::Provider;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use std::path::PathBuf;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Set by Terraform when it wants the plugin to negotiate TLS automatically
pub const CLIENT_CERT_ENV: &str = "PLUGIN_CLIENT_CERT";

const CORE_PROTOCOL_VERSION: u8 = 1;
const APP_PROTOCOL_VERSION: u8 = 6;

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PEM certificate used when Terraform does not negotiate AutoMTLS
    pub cert_path: Option<PathBuf>,
    /// PEM key matching `cert_path`
    pub key_path: Option<PathBuf>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            max_message_size: 256 << 20, // 256MB
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cert_path(mut self, path: PathBuf) -> Self {
        self.cert_path = Some(path);
        self
    }

    pub fn with_key_path(mut self, path: PathBuf) -> Self {
        self.key_path = Some(path);
        self
    }
}

/// How the listener is secured, decided once at startup
enum Transport {
    /// Self-signed certificate; the DER bytes are advertised in the handshake
    AutoTls { identity: Identity, cert_der: Vec<u8> },
    /// Operator supplied certificate files
    FileTls(Identity),
    Plaintext,
}

impl Transport {
    async fn select(config: &ServerConfig) -> Result<Self> {
        if std::env::var_os(CLIENT_CERT_ENV).is_some() {
            let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
                .map_err(|e| TfplugError::TlsError(format!("certificate generation failed: {}", e)))?;
            let identity =
                Identity::from_pem(certified.cert.pem(), certified.key_pair.serialize_pem());
            return Ok(Transport::AutoTls {
                identity,
                cert_der: certified.cert.der().to_vec(),
            });
        }

        if let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) {
            if cert_path.exists() && key_path.exists() {
                let cert = tokio::fs::read(cert_path).await.map_err(|e| {
                    TfplugError::TlsError(format!("Failed to read certificate: {}", e))
                })?;
                let key = tokio::fs::read(key_path)
                    .await
                    .map_err(|e| TfplugError::TlsError(format!("Failed to read key: {}", e)))?;
                return Ok(Transport::FileTls(Identity::from_pem(cert, key)));
            }
            tracing::warn!(
                cert = %cert_path.display(),
                key = %key_path.display(),
                "certificate files not found, serving without TLS"
            );
        }

        Ok(Transport::Plaintext)
    }
}

/// Line Terraform parses from stdout: core version, protocol version,
/// network, address, protocol and the optional base64 server certificate
pub fn handshake_line(addr: &std::net::SocketAddr, cert_der: Option<&[u8]>) -> String {
    let mut line = format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, APP_PROTOCOL_VERSION, addr
    );
    if let Some(der) = cert_der {
        line.push('|');
        line.push_str(&STANDARD_NO_PAD.encode(der));
    }
    line
}

/// Serve a provider until the process is interrupted
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    if std::env::var(MAGIC_COOKIE_KEY).as_deref() != Ok(MAGIC_COOKIE_VALUE) {
        return Err(TfplugError::NotLaunchedByTerraform);
    }

    // Another component may have installed a provider already; either is fine
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let grpc_server = GrpcProviderServer::new(provider);
    let provider_service = ProviderServer::new(grpc_server)
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let transport = Transport::select(&config).await?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let actual_addr = listener.local_addr()?;

    let mut builder = Server::builder();
    let cert_der = match transport {
        Transport::AutoTls { identity, cert_der } => {
            builder = builder.tls_config(ServerTlsConfig::new().identity(identity))?;
            Some(cert_der)
        }
        Transport::FileTls(identity) => {
            builder = builder.tls_config(ServerTlsConfig::new().identity(identity))?;
            None
        }
        Transport::Plaintext => None,
    };

    println!("{}", handshake_line(&actual_addr, cert_der.as_deref()));
    tracing::info!(address = %actual_addr, tls = cert_der.is_some(), "provider server listening");

    builder
        .add_service(provider_service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received, shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::provider::{
        ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory,
        ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
    };
    use crate::schema::SchemaBuilder;
    use std::collections::HashMap;

    struct EmptyProvider;

    #[async_trait::async_trait]
    impl Provider for EmptyProvider {
        fn type_name(&self) -> &str {
            "empty"
        }

        async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
            ProviderSchemaResponse {
                schema: SchemaBuilder::new().build(),
                diagnostics: vec![],
            }
        }

        async fn configure(
            &mut self,
            _ctx: Context,
            _request: ConfigureProviderRequest,
        ) -> ConfigureProviderResponse {
            ConfigureProviderResponse {
                diagnostics: vec![],
                provider_data: None,
            }
        }

        fn resources(&self) -> HashMap<String, ResourceFactory> {
            HashMap::new()
        }

        fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
            HashMap::new()
        }
    }

    #[test]
    fn handshake_without_certificate() {
        let addr: std::net::SocketAddr = "127.0.0.1:41234".parse().unwrap();
        assert_eq!(handshake_line(&addr, None), "1|6|tcp|127.0.0.1:41234|grpc");
    }

    #[test]
    fn handshake_appends_unpadded_base64_certificate() {
        let addr: std::net::SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let line = handshake_line(&addr, Some(&[0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(line, "1|6|tcp|127.0.0.1:5000|grpc|3q2+7w");
    }

    #[test]
    fn default_config_has_no_certificates() {
        let config = ServerConfig::default();
        assert!(config.cert_path.is_none());
        assert_eq!(config.max_message_size, 256 << 20);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn serve_refuses_to_start_without_magic_cookie() {
        std::env::remove_var(MAGIC_COOKIE_KEY);
        let err = serve(EmptyProvider, ServerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TfplugError::NotLaunchedByTerraform));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn missing_certificate_files_fall_back_to_plaintext() {
        std::env::remove_var(CLIENT_CERT_ENV);
        let config = ServerConfig::new()
            .with_cert_path(PathBuf::from("/nonexistent/cert.pem"))
            .with_key_path(PathBuf::from("/nonexistent/key.pem"));
        let transport = Transport::select(&config).await.unwrap();
        assert!(matches!(transport, Transport::Plaintext));
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn client_certificate_env_enables_auto_tls() {
        std::env::set_var(CLIENT_CERT_ENV, "-----BEGIN CERTIFICATE-----");
        let transport = Transport::select(&ServerConfig::default()).await.unwrap();
        std::env::remove_var(CLIENT_CERT_ENV);
        match transport {
            Transport::AutoTls { cert_der, .. } => assert!(!cert_der.is_empty()),
            _ => panic!("expected automatic TLS"),
        }
    }
}
