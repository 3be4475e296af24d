use std::{fs::File, io::BufReader, net::SocketAddr, path::Path, sync::Arc};

use async_trait::async_trait;
use rustls::{RootCertStore, pki_types::ServerName};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::error::ClientError;

/// Byte stream to the upstream resolver.
pub trait UpstreamStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> UpstreamStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn UpstreamStream>;

/// Opens connections to the upstream resolver.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<BoxedStream, ClientError>;

    /// Human readable upstream description, used in logs.
    fn upstream(&self) -> String;
}

/// Plain TCP upstream.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn connect_tcp(&self) -> Result<TcpStream, ClientError> {
        let stream = TcpStream::connect(self.addr).await.map_err(|e| {
            ClientError::UpstreamUnavailable(format!("connect to {} failed: {e}", self.addr))
        })?;

        // queries are small and written one frame at a time
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<BoxedStream, ClientError> {
        Ok(Box::new(self.connect_tcp().await?))
    }

    fn upstream(&self) -> String {
        self.addr.to_string()
    }
}

/// DNS-over-TLS upstream.
pub struct TlsConnector {
    tcp: TcpConnector,
    server_name: ServerName<'static>,
    display_name: String,
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Trust the webpki roots plus any certificates in `ca_file`.
    pub fn new(addr: SocketAddr, server_name: &str, ca_file: Option<&Path>) -> Result<Self, ClientError> {
        let config = tls_client_config(ca_file)?;
        Self::with_config(addr, server_name, Arc::new(config))
    }

    pub fn with_config(
        addr: SocketAddr,
        server_name: &str,
        config: Arc<rustls::ClientConfig>,
    ) -> Result<Self, ClientError> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ClientError::Tls(format!("invalid server name '{server_name}': {e}")))?;

        Ok(Self {
            tcp: TcpConnector::new(addr),
            server_name: name,
            display_name: server_name.to_string(),
            tls: tokio_rustls::TlsConnector::from(config),
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> Result<BoxedStream, ClientError> {
        let tcp = self.tcp.connect_tcp().await?;

        let stream = self
            .tls
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| {
                ClientError::UpstreamUnavailable(format!(
                    "TLS handshake with {} failed: {e}",
                    self.upstream()
                ))
            })?;

        tracing::debug!(upstream = %self.upstream(), "TLS connection established");
        Ok(Box::new(stream))
    }

    fn upstream(&self) -> String {
        format!("{}#{}", self.tcp.addr, self.display_name)
    }
}

/// Client TLS configuration trusting the webpki roots and, optionally, the
/// PEM certificates in `ca_file`.
pub fn tls_client_config(ca_file: Option<&Path>) -> Result<rustls::ClientConfig, ClientError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = ca_file {
        let file = File::open(path)
            .map_err(|e| ClientError::Tls(format!("failed to open {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);

        let mut added = 0;
        for cert in rustls_pemfile::certs(&mut reader) {
            roots
                .add(cert?)
                .map_err(|e| ClientError::Tls(format!("bad certificate in {}: {e}", path.display())))?;
            added += 1;
        }
        if added == 0 {
            return Err(ClientError::Tls(format!(
                "no certificates found in {}",
                path.display()
            )));
        }
    }

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ClientError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(config)
}
