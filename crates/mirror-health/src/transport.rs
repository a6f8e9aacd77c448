//! HTTP(S) environment port.
//!
//! Issues `HEAD` probes over a fresh hyper HTTP/1 connection per probe,
//! with rustls for `https` origins. Root-relative URLs such as local
//! fallback paths are resolved against the serving host over plain HTTP.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use mirror_core::{EnvironmentPort, HostInfo, ProbeError, ProbeFuture, ProbeResult};

const USER_AGENT: &str = "mirrorgrid-probe/0.1";

#[derive(Debug, Error)]
pub enum PortError {
    #[error("tls setup failed: {0}")]
    Tls(String),
}

/// Production [`EnvironmentPort`] backed by hyper.
#[derive(Clone)]
pub struct HttpPort {
    host: HostInfo,
    tls: Arc<rustls::ClientConfig>,
}

impl HttpPort {
    /// Create a port reporting `host` as the serving host, trusting the
    /// Mozilla root certificate store.
    pub fn new(host: HostInfo) -> Result<Self, PortError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| PortError::Tls(format!("protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            host,
            tls: Arc::new(config),
        })
    }

    /// Perform a `HEAD` probe against `url`.
    ///
    /// 2xx is available; non-2xx, connection errors and timeouts are not.
    /// Response time is measured in every case.
    pub async fn head_probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        let target = self.absolute_url(url);
        let outcome = tokio::time::timeout(timeout, self.send_head(&target)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(status)) if status.is_success() => ProbeResult::ok(url, elapsed),
            Ok(Ok(status)) => {
                debug!(%status, %url, "probe non-2xx");
                ProbeResult::failed(url, elapsed, ProbeError::Http(status.as_u16()))
            }
            Ok(Err(e)) => {
                debug!(error = %e, %url, "probe request failed");
                ProbeResult::failed(url, elapsed, ProbeError::Network(e))
            }
            Err(_) => {
                debug!(%url, "probe timed out");
                ProbeResult::failed(url, elapsed, ProbeError::Timeout)
            }
        }
    }

    /// `url` itself, or `http://{host}[:port]{url}` for a root-relative path.
    pub fn absolute_url(&self, url: &str) -> String {
        if !url.starts_with('/') || url.starts_with("//") {
            return url.to_string();
        }
        let host = &self.host.hostname;
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.clone()
        };
        match self.host.port {
            Some(port) => format!("http://{host}:{port}{url}"),
            None => format!("http://{host}{url}"),
        }
    }

    async fn send_head(&self, url: &str) -> Result<http::StatusCode, String> {
        let uri: http::Uri = url.parse().map_err(|e| format!("invalid url: {e}"))?;
        let https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") | None => false,
            Some(other) => return Err(format!("unsupported scheme: {other}")),
        };
        let host = uri
            .host()
            .ok_or_else(|| "missing host".to_string())?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| host.clone());
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| format!("connect failed: {e}"))?;
        let _ = stream.set_nodelay(true);

        if https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|e| format!("invalid tls server name '{host}': {e}"))?;
            let tls_stream = TlsConnector::from(Arc::clone(&self.tls))
                .connect(server_name, stream)
                .await
                .map_err(|e| format!("tls handshake failed: {e}"))?;
            send_head_over(tls_stream, &authority, &path).await
        } else {
            send_head_over(stream, &authority, &path).await
        }
    }
}

impl EnvironmentPort for HttpPort {
    fn probe<'a>(&'a self, url: &'a str, timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(self.head_probe(url, timeout))
    }

    fn host_info(&self) -> HostInfo {
        self.host.clone()
    }
}

async fn send_head_over<S>(
    stream: S,
    authority: &str,
    path: &str,
) -> Result<http::StatusCode, String>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("handshake failed: {e}"))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method(http::Method::HEAD)
        .uri(path)
        .header(http::header::HOST, authority)
        .header(http::header::USER_AGENT, USER_AGENT)
        .header(http::header::CACHE_CONTROL, "no-cache")
        .body(Empty::<Bytes>::new())
        .map_err(|e| format!("invalid request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    Ok(resp.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection, forever.
    async fn canned_server(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut sock, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = sock.read(&mut buf).await;
                    let _ = sock.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn port() -> HttpPort {
        HttpPort::new(HostInfo::new("example.com", None)).unwrap()
    }

    #[tokio::test]
    async fn probe_2xx_is_available() {
        let base = canned_server("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
        let result = port()
            .head_probe(&format!("{base}/favicon.ico"), Duration::from_secs(2))
            .await;
        assert!(result.available);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn probe_5xx_is_http_error() {
        let base =
            canned_server("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n").await;
        let result = port()
            .head_probe(&format!("{base}/favicon.ico"), Duration::from_secs(2))
            .await;
        assert!(!result.available);
        assert_eq!(result.error, Some(ProbeError::Http(503)));
    }

    #[tokio::test]
    async fn probe_to_closed_port_is_network_error() {
        let result = port()
            .head_probe("http://127.0.0.1:1/favicon.ico", Duration::from_millis(500))
            .await;
        assert!(!result.available);
        assert!(matches!(result.error, Some(ProbeError::Network(_))));
    }

    #[tokio::test]
    async fn probe_to_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the socket without answering.
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let result = port()
            .head_probe(&format!("http://{addr}/favicon.ico"), Duration::from_millis(100))
            .await;
        assert_eq!(result.error, Some(ProbeError::Timeout));
        assert!(result.response_time_ms >= 100);
    }

    #[tokio::test]
    async fn root_relative_url_targets_serving_host() {
        let base = canned_server("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
        let addr = base.trim_start_matches("http://");
        let port = HttpPort::new(HostInfo::parse(addr)).unwrap();

        let result = port.head_probe("/img/x.png", Duration::from_secs(2)).await;
        assert!(result.available, "{:?}", result.error);
        assert_eq!(result.origin, "/img/x.png");
    }

    #[test]
    fn absolute_url_resolution() {
        let port = HttpPort::new(HostInfo::new("localhost", Some(5173))).unwrap();
        assert_eq!(port.absolute_url("/img/x.png"), "http://localhost:5173/img/x.png");
        assert_eq!(port.absolute_url("https://a.test/x.png"), "https://a.test/x.png");

        let port = HttpPort::new(HostInfo::new("::1", None)).unwrap();
        assert_eq!(port.absolute_url("/x.png"), "http://[::1]/x.png");
    }

    #[tokio::test]
    async fn probe_rejects_unsupported_scheme() {
        let result = port()
            .head_probe("ftp://mirror.test/favicon.ico", Duration::from_millis(100))
            .await;
        assert!(matches!(result.error, Some(ProbeError::Network(_))));
    }

    #[test]
    fn host_info_is_reported() {
        let port = HttpPort::new(HostInfo::new("localhost", Some(5173))).unwrap();
        assert_eq!(port.host_info(), HostInfo::new("localhost", Some(5173)));
    }
}
