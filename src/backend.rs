//! Backend Gateway Client
//!
//! The [`Backend`] trait is the seam between the session and the remote
//! inference service. [`HttpBackend`] speaks the HTTP/JSON contract from
//! [`crate::wire`]; tests substitute their own implementations.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::canvas::RasterFormat;
use crate::wire::{self, PromptResponse, WireError, WireFormat};

/// Why a backend call produced nothing usable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Backend unreachable or the connection failed mid-request
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    /// Body or image payload could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The canvas could not be encoded, nothing was sent
    #[error("failed to encode canvas: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => BackendError::Status(status.as_u16()),
            None => BackendError::Transport(err.to_string()),
        }
    }
}

impl From<WireError> for BackendError {
    fn from(err: WireError) -> Self {
        BackendError::Malformed(err.to_string())
    }
}

/// Operations the remote inference service offers
pub trait Backend: Send + Sync + 'static {
    /// Encoding the backend expects for submitted rasters
    fn raster_format(&self) -> RasterFormat {
        RasterFormat::Png
    }

    /// Submit an encoded raster, receive the encoded regenerated raster
    fn regenerate(&self, raster: Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, BackendError>>;

    /// Read the prompt the backend is currently generating with
    fn current_prompt(&self) -> BoxFuture<'static, Result<String, BackendError>>;
}

/// Where the backend lives and how to talk to it
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub base_url: String,
    pub predict_path: String,
    pub prompt_path: String,
}

impl Endpoints {
    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub fn predict_url(&self) -> String {
        self.join(&self.predict_path)
    }

    pub fn prompt_url(&self) -> String {
        self.join(&self.prompt_path)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            predict_path: "/predict".to_string(),
            prompt_path: "/update_prompt".to_string(),
        }
    }
}

/// HTTP/JSON implementation of [`Backend`]
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoints: Endpoints,
    format: WireFormat,
}

impl HttpBackend {
    pub fn new(endpoints: Endpoints, format: WireFormat) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, endpoints, format })
    }
}

impl Backend for HttpBackend {
    fn raster_format(&self) -> RasterFormat {
        self.format.raster
    }

    fn regenerate(&self, raster: Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, BackendError>> {
        let client = self.client.clone();
        let url = self.endpoints.predict_url();
        let format = self.format;

        async move {
            let body = wire::encode_request(&format, &raster);
            let response = client.post(&url).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::Status(status.as_u16()));
            }
            let bytes = response.bytes().await?;
            Ok(wire::decode_response(format.field, &bytes)?)
        }
        .boxed()
    }

    fn current_prompt(&self) -> BoxFuture<'static, Result<String, BackendError>> {
        let client = self.client.clone();
        let url = self.endpoints.prompt_url();

        async move {
            let response = client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::Status(status.as_u16()));
            }
            let bytes = response.bytes().await?;
            let parsed: PromptResponse = serde_json::from_slice(&bytes).map_err(WireError::from)?;
            Ok(parsed.prompt)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request text
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base_url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn backend(base_url: String) -> HttpBackend {
        let endpoints = Endpoints { base_url, ..Endpoints::default() };
        HttpBackend::new(endpoints, WireFormat::default()).unwrap()
    }

    #[test]
    fn test_raster_format_follows_wire_format() {
        let format = WireFormat { raster: RasterFormat::Jpeg, data_uri_prefix: true, ..WireFormat::default() };
        let jpeg = HttpBackend::new(Endpoints::default(), format).unwrap();
        assert_eq!(jpeg.raster_format(), RasterFormat::Jpeg);
        assert_eq!(backend("http://127.0.0.1:1".to_string()).raster_format(), RasterFormat::Png);
    }

    #[test]
    fn test_endpoint_urls_join_cleanly() {
        let endpoints = Endpoints {
            base_url: "http://host:9090/".to_string(),
            predict_path: "predict".to_string(),
            prompt_path: "/update_prompt".to_string(),
        };
        assert_eq!(endpoints.predict_url(), "http://host:9090/predict");
        assert_eq!(endpoints.prompt_url(), "http://host:9090/update_prompt");
    }

    #[tokio::test]
    async fn test_regenerate_round_trip() {
        let (base_url, server) = serve_once("200 OK", r#"{"base64_image":"data:image/jpeg;base64,YWJj"}"#).await;
        let result = backend(base_url).regenerate(b"xyz".to_vec()).await;
        assert_eq!(result.unwrap(), b"abc");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /predict "));
        assert!(request.contains(r#"{"base64_image":"eHl6"}"#));
    }

    #[tokio::test]
    async fn test_regenerate_non_success_status() {
        let (base_url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let result = backend(base_url).regenerate(b"xyz".to_vec()).await;
        assert_eq!(result, Err(BackendError::Status(503)));
    }

    #[tokio::test]
    async fn test_regenerate_malformed_body() {
        let (base_url, _server) = serve_once("200 OK", r#"{"prompt":"oops"}"#).await;
        let result = backend(base_url).regenerate(b"xyz".to_vec()).await;
        assert!(matches!(result, Err(BackendError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_current_prompt() {
        let (base_url, server) = serve_once("200 OK", r#"{"prompt":"new prompt"}"#).await;
        let prompt = backend(base_url).current_prompt().await.unwrap();
        assert_eq!(prompt, "new prompt");
        assert!(server.await.unwrap().starts_with("GET /update_prompt "));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = backend(base_url).current_prompt().await;
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }
}
