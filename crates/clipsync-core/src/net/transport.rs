//! Clip exchange with a reachable peer
//!
//! Bodies are handed over as opaque bytes; the session encryption layer
//! wraps them before they reach this transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ClipSyncError;
use crate::net::base_url;
use crate::types::{ClipRecord, HostCandidate};

/// Header carrying the sending device's identity fingerprint.
pub const DEVICE_HEADER: &str = "x-clipsync-device";

/// Operations a task handler performs against a peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver a clip to the peer.
    async fn send_clip(
        &self,
        host: &HostCandidate,
        port: u16,
        clip: &ClipRecord,
    ) -> Result<(), ClipSyncError>;

    /// Ask the peer to drop a clip previously sent to it.
    async fn delete_clip(
        &self,
        host: &HostCandidate,
        port: u16,
        clip_id: u64,
    ) -> Result<(), ClipSyncError>;

    /// Fetch the content of a file referenced by a clip on the peer.
    async fn pull_file(
        &self,
        host: &HostCandidate,
        port: u16,
        clip_id: u64,
        file_name: &str,
    ) -> Result<Bytes, ClipSyncError>;
}

/// [`PeerTransport`] over the peer's HTTP sync service.
///
/// | Operation   | Request                                   |
/// |-------------|-------------------------------------------|
/// | send clip   | `POST /sync/clip` (postcard body)         |
/// | delete clip | `DELETE /sync/clip/{clip_id}`             |
/// | pull file   | `GET /pull/file/{clip_id}/{file_name}`    |
#[derive(Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
    device_fingerprint: String,
}

impl HttpPeerTransport {
    pub fn new(
        device_fingerprint: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ClipSyncError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClipSyncError::Network(e.to_string()))?;
        Ok(Self {
            client,
            device_fingerprint: device_fingerprint.into(),
        })
    }

    fn check(response: reqwest::Response) -> Result<reqwest::Response, ClipSyncError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ClipSyncError::Network(format!(
                "{} answered {}",
                response.url(),
                status
            )))
        }
    }
}

fn network(e: reqwest::Error) -> ClipSyncError {
    ClipSyncError::Network(e.to_string())
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn send_clip(
        &self,
        host: &HostCandidate,
        port: u16,
        clip: &ClipRecord,
    ) -> Result<(), ClipSyncError> {
        let body = postcard::to_allocvec(clip)
            .map_err(|e| ClipSyncError::Serialization(e.to_string()))?;
        let url = format!("{}/sync/clip", base_url(&host.host_address, port));
        let response = self
            .client
            .post(url)
            .header(DEVICE_HEADER, &self.device_fingerprint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(network)?;
        Self::check(response)?;
        Ok(())
    }

    async fn delete_clip(
        &self,
        host: &HostCandidate,
        port: u16,
        clip_id: u64,
    ) -> Result<(), ClipSyncError> {
        let url = format!("{}/sync/clip/{}", base_url(&host.host_address, port), clip_id);
        let response = self
            .client
            .delete(url)
            .header(DEVICE_HEADER, &self.device_fingerprint)
            .send()
            .await
            .map_err(network)?;
        Self::check(response)?;
        Ok(())
    }

    async fn pull_file(
        &self,
        host: &HostCandidate,
        port: u16,
        clip_id: u64,
        file_name: &str,
    ) -> Result<Bytes, ClipSyncError> {
        let clip_segment = clip_id.to_string();
        let mut url = reqwest::Url::parse(&base_url(&host.host_address, port))
            .map_err(|e| ClipSyncError::Network(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClipSyncError::Network("Base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["pull", "file", clip_segment.as_str(), file_name]);
        let response = self
            .client
            .get(url)
            .header(DEVICE_HEADER, &self.device_fingerprint)
            .send()
            .await
            .map_err(network)?;
        Self::check(response)?.bytes().await.map_err(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one request with `response`, returning the raw request head.
    async fn serve_once(response: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (port, handle)
    }

    fn transport() -> HttpPeerTransport {
        HttpPeerTransport::new("abcd", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_pull_file_returns_body() {
        let (port, request) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;

        let body = transport()
            .pull_file(&HostCandidate::new("127.0.0.1"), port, 42, "notes file.txt")
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello");

        let head = request.await.unwrap();
        assert!(head.starts_with("GET /pull/file/42/notes%20file.txt "));
        assert!(head.to_ascii_lowercase().contains("x-clipsync-device: abcd"));
    }

    #[tokio::test]
    async fn test_delete_clip_error_status() {
        let (port, request) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let result = transport()
            .delete_clip(&HostCandidate::new("127.0.0.1"), port, 7)
            .await;
        assert!(matches!(result, Err(ClipSyncError::Network(_))));
        assert!(request.await.unwrap().starts_with("DELETE /sync/clip/7 "));
    }
}
