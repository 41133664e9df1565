//! Server capability probe.
//!
//! One `Range: bytes=0-0` GET tells us everything the partitioner needs:
//! a `206` carries the total size in `Content-Range`, a `200` means the
//! server ignored the range header entirely (its `Content-Length` is the
//! full resource size, which keeps the single-worker fallback honest).

use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};

use crate::error::{DownloadError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    pub total_size: u64,
    pub supports_ranges: bool,
}

/// Discover the resource's total size and range support with a one-byte
/// range request. The coordinator maps `supports_ranges == false` to a
/// single-worker download.
pub async fn probe(client: &Client, url: &str) -> Result<ProbeResult> {
    let resp = client.get(url).header(RANGE, "bytes=0-0").send().await?;

    match resp.status() {
        StatusCode::PARTIAL_CONTENT => {
            let header = resp
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok(ProbeResult {
                total_size: parse_content_range_total(&header)?,
                supports_ranges: true,
            })
        }
        StatusCode::OK => Ok(ProbeResult {
            total_size: resp.content_length().unwrap_or(0),
            supports_ranges: false,
        }),
        status => Err(DownloadError::UnexpectedStatus(status)),
    }
}

/// Extract the total from a `Content-Range: bytes 0-0/<total>` header.
fn parse_content_range_total(header: &str) -> Result<u64> {
    let malformed = || DownloadError::MalformedContentRange(header.to_string());

    let (_, total) = header.rsplit_once('/').ok_or_else(malformed)?;
    total.trim().parse::<u64>().map_err(|_| malformed())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn parses_content_range_total() {
        assert_eq!(
            parse_content_range_total("bytes 0-0/1048576").unwrap(),
            1_048_576
        );
    }

    #[test]
    fn rejects_malformed_content_range() {
        for bad in ["", "bytes 0-0", "bytes 0-0/*", "bytes 0-0/abc"] {
            assert!(matches!(
                parse_content_range_total(bad),
                Err(DownloadError::MalformedContentRange(_))
            ));
        }
    }

    #[tokio::test]
    async fn probe_reads_size_from_partial_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Range", "bytes=0-0"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-0/4096")
                    .set_body_bytes(vec![0u8]),
            )
            .mount(&server)
            .await;

        let client = Client::new();
        let result = probe(&client, &server.uri()).await.unwrap();
        assert_eq!(result.total_size, 4096);
        assert!(result.supports_ranges);
    }

    #[tokio::test]
    async fn probe_detects_missing_range_support() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
            .mount(&server)
            .await;

        let client = Client::new();
        let result = probe(&client, &server.uri()).await.unwrap();
        assert!(!result.supports_ranges);
        assert_eq!(result.total_size, 16);
    }

    #[tokio::test]
    async fn probe_rejects_malformed_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-0")
                    .set_body_bytes(vec![0u8]),
            )
            .mount(&server)
            .await;

        let client = Client::new();
        assert!(matches!(
            probe(&client, &server.uri()).await,
            Err(DownloadError::MalformedContentRange(_))
        ));
    }

    #[tokio::test]
    async fn probe_surfaces_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = Client::new();
        assert!(matches!(
            probe(&client, &server.uri()).await,
            Err(DownloadError::UnexpectedStatus(StatusCode::SERVICE_UNAVAILABLE))
        ));
    }
}
