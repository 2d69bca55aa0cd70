//! Shared HTTP plumbing for remote backends and gateways.
//!
//! Maps transport and status failures onto the shared error taxonomy. The
//! distinction that matters is whether a request may have been applied:
//! connect failures never reach the server, while a timeout or reset after
//! the body was sent leaves a write in an unknown state.

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use url::Url;

use weavegate_common::{BackendErrorKind, Error, Result};

/// User agent sent by every client.
pub const USER_AGENT: &str = concat!("WeaveGate/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with the given request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Validate a base URL and strip trailing slashes.
pub(crate) fn normalize_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("Invalid URL '{}': {}", raw, e)))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(Error::Config(format!(
            "URL '{}' must use http or https",
            raw
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Map a transport error raised while sending a write.
pub(crate) fn write_send_error(backend: &str, err: reqwest::Error) -> Error {
    if err.is_connect() {
        Error::backend(backend, BackendErrorKind::NetworkTimeout, format!("connect failed: {}", err))
    } else if err.is_builder() {
        Error::InvalidInput(format!("{}: invalid request: {}", backend, err))
    } else {
        Error::WriteStatusUnknown {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }
}

/// Map a non-success status returned for a write.
pub(crate) fn write_status_error(backend: &str, status: StatusCode, body: &str) -> Error {
    let message = format!("{} - {}", status, truncate(body, 256));
    match status {
        StatusCode::PAYMENT_REQUIRED => {
            Error::backend(backend, BackendErrorKind::InsufficientBalance, message)
        }
        StatusCode::PAYLOAD_TOO_LARGE => {
            Error::backend(backend, BackendErrorKind::SizeLimitExceeded, message)
        }
        // A gateway timeout from a proxy says nothing about the upstream write.
        StatusCode::GATEWAY_TIMEOUT => Error::WriteStatusUnknown {
            backend: backend.to_string(),
            message,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::backend(backend, BackendErrorKind::Unavailable, message)
        }
        s if s.is_server_error() => Error::backend(backend, BackendErrorKind::Unavailable, message),
        _ => Error::backend(backend, BackendErrorKind::Rejected, message),
    }
}

/// Map a transport error raised while reading.
pub(crate) fn read_send_error(source: &str, err: reqwest::Error) -> Error {
    Error::TransientUnavailable(format!("{}: {}", source, err))
}

/// Turn a read response into its body, mapping failure statuses.
pub(crate) async fn read_body(source: &str, response: Response) -> Result<bytes::Bytes> {
    let status = response.status();
    if status.is_success() {
        response
            .bytes()
            .await
            .map_err(|e| Error::TransientUnavailable(format!("{}: body read failed: {}", source, e)))
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Err(Error::NotFound(format!("{}: {}", source, status)))
    } else {
        Err(Error::TransientUnavailable(format!("{}: {}", source, status)))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_status_mapping() {
        let kind = |status| write_status_error("arweave", status, "").backend_kind();
        assert_eq!(kind(StatusCode::PAYMENT_REQUIRED), Some(BackendErrorKind::InsufficientBalance));
        assert_eq!(kind(StatusCode::PAYLOAD_TOO_LARGE), Some(BackendErrorKind::SizeLimitExceeded));
        assert_eq!(kind(StatusCode::SERVICE_UNAVAILABLE), Some(BackendErrorKind::Unavailable));
        assert_eq!(kind(StatusCode::TOO_MANY_REQUESTS), Some(BackendErrorKind::Unavailable));
        assert_eq!(kind(StatusCode::BAD_REQUEST), Some(BackendErrorKind::Rejected));
        assert_eq!(kind(StatusCode::UNAUTHORIZED), Some(BackendErrorKind::Rejected));
    }

    #[test]
    fn test_gateway_timeout_is_ambiguous() {
        let err = write_status_error("arweave", StatusCode::GATEWAY_TIMEOUT, "upstream");
        assert!(matches!(err, Error::WriteStatusUnknown { .. }));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://upload.ardrive.io/").unwrap(),
            "https://upload.ardrive.io"
        );
        assert!(normalize_base_url("ftp://example.com").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
