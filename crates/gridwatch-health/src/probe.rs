//! HTTP probe execution.
//!
//! Probes run over a raw http1 connection: TCP connect, handshake, one
//! request, classify the status of the current response. The check's
//! `maximum_duration` is the hard cutoff for the whole exchange.

use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use tracing::debug;

use gridwatch_core::{is_success_code, HealthState};
use gridwatch_state::HealthCheck;

/// Result of one probe execution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProbeOutcome {
    pub verdict: HealthState,
    pub success: bool,
    pub result_code: u16,
    /// Elapsed milliseconds; -1 when the request never produced a response.
    pub duration_ms: i64,
}

impl ProbeOutcome {
    /// Transport-level failure: no HTTP status was observed.
    pub(crate) fn transport_failure() -> Self {
        Self {
            verdict: HealthState::Error,
            success: false,
            result_code: 500,
            duration_ms: -1,
        }
    }
}

/// Classify a response status against the check's configured code sets.
/// The warning set takes precedence, then the error set, then 2xx.
pub(crate) fn classify(hc: &HealthCheck, status: u16) -> (HealthState, bool) {
    if hc.warning_status_codes.contains(&status) {
        (HealthState::Warning, false)
    } else if hc.error_status_codes.contains(&status) {
        (HealthState::Error, false)
    } else if is_success_code(status) {
        (HealthState::Ok, true)
    } else {
        (HealthState::Error, false)
    }
}

/// Execute one probe against a resolved base address.
pub(crate) async fn execute(hc: &HealthCheck, base_address: &str) -> ProbeOutcome {
    let url = format!(
        "{}/{}",
        base_address.trim_end_matches('/'),
        hc.suffix_path.trim_start_matches('/')
    );
    let started = Instant::now();

    let send = send_request(hc, &url);
    let status = match tokio::time::timeout(hc.maximum_duration(), send).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            debug!(%url, error = %e, "probe request failed");
            return ProbeOutcome::transport_failure();
        }
        Err(_) => {
            debug!(%url, "probe timed out");
            return ProbeOutcome::transport_failure();
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as i64;
    let (verdict, success) = classify(hc, status);
    ProbeOutcome {
        verdict,
        success,
        result_code: status,
        duration_ms: elapsed_ms,
    }
}

/// Issue the HTTP request and return the response status.
async fn send_request(hc: &HealthCheck, url: &str) -> Result<u16, ProbeFailure> {
    let uri: http::Uri = url.parse().map_err(|_| ProbeFailure::BadUrl)?;
    let authority = uri
        .authority()
        .ok_or(ProbeFailure::BadUrl)?
        .clone();
    let host = authority.host().to_string();
    let port = authority.port_u16().unwrap_or(80);

    let stream = tokio::net::TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|_| ProbeFailure::Connect)?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|_| ProbeFailure::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let method: http::Method = hc.method.parse().map_err(|_| ProbeFailure::BadMethod)?;
    let mut builder = http::Request::builder()
        .method(method)
        .uri(url)
        .header(http::header::HOST, authority.as_str())
        .header(http::header::USER_AGENT, "gridwatch/0.1");
    for (name, value) in &hc.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body = match (&hc.content, &hc.media_type) {
        (Some(content), Some(media_type)) => {
            builder = builder.header(http::header::CONTENT_TYPE, media_type);
            Full::new(Bytes::from(content.clone()))
        }
        _ => Full::new(Bytes::new()),
    };
    let request = builder.body(body).map_err(|_| ProbeFailure::BadRequest)?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|_| ProbeFailure::Request)?;
    Ok(response.status().as_u16())
}

#[derive(Debug, thiserror::Error)]
enum ProbeFailure {
    #[error("malformed probe url")]
    BadUrl,
    #[error("malformed probe method")]
    BadMethod,
    #[error("malformed probe request")]
    BadRequest,
    #[error("connection failed")]
    Connect,
    #[error("handshake failed")]
    Handshake,
    #[error("request failed")]
    Request,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn check_with_codes(warning: &[u16], error: &[u16]) -> HealthCheck {
        HealthCheck {
            name: "hc".to_string(),
            service_name: "fabric:/A/B".to_string(),
            partition: None,
            endpoint: None,
            suffix_path: "healthz".to_string(),
            method: "GET".to_string(),
            content: None,
            media_type: None,
            frequency_ms: 60_000,
            expected_duration_ms: 200,
            maximum_duration_ms: 200,
            headers: HashMap::new(),
            warning_status_codes: warning.iter().copied().collect(),
            error_status_codes: error.iter().copied().collect(),
            last_attempt: None,
            failure_count: 0,
            result_code: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn classify_warning_set_first() {
        let hc = check_with_codes(&[400, 401, 403], &[403, 500]);
        assert_eq!(classify(&hc, 403), (HealthState::Warning, false));
        assert_eq!(classify(&hc, 500), (HealthState::Error, false));
    }

    #[test]
    fn classify_2xx_is_ok() {
        let hc = check_with_codes(&[], &[]);
        assert_eq!(classify(&hc, 200), (HealthState::Ok, true));
        assert_eq!(classify(&hc, 204), (HealthState::Ok, true));
    }

    #[test]
    fn classify_unlisted_non_2xx_is_error() {
        let hc = check_with_codes(&[403], &[]);
        assert_eq!(classify(&hc, 404), (HealthState::Error, false));
        assert_eq!(classify(&hc, 302), (HealthState::Error, false));
    }

    #[tokio::test]
    async fn unreachable_address_is_a_transport_failure() {
        let hc = check_with_codes(&[], &[]);
        // Port 1 is not listening.
        let outcome = execute(&hc, "http://127.0.0.1:1").await;
        assert_eq!(outcome, ProbeOutcome::transport_failure());
    }
}
