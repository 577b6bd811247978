//! Blocking HTTP GET with status mapping shared by every remote source.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;

use super::{CircuitBreaker, FetchError};

pub fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .build()
        .map_err(|e| FetchError::NetworkUnreachable(format!("http client: {e}")))
}

/// Issue one GET through the breaker.
///
/// 403 trips the breaker, 429 becomes `RateLimited` (honoring `Retry-After`),
/// 401 is an invalid credential, 5xx and connection failures count against
/// the breaker.
pub fn get(client: &Client, breaker: &CircuitBreaker, url: &str) -> Result<Response, FetchError> {
    if !breaker.is_allowed() {
        return Err(FetchError::CircuitOpen(breaker.name().to_string()));
    }

    let resp = match client.get(url).send() {
        Ok(resp) => resp,
        Err(e) => {
            breaker.record_failure();
            return Err(FetchError::from(e));
        }
    };

    let status = resp.status();
    if status == StatusCode::FORBIDDEN {
        breaker.trip();
        return Err(FetchError::CircuitOpen(breaker.name().to_string()));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        return Err(FetchError::RateLimited {
            retry_after_secs: retry_after,
        });
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(FetchError::InvalidCredential(format!("HTTP 401 from {}", breaker.name())));
    }
    if status == StatusCode::NOT_FOUND {
        breaker.record_success();
        return Err(FetchError::NotFound(format!("HTTP 404 from {}", breaker.name())));
    }
    if status.is_server_error() {
        breaker.record_failure();
        return Err(FetchError::Server(format!("HTTP {status} from {}", breaker.name())));
    }
    if !status.is_success() {
        return Err(FetchError::ResponseFormat(format!("HTTP {status} from {}", breaker.name())));
    }

    breaker.record_success();
    Ok(resp)
}
