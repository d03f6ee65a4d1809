//! Connection lifecycle: URI normalization and the fixed-interval
//! connect-then-verify retry loop described in spec.md §4.3.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;

use crate::error::{CollectError, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Rewrites an `http(s)://` or bare VM Service URI to its WebSocket
/// equivalent, normalizes away trailing slashes, and appends the `ws` path
/// segment the VM Service expects its debugger endpoint at.
pub fn normalize_vm_service_uri(uri: &str) -> Result<Url> {
    let mut url = Url::parse(uri).map_err(|err| CollectError::Rpc(format!("invalid VM service URI '{uri}': {err}")))?;

    match url.scheme() {
        "http" => {
            let _ = url.set_scheme("ws");
        }
        "https" => {
            let _ = url.set_scheme("wss");
        }
        "ws" | "wss" => {}
        other => {
            return Err(CollectError::Rpc(format!(
                "unsupported VM service URI scheme '{other}' in '{uri}'"
            )))
        }
    }

    let mut segments: Vec<String> = url
        .path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    if segments.last().map(String::as_str) != Some("ws") {
        segments.push("ws".to_string());
    }
    url.set_path(&format!("/{}", segments.join("/")));

    Ok(url)
}

/// Retries `attempt` (which should connect the transport *and* issue a
/// `getVersion`/`getVM` round trip to confirm liveness) every 200ms until it
/// succeeds or `timeout` has elapsed, per spec.md §4.3's connection
/// lifecycle. Fails with [`CollectError::ConnectTimeout`] on timeout.
pub async fn connect_with_retry<F, Fut, T>(uri: &str, timeout: Duration, mut attempt: F) -> Result<T>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let url = normalize_vm_service_uri(uri)?;
    let start = Instant::now();
    loop {
        match attempt(url.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(CollectError::ConnectTimeout {
                        uri: uri.to_string(),
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                }
                debug!(%err, attempt_elapsed_ms = elapsed.as_millis() as u64, "vm service connect attempt failed, retrying");
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_scheme_and_appends_ws_segment() {
        let url = normalize_vm_service_uri("http://127.0.0.1:8181/auth-token/").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/auth-token/ws");
    }

    #[test]
    fn idempotent_on_an_already_normalized_uri() {
        let url = normalize_vm_service_uri("ws://127.0.0.1:8181/auth-token/ws").unwrap();
        assert_eq!(url.path(), "/auth-token/ws");
    }

    #[tokio::test]
    async fn retries_until_success() {
        let mut calls = 0;
        let result = connect_with_retry("http://localhost:1234/", Duration::from_secs(5), |_url| {
            calls += 1;
            async move {
                if calls < 3 {
                    Err(CollectError::Rpc("not yet".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_with_connect_timeout() {
        let result: Result<()> = connect_with_retry("http://localhost:1234/", Duration::from_millis(50), |_url| async {
            Err(CollectError::Rpc("still down".into()))
        })
        .await;
        assert!(matches!(result, Err(CollectError::ConnectTimeout { .. })));
    }
}
