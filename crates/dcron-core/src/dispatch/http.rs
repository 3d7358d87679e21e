//! HTTP dispatch target — one pooled client per destination host, mirroring
//! `internal/httptarget/http.go`'s `httpConn` map and its double-checked-locking init.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, Url};

use crate::error::{DcronError, DcronResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

pub struct HttpDispatcher {
    clients: RwLock<HashMap<String, Client>>,
}

impl HttpDispatcher {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn client_for(&self, host_key: &str) -> Client {
        if let Some(client) = self.clients.read().get(host_key) {
            return client.clone();
        }
        let mut clients = self.clients.write();
        if let Some(client) = clients.get(host_key) {
            return client.clone();
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        clients.insert(host_key.to_string(), client.clone());
        client
    }

    /// Fetches `request_url`, retrying up to `max_count` total attempts (any non-200 response,
    /// including 4xx, or a transport error, counts as a failed attempt) with a 100ms pause
    /// between tries. Returns the last seen HTTP status, or `None` if every attempt failed to
    /// even reach the server.
    pub async fn dispatch(&self, request_url: &str, max_count: u32) -> Option<u16> {
        let url = Url::parse(request_url).ok()?;
        let host_key = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        );
        let client = self.client_for(&host_key);
        let attempts = max_count.max(1);

        let mut last_status = None;
        for attempt in 1..=attempts {
            if let Ok(resp) = client.get(url.clone()).send().await {
                let status = resp.status().as_u16();
                last_status = Some(status);
                if status == 200 {
                    return last_status;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
        last_status
    }

    pub fn validate_url(request_url: &str) -> DcronResult<()> {
        if request_url.is_empty() {
            return Err(DcronError::EmptyUrl);
        }
        Url::parse(request_url).map_err(|e| DcronError::InvalidUrl(e.to_string()))?;
        Ok(())
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_url() {
        assert!(matches!(
            HttpDispatcher::validate_url(""),
            Err(DcronError::EmptyUrl)
        ));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(HttpDispatcher::validate_url("not a url").is_err());
    }

    #[test]
    fn accepts_well_formed_url() {
        assert!(HttpDispatcher::validate_url("http://127.0.0.1/api/ping").is_ok());
    }
}
