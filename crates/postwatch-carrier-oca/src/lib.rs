// # OCA Carrier Fetcher
//
// This crate provides the OCA (Argentina) carrier fetcher for the postwatch
// package tracker.
//
// ## Behavior
//
// - One HTTP request per `fetch` call
// - A package the service does not know is `found = false`, not an error
// - Non-2xx statuses and undecodable bodies are `Error::Fetch`
// - No retry logic (owned by the poll cycle)
// - No store access (owned by ChangePipeline)
//
// ## API Reference
//
// The package locator is the endpoint behind the carrier's public web
// search. It expects browser-like headers:
//
// ```http
// GET /?q=package-locator&type=paquetes&number=3867500000001234567
// Accept: application/json, text/javascript, */*; q=0.01
// X-Requested-With: XMLHttpRequest
// Referer: http://www.oca.com.ar/
// ```
//
// Response:
//
// ```json
// {
//   "success": true,
//   "data": [{
//     "code": "3867500000001234567",
//     "detail": [{ "DomicilioRetiro": "...", "NumeroRetiro": "...", ... }],
//     "log": [{ "date": "...", "description": "..." }]
//   }]
// }
// ```

use async_trait::async_trait;
use postwatch_core::config::FetcherConfig;
use postwatch_core::snapshot::{LogEntry, Origin, Snapshot};
use postwatch_core::traits::{Fetcher, FetcherFactory};
use postwatch_core::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// OCA package locator base URL
pub const OCA_BASE_URL: &str = "http://www.oca.com.ar";

/// Categories probed for unknown packages, in order
pub const DEFAULT_CATEGORIES: [&str; 4] = ["paquetes", "cartas", "dni", "partidas"];

/// Default HTTP timeout for locator requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36";

const ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

/// OCA carrier fetcher
///
/// Stateless and single-shot: every `fetch` is one GET against the
/// package locator.
#[derive(Debug, Clone)]
pub struct OcaFetcher {
    /// Locator URL (the service root)
    base_url: String,

    /// HTTP client for locator requests
    client: reqwest::Client,
}

impl OcaFetcher {
    /// Create a new fetcher
    ///
    /// # Parameters
    ///
    /// - `base_url`: Locator URL, normally [`OCA_BASE_URL`]
    /// - `timeout`: Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::carrier("oca", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Create a fetcher against the public service with the default timeout
    pub fn with_defaults() -> Result<Self> {
        Self::new(OCA_BASE_URL, DEFAULT_HTTP_TIMEOUT)
    }

    /// The locator URL this fetcher queries
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Fetcher for OcaFetcher {
    async fn fetch(&self, category: &str, identifier: &str) -> Result<Snapshot> {
        tracing::debug!(package = %identifier, "Querying OCA locator (type: {})", category);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", "package-locator"),
                ("type", category),
                ("number", identifier),
            ])
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(reqwest::header::REFERER, format!("{}/", OCA_BASE_URL))
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await
            .map_err(|e| Error::fetch(format!("OCA request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                429 => Error::fetch(format!(
                    "OCA rate limit exceeded. Status: {}",
                    status
                )),
                500..=599 => Error::fetch(format!(
                    "OCA server error (transient): {} - {}",
                    status, error_text
                )),
                _ => Error::fetch(format!(
                    "OCA locator request failed: {} - {}",
                    status, error_text
                )),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(format!("Failed to read OCA response: {}", e)))?;

        parse_locator_response(category, identifier, &body)
    }

    fn default_categories(&self) -> Vec<String> {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    }

    fn carrier_name(&self) -> &'static str {
        "oca"
    }
}

/// Locator response envelope
#[derive(Debug, Deserialize)]
struct LocatorResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<LocatorPackage>,
}

#[derive(Debug, Deserialize)]
struct LocatorPackage {
    #[serde(default)]
    detail: Vec<LocatorDetail>,
    #[serde(default)]
    log: Vec<LocatorLogEntry>,
}

/// Pickup fields of one package detail; the service sends `{}` for blanks
#[derive(Debug, Default, Deserialize)]
struct LocatorDetail {
    #[serde(rename = "DomicilioRetiro", default, deserialize_with = "lenient_string")]
    street: String,
    #[serde(rename = "NumeroRetiro", default, deserialize_with = "lenient_string")]
    number: String,
    #[serde(rename = "LocalidadRetiro", default, deserialize_with = "lenient_string")]
    locality: String,
    #[serde(rename = "PciaRetiro", default, deserialize_with = "lenient_string")]
    province: String,
    #[serde(rename = "CodigoPostalRetiro", default, deserialize_with = "lenient_string")]
    postal_code: String,
}

#[derive(Debug, Deserialize)]
struct LocatorLogEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    description: String,
}

/// Accept strings and numbers; anything else reads as empty
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Map a locator response body to a snapshot
fn parse_locator_response(category: &str, identifier: &str, body: &str) -> Result<Snapshot> {
    let response: LocatorResponse = serde_json::from_str(body)
        .map_err(|e| Error::fetch(format!("Failed to parse OCA response: {}", e)))?;

    let package = match response.data.into_iter().next() {
        Some(package) if response.success => package,
        _ => {
            tracing::debug!(package = %identifier, "No match in OCA type '{}'", category);
            return Ok(Snapshot::not_found(identifier, category));
        }
    };

    let origin = package
        .detail
        .into_iter()
        .next()
        .map(|d| Origin {
            street: d.street,
            number: d.number,
            locality: d.locality,
            province: d.province,
            postal_code: d.postal_code,
        })
        .unwrap_or_default();

    let event_log = package
        .log
        .into_iter()
        .map(|e| LogEntry::new(e.date, e.description))
        .collect();

    Ok(Snapshot::found(identifier, category, event_log).with_origin(origin))
}

/// Factory for creating OCA fetchers
pub struct OcaFactory;

impl FetcherFactory for OcaFactory {
    fn create(&self, config: &FetcherConfig) -> Result<Box<dyn Fetcher>> {
        match config {
            FetcherConfig::Oca {
                base_url,
                timeout_secs,
            } => {
                if *timeout_secs == 0 {
                    return Err(Error::config("OCA timeout must be > 0"));
                }

                let base_url = base_url.as_deref().unwrap_or(OCA_BASE_URL);
                Ok(Box::new(OcaFetcher::new(
                    base_url,
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for OCA fetcher")),
        }
    }
}

/// Register the OCA fetcher with a registry
///
/// # Example
///
/// ```rust
/// use postwatch_core::ComponentRegistry;
///
/// let registry = ComponentRegistry::new();
/// postwatch_carrier_oca::register(&registry);
/// assert!(registry.has_fetcher("oca"));
/// ```
pub fn register(registry: &postwatch_core::ComponentRegistry) {
    registry.register_fetcher("oca", Box::new(OcaFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FOUND_BODY: &str = r#"{
        "success": true,
        "data": [{
            "code": "3867500000001234567",
            "detail": [{
                "Apellido": "PEREZ",
                "DomicilioRetiro": " AV CORRIENTES ",
                "NumeroRetiro": "1234",
                "LocalidadRetiro": "CAPITAL FEDERAL",
                "PciaRetiro": "BUENOS AIRES",
                "CodigoPostalRetiro": "1043",
                "DeptoRetiro": {},
                "PisoRetiro": {}
            }],
            "log": [
                {"date": "01-10-2026 10:00", "description": "Ingresado"},
                {"date": "02-10-2026 08:30", "description": "En tránsito"}
            ]
        }]
    }"#;

    /// Serve one HTTP response; yields the request head
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });

        (url, handle)
    }

    #[test]
    fn test_parse_found_response() {
        let snapshot =
            parse_locator_response("paquetes", "3867500000001234567", FOUND_BODY).unwrap();

        assert!(snapshot.found);
        assert_eq!(snapshot.category, "paquetes");
        assert_eq!(snapshot.identifier, "3867500000001234567");
        assert_eq!(
            snapshot.event_log,
            vec![
                LogEntry::new("01-10-2026 10:00", "Ingresado"),
                LogEntry::new("02-10-2026 08:30", "En tránsito"),
            ]
        );
        assert_eq!(snapshot.origin.postal_code, "1043");
        assert_eq!(
            snapshot.origin.summary(),
            "AV CORRIENTES 1234, CAPITAL FEDERAL, BUENOS AIRES"
        );
    }

    #[test]
    fn test_parse_not_found_response() {
        let empty =
            parse_locator_response("cartas", "X1", r#"{"success": true, "data": []}"#).unwrap();
        assert!(!empty.found);
        assert!(empty.event_log.is_empty());

        let failed = parse_locator_response("cartas", "X1", r#"{"success": false}"#).unwrap();
        assert!(!failed.found);
    }

    #[test]
    fn test_parse_blank_fields() {
        let body = r#"{"success": true, "data": [
            {"detail": [{"DomicilioRetiro": {}, "NumeroRetiro": 12}]}
        ]}"#;
        let snapshot = parse_locator_response("dni", "X1", body).unwrap();

        assert!(snapshot.found);
        assert_eq!(snapshot.origin.street, "");
        assert_eq!(snapshot.origin.number, "12");
        assert!(snapshot.event_log.is_empty());
    }

    #[test]
    fn test_parse_malformed_response() {
        let result = parse_locator_response("paquetes", "X1", "<html>busy</html>");
        assert!(matches!(result, Err(Error::Fetch(_))));
    }

    #[test]
    fn test_default_categories_order() {
        let fetcher = OcaFetcher::with_defaults().unwrap();
        assert_eq!(
            fetcher.default_categories(),
            vec!["paquetes", "cartas", "dni", "partidas"]
        );
        assert_eq!(fetcher.carrier_name(), "oca");
    }

    #[tokio::test]
    async fn test_fetch_sends_locator_query() {
        let (url, server) = serve_once("200 OK", FOUND_BODY).await;
        let fetcher = OcaFetcher::new(url, Duration::from_secs(5)).unwrap();

        let snapshot = fetcher.fetch("paquetes", "3867500000001234567").await.unwrap();
        assert!(snapshot.found);
        assert_eq!(snapshot.event_log.len(), 2);

        let head = server.await.unwrap();
        assert!(head.starts_with(
            "GET /?q=package-locator&type=paquetes&number=3867500000001234567 "
        ));
        let head = head.to_ascii_lowercase();
        assert!(head.contains("x-requested-with: xmlhttprequest"));
        assert!(head.contains("referer: http://www.oca.com.ar/"));
    }

    #[tokio::test]
    async fn test_fetch_server_error() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let fetcher = OcaFetcher::new(url, Duration::from_secs(5)).unwrap();

        let result = fetcher.fetch("paquetes", "X1").await;
        assert!(matches!(result, Err(Error::Fetch(msg)) if msg.contains("503")));
    }

    #[test]
    fn test_factory_creation() {
        let factory = OcaFactory;

        let fetcher = factory.create(&FetcherConfig::default()).unwrap();
        assert_eq!(fetcher.carrier_name(), "oca");

        let custom = FetcherConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::json!({}),
        };
        assert!(factory.create(&custom).is_err());
    }

    #[test]
    fn test_factory_base_url_override() {
        let config = FetcherConfig::Oca {
            base_url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 1,
        };
        assert!(OcaFactory.create(&config).is_ok());
    }
}
