//! Client for La Poste's address-validation API ("Contrôle adresse" v2).
//!
//! The service works in two steps: a list lookup returns coarse matches for a
//! free-form query, each carrying an opaque `code`; a detail lookup by `code`
//! returns the authoritative, normalised address block. [`AddressApi`] is the
//! seam the correction workflow talks to; [`LaPosteClient`] is the blocking
//! HTTP implementation.
//!
//! Requests carry the `X-Okapi-Key` header and a fixed timeout. A timeout or a
//! connection failure is reported like a non-success status, without a code.

use crate::error::EnvelopeError;
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.laposte.fr/controladresse/v2";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OKAPI_API_KEY";

/// Keys shorter than this are treated as absent.
pub const MIN_API_KEY_LEN: usize = 10;

const KEY_HEADER: &str = "X-Okapi-Key";

/// One coarse match from the list lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressMatch {
    /// Single-line display form.
    pub adresse: String,
    /// Key for the detail lookup.
    pub code: String,
}

/// The normalised record returned by the detail lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDetail {
    /// Locality / hamlet; empty when the service has none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lieu_dit: String,
    /// Address lines, ready to print.
    #[serde(default)]
    pub bloc_adresse: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// The two lookups the correction workflow needs.
pub trait AddressApi {
    /// List lookup: one `q` parameter per query line.
    fn search(&self, query: &[String]) -> Result<Vec<AddressMatch>, EnvelopeError>;

    /// Detail lookup by the `code` of a list match.
    fn detail(&self, code: &str) -> Result<AddressDetail, EnvelopeError>;
}

/// A credential that passed the minimum-length check.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// `None` when the key is missing or shorter than [`MIN_API_KEY_LEN`].
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.chars().count() < MIN_API_KEY_LEN {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Read [`API_KEY_ENV`] (after `.env` has been loaded by the caller).
    pub fn from_env() -> Option<Self> {
        Self::parse(std::env::var(API_KEY_ENV).ok().as_deref())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Blocking HTTP client for the La Poste API.
pub struct LaPosteClient {
    client: Client,
    base_url: Url,
    key: ApiKey,
    timeout: Duration,
}

impl LaPosteClient {
    pub fn new(key: ApiKey, base_url: &str, timeout: Duration) -> Result<Self, EnvelopeError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            EnvelopeError::InvalidConfig(format!("invalid API base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EnvelopeError::InvalidConfig(format!(
                "API base URL '{}' cannot be used as a base",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pdf-envelope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EnvelopeError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            key,
            timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn send_error(&self, e: reqwest::Error) -> EnvelopeError {
        let body = if e.is_timeout() {
            format!("request timed out after {:?}", self.timeout)
        } else {
            e.to_string()
        };
        EnvelopeError::ExternalService { status: None, body }
    }
}

fn ensure_success(response: Response) -> Result<Response, EnvelopeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(EnvelopeError::ExternalService {
        status: Some(status.as_u16()),
        body,
    })
}

fn invalid_json(e: reqwest::Error) -> EnvelopeError {
    EnvelopeError::ExternalService {
        status: None,
        body: format!("unexpected response body: {}", e),
    }
}

impl AddressApi for LaPosteClient {
    fn search(&self, query: &[String]) -> Result<Vec<AddressMatch>, EnvelopeError> {
        let url = self.endpoint(&["adresses"]);
        let params: Vec<(&str, &str)> = query.iter().map(|l| ("q", l.as_str())).collect();
        debug!("GET {} q={:?}", url, query);

        let response = self
            .client
            .get(url)
            .header(KEY_HEADER, self.key.expose())
            .query(&params)
            .send()
            .map_err(|e| self.send_error(e))?;

        ensure_success(response)?.json().map_err(invalid_json)
    }

    fn detail(&self, code: &str) -> Result<AddressDetail, EnvelopeError> {
        let url = self.endpoint(&["adresses", code]);
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(KEY_HEADER, self.key.expose())
            .send()
            .map_err(|e| self.send_error(e))?;

        ensure_success(response)?.json().map_err(invalid_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve exactly one HTTP response and hand back the raw request head.
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/controladresse/v2", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            tx.send(String::from_utf8_lossy(&head).into_owned()).unwrap();
        });

        (base, rx)
    }

    fn key() -> ApiKey {
        ApiKey::parse(Some("0123456789abcdef")).unwrap()
    }

    #[test]
    fn short_or_missing_key_is_rejected() {
        assert!(ApiKey::parse(None).is_none());
        assert!(ApiKey::parse(Some("")).is_none());
        assert!(ApiKey::parse(Some("123456789")).is_none());
        assert!(ApiKey::parse(Some("  123456789  ")).is_none());
        assert!(ApiKey::parse(Some("1234567890")).is_some());
    }

    #[test]
    fn key_debug_is_redacted() {
        assert_eq!(format!("{:?}", key()), "ApiKey(<redacted>)");
    }

    #[test]
    fn detail_tolerates_null_and_missing_fields() {
        let d: AddressDetail =
            serde_json::from_str(r#"{"lieuDit": null, "blocAdresse": ["A"], "x": 1}"#).unwrap();
        assert_eq!(d.lieu_dit, "");
        assert_eq!(d.bloc_adresse, vec!["A"]);

        let d: AddressDetail = serde_json::from_str("{}").unwrap();
        assert_eq!(d, AddressDetail::default());
    }

    #[test]
    fn search_sends_key_and_one_q_per_line() {
        let (base, rx) = serve_once(
            "200 OK",
            r#"[{"adresse":"12 RUE DES LILAS 75011 PARIS","code":"c1","codePostal":"75011"}]"#,
        );
        let client = LaPosteClient::new(key(), &base, Duration::from_secs(5)).unwrap();
        let matches = client
            .search(&["12 RUE DES LILAS".to_string(), "75011".to_string()])
            .unwrap();

        assert_eq!(
            matches,
            vec![AddressMatch {
                adresse: "12 RUE DES LILAS 75011 PARIS".into(),
                code: "c1".into()
            }]
        );

        let head = rx.recv().unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("GET /controladresse/v2/adresses?"), "{request_line}");
        assert!(request_line.contains("q=12+RUE+DES+LILAS&q=75011"), "{request_line}");
        assert!(head.to_lowercase().contains("x-okapi-key: 0123456789abcdef"));
    }

    #[test]
    fn detail_uses_code_in_path() {
        let (base, rx) = serve_once(
            "200 OK",
            r#"{"lieuDit":"","blocAdresse":["12 RUE DES LILAS","75011 PARIS"]}"#,
        );
        let client = LaPosteClient::new(key(), &base, Duration::from_secs(5)).unwrap();
        let detail = client.detail("c1").unwrap();

        assert_eq!(detail.bloc_adresse, vec!["12 RUE DES LILAS", "75011 PARIS"]);
        let head = rx.recv().unwrap();
        assert!(head.starts_with("GET /controladresse/v2/adresses/c1 "), "{head}");
    }

    #[test]
    fn non_success_status_maps_to_external_service_error() {
        let (base, _rx) = serve_once("401 Unauthorized", r#"{"message":"bad key"}"#);
        let client = LaPosteClient::new(key(), &base, Duration::from_secs(5)).unwrap();
        let err = client.search(&["x".to_string()]).unwrap_err();

        match err {
            EnvelopeError::ExternalService { status, body } => {
                assert_eq!(status, Some(401));
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn connection_failure_has_no_status() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let base = format!("http://127.0.0.1:{port}/v2");
        let client = LaPosteClient::new(key(), &base, Duration::from_secs(2)).unwrap();
        let err = client.detail("c1").unwrap_err();
        assert!(matches!(err, EnvelopeError::ExternalService { status: None, .. }));
    }

    #[test]
    fn silent_server_times_out_without_status() {
        // Connections queue in the backlog; nothing ever answers.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/v2", listener.local_addr().unwrap());
        let client = LaPosteClient::new(key(), &base, Duration::from_millis(200)).unwrap();

        let err = client.search(&["1 RUE X".into()]).unwrap_err();
        match err {
            EnvelopeError::ExternalService { status: None, body } => {
                assert!(body.contains("timed out"), "{body}");
                assert!(body.contains("200ms"), "{body}");
            }
            other => panic!("unexpected: {other:?}"),
        }
        drop(listener);
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = LaPosteClient::new(key(), "not a url", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, EnvelopeError::InvalidConfig(_)));
    }
}
