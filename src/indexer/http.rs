//! HTTP plumbing shared by every indexer
//!
//! Sites are fetched through the [`HttpFetcher`] trait so the dispatcher can be
//! driven by a scripted fetcher in tests. The reqwest implementation never
//! turns a 4xx into an error: challenge pages are usually served as 403/503
//! and the dispatcher needs to look at the body.
//!
//! When a site hides behind a JavaScript challenge, an optional
//! [`ChallengeSolver`] (FlareSolverr) can fetch the page through a real
//! browser.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};

use super::error::FetchError;

/// Browser user agent sent when a definition does not override it
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// Found anywhere in the body, these mean we got an interstitial
const CHALLENGE_MARKERS: &[&str] = &[
    "just a moment",
    "checking your browser",
    "enable javascript and cookies",
    "ddos protection by cloudflare",
    "cf-browser-verification",
];

/// Cloudflare also injects these into normal pages, so they only count on an
/// error status.
const CHALLENGE_ERROR_MARKERS: &[&str] = &["cf-challenge", "challenge-platform", "__cf_bm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// A fully built request for one link attempt
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Form body, only sent for POST
    pub form: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: vec![],
            form: vec![],
            timeout,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can perform an HTTP request for the dispatcher
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Production fetcher backed by a shared reqwest client with a cookie jar
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut headers = header::HeaderMap::new();
        for (name, value) in &request.headers {
            match (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => {
                    tracing::warn!(header = %name, "Skipping header that is not valid HTTP");
                }
            }
        }

        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url).form(&request.form),
        };

        let response = builder
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(e, request.timeout))?;

        Ok(HttpResponse {
            status,
            url,
            content_type,
            body,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else if e.is_builder() {
        FetchError::InvalidRequest(e.to_string())
    } else {
        FetchError::Other(e.to_string())
    }
}

/// Content sniffing for anti-bot interstitials
pub fn is_challenge(status: u16, body: &str) -> bool {
    let lower = body.to_lowercase();
    if CHALLENGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    !(200..300).contains(&status) && CHALLENGE_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// What a challenge solver hands back
#[derive(Debug, Clone)]
pub struct SolvedChallenge {
    pub status: u16,
    pub body: String,
    pub cookies: Vec<(String, String)>,
    pub user_agent: Option<String>,
}

/// External service that can get past JavaScript challenges
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Replay `request` (method, headers and form body) through the solver
    async fn solve(&self, request: &HttpRequest) -> Result<SolvedChallenge, FetchError>;
}

/// FlareSolverr client (`POST {endpoint}/v1`)
pub struct FlareSolverrClient {
    client: Client,
    endpoint: String,
    max_timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FlareSolverrRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    max_timeout: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    headers: Vec<FlareSolverrHeader<'a>>,
    /// `application/x-www-form-urlencoded` body for `request.post`
    #[serde(skip_serializing_if = "Option::is_none")]
    post_data: Option<String>,
}

impl<'a> FlareSolverrRequest<'a> {
    fn new(request: &'a HttpRequest, max_timeout: Duration) -> Self {
        let (cmd, post_data) = match request.method {
            HttpMethod::Get => ("request.get", None),
            HttpMethod::Post => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(request.form.iter())
                    .finish();
                ("request.post", Some(body))
            }
        };

        Self {
            cmd,
            url: &request.url,
            max_timeout: max_timeout.as_millis() as u64,
            headers: request
                .headers
                .iter()
                .map(|(name, value)| FlareSolverrHeader {
                    name: name.as_str(),
                    value: value.as_str(),
                })
                .collect(),
            post_data,
        }
    }
}

#[derive(Debug, Serialize)]
struct FlareSolverrHeader<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct FlareSolverrResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    solution: Option<FlareSolverrSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlareSolverrSolution {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    cookies: Vec<FlareSolverrCookie>,
    #[serde(default)]
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlareSolverrCookie {
    name: String,
    value: String,
}

impl FlareSolverrClient {
    pub fn new(endpoint: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            max_timeout: Duration::from_secs(60),
        })
    }
}

#[async_trait]
impl ChallengeSolver for FlareSolverrClient {
    async fn solve(&self, request: &HttpRequest) -> Result<SolvedChallenge, FetchError> {
        let payload = FlareSolverrRequest::new(request, self.max_timeout);

        tracing::debug!(
            url = %request.url,
            method = %request.method,
            endpoint = %self.endpoint,
            "Asking FlareSolverr to solve challenge"
        );

        let response = self
            .client
            .post(format!("{}/v1", self.endpoint))
            .json(&payload)
            .timeout(self.max_timeout + Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| FetchError::Solver(e.to_string()))?;

        let parsed: FlareSolverrResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Solver(format!("invalid FlareSolverr response: {}", e)))?;

        if parsed.status != "ok" {
            return Err(FetchError::Solver(
                parsed.message.unwrap_or_else(|| parsed.status.clone()),
            ));
        }

        let solution = parsed
            .solution
            .ok_or_else(|| FetchError::Solver("FlareSolverr returned no solution".to_string()))?;

        Ok(SolvedChallenge {
            status: solution.status.unwrap_or(200),
            body: solution.response,
            cookies: solution
                .cookies
                .into_iter()
                .map(|c| (c.name, c.value))
                .collect(),
            user_agent: solution.user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_detection() {
        assert!(is_challenge(
            503,
            "<html><title>Just a moment...</title></html>"
        ));
        assert!(is_challenge(
            200,
            "<p>Checking your browser before accessing</p>"
        ));
        assert!(is_challenge(403, "<script src=\"/cdn-cgi/challenge-platform/h/b\"></script>"));
        assert!(!is_challenge(
            200,
            "<table><script src=\"/cdn-cgi/challenge-platform/scripts/jsd/main.js\"></script></table>"
        ));
        assert!(!is_challenge(200, "<table><tr><td>Ubuntu</td></tr></table>"));
    }

    #[test]
    fn test_flaresolverr_payload_shape() {
        let mut request = HttpRequest::get("https://example.org/", Duration::from_secs(5));
        request.headers.push(("User-Agent".to_string(), "ua".to_string()));
        let payload = FlareSolverrRequest::new(&request, Duration::from_secs(60));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["cmd"], "request.get");
        assert_eq!(json["maxTimeout"], 60000);
        assert_eq!(json["headers"][0]["name"], "User-Agent");
        assert!(json.get("postData").is_none());
    }

    #[test]
    fn test_flaresolverr_post_carries_form() {
        let mut request = HttpRequest::get("https://example.org/search.php", Duration::from_secs(5));
        request.method = HttpMethod::Post;
        request.form = vec![
            ("q".to_string(), "ubuntu 24.04".to_string()),
            ("cat".to_string(), "1,2".to_string()),
        ];
        let json = serde_json::to_value(FlareSolverrRequest::new(&request, Duration::from_secs(60))).unwrap();
        assert_eq!(json["cmd"], "request.post");
        assert_eq!(json["url"], "https://example.org/search.php");
        assert_eq!(json["postData"], "q=ubuntu+24.04&cat=1%2C2");
    }

    #[test]
    fn test_flaresolverr_response_parsing() {
        let body = r#"{"status":"ok","message":"","solution":{"url":"https://example.org/","status":200,
            "response":"<html>ok</html>","cookies":[{"name":"cf_clearance","value":"abc"}],
            "userAgent":"Mozilla/5.0"}}"#;
        let parsed: FlareSolverrResponse = serde_json::from_str(body).unwrap();
        let solution = parsed.solution.unwrap();
        assert_eq!(solution.response, "<html>ok</html>");
        assert_eq!(solution.cookies[0].name, "cf_clearance");
        assert_eq!(solution.user_agent.as_deref(), Some("Mozilla/5.0"));
    }
}
