//! Declarative indexers driven by Cardigann YAML definitions
//!
//! A [`CardigannIndexer`] runs one search as a small state machine:
//!
//! 1. build the variable environment and the request for each search path
//! 2. try every link (primary first, then legacy mirrors) until one answers
//!    with real content; timeouts, error statuses and challenge pages move on
//!    to the next link, and a configured solver gets one shot at a challenge
//! 3. parse the body by its declared (or sniffed) shape and extract rows
//! 4. normalize rows into releases
//!
//! Only when every link fails does the indexer report an error.

pub mod definition;
pub mod extract;
pub mod feeds;
pub mod filters;
pub mod normalize;
pub mod store;
pub mod template;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use url::Url;

use self::definition::{Definition, ResponseShape, SearchPath};
use self::extract::{Document, RawRow, RowExtractor};
use self::filters::FilterChain;
use self::normalize::SiteContext;
use self::template::{Environment, TemplateValue};
use super::categories::{self, cats};
use super::error::{DefinitionError, FetchError, SearchError};
use super::http::{
    ChallengeSolver, DEFAULT_USER_AGENT, HttpFetcher, HttpMethod, HttpRequest, HttpResponse,
    is_challenge,
};
use super::types::{
    DEFAULT_PRIORITY, IndexerType, QueryType, ReleaseInfo, TorznabCapabilities, TorznabQuery,
};
use super::{Indexer, TrackerType};

/// Default per-link request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Input key whose value is appended to the query string as is
const RAW_INPUT: &str = "$raw";

/// Cookies and user agent handed back by a challenge solver, reused for
/// later requests to the same site
#[derive(Debug, Clone, Default)]
struct SolverSession {
    cookies: Vec<(String, String)>,
    user_agent: Option<String>,
}

/// One configured site backed by a definition
pub struct CardigannIndexer {
    id: String,
    name: String,
    priority: i32,
    definition: Arc<Definition>,
    settings: Vec<(String, String)>,
    capabilities: TorznabCapabilities,
    extractor: RowExtractor,
    keyword_filters: FilterChain,
    preprocessing_filters: FilterChain,
    fetcher: Arc<dyn HttpFetcher>,
    solver: Option<Arc<dyn ChallengeSolver>>,
    session: Mutex<SolverSession>,
    request_timeout: Duration,
    user_agent: String,
}

impl std::fmt::Debug for CardigannIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardigannIndexer")
            .field("id", &self.id)
            .field("definition", &self.definition.id)
            .field("priority", &self.priority)
            .finish()
    }
}

impl CardigannIndexer {
    /// Build an indexer for a validated definition. The instance id and name
    /// default to the definition's.
    pub fn new(definition: Arc<Definition>, fetcher: Arc<dyn HttpFetcher>) -> Result<Self, DefinitionError> {
        definition::validate(&definition).map_err(|reasons| DefinitionError::Invalid {
            id: definition.id.clone(),
            reasons,
        })?;
        let search = definition.search.clone().unwrap_or_default();
        let rows = search.rows.clone().unwrap_or_default();

        Ok(Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            priority: DEFAULT_PRIORITY,
            settings: definition.default_settings(),
            capabilities: build_capabilities(&definition),
            extractor: RowExtractor::new(&rows, &search.fields),
            keyword_filters: FilterChain::compile(&search.keywordsfilters),
            preprocessing_filters: FilterChain::compile(&search.preprocessingfilters),
            definition,
            fetcher,
            solver: None,
            session: Mutex::new(SolverSession::default()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    pub fn with_instance(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.id = id.into();
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.name = name;
        }
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Override setting values; unknown keys are kept so definitions can
    /// still read them through `.Config`
    pub fn with_settings(mut self, overrides: &[(String, String)]) -> Self {
        for (key, value) in overrides {
            match self.settings.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.clone(),
                None => self.settings.push((key.clone(), value.clone())),
            }
        }
        self
    }

    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    fn setting(&self, name: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Variables shared by every request and row of one search
    fn build_environment(&self, query: &TorznabQuery, site_categories: &[String]) -> Environment {
        let mut env = Environment::new();

        let keywords = self.keyword_filters.apply_text(&query.keywords());
        env.set("Keywords", keywords.clone());
        env.set("Query.Keywords", keywords);
        env.set("Query.Q", query.search_term.clone().unwrap_or_default());
        env.set(
            "Query.Type",
            match query.query_type {
                QueryType::Search => "search",
                QueryType::TvSearch => "tvsearch",
                QueryType::MovieSearch => "movie",
            },
        );
        let optional = |v: Option<String>| v.map(TemplateValue::Text).unwrap_or(TemplateValue::Null);
        env.set("Query.Season", optional(query.season.map(|s| s.to_string())));
        env.set("Query.Ep", optional(query.episode.clone()));
        env.set("Query.IMDBID", optional(query.imdb_id.clone()));
        env.set("Query.IMDBIDShort", optional(query.imdb_id_short()));
        env.set("Query.Year", optional(query.year.map(|y| y.to_string())));
        env.set("Query.Limit", optional(query.limit.map(|l| l.to_string())));
        env.set("Query.Offset", optional(query.offset.map(|o| o.to_string())));

        env.set("Categories", site_categories.to_vec());
        env.set("Query.Categories", site_categories.to_vec());
        env.set(
            "Category",
            optional(site_categories.first().cloned()),
        );

        for field in &self.definition.settings {
            let value = self.setting(&field.name).unwrap_or_default();
            if field.is_checkbox() {
                let checked = matches!(value.to_lowercase().as_str(), "true" | "1" | "on" | "yes");
                env.set(format!("Config.{}", field.name), checked);
            } else {
                env.set(format!("Config.{}", field.name), value);
            }
        }
        for (key, value) in &self.settings {
            if env.get(&format!("Config.{}", key)).is_none() {
                env.set(format!("Config.{}", key), value.as_str());
            }
        }

        env.set("Today.Year", filters::year_of(Utc::now()).to_string());
        env
    }

    /// Paths whose categories overlap the requested site categories; paths
    /// without categories always apply, and no requested categories means
    /// every path.
    fn select_paths(&self, site_categories: &[String]) -> Vec<SearchPath> {
        self.definition
            .search_paths()
            .into_iter()
            .filter(|p| {
                site_categories.is_empty()
                    || p.categories.is_empty()
                    || p.categories.iter().any(|c| site_categories.contains(c))
            })
            .collect()
    }

    fn build_request(&self, path: &SearchPath, link: &str, env: &Environment) -> Result<HttpRequest, FetchError> {
        let rendered = template::evaluate_with(&path.path, env, &|s: &str| urlencoding::encode(s).into_owned());
        let base = Url::parse(&ensure_trailing_slash(link))
            .map_err(|e| FetchError::InvalidRequest(format!("bad link '{}': {}", link, e)))?;
        let mut url = base
            .join(rendered.trim())
            .map_err(|e| FetchError::InvalidRequest(format!("bad path '{}': {}", rendered, e)))?;

        let mut inputs = Vec::with_capacity(path.inputs.len());
        let mut raw = None;
        for (key, value) in &path.inputs {
            let value = template::evaluate(value, env);
            if key == RAW_INPUT {
                raw = Some(value);
            } else {
                inputs.push((key.clone(), value));
            }
        }

        let mut form = vec![];
        match path.method {
            HttpMethod::Get if !inputs.is_empty() => {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in &inputs {
                    pairs.append_pair(key, value);
                }
            }
            HttpMethod::Get => {}
            HttpMethod::Post => form = inputs,
        }
        if let Some(raw) = raw.filter(|r| !r.is_empty()) {
            let query = match url.query() {
                Some(q) if !q.is_empty() => format!("{}&{}", q, raw),
                _ => raw,
            };
            url.set_query(Some(&query));
        }

        let shape = path.shape.unwrap_or_default();
        let session = self.session.lock().clone();
        let mut headers = vec![
            (
                "User-Agent".to_string(),
                session.user_agent.clone().unwrap_or_else(|| self.user_agent.clone()),
            ),
            ("Accept".to_string(), shape.accept_header().to_string()),
            ("Accept-Language".to_string(), "en-US,en;q=0.5".to_string()),
            ("DNT".to_string(), "1".to_string()),
        ];

        let mut cookies: Vec<String> = self
            .setting("cookie")
            .filter(|c| !c.trim().is_empty())
            .map(|c| vec![c.trim().to_string()])
            .unwrap_or_default();
        cookies.extend(session.cookies.iter().map(|(k, v)| format!("{}={}", k, v)));
        if !cookies.is_empty() {
            headers.push(("Cookie".to_string(), cookies.join("; ")));
        }

        if let Some(search) = &self.definition.search {
            for (name, value) in &search.headers {
                let value = template::evaluate(value, env);
                match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                    Some(existing) => existing.1 = value,
                    None => headers.push((name.clone(), value)),
                }
            }
        }

        Ok(HttpRequest {
            method: path.method,
            url: url.to_string(),
            headers,
            form,
            timeout: self.request_timeout,
        })
    }

    /// Ask the solver to fetch a challenged page. `None` when there is no
    /// solver or it could not get through either.
    async fn solve_challenge(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let solver = self.solver.as_ref()?;
        match solver.solve(request).await {
            Ok(solved) if !is_challenge(solved.status, &solved.body) => {
                tracing::info!(indexer_id = %self.id, url = %request.url, "Challenge solved");
                {
                    let mut session = self.session.lock();
                    session.cookies = solved.cookies;
                    if solved.user_agent.is_some() {
                        session.user_agent = solved.user_agent;
                    }
                }
                Some(HttpResponse {
                    status: solved.status,
                    url: request.url.clone(),
                    content_type: None,
                    body: solved.body,
                })
            }
            Ok(_) => {
                tracing::warn!(indexer_id = %self.id, url = %request.url, "Solver returned another challenge");
                None
            }
            Err(e) => {
                tracing::warn!(indexer_id = %self.id, url = %request.url, error = %e, "Challenge solver failed");
                None
            }
        }
    }

    /// Try each link in order until one yields a usable response
    async fn search_path(
        &self,
        path: &SearchPath,
        links: &[String],
        env: &Environment,
        query: &TorznabQuery,
    ) -> Result<Vec<RawRow>, SearchError> {
        let mut last_error = None;

        for (attempt, link) in links.iter().enumerate() {
            let mut link_env = env.clone();
            link_env.set("Config.sitelink", ensure_trailing_slash(link));

            let request = match self.build_request(path, link, &link_env) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(indexer_id = %self.id, link = %link, error = %e, "Could not build request");
                    last_error = Some(e);
                    continue;
                }
            };

            tracing::debug!(
                indexer_id = %self.id,
                attempt = attempt + 1,
                method = %request.method,
                url = %request.url,
                "Fetching search page"
            );

            let response = match self.fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        indexer_id = %self.id,
                        link = %link,
                        error = %e,
                        transient = e.is_transient(),
                        "Link failed, trying next"
                    );
                    last_error = Some(e);
                    continue;
                }
            };

            let response = if is_challenge(response.status, &response.body) {
                tracing::warn!(indexer_id = %self.id, link = %link, status = response.status, "Challenge page detected");
                match self.solve_challenge(&request).await {
                    Some(solved) => solved,
                    None => {
                        last_error = Some(FetchError::Challenge(link.clone()));
                        continue;
                    }
                }
            } else {
                response
            };

            if !response.is_success() {
                tracing::warn!(indexer_id = %self.id, link = %link, status = response.status, "Link returned error status, trying next");
                last_error = Some(FetchError::Status(response.status));
                continue;
            }

            let base_url = Url::parse(&response.url)
                .or_else(|_| Url::parse(&ensure_trailing_slash(link)))
                .map_err(|e| SearchError::Other(format!("bad link '{}': {}", link, e)))?;
            return self.parse_response(&response, path, &base_url, &link_env, query);
        }

        Err(match last_error {
            Some(last) => SearchError::LinksExhausted {
                attempts: links.len(),
                last,
            },
            None => SearchError::NoLinks,
        })
    }

    /// Dispatch on the response shape. Synchronous: the markup tree must not
    /// live across an await.
    fn parse_response(
        &self,
        response: &HttpResponse,
        path: &SearchPath,
        base_url: &Url,
        env: &Environment,
        query: &TorznabQuery,
    ) -> Result<Vec<RawRow>, SearchError> {
        let body = if self.preprocessing_filters.is_empty() {
            response.body.clone()
        } else {
            self.preprocessing_filters.apply_text(&response.body)
        };

        let shape = path
            .shape
            .unwrap_or_else(|| sniff_shape(&body, response.content_type.as_deref()));
        tracing::debug!(indexer_id = %self.id, ?shape, bytes = body.len(), "Parsing response");

        let parse_json = |kind: &'static str| {
            serde_json::from_str::<serde_json::Value>(&body).map_err(|e| SearchError::Malformed {
                kind,
                reason: e.to_string(),
            })
        };

        let rows = match shape {
            ResponseShape::Html => {
                let document = Document::html(&body);
                self.extractor.extract_rows(&document, base_url, env)?
            }
            ResponseShape::Json => {
                let document = Document::Json(parse_json("json")?);
                self.extractor.extract_rows(&document, base_url, env)?
            }
            ResponseShape::Rss => {
                let items = feeds::parse_rss(&body)?;
                feeds::filter_by_title(self.extractor.extract_items(&items, env), &query.keywords())
            }
            ResponseShape::Yts => {
                let items = feeds::reshape_yts(&parse_json("yts")?)?;
                feeds::filter_by_title(self.extractor.extract_items(&items, env), &query.keywords())
            }
            ResponseShape::Eztv => {
                let items = feeds::reshape_eztv(&parse_json("eztv")?)?;
                feeds::filter_by_title(self.extractor.extract_items(&items, env), &query.keywords())
            }
            ResponseShape::Apibay => {
                let items = feeds::reshape_apibay(&parse_json("apibay")?)?;
                feeds::filter_by_title(self.extractor.extract_items(&items, env), &query.keywords())
            }
        };

        Ok(rows)
    }

    fn normalize_rows(&self, rows: &[RawRow]) -> Vec<ReleaseInfo> {
        let ctx = SiteContext::new(&self.capabilities, self.tracker_type());
        rows.iter()
            .filter_map(|row| normalize::normalize(row, &ctx))
            .map(|mut release| {
                release.indexer_id = Some(self.id.clone());
                release.indexer_name = Some(self.name.clone());
                release.indexer_priority = self.priority;
                release
            })
            .collect()
    }
}

#[async_trait]
impl Indexer for CardigannIndexer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn indexer_type(&self) -> IndexerType {
        IndexerType::Cardigann
    }

    fn tracker_type(&self) -> TrackerType {
        self.definition.tracker_type()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn capabilities(&self) -> &TorznabCapabilities {
        &self.capabilities
    }

    async fn search(&self, query: &TorznabQuery) -> Result<Vec<ReleaseInfo>, SearchError> {
        let links = self.definition.all_links();
        if links.is_empty() {
            return Err(SearchError::NoLinks);
        }

        let site_categories = self.capabilities.map_torznab_to_tracker(&query.categories);
        let env = self.build_environment(query, &site_categories);
        let paths = self.select_paths(&site_categories);
        let delay = self
            .definition
            .request_delay
            .filter(|d| *d > 0.0)
            .map(Duration::from_secs_f64);

        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for (i, path) in paths.iter().enumerate() {
            if i > 0 {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
            match self.search_path(path, &links, &env, query).await {
                Ok(mut found) => rows.append(&mut found),
                Err(e) => {
                    tracing::warn!(indexer_id = %self.id, path = %path.path, error = %e, "Search path failed");
                    failures.push(e);
                }
            }
        }

        if rows.is_empty() && !failures.is_empty() && failures.len() == paths.len() {
            if let Some(last) = failures.pop() {
                return Err(last);
            }
        }

        let releases = self.normalize_rows(&rows);
        tracing::debug!(
            indexer_id = %self.id,
            rows = rows.len(),
            releases = releases.len(),
            "Indexer search finished"
        );
        Ok(releases)
    }
}

/// Capabilities from the `caps` block. Unknown category names map to Other.
pub fn build_capabilities(definition: &Definition) -> TorznabCapabilities {
    let mut caps = TorznabCapabilities::new();
    let resolve = |name: &str| {
        categories::parse_category_name(name).unwrap_or_else(|| {
            tracing::debug!(definition = %definition.id, category = %name, "Unknown category name, mapping to Other");
            cats::OTHER
        })
    };

    for mapping in &definition.caps.categorymappings {
        let desc = mapping.desc.as_deref().unwrap_or(&mapping.cat);
        caps.add_category(&mapping.id, resolve(&mapping.cat), desc);
    }
    for (id, name) in &definition.caps.categories {
        caps.add_category(id, resolve(name), name);
    }

    if !definition.caps.modes.is_empty() {
        caps.modes = definition.caps.modes.clone();
    }
    caps.supports_raw_search = definition.caps.allowrawsearch;
    caps
}

/// Guess a response shape from its first bytes when the definition is silent
pub fn sniff_shape(body: &str, content_type: Option<&str>) -> ResponseShape {
    let head = body.trim_start();
    if head.starts_with('{') || head.starts_with('[') {
        return ResponseShape::Json;
    }
    let lower: String = head.chars().take(256).collect::<String>().to_lowercase();
    if lower.starts_with("<rss") || (lower.starts_with("<?xml") && lower.contains("<rss")) {
        return ResponseShape::Rss;
    }
    match content_type.map(|c| c.to_lowercase()) {
        Some(c) if c.contains("json") => ResponseShape::Json,
        Some(c) if c.contains("rss") || c.contains("text/xml") || c.contains("application/xml") => {
            ResponseShape::Rss
        }
        _ => ResponseShape::Html,
    }
}

fn ensure_trailing_slash(link: &str) -> String {
    let link = link.trim();
    if link.ends_with('/') {
        link.to_string()
    } else {
        format!("{}/", link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct NoFetch;

    #[async_trait]
    impl HttpFetcher for NoFetch {
        async fn fetch(&self, _request: &HttpRequest) -> Result<HttpResponse, FetchError> {
            Err(FetchError::Connect("offline".into()))
        }
    }

    const DEF: &str = r#"
id: sample
name: Sample
type: public
links: [https://sample.example]
caps:
  categorymappings:
    - {id: 10, cat: Movies/HD, desc: "HD Movies"}
    - {id: 20, cat: TV, desc: "TV"}
settings:
  - {name: freeleech, type: checkbox, default: "true"}
  - {name: sort, type: select, default: seeders}
search:
  paths:
    - path: "search/{{ .Keywords }}"
      categories: [10]
    - path: tv.php
      categories: [20]
      method: post
  inputs:
    o: "{{ .Config.sort }}"
    $raw: "{{ if .Config.freeleech }}free=1{{ end }}"
  headers:
    Referer: "{{ .Config.sitelink }}"
  keywordsfilters:
    - {name: re_replace, args: ["[^a-zA-Z0-9]+", " "]}
  rows: {selector: tr}
  fields: {title: a}
"#;

    fn indexer() -> CardigannIndexer {
        let def = Arc::new(definition::load(DEF).unwrap());
        CardigannIndexer::new(def, Arc::new(NoFetch)).unwrap()
    }

    #[test]
    fn test_capabilities_from_definition() {
        let idx = indexer();
        assert_eq!(idx.capabilities().map_tracker_to_torznab("10"), vec![2040]);
        assert_eq!(idx.capabilities().map_torznab_to_tracker(&[5000]), vec!["20"]);
    }

    #[test]
    fn test_environment_variables() {
        let idx = indexer().with_settings(&[("sort".to_string(), "size".to_string())]);
        let query = TorznabQuery::search("Dune: Part-Two");
        let env = idx.build_environment(&query, &["10".to_string()]);

        assert_eq!(env.text("Keywords"), "Dune Part Two");
        assert_eq!(env.get("Config.freeleech"), Some(&TemplateValue::Bool(true)));
        assert_eq!(env.text("Config.sort"), "size");
        assert_eq!(env.text("Categories"), "10");
        assert_eq!(env.get("Query.Season"), Some(&TemplateValue::Null));
    }

    #[test]
    fn test_get_request_building() {
        let idx = indexer();
        let query = TorznabQuery::search("the matrix");
        let mut env = idx.build_environment(&query, &[]);
        env.set("Config.sitelink", "https://sample.example/");
        let paths = idx.select_paths(&[]);

        let request = idx.build_request(&paths[0], "https://sample.example", &env).unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://sample.example/search/the%20matrix?o=seeders&free=1");
        assert_eq!(request.header("referer"), Some("https://sample.example/"));
        assert_eq!(request.header("dnt"), Some("1"));
        assert!(request.header("user-agent").unwrap().contains("Chrome"));
    }

    #[test]
    fn test_post_request_uses_form() {
        let idx = indexer().with_settings(&[("cookie".to_string(), "uid=1; pass=x".to_string())]);
        let env = idx.build_environment(&TorznabQuery::search("show"), &[]);
        let paths = idx.select_paths(&[]);

        let request = idx.build_request(&paths[1], "https://sample.example/", &env).unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://sample.example/tv.php?free=1");
        assert_eq!(request.form, vec![("o".to_string(), "seeders".to_string())]);
        assert_eq!(request.header("cookie"), Some("uid=1; pass=x"));
    }

    #[test]
    fn test_path_selection_by_category() {
        let idx = indexer();
        assert_eq!(idx.select_paths(&[]).len(), 2);
        let movie_paths = idx.select_paths(&["10".to_string()]);
        assert_eq!(movie_paths.len(), 1);
        assert_eq!(movie_paths[0].path, "search/{{ .Keywords }}");
    }

    #[test]
    fn test_sniff_shape() {
        assert_eq!(sniff_shape("  {\"a\":1}", None), ResponseShape::Json);
        assert_eq!(sniff_shape("[]", None), ResponseShape::Json);
        assert_eq!(sniff_shape("<?xml version=\"1.0\"?><rss>", None), ResponseShape::Rss);
        assert_eq!(sniff_shape("<html></html>", None), ResponseShape::Html);
        assert_eq!(sniff_shape("ok", Some("application/json")), ResponseShape::Json);
    }

    #[tokio::test]
    async fn test_all_links_failing_is_error() {
        let idx = indexer();
        let result = idx.search(&TorznabQuery::search("x")).await;
        assert!(matches!(result, Err(SearchError::LinksExhausted { attempts: 1, .. })));
    }
}
