//! Shared helpers for integration tests: a scripted HTTP fetcher and a few
//! canned pages.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;

use indexer_aggregator::indexer::error::FetchError;
use indexer_aggregator::indexer::http::{
    ChallengeSolver, HttpFetcher, HttpRequest, HttpResponse, SolvedChallenge,
};

/// What the fetcher does for a matching URL
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond {
        status: u16,
        body: String,
        content_type: Option<String>,
    },
    Timeout,
    Refused,
}

impl Scripted {
    pub fn ok(body: impl Into<String>) -> Self {
        Scripted::Respond {
            status: 200,
            body: body.into(),
            content_type: Some("text/html; charset=utf-8".to_string()),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Scripted::Respond {
            status,
            body: body.into(),
            content_type: Some("text/html".to_string()),
        }
    }

    pub fn typed(body: impl Into<String>, content_type: &str) -> Self {
        Scripted::Respond {
            status: 200,
            body: body.into(),
            content_type: Some(content_type.to_string()),
        }
    }
}

/// Answers requests from a table of URL prefixes; the first match wins and
/// unmatched URLs get a 404. Every request is recorded.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<Vec<(String, Scripted)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, prefix: &str, response: Scripted) -> Self {
        self.routes.lock().push((prefix.to_string(), response));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpFetcher for MockFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.requests.lock().push(request.clone());

        let scripted = self
            .routes
            .lock()
            .iter()
            .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .map(|(_, s)| s.clone());

        match scripted {
            Some(Scripted::Respond {
                status,
                body,
                content_type,
            }) => Ok(HttpResponse {
                status,
                url: request.url.clone(),
                content_type,
                body,
            }),
            Some(Scripted::Timeout) => Err(FetchError::Timeout(request.timeout)),
            Some(Scripted::Refused) => Err(FetchError::Connect("connection refused".to_string())),
            None => Ok(HttpResponse {
                status: 404,
                url: request.url.clone(),
                content_type: None,
                body: "not found".to_string(),
            }),
        }
    }
}

/// Solver that answers every request with a fixed page and records what it
/// was asked to replay
pub struct MockSolver {
    body: String,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockSolver {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChallengeSolver for MockSolver {
    async fn solve(&self, request: &HttpRequest) -> Result<SolvedChallenge, FetchError> {
        self.requests.lock().push(request.clone());
        Ok(SolvedChallenge {
            status: 200,
            body: self.body.clone(),
            cookies: vec![("cf_clearance".to_string(), "solved".to_string())],
            user_agent: Some("SolverBrowser/1.0".to_string()),
        })
    }
}

pub const CHALLENGE_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Just a moment...</title></head>
<body><div id="challenge-platform">Checking your browser before accessing the site.</div></body></html>"#;

/// A results table in the shape most markup definitions scrape
pub fn results_table(rows: &[(&str, &str, &str, u32, &str)]) -> String {
    let mut html = String::from("<html><body><table id=\"torrents\">");
    for (title, size, category, seeders, hash) in rows {
        html.push_str(&format!(
            r#"<tr class="t-row">
  <td class="cat"><a href="/browse?cat={category}">{category}</a></td>
  <td class="name"><a class="title" href="/details/{hash}">{title}</a></td>
  <td class="dl"><a href="/download/{hash}.torrent">DL</a></td>
  <td class="size">{size}</td>
  <td class="seeders">{seeders}</td>
  <td class="leechers">3</td>
  <td class="date">2 days ago</td>
</tr>"#
        ));
    }
    html.push_str("</table></body></html>");
    html
}

/// A public markup definition with a primary link and two mirrors
pub fn markup_definition(id: &str, links: &[&str], legacy: &[&str]) -> String {
    let list = |items: &[&str]| {
        if items.is_empty() {
            return " []\n".to_string();
        }
        let mut out = String::from("\n");
        for link in items {
            out.push_str(&format!("  - {}\n", link));
        }
        out
    };
    format!(
        r#"id: {id}
name: {id} tracker
description: markup test tracker
type: public
links:{links}legacylinks:{legacy}caps:
  categorymappings:
    - {{id: 1, cat: Movies/HD, desc: "Movies HD"}}
    - {{id: 2, cat: TV/HD, desc: "TV HD"}}
    - {{id: 3, cat: Audio/MP3, desc: "Music"}}
search:
  paths:
    - path: search.php
  inputs:
    q: "{{{{ .Keywords }}}}"
    cat: "{{{{ join .Categories \",\" }}}}"
  rows:
    selector: "table#torrents tr.t-row"
  fields:
    category:
      selector: td.cat a
    title:
      selector: td.name a.title
    details:
      selector: td.name a.title
      attribute: href
    download:
      selector: td.dl a
      attribute: href
    size:
      selector: td.size
    seeders:
      selector: td.seeders
    leechers:
      selector: td.leechers
    date:
      selector: td.date
"#,
        links = list(links),
        legacy = list(legacy),
    )
}
