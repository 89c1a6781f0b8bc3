//! Cardigann YAML definition model
//!
//! One document describes one site: where it lives, how to ask it something
//! and how to read the answer.
//!
//! ```yaml
//! id: example-tracker
//! name: Example Tracker
//! type: public
//! links:
//!   - https://example-tracker.com/
//! legacylinks:
//!   - https://example-mirror.net/
//!
//! caps:
//!   categorymappings:
//!     - {id: 1, cat: Movies/HD, desc: "HD Movies"}
//!     - {id: 2, cat: TV/HD, desc: "HD TV Shows"}
//!
//! settings:
//!   - {name: sort, type: select, default: time}
//!
//! search:
//!   paths:
//!     - path: "browse.php"
//!   inputs:
//!     q: "{{ .Keywords }}"
//!     o: "{{ .Config.sort }}"
//!   rows:
//!     selector: table.torrents > tbody > tr
//!   fields:
//!     title:
//!       selector: a.title
//!     download:
//!       selector: a[href^="download.php"]
//!       attribute: href
//!     size:
//!       selector: td:nth-child(5)
//! ```
//!
//! Documents are parsed leniently (missing sections default to empty) and
//! then checked by [`validate`]; only documents that pass become active.

use scraper::Selector;
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};

use crate::indexer::TrackerType;
use crate::indexer::error::DefinitionError;
use crate::indexer::http::HttpMethod;

/// Cardigann YAML indexer definition
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(rename = "type", default)]
    pub tracker_type: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(rename = "requestDelay", default)]
    pub request_delay: Option<f64>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub legacylinks: Vec<String>,
    #[serde(default)]
    pub caps: CapabilitiesBlock,
    #[serde(default)]
    pub settings: Vec<SettingsField>,
    #[serde(default)]
    pub search: Option<SearchBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapabilitiesBlock {
    /// Short form: site id -> Torznab category name
    #[serde(default, deserialize_with = "string_map")]
    pub categories: Vec<(String, String)>,
    #[serde(default)]
    pub categorymappings: Vec<CategoryMappingDef>,
    #[serde(default, deserialize_with = "mode_map")]
    pub modes: Vec<(String, Vec<String>)>,
    #[serde(default)]
    pub allowrawsearch: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryMappingDef {
    #[serde(deserialize_with = "scalar_string")]
    pub id: String,
    pub cat: String,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub default: Option<String>,
}

impl SettingsField {
    pub fn is_checkbox(&self) -> bool {
        self.field_type.as_deref() == Some("checkbox")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchBlock {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub paths: Vec<SearchPathDef>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "string_map")]
    pub inputs: Vec<(String, String)>,
    #[serde(default, deserialize_with = "string_map")]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub keywordsfilters: Vec<FilterDef>,
    #[serde(default)]
    pub preprocessingfilters: Vec<FilterDef>,
    #[serde(default)]
    pub response: Option<ResponseBlock>,
    #[serde(default, deserialize_with = "rows_spec")]
    pub rows: Option<RowsSpec>,
    #[serde(default, deserialize_with = "field_map")]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPathDef {
    pub path: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "string_map")]
    pub inputs: Vec<(String, String)>,
    #[serde(default = "default_true")]
    pub inheritinputs: bool,
    #[serde(default)]
    pub response: Option<ResponseBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseBlock {
    #[serde(rename = "type", default)]
    pub response_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowsSpec {
    pub selector: String,
    /// Number of following sibling rows merged into each row
    #[serde(default)]
    pub after: usize,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub text: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub remove: Option<String>,
    #[serde(rename = "case", default, deserialize_with = "string_map")]
    pub case_map: Vec<(String, String)>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub default: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
}

/// A field as declared, with its `name|modifier` key split apart
#[derive(Debug, Clone, Default)]
pub struct FieldDef {
    pub name: String,
    pub optional: bool,
    pub append: bool,
    pub spec: FieldSpec,
}

impl FieldDef {
    fn from_key(key: &str, spec: FieldSpec) -> Self {
        let mut parts = key.split('|');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let mut field = FieldDef {
            name,
            optional: spec.optional,
            append: false,
            spec,
        };
        for modifier in parts {
            match modifier.trim() {
                "optional" => field.optional = true,
                "append" => field.append = true,
                other => {
                    tracing::debug!(field = %field.name, modifier = %other, "Ignoring unknown field modifier");
                }
            }
        }
        field
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterDef {
    pub name: String,
    #[serde(default)]
    pub args: Option<Value>,
}

impl FilterDef {
    pub fn new(name: &str, args: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            args,
        }
    }

    /// Arguments flattened to strings; a scalar becomes a one element list
    pub fn args(&self) -> Vec<String> {
        match &self.args {
            None | Some(Value::Null) => vec![],
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(other) => scalar_to_string(other).into_iter().collect(),
        }
    }
}

/// How a search response must be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    #[default]
    Html,
    Json,
    /// RSS 2.0 with torznab/newznab/torrent extensions
    Rss,
    /// YTS movie API: movies with nested torrents
    Yts,
    /// EZTV torrent API
    Eztv,
    /// The Pirate Bay apibay.org API
    Apibay,
}

impl ResponseShape {
    pub fn from_declared(declared: Option<&str>) -> Option<Self> {
        let shape = match declared?.trim().to_lowercase().as_str() {
            "json" => ResponseShape::Json,
            "xml" | "rss" | "torznab" => ResponseShape::Rss,
            "yts" => ResponseShape::Yts,
            "eztv" => ResponseShape::Eztv,
            "apibay" | "tpb" => ResponseShape::Apibay,
            "html" => ResponseShape::Html,
            _ => return None,
        };
        Some(shape)
    }

    /// Rows/fields are resolved against a JSON tree
    pub fn is_json_like(&self) -> bool {
        !matches!(self, ResponseShape::Html)
    }

    pub fn accept_header(&self) -> &'static str {
        match self {
            ResponseShape::Html => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ResponseShape::Rss => "application/rss+xml, application/xml, text/xml",
            _ => "application/json",
        }
    }
}

/// One request the dispatcher issues per search
#[derive(Debug, Clone)]
pub struct SearchPath {
    pub path: String,
    pub method: HttpMethod,
    pub categories: Vec<String>,
    pub inputs: Vec<(String, String)>,
    /// `None` when undeclared; the dispatcher sniffs the body
    pub shape: Option<ResponseShape>,
}

impl Definition {
    pub fn tracker_type(&self) -> TrackerType {
        self.tracker_type
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(TrackerType::Private)
    }

    /// Primary links followed by legacy mirrors, in declared order
    pub fn all_links(&self) -> Vec<String> {
        let mut links: Vec<String> = Vec::with_capacity(self.links.len() + self.legacylinks.len());
        for link in self.links.iter().chain(self.legacylinks.iter()) {
            let link = link.trim().to_string();
            if !link.is_empty() && !links.contains(&link) {
                links.push(link);
            }
        }
        links
    }

    /// Resolved search paths with block level defaults applied
    pub fn search_paths(&self) -> Vec<SearchPath> {
        let Some(search) = &self.search else {
            return vec![];
        };

        let block_shape = search
            .response
            .as_ref()
            .and_then(|r| ResponseShape::from_declared(r.response_type.as_deref()));
        let block_method = parse_method(search.method.as_deref());

        if search.paths.is_empty() {
            return search
                .path
                .iter()
                .map(|path| SearchPath {
                    path: path.clone(),
                    method: block_method,
                    categories: vec![],
                    inputs: search.inputs.clone(),
                    shape: block_shape,
                })
                .collect();
        }

        search
            .paths
            .iter()
            .map(|p| {
                let mut inputs = if p.inheritinputs {
                    search.inputs.clone()
                } else {
                    vec![]
                };
                for (key, value) in &p.inputs {
                    match inputs.iter_mut().find(|(k, _)| k == key) {
                        Some(existing) => existing.1 = value.clone(),
                        None => inputs.push((key.clone(), value.clone())),
                    }
                }

                SearchPath {
                    path: p.path.clone(),
                    method: p
                        .method
                        .as_deref()
                        .map(|m| parse_method(Some(m)))
                        .unwrap_or(block_method),
                    categories: p.categories.clone(),
                    inputs,
                    shape: p
                        .response
                        .as_ref()
                        .and_then(|r| ResponseShape::from_declared(r.response_type.as_deref()))
                        .or(block_shape),
                }
            })
            .collect()
    }

    /// Setting defaults as declared, before user overrides
    pub fn default_settings(&self) -> Vec<(String, String)> {
        self.settings
            .iter()
            .map(|s| (s.name.clone(), s.default.clone().unwrap_or_default()))
            .collect()
    }
}

fn parse_method(method: Option<&str>) -> HttpMethod {
    match method.map(|m| m.to_lowercase()) {
        Some(m) if m == "post" => HttpMethod::Post,
        _ => HttpMethod::Get,
    }
}

/// Parse and validate a YAML definition document
pub fn load(source: &str) -> Result<Definition, DefinitionError> {
    let definition: Definition = serde_yaml::from_str(source)?;

    validate(&definition).map_err(|reasons| DefinitionError::Invalid {
        id: if definition.id.is_empty() {
            "<unknown>".to_string()
        } else {
            definition.id.clone()
        },
        reasons,
    })?;

    Ok(definition)
}

/// Check a parsed definition; every problem found is reported, not just the first
pub fn validate(definition: &Definition) -> Result<(), Vec<String>> {
    let mut reasons = vec![];

    if definition.id.trim().is_empty() {
        reasons.push("missing id".to_string());
    }
    if definition.name.trim().is_empty() {
        reasons.push("missing name".to_string());
    }

    if definition.links.iter().all(|l| l.trim().is_empty()) {
        reasons.push("at least one link is required".to_string());
    }
    for link in definition.all_links() {
        match url::Url::parse(&link) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => reasons.push(format!("link '{}' is not an absolute http(s) URL", link)),
        }
    }

    match &definition.search {
        None => reasons.push("missing search block".to_string()),
        Some(search) => {
            if search.path.as_deref().is_none_or(|p| p.trim().is_empty()) && search.paths.is_empty()
            {
                reasons.push("search block needs a path or paths".to_string());
            }

            match &search.rows {
                None => reasons.push("search block needs rows".to_string()),
                Some(rows) if rows.selector.trim().is_empty() => {
                    reasons.push("rows selector is empty".to_string())
                }
                Some(rows) => {
                    let markup = definition
                        .search_paths()
                        .iter()
                        .any(|p| p.shape.is_none_or(|s| !s.is_json_like()));
                    if markup
                        && !rows.selector.contains("{{")
                        && Selector::parse(&rows.selector).is_err()
                    {
                        reasons.push(format!("rows selector '{}' does not parse", rows.selector));
                    }
                }
            }

            if search.fields.is_empty() {
                reasons.push("search block needs at least one field".to_string());
            }
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(reasons)
    }
}

fn default_true() -> bool {
    true
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value).ok_or_else(|| serde::de::Error::custom("expected a scalar value"))
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(&other).into_iter().collect(),
        None => vec![],
    })
}

/// Ordered `key: scalar` map. Lists collapse to their first element, which
/// is how Cardigann header values are written.
fn string_map<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let Some(key) = scalar_to_string(&key) else {
            continue;
        };
        let value = match &value {
            Value::Sequence(items) => items.first().and_then(scalar_to_string),
            Value::Null => Some(String::new()),
            other => scalar_to_string(other),
        };
        if let Some(value) = value {
            entries.push((key, value));
        }
    }
    Ok(entries)
}

fn mode_map<'de, D>(deserializer: D) -> Result<Vec<(String, Vec<String>)>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    Ok(mapping
        .into_iter()
        .filter_map(|(key, value)| {
            let key = scalar_to_string(&key)?;
            let params = match value {
                Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
                _ => vec![],
            };
            Some((key, params))
        })
        .collect())
}

/// `rows:` accepts a bare selector string or a full block
fn rows_spec<'de, D>(deserializer: D) -> Result<Option<RowsSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(selector)) => Ok(Some(RowsSpec {
            selector,
            ..Default::default()
        })),
        Some(other) => serde_yaml::from_value(other)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// `fields:` keeps declaration order, later fields may reference earlier ones
fn field_map<'de, D>(deserializer: D) -> Result<Vec<FieldDef>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    let mut fields = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let Some(key) = scalar_to_string(&key) else {
            continue;
        };
        let spec = match value {
            Value::String(selector) => FieldSpec {
                selector: Some(selector),
                ..Default::default()
            },
            other => serde_yaml::from_value(other).map_err(|e| {
                serde::de::Error::custom(format!("field '{}': {}", key, e))
            })?,
        };
        fields.push(FieldDef::from_key(&key, spec));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const VALID: &str = r#"
id: demo
name: Demo
type: public
links:
  - https://demo.example/
legacylinks:
  - https://demo-mirror.example/
caps:
  categorymappings:
    - {id: 1, cat: Movies/HD, desc: "HD Movies"}
settings:
  - {name: freeleech, type: checkbox, default: false}
search:
  paths:
    - path: browse.php
      categories: [1]
    - path: api
      response: {type: json}
      inheritinputs: false
      inputs:
        format: json
  inputs:
    q: "{{ .Keywords }}"
  rows:
    selector: tr.row
    after: 1
  fields:
    title: a.title
    "description|optional":
      selector: td.desc
    size|append:
      text: 1
"#;

    #[test]
    fn test_load_valid_definition() {
        let def = load(VALID).unwrap();
        assert_eq!(def.id, "demo");
        assert_eq!(def.tracker_type(), TrackerType::Public);
        assert_eq!(def.caps.categorymappings[0].id, "1");
        assert_eq!(def.settings[0].default.as_deref(), Some("false"));
        assert_eq!(
            def.all_links(),
            vec!["https://demo.example/", "https://demo-mirror.example/"]
        );

        let search = def.search.as_ref().unwrap();
        assert_eq!(search.rows.as_ref().unwrap().after, 1);
        let names: Vec<_> = search.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "description", "size"]);
        assert_eq!(search.fields[0].spec.selector.as_deref(), Some("a.title"));
        assert!(search.fields[1].optional);
        assert!(search.fields[2].append);
        assert_eq!(search.fields[2].spec.text.as_deref(), Some("1"));
    }

    #[test]
    fn test_search_paths_inherit_inputs() {
        let def = load(VALID).unwrap();
        let paths = def.search_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].inputs, vec![("q".to_string(), "{{ .Keywords }}".to_string())]);
        assert_eq!(paths[0].categories, vec!["1"]);
        assert_eq!(paths[0].shape, None);
        assert_eq!(paths[1].inputs, vec![("format".to_string(), "json".to_string())]);
        assert_eq!(paths[1].shape, Some(ResponseShape::Json));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let def: Definition = serde_yaml::from_str("name: Broken\nsearch:\n  path: x\n").unwrap();
        let reasons = validate(&def).unwrap_err();
        assert!(reasons.contains(&"missing id".to_string()));
        assert!(reasons.contains(&"at least one link is required".to_string()));
        assert!(reasons.contains(&"search block needs rows".to_string()));
        assert!(reasons.contains(&"search block needs at least one field".to_string()));
    }

    #[test]
    fn test_validate_rejects_unparseable_rows_selector() {
        let doc = r#"
id: bad
name: Bad
links: [https://bad.example/]
search:
  path: /
  rows: {selector: "tr[[["}
  fields: {title: a}
"#;
        assert_matches!(load(doc), Err(DefinitionError::Invalid { id, .. }) if id == "bad");
    }

    #[test]
    fn test_templated_rows_selector_is_not_parsed() {
        let doc = r#"
id: tpl
name: Templated
links: [https://tpl.example/]
search:
  path: /
  rows: {selector: "{{ if .Config.alt }}div.alt{{ else }}tr{{ end }}"}
  fields: {title: a}
"#;
        assert!(load(doc).is_ok());
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        assert_matches!(load("id: [unclosed"), Err(DefinitionError::Parse(_)));
    }

    #[test]
    fn test_filter_args_flatten() {
        let f = FilterDef::new(
            "replace",
            Some(serde_yaml::from_str("[\"a\", 2]").unwrap()),
        );
        assert_eq!(f.args(), vec!["a", "2"]);
        let f = FilterDef::new("append", Some(Value::String("x".into())));
        assert_eq!(f.args(), vec!["x"]);
        assert!(FilterDef::new("trim", None).args().is_empty());
    }
}
