//! Row and field extraction over markup and JSON documents
//!
//! Rows are found with the definition's `rows` selector, then each field is
//! read from the row in declaration order. After every field the value is
//! bound as `.Result.<name>` so later fields, defaults and `text` templates
//! can build on it.
//!
//! Markup documents are parsed with scraper, whose tree is not `Send`:
//! everything here is synchronous and must finish before the caller awaits.

use std::collections::HashMap;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use url::Url;

use super::definition::{FieldDef, RowsSpec};
use super::filters::{FieldValue, FilterChain};
use super::template::{self, Environment, TemplateValue};
use crate::indexer::error::ExtractionError;

/// Field name to raw value, in extraction order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    values: Vec<(String, FieldValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        match self.values.iter_mut().find(|(k, _)| k == name) {
            Some(existing) => existing.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Trimmed text of a field, `None` when missing or blank
    pub fn text(&self, name: &str) -> Option<String> {
        let value = self.get(name)?;
        let text = value.as_text().trim().to_string();
        if text.is_empty() { None } else { Some(text) }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A parsed response ready for row extraction
pub enum Document {
    Html(Html),
    Json(JsonValue),
}

impl Document {
    pub fn html(body: &str) -> Self {
        Document::Html(Html::parse_document(body))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Document::Html(_) => f.write_str("Document::Html"),
            Document::Json(v) => write!(f, "Document::Json({})", v),
        }
    }
}

struct CompiledField {
    def: FieldDef,
    filters: FilterChain,
}

/// Rows spec and fields compiled once per indexer
pub struct RowExtractor {
    rows: RowsSpec,
    row_filters: FilterChain,
    fields: Vec<CompiledField>,
}

impl std::fmt::Debug for RowExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowExtractor")
            .field("rows", &self.rows.selector)
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// One row of a markup document, possibly merged with following siblings
struct HtmlRow<'a> {
    elements: Vec<ElementRef<'a>>,
}

impl<'a> HtmlRow<'a> {
    fn first(&self, selector: &Selector) -> Option<ElementRef<'a>> {
        self.elements.iter().find_map(|e| e.select(selector).next())
    }

    fn root(&self) -> Option<ElementRef<'a>> {
        self.elements.first().copied()
    }
}

#[derive(Default)]
struct SelectorCache {
    parsed: HashMap<String, Option<Selector>>,
}

impl SelectorCache {
    fn get(&mut self, source: &str) -> Result<&Selector, ExtractionError> {
        let entry = self
            .parsed
            .entry(source.to_string())
            .or_insert_with(|| Selector::parse(source).ok());
        entry.as_ref().ok_or_else(|| ExtractionError::Selector {
            selector: source.to_string(),
            reason: "not a valid CSS selector".to_string(),
        })
    }
}

impl RowExtractor {
    pub fn new(rows: &RowsSpec, fields: &[FieldDef]) -> Self {
        Self {
            rows: rows.clone(),
            row_filters: FilterChain::compile(&rows.filters),
            fields: fields
                .iter()
                .map(|def| CompiledField {
                    def: def.clone(),
                    filters: FilterChain::compile(&def.spec.filters),
                })
                .collect(),
        }
    }

    /// Extract every row of a document. Zero matching rows is an empty
    /// result; only a rows selector that does not parse is an error.
    pub fn extract_rows(
        &self,
        document: &Document,
        base_url: &Url,
        env: &Environment,
    ) -> Result<Vec<RawRow>, ExtractionError> {
        let rows = match document {
            Document::Html(html) => self.extract_html(html, base_url, env)?,
            Document::Json(value) => self.extract_json(value, env),
        };

        Ok(rows
            .into_iter()
            .filter(|row| self.keep_row(row, env))
            .collect())
    }

    fn extract_html(
        &self,
        html: &Html,
        base_url: &Url,
        env: &Environment,
    ) -> Result<Vec<RawRow>, ExtractionError> {
        let selector_text = template::evaluate(&self.rows.selector, env);
        let selector = Selector::parse(selector_text.trim()).map_err(|_| ExtractionError::Selector {
            selector: selector_text.clone(),
            reason: "rows selector does not parse".to_string(),
        })?;

        let matched: Vec<ElementRef> = html.select(&selector).collect();
        let mut cache = SelectorCache::default();
        let mut rows = Vec::with_capacity(matched.len());

        let step = self.rows.after + 1;
        for chunk in matched.chunks(step) {
            let row = HtmlRow {
                elements: chunk.to_vec(),
            };
            let mut row_env = env.clone();
            let mut raw = RawRow::new();
            for field in &self.fields {
                let value = self.extract_html_field(&row, field, base_url, &row_env, &mut cache);
                self.record(&mut raw, &mut row_env, field, value);
            }
            rows.push(raw);
        }

        Ok(rows)
    }

    fn extract_json(&self, document: &JsonValue, env: &Environment) -> Vec<RawRow> {
        let path = template::evaluate(&self.rows.selector, env);
        let items: Vec<&JsonValue> = match json_path(document, &path) {
            Some(JsonValue::Array(items)) => items.iter().collect(),
            Some(JsonValue::Null) | None => vec![],
            Some(other) => vec![other],
        };
        self.extract_objects(items, env)
    }

    /// Rows that were already collected by a feed parser or API reshaper;
    /// the rows selector is not consulted.
    pub fn extract_items(&self, items: &[JsonValue], env: &Environment) -> Vec<RawRow> {
        let rows = self.extract_objects(items.iter().collect(), env);
        rows.into_iter().filter(|row| self.keep_row(row, env)).collect()
    }

    fn extract_objects(&self, items: Vec<&JsonValue>, env: &Environment) -> Vec<RawRow> {
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let mut row_env = env.clone();
            let mut raw = RawRow::new();
            for field in &self.fields {
                let value = extract_json_field(item, field, &row_env);
                self.record(&mut raw, &mut row_env, field, value);
            }
            rows.push(raw);
        }
        rows
    }

    /// Filters, defaults, `|append` and the `.Result.*` binding
    fn record(
        &self,
        raw: &mut RawRow,
        env: &mut Environment,
        field: &CompiledField,
        extracted: Result<FieldValue, ExtractionError>,
    ) {
        let name = field.def.name.as_str();
        let mut value = match extracted {
            Ok(v) => field.filters.apply(v),
            Err(ExtractionError::Miss { .. }) if field.def.optional || field.def.spec.default.is_some() => {
                FieldValue::Null
            }
            Err(e) => {
                tracing::debug!(field = %name, error = %e, "Field extraction failed");
                FieldValue::Null
            }
        };

        if value.is_empty() {
            if let Some(default) = &field.def.spec.default {
                let rendered = template::evaluate(default, env);
                if !rendered.trim().is_empty() {
                    value = FieldValue::Text(rendered);
                }
            }
        }
        if value.is_empty() && value != FieldValue::Null {
            value = FieldValue::Null;
        }

        if field.def.append {
            if let Some(previous) = raw.get(name).filter(|v| !v.is_empty()) {
                value = FieldValue::Text(format!("{}{}", previous.as_text(), value.as_text()));
            }
        }

        let bound = match &value {
            FieldValue::Null => TemplateValue::Null,
            FieldValue::Text(s) => TemplateValue::Text(s.clone()),
            FieldValue::List(items) => TemplateValue::List(items.clone()),
        };
        env.set(format!("Result.{}", name), bound);
        raw.set(name, value);
    }

    fn extract_html_field(
        &self,
        row: &HtmlRow,
        field: &CompiledField,
        base_url: &Url,
        env: &Environment,
        cache: &mut SelectorCache,
    ) -> Result<FieldValue, ExtractionError> {
        let spec = &field.def.spec;
        let miss = || ExtractionError::Miss {
            field: field.def.name.clone(),
        };

        if let Some(text) = &spec.text {
            return Ok(FieldValue::Text(template::evaluate(text, env)));
        }

        let element = match spec.selector.as_deref().map(|s| template::evaluate(s, env)) {
            Some(selector) if !selector.trim().is_empty() => {
                let selector = cache.get(selector.trim())?.clone();
                row.first(&selector).ok_or_else(miss)?
            }
            _ => row.root().ok_or_else(miss)?,
        };

        if !spec.case_map.is_empty() {
            for (case_selector, case_value) in &spec.case_map {
                let matched = if case_selector.trim() == "*" {
                    true
                } else {
                    let sel = cache.get(case_selector.trim())?;
                    sel.matches(&element) || element.select(sel).next().is_some()
                };
                if matched {
                    return Ok(FieldValue::Text(template::evaluate(case_value, env)));
                }
            }
            return Err(miss());
        }

        if let Some(attribute) = &spec.attribute {
            let value = element.value().attr(attribute).ok_or_else(miss)?;
            let value = value.trim();
            return Ok(FieldValue::Text(if is_link_attribute(attribute) {
                resolve_url(base_url, value)
            } else {
                value.to_string()
            }));
        }

        if let Some(remove) = &spec.remove {
            let sel = cache.get(remove.trim())?;
            return Ok(FieldValue::Text(text_without(&element, sel)));
        }

        Ok(FieldValue::Text(element_text(&element)))
    }

    /// Row level filters: `andmatch` needs every keyword in the title
    fn keep_row(&self, row: &RawRow, env: &Environment) -> bool {
        if self.row_filters.is_empty() {
            return true;
        }

        // strdump sees the whole row
        let dump = row
            .values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value.as_text()))
            .collect::<Vec<_>>()
            .join("; ");
        self.row_filters.apply(FieldValue::Text(dump));

        if !self.row_filters.has_andmatch() {
            return true;
        }
        let keywords = env.text("Keywords").to_lowercase();
        let title = row.text("title").unwrap_or_default().to_lowercase();
        keywords.split_whitespace().all(|token| title.contains(token))
    }
}

fn is_link_attribute(attribute: &str) -> bool {
    matches!(
        attribute.to_lowercase().as_str(),
        "href" | "src" | "data-src" | "data-href" | "action"
    )
}

/// Resolve a possibly relative link against the page it came from.
/// `magnet:` and other absolute URLs pass through unchanged.
pub fn resolve_url(base: &Url, value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    match base.join(value) {
        Ok(url) => url.to_string(),
        Err(_) => value.to_string(),
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text content, skipping anything inside elements matching `remove`
fn text_without(element: &ElementRef, remove: &Selector) -> String {
    let removed: Vec<_> = element.select(remove).map(|e| e.id()).collect();
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if node.ancestors().any(|a| removed.contains(&a.id())) {
            continue;
        }
        out.push_str(text);
    }
    out.trim().to_string()
}

/// Walk a dotted path (`data.movies`, `torrents.0.hash`). Empty, `$` and `.`
/// mean the document root.
pub fn json_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let path = path.trim().trim_start_matches('$').trim_start_matches('.');
    if path.is_empty() {
        return Some(value);
    }

    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn json_scalar(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn extract_json_field(
    row: &JsonValue,
    field: &CompiledField,
    env: &Environment,
) -> Result<FieldValue, ExtractionError> {
    let spec = &field.def.spec;
    let miss = || ExtractionError::Miss {
        field: field.def.name.clone(),
    };

    if let Some(text) = &spec.text {
        return Ok(FieldValue::Text(template::evaluate(text, env)));
    }

    let selector = spec
        .selector
        .as_deref()
        .map(|s| template::evaluate(s, env))
        .unwrap_or_default();
    let selected = json_path(row, &selector).ok_or_else(miss)?;

    let value = match selected {
        JsonValue::Array(items) => FieldValue::List(items.iter().filter_map(json_scalar).collect()),
        other => match json_scalar(other) {
            Some(s) => FieldValue::Text(s),
            None => return Err(miss()),
        },
    };

    if spec.case_map.is_empty() {
        return Ok(value);
    }

    let text = value.as_text();
    spec.case_map
        .iter()
        .find(|(key, _)| key == &text)
        .or_else(|| spec.case_map.iter().find(|(key, _)| key == "*"))
        .map(|(_, v)| FieldValue::Text(template::evaluate(v, env)))
        .ok_or_else(miss)
}
