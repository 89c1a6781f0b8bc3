//! Value filters applied to extracted fields
//!
//! Filter chains are compiled once when an indexer is built. Unknown names
//! and filters whose arguments do not make sense (a regex that does not
//! compile) become [`Filter::Identity`], so a single bad filter never costs a
//! field.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::definition::FilterDef;

/// A raw value flowing through extraction and filters
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Text form; lists are comma joined, null is empty
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(","),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Items of a list, or the single text value
    pub fn items(&self) -> Vec<String> {
        match self {
            FieldValue::Null => vec![],
            FieldValue::Text(s) => vec![s.clone()],
            FieldValue::List(items) => items.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Filter {
    Append(String),
    Prepend(String),
    Replace { from: String, to: String },
    ReReplace { pattern: Regex, replacement: String },
    Trim(Option<String>),
    Split { separator: String, index: Option<i64> },
    Join(String),
    ToLower,
    ToUpper,
    UrlEncode,
    UrlDecode,
    HtmlEncode,
    HtmlDecode,
    Diacritics,
    Validate(Vec<String>),
    Regexp { pattern: Regex, group: Option<usize> },
    QueryString(String),
    DateParse(Option<String>),
    TimeAgo,
    FuzzyTime,
    Float,
    Int,
    StrDump(Option<String>),
    /// Row level keyword match, handled during row collection
    AndMatch,
    Identity(String),
}

impl Filter {
    pub fn compile(def: &FilterDef) -> Filter {
        let args = def.args();
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        let name = def.name.trim().to_lowercase();

        match name.as_str() {
            "append" => Filter::Append(arg(0)),
            "prepend" => Filter::Prepend(arg(0)),
            "replace" => Filter::Replace {
                from: arg(0),
                to: arg(1),
            },
            "re_replace" => match compile_regex(&arg(0)) {
                Ok(pattern) => Filter::ReReplace {
                    pattern,
                    replacement: go_replacement(&arg(1)),
                },
                Err(e) => Filter::broken(&name, e),
            },
            "trim" => Filter::Trim(args.first().cloned().filter(|s| !s.is_empty())),
            "split" => Filter::Split {
                separator: arg(0),
                index: args.get(1).and_then(|i| i.trim().parse().ok()),
            },
            "join" => Filter::Join(arg(0)),
            "tolower" | "lowercase" => Filter::ToLower,
            "toupper" | "uppercase" => Filter::ToUpper,
            "urlencode" => Filter::UrlEncode,
            "urldecode" => Filter::UrlDecode,
            "htmlencode" => Filter::HtmlEncode,
            "htmldecode" => Filter::HtmlDecode,
            "diacritics" => Filter::Diacritics,
            "validate" => Filter::Validate(
                args.iter()
                    .flat_map(|a| a.split(','))
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            "regexp" => match compile_regex(&arg(0)) {
                Ok(pattern) => Filter::Regexp {
                    pattern,
                    group: args.get(1).and_then(|g| g.trim().parse().ok()),
                },
                Err(e) => Filter::broken(&name, e),
            },
            "querystring" => Filter::QueryString(arg(0)),
            "dateparse" | "timeparse" => Filter::DateParse(args.first().cloned().filter(|s| !s.is_empty())),
            "timeago" | "reltime" => Filter::TimeAgo,
            "fuzzytime" => Filter::FuzzyTime,
            "float" => Filter::Float,
            "int" | "parseint" => Filter::Int,
            "strdump" => Filter::StrDump(args.first().cloned()),
            "andmatch" => Filter::AndMatch,
            _ => {
                tracing::debug!(filter = %def.name, "Unknown filter, treating as identity");
                Filter::Identity(def.name.clone())
            }
        }
    }

    fn broken(name: &str, error: regex::Error) -> Filter {
        tracing::warn!(filter = %name, error = %error, "Filter regex does not compile, treating as identity");
        Filter::Identity(name.to_string())
    }

    pub fn apply(&self, value: FieldValue) -> FieldValue {
        if value == FieldValue::Null {
            return value;
        }

        match self {
            Filter::Split { separator, index } => {
                let text = value.as_text();
                let parts: Vec<String> = text.split(separator.as_str()).map(|s| s.to_string()).collect();
                match index {
                    None => FieldValue::List(parts),
                    Some(i) => {
                        let idx = if *i < 0 { parts.len() as i64 + i } else { *i };
                        let part = usize::try_from(idx).ok().and_then(|i| parts.get(i).cloned());
                        FieldValue::Text(part.unwrap_or_default())
                    }
                }
            }
            Filter::Join(separator) => match value {
                FieldValue::List(items) => FieldValue::Text(items.join(separator)),
                other => other,
            },
            Filter::AndMatch | Filter::Identity(_) => value,
            Filter::StrDump(label) => {
                tracing::debug!(label = label.as_deref().unwrap_or(""), value = %value.as_text(), "strdump");
                value
            }
            _ => FieldValue::Text(self.apply_text(&value.as_text())),
        }
    }

    fn apply_text(&self, text: &str) -> String {
        match self {
            Filter::Append(suffix) => format!("{}{}", text, suffix),
            Filter::Prepend(prefix) => format!("{}{}", prefix, text),
            Filter::Replace { from, to } => {
                if from.is_empty() {
                    text.to_string()
                } else {
                    text.replace(from.as_str(), to)
                }
            }
            Filter::ReReplace {
                pattern,
                replacement,
            } => pattern.replace_all(text, replacement.as_str()).into_owned(),
            Filter::Trim(None) => text.trim().to_string(),
            Filter::Trim(Some(cutset)) => text.trim_matches(|c| cutset.contains(c)).to_string(),
            Filter::ToLower => text.to_lowercase(),
            Filter::ToUpper => text.to_uppercase(),
            Filter::UrlEncode => urlencoding::encode(text).into_owned(),
            Filter::UrlDecode => {
                let plus_decoded = text.replace('+', " ");
                match urlencoding::decode(&plus_decoded) {
                    Ok(decoded) => decoded.into_owned(),
                    Err(e) => {
                        tracing::debug!(error = %e, "urldecode failed, leaving value as is");
                        text.to_string()
                    }
                }
            }
            Filter::HtmlEncode => html_encode(text),
            Filter::HtmlDecode => html_decode(text),
            Filter::Diacritics => strip_diacritics(text),
            Filter::Validate(allowed) => validate_tokens(text, allowed),
            Filter::Regexp { pattern, group } => regexp_capture(pattern, *group, text),
            Filter::QueryString(param) => query_param(text, param).unwrap_or_default(),
            Filter::DateParse(layout) => parse_date(text, layout.as_deref())
                .map(to_iso)
                .unwrap_or_default(),
            Filter::TimeAgo | Filter::FuzzyTime => fuzzy_time(text, Utc::now())
                .map(to_iso)
                .unwrap_or_default(),
            Filter::Float => format_number(coerce_number(text, false)),
            Filter::Int => format_number(coerce_number(text, true).trunc()),
            Filter::Split { .. }
            | Filter::Join(_)
            | Filter::StrDump(_)
            | Filter::AndMatch
            | Filter::Identity(_) => text.to_string(),
        }
    }
}

/// An ordered list of compiled filters
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn compile(defs: &[FilterDef]) -> Self {
        Self {
            filters: defs.iter().map(Filter::compile).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn has_andmatch(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, Filter::AndMatch))
    }

    /// Run the chain left to right
    pub fn apply(&self, value: FieldValue) -> FieldValue {
        self.filters.iter().fold(value, |acc, filter| filter.apply(acc))
    }

    pub fn apply_text(&self, text: &str) -> String {
        self.apply(FieldValue::text(text)).as_text()
    }
}

/// Compile a definition regex. Leading `(?i)`/`(?m)` groups are native to
/// the regex crate, so they pass straight through.
fn compile_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}

/// `$1abc` means group 1 followed by "abc" in definitions, not a group named `1abc`
fn go_replacement(replacement: &str) -> String {
    static GROUP_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());
    GROUP_REF.replace_all(replacement, "$${$1}").into_owned()
}

fn regexp_capture(pattern: &Regex, group: Option<usize>, text: &str) -> String {
    let Some(caps) = pattern.captures(text) else {
        return String::new();
    };
    let group = group.unwrap_or(if caps.len() > 1 { 1 } else { 0 });
    caps.get(group)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn query_param(text: &str, param: &str) -> Option<String> {
    static BASE: Lazy<url::Url> = Lazy::new(|| url::Url::parse("http://localhost/").unwrap());
    let url = BASE.join(text.trim()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.into_owned())
}

fn validate_tokens(text: &str, allowed: &[String]) -> String {
    static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").unwrap());
    SEPARATORS
        .split(text)
        .filter(|token| !token.is_empty() && allowed.contains(&token.to_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

fn html_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Decode named and numeric character references; unknown ones stay as written
pub fn html_decode(text: &str) -> String {
    static ENTITY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z][a-zA-Z0-9]*);").unwrap());

    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else {
                named_entity(entity).map(String::from)
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<&'static str> {
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "hellip" => "\u{2026}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        _ => return None,
    };
    Some(decoded)
}

/// Fold accented Latin letters to their ASCII base and drop combining marks
pub fn strip_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ('\u{300}'..='\u{36f}').contains(&c) {
            continue;
        }
        let folded = match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
            'ç' | 'ć' | 'č' | 'ĉ' | 'ċ' => "c",
            'Ç' | 'Ć' | 'Č' | 'Ĉ' | 'Ċ' => "C",
            'ď' | 'đ' => "d",
            'Ď' | 'Đ' => "D",
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
            'ğ' | 'ģ' => "g",
            'Ğ' | 'Ģ' => "G",
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => "I",
            'ł' | 'ľ' | 'ĺ' => "l",
            'Ł' | 'Ľ' | 'Ĺ' => "L",
            'ñ' | 'ń' | 'ň' => "n",
            'Ñ' | 'Ń' | 'Ň' => "N",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
            'ř' | 'ŕ' => "r",
            'Ř' | 'Ŕ' => "R",
            'ś' | 'š' | 'ş' | 'ș' => "s",
            'Ś' | 'Š' | 'Ş' | 'Ș' => "S",
            'ť' | 'ţ' | 'ț' => "t",
            'Ť' | 'Ţ' | 'Ț' => "T",
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => "U",
            'ý' | 'ÿ' => "y",
            'Ý' | 'Ÿ' => "Y",
            'ź' | 'ż' | 'ž' => "z",
            'Ź' | 'Ż' | 'Ž' => "Z",
            'æ' => "ae",
            'Æ' => "AE",
            'œ' => "oe",
            'Œ' => "OE",
            'ß' => "ss",
            _ => {
                out.push(c);
                continue;
            }
        };
        out.push_str(folded);
    }
    out
}

/// Pull the first number out of noisy text. Thousands separators are
/// recognised by position: a separator followed by exactly three digits is
/// grouping unless it is the only dot in a float.
pub fn coerce_number(text: &str, integer: bool) -> f64 {
    static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d[\d.,]*").unwrap());

    let Some(m) = NUMBER.find(text) else {
        return 0.0;
    };
    let raw = m.as_str().trim_end_matches(['.', ',']);
    let negative = raw.starts_with('-');
    let digits = raw.trim_start_matches('-');

    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');
    let grouped_after = |pos: usize| digits.len() - pos - 1 == 3;

    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => digits.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => digits.replace(',', ""),
        (None, Some(comma)) => {
            if digits.matches(',').count() > 1 || grouped_after(comma) {
                digits.replace(',', "")
            } else {
                digits.replace(',', ".")
            }
        }
        (Some(dot), None) => {
            if digits.matches('.').count() > 1 || (integer && grouped_after(dot)) {
                digits.replace('.', "")
            } else {
                digits.to_string()
            }
        }
        (None, None) => digits.to_string(),
    };

    let value = normalized.parse::<f64>().unwrap_or(0.0);
    if negative { -value } else { value }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Normalized absolute timestamp used for every date filter output
pub fn to_iso(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Translate a Go reference-time layout ("2006-01-02 15:04") to strftime
pub fn go_layout_to_strftime(layout: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("January", "%B"),
        ("Monday", "%A"),
        ("Z07:00", "%:z"),
        ("-07:00", "%:z"),
        ("-0700", "%z"),
        ("2006", "%Y"),
        (".000", "%.3f"),
        ("Jan", "%b"),
        ("Mon", "%a"),
        ("MST", "%Z"),
        ("PM", "%p"),
        ("pm", "%P"),
        ("01", "%m"),
        ("02", "%d"),
        ("_2", "%e"),
        ("03", "%I"),
        ("04", "%M"),
        ("05", "%S"),
        ("06", "%y"),
        ("15", "%H"),
        ("1", "%m"),
        ("2", "%d"),
        ("3", "%I"),
        ("4", "%M"),
        ("5", "%S"),
    ];

    let mut out = String::with_capacity(layout.len() + 8);
    let mut rest = layout;
    'outer: while !rest.is_empty() {
        for (go, strf) in TOKENS {
            if let Some(after) = rest.strip_prefix(go) {
                out.push_str(strf);
                rest = after;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

fn parse_with_format(text: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(text, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, format) {
        return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}

/// Absolute date parsing: explicit Go layout first, then common formats,
/// then unix timestamps.
pub fn parse_date(text: &str, layout: Option<&str>) -> Option<DateTime<Utc>> {
    static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)(st|nd|rd|th)\b").unwrap());

    let text = ORDINAL.replace_all(text.trim(), "$1");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(layout) = layout {
        if let Some(dt) = parse_with_format(text, &go_layout_to_strftime(layout)) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    if text.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = text.parse().ok()?;
        return match text.len() {
            9 | 10 => Utc.timestamp_opt(n, 0).single(),
            13 => Utc.timestamp_millis_opt(n).single(),
            _ => None,
        };
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
        "%d-%m-%Y %H:%M",
        "%b %d %Y %H:%M",
        "%b %d, %Y %H:%M",
        "%d %b %Y %H:%M",
        "%d %b %Y %H:%M:%S",
        "%a, %d %b %Y %H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%d.%m.%Y",
        "%d-%m-%Y",
        "%b %d %Y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%B %d %Y",
        "%d %b %Y",
        "%d %B %Y",
        "%d-%b-%Y",
        "%d %b. %Y",
    ];

    FORMATS.iter().find_map(|f| parse_with_format(text, f))
}

fn start_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or(date)
}

fn at_time(day: DateTime<Utc>, clock: &str) -> Option<DateTime<Utc>> {
    static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2}):(\d{2})(?::(\d{2}))?").unwrap());
    let Some(caps) = CLOCK.captures(clock) else {
        return Some(day);
    };
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok()).unwrap_or(0);
    let offset = part(1) * 3600 + part(2) * 60 + part(3);
    day.checked_add_signed(Duration::try_seconds(offset)?)
}

fn subtract_unit(now: DateTime<Utc>, amount: f64, unit: &str) -> Option<DateTime<Utc>> {
    let unit = unit.to_lowercase();
    // Ages beyond the representable range yield None
    let seconds = |factor: f64| {
        let millis = amount * factor * 1000.0;
        if !millis.is_finite() || millis >= i64::MAX as f64 {
            return None;
        }
        now.checked_sub_signed(Duration::try_milliseconds(millis as i64)?)
    };

    if unit.starts_with("mo") {
        now.checked_sub_months(Months::new(amount as u32))
    } else if unit.starts_with('y') {
        now.checked_sub_months(Months::new((amount * 12.0) as u32))
    } else if unit.starts_with('s') {
        seconds(1.0)
    } else if unit.starts_with('m') {
        seconds(60.0)
    } else if unit.starts_with('h') {
        seconds(3600.0)
    } else if unit.starts_with('d') {
        seconds(86_400.0)
    } else if unit.starts_with('w') {
        seconds(604_800.0)
    } else {
        None
    }
}

/// Relative phrases: "5 minutes ago", "1 day, 3 hours ago", "3h", "today",
/// "yesterday 14:20", "just now", "2 year+".
pub fn parse_time_ago(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    static AT_LEAST: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(\d+)\s*(year|month|week|day)s?\s*\+$").unwrap());
    static UNIT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(\d+(?:\.\d+)?|an?|one)\s*(years?|yrs?|y|months?|mons?|mo|weeks?|wks?|w|days?|d|hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)\b",
        )
        .unwrap()
    });
    static FILLER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(ago|and)\b|[,\s]").unwrap());

    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if lower == "now" || lower == "just now" || lower == "right now" {
        return Some(now);
    }
    if let Some(rest) = lower.strip_prefix("today") {
        return at_time(start_of_day(now), rest);
    }
    if let Some(rest) = lower.strip_prefix("yesterday") {
        return at_time(start_of_day(now).checked_sub_signed(Duration::days(1))?, rest);
    }

    if let Some(caps) = AT_LEAST.captures(&lower) {
        let amount: f64 = caps[1].parse().ok()?;
        return subtract_unit(now, amount, &caps[2]);
    }

    let mut result = now;
    let mut matched = false;
    for caps in UNIT.captures_iter(&lower) {
        let amount = match &caps[1] {
            "a" | "an" | "one" => 1.0,
            n => n.parse().ok()?,
        };
        result = subtract_unit(result, amount, &caps[2])?;
        matched = true;
    }
    if !matched {
        return None;
    }

    let residue = UNIT.replace_all(&lower, "");
    if !FILLER.replace_all(&residue, "").is_empty() {
        return None;
    }

    Some(result)
}

/// Relative phrasing first, then any absolute format
pub fn fuzzy_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse_time_ago(text, now).or_else(|| parse_date(text, None))
}

/// Year of a timestamp, for the `.Today.Year` template variable
pub fn year_of(date: DateTime<Utc>) -> i32 {
    date.year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn filter(name: &str, args: &[&str]) -> FilterDef {
        let args = match args {
            [] => None,
            [one] => Some(Value::String(one.to_string())),
            many => Some(Value::Sequence(
                many.iter().map(|a| Value::String(a.to_string())).collect(),
            )),
        };
        FilterDef::new(name, args)
    }

    fn run(defs: &[FilterDef], input: &str) -> String {
        FilterChain::compile(defs).apply_text(input)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_filter_is_identity() {
        assert_eq!(run(&[filter("bogus", &[])], "value"), "value");
        assert_eq!(run(&[filter("re_replace", &["(unclosed", "x"])], "value"), "value");
    }

    #[test]
    fn test_chain_is_left_to_right() {
        let defs = [
            filter("append", &["-x"]),
            filter("toupper", &[]),
            filter("prepend", &["a:"]),
        ];
        assert_eq!(run(&defs, "v"), "a:V-X");
    }

    #[test]
    fn test_replace_is_literal() {
        assert_eq!(run(&[filter("replace", &[".", " "])], "a.b.c"), "a b c");
    }

    #[test]
    fn test_re_replace() {
        assert_eq!(
            run(&[filter("re_replace", &["(?i)\\bWEB-?DL\\b", "WEB"])], "Show web-dl"),
            "Show WEB"
        );
        assert_eq!(
            run(&[filter("re_replace", &["(\\d+)x(\\d+)", "S$1E$2"])], "Show 1x02"),
            "Show S1E2"
        );
    }

    #[test]
    fn test_split_and_join() {
        assert_eq!(run(&[filter("split", &["/", "1"])], "a/b/c"), "b");
        assert_eq!(run(&[filter("split", &["/", "-1"])], "a/b/c"), "c");
        assert_eq!(run(&[filter("split", &["/", "9"])], "a/b/c"), "");
        let chain = FilterChain::compile(&[filter("split", &["/"]), filter("join", &[" | "])]);
        assert_eq!(chain.apply_text("a/b"), "a | b");
    }

    #[test]
    fn test_trim() {
        assert_eq!(run(&[filter("trim", &[])], "  x  "), "x");
        assert_eq!(run(&[filter("trim", &["[]"])], "[x]"), "x");
    }

    #[test]
    fn test_regexp_groups() {
        assert_eq!(run(&[filter("regexp", &["id=(\\d+)"])], "?id=42&x=1"), "42");
        assert_eq!(run(&[filter("regexp", &["\\d+"])], "abc 123"), "123");
        assert_eq!(run(&[filter("regexp", &["zzz(\\d)"])], "abc"), "");
    }

    #[test]
    fn test_querystring() {
        assert_eq!(run(&[filter("querystring", &["id"])], "details.php?id=77&hit=1"), "77");
        assert_eq!(run(&[filter("querystring", &["nope"])], "details.php?id=77"), "");
    }

    #[test]
    fn test_url_and_html_coding() {
        assert_eq!(run(&[filter("urlencode", &[])], "a b&c"), "a%20b%26c");
        assert_eq!(run(&[filter("urldecode", &[])], "a+b%26c"), "a b&c");
        assert_eq!(run(&[filter("htmlencode", &[])], "<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
        assert_eq!(
            run(&[filter("htmldecode", &[])], "Tom &amp; Jerry&nbsp;&#39;x&#x27; & co &bogus;"),
            "Tom & Jerry 'x' & co &bogus;"
        );
    }

    #[test]
    fn test_diacritics() {
        assert_eq!(run(&[filter("diacritics", &["replace"])], "Amélie à Noël"), "Amelie a Noel");
        assert_eq!(strip_diacritics("e\u{301}"), "e");
    }

    #[test]
    fn test_validate_allow_list() {
        assert_eq!(run(&[filter("validate", &["1080p, 720p, 2160p"])], "720p x264"), "720p");
        assert_eq!(run(&[filter("validate", &["a,b"])], "c d"), "");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(run(&[filter("float", &[])], "1,234.5 MB"), "1234.5");
        assert_eq!(run(&[filter("float", &[])], "1.234,5"), "1234.5");
        assert_eq!(run(&[filter("float", &[])], "12,5"), "12.5");
        assert_eq!(run(&[filter("float", &[])], "n/a"), "0");
        assert_eq!(run(&[filter("int", &[])], "1,234 seeders"), "1234");
        assert_eq!(run(&[filter("int", &[])], "1.234"), "1234");
        assert_eq!(run(&[filter("int", &[])], "12.5"), "12");
        assert_eq!(run(&[filter("int", &[])], "-"), "0");
    }

    #[test]
    fn test_go_layout_translation() {
        assert_eq!(go_layout_to_strftime("2006-01-02 15:04:05"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(go_layout_to_strftime("Jan 2, 2006"), "%b %d, %Y");
        assert_eq!(go_layout_to_strftime("02/01/2006 -0700"), "%d/%m/%Y %z");
    }

    #[test]
    fn test_dateparse_with_layout() {
        let dt = parse_date("15/03/2024 10:30", Some("02/01/2006 15:04")).unwrap();
        assert_eq!(to_iso(dt), "2024-03-15T10:30:00Z");
        assert_eq!(
            run(&[filter("dateparse", &["2006-01-02"])], "2023-12-01"),
            "2023-12-01T00:00:00Z"
        );
    }

    #[test]
    fn test_dateparse_common_formats() {
        assert_eq!(to_iso(parse_date("2024-01-05 08:00:00", None).unwrap()), "2024-01-05T08:00:00Z");
        assert_eq!(to_iso(parse_date("Mar 3rd, 2024", None).unwrap()), "2024-03-03T00:00:00Z");
        assert_eq!(
            to_iso(parse_date("Tue, 05 Mar 2024 10:00:00 +0000", None).unwrap()),
            "2024-03-05T10:00:00Z"
        );
        assert_eq!(to_iso(parse_date("1700000000", None).unwrap()), "2023-11-14T22:13:20Z");
        assert!(parse_date("not a date", None).is_none());
    }

    #[test]
    fn test_timeago_units() {
        let now = now();
        let cases = [
            ("30 seconds ago", Duration::seconds(30)),
            ("5 mins ago", Duration::minutes(5)),
            ("2 hours ago", Duration::hours(2)),
            ("3h ago", Duration::hours(3)),
            ("4 days ago", Duration::days(4)),
            ("1 week ago", Duration::weeks(1)),
            ("an hour ago", Duration::hours(1)),
            ("1 day, 3 hours ago", Duration::days(1) + Duration::hours(3)),
        ];
        for (phrase, offset) in cases {
            let parsed = parse_time_ago(phrase, now).unwrap_or_else(|| panic!("{phrase}"));
            assert_eq!(now - parsed, offset, "{phrase}");
        }

        let months = parse_time_ago("2 months ago", now).unwrap();
        assert_eq!(to_iso(months), "2024-01-15T12:00:00Z");
        let years = parse_time_ago("1 year ago", now).unwrap();
        assert_eq!(to_iso(years), "2023-03-15T12:00:00Z");
    }

    #[test]
    fn test_timeago_phrases() {
        let now = now();
        assert_eq!(parse_time_ago("just now", now), Some(now));
        assert_eq!(to_iso(parse_time_ago("Today", now).unwrap()), "2024-03-15T00:00:00Z");
        assert_eq!(to_iso(parse_time_ago("yesterday", now).unwrap()), "2024-03-14T00:00:00Z");
        assert_eq!(to_iso(parse_time_ago("yesterday 14:20", now).unwrap()), "2024-03-14T14:20:00Z");
        assert_eq!(to_iso(parse_time_ago("2 year+", now).unwrap()), "2022-03-15T12:00:00Z");
        assert_eq!(to_iso(parse_time_ago("3 month+", now).unwrap()), "2023-12-15T12:00:00Z");
        assert!(parse_time_ago("known issue", now).is_none());
        assert!(parse_time_ago("2024-01-01", now).is_none());
    }

    #[test]
    fn test_fuzzytime_fallback_chain() {
        let now = now();
        assert_eq!(fuzzy_time("5 days ago", now), Some(now - Duration::days(5)));
        assert_eq!(to_iso(fuzzy_time("2024-01-01", now).unwrap()), "2024-01-01T00:00:00Z");
        assert_eq!(fuzzy_time("garbage", now), None);
        assert_eq!(run(&[filter("fuzzytime", &[])], "garbage"), "");
    }

    #[test]
    fn test_timeago_out_of_range_ages() {
        let now = now();
        assert_eq!(parse_time_ago("99999999999 days ago", now), None);
        assert_eq!(parse_time_ago("9999999999999999999999 weeks ago", now), None);
        assert_eq!(parse_time_ago("300000 years ago", now), None);
        assert_eq!(fuzzy_time("99999999999 days ago", now), None);
        assert_eq!(run(&[filter("timeago", &[])], "99999999999 days ago"), "");
        assert_eq!(run(&[filter("fuzzytime", &[])], "99999999999 hours ago"), "");
    }

    #[test]
    fn test_null_passes_through() {
        let chain = FilterChain::compile(&[filter("append", &["x"])]);
        assert_eq!(chain.apply(FieldValue::Null), FieldValue::Null);
    }
}
