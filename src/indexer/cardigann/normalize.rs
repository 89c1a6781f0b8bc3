//! Raw rows to [`ReleaseInfo`]
//!
//! Rows without a title, or without anything to download, are dropped.
//! Everything else is parsed permissively: bad sizes become 0, bad dates
//! become "now", absurd peer counts become 0.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::extract::RawRow;
use super::filters::{coerce_number, fuzzy_time};
use crate::indexer::TrackerType;
use crate::indexer::categories::{self, cats};
use crate::indexer::types::{ReleaseInfo, TorznabCapabilities};

/// Some trackers report garbage peer counts; anything above this is noise
pub const MAX_PEER_COUNT: i64 = 5_000_000;

/// Public trackers announced in synthesized magnets
pub const PUBLIC_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.stealth.si:80/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://tracker.coppersurfer.tk:6969/announce",
    "udp://tracker.open-internet.nl:6969/announce",
    "udp://tracker.leechers-paradise.org:6969/announce",
];

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

/// What the normalizer needs to know about the site a row came from
#[derive(Debug, Clone)]
pub struct SiteContext<'a> {
    pub caps: &'a TorznabCapabilities,
    pub tracker_type: TrackerType,
    pub now: DateTime<Utc>,
}

impl<'a> SiteContext<'a> {
    pub fn new(caps: &'a TorznabCapabilities, tracker_type: TrackerType) -> Self {
        Self {
            caps,
            tracker_type,
            now: Utc::now(),
        }
    }
}

/// Parse "1.5 GiB", "700 MB", "1,234 KB" or a plain byte count. Units are
/// binary regardless of spelling.
pub fn parse_size(text: &str) -> u64 {
    static SIZE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(\d[\d.,]*)\s*(bytes?|[kmgtp]i?b|[kmgtp]o|[kmgtp]|b|o)?\b").unwrap()
    });

    let Some(caps) = SIZE.captures(text.trim()) else {
        return 0;
    };
    let amount = coerce_number(&caps[1], false);
    if amount <= 0.0 || !amount.is_finite() {
        return 0;
    }

    let exponent = caps
        .get(2)
        .and_then(|unit| unit.as_str().chars().next())
        .map(|c| match c.to_ascii_lowercase() {
            'k' => 1,
            'm' => 2,
            'g' => 3,
            't' => 4,
            'p' => 5,
            _ => 0,
        })
        .unwrap_or(0);

    (amount * 1024f64.powi(exponent)).round() as u64
}

/// Human readable size with two decimals ("1.50 GB"), "0 B" for zero
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, SIZE_UNITS[unit])
}

/// Seeders, leechers and grabs: "-", "N/A" and blanks are 0, and so is
/// anything negative or above [`MAX_PEER_COUNT`].
pub fn parse_count(text: &str) -> u32 {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("n/a") {
        return 0;
    }
    let value = coerce_number(trimmed, true) as i64;
    if !(0..=MAX_PEER_COUNT).contains(&value) {
        return 0;
    }
    value as u32
}

/// Build a magnet URI for an info hash
pub fn build_magnet(info_hash: &str, title: &str) -> String {
    let mut magnet = format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        info_hash.trim(),
        urlencoding::encode(title)
    );
    for tracker in PUBLIC_TRACKERS {
        magnet.push_str("&tr=");
        magnet.push_str(&urlencoding::encode(tracker));
    }
    magnet
}

fn is_info_hash(hash: &str) -> bool {
    let hash = hash.trim();
    (hash.len() == 40 && hash.chars().all(|c| c.is_ascii_hexdigit()))
        || (hash.len() == 32 && hash.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Map one site category (id or text) to Torznab codes via the site table.
///
/// Order: site id, a Torznab code the site already uses, description
/// substring match in either direction, Torznab category name, then a close
/// string similarity to a description.
fn map_one_category(caps: &TorznabCapabilities, value: &str) -> Vec<i32> {
    let value = value.trim();
    if value.is_empty() {
        return vec![];
    }

    let by_id = caps.map_tracker_to_torznab(value);
    if !by_id.is_empty() {
        return by_id;
    }

    if let Ok(code) = value.parse::<i32>() {
        if categories::get_category(code).is_some() {
            return vec![code];
        }
    }

    let lower = value.to_lowercase();
    let by_desc: Vec<i32> = caps
        .categories
        .iter()
        .filter(|c| {
            c.description.as_deref().is_some_and(|d| {
                let d = d.to_lowercase();
                !d.is_empty() && (d.contains(&lower) || lower.contains(&d))
            })
        })
        .map(|c| c.torznab_cat)
        .collect();
    if !by_desc.is_empty() {
        return by_desc;
    }

    if let Some(code) = categories::parse_category_name(value) {
        return vec![code];
    }

    caps.categories
        .iter()
        .filter_map(|c| {
            let d = c.description.as_deref()?.to_lowercase();
            let score = strsim::jaro_winkler(&d, &lower);
            (score >= 0.9).then_some((score, c.torznab_cat))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, code)| vec![code])
        .unwrap_or_default()
}

/// Canonical category codes for a row. Always non-empty: unknown input maps
/// to Other.
pub fn map_categories(caps: &TorznabCapabilities, ids: &[String], descriptions: &[String]) -> Vec<i32> {
    let mut mapped: Vec<i32> = ids
        .iter()
        .flat_map(|id| map_one_category(caps, id))
        .collect();
    if mapped.is_empty() {
        mapped = descriptions
            .iter()
            .flat_map(|d| map_one_category(caps, d))
            .collect();
    }

    let mut codes = Vec::new();
    for code in mapped.into_iter().flat_map(categories::canonical_codes) {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    if codes.is_empty() {
        codes.push(cats::OTHER);
    }
    codes
}

fn first_text(row: &RawRow, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| row.text(name))
}

fn imdb_id(raw: &str) -> Option<String> {
    static IMDB: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:tt)?(\d{5,9})").unwrap());
    let caps = IMDB.captures(raw)?;
    Some(format!("tt{:0>7}", &caps[1]))
}

/// Turn one raw row into a result, or `None` when the row is unusable
pub fn normalize(row: &RawRow, ctx: &SiteContext) -> Option<ReleaseInfo> {
    let title = row.text("title")?;

    let mut magnet = first_text(row, &["magnet", "magneturl", "magneturi"]);
    let mut link = first_text(row, &["download", "enclosure_url"]);
    if link.as_deref().is_some_and(|l| l.starts_with("magnet:")) {
        magnet = magnet.or(link.take());
    }

    let info_hash = first_text(row, &["infohash", "hash"]).filter(|h| is_info_hash(h));
    if magnet.is_none() && link.is_none() {
        match &info_hash {
            Some(hash) if !ctx.tracker_type.is_private() => {
                magnet = Some(build_magnet(hash, &title));
            }
            _ => {
                tracing::debug!(title = %title, "Dropping row without a download reference");
                return None;
            }
        }
    }

    let download_url = magnet.clone().or_else(|| link.clone())?;
    let details = first_text(row, &["details", "comments"]);
    let guid = details
        .clone()
        .or_else(|| first_text(row, &["guid"]))
        .unwrap_or_else(|| download_url.clone());

    let publish_date = first_text(row, &["date", "publishdate", "pubDate"])
        .and_then(|d| fuzzy_time(&d, ctx.now))
        .unwrap_or(ctx.now);

    let size = first_text(row, &["size", "enclosure_length"])
        .map(|s| parse_size(&s))
        .unwrap_or(0);

    let seeders = row.text("seeders").map(|s| parse_count(&s)).unwrap_or(0);
    let leechers = match row.text("leechers") {
        Some(l) => parse_count(&l),
        None => row
            .text("peers")
            .map(|p| parse_count(&p).saturating_sub(seeders))
            .unwrap_or(0),
    };

    let category_ids = row.get("category").map(|v| v.items()).unwrap_or_default();
    let category_descs = row.get("categorydesc").map(|v| v.items()).unwrap_or_default();

    let description = row.text("description");
    let internal = description
        .as_deref()
        .is_some_and(|d| d.to_lowercase().starts_with("internal"));

    let volume_factor = |name: &str| row.text(name).map(|v| coerce_number(&v, false)).unwrap_or(1.0);

    let mut release = ReleaseInfo::new(title, guid, publish_date);
    release.link = link;
    release.magnet_uri = magnet;
    release.info_hash = info_hash;
    release.details = details;
    release.download_url = download_url;
    release.age_days = (ctx.now - publish_date).num_days().max(0);
    release.categories = map_categories(ctx.caps, &category_ids, &category_descs);
    release.size = size;
    release.size_formatted = format_size(size);
    release.seeders = seeders;
    release.leechers = leechers;
    release.grabs = row.text("grabs").map(|g| parse_count(&g)).unwrap_or(0);
    release.description = description;
    release.imdb = first_text(row, &["imdb", "imdbid"]).and_then(|i| imdb_id(&i));
    release.internal = internal;
    release.download_volume_factor = volume_factor("downloadvolumefactor");
    release.upload_volume_factor = volume_factor("uploadvolumefactor");

    Some(release)
}
