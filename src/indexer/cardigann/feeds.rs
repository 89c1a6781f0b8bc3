//! Feed and bespoke API responses turned into extractable rows
//!
//! RSS items and the JSON of a few well known APIs are flattened into plain
//! JSON objects, one per release, so the definition's fields can read them
//! exactly like a JSON search response.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value as JsonValue, json};

use super::extract::RawRow;
use crate::indexer::error::SearchError;

/// Parse an RSS 2.0 document (with torznab, newznab and ezrss extensions)
/// into one object per `<item>`.
///
/// Keys: `title`, `link`, `guid`, `comments`, `pubDate`, `description`,
/// `category` (list), `enclosure_url`, `enclosure_length`, `enclosure_type`,
/// every `torznab:attr`/`newznab:attr` by name, and the `torrent:*` fields as
/// `size`, `infohash`, `magneturl`, `seeders`, `peers`, `filename`.
pub fn parse_rss(xml: &str) -> Result<Vec<JsonValue>, SearchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<Map<String, JsonValue>> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag_name == "item" {
                    current = Some(Map::new());
                } else if let Some(item) = current.as_mut() {
                    read_attributes(item, &tag_name, e);
                }
                current_tag = tag_name;
            }
            Ok(Event::Empty(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some(item) = current.as_mut() {
                    read_attributes(item, &tag_name, e);
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(item) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default().to_string();
                    set_text(item, &current_tag, text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(item) = current.as_mut() {
                    let text = String::from_utf8_lossy(e).trim().to_string();
                    set_text(item, &current_tag, text);
                }
            }
            Ok(Event::End(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag_name == "item" {
                    if let Some(item) = current.take() {
                        items.push(JsonValue::Object(item));
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Error parsing RSS feed");
                return Err(SearchError::Malformed {
                    kind: "rss",
                    reason: e.to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(items)
}

fn read_attributes(item: &mut Map<String, JsonValue>, tag_name: &str, e: &BytesStart) {
    let attributes: Vec<(String, String)> = e
        .attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                String::from_utf8_lossy(&attr.value).to_string(),
            )
        })
        .collect();
    let attr = |name: &str| {
        attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    match tag_name {
        "torznab:attr" | "newznab:attr" => {
            if let (Some(name), Some(value)) = (attr("name"), attr("value")) {
                let key = name.to_lowercase();
                if key == "category" {
                    push_category(item, value);
                } else {
                    item.insert(key, JsonValue::String(value));
                }
            }
        }
        "enclosure" => {
            for (key, value) in attributes.iter() {
                if matches!(key.as_str(), "url" | "length" | "type") {
                    item.insert(format!("enclosure_{}", key), JsonValue::String(value.clone()));
                }
            }
        }
        _ => {}
    }
}

fn push_category(item: &mut Map<String, JsonValue>, value: String) {
    match item.get_mut("category") {
        Some(JsonValue::Array(list)) => list.push(JsonValue::String(value)),
        _ => {
            item.insert("category".to_string(), json!([value]));
        }
    }
}

fn set_text(item: &mut Map<String, JsonValue>, tag: &str, text: String) {
    if text.is_empty() {
        return;
    }

    let key = match tag {
        "category" => {
            push_category(item, text);
            return;
        }
        "title" | "link" | "guid" | "comments" | "pubDate" | "description" | "size" => tag,
        "torrent:contentLength" | "contentLength" => "size",
        "torrent:infoHash" | "infoHash" => "infohash",
        "torrent:magnetURI" | "magnetURI" => "magneturl",
        "torrent:seeds" | "seeds" => "seeders",
        "torrent:peers" | "peers" => "peers",
        "torrent:fileName" | "fileName" => "filename",
        _ => return,
    };

    // The first `link`/`guid` wins, an Atom link later in the item does not replace it
    if matches!(key, "link" | "guid") && item.contains_key(key) {
        return;
    }
    item.insert(key.to_string(), JsonValue::String(text));
}

fn string_of(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// YTS `list_movies.json`: one row per (movie, torrent) pair. A response
/// without movies is an empty result.
pub fn reshape_yts(document: &JsonValue) -> Result<Vec<JsonValue>, SearchError> {
    if !document.is_object() {
        return Err(SearchError::Malformed {
            kind: "yts",
            reason: "expected a JSON object".to_string(),
        });
    }

    let Some(movies) = document.pointer("/data/movies").and_then(|m| m.as_array()) else {
        return Ok(vec![]);
    };

    let mut rows = Vec::new();
    for movie in movies {
        let Some(torrents) = movie.get("torrents").and_then(|t| t.as_array()) else {
            continue;
        };
        let name = string_of(movie.get("title_long"))
            .or_else(|| string_of(movie.get("title_english")))
            .or_else(|| string_of(movie.get("title")))
            .unwrap_or_default();

        for torrent in torrents {
            let quality = string_of(torrent.get("quality")).unwrap_or_default();
            let title = if quality.is_empty() {
                name.clone()
            } else {
                format!("{} [{}]", name, quality)
            };
            let date = string_of(torrent.get("date_uploaded_unix"))
                .or_else(|| string_of(torrent.get("date_uploaded")))
                .or_else(|| string_of(movie.get("date_uploaded")));

            rows.push(json!({
                "title": title,
                "infohash": string_of(torrent.get("hash")),
                "download": string_of(torrent.get("url")),
                "details": string_of(movie.get("url")),
                "size": string_of(torrent.get("size_bytes")).or_else(|| string_of(torrent.get("size"))),
                "seeders": string_of(torrent.get("seeds")),
                "peers": string_of(torrent.get("peers")),
                "date": date,
                "imdb": string_of(movie.get("imdb_code")),
                "year": string_of(movie.get("year")),
                "quality": quality,
                "codec": string_of(torrent.get("video_codec")),
            }));
        }
    }
    Ok(rows)
}

/// EZTV `get-torrents`: the `torrents` array, absent when nothing matched
pub fn reshape_eztv(document: &JsonValue) -> Result<Vec<JsonValue>, SearchError> {
    if !document.is_object() {
        return Err(SearchError::Malformed {
            kind: "eztv",
            reason: "expected a JSON object".to_string(),
        });
    }

    let Some(torrents) = document.get("torrents").and_then(|t| t.as_array()) else {
        return Ok(vec![]);
    };

    Ok(torrents
        .iter()
        .map(|t| {
            json!({
                "title": string_of(t.get("title")).or_else(|| string_of(t.get("filename"))),
                "infohash": string_of(t.get("hash")).or_else(|| string_of(t.get("info_hash"))),
                "magneturl": string_of(t.get("magnet_url")),
                "download": string_of(t.get("torrent_url")),
                "details": string_of(t.get("episode_url")),
                "size": string_of(t.get("size_bytes")).or_else(|| string_of(t.get("size"))),
                "seeders": string_of(t.get("seeds")).or_else(|| string_of(t.get("seeders"))),
                "peers": string_of(t.get("peers")),
                "date": string_of(t.get("date_released_unix")),
                "imdb": string_of(t.get("imdb_id")),
                "season": string_of(t.get("season")),
                "episode": string_of(t.get("episode")),
            })
        })
        .collect())
}

/// apibay.org `q.php`: a bare array where a single `id: "0"` entry means
/// no results.
pub fn reshape_apibay(document: &JsonValue) -> Result<Vec<JsonValue>, SearchError> {
    let Some(entries) = document.as_array() else {
        return Err(SearchError::Malformed {
            kind: "apibay",
            reason: "expected a JSON array".to_string(),
        });
    };

    Ok(entries
        .iter()
        .filter(|e| string_of(e.get("id")).is_some_and(|id| id != "0"))
        .filter(|e| string_of(e.get("name")).is_some())
        .map(|e| {
            json!({
                "id": string_of(e.get("id")),
                "title": string_of(e.get("name")),
                "infohash": string_of(e.get("info_hash")),
                "size": string_of(e.get("size")),
                "seeders": string_of(e.get("seeders")),
                "leechers": string_of(e.get("leechers")),
                "grabs": string_of(e.get("num_files")),
                "date": string_of(e.get("added")),
                "category": string_of(e.get("category")),
                "imdb": string_of(e.get("imdb")),
                "status": string_of(e.get("status")),
                "username": string_of(e.get("username")),
            })
        })
        .collect())
}

/// Feeds ignore the query server side; keep rows whose title contains it.
/// An empty query and the connection test query `test` keep everything.
pub fn filter_by_title(rows: Vec<RawRow>, query: &str) -> Vec<RawRow> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || needle == "test" {
        return rows;
    }

    let before = rows.len();
    let kept: Vec<RawRow> = rows
        .into_iter()
        .filter(|row| {
            row.text("title")
                .is_some_and(|t| t.to_lowercase().contains(&needle))
        })
        .collect();
    tracing::debug!(before, after = kept.len(), query = %query, "Filtered feed rows by title");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::cardigann::filters::FieldValue;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torrent="http://xmlns.ezrss.it/0.1/" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <title>Example feed</title>
    <item>
      <title>Show S01E01 720p</title>
      <link>https://feed.example/ep/1</link>
      <pubDate>Tue, 05 Mar 2024 10:00:00 +0000</pubDate>
      <category>TV</category>
      <enclosure url="https://feed.example/dl/1.torrent" length="1048576" type="application/x-bittorrent"/>
      <torrent:infoHash>ABCDEF0123456789ABCDEF0123456789ABCDEF01</torrent:infoHash>
      <torrent:seeds>12</torrent:seeds>
      <torrent:peers>20</torrent:peers>
    </item>
    <item>
      <title><![CDATA[Other & Show]]></title>
      <torznab:attr name="seeders" value="3"/>
      <torznab:attr name="category" value="5040"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_items() {
        let items = parse_rss(FEED).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first["title"], "Show S01E01 720p");
        assert_eq!(first["enclosure_url"], "https://feed.example/dl/1.torrent");
        assert_eq!(first["enclosure_length"], "1048576");
        assert_eq!(first["infohash"], "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
        assert_eq!(first["seeders"], "12");
        assert_eq!(first["peers"], "20");
        assert_eq!(first["category"], json!(["TV"]));

        let second = &items[1];
        assert_eq!(second["title"], "Other & Show");
        assert_eq!(second["seeders"], "3");
        assert_eq!(second["category"], json!(["5040"]));
    }

    #[test]
    fn test_parse_rss_malformed() {
        let result = parse_rss("<rss><channel><item><title>x</wrong></item>");
        assert!(matches!(result, Err(SearchError::Malformed { kind: "rss", .. })));
    }

    #[test]
    fn test_reshape_yts_flattens_torrents() {
        let doc = json!({"status": "ok", "data": {"movies": [{
            "title_long": "Movie (2020)", "url": "https://yts.example/m/1", "imdb_code": "tt123",
            "torrents": [
                {"quality": "720p", "hash": "AAA", "size_bytes": 100, "seeds": 5, "peers": 7, "date_uploaded_unix": 1700000000},
                {"quality": "1080p", "hash": "BBB", "size_bytes": 200, "seeds": 9, "peers": 9}
            ]
        }]}});
        let rows = reshape_yts(&doc).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Movie (2020) [720p]");
        assert_eq!(rows[1]["infohash"], "BBB");
        assert_eq!(rows[0]["date"], "1700000000");
        assert_eq!(rows[1]["details"], "https://yts.example/m/1");

        assert!(reshape_yts(&json!({"data": {"movie_count": 0}})).unwrap().is_empty());
        assert!(reshape_yts(&json!([])).is_err());
    }

    #[test]
    fn test_reshape_eztv() {
        let doc = json!({"torrents_count": 1, "torrents": [
            {"title": "Show S02E03", "hash": "CCC", "magnet_url": "magnet:?xt=urn:btih:CCC", "seeds": 4, "peers": 6, "size_bytes": "1024"}
        ]});
        let rows = reshape_eztv(&doc).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["magneturl"], "magnet:?xt=urn:btih:CCC");
        assert_eq!(rows[0]["size"], "1024");
        assert!(reshape_eztv(&json!({"torrents_count": 0})).unwrap().is_empty());
    }

    #[test]
    fn test_reshape_apibay_skips_sentinel() {
        let none = json!([{"id": "0", "name": "No results returned", "info_hash": "0000000000000000000000000000000000000000"}]);
        assert!(reshape_apibay(&none).unwrap().is_empty());

        let some = json!([{"id": "42", "name": "Ubuntu", "info_hash": "DDD", "size": "1000", "seeders": "10", "leechers": "2", "added": "1700000000", "category": "303"}]);
        let rows = reshape_apibay(&some).unwrap();
        assert_eq!(rows[0]["title"], "Ubuntu");
        assert_eq!(rows[0]["category"], "303");
        assert!(reshape_apibay(&json!({"error": true})).is_err());
    }

    #[test]
    fn test_filter_by_title() {
        let row = |title: &str| {
            let mut r = RawRow::new();
            r.set("title", FieldValue::text(title));
            r
        };
        let rows = vec![row("Ubuntu 24.04"), row("Debian 12"), RawRow::new()];

        assert_eq!(filter_by_title(rows.clone(), "UBUNTU").len(), 1);
        assert_eq!(filter_by_title(rows.clone(), "").len(), 3);
        assert_eq!(filter_by_title(rows, "test").len(), 3);
    }
}
