//! Torznab category taxonomy
//!
//! Site categories are mapped into the Newznab numbering scheme. Top level
//! codes are thousands (1000 Console, 2000 Movies, ... 8000 Other) and
//! subcategories add tens (2040 Movies/HD). Every result carries at least one
//! top level code so category filters can be applied as a plain set
//! intersection.

use serde::{Deserialize, Serialize};

/// A mapping from a site category to a Torznab category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// The site's own category id (string, sites are not consistent)
    pub tracker_id: String,
    /// The Torznab category code
    pub torznab_cat: i32,
    /// Human readable description as shown by the site
    pub description: Option<String>,
}

impl CategoryMapping {
    pub fn new(tracker_id: impl Into<String>, torznab_cat: i32, desc: impl Into<String>) -> Self {
        Self {
            tracker_id: tracker_id.into(),
            torznab_cat,
            description: Some(desc.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TorznabCategory {
    pub id: i32,
    pub name: &'static str,
    pub parent_id: Option<i32>,
}

impl TorznabCategory {
    pub const fn new(id: i32, name: &'static str, parent_id: Option<i32>) -> Self {
        Self {
            id,
            name,
            parent_id,
        }
    }
}

/// Standard Torznab categories
pub static TORZNAB_CATEGORIES: &[TorznabCategory] = &[
    TorznabCategory::new(1000, "Console", None),
    TorznabCategory::new(1010, "Console/NDS", Some(1000)),
    TorznabCategory::new(1020, "Console/PSP", Some(1000)),
    TorznabCategory::new(1030, "Console/Wii", Some(1000)),
    TorznabCategory::new(1040, "Console/XBox", Some(1000)),
    TorznabCategory::new(1050, "Console/XBox 360", Some(1000)),
    TorznabCategory::new(1080, "Console/PS3", Some(1000)),
    TorznabCategory::new(1090, "Console/Other", Some(1000)),
    TorznabCategory::new(1110, "Console/3DS", Some(1000)),
    TorznabCategory::new(1120, "Console/PS Vita", Some(1000)),
    TorznabCategory::new(1140, "Console/XBox One", Some(1000)),
    TorznabCategory::new(1180, "Console/PS4", Some(1000)),
    TorznabCategory::new(2000, "Movies", None),
    TorznabCategory::new(2010, "Movies/Foreign", Some(2000)),
    TorznabCategory::new(2020, "Movies/Other", Some(2000)),
    TorznabCategory::new(2030, "Movies/SD", Some(2000)),
    TorznabCategory::new(2040, "Movies/HD", Some(2000)),
    TorznabCategory::new(2045, "Movies/UHD", Some(2000)),
    TorznabCategory::new(2050, "Movies/BluRay", Some(2000)),
    TorznabCategory::new(2060, "Movies/3D", Some(2000)),
    TorznabCategory::new(2070, "Movies/DVD", Some(2000)),
    TorznabCategory::new(2080, "Movies/WEB-DL", Some(2000)),
    TorznabCategory::new(3000, "Audio", None),
    TorznabCategory::new(3010, "Audio/MP3", Some(3000)),
    TorznabCategory::new(3020, "Audio/Video", Some(3000)),
    TorznabCategory::new(3030, "Audio/Audiobook", Some(3000)),
    TorznabCategory::new(3040, "Audio/Lossless", Some(3000)),
    TorznabCategory::new(3050, "Audio/Other", Some(3000)),
    TorznabCategory::new(3060, "Audio/Foreign", Some(3000)),
    TorznabCategory::new(4000, "PC", None),
    TorznabCategory::new(4010, "PC/0day", Some(4000)),
    TorznabCategory::new(4020, "PC/ISO", Some(4000)),
    TorznabCategory::new(4030, "PC/Mac", Some(4000)),
    TorznabCategory::new(4040, "PC/Mobile-Other", Some(4000)),
    TorznabCategory::new(4050, "PC/Games", Some(4000)),
    TorznabCategory::new(4060, "PC/Mobile-iOS", Some(4000)),
    TorznabCategory::new(4070, "PC/Mobile-Android", Some(4000)),
    TorznabCategory::new(5000, "TV", None),
    TorznabCategory::new(5010, "TV/WEB-DL", Some(5000)),
    TorznabCategory::new(5020, "TV/Foreign", Some(5000)),
    TorznabCategory::new(5030, "TV/SD", Some(5000)),
    TorznabCategory::new(5040, "TV/HD", Some(5000)),
    TorznabCategory::new(5045, "TV/UHD", Some(5000)),
    TorznabCategory::new(5050, "TV/Other", Some(5000)),
    TorznabCategory::new(5060, "TV/Sport", Some(5000)),
    TorznabCategory::new(5070, "TV/Anime", Some(5000)),
    TorznabCategory::new(5080, "TV/Documentary", Some(5000)),
    TorznabCategory::new(6000, "XXX", None),
    TorznabCategory::new(6010, "XXX/DVD", Some(6000)),
    TorznabCategory::new(6020, "XXX/WMV", Some(6000)),
    TorznabCategory::new(6030, "XXX/XviD", Some(6000)),
    TorznabCategory::new(6040, "XXX/x264", Some(6000)),
    TorznabCategory::new(6045, "XXX/UHD", Some(6000)),
    TorznabCategory::new(6050, "XXX/Pack", Some(6000)),
    TorznabCategory::new(6060, "XXX/ImageSet", Some(6000)),
    TorznabCategory::new(6070, "XXX/Other", Some(6000)),
    TorznabCategory::new(6080, "XXX/SD", Some(6000)),
    TorznabCategory::new(6090, "XXX/WEB-DL", Some(6000)),
    TorznabCategory::new(7000, "Books", None),
    TorznabCategory::new(7010, "Books/Mags", Some(7000)),
    TorznabCategory::new(7020, "Books/EBook", Some(7000)),
    TorznabCategory::new(7030, "Books/Comics", Some(7000)),
    TorznabCategory::new(7040, "Books/Technical", Some(7000)),
    TorznabCategory::new(7050, "Books/Other", Some(7000)),
    TorznabCategory::new(7060, "Books/Foreign", Some(7000)),
    TorznabCategory::new(8000, "Other", None),
    TorznabCategory::new(8010, "Other/Misc", Some(8000)),
    TorznabCategory::new(8020, "Other/Hashed", Some(8000)),
];

/// Top level codes used across the crate
pub mod cats {
    pub const CONSOLE: i32 = 1000;
    pub const MOVIES: i32 = 2000;
    pub const AUDIO: i32 = 3000;
    pub const PC: i32 = 4000;
    pub const TV: i32 = 5000;
    pub const XXX: i32 = 6000;
    pub const BOOKS: i32 = 7000;
    pub const OTHER: i32 = 8000;
}

pub fn get_category(id: i32) -> Option<&'static TorznabCategory> {
    TORZNAB_CATEGORIES.iter().find(|c| c.id == id)
}

/// Top level code for any code, known or not (2040 -> 2000, 2999 -> 2000)
pub fn parent_code(id: i32) -> i32 {
    if let Some(parent) = get_category(id).and_then(|c| c.parent_id) {
        return parent;
    }
    let top = (id / 1000) * 1000;
    if (cats::CONSOLE..=cats::OTHER).contains(&top) {
        top
    } else {
        cats::OTHER
    }
}

/// Canonical code list for one mapped category: the code itself plus its
/// top level parent, deduplicated.
pub fn canonical_codes(id: i32) -> Vec<i32> {
    let parent = parent_code(id);
    if get_category(id).is_none() || parent == id {
        vec![parent]
    } else {
        vec![id, parent]
    }
}

/// Resolve a Torznab category name ("Movies/HD", "tv", "Audiobooks") to its
/// code. Exact table names win; a handful of aliases used by real
/// definitions are accepted; anything else is `None`.
pub fn parse_category_name(name: &str) -> Option<i32> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    if let Ok(code) = wanted.parse::<i32>() {
        return get_category(code).map(|c| c.id);
    }

    if let Some(cat) = TORZNAB_CATEGORIES
        .iter()
        .find(|c| c.name.to_lowercase() == wanted)
    {
        return Some(cat.id);
    }

    let code = match wanted.as_str() {
        "movies/4k" => 2045,
        "movies/web" => 2080,
        "tv/4k" => 5045,
        "tv/web" => 5010,
        "tv/documentaries" | "documentary" | "documentaries" => 5080,
        "sports" | "sport" => 5060,
        "anime" => 5070,
        "music" | "audio/music" => cats::AUDIO,
        "audio/flac" => 3040,
        "audiobook" | "audiobooks" => 3030,
        "ebook" | "ebooks" => 7020,
        "comics" => 7030,
        "magazines" | "mags" => 7010,
        "apps" | "applications" | "software" => cats::PC,
        "games" | "console/games" => cats::CONSOLE,
        "pc/software" => 4020,
        "adult" | "porn" => cats::XXX,
        _ => return None,
    };
    Some(code)
}

/// Does a result carrying `codes` satisfy a filter of `requested` codes?
///
/// A requested top level code matches any of its subcategories; a requested
/// subcategory must match exactly.
pub fn intersects(codes: &[i32], requested: &[i32]) -> bool {
    if requested.is_empty() {
        return true;
    }
    codes.iter().any(|code| {
        requested
            .iter()
            .any(|want| want == code || (want % 1000 == 0 && parent_code(*code) == *want))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_codes() {
        assert_eq!(canonical_codes(2040), vec![2040, 2000]);
        assert_eq!(canonical_codes(5000), vec![5000]);
        assert_eq!(canonical_codes(123), vec![8000]);
    }

    #[test]
    fn test_parse_category_name() {
        assert_eq!(parse_category_name("Movies/HD"), Some(2040));
        assert_eq!(parse_category_name("tv/anime"), Some(5070));
        assert_eq!(parse_category_name("Audiobooks"), Some(3030));
        assert_eq!(parse_category_name("5040"), Some(5040));
        assert_eq!(parse_category_name("nonsense"), None);
    }

    #[test]
    fn test_intersects() {
        assert!(intersects(&[2040, 2000], &[2000]));
        assert!(intersects(&[2040], &[2000]));
        assert!(!intersects(&[5040, 5000], &[2000]));
        assert!(intersects(&[5040, 5000], &[]));
        assert!(!intersects(&[2030, 2000], &[2040]));
    }
}
