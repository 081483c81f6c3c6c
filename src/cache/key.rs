//! Cache key derivation.
//!
//! A URL path and query map to a relative file path under the cache root.
//! The file name must fit the 255 byte component limit together with the
//! metadata sidecar suffix, so long query strings are replaced by their
//! digest, and if that is still too long the whole name is hashed.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Delimiter between the file stem and the query string.
pub const QUERY_DELIMITER: char = '~';

/// Suffix of the metadata file stored next to each body.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Maximum length of a single path component on common filesystems.
const MAX_COMPONENT_LEN: usize = 255;

/// Compute the relative cache path for `path` and `query` (without `?`).
pub fn cache_key(path: &str, query: Option<&str>) -> PathBuf {
    let mut segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    let file_name = if path.is_empty() || path.ends_with('/') || segments.is_empty() {
        "index.html".to_string()
    } else {
        segments.pop().unwrap_or("index.html").to_string()
    };

    let file_name = match query.filter(|q| !q.is_empty()) {
        Some(q) => with_query(&file_name, q),
        None => bounded(&file_name),
    };

    let mut key = PathBuf::new();
    for segment in segments {
        key.push(bounded(segment));
    }
    key.push(file_name);
    key
}

fn with_query(file_name: &str, query: &str) -> String {
    let (stem, ext) = split_extension(file_name);
    let query = query.replace('/', "%2F").replace('\\', "%5C");

    let candidate = format!("{}{}{}{}", stem, QUERY_DELIMITER, query, ext);
    if fits(&candidate) {
        return candidate;
    }

    let candidate = format!("{}{}{}{}", stem, QUERY_DELIMITER, hex_digest(&query), ext);
    if fits(&candidate) {
        return candidate;
    }

    hash_name(&candidate, ext)
}

fn bounded(name: &str) -> String {
    if fits(name) {
        name.to_string()
    } else {
        let (_, ext) = split_extension(name);
        hash_name(name, ext)
    }
}

fn hash_name(name: &str, ext: &str) -> String {
    let hashed = format!("{}{}", hex_digest(name), ext);
    if fits(&hashed) {
        hashed
    } else {
        hex_digest(name)
    }
}

fn fits(name: &str) -> bool {
    name.len() + SIDECAR_SUFFIX.len() <= MAX_COMPONENT_LEN
}

/// Split `name.ext` into `("name", ".ext")`. Dotfiles keep their dot in the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

fn hex_digest(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_len_ok(key: &PathBuf) -> bool {
        key.iter()
            .all(|c| c.len() + SIDECAR_SUFFIX.len() <= MAX_COMPONENT_LEN)
    }

    #[test]
    fn root_and_directories_map_to_index() {
        assert_eq!(cache_key("", None), PathBuf::from("index.html"));
        assert_eq!(cache_key("/", None), PathBuf::from("index.html"));
        assert_eq!(cache_key("/blog/", None), PathBuf::from("blog/index.html"));
    }

    #[test]
    fn plain_paths_keep_their_shape() {
        assert_eq!(
            cache_key("/scripts/app.js", None),
            PathBuf::from("scripts/app.js")
        );
    }

    #[test]
    fn query_is_inserted_before_extension() {
        assert_eq!(
            cache_key("/query-index.json", Some("limit=10&offset=0")),
            PathBuf::from("query-index~limit=10&offset=0.json")
        );
        assert_eq!(cache_key("/", Some("a=1")), PathBuf::from("index~a=1.html"));
    }

    #[test]
    fn query_cannot_create_directories() {
        let key = cache_key("/data.json", Some("path=/a/b"));
        assert_eq!(key.components().count(), 1);
    }

    #[test]
    fn dot_segments_are_dropped() {
        assert_eq!(
            cache_key("/a/../../etc/passwd", None),
            PathBuf::from("a/etc/passwd")
        );
    }

    #[test]
    fn long_queries_are_hashed() {
        let q1 = format!("q={}", "x".repeat(250));
        let q2 = format!("q={}", "y".repeat(250));
        let k1 = cache_key("/search.json", Some(&q1));
        let k2 = cache_key("/search.json", Some(&q2));

        assert_ne!(k1, k2);
        assert!(name_len_ok(&k1));
        let name = k1.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("search~"));
        assert!(name.ends_with(".json"));
        assert_eq!(k1, cache_key("/search.json", Some(&q1)));
    }

    #[test]
    fn long_names_are_fully_hashed() {
        let stem = "s".repeat(240);
        let path = format!("/{}.html", stem);
        let k1 = cache_key(&path, Some("a=1"));
        let k2 = cache_key(&path, Some("a=2"));
        assert_ne!(k1, k2);
        assert!(name_len_ok(&k1));
        assert!(k1.to_str().unwrap().ends_with(".html"));
    }

    #[test]
    fn long_segments_are_bounded() {
        let path = format!("/{}/x.html", "d".repeat(300));
        assert!(name_len_ok(&cache_key(&path, None)));
    }
}
