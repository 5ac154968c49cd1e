use std::fmt;

/// Where the app lands when the location names no route.
pub const DEFAULT_LOCATION: &str = "#/match";

/// A hash location such as `#/match?code=ABC`.
///
/// `full` is the normalized text used for idempotence checks; `path` is the
/// part before `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    full: String,
    path: String,
    query: Vec<(String, String)>,
}

impl Location {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let full = match raw {
            "" | "#" | "#/" => DEFAULT_LOCATION.to_string(),
            r if r.starts_with("#/") => r.to_string(),
            r if r.starts_with('#') => format!("#/{}", &r[1..]),
            r if r.starts_with('/') => format!("#{}", r),
            r => format!("#/{}", r),
        };

        let (path, qs) = match full.split_once('?') {
            Some((path, qs)) => (path.to_string(), qs),
            None => (full.clone(), ""),
        };
        let query = url::form_urlencoded::parse(qs.as_bytes())
            .into_owned()
            .collect();

        Self { full, path, query }
    }

    /// Build a location from a path and query pairs, encoding the values.
    pub fn with_query(path: &str, pairs: &[(&str, &str)]) -> Self {
        if pairs.is_empty() {
            return Self::parse(path);
        }
        let qs = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        Self::parse(&format!("{}?{}", path, qs))
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First path segment after `#/`: `match` for `#/match?code=ABC`.
    pub fn route(&self) -> &str {
        let rest = self.path.trim_start_matches('#').trim_start_matches('/');
        rest.split('/').next().unwrap_or_default()
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value of `name`, if present and non-empty.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::parse(DEFAULT_LOCATION)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl From<&str> for Location {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
