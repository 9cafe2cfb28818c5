//! Parser for the `key-value;key-value` mini-language carried in photo
//! descriptions.

use crate::schema::fold;

/// Ordered key → value mapping parsed from a description.
///
/// Keys keep the case they were written with. Lookups that should ignore
/// case go through [`Metadata::get_ignore_case`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair. An existing identical key keeps its position and takes
    /// the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Case-insensitive lookup. When several spellings of the same key are
    /// present the one written last wins.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        let folded = fold(key);
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| fold(k) == folded)
            .map(|(_, v)| v.as_str())
    }

    /// One entry per case-insensitive key: spelling of its first appearance,
    /// value of its last.
    pub fn unique_ignore_case(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::with_capacity(self.entries.len());
        for (k, v) in &self.entries {
            let folded = fold(k);
            match out.iter_mut().find(|(seen, _)| fold(seen) == folded) {
                Some(entry) => entry.1 = v,
                None => out.push((k, v)),
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a description such as `"F-plants; site-3"` into its pairs.
///
/// Segments are separated by `;` and split on their first `-`. Blank
/// segments and segments without a `-` are dropped.
pub fn parse_description(description: Option<&str>) -> Metadata {
    let mut meta = Metadata::new();
    let Some(description) = description else {
        return meta;
    };

    for segment in description.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if let Some((key, value)) = segment.split_once('-') {
            meta.insert(key.trim(), value.trim());
        }
    }
    meta
}
