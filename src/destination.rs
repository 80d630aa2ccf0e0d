//! Destination table built from `-d` specifications
//!
//! Three spec forms are accepted:
//! - `URL`: the default destination, used when no prefix matches
//! - `prefix=URL`: inclusive, `/prefix/rest` -> `URL/prefix/rest`
//! - `prefix^URL`: exclusive, `/prefix/rest` -> `URL/rest`

use crate::error::ConfigError;
use std::collections::HashMap;
use tracing::{info, warn};
use url::Url;

/// How the matched prefix segment is carried into the upstream path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewrite {
    /// Keep the prefix segment
    Inclusive,
    /// Strip the prefix segment
    Exclusive,
}

/// A single routing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationEntry {
    /// First path segment this entry answers for, empty for the default
    pub prefix: String,
    /// Absolute upstream URL without a trailing slash
    pub target: String,
    pub rewrite: Rewrite,
}

impl DestinationEntry {
    /// Parse one destination spec. `^` takes precedence over `=`.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let (prefix, raw_target, rewrite) = if let Some((prefix, target)) = spec.split_once('^') {
            (prefix, target, Rewrite::Exclusive)
        } else if let Some((prefix, target)) = spec.split_once('=') {
            (prefix, target, Rewrite::Inclusive)
        } else {
            ("", spec, Rewrite::Inclusive)
        };

        Ok(Self {
            prefix: prefix.to_string(),
            target: clean_target(raw_target)?,
            rewrite,
        })
    }

    /// Whether this is the fallback entry
    pub fn is_default(&self) -> bool {
        self.prefix.is_empty()
    }
}

/// Strip trailing slashes and make sure what is left is an absolute http(s) URL
fn clean_target(raw: &str) -> Result<String, ConfigError> {
    let target = raw.trim_end_matches('/');

    let url = Url::parse(target).map_err(|source| ConfigError::InvalidTarget {
        target: raw.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(target.to_string()),
        _ => Err(ConfigError::UnsupportedScheme(raw.to_string())),
    }
}

/// Immutable prefix -> destination mapping, built once at startup
#[derive(Debug, Clone)]
pub struct DestinationTable {
    entries: HashMap<String, DestinationEntry>,
}

impl DestinationTable {
    /// Build the table from specs in the order they were given.
    ///
    /// A second default destination fails immediately; a later entry for an
    /// existing non-empty prefix replaces the earlier one.
    pub fn build<I, S>(source_port: u16, specs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: HashMap<String, DestinationEntry> = HashMap::new();

        for spec in specs {
            let entry = DestinationEntry::parse(spec.as_ref())?;

            if entry.is_default() && entries.contains_key("") {
                return Err(ConfigError::DuplicateDefault);
            }

            if entry.prefix.contains('/') {
                warn!(
                    "Prefix '{}' spans more than one path segment and will never match",
                    entry.prefix
                );
            }

            if let Some(previous) = entries.insert(entry.prefix.clone(), entry) {
                warn!(
                    "Prefix '{}' specified more than once, replacing {}",
                    previous.prefix, previous.target
                );
            }
        }

        if !entries.contains_key("") {
            return Err(ConfigError::NoDefault);
        }

        let table = Self { entries };
        for entry in table.entries() {
            info!(
                "http://localhost:{}/{} -> {} ({:?})",
                source_port, entry.prefix, entry.target, entry.rewrite
            );
        }

        Ok(table)
    }

    /// Look up a non-default entry by prefix
    pub fn get(&self, prefix: &str) -> Option<&DestinationEntry> {
        if prefix.is_empty() {
            return None;
        }
        self.entries.get(prefix)
    }

    /// The fallback entry
    pub fn default_entry(&self) -> &DestinationEntry {
        // build() refuses to return a table without one
        &self.entries[""]
    }

    /// All entries, sorted by prefix
    pub fn entries(&self) -> Vec<&DestinationEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
