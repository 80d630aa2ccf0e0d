//! Resolves an inbound path to an upstream URI
//!
//! Only the first path segment is a routing key. There is no longest-prefix
//! search and no "no route" outcome: anything unmatched goes to the default.

use crate::destination::{DestinationTable, Rewrite};

/// Compute the upstream URI for `path` and the raw `query` (without its `?`).
///
/// The query string is appended verbatim, never re-encoded.
pub fn resolve(table: &DestinationTable, path: &str, query: Option<&str>) -> String {
    let mut target = resolve_path(table, path);

    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }

    target
}

fn resolve_path(table: &DestinationTable, path: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let candidate = trimmed.split('/').next().unwrap_or("");

    if let Some(entry) = table.get(candidate) {
        let remainder = &trimmed[candidate.len()..];
        return match entry.rewrite {
            Rewrite::Inclusive => format!("{}/{}{}", entry.target, candidate, remainder),
            Rewrite::Exclusive => format!("{}{}", entry.target, remainder),
        };
    }

    format!("{}{}", table.default_entry().target, path)
}
