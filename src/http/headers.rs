//! Header multimap merging.

use axum::http::HeaderMap;

/// Append every value of every header in `source` to `destination`.
///
/// Existing values in `destination` are kept; repeated headers in `source`
/// are appended in their original order, never collapsed.
pub fn copy_headers(destination: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source.iter() {
        destination.append(name.clone(), value.clone());
    }
}
