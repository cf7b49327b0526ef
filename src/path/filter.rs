//! Path predicates over the flat encoding.

use super::{field_name, InodePath, FIELD_DEPTH};
use crate::inode::FIELD_PATH;
use crate::store::filter::Filter;

fn path_key(field: &str) -> String {
    format!("{}.{}", FIELD_PATH, field)
}

fn segment_clauses(path: &InodePath) -> Vec<Filter> {
    path.segments()
        .iter()
        .enumerate()
        .map(|(i, segment)| Filter::eq(path_key(&field_name(i)), segment.as_str()))
        .collect()
}

/// Matches the single record stored at `path`.
pub fn exact(path: &InodePath) -> Filter {
    let mut clauses = segment_clauses(path);
    clauses.push(Filter::eq(path_key(FIELD_DEPTH), path.depth() as u64));
    Filter::And(clauses)
}

/// Matches `path` and every descendant. For the root this is every record.
pub fn subtree(path: &InodePath) -> Filter {
    if path.is_root() {
        return Filter::Exists(FIELD_PATH.to_string());
    }
    Filter::And(segment_clauses(path))
}

/// Matches the direct children of `path`.
pub fn children(path: &InodePath) -> Filter {
    let mut clauses = segment_clauses(path);
    clauses.push(Filter::eq(path_key(FIELD_DEPTH), path.depth() as u64 + 1));
    Filter::And(clauses)
}

/// One exact predicate per strict ancestor, root first. Empty for the root.
pub fn ancestors(path: &InodePath) -> Vec<Filter> {
    path.ancestors().iter().map(exact).collect()
}

/// Single predicate matching any strict ancestor.
pub fn any_ancestor(path: &InodePath) -> Filter {
    Filter::Or(ancestors(path))
}
