//! Merge Module
//!
//! Deep structural merging of records with target precedence.
//!
//! The first record passed to [`merge`] is authoritative: wherever it holds a
//! value that competes with a source value, the target value is kept. Nested
//! records are merged recursively so that fields only the source knows about
//! survive at any depth. Arrays and scalars are never merged element-wise.
//!
//! Records are owned trees, so a record can never contain itself and the
//! recursion is bounded by the nesting depth of the inputs.


use crate::record::{Record, Value};

// == Merge ==
/// Merges `sources` into `target`, left to right.
///
/// `merge(t, [s1, s2])` is `merge_pair(merge_pair(t, s1), s2)`: the
/// accumulated result is the target of every step, so earlier inputs take
/// precedence over later ones. With no sources the result equals `target`.
///
/// Neither `target` nor any source is modified.
pub fn merge(target: &Record, sources: &[Record]) -> Record {
    sources
        .iter()
        .fold(target.clone(), |acc, source| merge_pair(&acc, source))
}

// == Merge Pair ==
/// Merges a single `source` into `target`, returning a new record.
///
/// For every key in the union of both records:
/// - present on one side only: that value is taken unchanged
/// - both sides hold records: the two records are merged recursively
/// - otherwise: the target value wins
pub fn merge_pair(target: &Record, source: &Record) -> Record {
    let mut merged = source.clone();

    for (key, target_value) in target {
        let value = match (target_value, source.get(key)) {
            (Value::Object(target_inner), Some(Value::Object(source_inner))) => {
                Value::Object(merge_pair(target_inner, source_inner))
            }
            _ => target_value.clone(),
        };
        merged.insert(key.clone(), value);
    }

    merged
}
