//! Metadata filter evaluation in the index service's operator syntax.
//!
//! A filter is a JSON object whose keys are field names or the logical
//! operators `$and`/`$or`. A field maps either to a literal (equality) or to
//! an operator object using `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
//! `$nin`, `$exists`. All top-level keys are AND-ed. A condition on a field the
//! record does not carry never matches, except `$exists: false`.

use std::cmp::Ordering;

use ragdb_core::types::Metadata;
use serde_json::Value;

pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(key, cond)| match key.as_str() {
        "$and" => sub_filters(cond).is_some_and(|mut fs| fs.all(|f| matches_filter(metadata, f))),
        "$or" => sub_filters(cond).is_some_and(|mut fs| fs.any(|f| matches_filter(metadata, f))),
        field => evaluate_field(metadata.get(field), cond),
    })
}

fn sub_filters(cond: &Value) -> Option<impl Iterator<Item = &Metadata>> {
    let items = cond.as_array()?;
    Some(items.iter().filter_map(Value::as_object))
}

fn evaluate_field(value: Option<&Value>, cond: &Value) -> bool {
    match cond {
        Value::Object(ops) => ops.iter().all(|(op, operand)| evaluate_op(value, op, operand)),
        literal => value.is_some_and(|v| json_eq(v, literal)),
    }
}

fn evaluate_op(value: Option<&Value>, op: &str, operand: &Value) -> bool {
    if op == "$exists" { return operand.as_bool().is_some_and(|want| want == value.is_some()); }
    let Some(value) = value else { return false };
    match op {
        "$eq" => json_eq(value, operand),
        "$ne" => !json_eq(value, operand),
        "$gt" => json_cmp(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(json_cmp(value, operand), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => json_cmp(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(json_cmp(value, operand), Some(Ordering::Less | Ordering::Equal)),
        "$in" => operand.as_array().is_some_and(|vs| vs.iter().any(|v| json_eq(value, v))),
        "$nin" => operand.as_array().is_some_and(|vs| !vs.iter().any(|v| json_eq(value, v))),
        _ => false,
    }
}

/// Numbers compare by value regardless of integer/float representation.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> { a.as_f64()?.partial_cmp(&b.as_f64()?) }
