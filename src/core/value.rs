//! Loose-value helpers for BSON documents written by older application
//! versions, where the same field may hold an ObjectId, a hex string, an
//! extended-JSON wrapper or a plain number depending on who wrote it.

use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document};
use chrono::{NaiveDate, NaiveDateTime};

/// `true` for null, empty arrays and empty documents.
pub fn is_empty_value(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::Array(items) => items.is_empty(),
        Bson::Document(doc) => doc.is_empty(),
        _ => false,
    }
}

/// Same as [`is_empty_value`] but treats an absent value as empty.
pub fn is_empty_opt(value: Option<&Bson>) -> bool {
    value.is_none_or(is_empty_value)
}

/// Loose truthiness: null, `false`, zero, NaN and the empty string are falsy.
pub fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0 && !n.is_nan(),
        Bson::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Present and not null.
pub fn is_present(value: Option<&Bson>) -> bool {
    matches!(value, Some(v) if !matches!(v, Bson::Null | Bson::Undefined))
}

pub fn as_document(value: Option<&Bson>) -> Option<&Document> {
    match value {
        Some(Bson::Document(doc)) => Some(doc),
        _ => None,
    }
}

pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Converts a finite float to the BSON number type the application driver
/// would have produced: int32 when integral and in range, double otherwise.
pub fn number_to_bson(value: f64) -> Bson {
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        Bson::Int32(value as i32)
    } else {
        Bson::Double(value)
    }
}

/// Decimal rendering without a trailing `.0` for integral doubles.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn parse_object_id(hex: &str) -> Option<ObjectId> {
    if hex.len() != 24 {
        return None;
    }
    ObjectId::parse_str(hex).ok()
}

/// Accepts an ObjectId, a 24-character hex string or an `{ "$oid": hex }` wrapper.
pub fn to_object_id(value: &Bson) -> Option<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Some(*oid),
        Bson::String(s) => parse_object_id(s),
        Bson::Document(doc) => match doc.get("$oid") {
            Some(Bson::String(s)) => parse_object_id(s),
            _ => None,
        },
        _ => None,
    }
}

/// Creation time embedded in the first ObjectId-shaped candidate.
pub fn object_id_time<'a, I>(candidates: I) -> Option<DateTime>
where
    I: IntoIterator<Item = &'a Bson>,
{
    candidates
        .into_iter()
        .find_map(to_object_id)
        .map(|oid| oid.timestamp())
}

/// The ObjectId form of `value` when it has one, otherwise `value` unchanged.
pub fn ensure_object_id(value: &Bson) -> Bson {
    to_object_id(value)
        .map(Bson::ObjectId)
        .unwrap_or_else(|| value.clone())
}

/// Plain string form used for hashing and messages.
pub fn stringify(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => number_to_string(*n),
        Bson::Boolean(b) => b.to_string(),
        Bson::Null => "null".to_string(),
        Bson::Undefined => "undefined".to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Human readable identifier for log lines.
pub fn describe_id(value: Option<&Bson>) -> String {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => "<unknown>".to_string(),
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::Document(doc)) => match doc.get("$oid") {
            Some(Bson::String(hex)) => hex.clone(),
            _ => stringify(&Bson::Document(doc.clone())),
        },
        Some(other) => stringify(other),
    }
}

fn parse_date_str(text: &str) -> Option<DateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(DateTime::from_millis(parsed.timestamp_millis()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(DateTime::from_millis(naive.and_utc().timestamp_millis()));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_millis(naive.and_utc().timestamp_millis()))
}

/// Parses dates stored as BSON dates, `{ "$date": .. }` wrappers, ISO strings
/// or epoch milliseconds. Falsy and unparseable values yield `None`.
pub fn normalize_date(value: &Bson) -> Option<DateTime> {
    if !is_truthy(value) {
        return None;
    }
    match value {
        Bson::DateTime(dt) => Some(*dt),
        Bson::String(text) => parse_date_str(text),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            let millis = as_f64(value)?;
            millis.is_finite().then(|| DateTime::from_millis(millis as i64))
        }
        Bson::Document(doc) => match doc.get("$date") {
            Some(Bson::Document(inner)) => match inner.get("$numberLong") {
                Some(Bson::String(n)) => n.parse::<i64>().ok().map(DateTime::from_millis),
                _ => None,
            },
            Some(inner) => normalize_date(inner),
            None => None,
        },
        _ => None,
    }
}

/// Like [`normalize_date`] but keeps the original value when it cannot be parsed.
pub fn ensure_date(value: Option<&Bson>) -> Option<Bson> {
    let value = value?;
    Some(
        normalize_date(value)
            .map(Bson::DateTime)
            .unwrap_or_else(|| value.clone()),
    )
}

/// Finite numbers, or strings holding one.
pub fn numeric_status(value: Option<&Bson>) -> Option<Bson> {
    match value? {
        Bson::Int32(n) => Some(Bson::Int32(*n)),
        Bson::Int64(n) => Some(Bson::Int64(*n)),
        Bson::Double(n) if n.is_finite() => Some(Bson::Double(*n)),
        Bson::String(s) => {
            let parsed = s.trim().parse::<f64>().ok()?;
            (!s.trim().is_empty() && parsed.is_finite()).then(|| number_to_bson(parsed))
        }
        _ => None,
    }
}

pub fn ensure_number(value: Option<&Bson>) -> Option<Bson> {
    match value? {
        Bson::Int32(n) => Some(Bson::Int32(*n)),
        Bson::Int64(n) => Some(Bson::Int64(*n)),
        Bson::Double(n) => n.is_finite().then_some(Bson::Double(*n)),
        Bson::String(s) if !s.trim().is_empty() => {
            let parsed = s.trim().parse::<f64>().ok()?;
            parsed.is_finite().then(|| number_to_bson(parsed))
        }
        _ => None,
    }
}

pub fn coerce_bool(value: Option<&Bson>) -> Option<bool> {
    match value? {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(n) => Some(*n != 0),
        Bson::Int64(n) => Some(*n != 0),
        Bson::Double(n) => Some(*n != 0.0),
        Bson::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
