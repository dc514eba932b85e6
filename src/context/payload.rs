// =============================================================================
// Payload lookup helpers
// =============================================================================
//
// Producers disagree on field names (camelCase vs snake_case, flat vs nested
// under `signal` / `regime` / ...). Lookups take a list of dotted paths and
// return the first one present. Numbers are accepted as JSON numbers or as
// numeric strings, as many vendors send prices as strings.
// =============================================================================

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Resolve a dotted path (`"signal.direction"`). JSON `null` counts as absent.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// First present value among `paths`, in order.
pub fn first<'a>(root: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|p| lookup(root, p))
}

pub fn has_any(root: &Value, paths: &[&str]) -> bool {
    first(root, paths).is_some()
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

pub fn number(root: &Value, paths: &[&str]) -> Option<f64> {
    paths.iter().find_map(|p| lookup(root, p).and_then(as_number))
}

/// First non-empty string among `paths`, trimmed.
pub fn text<'a>(root: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths.iter().find_map(|p| {
        lookup(root, p)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

pub fn boolean(root: &Value, paths: &[&str]) -> Option<bool> {
    paths.iter().find_map(|p| {
        lookup(root, p).and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|x| x != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "valid" | "pass" => Some(true),
                "false" | "no" | "n" | "0" | "invalid" | "fail" => Some(false),
                _ => None,
            },
            _ => None,
        })
    })
}

/// Epoch seconds or milliseconds (as number or string), or RFC 3339.
pub fn timestamp(root: &Value, paths: &[&str]) -> Option<DateTime<Utc>> {
    paths.iter().find_map(|p| {
        let value = lookup(root, p)?;
        if let Some(s) = value.as_str() {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Some(dt.with_timezone(&Utc));
            }
        }
        let raw = as_number(value)?;
        // Anything past 1e11 is taken as milliseconds (year 5138 in seconds).
        let millis = if raw.abs() >= 1e11 { raw } else { raw * 1000.0 };
        Utc.timestamp_millis_opt(millis as i64).single()
    })
}

/// Scale a fraction below 1 to percent, then clamp into [0, 100]. An exact
/// 1 reads as 1%, not 100%.
pub fn to_percent(value: f64) -> f64 {
    let scaled = if (0.0..1.0).contains(&value) {
        value * 100.0
    } else {
        value
    };
    scaled.clamp(0.0, 100.0)
}

/// Top-level keys of an object payload, for diagnostics.
pub fn top_level_keys(root: &Value) -> Vec<String> {
    root.as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_resolves_nested_paths_and_skips_null() {
        let v = json!({ "signal": { "direction": "LONG", "score": null } });
        assert_eq!(lookup(&v, "signal.direction"), Some(&json!("LONG")));
        assert_eq!(lookup(&v, "signal.score"), None);
        assert_eq!(lookup(&v, "signal.direction.deeper"), None);
    }

    #[test]
    fn number_accepts_numeric_strings() {
        let v = json!({ "a": "1.25", "b": 3, "c": "abc" });
        assert_eq!(number(&v, &["c", "a"]), Some(1.25));
        assert_eq!(number(&v, &["b"]), Some(3.0));
        assert_eq!(number(&v, &["missing"]), None);
    }

    #[test]
    fn timestamp_handles_seconds_millis_and_rfc3339() {
        let secs = json!({ "t": 1_700_000_000 });
        let millis = json!({ "t": 1_700_000_000_000_i64 });
        let rfc = json!({ "t": "2023-11-14T22:13:20Z" });
        let a = timestamp(&secs, &["t"]).unwrap();
        let b = timestamp(&millis, &["t"]).unwrap();
        let c = timestamp(&rfc, &["t"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn to_percent_scales_fractions() {
        assert!((to_percent(0.9) - 90.0).abs() < 1e-9);
        assert_eq!(to_percent(85.0), 85.0);
        assert_eq!(to_percent(140.0), 100.0);
        assert_eq!(to_percent(-3.0), 0.0);
        assert_eq!(to_percent(1.0), 1.0);
        assert!((to_percent(0.99) - 99.0).abs() < 1e-9);
    }

    #[test]
    fn boolean_accepts_words() {
        let v = json!({ "a": "yes", "b": false, "c": 0 });
        assert_eq!(boolean(&v, &["a"]), Some(true));
        assert_eq!(boolean(&v, &["b"]), Some(false));
        assert_eq!(boolean(&v, &["c"]), Some(false));
    }
}
