//! Lenient JSON recovery from model replies.

use serde_json::Value;

/// Locate the JSON object inside a reply that may be wrapped in a markdown
/// fence or surrounded by prose.
pub(crate) fn json_object_span(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let unfenced = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.rsplit_once("```").map_or(rest, |(body, _)| body)
        }
        None => trimmed,
    };

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (end > start).then(|| &unfenced[start..=end])
}

/// Confidence as an integer percentage, clamped to 0..=100.
///
/// Accepts numbers, numeric strings, and fractions: a decimal value in
/// `(0, 1]` reads as a share, so `0.85` is 85 and `1.0` is 100, while the
/// integer `1` and `"1%"` stay 1.
pub(crate) fn confidence(value: Option<&Value>) -> u8 {
    let (raw, decimal) = match value {
        Some(Value::Number(n)) => (n.as_f64(), n.is_f64()),
        Some(Value::String(s)) => {
            let s = s.trim();
            let decimal = !s.ends_with('%') && s.contains('.');
            (s.trim_end_matches('%').trim().parse::<f64>().ok(), decimal)
        }
        _ => (None, false),
    };
    let Some(mut raw) = raw.filter(|v| v.is_finite()) else {
        return 0;
    };
    if decimal && raw > 0.0 && raw <= 1.0 {
        raw *= 100.0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// Non-empty trimmed string from a JSON value. Numbers are stringified.
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let lowered = s.to_ascii_lowercase();
    if s.is_empty() || lowered == "null" || lowered == "n/a" || lowered == "unknown" {
        None
    } else {
        Some(s)
    }
}

/// Every non-empty string in a JSON array (or a lone string).
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| text(Some(v))).collect(),
        Some(v @ Value::String(_)) => text(Some(v)).into_iter().collect(),
        _ => Vec::new(),
    }
}
