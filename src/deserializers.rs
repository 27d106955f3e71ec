//! Custom deserializers for the loosely-structured case library.
//!
//! Case files were curated by hand, so category lists show up both as
//! comma-separated strings and as arrays, and weights sometimes arrive as
//! quoted numbers. These helpers accept those shapes and leave validation of
//! the values themselves to the case store.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Deserializes a label list from a string, an array, or null.
///
/// # Accepted Formats
///
/// ```json
/// { "tier2_categories": null }                                   // []
/// { "tier2_categories": "Assessing risks, Forming feasible plans" }
/// { "tier2_categories": ["Assessing risks", "Forming feasible plans"] }
/// ```
///
/// Blank entries and `None`/`N/A` placeholders are dropped.
pub fn de_label_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(Vec::new()) };
    let raw: Vec<String> = match v {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) => s.split(',').map(str::to_string).collect(),
        serde_json::Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for el in arr {
                match el {
                    serde_json::Value::String(s) => out.push(s),
                    other => {
                        return Err(D::Error::custom(format!(
                            "invalid category entry: {}",
                            other
                        )));
                    }
                }
            }
            out
        }
        other => {
            return Err(D::Error::custom(format!(
                "invalid type for category list: {}",
                other
            )));
        }
    };
    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !is_placeholder(s))
        .collect())
}

/// Deserializes a label -> weight map where weights may be numbers or numeric strings.
///
/// Non-finite values are passed through so the case store can reject them
/// with the offending record id.
pub fn de_weight_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let opt = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    let Some(map) = opt else {
        return Ok(BTreeMap::new());
    };
    let mut out = BTreeMap::new();
    for (label, value) in map {
        let weight = match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| D::Error::custom(format!("invalid weight for '{}'", label)))?,
            serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                D::Error::custom(format!("invalid weight '{}' for '{}'", s, label))
            })?,
            other => {
                return Err(D::Error::custom(format!(
                    "invalid type for weight of '{}': {}",
                    label, other
                )));
            }
        };
        out.insert(label, weight);
    }
    Ok(out)
}

/// `None`, `N/A` and empty strings stand for "no category" in hand-written lists.
pub fn is_placeholder(raw: &str) -> bool {
    let s = raw.trim().trim_matches(['[', ']', '.']).trim();
    s.is_empty() || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("n/a")
}
