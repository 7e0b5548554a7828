use crate::errors::{Error, Result};
use crate::model::StatusValue;

/// Converts a raw status value into a float.
///
/// Booleans are not a valid temperature encoding but map to `0.0` instead of
/// failing, so a single odd status never aborts a run. NaN and infinities
/// are parse errors, whether they arrive as a float or as text.
pub fn convert(value: &StatusValue) -> Result<f64> {
    match value {
        StatusValue::Integer(n) => Ok(*n as f64),
        StatusValue::Float(f) => finite(*f, || f.to_string()),
        StatusValue::Text(s) => {
            let parsed = s.parse::<f64>().map_err(|source| Error::Parse {
                value: s.clone(),
                source: Some(source),
            })?;
            finite(parsed, || s.clone())
        }
        StatusValue::Bool(_) => Ok(0.0),
        StatusValue::Other(_) => Err(Error::UnsupportedType(value.kind())),
    }
}

fn finite(f: f64, raw: impl FnOnce() -> String) -> Result<f64> {
    if f.is_finite() {
        Ok(f)
    } else {
        Err(Error::Parse {
            value: raw(),
            source: None,
        })
    }
}
