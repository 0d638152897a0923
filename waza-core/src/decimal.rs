//! Fixed six-fractional-digit decimal rendering for score fields in the
//! outcome JSON, so `1.0` emits as `1.000000` rather than collapsing to
//! shortest round-trip form.

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

pub fn six_digit<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text = format!("{value:.6}");
    let raw = RawValue::from_string(text).map_err(serde::ser::Error::custom)?;
    raw.serialize(serializer)
}
