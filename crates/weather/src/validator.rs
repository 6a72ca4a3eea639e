use std::collections::BTreeMap;

use model::weather::{NewWeatherPoint, Place};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utility::date::parse_date;

const REQUIRED: &str = "Required field";
const INVALID_DATE: &str = "Invalid date";
const NOT_NUMERIC: &str = "Must be numeric";

/// An inbound weather point as posted by a client. Leaf fields are kept as
/// raw JSON values so that type problems surface as field-level validation
/// messages instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherPointPayload {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub date: Option<Value>,
    #[serde(default)]
    pub location: Option<PlacePayload>,
    #[serde(default)]
    pub temperature: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlacePayload {
    #[serde(default)]
    pub city: Option<Value>,
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub lon: Option<Value>,
}

/// Field name to human-readable messages, serialized as the `errors` object
/// of a 422 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    fn add(&mut self, field: impl Into<String>, message: &str) {
        self.0
            .entry(field.into())
            .or_default()
            .push(message.to_owned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A payload that passed validation. The optional client-supplied id is kept
/// separate from the point itself, since the store assigns ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidWeatherPoint {
    pub id: Option<i64>,
    pub point: NewWeatherPoint,
}

/// Checks shape and types of an inbound weather point. A non-numeric `id` is
/// ignored rather than rejected, and the temperature array length is not
/// checked here; the insert path drops entries past hour 23.
pub fn validate(
    payload: &WeatherPointPayload,
) -> Result<ValidWeatherPoint, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let date = match payload.date.as_ref() {
        // A present but non-string date (e.g. a JSON number) is invalid,
        // not missing.
        Some(value) => {
            let parsed = value.as_str().and_then(parse_date);
            if parsed.is_none() {
                errors.add("date", INVALID_DATE);
            }
            parsed
        }
        None => {
            errors.add("date", REQUIRED);
            None
        }
    };

    let place = payload.location.as_ref();
    let city = required_text(place.and_then(|place| place.city.as_ref()));
    if city.is_none() {
        errors.add("location.city", REQUIRED);
    }
    let state = required_text(place.and_then(|place| place.state.as_ref()));
    if state.is_none() {
        errors.add("location.state", REQUIRED);
    }
    let lat = required_numeric(
        place.and_then(|place| place.lat.as_ref()),
        "location.lat",
        &mut errors,
    );
    let lon = required_numeric(
        place.and_then(|place| place.lon.as_ref()),
        "location.lon",
        &mut errors,
    );

    // Absent array tolerated; every present entry has to be numeric.
    let mut temperatures = Vec::new();
    for (index, entry) in payload.temperature.iter().flatten().enumerate() {
        match numeric(entry) {
            Some(value) => temperatures.push(value),
            None => errors.add(format!("temperature.{}", index), NOT_NUMERIC),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // The error check above guarantees the defaults are unreachable.
    let point = NewWeatherPoint {
        date: date.unwrap_or_default(),
        location: Place {
            lat: lat.unwrap_or_default(),
            lon: lon.unwrap_or_default(),
            city: city.unwrap_or_default(),
            state: state.unwrap_or_default(),
        },
        temperatures,
    };

    Ok(ValidWeatherPoint {
        id: payload.id.as_ref().and_then(numeric_id),
        point,
    })
}

fn required_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

fn required_numeric(
    value: Option<&Value>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<Decimal> {
    match value {
        Some(value) => {
            let parsed = numeric(value);
            if parsed.is_none() {
                errors.add(field, NOT_NUMERIC);
            }
            parsed
        }
        None => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

/// Accepts JSON numbers and numeric strings, like the original `is_numeric`
/// check did.
fn numeric(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_owned(),
        _ => return None,
    };
    raw.parse()
        .ok()
        .or_else(|| Decimal::from_scientific(&raw).ok())
}

fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
