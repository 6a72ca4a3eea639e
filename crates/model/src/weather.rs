use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::HasId;

use crate::ExampleData;

/// Number of hourly temperature slots per weather point.
pub const HOURS_PER_DAY: usize = 24;

/// An exact-equality latitude/longitude pair used to narrow list and erase
/// operations. Coordinates are fixed-precision to match the stored columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinate {
    pub lat: Decimal,
    pub lon: Decimal,
}

impl Coordinate {
    pub fn new(lat: Decimal, lon: Decimal) -> Self {
        Self { lat, lon }
    }
}

/// The named place an observation was taken at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Place {
    pub lat: Decimal,
    pub lon: Decimal,
    pub city: String,
    pub state: String,
}

impl Place {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }
}

/// A single stored hourly reading. `hour` is expected to be in `0..24`, but
/// readers of persisted data must not rely on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyTemperature {
    pub hour: i16,
    pub value: Decimal,
}

impl HourlyTemperature {
    pub fn new(hour: i16, value: Decimal) -> Self {
        Self { hour, value }
    }
}

/// The fixed 24-slot hourly temperature vector of a weather point. Slots
/// without a reading serialize as `null`.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TemperatureVector([Option<Decimal>; HOURS_PER_DAY]);

impl TemperatureVector {
    /// Densifies an unordered set of readings into the 24 hour slots.
    /// Readings are assigned by hour index; readings with an hour outside
    /// `0..24` are skipped, and of duplicate hours the last one wins.
    pub fn from_readings<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = HourlyTemperature>,
    {
        let mut slots = [None; HOURS_PER_DAY];
        for reading in readings {
            if let Some(slot) = usize::try_from(reading.hour)
                .ok()
                .and_then(|hour| slots.get_mut(hour))
            {
                *slot = Some(reading.value);
            }
        }
        Self(slots)
    }

    pub fn slots(&self) -> &[Option<Decimal>; HOURS_PER_DAY] {
        &self.0
    }

    /// The populated slots as readings, in hour order.
    pub fn readings(&self) -> impl Iterator<Item = HourlyTemperature> + '_ {
        self.0.iter().enumerate().filter_map(|(hour, value)| {
            value.map(|value| HourlyTemperature::new(hour as i16, value))
        })
    }
}

/// One stored observation: a place, its calendar date and the hourly
/// temperature vector. This is the wire shape of a list entry (wrapped in
/// `WithId` to flatten the store-assigned id into it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WeatherPoint {
    pub date: NaiveDate,
    pub location: Place,
    pub temperature: TemperatureVector,
}

impl HasId for WeatherPoint {
    type IdType = i64;
}

impl ExampleData for WeatherPoint {
    fn example_data() -> Self {
        let noon = HourlyTemperature::new(12, Decimal::new(205, 1));
        WeatherPoint {
            date: NaiveDate::from_ymd_opt(2020, 10, 19)
                .unwrap_or_default(),
            location: Place {
                lat: Decimal::new(314428, 4),
                lon: Decimal::new(-1004503, 4),
                city: "San Angelo".to_owned(),
                state: "Texas".to_owned(),
            },
            temperature: TemperatureVector::from_readings([noon]),
        }
    }
}

/// A weather point as accepted for insertion. Temperature values are
/// positional: the index within `temperatures` is the hour slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWeatherPoint {
    pub date: NaiveDate,
    pub location: Place,
    pub temperatures: Vec<Decimal>,
}

impl NewWeatherPoint {
    /// The readings to persist: one per supplied value at hours `0..24`.
    /// Values past the 24th are not part of the result; callers decide how
    /// to report them (see `excess_values`).
    pub fn hourly_readings(
        &self,
    ) -> impl Iterator<Item = HourlyTemperature> + '_ {
        self.temperatures
            .iter()
            .take(HOURS_PER_DAY)
            .enumerate()
            .map(|(hour, value)| HourlyTemperature::new(hour as i16, *value))
    }

    /// Number of supplied temperature values beyond the 24 hour slots.
    pub fn excess_values(&self) -> usize {
        self.temperatures.len().saturating_sub(HOURS_PER_DAY)
    }
}
