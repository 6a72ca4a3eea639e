use chrono::NaiveDate;
use model::{
    weather::{HourlyTemperature, Place, TemperatureVector, WeatherPoint},
    WithId,
};
use rust_decimal::Decimal;
use sqlx::prelude::FromRow;
use utility::id::Id;

/// One row of the locations/temperatures join. A location without readings
/// yields a single row with `hour` and `value` null.
#[derive(Debug, Clone, FromRow)]
pub struct PointRow {
    pub id: i64,
    pub city: String,
    pub state: String,
    pub lat: Decimal,
    pub lon: Decimal,
    pub date: NaiveDate,
    pub hour: Option<i16>,
    pub value: Option<Decimal>,
}

impl PointRow {
    pub fn reading(&self) -> Option<HourlyTemperature> {
        self.hour
            .zip(self.value)
            .map(|(hour, value)| HourlyTemperature::new(hour, value))
    }
}

/// A weather point as accumulated from consecutive join rows of the same
/// location, before densifying the readings.
#[derive(Debug)]
pub struct PointGroup {
    id: i64,
    date: NaiveDate,
    place: Place,
    readings: Vec<HourlyTemperature>,
}

impl PointGroup {
    pub fn open(row: PointRow) -> Self {
        let mut group = Self {
            id: row.id,
            date: row.date,
            place: Place {
                lat: row.lat,
                lon: row.lon,
                city: row.city.clone(),
                state: row.state.clone(),
            },
            readings: Vec::new(),
        };
        group.push(&row);
        group
    }

    pub fn belongs_to(&self, row: &PointRow) -> bool {
        self.id == row.id
    }

    pub fn push(&mut self, row: &PointRow) {
        if let Some(reading) = row.reading() {
            self.readings.push(reading);
        }
    }

    pub fn to_model(self) -> WithId<WeatherPoint> {
        WithId::new(
            Id::new(self.id),
            WeatherPoint {
                date: self.date,
                location: self.place,
                temperature: TemperatureVector::from_readings(self.readings),
            },
        )
    }
}
