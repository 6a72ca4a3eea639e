use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    weather::{
        Coordinate, HourlyTemperature, NewWeatherPoint, Place,
        TemperatureVector, WeatherPoint,
    },
    DateRange, WithId,
};
use utility::id::Id;

use crate::database::{
    Database, DatabaseAutocommit, DatabaseError, DatabaseTransaction, Result,
    WeatherStore,
};

/// An in-memory weather point database. Every store operation is atomic
/// (guarded by one lock), which is all the transactionality the operations
/// of [`WeatherStore`] need. Used by the test suite and usable as a
/// zero-setup backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    points: BTreeMap<i64, StoredPoint>,
}

#[derive(Debug, Clone)]
struct StoredPoint {
    date: NaiveDate,
    location: Place,
    // Sparse rows in insertion order, densified on read like the relational
    // backend does.
    readings: Vec<HourlyTemperature>,
}

impl State {
    fn all_points(&self) -> Vec<WithId<WeatherPoint>> {
        // BTreeMap iteration is id-ascending.
        self.points
            .iter()
            .map(|(id, point)| point.with_id(*id))
            .collect()
    }

    fn points_by_coordinate(
        &self,
        coordinate: &Coordinate,
    ) -> Vec<WithId<WeatherPoint>> {
        self.points
            .iter()
            .filter(|(_, point)| point.location.coordinate() == *coordinate)
            .map(|(id, point)| point.with_id(*id))
            .collect()
    }

    fn insert_point_if_absent(
        &mut self,
        id: Option<i64>,
        point: &NewWeatherPoint,
    ) -> Option<i64> {
        let id = match id {
            Some(id) => {
                if self.points.contains_key(&id) {
                    return None;
                }
                id
            }
            None => self.last_id + 1,
        };
        self.last_id = self.last_id.max(id);
        self.points.insert(
            id,
            StoredPoint {
                date: point.date,
                location: point.location.clone(),
                readings: point.hourly_readings().collect(),
            },
        );
        Some(id)
    }

    fn delete_all(&mut self) -> u64 {
        let removed = self.points.len() as u64;
        self.points.clear();
        removed
    }

    fn delete_by_range(
        &mut self,
        range: DateRange,
        coordinate: &Coordinate,
    ) -> u64 {
        let before = self.points.len();
        self.points.retain(|_, point| {
            !(range.contains(point.date)
                && point.location.coordinate() == *coordinate)
        });
        (before - self.points.len()) as u64
    }
}

impl StoredPoint {
    fn with_id(&self, id: i64) -> WithId<WeatherPoint> {
        WithId::new(
            Id::new(id),
            WeatherPoint {
                date: self.date,
                location: self.location.clone(),
                temperature: TemperatureVector::from_readings(
                    self.readings.iter().copied(),
                ),
            },
        )
    }
}

/// Both handle types hold the shared state; operations take the lock for
/// their full duration.
pub struct MemoryHandle {
    state: Arc<Mutex<State>>,
}

impl MemoryHandle {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DatabaseError::Other("state lock poisoned".into()))
    }
}

#[async_trait]
impl WeatherStore for MemoryHandle {
    async fn all_points(&mut self) -> Result<Vec<WithId<WeatherPoint>>> {
        Ok(self.lock()?.all_points())
    }

    async fn points_by_coordinate(
        &mut self,
        coordinate: &Coordinate,
    ) -> Result<Vec<WithId<WeatherPoint>>> {
        Ok(self.lock()?.points_by_coordinate(coordinate))
    }

    async fn insert_point_if_absent(
        &mut self,
        id: Option<Id<WeatherPoint>>,
        point: &NewWeatherPoint,
    ) -> Result<Option<Id<WeatherPoint>>> {
        let id = id.map(|id| id.raw());
        Ok(self
            .lock()?
            .insert_point_if_absent(id, point)
            .map(Id::new))
    }

    async fn delete_all(&mut self) -> Result<u64> {
        Ok(self.lock()?.delete_all())
    }

    async fn delete_by_range(
        &mut self,
        range: DateRange,
        coordinate: &Coordinate,
    ) -> Result<u64> {
        Ok(self.lock()?.delete_by_range(range, coordinate))
    }
}

#[async_trait]
impl DatabaseTransaction for MemoryHandle {
    async fn commit(self) -> Result<()> {
        // Operations apply immediately; each one is atomic on its own.
        Ok(())
    }
}

impl DatabaseAutocommit for MemoryHandle {}

#[async_trait]
impl Database for MemoryDatabase {
    type Transaction = MemoryHandle;
    type Autocommit = MemoryHandle;

    fn auto(&self) -> Self::Autocommit {
        MemoryHandle {
            state: self.state.clone(),
        }
    }

    async fn transaction(&self) -> Result<Self::Transaction> {
        Ok(MemoryHandle {
            state: self.state.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn place(lat: &str, lon: &str) -> Place {
        Place {
            lat: lat.parse().unwrap(),
            lon: lon.parse().unwrap(),
            city: "San Angelo".to_owned(),
            state: "Texas".to_owned(),
        }
    }

    fn point(date: &str, location: Place) -> NewWeatherPoint {
        NewWeatherPoint {
            date: date.parse().unwrap(),
            location,
            temperatures: vec![Decimal::new(205, 1); 24],
        }
    }

    #[tokio::test]
    async fn assigns_ascending_ids() {
        let database = MemoryDatabase::new();
        let mut store = database.auto();
        let sample = point("2020-10-19", place("31.4428", "-100.4503"));
        let first = store
            .insert_point_if_absent(None, &sample)
            .await
            .unwrap()
            .unwrap();
        let second = store
            .insert_point_if_absent(None, &sample)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.raw(), 1);
        assert_eq!(second.raw(), 2);
    }

    #[tokio::test]
    async fn client_supplied_id_collision_inserts_nothing() {
        let database = MemoryDatabase::new();
        let mut store = database.auto();
        let sample = point("2020-10-19", place("31.4428", "-100.4503"));
        let id = store
            .insert_point_if_absent(Some(Id::new(7)), &sample)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id.raw(), 7);

        let conflicting = point("2020-12-01", place("33.3330", "11.1111"));
        let result = store
            .insert_point_if_absent(Some(Id::new(7)), &conflicting)
            .await
            .unwrap();
        assert!(result.is_none());

        // The existing point is untouched.
        let points = store.all_points().await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].content.location.city, "San Angelo");
        assert_eq!(
            points[0].content.date,
            "2020-10-19".parse::<NaiveDate>().unwrap()
        );
    }

    #[tokio::test]
    async fn generated_ids_skip_past_client_supplied_ones() {
        let database = MemoryDatabase::new();
        let mut store = database.auto();
        let sample = point("2020-10-19", place("31.4428", "-100.4503"));
        store
            .insert_point_if_absent(Some(Id::new(5)), &sample)
            .await
            .unwrap();
        let next = store
            .insert_point_if_absent(None, &sample)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.raw(), 6);
    }

    #[tokio::test]
    async fn delete_by_range_matches_date_and_coordinate() {
        let database = MemoryDatabase::new();
        let mut store = database.auto();
        let coord_a = place("31.4428", "-100.4503");
        let coord_b = place("32.7420", "-96.3342");
        for date in ["2020-10-19", "2020-10-20", "2020-10-22", "2020-10-23"] {
            store
                .insert_point_if_absent(None, &point(date, coord_a.clone()))
                .await
                .unwrap();
        }
        store
            .insert_point_if_absent(None, &point("2020-10-21", coord_b.clone()))
            .await
            .unwrap();

        let range = DateRange::new(
            "2020-10-20".parse().unwrap(),
            "2020-10-22".parse().unwrap(),
        );
        let removed = store
            .delete_by_range(range, &coord_a.coordinate())
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.all_points().await.unwrap().len(), 3);
    }
}
