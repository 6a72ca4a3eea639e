use model::{
    weather::{Coordinate, WeatherPoint, HOURS_PER_DAY},
    DateRange, WithId,
};
use rust_decimal::Decimal;
use utility::{date::parse_date, id::Id};

use crate::{
    database::{Database, DatabaseTransaction as _, WeatherStore as _},
    validator::{self, WeatherPointPayload},
    RequestError, RequestResult,
};

const INVALID_COORDINATE: &str = "Invalid latitude/longitude";
const INVALID_DATE: &str = "Invalid date format";

/// Request-scoped orchestration of listing, inserting and erasing weather
/// points on top of a [`Database`].
#[derive(Debug, Clone)]
pub struct WeatherService<D>
where
    D: Database + Send + Sync + Sized + 'static,
{
    database: D,
}

impl<D> WeatherService<D>
where
    D: Database,
{
    pub fn new(database: D) -> Self {
        Self { database }
    }

    /// Lists all weather points, or only those at an exact coordinate when a
    /// filter is supplied. A filter that matches nothing is `NotFound`; an
    /// empty unfiltered list is a successful empty result.
    pub async fn list(
        &self,
        lat: Option<&str>,
        lon: Option<&str>,
    ) -> RequestResult<Vec<WithId<WeatherPoint>>> {
        if lat.is_none() && lon.is_none() {
            return Ok(self.database.auto().all_points().await?);
        }

        let coordinate = parse_coordinate(lat, lon)?;
        let points = self
            .database
            .auto()
            .points_by_coordinate(&coordinate)
            .await?;
        if points.is_empty() {
            return Err(RequestError::NotFound);
        }
        Ok(points)
    }

    /// Validates and inserts one weather point in a single transaction.
    /// A client-supplied id that is already taken fails with `Conflict`
    /// before anything is written.
    pub async fn insert(
        &self,
        payload: &WeatherPointPayload,
    ) -> RequestResult<Id<WeatherPoint>> {
        let valid = validator::validate(payload).map_err(|errors| {
            log::error!(
                "Validation failed: {:?}",
                errors.fields().collect::<Vec<_>>()
            );
            RequestError::Validation(errors)
        })?;

        let excess = valid.point.excess_values();
        if excess > 0 {
            log::warn!(
                "Too many temperature values (expected {}), ignoring {}",
                HOURS_PER_DAY,
                excess
            );
        }

        let mut tx = self.database.transaction().await?;
        let inserted = tx
            .insert_point_if_absent(valid.id.map(Id::new), &valid.point)
            .await?;
        match inserted {
            Some(id) => {
                tx.commit().await?;
                Ok(id)
            }
            // Dropping the uncommitted transaction rolls it back.
            None => Err(RequestError::Conflict),
        }
    }

    /// Erases everything when no parameter is supplied; otherwise all of
    /// start/end/lat/lon must be present and valid, and exactly the points
    /// in the date range at the coordinate are erased.
    pub async fn erase(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        lat: Option<&str>,
        lon: Option<&str>,
    ) -> RequestResult<u64> {
        let mut tx = self.database.transaction().await?;
        let removed =
            if let (None, None, None, None) = (start, end, lat, lon) {
                tx.delete_all().await?
            } else {
                let range = parse_range(start, end)?;
                let coordinate = parse_coordinate(lat, lon)?;
                tx.delete_by_range(range, &coordinate).await?
            };
        tx.commit().await?;
        Ok(removed)
    }
}

fn parse_coordinate(
    lat: Option<&str>,
    lon: Option<&str>,
) -> RequestResult<Coordinate> {
    match (parse_decimal(lat), parse_decimal(lon)) {
        (Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
        _ => Err(RequestError::InvalidFilter(INVALID_COORDINATE)),
    }
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> RequestResult<DateRange> {
    let first = start.and_then(parse_date);
    let last = end.and_then(parse_date);
    match (first, last) {
        (Some(first), Some(last)) => Ok(DateRange::new(first, last)),
        _ => Err(RequestError::InvalidFilter(INVALID_DATE)),
    }
}

fn parse_decimal(raw: Option<&str>) -> Option<Decimal> {
    raw.and_then(|raw| raw.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use serde_json::{json, Value};

    const COORD_A: (&str, &str) = ("31.4428", "-100.4503");
    const COORD_B: (&str, &str) = ("32.7420", "-96.3342");

    fn service() -> WeatherService<MemoryDatabase> {
        WeatherService::new(MemoryDatabase::new())
    }

    fn payload(date: &str, coordinate: (&str, &str)) -> WeatherPointPayload {
        let (lat, lon) = coordinate;
        let raw = json!({
            "date": date,
            "location": {
                "city": "San Angelo",
                "state": "Texas",
                "lat": lat.parse::<f64>().unwrap(),
                "lon": lon.parse::<f64>().unwrap(),
            },
            "temperature": vec![20.5; 24],
        });
        serde_json::from_value(raw).unwrap()
    }

    fn with_id(mut payload: WeatherPointPayload, id: Value) -> WeatherPointPayload {
        payload.id = Some(id);
        payload
    }

    async fn seed_nine_points(service: &WeatherService<MemoryDatabase>) {
        for date in ["2020-10-19", "2020-10-20", "2020-10-22", "2020-10-23"] {
            service.insert(&payload(date, COORD_A)).await.unwrap();
        }
        for date in [
            "2020-11-01",
            "2020-11-02",
            "2020-11-03",
            "2020-11-04",
            "2020-11-05",
        ] {
            service.insert(&payload(date, COORD_B)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn inserted_point_round_trips_by_hour_index() {
        let service = service();
        let mut raw = payload("2020-10-01", COORD_A);
        let values: Vec<f64> = (0..24).map(|hour| hour as f64 + 0.5).collect();
        raw.temperature =
            Some(values.iter().map(|value| json!(value)).collect());
        service.insert(&raw).await.unwrap();

        let points = service.list(None, None).await.unwrap();
        assert_eq!(points.len(), 1);
        let slots = points[0].content.temperature.slots();
        for (hour, value) in values.iter().enumerate() {
            assert_eq!(slots[hour], Some(value.to_string().parse().unwrap()));
        }
    }

    #[tokio::test]
    async fn unfiltered_list_returns_all_in_id_order() {
        let service = service();
        seed_nine_points(&service).await;
        let points = service.list(None, None).await.unwrap();
        assert_eq!(points.len(), 9);
        let ids: Vec<_> = points.iter().map(|point| point.id.raw()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn filtered_list_returns_exact_coordinate_matches() {
        let service = service();
        seed_nine_points(&service).await;
        let points = service
            .list(Some(COORD_A.0), Some(COORD_A.1))
            .await
            .unwrap();
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|point| {
            point.content.location.lat
                == COORD_A.0.parse::<Decimal>().unwrap()
        }));
    }

    #[tokio::test]
    async fn filter_matching_nothing_is_not_found() {
        let service = service();
        seed_nine_points(&service).await;
        let result = service.list(Some("33.333"), Some("11.1111")).await;
        assert!(matches!(result, Err(RequestError::NotFound)));
    }

    #[tokio::test]
    async fn unfiltered_list_of_empty_store_is_an_empty_success() {
        let service = service();
        let points = service.list(None, None).await.unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn partial_or_malformed_filter_is_invalid() {
        let service = service();
        seed_nine_points(&service).await;
        for (lat, lon) in [
            (Some("31.4428"), None),
            (None, Some("-100.4503")),
            (Some("north"), Some("-100.4503")),
        ] {
            let result = service.list(lat, lon).await;
            assert!(matches!(result, Err(RequestError::InvalidFilter(_))));
        }
    }

    #[tokio::test]
    async fn insert_with_taken_id_conflicts_and_changes_nothing() {
        let service = service();
        let id = service
            .insert(&payload("2020-10-01", COORD_A))
            .await
            .unwrap();

        let mut conflicting = payload("2020-12-24", COORD_B);
        conflicting.location.as_mut().unwrap().city =
            Some(json!("Fubar"));
        let result = service
            .insert(&with_id(conflicting, json!(id.raw())))
            .await;
        assert!(matches!(result, Err(RequestError::Conflict)));

        let points = service.list(None, None).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].content.location.city, "San Angelo");
        assert_eq!(points[0].content.temperature.readings().count(), 24);
    }

    #[tokio::test]
    async fn insert_rejects_invalid_payload_with_field_errors() {
        let service = service();
        let result = service.insert(&WeatherPointPayload::default()).await;
        match result {
            Err(RequestError::Validation(errors)) => {
                assert!(errors.fields().any(|field| field == "date"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert!(service.list(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn erase_without_parameters_empties_the_store() {
        let service = service();
        seed_nine_points(&service).await;
        let removed = service.erase(None, None, None, None).await.unwrap();
        assert_eq!(removed, 9);
        assert!(service.list(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn erase_by_range_removes_only_matching_points() {
        let service = service();
        for date in ["2020-10-19", "2020-10-20", "2020-10-22", "2020-10-23"] {
            service.insert(&payload(date, COORD_A)).await.unwrap();
        }
        service
            .insert(&payload("2020-10-21", COORD_B))
            .await
            .unwrap();

        let removed = service
            .erase(
                Some("20201020"),
                Some("20201022"),
                Some(COORD_A.0),
                Some(COORD_A.1),
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let rest = service.list(None, None).await.unwrap();
        assert_eq!(rest.len(), 3);
        // coordB's 2020-10-21 point survives despite being in the range.
        assert!(rest.iter().any(|point| {
            point.content.location.lon
                == COORD_B.1.parse::<Decimal>().unwrap()
        }));
    }

    #[tokio::test]
    async fn erase_with_partial_parameters_is_invalid() {
        let service = service();
        seed_nine_points(&service).await;
        let result = service
            .erase(Some("2020-10-20"), None, Some(COORD_A.0), Some(COORD_A.1))
            .await;
        assert!(matches!(result, Err(RequestError::InvalidFilter(_))));

        let result = service
            .erase(
                Some("2020-10-20"),
                Some("2020-10-22"),
                Some("here"),
                Some(COORD_A.1),
            )
            .await;
        assert!(matches!(result, Err(RequestError::InvalidFilter(_))));

        // Nothing was deleted on either failed attempt.
        assert_eq!(service.list(None, None).await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn excess_temperature_values_are_dropped_not_rejected() {
        let service = service();
        let mut raw = payload("2020-10-01", COORD_A);
        raw.temperature = Some(vec![json!(25.0); 30]);
        service.insert(&raw).await.unwrap();

        let points = service.list(None, None).await.unwrap();
        assert_eq!(points[0].content.temperature.readings().count(), 24);
    }
}
