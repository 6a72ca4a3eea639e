use futures::{Stream, TryStreamExt};
use model::{
    weather::{Coordinate, HourlyTemperature, NewWeatherPoint, WeatherPoint},
    DateRange, WithId,
};
use sqlx::{Executor, Postgres, Transaction};
use weather::database::Result;

use crate::data_model::{PointGroup, PointRow};

use super::convert_error;

const SELECT_POINTS: &str = "
    SELECT
        l.id, l.city, l.state, l.lat, l.lon, l.date,
        t.hour, t.value
    FROM
        locations l
        LEFT JOIN temperatures t ON t.location_id = l.id
";

pub async fn get_all<'c, E>(executor: E) -> Result<Vec<WithId<WeatherPoint>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = format!("{} ORDER BY l.id;", SELECT_POINTS);
    let rows = sqlx::query_as::<_, PointRow>(&query).fetch(executor);
    collect_points(rows).await
}

pub async fn get_by_coordinate<'c, E>(
    executor: E,
    coordinate: &Coordinate,
) -> Result<Vec<WithId<WeatherPoint>>>
where
    E: Executor<'c, Database = Postgres>,
{
    let query =
        format!("{} WHERE l.lat = $1 AND l.lon = $2 ORDER BY l.id;", SELECT_POINTS);
    let rows = sqlx::query_as::<_, PointRow>(&query)
        .bind(coordinate.lat)
        .bind(coordinate.lon)
        .fetch(executor);
    collect_points(rows).await
}

/// Folds the ordered join rows into points one location at a time, so only
/// the assembled points are held in memory, never the raw row set.
async fn collect_points<S>(mut rows: S) -> Result<Vec<WithId<WeatherPoint>>>
where
    S: Stream<Item = sqlx::Result<PointRow>> + Unpin,
{
    let mut points = Vec::new();
    let mut open: Option<PointGroup> = None;
    while let Some(row) = rows.try_next().await.map_err(convert_error)? {
        match open.as_mut() {
            Some(group) if group.belongs_to(&row) => group.push(&row),
            _ => {
                if let Some(group) = open.take() {
                    points.push(group.to_model());
                }
                open = Some(PointGroup::open(row));
            }
        }
    }
    if let Some(group) = open {
        points.push(group.to_model());
    }
    Ok(points)
}

/// Inserts the location row and its readings. With a client-supplied id the
/// location insert is an `ON CONFLICT DO NOTHING`, so the duplicate check
/// and the write are one atomic statement; `None` means the id was taken
/// and nothing was written.
pub async fn insert_if_absent(
    tx: &mut Transaction<'_, Postgres>,
    id: Option<i64>,
    point: &NewWeatherPoint,
) -> Result<Option<i64>> {
    let location_id = match id {
        Some(id) => {
            let inserted: Option<i64> = sqlx::query_scalar(
                "
                INSERT INTO locations (id, city, state, lat, lon, date)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                RETURNING id;
                ",
            )
            .bind(id)
            .bind(&point.location.city)
            .bind(&point.location.state)
            .bind(point.location.lat)
            .bind(point.location.lon)
            .bind(point.date)
            .fetch_optional(&mut **tx)
            .await
            .map_err(convert_error)?;
            match inserted {
                Some(id) => {
                    advance_id_sequence(tx).await?;
                    id
                }
                None => return Ok(None),
            }
        }
        None => sqlx::query_scalar(
            "
            INSERT INTO locations (city, state, lat, lon, date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id;
            ",
        )
        .bind(&point.location.city)
        .bind(&point.location.state)
        .bind(point.location.lat)
        .bind(point.location.lon)
        .bind(point.date)
        .fetch_one(&mut **tx)
        .await
        .map_err(convert_error)?,
    };

    let readings: Vec<HourlyTemperature> = point.hourly_readings().collect();
    insert_readings(&mut **tx, location_id, &readings).await?;

    Ok(Some(location_id))
}

/// Keeps the generated-id sequence ahead of client-supplied ids, so a later
/// id-less insert cannot collide with one of them. Runs in the same
/// transaction as the explicit-id insert.
async fn advance_id_sequence(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query(
        "
        SELECT setval(
            pg_get_serial_sequence('locations', 'id'),
            (SELECT MAX(id) FROM locations)
        );
        ",
    )
    .execute(&mut **tx)
    .await
    .map_err(convert_error)?;
    Ok(())
}

async fn insert_readings<'c, E>(
    executor: E,
    location_id: i64,
    readings: &[HourlyTemperature],
) -> Result<()>
where
    E: Executor<'c, Database = Postgres>,
{
    if readings.is_empty() {
        return Ok(());
    }

    // build query string
    let mut query_str =
        String::from("INSERT INTO temperatures (location_id, hour, value) VALUES ");
    for index in 0..readings.len() {
        if index > 0 {
            query_str.push_str(", ");
        }
        let base = index * 3;
        query_str.push_str(&format!(
            "(${}, ${}, ${})",
            base + 1,
            base + 2,
            base + 3
        ));
    }
    query_str.push(';');

    // query
    let mut query = sqlx::query(&query_str);
    for reading in readings {
        query = query
            .bind(location_id)
            .bind(reading.hour)
            .bind(reading.value);
    }
    query.execute(executor).await.map_err(convert_error)?;
    Ok(())
}

pub async fn delete_all<'c, E>(executor: E) -> Result<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("DELETE FROM locations;")
        .execute(executor)
        .await
        .map(|result| result.rows_affected())
        .map_err(convert_error)
}

pub async fn delete_by_range<'c, E>(
    executor: E,
    range: DateRange,
    coordinate: &Coordinate,
) -> Result<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        DELETE FROM locations
        WHERE date >= $1 AND date <= $2 AND lat = $3 AND lon = $4;
        ",
    )
    .bind(range.first)
    .bind(range.last)
    .bind(coordinate.lat)
    .bind(coordinate.lon)
    .execute(executor)
    .await
    .map(|result| result.rows_affected())
    .map_err(convert_error)
}
