use std::{error, result};

use async_trait::async_trait;
use model::{
    weather::{Coordinate, NewWeatherPoint, WeatherPoint},
    DateRange, WithId,
};
use utility::id::Id;

#[derive(Debug)]
pub enum DatabaseError {
    NotFound,
    Other(Box<dyn error::Error + Send + Sync>),
}

pub type Result<T> = result::Result<T, DatabaseError>;

/// The weather point store operations. Implemented for both transactional
/// and autocommit handles of a [`Database`].
#[async_trait]
pub trait WeatherStore {
    /// All stored weather points, ordered by id ascending.
    async fn all_points(&mut self) -> Result<Vec<WithId<WeatherPoint>>>;

    /// The stored weather points whose coordinate exactly equals the filter,
    /// ordered by id ascending.
    async fn points_by_coordinate(
        &mut self,
        coordinate: &Coordinate,
    ) -> Result<Vec<WithId<WeatherPoint>>>;

    /// Inserts a weather point with its hourly readings (one row per value
    /// at hours `0..24`, further values dropped). When `id` is given and a
    /// point with that id already exists, nothing is written and `None` is
    /// returned; the check and the write happen in one atomic step, so
    /// concurrent inserts of the same id cannot both succeed. Ids generated
    /// for later id-less inserts never collide with client-supplied ones.
    async fn insert_point_if_absent(
        &mut self,
        id: Option<Id<WeatherPoint>>,
        point: &NewWeatherPoint,
    ) -> Result<Option<Id<WeatherPoint>>>;

    /// Removes every weather point and its readings. Returns the number of
    /// removed points.
    async fn delete_all(&mut self) -> Result<u64>;

    /// Removes every weather point whose date lies in the inclusive range
    /// and whose coordinate exactly matches, cascading its readings.
    /// Returns the number of removed points.
    async fn delete_by_range(
        &mut self,
        range: DateRange,
        coordinate: &Coordinate,
    ) -> Result<u64>;
}

#[async_trait]
pub trait DatabaseTransaction: WeatherStore {
    async fn commit(self) -> Result<()>;
}

pub trait DatabaseAutocommit: WeatherStore {}

/// Trait to implement a weather point database. Multiple concurrent accesses
/// should be possible by e.g. cloning the database object.
#[async_trait]
pub trait Database: Clone + Send + Sync + Sized {
    type Transaction: DatabaseTransaction + Send;
    type Autocommit: DatabaseAutocommit + Send;

    fn auto(&self) -> Self::Autocommit;

    async fn transaction(&self) -> Result<Self::Transaction>;
}
