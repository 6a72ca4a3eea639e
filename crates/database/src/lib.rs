use std::{env, error::Error};

use async_trait::async_trait;
use model::{
    weather::{Coordinate, NewWeatherPoint, WeatherPoint},
    DateRange, WithId,
};
use queries::convert_error;
use sqlx::Transaction;
use utility::id::Id;
use weather::database::{
    Database, DatabaseAutocommit, DatabaseError, DatabaseTransaction,
    WeatherStore,
};

pub mod data_model;
pub mod queries;

pub struct DatabaseConnectionInfo {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseConnectionInfo {
    pub fn from_env() -> Option<Self> {
        let username = env::var("DATABASE_USER").ok()?;
        let password = env::var("DATABASE_PASSWORD").ok()?;
        let hostname = env::var("DATABASE_HOST").ok()?;
        let port: u16 = env::var("DATABASE_PORT").ok()?.parse().ok()?;
        let database = env::var("DATABASE_NAME").ok()?;
        Some(Self {
            username,
            password,
            hostname,
            port,
            database,
        })
    }

    pub(self) fn postgres_url(self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.hostname, self.port, self.database
        )
    }
}

#[derive(Clone)]
pub struct PgDatabase {
    connection: sqlx::PgPool,
}

impl PgDatabase {
    pub async fn connect(
        database_connection_info: DatabaseConnectionInfo,
    ) -> Result<Self, Box<dyn Error>> {
        let url = database_connection_info.postgres_url();
        let pool = sqlx::postgres::PgPool::connect(&url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { connection: pool })
    }
}

pub struct PgDatabaseTransaction<'a> {
    tx: Transaction<'a, sqlx::Postgres>,
}

#[async_trait]
impl<'a> DatabaseTransaction for PgDatabaseTransaction<'a> {
    async fn commit(self) -> weather::database::Result<()> {
        self.tx.commit().await.map_err(|why| match why {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            _ => DatabaseError::Other(Box::new(why)),
        })
    }
}

pub struct PgDatabaseAutocommit {
    pool: sqlx::PgPool,
}

impl DatabaseAutocommit for PgDatabaseAutocommit {}

#[async_trait]
impl Database for PgDatabase {
    type Transaction = PgDatabaseTransaction<'static>;
    type Autocommit = PgDatabaseAutocommit;

    fn auto(&self) -> Self::Autocommit {
        PgDatabaseAutocommit {
            pool: self.connection.clone(),
        }
    }

    async fn transaction(&self) -> weather::database::Result<Self::Transaction> {
        let tx: Transaction<'_, sqlx::Postgres> = self
            .connection
            .begin()
            .await
            .map_err(convert_error)?;

        Ok(PgDatabaseTransaction { tx })
    }
}

#[async_trait]
impl<'a> WeatherStore for PgDatabaseTransaction<'a> {
    async fn all_points(&mut self) -> weather::database::Result<Vec<WithId<WeatherPoint>>> {
        queries::point::get_all(&mut *self.tx).await
    }

    async fn points_by_coordinate(
        &mut self,
        coordinate: &Coordinate,
    ) -> weather::database::Result<Vec<WithId<WeatherPoint>>> {
        queries::point::get_by_coordinate(&mut *self.tx, coordinate).await
    }

    async fn insert_point_if_absent(
        &mut self,
        id: Option<Id<WeatherPoint>>,
        point: &NewWeatherPoint,
    ) -> weather::database::Result<Option<Id<WeatherPoint>>> {
        queries::point::insert_if_absent(
            &mut self.tx,
            id.map(|id| id.raw()),
            point,
        )
        .await
        .map(|inserted| inserted.map(Id::new))
    }

    async fn delete_all(&mut self) -> weather::database::Result<u64> {
        queries::point::delete_all(&mut *self.tx).await
    }

    async fn delete_by_range(
        &mut self,
        range: DateRange,
        coordinate: &Coordinate,
    ) -> weather::database::Result<u64> {
        queries::point::delete_by_range(&mut *self.tx, range, coordinate)
            .await
    }
}

#[async_trait]
impl WeatherStore for PgDatabaseAutocommit {
    async fn all_points(&mut self) -> weather::database::Result<Vec<WithId<WeatherPoint>>> {
        queries::point::get_all(&self.pool).await
    }

    async fn points_by_coordinate(
        &mut self,
        coordinate: &Coordinate,
    ) -> weather::database::Result<Vec<WithId<WeatherPoint>>> {
        queries::point::get_by_coordinate(&self.pool, coordinate).await
    }

    async fn insert_point_if_absent(
        &mut self,
        id: Option<Id<WeatherPoint>>,
        point: &NewWeatherPoint,
    ) -> weather::database::Result<Option<Id<WeatherPoint>>> {
        // The conflict check and the writes have to share one transaction
        // even on the autocommit handle.
        let mut tx = self.pool.begin().await.map_err(convert_error)?;
        let inserted = queries::point::insert_if_absent(
            &mut tx,
            id.map(|id| id.raw()),
            point,
        )
        .await?;
        if inserted.is_some() {
            tx.commit().await.map_err(convert_error)?;
        }
        Ok(inserted.map(Id::new))
    }

    async fn delete_all(&mut self) -> weather::database::Result<u64> {
        queries::point::delete_all(&self.pool).await
    }

    async fn delete_by_range(
        &mut self,
        range: DateRange,
        coordinate: &Coordinate,
    ) -> weather::database::Result<u64> {
        queries::point::delete_by_range(&self.pool, range, coordinate).await
    }
}
