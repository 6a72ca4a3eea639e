use weather::database::DatabaseError;

pub mod point;

pub(crate) fn convert_error(why: sqlx::Error) -> DatabaseError {
    match why {
        sqlx::Error::RowNotFound => DatabaseError::NotFound,
        _ => DatabaseError::Other(Box::new(why)),
    }
}
