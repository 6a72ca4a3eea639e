use std::error::Error;

pub mod database;
pub mod memory;
pub mod service;
pub mod validator;

use validator::ValidationErrors;

/// Failure modes of the query/erase service, mapped to HTTP statuses by the
/// web layer.
#[derive(Debug)]
pub enum RequestError {
    /// The inbound payload failed shape/type validation. Carries one message
    /// list per offending field.
    Validation(ValidationErrors),
    /// Query parameters for list/erase were malformed.
    InvalidFilter(&'static str),
    /// An insert supplied an id that is already taken.
    Conflict,
    /// A coordinate-filtered list matched nothing.
    NotFound,
    /// The store failed; the active transaction was rolled back.
    Store(Box<dyn Error + Send + Sync>),
}

impl From<database::DatabaseError> for RequestError {
    fn from(value: database::DatabaseError) -> Self {
        match value {
            database::DatabaseError::NotFound => Self::NotFound,
            database::DatabaseError::Other(why) => Self::Store(why),
        }
    }
}

pub type RequestResult<O> = Result<O, RequestError>;
