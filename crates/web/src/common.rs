use axum::{
    extract::{OriginalUri, Query, Request},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::MethodFilter,
    Json,
};
use model::ExampleData;
use schemars::{schema_for, schema_for_value, JsonSchema};
use serde::{Deserialize, Serialize};
use weather::{validator::ValidationErrors, RequestError};

pub type RouteResult<O> = Result<O, RouteErrorResponse>;

/// A `MethodFilter` that matches all http methods.
pub(crate) const METHOD_FILTER_ALL: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PATCH)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE);

// - Services returning commonly used responses -

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SchemaParams {
    #[serde(default = "Default::default")]
    example_data: bool,
}

pub(crate) async fn schema<T: ExampleData + JsonSchema + Serialize>(
    Query(params): Query<SchemaParams>,
) -> impl IntoResponse {
    if params.example_data {
        Json(schema_for_value!(T::example_data()))
    } else {
        Json(schema_for!(T))
    }
}

pub(crate) async fn route_not_found(
    OriginalUri(original_uri): OriginalUri,
    req: Request,
) -> impl IntoResponse {
    RouteErrorResponse::not_found(req.method(), original_uri.path())
}

// - Commonly used responses -

#[derive(Debug, Clone, Serialize)]
pub struct RouteErrorResponse {
    #[serde(skip)]
    pub status_code: StatusCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_uri: Option<String>,
}

impl RouteErrorResponse {
    pub fn new(status_code: StatusCode) -> Self {
        Self {
            status_code,
            status: None,
            message: None,
            errors: None,
            http_method: None,
            requested_uri: None,
        }
    }

    pub fn not_found(method: &Method, uri: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND)
            .with_method(method)
            .with_uri(uri)
            .with_default_message()
    }

    /// The `{"status":"error"}` body the insert path answers with when the
    /// store, rather than the payload, is at fault.
    pub fn insert_failed() -> Self {
        Self::new(StatusCode::BAD_REQUEST).with_status("error")
    }

    pub fn with_status(mut self, status: &'static str) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_method(mut self, method: &Method) -> Self {
        self.http_method = Some(method.to_string());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.requested_uri = Some(uri.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_default_message(self) -> Self {
        let message = self
            .status_code
            .canonical_reason()
            .unwrap_or("i dunno what happened here :/");
        self.with_message(message)
    }

    pub fn with_errors(mut self, errors: ValidationErrors) -> Self {
        self.errors = Some(errors);
        self
    }
}

impl From<RequestError> for RouteErrorResponse {
    fn from(value: RequestError) -> Self {
        match value {
            RequestError::Validation(errors) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY).with_errors(errors)
            }
            RequestError::InvalidFilter(message) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY)
                    .with_message(message)
            }
            RequestError::NotFound => {
                Self::new(StatusCode::NOT_FOUND).with_message("No data found")
            }
            RequestError::Conflict => Self::insert_failed(),
            RequestError::Store(why) => {
                log::error!("Store failure: {}", why);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_default_message()
            }
        }
    }
}

impl IntoResponse for RouteErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self)).into_response()
    }
}
