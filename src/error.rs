use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, info};

/// Failures that reach a client. Anything unexpected is carried in `Internal`.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Model not trained yet")]
    ModelNotTrained,

    #[error("{0} not loaded")]
    DataNotLoaded(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ModelNotTrained | ServiceError::DataNotLoaded(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("{self:?}");
        } else {
            info!("rejected request: {self}");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

/// Checks that `value` lies in `min..=max`, naming the field in the error.
pub fn ensure_range<T>(field: &str, value: T, min: T, max: T) -> Result<T, ServiceError>
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if !(value >= min && value <= max) {
        return Err(ServiceError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::ModelNotTrained.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::DataNotLoaded("Stops data").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::NotFound("nothing".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Validation("bad".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ensure_range() {
        assert_eq!(ensure_range("hour", 23, 0, 23).ok(), Some(23));

        let err = ensure_range("hour", 24, 0, 23).unwrap_err();
        assert_eq!(err.to_string(), "hour must be between 0 and 23, got 24");

        assert!(ensure_range("occupancy", 1.5, 0.0, 1.0).is_err());
        assert!(ensure_range("occupancy", f64::NAN, 0.0, 1.0).is_err());
    }
}
