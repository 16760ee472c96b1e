use crate::error::AppError;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub type ValidationError = Custom<Json<ValidationResponse>>;

pub trait ToValidationResponse {
    fn to_validation_response(self) -> ValidationError;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> ValidationError {
        self.log_and_record("API Validation Error");
        let status = self.status_code();

        let field = match &self {
            AppError::Database(_) | AppError::Internal(_) => "server",
            AppError::Authentication(_) => "authentication",
            AppError::Authorization(_) => "permission",
            AppError::NotFound(_) | AppError::Conflict(_) => "resource",
            AppError::Validation(_) => "validation",
        };

        Custom(
            status,
            Json(ValidationResponse::with_error(field, &self.public_message())),
        )
    }
}

impl ToValidationResponse for Status {
    #[instrument]
    fn to_validation_response(self) -> ValidationError {
        let (field, message) = match self.code {
            c if c == Status::Forbidden.code => (
                "permission",
                "You don't have permission to perform this action",
            ),
            c if c == Status::Unauthorized.code => ("authentication", "Authentication required"),
            c if c == Status::NotFound.code => ("resource", "Resource not found"),
            c if c == Status::Conflict.code => ("resource", "Resource already exists"),
            c if c == Status::BadRequest.code => ("request", "Bad request"),
            c if c == Status::UnprocessableEntity.code => ("validation", "Validation failed"),
            c if c == Status::InternalServerError.code => ("server", "Internal server error"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

impl ToValidationResponse for validator::ValidationErrors {
    #[instrument]
    fn to_validation_response(self) -> ValidationError {
        let mut error_map = HashMap::new();

        for (field, field_errors) in self.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        tracing::warn!(fields = ?error_map.keys().collect::<Vec<_>>(), "Request body failed validation");

        Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::new(error_map)),
        )
    }
}

/// Unwraps a JSON body after running its `validator` rules.
pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, ValidationError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ValidationError> {
        let inner = self.into_inner();
        inner
            .validate()
            .map_err(ToValidationResponse::to_validation_response)?;
        Ok(inner)
    }
}

/// Turns a domain error into a validation-style response.
pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, ValidationError>;
}

impl<T, E: Into<AppError>> AppErrorExt<T> for Result<T, E> {
    fn validate_custom(self) -> Result<T, ValidationError> {
        self.map_err(|err| {
            let err: AppError = err.into();
            err.to_validation_response()
        })
    }
}
