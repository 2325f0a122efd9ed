use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
// The actual error type from pool.get().await
use diesel_async::pooled_connection::bb8::RunError as BB8RunError;
use serde_json::json;
use std::fmt;

/// Name of the partial unique index that allows a single open focus session.
pub const SINGLE_OPEN_FOCUS_INDEX: &str = "focus_sessions_single_open";

#[derive(Debug)]
pub enum ServiceError {
    InternalServerError(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(String), // already formatted for the client
    NotFound(String),
    PoolError(String), // already formatted for the client
}

impl ServiceError {
    fn from_diesel_error(error: DieselError) -> ServiceError {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)
                if info.constraint_name() == Some(SINGLE_OPEN_FOCUS_INDEX) =>
            {
                log::warn!("Rejected second open focus session: {}", info.message());
                ServiceError::Conflict("Another focus session is already active".to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                log::warn!("Foreign key violation: {}", info.message());
                ServiceError::NotFound("A referenced record does not exist.".to_string())
            }
            DieselError::DatabaseError(kind, info) => {
                let detailed_message =
                    format!("Database error: {:?} - Info: {}", kind, info.message());
                log::error!("Internal Database Error: {}", detailed_message);
                ServiceError::DatabaseError("A database operation failed.".to_string())
            }
            DieselError::NotFound => {
                ServiceError::NotFound("The requested record was not found.".to_string())
            }
            err => {
                log::error!("Unexpected Diesel error: {}", err);
                ServiceError::DatabaseError("An unexpected database error occurred.".to_string())
            }
        }
    }

    fn from_pool_error(error: PoolError) -> ServiceError {
        log::error!("Pool error: {:?}", error);
        ServiceError::PoolError("Could not connect to the database pool.".to_string())
    }

    fn from_bb8_run_error(error: BB8RunError) -> ServiceError {
        log::error!("BB8 connection pool error: {:?}", error);
        ServiceError::PoolError("Could not obtain connection from database pool.".to_string())
    }
}

impl From<DieselError> for ServiceError {
    fn from(error: DieselError) -> ServiceError {
        ServiceError::from_diesel_error(error)
    }
}

impl From<PoolError> for ServiceError {
    fn from(error: PoolError) -> ServiceError {
        ServiceError::from_pool_error(error)
    }
}

impl From<BB8RunError> for ServiceError {
    fn from(error: BB8RunError) -> ServiceError {
        ServiceError::from_bb8_run_error(error)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServiceError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ServiceError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ServiceError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ServiceError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            ServiceError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ServiceError::PoolError(msg) => write!(f, "Pool Error: {}", msg),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match *self {
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::PoolError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        // Details of 5xx errors are logged where they are converted; the client
        // only gets a generic message.
        let user_facing_message = match status_code.as_u16() < 500 {
            true => self.to_string(),
            false => "An internal server error occurred. Please try again later.".to_string(),
        };

        if status_code.is_server_error() {
            log::error!(
                "Responding with server error ({}): {}",
                status_code,
                user_facing_message
            );
        } else {
            log::warn!(
                "Responding with client error ({}): {}",
                status_code,
                user_facing_message
            );
        }

        HttpResponse::build(status_code).json(json!({
            "status": "error",
            "statusCode": status_code.as_u16(),
            "message": user_facing_message
        }))
    }
}

// Extractor failures would otherwise surface as actix's plain-text 400/404.

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        ServiceError::BadRequest(format!("Invalid JSON payload: {}", err)).into()
    })
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        ServiceError::BadRequest(format!("Invalid identifier: {}", err)).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        ServiceError::BadRequest(format!("Invalid query string: {}", err)).into()
    })
}
