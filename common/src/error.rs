use actix_web::{http::StatusCode, HttpResponse};
use serde_json::json;

#[derive(Debug)]
pub struct ServiceError {
    pub code: u16,
    err: anyhow::Error,
}

/// Attaches an HTTP status to an error: `anyhow!("No blog found").code(404)`.
pub trait AddCode {
    fn code(self, code: u16) -> ServiceError;
}

impl AddCode for anyhow::Error {
    fn code(self, code: u16) -> ServiceError {
        ServiceError { code, err: self }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl<E: Into<anyhow::Error>> From<E> for ServiceError {
    fn from(err: E) -> ServiceError {
        ServiceError {
            code: 500,
            err: err.into(),
        }
    }
}

impl actix_web::error::ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        // Storage and other internal failures are logged in full but leave
        // the process as an opaque 500.
        if self.code >= 500 {
            log::error!("internal error: {:?}", self.err);
            HttpResponse::build(self.status_code()).json(json!({"error": "internal server error"}))
        } else {
            HttpResponse::build(self.status_code()).json(json!({"error": self.err.to_string()}))
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
