use actix_web::{http::header::ContentType, http::StatusCode, HttpResponse, ResponseError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Model service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Model answer does not match the expected schema: {0}")]
    SchemaViolation(String),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    #[error("Tokio join error: {0}")]
    Join(#[from] JoinError),

    #[error("Invalid image name: {0:?}")]
    InvalidImageName(String),

    #[error("Not an image: {name} ({mime})")]
    NotAnImage { name: String, mime: String },

    #[error("Generic error: {0}")]
    Generic(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            AppError::SchemaViolation(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidImageName(_) => StatusCode::BAD_REQUEST,
            AppError::NotAnImage { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Generic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure of a write endpoint. Always answered with a server error status, 502 when
/// the model service is at fault and 500 otherwise.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct WriteError(#[from] pub AppError);

impl ResponseError for WriteError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self.0 {
            AppError::Transport(_)
            | AppError::UpstreamStatus { .. }
            | AppError::SchemaViolation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_message_embeds_code_and_body() {
        let err = AppError::UpstreamStatus {
            status: 404,
            body: "model 'llava' not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 404: model 'llava' not found"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn missing_file_maps_to_not_found() {
        let err = AppError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_body_is_plain_text() {
        let response = AppError::Generic("boom".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn write_errors_are_always_server_errors() {
        let not_found = WriteError(AppError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        )));
        assert_eq!(not_found.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let bad_name = WriteError(AppError::InvalidImageName("..".to_string()));
        assert_eq!(bad_name.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let not_image = WriteError(AppError::NotAnImage {
            name: "readme.txt".to_string(),
            mime: "text/plain".to_string(),
        });
        assert_eq!(not_image.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let schema = WriteError(AppError::SchemaViolation("no title".to_string()));
        assert_eq!(schema.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            schema.to_string(),
            "Model answer does not match the expected schema: no title"
        );
    }
}
