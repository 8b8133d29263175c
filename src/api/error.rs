use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ImportError, RecognitionError};

/// 接口层错误, 统一转换为 JSON 响应
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("missing or invalid x-shop-id header")]
    MissingShop,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Import(e) => match e {
                ImportError::Parse(_)
                | ImportError::MissingRequiredMapping(_)
                | ImportError::NoValidRows { .. }
                | ImportError::UnknownTargetField(_)
                | ImportError::UnknownSourceColumn(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ImportError::InsertFailure(_) => StatusCode::BAD_GATEWAY,
                ImportError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                ImportError::ImportInProgress(_) => StatusCode::CONFLICT,
                ImportError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Recognition(RecognitionError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Recognition(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MissingShop | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Import(e) => e.kind(),
            ApiError::Recognition(_) => "recognition_error",
            ApiError::Database(_) => "database_error",
            ApiError::Export(_) => "export_error",
            ApiError::MissingShop => "missing_shop",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let missing_fields = match &self {
            ApiError::Import(ImportError::MissingRequiredMapping(fields)) => Some(fields.clone()),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            kind: self.kind(),
            message: self.to_string(),
            missing_fields,
        };
        (status, Json(body)).into_response()
    }
}
