//! Request error taxonomy (C10).
//!
//! Every variant maps to a 3-tuple `(numericCode, log-level, userMessage)`
//! consumed by `IntoResponse` (the HTTP error "middleware" in spec terms) and
//! by the per-file batch-upload result entries, which only ever need the
//! message half of the tuple.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("参数错误")]
    ParamError,
    #[error("存储桶不存在")]
    BucketNotFound,
    #[error("资源不存在")]
    ResourceNotExists,
    #[error("路径不是目录")]
    PathIsNotDir,
    #[error("文件大小超限")]
    FileSizeExceed,
    #[error("文件不是图片")]
    FileNotImage,
    #[error("文件已存在")]
    FileAlreadyExists,
    #[error("文件上传失败")]
    UploadFile,
    #[error("没有权限")]
    NoPermission,
    #[error("系统异常，请稍后重试")]
    ServerError,
    #[error("路由不存在")]
    RouteNotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogLevel {
    Info,
    Warn,
    Error,
}

impl AppError {
    /// The `(numericCode, log-level, userMessage)` triple from spec §7.
    fn taxonomy(&self) -> (u32, LogLevel) {
        match self {
            AppError::ParamError => (200501, LogLevel::Info),
            AppError::BucketNotFound => (200508, LogLevel::Info),
            AppError::ResourceNotExists => (200505, LogLevel::Info),
            AppError::PathIsNotDir => (200501, LogLevel::Info),
            AppError::FileSizeExceed => (200503, LogLevel::Info),
            AppError::FileNotImage => (200504, LogLevel::Info),
            AppError::FileAlreadyExists => (200502, LogLevel::Info),
            AppError::UploadFile => (200502, LogLevel::Warn),
            AppError::NoPermission => (200506, LogLevel::Warn),
            AppError::ServerError => (200500, LogLevel::Error),
            AppError::RouteNotFound => (200404, LogLevel::Warn),
        }
    }

    pub fn code(&self) -> u32 {
        self.taxonomy().0
    }

    /// HTTP status. Only router-level not-found carries a non-200 status;
    /// every other business error — including `/file` 404s, which the
    /// handler maps directly rather than routing through here — is a 200
    /// envelope.
    fn http_status(&self) -> StatusCode {
        match self {
            AppError::RouteNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::OK,
        }
    }

    fn log(&self) {
        let (code, level) = self.taxonomy();
        match level {
            LogLevel::Info => info!(code, error = %self, "request error"),
            LogLevel::Warn => warn!(code, error = %self, "request error"),
            LogLevel::Error => error!(code, error = %self, "request error"),
        }
    }

    /// Renders this error as a genuine HTTP 404, regardless of its normal
    /// envelope status. `GET /api/file` uses this for `ResourceNotExists`
    /// (a missing object or an undecodable thumbnail source) since an
    /// `<img>` consumer needs a router-level 404, not a 200 envelope.
    pub fn into_not_found_response(self) -> Response {
        self.log();
        let (code, _) = self.taxonomy();
        let body = Json(json!({
            "code": code,
            "msg": self.to_string(),
            "data": null,
        }));
        (StatusCode::NOT_FOUND, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let (code, _) = self.taxonomy();
        let body = Json(json!({
            "code": code,
            "msg": self.to_string(),
            "data": null,
        }));
        (self.http_status(), body).into_response()
    }
}

/// Unrecognised IO errors convert to the catch-all taxonomy entry. Logged at
/// error level and swallowed — never propagated as a panic.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::ResourceNotExists
        } else {
            error!(%err, "unrecognised IO error");
            AppError::ServerError
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(%err, "unrecognised error");
        AppError::ServerError
    }
}
