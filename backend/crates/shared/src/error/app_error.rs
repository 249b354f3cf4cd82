//! Application Error - Unified error type for the application
//!
//! Defines [`AppError`] struct and [`AppResult<T>`] type alias.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use super::kind::ErrorKind;

/// アプリケーション統一エラー型
///
/// クライアントに返すエラーは必ずこの型を経由します。
///
/// ## Fields
/// * `kind` - エラーの分類（HTTP ステータスコードにマッピング）
/// * `code` - 機械可読な安定コード（`errorCode`）
/// * `message` - ユーザー向けのエラーメッセージ
/// * `source` - 元のエラー（ログ専用、レスポンスには含めない）
///
/// ## Examples
/// ```rust
/// use kernel::error::{app_error::AppError, kind::ErrorKind};
///
/// let err = AppError::new(ErrorKind::PreconditionFailed, "Request already used")
///     .with_code("request_already_used");
/// assert_eq!(err.code(), "request_already_used");
/// assert_eq!(err.status_code(), 412);
/// ```
pub struct AppError {
    kind: ErrorKind,
    code: Option<Cow<'static, str>>,
    message: Cow<'static, str>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// `Result<T, AppError>` の省略形
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    // ========================================================================
    // Constructors
    // ========================================================================

    #[inline]
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// 400 Bad Request エラー
    #[inline]
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// 401 Unauthorized エラー
    #[inline]
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// 404 Not Found エラー
    #[inline]
    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// 409 Conflict エラー
    #[inline]
    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// 500 Internal Server Error
    #[inline]
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InternalServerError, message)
    }

    /// 503 Service Unavailable エラー
    #[inline]
    pub fn service_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// `errorCode` を上書き
    #[inline]
    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// 元のエラーを設定（デバッグ用）
    #[inline]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// `errorCode` を取得（未設定の場合は種別の既定値）
    #[inline]
    pub fn code(&self) -> &str {
        self.code
            .as_deref()
            .unwrap_or_else(|| self.kind.default_code())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn is_server_error(&self) -> bool {
        self.kind.is_server_error()
    }

    /// レスポンスボディ用の JSON
    ///
    /// `source` は含めません。
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "errorCode": self.code(),
            "status": self.status_code(),
            "message": self.message(),
        })
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("AppError");
        builder.field("kind", &self.kind);
        builder.field("code", &self.code());
        builder.field("message", &self.message);
        if let Some(source) = &self.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.code(), self.message)
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_error() {
        let err = AppError::new(ErrorKind::NotFound, "Identity not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.message(), "Identity not found");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_with_code_overrides_default() {
        let err = AppError::unauthorized("Signature mismatch").with_code("invalid_signature");
        assert_eq!(err.code(), "invalid_signature");
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = AppError::service_unavailable("Store unavailable").with_source(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_body_has_no_source_detail() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "pg: connection refused");
        let err = AppError::service_unavailable("Authentication backend unavailable")
            .with_code("auth_backend_unavailable")
            .with_source(io_err);

        let body = err.to_body();
        assert_eq!(body["errorCode"], "auth_backend_unavailable");
        assert_eq!(body["status"], 503);
        assert!(!body.to_string().contains("connection refused"));
    }

    #[test]
    fn test_display() {
        let err = AppError::conflict("Email already registered");
        assert_eq!(err.to_string(), "[Conflict] conflict: Email already registered");
    }
}
