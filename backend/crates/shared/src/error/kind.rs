//! Error Kind - Classification of errors
//!
//! Defines the [`ErrorKind`] enum that maps to HTTP status codes.

use serde::Serialize;

/// エラー種別の列挙体
///
/// HTTP ステータスコードに対応するエラー分類を定義します。
/// 各バリアントは既定の `errorCode`（機械可読な安定コード）も持ちます。
///
/// ## Examples
/// ```rust
/// use kernel::error::kind::ErrorKind;
///
/// let kind = ErrorKind::PreconditionFailed;
/// assert_eq!(kind.status_code(), 412);
/// assert_eq!(kind.as_str(), "Precondition Failed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorKind {
    /// 400 - Bad Request: リクエストが不正
    BadRequest,
    /// 401 - Unauthorized: 認証が必要
    Unauthorized,
    /// 403 - Forbidden: アクセス権限なし
    Forbidden,
    /// 404 - Not Found: リソースが見つからない
    NotFound,
    /// 409 - Conflict: 現在の状態と競合
    Conflict,
    /// 412 - Precondition Failed: 使用済みの署名付きリクエスト
    PreconditionFailed,
    /// 422 - Unprocessable Entity: 処理不可能なエンティティ
    UnprocessableEntity,
    /// 429 - Too Many Requests: レート制限超過
    TooManyRequests,
    /// 500 - Internal Server Error: サーバー内部エラー
    InternalServerError,
    /// 503 - Service Unavailable: サービス利用不可
    ServiceUnavailable,
}

impl ErrorKind {
    /// HTTP ステータスコードを取得
    #[inline]
    pub const fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::UnprocessableEntity => 422,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::InternalServerError => 500,
            ErrorKind::ServiceUnavailable => 503,
        }
    }

    /// HTTP ステータスの標準的な理由フレーズ
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::PreconditionFailed => "Precondition Failed",
            ErrorKind::UnprocessableEntity => "Unprocessable Entity",
            ErrorKind::TooManyRequests => "Too Many Requests",
            ErrorKind::InternalServerError => "Internal Server Error",
            ErrorKind::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// 既定の `errorCode`
    ///
    /// [`crate::error::app_error::AppError::with_code`] で上書きされない場合に使われます。
    #[inline]
    pub const fn default_code(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::UnprocessableEntity => "unprocessable_entity",
            ErrorKind::TooManyRequests => "rate_limited",
            ErrorKind::InternalServerError => "internal_error",
            ErrorKind::ServiceUnavailable => "service_unavailable",
        }
    }

    /// 5xx系のエラーは `true` を返します。これらはログに記録すべきです。
    #[inline]
    pub const fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// 4xx系のエラーは `true` を返します。
    #[inline]
    pub const fn is_client_error(&self) -> bool {
        let code = self.status_code();
        code >= 400 && code < 500
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
