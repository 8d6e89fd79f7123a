use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// 统一的应用错误类型（对外的 HTTP 错误分类）
/// HTTP-facing error: six classes, each carrying a kebab-case reason code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] v::ConfigError),

    #[error("{message}")]
    BadRequest { reason: String, message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    Forbidden { reason: String, message: String },

    #[error("{message}")]
    NotFound { reason: String, message: String },

    #[error("{message}")]
    Conflict { reason: String, message: String },

    #[error("内部错误: {message}")]
    Internal { reason: String, message: String },
}

impl AppError {
    /// 创建请求错误
    pub fn bad_request<R: Into<String>, M: Into<String>>(reason: R, message: M) -> Self {
        Self::BadRequest {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// 创建认证错误
    pub fn unauthorized<M: Into<String>>(message: M) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// 创建权限错误
    pub fn forbidden<R: Into<String>, M: Into<String>>(reason: R, message: M) -> Self {
        Self::Forbidden {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found<R: Into<String>, M: Into<String>>(reason: R, message: M) -> Self {
        Self::NotFound {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// 创建冲突错误
    pub fn conflict<R: Into<String>, M: Into<String>>(reason: R, message: M) -> Self {
        Self::Conflict {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            reason: "internal".to_string(),
            message: message.into(),
        }
    }

    /// 机器可读的原因码 / Machine readable reason code
    pub fn reason(&self) -> &str {
        match self {
            AppError::Config(_) => "config",
            AppError::Unauthorized { .. } => "unauthorised",
            AppError::BadRequest { reason, .. }
            | AppError::Forbidden { reason, .. }
            | AppError::NotFound { reason, .. }
            | AppError::Conflict { reason, .. }
            | AppError::Internal { reason, .. } => reason,
        }
    }

    /// 获取HTTP状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::internal(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.http_status();
        let message = self.to_string();

        // 记录错误日志
        if status.is_server_error() {
            tracing::error!(reason = self.reason(), "Internal error: {}", message);
        } else {
            tracing::info!(reason = self.reason(), "Client error: {}", message);
        }

        HttpResponse::build(status).json(json!({
            "success": false,
            "error": {
                "code": status.as_u16(),
                "reason": self.reason(),
                "message": message,
            },
            "timestamp": crate::comm::serde_fmt::format_datetime(&chrono::Local::now().naive_local())
        }))
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 成功响应结构
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: crate::comm::serde_fmt::format_datetime(&chrono::Local::now().naive_local()),
        }
    }
}

/// 便捷宏：创建API成功响应
#[macro_export]
macro_rules! api_success {
    ($data:expr) => {
        Ok(actix_web::web::Json($crate::error::ApiResponse::success($data)))
    };
}

/// 畸形 JSON / 查询串统一映射为 bad-request
/// Malformed JSON bodies and query strings become `bad-request`.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    AppError::bad_request("bad-request", format!("请求体格式错误: {}", err)).into()
}

pub fn query_error_handler(
    err: actix_web::error::QueryPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    AppError::bad_request("bad-request", format!("查询参数错误: {}", err)).into()
}
