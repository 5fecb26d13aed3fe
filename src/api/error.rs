// ==========================================
// 劳动力产能规划系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型, 转换仓储/策略/校验错误为调用方可理解的错误
// 红线: 每个错误必须携带显式原因; 请求形态错误附带修正提示
// ==========================================

use crate::config::policy_store::PolicyError;
use crate::engine::ramp::RampValidationError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// ErrorKind - 与传输协议无关的错误分类
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Unprocessable,
    Conflict,
    Internal,
}

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 请求形态错误 (在任何存储访问之前)
    // ==========================================
    #[error("请求校验失败: {message}")]
    ValidationError {
        message: String,
        guidance: Option<String>,
    },

    #[error("请求格式无法处理: {0}")]
    Unprocessable(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("分配冲突: resource={resource_id}, year={year}, week={week_number}")]
    AssignmentConflict {
        resource_id: String,
        year: i32,
        week_number: u32,
    },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ValidationError { .. } | ApiError::InvalidInput(_) => ErrorKind::BadRequest,
            ApiError::Unprocessable(_) => ErrorKind::Unprocessable,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::AssignmentConflict { .. } | ApiError::BusinessRuleViolation(_) => {
                ErrorKind::Conflict
            }
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_)
            | ApiError::InternalError(_)
            | ApiError::Other(_) => ErrorKind::Internal,
        }
    }

    /// 修正提示 (仅请求形态错误)
    pub fn guidance(&self) -> Option<&str> {
        match self {
            ApiError::ValidationError { guidance, .. } => guidance.as_deref(),
            _ => None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            guidance: None,
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::AssignmentConflict {
                resource_id,
                year,
                week_number,
            } => ApiError::AssignmentConflict {
                resource_id,
                year,
                week_number,
            },
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
        }
    }
}

// ==========================================
// 从 PolicyError 转换
// ==========================================
impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::NotFound(key) => ApiError::NotFound(format!("策略{}不存在", key)),
            PolicyError::TypeMismatch { .. } => ApiError::InvalidInput(err.to_string()),
            PolicyError::CorruptValue { .. } => ApiError::InternalError(err.to_string()),
            PolicyError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            PolicyError::Database(e) => ApiError::DatabaseError(e.to_string()),
        }
    }
}

// ==========================================
// 从 RampValidationError 转换
// ==========================================
impl From<RampValidationError> for ApiError {
    fn from(err: RampValidationError) -> Self {
        match err {
            RampValidationError::MalformedMonthKey(_) => ApiError::Unprocessable(match err.guidance() {
                Some(hint) => format!("{} ({})", err, hint),
                None => err.to_string(),
            }),
            _ => ApiError::ValidationError {
                guidance: err.guidance(),
                message: err.to_string(),
            },
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::NotFound {
            entity: "ForecastDemand".to_string(),
            id: "42".to_string(),
        }
        .into();
        match &api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("ForecastDemand"));
                assert!(msg.contains("42"));
            }
            _ => panic!("Expected NotFound"),
        }
        assert_eq!(api_err.kind(), ErrorKind::NotFound);

        let api_err: ApiError = RepositoryError::AssignmentConflict {
            resource_id: "EMP-001".to_string(),
            year: 2025,
            week_number: 15,
        }
        .into();
        assert_eq!(api_err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_ramp_validation_conversion_keeps_guidance() {
        let api_err: ApiError = RampValidationError::TotalMismatch {
            declared: 12,
            actual: 13,
        }
        .into();
        assert_eq!(api_err.kind(), ErrorKind::BadRequest);
        assert_eq!(api_err.guidance(), Some("将 total_ramp_employees 设为 13"));

        let api_err: ApiError = RampValidationError::MalformedMonthKey("2025/04".to_string()).into();
        assert_eq!(api_err.kind(), ErrorKind::Unprocessable);
    }

    #[test]
    fn test_policy_error_conversion() {
        let api_err: ApiError = PolicyError::NotFound("UNKNOWN".to_string()).into();
        assert_eq!(api_err.kind(), ErrorKind::NotFound);
    }
}
