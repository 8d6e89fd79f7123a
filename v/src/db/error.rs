use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("配置错误: {0}")]
    Config(String),
    #[error("连接池错误: {0}")]
    Pool(String),
    #[error("唯一约束冲突: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("SQLx 错误: {0}")]
    Sqlx(sqlx::Error),
    #[error("未找到记录")]
    NotFound,
    #[error("事务错误: {0}")]
    Tx(String),
}

impl From<sqlx::Error> for DbError {
    /// 唯一索引冲突单独归类，调用方据此做幂等恢复
    /// Unique-index violations are classified separately so callers can recover.
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DbError::UniqueViolation {
                constraint: db
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db.message().to_string()),
            },
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => DbError::Pool(e.to_string()),
            _ => DbError::Sqlx(e),
        }
    }
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// 获取详细错误描述（中英文） / Get detailed error description (CN/EN)
pub fn describe_error(e: &DbError) -> String {
    match e {
        DbError::Config(msg) => format!("配置错误 / Config error: {}", msg),
        DbError::Pool(msg) => format!("连接池错误 / Pool error: {}", msg),
        DbError::UniqueViolation { constraint } => {
            format!("唯一约束冲突 / Unique violation: {}", constraint)
        }
        DbError::Sqlx(err) => format!("SQLx 错误 / SQLx error: {}", err),
        DbError::NotFound => "未找到记录 / Record not found".to_string(),
        DbError::Tx(msg) => format!("事务错误 / Transaction error: {}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let e = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(e, DbError::NotFound));
        assert!(!e.is_unique_violation());
    }

    #[test]
    fn test_describe_unique_violation() {
        let e = DbError::UniqueViolation {
            constraint: "uk_idempotency_key".to_string(),
        };
        assert!(e.is_unique_violation());
        assert!(describe_error(&e).contains("uk_idempotency_key"));
    }
}
