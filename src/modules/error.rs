//! 核心业务错误
//! Typed failures raised by the payables core, mapped onto HTTP classes at the edge.

use thiserror::Error;
use v::db::error::{describe_error, DbError};

use crate::error::AppError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("采购明细无效: {0}")]
    InvalidLineItem(String),

    #[error("商品 {product} 不属于供应商 {supplier_id}")]
    InvalidSupplierProduct { product: String, supplier_id: i64 },

    #[error("金额无效: {0}")]
    InvalidAmount(String),

    #[error("付款金额 {amount:.2} 超过剩余应付 {remaining:.2}")]
    Overpayment { amount: f64, remaining: f64 },

    #[error("币种不一致: 应付为 {expected}，采购为 {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("已有付款的采购不可变更: {0}")]
    SettledPurchaseLocked(String),

    #[error("基地不存在: {0}")]
    BaseMissing(i64),

    #[error("供应商不存在: {0}")]
    SupplierMissing(i64),

    #[error("商品不存在: {0}")]
    ProductMissing(String),

    #[error("应付记录不存在: {0}")]
    PayableMissing(i64),

    #[error("采购记录不存在: {0}")]
    PurchaseMissing(i64),

    #[error("付款记录不存在: {0}")]
    PaymentMissing(i64),

    #[error("无权访问: {0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("操作超时: {0}")]
    Timeout(&'static str),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::InvalidLineItem(_) => "invalid-line-item",
            ServiceError::InvalidSupplierProduct { .. } => "invalid-supplier-product",
            ServiceError::InvalidAmount(_) => "invalid-amount",
            ServiceError::Overpayment { .. } => "overpayment",
            ServiceError::CurrencyMismatch { .. } => "currency-mismatch",
            ServiceError::SettledPurchaseLocked(_) => "settled-purchase-locked",
            ServiceError::BaseMissing(_) => "base-missing",
            ServiceError::SupplierMissing(_) => "supplier-missing",
            ServiceError::ProductMissing(_) => "product-missing",
            ServiceError::PayableMissing(_) => "payable-missing",
            ServiceError::PurchaseMissing(_) => "purchase-missing",
            ServiceError::PaymentMissing(_) => "payment-missing",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::BadRequest(_) => "bad-request",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Db(DbError::UniqueViolation { .. }) => "duplicate",
            ServiceError::Db(DbError::NotFound) => "not-found",
            ServiceError::Db(_) => "internal",
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, ServiceError::Db(e) if e.is_unique_violation())
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        let reason = e.reason();
        match &e {
            ServiceError::InvalidLineItem(_)
            | ServiceError::InvalidSupplierProduct { .. }
            | ServiceError::InvalidAmount(_)
            | ServiceError::Overpayment { .. }
            | ServiceError::BadRequest(_) => AppError::bad_request(reason, e.to_string()),
            ServiceError::Forbidden(_) | ServiceError::SettledPurchaseLocked(_) => {
                AppError::forbidden(reason, e.to_string())
            }
            ServiceError::BaseMissing(_)
            | ServiceError::SupplierMissing(_)
            | ServiceError::ProductMissing(_)
            | ServiceError::PayableMissing(_)
            | ServiceError::PurchaseMissing(_)
            | ServiceError::PaymentMissing(_)
            | ServiceError::Db(DbError::NotFound) => AppError::not_found(reason, e.to_string()),
            ServiceError::CurrencyMismatch { .. } | ServiceError::Db(DbError::UniqueViolation { .. }) => {
                AppError::conflict(reason, e.to_string())
            }
            ServiceError::Timeout(_) => AppError::Internal {
                reason: reason.to_string(),
                message: e.to_string(),
            },
            ServiceError::Db(db) => AppError::internal(describe_error(db)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_taxonomy_mapping() {
        let cases: Vec<(ServiceError, StatusCode, &str)> = vec![
            (
                ServiceError::Overpayment {
                    amount: 150.0,
                    remaining: 100.0,
                },
                StatusCode::BAD_REQUEST,
                "overpayment",
            ),
            (
                ServiceError::InvalidLineItem("qty".into()),
                StatusCode::BAD_REQUEST,
                "invalid-line-item",
            ),
            (
                ServiceError::SettledPurchaseLocked("p".into()),
                StatusCode::FORBIDDEN,
                "settled-purchase-locked",
            ),
            (ServiceError::PayableMissing(9), StatusCode::NOT_FOUND, "payable-missing"),
            (
                ServiceError::CurrencyMismatch {
                    expected: "CNY".into(),
                    actual: "THB".into(),
                },
                StatusCode::CONFLICT,
                "currency-mismatch",
            ),
            (
                ServiceError::Db(DbError::UniqueViolation {
                    constraint: "uk_products_name".into(),
                }),
                StatusCode::CONFLICT,
                "duplicate",
            ),
            (
                ServiceError::Db(DbError::Pool("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];
        for (err, status, reason) in cases {
            let app: AppError = err.into();
            assert_eq!(app.http_status(), status);
            assert_eq!(app.reason(), reason);
        }
    }

    #[test]
    fn test_overpayment_message_formats_money() {
        let e = ServiceError::Overpayment {
            amount: 150.0,
            remaining: 100.0,
        };
        assert!(e.to_string().contains("150.00"));
        assert!(e.to_string().contains("100.00"));
    }
}
