//! 事务收尾与超时控制
//! Transaction completion and per-mutation deadlines.

use std::future::Future;
use std::time::Duration;

use crate::modules::error::{ServiceError, ServiceResult};
use crate::store::StoreTx;

/// 核心写路径的运行参数 / Runtime knobs of the write paths
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// 采购明细的商品必须属于该供应商
    pub strict_product_supplier: bool,
    pub mutation_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            strict_product_supplier: false,
            mutation_timeout: Duration::from_secs(5),
        }
    }
}

/// 成功则提交，失败则回滚并返回原错误
/// Commit on success; roll back and surface the original error otherwise.
pub async fn finish<T>(mut tx: Box<dyn StoreTx>, result: ServiceResult<T>) -> ServiceResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                tracing::warn!(error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}

/// 超时即丢弃 future，未提交的事务随之回滚
/// On expiry the future is dropped, and with it the uncommitted transaction.
pub async fn with_timeout<T, F>(limit: Duration, op: &'static str, fut: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(op, timeout_ms = limit.as_millis() as u64, "mutation timed out");
            Err(ServiceError::Timeout(op))
        }
    }
}
