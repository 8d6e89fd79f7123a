//! 基地范围授权
//! Base scoping: admins see every base, base agents only the bases named in their claims.

use crate::auth::Claims;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::store::StoreTx;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_BASE_AGENT: &str = "base_agent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    All,
    /// 未解析的基地名称 / base names, resolved per transaction
    Bases(Vec<String>),
}

impl AccessScope {
    pub fn from_claims(claims: &Claims) -> Self {
        if claims.role == ROLE_ADMIN {
            AccessScope::All
        } else {
            AccessScope::Bases(claims.bases.clone())
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AccessScope::All)
    }

    pub fn require_admin(&self) -> ServiceResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("需要管理员权限 / admin only".to_string()))
        }
    }

    /// None 表示不限 / None means unrestricted
    pub async fn allowed_base_ids(&self, tx: &mut dyn StoreTx) -> ServiceResult<Option<Vec<i64>>> {
        match self {
            AccessScope::All => Ok(None),
            AccessScope::Bases(names) => Ok(Some(tx.base_ids_by_names(names).await?)),
        }
    }

    pub async fn ensure_base(&self, tx: &mut dyn StoreTx, base_id: i64) -> ServiceResult<()> {
        match self.allowed_base_ids(tx).await? {
            None => Ok(()),
            Some(ids) if ids.contains(&base_id) => Ok(()),
            Some(_) => Err(ServiceError::Forbidden(format!("基地 {} 不在授权范围内", base_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};

    fn claims(role: &str, bases: &[&str]) -> Claims {
        Claims {
            uid: 1,
            role: role.to_string(),
            bases: bases.iter().map(|s| s.to_string()).collect(),
            exp: 0,
        }
    }

    #[tokio::test]
    async fn test_agent_scope_resolves_base_names() {
        let store = MemoryStore::new();
        let vte = store.add_base("Vientiane", "VTE", "CNY").await;
        let lpq = store.add_base("Luang", "LPQ", "CNY").await;

        let scope = AccessScope::from_claims(&claims(ROLE_BASE_AGENT, &["Vientiane"]));
        let mut tx = store.begin().await.unwrap();
        assert_eq!(scope.allowed_base_ids(tx.as_mut()).await.unwrap(), Some(vec![vte]));
        assert!(scope.ensure_base(tx.as_mut(), vte).await.is_ok());
        assert!(matches!(
            scope.ensure_base(tx.as_mut(), lpq).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(scope.require_admin().is_err());
    }

    #[tokio::test]
    async fn test_admin_scope_is_unrestricted() {
        let store = MemoryStore::new();
        let scope = AccessScope::from_claims(&claims(ROLE_ADMIN, &[]));
        let mut tx = store.begin().await.unwrap();
        assert_eq!(scope.allowed_base_ids(tx.as_mut()).await.unwrap(), None);
        assert!(scope.ensure_base(tx.as_mut(), 42).await.is_ok());
        assert!(scope.require_admin().is_ok());
    }
}
