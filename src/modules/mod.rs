/// 模块管理
/// 包含所有业务模块的定义和导出
pub mod base;
pub mod error;
pub mod payable;
pub mod payment;
pub mod purchase;
pub mod rollup;
pub mod tx;
