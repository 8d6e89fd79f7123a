/// 应付模块：账期分类、金额推导、分桶挂账与查询
pub mod aggregator;
pub mod amounts;
pub mod period;
pub mod routes;
pub mod service;

pub fn register_payable_routes() {
    crate::register_route!("payable", "应付查询与状态设置", "payable", routes::configure);
}
