/// 采购模块：明细解析与写路径编排
pub mod resolver;
pub mod routes;
pub mod service;

pub fn register_purchase_routes() {
    crate::register_route!("purchase", "采购增删改查", "purchase", routes::configure);
}
