/// 付款模块
pub mod applicator;
pub mod routes;

pub fn register_payment_routes() {
    crate::register_route!("payment", "付款登记与删除", "payment", routes::configure);
}
