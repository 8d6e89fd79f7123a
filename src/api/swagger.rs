use utoipa::OpenApi;

use crate::modules::base::controller::admin::login;
use crate::modules::{base, payable, payment, purchase, rollup};

/// OpenAPI 文档聚合
#[derive(OpenApi)]
#[openapi(
    info(title = "vgo-backoffice", description = "多基地后台应付账款与结算接口"),
    paths(
        base::routes::health,
        login::login,
        login::seed_admin,
        purchase::routes::create,
        purchase::routes::update,
        purchase::routes::delete,
        purchase::routes::batch_delete,
        purchase::routes::detail,
        payable::routes::list,
        payable::routes::detail,
        payable::routes::update_status,
        payment::routes::create,
        payment::routes::delete,
        rollup::routes::refresh_monthly,
        rollup::routes::refresh_monthly_range,
    ),
    components(
        schemas(
            base::routes::HealthResponse,
            login::LoginRequest,
            login::LoginResponse,
            login::LoginUser,
            login::SeedAdminRequest,
            login::SeedAdminResponse,
            purchase::routes::PurchaseBody,
            purchase::routes::PurchaseItemBody,
            purchase::routes::BatchDeleteBody,
            purchase::service::PurchaseOutcome,
            purchase::service::DeleteOutcome,
            payable::routes::StatusBody,
            payment::routes::PaymentBody,
            rollup::refresher::MonthRefresh,
            crate::store::RollupCounts,
        )
    ),
    tags(
        (name = "Base", description = "健康检查"),
        (name = "Auth", description = "登录与开发种子账户"),
        (name = "Purchase", description = "采购单"),
        (name = "Payable", description = "应付账款"),
        (name = "Payment", description = "付款记录"),
        (name = "Admin", description = "月度汇总重建"),
    )
)]
pub struct ApiDoc;
