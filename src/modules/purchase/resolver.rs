//! 采购明细解析：商品身份、单位换算、单价回填
//! Line resolution: product identity, unit factor, unit price fallback chain.

use chrono::NaiveDate;
use tracing::info;

use crate::comm::serde_fmt::round2;
use crate::modules::error::{ServiceError, ServiceResult};
use crate::store::{NewProduct, NewPurchaseItem, ProductRow, StoreTx};

/// 请求中的一行明细 / One requested purchase line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineInput {
    pub product_id: Option<i64>,
    pub product_name: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub amount: f64,
}

async fn resolve_product(
    tx: &mut dyn StoreTx,
    supplier_id: i64,
    line: &LineInput,
    strict: bool,
) -> ServiceResult<ProductRow> {
    let product = match line.product_id {
        Some(id) => tx
            .get_product(id)
            .await?
            .ok_or_else(|| ServiceError::ProductMissing(id.to_string()))?,
        None => {
            let name = line.product_name.trim();
            if name.is_empty() {
                return Err(ServiceError::InvalidLineItem(
                    "缺少 product_id 或 product_name".to_string(),
                ));
            }
            match tx.find_product_by_name(name).await? {
                Some(p) => p,
                None if strict => {
                    return Err(ServiceError::InvalidLineItem(format!("未知商品: {}", name)));
                }
                None => {
                    let base_unit = if line.unit.trim().is_empty() {
                        "unit".to_string()
                    } else {
                        line.unit.trim().to_string()
                    };
                    let new = NewProduct {
                        name: name.to_string(),
                        base_unit,
                        supplier_id: Some(supplier_id),
                        unit_price: 0.0,
                        status: "active".to_string(),
                    };
                    let id = tx.insert_product(&new).await?;
                    info!(product_id = id, name, "product created from purchase line");
                    ProductRow {
                        id,
                        name: new.name,
                        base_unit: new.base_unit,
                        supplier_id: new.supplier_id,
                        unit_price: new.unit_price,
                        status: new.status,
                    }
                }
            }
        }
    };

    if strict && product.supplier_id != Some(supplier_id) {
        return Err(ServiceError::InvalidSupplierProduct {
            product: product.name,
            supplier_id,
        });
    }
    Ok(product)
}

/// 解析一行明细；任何失败都会使外层事务回滚
/// Resolve one line. Any failure rolls back the surrounding transaction.
pub async fn resolve_line(
    tx: &mut dyn StoreTx,
    supplier_id: i64,
    purchase_date: NaiveDate,
    line: &LineInput,
    strict: bool,
) -> ServiceResult<NewPurchaseItem> {
    if !(line.quantity > 0.0) {
        return Err(ServiceError::InvalidLineItem(format!(
            "数量必须大于 0: {}",
            line.quantity
        )));
    }
    let product = resolve_product(tx, supplier_id, line, strict).await?;
    let param = tx.get_purchase_param(product.id).await?;

    // 单位换算：采购参数 > 单位规格 > 1
    let mut unit = line.unit.trim().to_string();
    if unit.is_empty() {
        unit = match &param {
            Some(p) => p.unit.clone(),
            None => product.base_unit.clone(),
        };
    }
    let factor = match &param {
        Some(p) if p.unit == unit => p.factor_to_base,
        _ => match tx.get_unit_spec(product.id, &unit).await? {
            Some(spec) => spec.factor_to_base,
            None => 1.0,
        },
    };

    // 单价：供应商最新价 > 采购参数价 > 商品价 > 原值
    let mut unit_price = line.unit_price;
    if unit_price <= 0.0 {
        if let Some(p) = tx
            .latest_supplier_price(supplier_id, product.id, purchase_date)
            .await?
        {
            unit_price = p;
        } else if let Some(p) = param.as_ref().filter(|p| p.purchase_price > 0.0) {
            unit_price = p.purchase_price;
        } else if product.unit_price > 0.0 {
            unit_price = product.unit_price;
        }
    }
    if !(unit_price > 0.0) {
        return Err(ServiceError::InvalidLineItem(format!(
            "商品 {} 单价无法确定",
            product.name
        )));
    }

    let amount = if line.amount > 0.0 {
        round2(line.amount)
    } else {
        round2(line.quantity * unit_price)
    };

    Ok(NewPurchaseItem {
        product_id: product.id,
        product_name: product.name,
        unit,
        quantity: line.quantity,
        unit_price,
        amount,
        quantity_base: line.quantity * factor,
    })
}
