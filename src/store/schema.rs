//! MySQL 表结构（幂等建表）
//! MySQL schema, applied statement by statement with `CREATE TABLE IF NOT EXISTS`.

pub const SCHEMA: &[(&str, &str)] = &[
    (
        "bases",
        r#"CREATE TABLE IF NOT EXISTS bases (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    name VARCHAR(128) NOT NULL,
    code VARCHAR(64) NOT NULL,
    currency VARCHAR(8) NOT NULL DEFAULT 'CNY',
    UNIQUE KEY uk_bases_name (name),
    UNIQUE KEY uk_bases_code (code)
)"#,
    ),
    (
        "suppliers",
        r#"CREATE TABLE IF NOT EXISTS suppliers (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    name VARCHAR(128) NOT NULL,
    settlement_type VARCHAR(16) NULL,
    settlement_day INT NULL,
    UNIQUE KEY uk_suppliers_name (name)
)"#,
    ),
    (
        "products",
        r#"CREATE TABLE IF NOT EXISTS products (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    name VARCHAR(128) NOT NULL,
    base_unit VARCHAR(32) NOT NULL,
    supplier_id BIGINT NULL,
    unit_price DOUBLE NOT NULL DEFAULT 0,
    status VARCHAR(16) NOT NULL DEFAULT 'active',
    UNIQUE KEY uk_products_name (name)
)"#,
    ),
    (
        "product_unit_specs",
        r#"CREATE TABLE IF NOT EXISTS product_unit_specs (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    product_id BIGINT NOT NULL,
    unit VARCHAR(32) NOT NULL,
    factor_to_base DOUBLE NOT NULL,
    kind VARCHAR(16) NOT NULL DEFAULT 'both',
    is_default TINYINT(1) NOT NULL DEFAULT 0,
    UNIQUE KEY uk_unit_spec (product_id, unit)
)"#,
    ),
    (
        "product_purchase_params",
        r#"CREATE TABLE IF NOT EXISTS product_purchase_params (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    product_id BIGINT NOT NULL,
    unit VARCHAR(32) NOT NULL,
    factor_to_base DOUBLE NOT NULL,
    purchase_price DOUBLE NOT NULL DEFAULT 0,
    UNIQUE KEY uk_purchase_param (product_id)
)"#,
    ),
    (
        "supplier_product_prices",
        r#"CREATE TABLE IF NOT EXISTS supplier_product_prices (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    supplier_id BIGINT NOT NULL,
    product_id BIGINT NOT NULL,
    price DOUBLE NOT NULL,
    effective_from DATE NOT NULL,
    UNIQUE KEY uk_supplier_price (supplier_id, product_id, effective_from)
)"#,
    ),
    (
        "purchase_entries",
        r#"CREATE TABLE IF NOT EXISTS purchase_entries (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    supplier_id BIGINT NOT NULL,
    base_id BIGINT NOT NULL,
    purchase_date DATE NOT NULL,
    total_amount DOUBLE NOT NULL,
    currency VARCHAR(8) NOT NULL DEFAULT 'CNY',
    order_number VARCHAR(64) NOT NULL DEFAULT '',
    receiver VARCHAR(64) NOT NULL DEFAULT '',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    KEY idx_purchase_supplier_base_date (supplier_id, base_id, purchase_date)
)"#,
    ),
    (
        "purchase_entry_items",
        r#"CREATE TABLE IF NOT EXISTS purchase_entry_items (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    purchase_entry_id BIGINT NOT NULL,
    product_id BIGINT NOT NULL,
    product_name VARCHAR(128) NOT NULL,
    unit VARCHAR(32) NOT NULL,
    quantity DOUBLE NOT NULL,
    unit_price DOUBLE NOT NULL,
    amount DOUBLE NOT NULL,
    quantity_base DOUBLE NOT NULL,
    KEY idx_items_purchase (purchase_entry_id)
)"#,
    ),
    (
        "payable_records",
        r#"CREATE TABLE IF NOT EXISTS payable_records (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    supplier_id BIGINT NULL,
    base_id BIGINT NOT NULL,
    purchase_entry_id BIGINT NULL,
    settlement_type VARCHAR(16) NOT NULL,
    period_month VARCHAR(7) NOT NULL DEFAULT '',
    period_half VARCHAR(7) NOT NULL DEFAULT '',
    total_amount DOUBLE NOT NULL DEFAULT 0,
    paid_amount DOUBLE NOT NULL DEFAULT 0,
    remaining_amount DOUBLE NOT NULL DEFAULT 0,
    currency VARCHAR(8) NOT NULL DEFAULT 'CNY',
    status VARCHAR(16) NOT NULL DEFAULT 'pending',
    due_date DATETIME NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    KEY idx_payable_bucket (supplier_id, base_id, settlement_type, period_month, period_half),
    KEY idx_payable_purchase (purchase_entry_id)
)"#,
    ),
    (
        "payable_links",
        r#"CREATE TABLE IF NOT EXISTS payable_links (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    payable_record_id BIGINT NOT NULL,
    purchase_entry_id BIGINT NOT NULL,
    amount DOUBLE NOT NULL,
    currency VARCHAR(8) NOT NULL,
    UNIQUE KEY uk_link_pair (payable_record_id, purchase_entry_id),
    UNIQUE KEY uk_link_purchase (purchase_entry_id)
)"#,
    ),
    (
        "payment_records",
        r#"CREATE TABLE IF NOT EXISTS payment_records (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    payable_record_id BIGINT NOT NULL,
    payment_amount DOUBLE NOT NULL,
    payment_date DATE NOT NULL,
    payment_method VARCHAR(32) NOT NULL DEFAULT '',
    reference_number VARCHAR(64) NOT NULL DEFAULT '',
    notes VARCHAR(255) NOT NULL DEFAULT '',
    currency VARCHAR(8) NOT NULL DEFAULT 'CNY',
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    KEY idx_payment_payable (payable_record_id),
    KEY idx_payment_date (payment_date)
)"#,
    ),
    (
        "idempotency_keys",
        r#"CREATE TABLE IF NOT EXISTS idempotency_keys (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    idem_key VARCHAR(128) NOT NULL,
    resource VARCHAR(32) NOT NULL,
    ref_id BIGINT NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE KEY uk_idempotency_key (idem_key)
)"#,
    ),
    (
        "users",
        r#"CREATE TABLE IF NOT EXISTS users (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    username VARCHAR(64) NOT NULL,
    password_hash VARCHAR(128) NOT NULL,
    role VARCHAR(32) NOT NULL,
    bases VARCHAR(512) NOT NULL DEFAULT '',
    UNIQUE KEY uk_users_username (username)
)"#,
    ),
    (
        "base_expenses",
        r#"CREATE TABLE IF NOT EXISTS base_expenses (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    base_id BIGINT NOT NULL,
    category VARCHAR(64) NOT NULL DEFAULT '',
    expense_date DATE NOT NULL,
    amount DOUBLE NOT NULL,
    currency VARCHAR(8) NOT NULL DEFAULT 'CNY',
    note VARCHAR(255) NOT NULL DEFAULT '',
    KEY idx_expense_base_date (base_id, expense_date)
)"#,
    ),
    (
        "mv_supplier_monthly_spend",
        r#"CREATE TABLE IF NOT EXISTS mv_supplier_monthly_spend (
    supplier_id BIGINT NOT NULL,
    base_id BIGINT NOT NULL,
    month VARCHAR(7) NOT NULL,
    total_purchase DOUBLE NOT NULL DEFAULT 0,
    purchase_count BIGINT NOT NULL DEFAULT 0,
    total_paid DOUBLE NOT NULL DEFAULT 0,
    remaining DOUBLE NOT NULL DEFAULT 0,
    PRIMARY KEY (supplier_id, base_id, month),
    KEY idx_mv_spend_month (month)
)"#,
    ),
    (
        "mv_base_expense_month",
        r#"CREATE TABLE IF NOT EXISTS mv_base_expense_month (
    base_id BIGINT NOT NULL,
    month VARCHAR(7) NOT NULL,
    total_amount DOUBLE NOT NULL DEFAULT 0,
    PRIMARY KEY (base_id, month),
    KEY idx_mv_expense_month (month)
)"#,
    ),
];

#[cfg(test)]
mod tests {
    use super::SCHEMA;

    #[test]
    fn test_schema_statements_are_idempotent() {
        for (table, ddl) in SCHEMA {
            assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS"), "{}", table);
            assert!(ddl.contains(table));
        }
    }

    #[test]
    fn test_link_uniqueness_is_declared() {
        let (_, links) = SCHEMA
            .iter()
            .find(|(t, _)| *t == "payable_links")
            .unwrap();
        assert!(links.contains("UNIQUE KEY uk_link_purchase (purchase_entry_id)"));
        assert!(links.contains("uk_link_pair (payable_record_id, purchase_entry_id)"));
    }
}
