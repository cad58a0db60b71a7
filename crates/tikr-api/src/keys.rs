//! Static field tables mapping provider data item ids to canonical keys.
//!
//! Each table lists rows in canonical order. A key may appear on several rows;
//! the first row whose id has a value in the period wins, the rest are
//! fallbacks. `sign` flips provider conventions so that expenses and capital
//! expenditure are stored as positive magnitudes.

use tikr_core::StatementType;

/// One provider data item and where it lands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    /// Provider data item id.
    pub raw_id: i64,
    /// Canonical field key.
    pub key: &'static str,
    /// Multiplier applied to the provider value.
    pub sign: f64,
}

const fn field(raw_id: i64, key: &'static str) -> FieldSpec {
    FieldSpec {
        raw_id,
        key,
        sign: 1.0,
    }
}

const fn negated(raw_id: i64, key: &'static str) -> FieldSpec {
    FieldSpec {
        raw_id,
        key,
        sign: -1.0,
    }
}

/// Income statement rows.
pub const INCOME_FIELDS: &[FieldSpec] = &[
    field(112, "revenues"),
    field(28, "total_revenues"),
    field(112, "total_revenues"),
    field(34, "cost_of_goods_sold"),
    field(10, "gross_profit"),
    field(102, "selling_general_admin"),
    field(100, "research_development"),
    field(41, "depreciation_amortization"),
    field(373, "total_operating_expenses"),
    field(21, "operating_income"),
    field(82, "interest_expense"),
    field(139, "ebt_incl_unusual_items"),
    negated(75, "income_tax_expense"),
    field(15, "net_income"),
    field(9, "eps_basic"),
    field(142, "eps_diluted"),
    field(3217, "shares_basic"),
    field(342, "shares_diluted"),
];

/// Balance sheet rows.
pub const BALANCE_SHEET_FIELDS: &[FieldSpec] = &[
    field(1096, "cash_and_equivalents"),
    field(1069, "short_term_investments"),
    field(1002, "total_cash_and_short_term_investments"),
    field(1021, "accounts_receivable"),
    field(1043, "inventory"),
    field(1008, "total_current_assets"),
    field(1004, "net_ppe"),
    field(1171, "goodwill"),
    field(1007, "total_assets"),
    field(1018, "accounts_payable"),
    field(1009, "total_current_liabilities"),
    field(1049, "long_term_debt"),
    field(4173, "total_debt"),
    field(1276, "total_liabilities"),
    field(1006, "total_common_equity"),
    field(1275, "total_equity"),
    field(1006, "total_equity"),
];

/// Cash flow statement rows.
pub const CASH_FLOW_FIELDS: &[FieldSpec] = &[
    field(2006, "cash_from_operations"),
    negated(2021, "capital_expenditure"),
    field(2005, "cash_from_investing"),
    field(2004, "cash_from_financing"),
    field(2022, "dividends_paid"),
    field(2164, "share_repurchases"),
    field(2127, "stock_based_compensation"),
    field(2160, "depreciation_amortization"),
    field(2093, "net_change_in_cash"),
];

/// Latest-period market rows of the quote payload.
pub const MARKET_FIELDS: &[FieldSpec] = &[
    field(4053, "pe_ratio"),
    field(4419, "pe_ratio"),
    field(142, "eps"),
    field(9, "eps"),
    field(342, "shares_outstanding"),
    field(3217, "shares_outstanding"),
];

/// Keys computed from other fields, per statement, in row order.
pub const INCOME_DERIVED: &[&str] = &[
    "gross_margin_pct",
    "operating_margin_pct",
    "net_margin_pct",
    "effective_tax_rate_pct",
    "ebitda",
    "total_revenues_yoy_pct",
    "operating_income_yoy_pct",
    "net_income_yoy_pct",
    "eps_diluted_yoy_pct",
];

/// Derived cash flow keys. The margin is filled once the income statement is
/// known, by [`crate::normalize::align_statements`].
pub const CASH_FLOW_DERIVED: &[&str] = &[
    "free_cash_flow",
    "free_cash_flow_yoy_pct",
    "free_cash_flow_margin_pct",
];

/// Derived balance sheet keys.
pub const BALANCE_SHEET_DERIVED: &[&str] = &["net_debt", "invested_capital", "current_ratio"];

/// Income lines with a year-over-year growth row, as `(source, growth key)`.
pub const INCOME_GROWTH: &[(&str, &str)] = &[
    ("total_revenues", "total_revenues_yoy_pct"),
    ("operating_income", "operating_income_yoy_pct"),
    ("net_income", "net_income_yoy_pct"),
    ("eps_diluted", "eps_diluted_yoy_pct"),
];

/// Cash flow lines with a growth row.
pub const CASH_FLOW_GROWTH: &[(&str, &str)] = &[("free_cash_flow", "free_cash_flow_yoy_pct")];

/// Returns the growth lines of a statement; the balance sheet has none.
#[must_use]
pub const fn growth_for(statement_type: StatementType) -> &'static [(&'static str, &'static str)] {
    match statement_type {
        StatementType::Income => INCOME_GROWTH,
        StatementType::CashFlow => CASH_FLOW_GROWTH,
        StatementType::BalanceSheet => &[],
    }
}

/// Returns the field table for a statement.
#[must_use]
pub const fn fields_for(statement_type: StatementType) -> &'static [FieldSpec] {
    match statement_type {
        StatementType::Income => INCOME_FIELDS,
        StatementType::CashFlow => CASH_FLOW_FIELDS,
        StatementType::BalanceSheet => BALANCE_SHEET_FIELDS,
    }
}

/// Returns the derived keys for a statement.
#[must_use]
pub const fn derived_for(statement_type: StatementType) -> &'static [&'static str] {
    match statement_type {
        StatementType::Income => INCOME_DERIVED,
        StatementType::CashFlow => CASH_FLOW_DERIVED,
        StatementType::BalanceSheet => BALANCE_SHEET_DERIVED,
    }
}

/// Distinct mapped keys of a table, in first-appearance order.
#[must_use]
pub fn mapped_keys(table: &[FieldSpec]) -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = Vec::with_capacity(table.len());
    for spec in table {
        if !keys.contains(&spec.key) {
            keys.push(spec.key);
        }
    }
    keys
}

/// Canonical row order of a statement: mapped keys, then derived keys.
#[must_use]
pub fn canonical_fields(statement_type: StatementType) -> Vec<String> {
    mapped_keys(fields_for(statement_type))
        .into_iter()
        .chain(derived_for(statement_type).iter().copied())
        .map(str::to_string)
        .collect()
}

/// The primary (first listed) row for a key.
#[must_use]
pub fn primary_spec(table: &[FieldSpec], key: &str) -> Option<FieldSpec> {
    table.iter().find(|spec| spec.key == key).copied()
}

/// True if the id appears anywhere in the table.
#[must_use]
pub fn is_known(table: &[FieldSpec], raw_id: i64) -> bool {
    table.iter().any(|spec| spec.raw_id == raw_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_rows_follow_primary() {
        let market = mapped_keys(MARKET_FIELDS);
        assert_eq!(market, vec!["pe_ratio", "eps", "shares_outstanding"]);
        assert_eq!(primary_spec(MARKET_FIELDS, "pe_ratio").unwrap().raw_id, 4053);
        assert_eq!(primary_spec(MARKET_FIELDS, "eps").unwrap().raw_id, 142);
        assert_eq!(
            primary_spec(MARKET_FIELDS, "shares_outstanding").unwrap().raw_id,
            342
        );
    }

    #[test]
    fn test_sign_conventions() {
        assert_eq!(primary_spec(INCOME_FIELDS, "income_tax_expense").unwrap().sign, -1.0);
        assert_eq!(
            primary_spec(CASH_FLOW_FIELDS, "capital_expenditure").unwrap().sign,
            -1.0
        );
        assert_eq!(primary_spec(INCOME_FIELDS, "net_income").unwrap().sign, 1.0);
    }

    #[test]
    fn test_canonical_fields_are_unique() {
        for statement_type in StatementType::ALL {
            let fields = canonical_fields(statement_type);
            let mut sorted = fields.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), fields.len(), "{statement_type}");
        }
        assert!(canonical_fields(StatementType::CashFlow).contains(&"free_cash_flow".to_string()));
    }

    #[test]
    fn test_growth_rows_are_canonical_fields() {
        for statement_type in StatementType::ALL {
            let fields = canonical_fields(statement_type);
            for (source, target) in growth_for(statement_type) {
                assert!(fields.iter().any(|f| f == source), "{source}");
                assert!(fields.iter().any(|f| f == target), "{target}");
            }
        }
    }
}
