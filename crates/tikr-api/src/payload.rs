//! Raw provider payloads.
//!
//! The financials endpoint answers every request with the same shape: a list
//! of period descriptors (`dates`) and a flat list of data points keyed by
//! period id and data item id. Values arrive as strings or numbers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tikr_core::StatementType;

/// Sentinel value the provider returns for fields outside the subscription.
pub const ACCESS_DENIED: &str = "1.11";

// ============================================================================
// Financials Endpoint Types
// ============================================================================

/// One period descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDate {
    /// Provider period id, referenced by data points.
    pub financialperiodid: i64,
    /// Year label; a number or a string such as `"FY2023"`.
    #[serde(default)]
    pub calendaryear: Value,
}

/// One data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataPoint {
    /// Period the value belongs to.
    pub financialperiodid: i64,
    /// Provider data item id.
    pub dataitemid: i64,
    /// Value as sent by the provider.
    #[serde(default)]
    pub dataitemvalue: Value,
}

/// A raw financials response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatement {
    /// Period descriptors, oldest first.
    #[serde(default)]
    pub dates: Vec<RawDate>,
    /// All data points of all periods.
    #[serde(default)]
    pub data: Vec<RawDataPoint>,
}

impl RawStatement {
    /// True if the response carries no periods or no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.data.is_empty()
    }
}

/// A raw statement tagged with the statement it was requested as.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Income statement response.
    Income(RawStatement),
    /// Cash flow statement response.
    CashFlow(RawStatement),
    /// Balance sheet response.
    BalanceSheet(RawStatement),
}

impl RawPayload {
    /// Tags a raw statement.
    #[must_use]
    pub const fn new(statement_type: StatementType, raw: RawStatement) -> Self {
        match statement_type {
            StatementType::Income => Self::Income(raw),
            StatementType::CashFlow => Self::CashFlow(raw),
            StatementType::BalanceSheet => Self::BalanceSheet(raw),
        }
    }

    /// Returns the statement type.
    #[must_use]
    pub const fn statement_type(&self) -> StatementType {
        match self {
            Self::Income(_) => StatementType::Income,
            Self::CashFlow(_) => StatementType::CashFlow,
            Self::BalanceSheet(_) => StatementType::BalanceSheet,
        }
    }

    /// Returns the untagged response.
    #[must_use]
    pub const fn raw(&self) -> &RawStatement {
        match self {
            Self::Income(raw) | Self::CashFlow(raw) | Self::BalanceSheet(raw) => raw,
        }
    }
}

/// Latest-period response used for market data.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote(pub RawStatement);

/// Financials request body.
#[derive(Debug, Serialize)]
pub(crate) struct FinancialsRequest<'a> {
    pub(crate) auth: &'a str,
    pub(crate) tid: i64,
    pub(crate) cid: i64,
    pub(crate) p: &'a str,
    pub(crate) repid: u8,
    pub(crate) v: &'a str,
}

// ============================================================================
// Search Endpoint Types
// ============================================================================

/// Search index response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Hits in the provider's ranking order.
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// One search hit. Ids may be numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    /// Trading item id.
    pub tradingitemid: Value,
    /// Company id.
    pub companyid: Value,
    /// Listing symbol.
    #[serde(alias = "symbol")]
    pub ticker: Option<String>,
    /// Company name.
    pub companyname: Option<String>,
    /// Exchange of the listing.
    pub exchangesymbol: Option<String>,
    /// Primary listing flag (bool, 0/1, or string).
    pub primaryflag: Value,
}

impl SearchHit {
    /// Trading item id, if present and numeric.
    #[must_use]
    pub fn trading_id(&self) -> Option<i64> {
        as_id(&self.tradingitemid)
    }

    /// Company id, if present and numeric.
    #[must_use]
    pub fn company_id(&self) -> Option<i64> {
        as_id(&self.companyid)
    }

    /// True if the hit is flagged as the primary listing.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        match &self.primaryflag {
            Value::Bool(flag) => *flag,
            Value::Number(n) => n.as_i64() == Some(1),
            Value::String(s) => matches!(s.trim(), "1" | "true" | "True"),
            _ => false,
        }
    }
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_hit_ids() {
        let hit: SearchHit = serde_json::from_value(json!({
            "tradingitemid": "2590360",
            "companyid": 24937,
            "symbol": "AAPL",
            "primaryflag": 1
        }))
        .unwrap();
        assert_eq!(hit.trading_id(), Some(2_590_360));
        assert_eq!(hit.company_id(), Some(24937));
        assert_eq!(hit.ticker.as_deref(), Some("AAPL"));
        assert!(hit.is_primary());

        let bare: SearchHit = serde_json::from_value(json!({"ticker": "AAPL"})).unwrap();
        assert_eq!(bare.trading_id(), None);
        assert!(!bare.is_primary());
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let raw: RawStatement = serde_json::from_value(json!({"dates": []})).unwrap();
        assert!(raw.is_empty());
        let payload = RawPayload::new(StatementType::CashFlow, raw);
        assert_eq!(payload.statement_type(), StatementType::CashFlow);
    }
}
