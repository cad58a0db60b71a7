//! Normalization of raw provider payloads into canonical statements.
//!
//! Pure functions: no I/O, no shared state. Mapping is driven entirely by the
//! tables in [`crate::keys`].

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use tikr_core::{
    Period, PeriodLabel, Result, Statement, StatementSet, StatementType, TikrError,
};
use tracing::{debug, warn};

use crate::keys::{self, FieldSpec};
use crate::payload::{ACCESS_DENIED, RawDataPoint, RawDate, RawPayload, RawQuote, RawStatement};

/// A period with more access-denied values than this is dropped.
pub const MAX_DENIED_PER_PERIOD: usize = 10;

/// Result of normalizing one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The canonical statement.
    pub statement: Statement,
    /// Provider ids present in the payload but absent from the field table.
    pub unknown_keys: BTreeSet<i64>,
}

/// Parsed form of one provider value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawValue {
    Number(f64),
    Denied,
    Absent,
}

fn parse_value(value: &Value) -> RawValue {
    match value {
        Value::Number(n) => n.as_f64().map_or(RawValue::Absent, RawValue::Number),
        Value::String(s) if s.trim() == ACCESS_DENIED => RawValue::Denied,
        Value::String(s) => s.trim().parse().map_or(RawValue::Absent, RawValue::Number),
        _ => RawValue::Absent,
    }
}

/// Maps a provider period label to a canonical one.
///
/// Accepts `2023`, `"2023"`, `FY2023`, `FY 2023`, `CY2023`, `2023-09-30`,
/// `LTM` and `TTM`, case-insensitively.
#[must_use]
pub fn canonical_label(raw: &Value) -> Option<PeriodLabel> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .map(PeriodLabel::FiscalYear),
        Value::String(s) => parse_label(s),
        _ => None,
    }
}

/// String form of [`canonical_label`].
#[must_use]
pub fn parse_label(raw: &str) -> Option<PeriodLabel> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper == "LTM" || upper == "TTM" {
        return Some(PeriodLabel::Ltm);
    }
    let rest = upper
        .strip_prefix("FY")
        .or_else(|| upper.strip_prefix("CY"))
        .unwrap_or(&upper)
        .trim_start();
    let year = rest.get(..4)?;
    let tail = &rest[4..];
    if !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // Trailing text is only allowed as a date suffix such as "-09-30"
    if !tail.is_empty() && !tail.starts_with('-') {
        return None;
    }
    year.parse().ok().map(PeriodLabel::FiscalYear)
}

/// Normalizes one statement payload.
///
/// # Errors
/// Returns [`TikrError::DataIncomplete`] if the payload has no periods or no
/// values, a period label is unrecognised, labels repeat, or every period was
/// dropped for missing entitlements.
pub fn normalize(payload: &RawPayload) -> Result<Normalized> {
    let statement_type = payload.statement_type();
    let table = keys::fields_for(statement_type);
    let raw = payload.raw();

    let (mut periods, unknown_keys) = map_periods(raw, table, statement_type)?;
    for period in &mut periods {
        derive_period(statement_type, period);
    }
    add_growth(keys::growth_for(statement_type), &mut periods);

    if !unknown_keys.is_empty() {
        warn!(
            statement = %statement_type,
            count = unknown_keys.len(),
            ids = ?unknown_keys,
            "Dropped unknown provider fields"
        );
    }
    debug!(statement = %statement_type, periods = periods.len(), "Normalized statement");

    Ok(Normalized {
        statement: Statement {
            statement_type,
            fields: keys::canonical_fields(statement_type),
            periods,
        },
        unknown_keys,
    })
}

/// Normalizes the latest period of a quote payload into market fields.
///
/// # Errors
/// Returns [`TikrError::DataIncomplete`] if the payload is empty.
pub fn normalize_quote(quote: &RawQuote) -> Result<Period> {
    let raw = &quote.0;
    let latest = raw
        .dates
        .last()
        .filter(|_| !raw.data.is_empty())
        .ok_or_else(|| TikrError::DataIncomplete("quote payload has no periods".to_string()))?;

    let values = period_values(&raw.data, latest.financialperiodid);
    let mut period = Period::new(PeriodLabel::Ltm);
    apply_table(keys::MARKET_FIELDS, &values, &mut period);
    Ok(period)
}

/// Re-serialises the mapped fields of a statement with provider ids and signs.
///
/// Derived fields are not emitted. Period ids are synthetic (1-based).
#[must_use]
pub fn denormalize(statement: &Statement) -> RawStatement {
    let table = keys::fields_for(statement.statement_type);
    let mapped = keys::mapped_keys(table);
    let mut raw = RawStatement::default();

    for (index, period) in statement.periods.iter().enumerate() {
        let id = i64::try_from(index).unwrap_or(i64::MAX - 1) + 1;
        raw.dates.push(RawDate {
            financialperiodid: id,
            calendaryear: match period.label {
                PeriodLabel::FiscalYear(year) => Value::from(year),
                PeriodLabel::Ltm => Value::from("LTM"),
            },
        });
        for key in &mapped {
            let (Some(value), Some(spec)) = (period.get(key), keys::primary_spec(table, key))
            else {
                continue;
            };
            raw.data.push(RawDataPoint {
                financialperiodid: id,
                dataitemid: spec.raw_id,
                dataitemvalue: Value::from((value * spec.sign).to_string()),
            });
        }
    }
    raw
}

fn map_periods(
    raw: &RawStatement,
    table: &[FieldSpec],
    statement_type: StatementType,
) -> Result<(Vec<Period>, BTreeSet<i64>)> {
    if raw.is_empty() {
        return Err(TikrError::DataIncomplete(format!(
            "{statement_type} payload has no periods or values"
        )));
    }

    let labels = label_periods(&raw.dates, statement_type)?;
    let mut unknown_keys = BTreeSet::new();
    let mut periods = Vec::with_capacity(raw.dates.len());

    for (date, label) in raw.dates.iter().zip(labels) {
        let values = period_values(&raw.data, date.financialperiodid);
        unknown_keys.extend(values.keys().filter(|id| !keys::is_known(table, **id)));

        let denied = values
            .iter()
            .filter(|(id, v)| **v == RawValue::Denied && keys::is_known(table, **id))
            .count();
        if denied > MAX_DENIED_PER_PERIOD {
            warn!(
                statement = %statement_type,
                period = %label,
                denied,
                "Dropping period outside subscription"
            );
            continue;
        }

        let mut period = Period::new(label);
        apply_table(table, &values, &mut period);
        periods.push(period);
    }

    if periods.is_empty() {
        return Err(TikrError::DataIncomplete(format!(
            "every {statement_type} period was access-denied"
        )));
    }
    Ok((periods, unknown_keys))
}

/// Labels depend on the raw date alone. The trailing year becomes LTM later,
/// across the whole set, in [`align_statements`].
fn label_periods(dates: &[RawDate], statement_type: StatementType) -> Result<Vec<PeriodLabel>> {
    let mut seen = HashSet::with_capacity(dates.len());
    let mut labels = Vec::with_capacity(dates.len());

    for date in dates {
        let label = canonical_label(&date.calendaryear).ok_or_else(|| {
            TikrError::DataIncomplete(format!(
                "{statement_type} has an unrecognised period label {}",
                date.calendaryear
            ))
        })?;
        if !seen.insert(label) {
            return Err(TikrError::DataIncomplete(format!(
                "{statement_type} has duplicate period label {label}"
            )));
        }
        labels.push(label);
    }
    Ok(labels)
}

fn period_values(data: &[RawDataPoint], period_id: i64) -> HashMap<i64, RawValue> {
    let mut values = HashMap::new();
    for point in data.iter().filter(|p| p.financialperiodid == period_id) {
        values
            .entry(point.dataitemid)
            .or_insert_with(|| parse_value(&point.dataitemvalue));
    }
    values
}

fn apply_table(table: &[FieldSpec], values: &HashMap<i64, RawValue>, period: &mut Period) {
    for spec in table {
        if period.get(spec.key).is_some() {
            continue;
        }
        let value = match values.get(&spec.raw_id) {
            Some(RawValue::Number(v)) => Some(v * spec.sign),
            _ => None,
        };
        period.set(spec.key, value);
    }
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

fn pct(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    ratio(numerator, denominator).map(|r| r * 100.0)
}

fn sum(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? + b?)
}

fn difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// Adds the single-period derived metrics of a statement.
pub fn derive_period(statement_type: StatementType, period: &mut Period) {
    let get = |key: &str| period.get(key);
    let derived: Vec<(&str, Option<f64>)> = match statement_type {
        StatementType::Income => {
            let revenue = get("total_revenues");
            vec![
                ("gross_margin_pct", pct(get("gross_profit"), revenue)),
                ("operating_margin_pct", pct(get("operating_income"), revenue)),
                ("net_margin_pct", pct(get("net_income"), revenue)),
                (
                    "effective_tax_rate_pct",
                    pct(get("income_tax_expense"), get("ebt_incl_unusual_items")),
                ),
                (
                    "ebitda",
                    sum(get("operating_income"), get("depreciation_amortization")),
                ),
            ]
        }
        StatementType::CashFlow => vec![(
            "free_cash_flow",
            difference(get("cash_from_operations"), get("capital_expenditure")),
        )],
        StatementType::BalanceSheet => {
            vec![
                (
                    "net_debt",
                    difference(get("total_debt"), get("cash_and_equivalents")),
                ),
                ("invested_capital", period.invested_capital()),
                (
                    "current_ratio",
                    ratio(get("total_current_assets"), get("total_current_liabilities")),
                ),
            ]
        }
    };
    for (key, value) in derived {
        period.set(key, value);
    }
}

/// Year-over-year growth, in percent, for each `(source, target)` pair.
///
/// The comparison period is the preceding fiscal year. A period labelled LTM
/// by the provider gets no growth figure.
fn add_growth(lines: &[(&str, &str)], periods: &mut [Period]) {
    for &(source, target) in lines {
        let by_year: HashMap<i32, Option<f64>> = periods
            .iter()
            .filter_map(|p| Some((p.label.fiscal_year()?, p.get(source))))
            .collect();

        for period in periods.iter_mut() {
            let growth = period.label.fiscal_year().and_then(|year| {
                let previous = by_year.get(&(year - 1)).copied().flatten()?;
                let current = period.get(source)?;
                (previous != 0.0).then(|| (current - previous) / previous.abs() * 100.0)
            });
            period.set(target, growth);
        }
    }
}

/// Finishes a set of normalized statements.
///
/// Relabels the trailing fiscal year of the set as LTM (see
/// [`StatementSet::mark_ltm`]) and then adds the metrics that need two
/// statements: `free_cash_flow_margin_pct`, cash flow FCF over income
/// `total_revenues` for the same label.
pub fn align_statements(statements: &mut StatementSet) {
    if let Some(year) = statements.mark_ltm() {
        debug!(year, "Trailing fiscal year labelled LTM");
    }

    let revenue: HashMap<PeriodLabel, Option<f64>> = statements
        .get(StatementType::Income)
        .map(|income| {
            income
                .periods
                .iter()
                .map(|p| (p.label, p.get("total_revenues")))
                .collect()
        })
        .unwrap_or_default();

    if let Some(cash_flow) = statements.get_mut(StatementType::CashFlow) {
        for period in &mut cash_flow.periods {
            let revenue = revenue.get(&period.label).copied().flatten();
            let margin = pct(period.get("free_cash_flow"), revenue);
            period.set("free_cash_flow_margin_pct", margin);
        }
    }
}
