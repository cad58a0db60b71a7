//! Valuation template binding.
//!
//! The `valuation_base` sheet has a fixed set of target cells. Each target is
//! bound to exactly one canonical source by [`VALUATION_BINDINGS`];
//! [`LINKED_BINDINGS`] add the tax margin and the sales-to-capital ratio.
//! [`TemplateBinder`] decides per cell whether to write a cross-sheet formula,
//! so the template follows later edits to the source sheets, or the computed
//! literal.

use crate::report::{
    CellValue, FIELD_COLUMN, MARKET_SHEET, SALES_TO_CAPITAL_SHEET, Sheet, SheetContent,
    TemplateCell, column_index, field_row, table_value,
};
use polars::prelude::DataFrame;
use tikr_core::StatementType;
use tracing::{debug, warn};

/// Number of fiscal years averaged for margin-type targets.
pub const MARGIN_WINDOW: usize = 4;

/// How a target cell obtains its value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BindingSource {
    /// Mean of a percentage field over the most recent fiscal years, as a fraction.
    FiscalMean {
        /// Source statement.
        statement: StatementType,
        /// Canonical field.
        field: &'static str,
        /// Number of fiscal years.
        window: usize,
    },
    /// Field value in the most recent fiscal year (LTM excluded).
    LatestFiscal {
        /// Source statement.
        statement: StatementType,
        /// Canonical field.
        field: &'static str,
    },
    /// First field with a value in the LTM column.
    Ltm {
        /// Source statement.
        statement: StatementType,
        /// Candidate fields in order of preference.
        fields: &'static [&'static str],
    },
    /// A metric row of a key-value sheet such as `market_data`.
    Metric {
        /// Sheet name.
        sheet: &'static str,
        /// Metric key.
        metric: &'static str,
    },
}

/// A target cell and its source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Binding {
    /// A1-style address in the template.
    pub cell: &'static str,
    /// Target description.
    pub label: &'static str,
    /// Value source.
    pub source: BindingSource,
}

/// The enumerated target-cell bindings of the valuation template.
pub const VALUATION_BINDINGS: &[Binding] = &[
    Binding {
        cell: "O12",
        label: "Operating margin",
        source: BindingSource::FiscalMean {
            statement: StatementType::Income,
            field: "operating_margin_pct",
            window: MARGIN_WINDOW,
        },
    },
    Binding {
        cell: "O14",
        label: "Effective tax rate",
        source: BindingSource::FiscalMean {
            statement: StatementType::Income,
            field: "effective_tax_rate_pct",
            window: MARGIN_WINDOW,
        },
    },
    Binding {
        cell: "O18",
        label: "Revenue",
        source: BindingSource::LatestFiscal {
            statement: StatementType::Income,
            field: "total_revenues",
        },
    },
    Binding {
        cell: "O19",
        label: "Current price",
        source: BindingSource::Metric {
            sheet: MARKET_SHEET,
            metric: "current_price",
        },
    },
    Binding {
        cell: "O23",
        label: "Debt",
        source: BindingSource::Ltm {
            statement: StatementType::BalanceSheet,
            fields: &["total_debt", "long_term_debt"],
        },
    },
    Binding {
        cell: "O25",
        label: "Cash",
        source: BindingSource::Ltm {
            statement: StatementType::BalanceSheet,
            fields: &["cash_and_equivalents"],
        },
    },
    Binding {
        cell: "O28",
        label: "Shares outstanding (M)",
        source: BindingSource::Metric {
            sheet: MARKET_SHEET,
            metric: "shares_outstanding",
        },
    },
];

/// Template cells linked to report sheets beyond the enumerated targets.
///
/// `O15` is left unbound when the `sales_to_capital` sheet was omitted.
pub const LINKED_BINDINGS: &[Binding] = &[
    Binding {
        cell: "O15",
        label: "Sales to capital",
        source: BindingSource::Metric {
            sheet: SALES_TO_CAPITAL_SHEET,
            metric: "sales_to_capital_ratio",
        },
    },
    Binding {
        cell: "O16",
        label: "Tax margin",
        source: BindingSource::FiscalMean {
            statement: StatementType::Income,
            field: "effective_tax_rate_pct",
            window: MARGIN_WINDOW,
        },
    },
];

/// A formula internal to the template, over other target cells.
#[derive(Clone, Copy, Debug)]
pub struct TemplateFormula {
    /// A1-style address in the template.
    pub cell: &'static str,
    /// Target description.
    pub label: &'static str,
    /// Formula text.
    pub formula: &'static str,
    /// Cells read by the formula.
    inputs: &'static [&'static str],
    eval: fn(&[f64]) -> f64,
}

/// Fixed formulas of the valuation template.
pub const TEMPLATE_FORMULAS: &[TemplateFormula] = &[
    TemplateFormula {
        cell: "O29",
        label: "Market cap (M)",
        formula: "=O19*O28",
        inputs: &["O19", "O28"],
        eval: |v| v[0] * v[1],
    },
    TemplateFormula {
        cell: "O30",
        label: "Enterprise value (M)",
        formula: "=O29+O23-O25",
        inputs: &["O29", "O23", "O25"],
        eval: |v| v[0] + v[1] - v[2],
    },
];

/// Whether bound cells may reference other sheets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BindingMode {
    /// Cross-sheet formulas where the referenced cells hold values.
    #[default]
    Formulas,
    /// Computed literals only.
    Literals,
}

/// Binds the valuation template against the sheets of a report.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateBinder {
    mode: BindingMode,
}

/// A resolved source: the value, the formula that reproduces it, and provenance.
struct Resolved {
    value: f64,
    formula: Option<String>,
    note: String,
}

impl TemplateBinder {
    /// Creates a binder.
    #[must_use]
    pub const fn new(mode: BindingMode) -> Self {
        Self { mode }
    }

    /// The binding mode.
    #[must_use]
    pub const fn mode(&self) -> BindingMode {
        self.mode
    }

    /// Binds every target cell and template formula.
    ///
    /// Unbound targets are returned with [`CellValue::Empty`] and a note.
    #[must_use]
    pub fn bind(&self, sheets: &[Sheet]) -> Vec<TemplateCell> {
        let mut cells: Vec<TemplateCell> = VALUATION_BINDINGS
            .iter()
            .chain(LINKED_BINDINGS)
            .map(|binding| self.bind_one(binding, sheets))
            .collect();
        for formula in TEMPLATE_FORMULAS {
            let cell = self.bind_formula(formula, &cells);
            cells.push(cell);
        }
        cells
    }

    fn bind_one(&self, binding: &Binding, sheets: &[Sheet]) -> TemplateCell {
        let (value, note) = match resolve(binding.source, sheets) {
            Ok(resolved) => {
                let value = match (self.mode, resolved.formula) {
                    (BindingMode::Formulas, Some(formula)) => CellValue::Formula {
                        formula,
                        cached: Some(resolved.value),
                    },
                    _ => CellValue::Number(resolved.value),
                };
                debug!(cell = binding.cell, ?value, "Bound valuation cell");
                (value, Some(resolved.note))
            }
            Err(reason) => {
                warn!(cell = binding.cell, %reason, "Valuation cell left unbound");
                (CellValue::Empty, Some(reason))
            }
        };
        TemplateCell {
            cell: binding.cell,
            label: binding.label,
            value,
            note,
        }
    }

    fn bind_formula(&self, formula: &TemplateFormula, bound: &[TemplateCell]) -> TemplateCell {
        let inputs: Option<Vec<f64>> = formula
            .inputs
            .iter()
            .map(|cell| bound.iter().find(|c| c.cell == *cell)?.value.as_f64())
            .collect();
        let (value, note) = match inputs {
            Some(inputs) => {
                let result = (formula.eval)(&inputs);
                let value = match self.mode {
                    BindingMode::Formulas => CellValue::Formula {
                        formula: formula.formula.to_string(),
                        cached: Some(result),
                    },
                    BindingMode::Literals => CellValue::Number(result),
                };
                (value, Some(formula.formula.trim_start_matches('=').to_string()))
            }
            None => (
                CellValue::Empty,
                Some(format!("inputs unbound: {}", formula.inputs.join(", "))),
            ),
        };
        TemplateCell {
            cell: formula.cell,
            label: formula.label,
            value,
            note,
        }
    }
}

fn resolve(source: BindingSource, sheets: &[Sheet]) -> Result<Resolved, String> {
    match source {
        BindingSource::FiscalMean {
            statement,
            field,
            window,
        } => {
            let (sheet, df) = table(sheets, statement)?;
            let row = locate(df, sheet, field)?;
            let columns = fiscal_columns(df);
            let recent = &columns[columns.len().saturating_sub(window)..];
            let values: Vec<f64> = recent
                .iter()
                .filter_map(|c| table_value(df, row, c))
                .collect();
            if values.is_empty() {
                return Err(format!("{sheet}: no fiscal-year values for {field}"));
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let formula = (values.len() == recent.len())
                .then(|| {
                    let first = cell_ref(row_of(row), column_index(df, recent.first()?)?);
                    let last = cell_ref(row_of(row), column_index(df, recent.last()?)?);
                    Some(format!("=AVERAGE({sheet}!{first}:{last})/100"))
                })
                .flatten();
            Ok(Resolved {
                value: mean / 100.0,
                formula,
                note: format!(
                    "{sheet} {field}, mean of {} fiscal year(s) / 100",
                    values.len()
                ),
            })
        }
        BindingSource::LatestFiscal { statement, field } => {
            let (sheet, df) = table(sheets, statement)?;
            let row = locate(df, sheet, field)?;
            let column = fiscal_columns(df)
                .pop()
                .ok_or_else(|| format!("{sheet}: no fiscal-year column"))?;
            reference(df, sheet, row, column, field)
        }
        BindingSource::Ltm { statement, fields } => {
            let (sheet, df) = table(sheets, statement)?;
            if column_index(df, "LTM").is_none() {
                return Err(format!("{sheet}: no LTM column"));
            }
            fields
                .iter()
                .find_map(|field| {
                    let row = field_row(df, field)?;
                    reference(df, sheet, row, "LTM".to_string(), field).ok()
                })
                .ok_or_else(|| format!("{sheet}: no LTM value for {}", fields.join(" or ")))
        }
        BindingSource::Metric { sheet: name, metric } => {
            let sheet = sheets
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| format!("{name} sheet absent"))?;
            let rows = match &sheet.content {
                SheetContent::KeyValue(rows) => rows,
                SheetContent::Missing(failure) => {
                    return Err(format!("{name} missing: {failure}"));
                }
                _ => return Err(format!("{name} has no metric rows")),
            };
            let (index, row) = rows
                .iter()
                .enumerate()
                .find(|(_, r)| r.metric == metric)
                .ok_or_else(|| format!("{name}: no {metric} row"))?;
            let value = row
                .value
                .as_f64()
                .ok_or_else(|| format!("{name}: {metric} unavailable"))?;
            let address = cell_ref(row_of(index), 1);
            let note = match row.source.as_deref() {
                Some(source) => format!("{name}!{address} ({source})"),
                None => format!("{name}!{address}"),
            };
            Ok(Resolved {
                value,
                formula: Some(format!("={name}!{address}")),
                note,
            })
        }
    }
}

fn table(sheets: &[Sheet], statement: StatementType) -> Result<(&'static str, &DataFrame), String> {
    let name = statement.sheet_name();
    let sheet = sheets
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| format!("{name} sheet absent"))?;
    match &sheet.content {
        SheetContent::Table(df) => Ok((name, df)),
        SheetContent::Missing(failure) => Err(format!("{name} missing: {failure}")),
        _ => Err(format!("{name} is not a table")),
    }
}

fn locate(df: &DataFrame, sheet: &str, field: &str) -> Result<usize, String> {
    field_row(df, field).ok_or_else(|| format!("{sheet}: no {field} row"))
}

fn reference(
    df: &DataFrame,
    sheet: &str,
    row: usize,
    column: String,
    field: &str,
) -> Result<Resolved, String> {
    let value =
        table_value(df, row, &column).ok_or_else(|| format!("{sheet}: {field} empty in {column}"))?;
    let col = column_index(df, &column).ok_or_else(|| format!("{sheet}: no {column} column"))?;
    let address = cell_ref(row_of(row), col);
    Ok(Resolved {
        value,
        formula: Some(format!("={sheet}!{address}")),
        note: format!("{sheet} {field} {column}"),
    })
}

/// Period columns other than LTM, chronological.
fn fiscal_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name != FIELD_COLUMN && name != "LTM")
        .collect()
}

/// Zero-based worksheet row of a zero-based data row (row 0 is the header).
fn row_of(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Column letters for a zero-based column index.
pub(crate) fn column_name(col: usize) -> String {
    let mut name = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + u8::try_from(rem).unwrap_or(0));
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// A1-style address for a zero-based row and column.
pub(crate) fn cell_ref(row: u32, col: usize) -> String {
    format!("{}{}", column_name(col), row + 1)
}

/// Zero-based row and column of an A1-style address.
pub(crate) fn parse_cell(cell: &str) -> Option<(u32, u16)> {
    let split = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let col = letters
        .bytes()
        .try_fold(0u32, |acc, b| Some(acc * 26 + u32::from(b - b'A' + 1)))?;
    let row: u32 = digits.parse().ok()?;
    Some((row.checked_sub(1)?, u16::try_from(col - 1).ok()?))
}
