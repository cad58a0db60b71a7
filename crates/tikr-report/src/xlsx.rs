//! Workbook writer.

use crate::report::{CellValue, Failure, KeyValueRow, Report, SheetContent, TemplateCell};
use crate::template::parse_cell;
use polars::prelude::{Column, DataFrame};
use rust_xlsxwriter::{Format, Formula, Workbook, Worksheet, XlsxError};
use std::path::Path;
use tikr_core::{Result, TikrError};
use tracing::debug;

const FIELD_WIDTH: f64 = 36.0;
const VALUE_WIDTH: f64 = 14.0;
const NOTE_WIDTH: f64 = 48.0;

/// Writes a report to `path`, replacing any existing file.
///
/// # Errors
/// Returns [`TikrError::Export`] if a sheet cannot be written or the file cannot be saved.
pub fn write_report(report: &Report, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for sheet in &report.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name).map_err(export_err)?;
        let written = match &sheet.content {
            SheetContent::Table(df) => {
                let columns = table_columns(df)?;
                write_table(worksheet, df.height(), &columns, &header)
            }
            SheetContent::KeyValue(rows) => write_rows(worksheet, rows, &header),
            SheetContent::Template(cells) => {
                let positioned = template_positions(cells)?;
                write_template(worksheet, &positioned, &header)
            }
            SheetContent::Missing(failure) => write_missing(worksheet, failure, &header),
        };
        written.map_err(export_err)?;
        debug!(sheet = %sheet.name, "Wrote sheet");
    }

    workbook.save(path).map_err(export_err)
}

fn export_err(e: XlsxError) -> TikrError {
    TikrError::Export(e.to_string())
}

fn table_columns(df: &DataFrame) -> Result<Vec<(String, &Column)>> {
    df.get_column_names()
        .into_iter()
        .map(|name| {
            df.column(name)
                .map(|column| (name.to_string(), column))
                .map_err(|e| TikrError::Export(e.to_string()))
        })
        .collect()
}

fn template_positions(cells: &[TemplateCell]) -> Result<Vec<(u32, u16, &TemplateCell)>> {
    cells
        .iter()
        .map(|cell| {
            parse_cell(cell.cell)
                .filter(|(_, col)| *col > 0)
                .map(|(row, col)| (row, col, cell))
                .ok_or_else(|| TikrError::Export(format!("invalid template cell {}", cell.cell)))
        })
        .collect()
}

fn write_table(
    worksheet: &mut Worksheet,
    height: usize,
    columns: &[(String, &Column)],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    for (index, (name, column)) in columns.iter().enumerate() {
        let col = to_col(index);
        worksheet.write_string_with_format(0, col, name, header)?;
        worksheet.set_column_width(col, if index == 0 { FIELD_WIDTH } else { VALUE_WIDTH })?;
        if let Ok(text) = column.str() {
            for i in 0..height {
                if let Some(value) = text.get(i) {
                    worksheet.write_string(to_row(i + 1), col, value)?;
                }
            }
        } else if let Ok(numbers) = column.f64() {
            for i in 0..height {
                if let Some(value) = numbers.get(i).filter(|v| v.is_finite()) {
                    worksheet.write_number(to_row(i + 1), col, value)?;
                }
            }
        }
    }
    Ok(())
}

fn write_rows(
    worksheet: &mut Worksheet,
    rows: &[KeyValueRow],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    worksheet.write_string_with_format(0, 0, "Metric", header)?;
    worksheet.write_string_with_format(0, 1, "Value", header)?;
    worksheet.write_string_with_format(0, 2, "Source", header)?;
    worksheet.set_column_width(0, FIELD_WIDTH)?;
    worksheet.set_column_width(1, VALUE_WIDTH)?;
    worksheet.set_column_width(2, NOTE_WIDTH)?;
    for (i, row) in rows.iter().enumerate() {
        let r = to_row(i + 1);
        worksheet.write_string(r, 0, &row.metric)?;
        write_value(worksheet, r, 1, &row.value)?;
        if let Some(source) = &row.source {
            worksheet.write_string(r, 2, source)?;
        }
    }
    Ok(())
}

/// Template layout: label left of the target cell, provenance to its right.
fn write_template(
    worksheet: &mut Worksheet,
    cells: &[(u32, u16, &TemplateCell)],
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    if let Some(&(_, col, _)) = cells.first() {
        worksheet.write_string_with_format(0, col - 1, "Item", header)?;
        worksheet.write_string_with_format(0, col, "Value", header)?;
        worksheet.write_string_with_format(0, col + 1, "Source", header)?;
        worksheet.set_column_width(col - 1, FIELD_WIDTH)?;
        worksheet.set_column_width(col, VALUE_WIDTH)?;
        worksheet.set_column_width(col + 1, NOTE_WIDTH)?;
    }
    for &(row, col, cell) in cells {
        worksheet.write_string(row, col - 1, cell.label)?;
        write_value(worksheet, row, col, &cell.value)?;
        if let Some(note) = &cell.note {
            worksheet.write_string(row, col + 1, note)?;
        }
    }
    Ok(())
}

fn write_missing(
    worksheet: &mut Worksheet,
    failure: &Failure,
    header: &Format,
) -> std::result::Result<(), XlsxError> {
    worksheet.write_string_with_format(0, 0, "Status", header)?;
    worksheet.write_string(0, 1, "Data unavailable")?;
    worksheet.write_string(1, 0, "Error")?;
    worksheet.write_string(1, 1, failure.kind.map_or("none", |kind| kind.as_str()))?;
    worksheet.write_string(2, 0, "Reason")?;
    worksheet.write_string(2, 1, &failure.reason)?;
    worksheet.set_column_width(0, VALUE_WIDTH)?;
    worksheet.set_column_width(1, NOTE_WIDTH)?;
    Ok(())
}

fn write_value(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
) -> std::result::Result<(), XlsxError> {
    match value {
        CellValue::Number(v) if v.is_finite() => {
            worksheet.write_number(row, col, *v)?;
        }
        CellValue::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        CellValue::Formula { formula, cached } => {
            let mut formula = Formula::new(formula);
            if let Some(result) = cached.filter(|v| v.is_finite()) {
                formula = formula.set_result(result.to_string());
            }
            worksheet.write_formula(row, col, formula)?;
        }
        CellValue::Number(_) | CellValue::Empty => {}
    }
    Ok(())
}

fn to_row(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

fn to_col(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}
