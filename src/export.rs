use crate::error::FlowError;
use crate::model::{Reagent, Transaction, TransactionType};

/// Column headers of the current-state inventory sheet
pub const INVENTORY_HEADERS: [&str; 10] = [
    "ID SISTEMA",
    "NOMBRE REACTIVO",
    "MARCA",
    "DEPARTAMENTO",
    "STOCK TOTAL",
    "UNIDAD",
    "ENVASE",
    "STOCK MÍNIMO",
    "ESTADO PEDIDO",
    "ULT. ACT.",
];

/// Column headers of the movement history sheet
pub const HISTORY_HEADERS: [&str; 7] = [
    "FECHA/HORA",
    "ID TRANSACCIÓN",
    "TIPO MOVIMIENTO",
    "REACTIVO",
    "CANTIDAD",
    "UNIDAD",
    "ANALISTA RESPONSABLE",
];

pub const INVENTORY_SHEET: &str = "Inventario (Estado Actual)";
pub const HISTORY_SHEET: &str = "Auditoría (Historial)";

/// A spreadsheet cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn to_csv(&self) -> String {
        match self {
            Cell::Number(n) => n.to_string(),
            Cell::Text(value) => {
                if value.contains(',') || value.contains('"') || value.contains('\n') {
                    format!("\"{}\"", value.replace('"', "\"\""))
                } else {
                    value.clone()
                }
            }
        }
    }
}

fn text(value: &str) -> Cell {
    Cell::Text(value.to_string())
}

/// Inventory rows for active reagents, in the order of the header
pub fn inventory_rows(reagents: &[Reagent]) -> Vec<Vec<Cell>> {
    reagents
        .iter()
        .filter(|r| r.is_active())
        .map(|r| {
            vec![
                text(&r.id),
                text(&r.name),
                text(&r.brand),
                text(r.department.as_str()),
                Cell::Number(r.current_stock),
                text(&r.base_unit),
                text(&r.container_type),
                Cell::Number(r.min_stock),
                text(if r.is_ordered { "PENDIENTE PEDIDO" } else { "OK" }),
                Cell::Text(r.last_updated.to_rfc3339()),
            ]
        })
        .collect()
}

/// Ledger rows, newest first as stored
pub fn history_rows(transactions: &[Transaction]) -> Vec<Vec<Cell>> {
    transactions
        .iter()
        .map(|t| {
            vec![
                Cell::Text(t.timestamp.to_rfc3339()),
                text(&t.id),
                text(match t.kind {
                    TransactionType::In => "INGRESO",
                    TransactionType::Out => "SALIDA",
                }),
                text(&t.reagent_name),
                Cell::Number(t.display_quantity),
                text(&t.display_unit),
                text(&t.analyst),
            ]
        })
        .collect()
}

/// Render a header and rows as CSV
///
/// Text containing commas, quotes or newlines is quoted with doubled quotes.
pub fn to_csv(headers: &[&str], rows: &[Vec<Cell>]) -> String {
    let mut csv_content = headers
        .iter()
        .map(|h| text(h).to_csv())
        .collect::<Vec<_>>()
        .join(",");
    csv_content.push('\n');

    for row in rows {
        let line = row.iter().map(Cell::to_csv).collect::<Vec<_>>().join(",");
        csv_content.push_str(&line);
        csv_content.push('\n');
    }
    csv_content
}

pub fn inventory_csv(reagents: &[Reagent]) -> String {
    to_csv(&INVENTORY_HEADERS, &inventory_rows(reagents))
}

pub fn history_csv(transactions: &[Transaction]) -> String {
    to_csv(&HISTORY_HEADERS, &history_rows(transactions))
}

/// Workbook with the inventory and history sheets
///
/// # Arguments
/// * `reagents` - Current reagent rows (soft-deleted rows are left out)
/// * `transactions` - Ledger entries
///
/// # Returns
/// * `Result<Vec<u8>, FlowError>` - XLSX file content as bytes
#[cfg(feature = "web")]
pub fn to_xlsx(reagents: &[Reagent], transactions: &[Transaction]) -> Result<Vec<u8>, FlowError> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

    fn sheet(
        name: &str,
        headers: &[&str],
        rows: &[Vec<Cell>],
        bold: &Format,
    ) -> Result<Worksheet, XlsxError> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(name)?;
        for (c, header) in headers.iter().enumerate() {
            worksheet.write_string_with_format(0, c as u16, *header, bold)?;
        }
        for (r, row) in rows.iter().enumerate() {
            let r = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(s) => worksheet.write_string(r, c as u16, s.as_str())?,
                    Cell::Number(n) => worksheet.write_number(r, c as u16, *n)?,
                };
            }
        }
        worksheet.set_freeze_panes(1, 0)?;
        Ok(worksheet)
    }

    fn workbook(reagents: &[Reagent], transactions: &[Transaction]) -> Result<Vec<u8>, XlsxError> {
        let bold = Format::new().set_bold();
        let mut workbook = Workbook::new();
        workbook.push_worksheet(sheet(
            INVENTORY_SHEET,
            &INVENTORY_HEADERS,
            &inventory_rows(reagents),
            &bold,
        )?);
        workbook.push_worksheet(sheet(
            HISTORY_SHEET,
            &HISTORY_HEADERS,
            &history_rows(transactions),
            &bold,
        )?);
        workbook.save_to_buffer()
    }

    workbook(reagents, transactions).map_err(|e| FlowError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Department, Presentation};
    use chrono::Utc;

    fn reagent(id: &str, name: &str, deleted: bool) -> Reagent {
        Reagent {
            id: id.into(),
            name: name.into(),
            brand: "Merck".into(),
            presentation: Presentation::Liquid,
            current_stock: 250.0,
            min_stock: 100.0,
            department: Department::Microbiology,
            base_unit: "mL".into(),
            container_type: "Frascos".into(),
            quantity_per_container: 500.0,
            expiry_date: "N/A".into(),
            is_ordered: true,
            is_deleted: deleted,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn inventory_csv_skips_deleted_rows() {
        let csv = inventory_csv(&[reagent("a", "Etanol", false), reagent("b", "Metanol", true)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID SISTEMA,NOMBRE REACTIVO"));
        assert!(lines[1].starts_with("a,Etanol,Merck,Microbiología,250,mL,Frascos,100,PENDIENTE PEDIDO,"));
    }

    #[test]
    fn csv_quotes_special_characters() {
        let rows = vec![vec![text("Ácido, 1M \"puro\""), Cell::Number(2.5)]];
        let csv = to_csv(&["A", "B"], &rows);
        assert_eq!(csv, "A,B\n\"Ácido, 1M \"\"puro\"\"\",2.5\n");
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_is_a_zip_archive() {
        let bytes = to_xlsx(&[reagent("a", "Etanol", false)], &[]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
