//! タブ区切りテキスト出力

use crate::error::Result;
use hair_ai_common::export::excel_core::{record_row, COLUMNS};
use hair_ai_common::AnalysisRecord;
use std::path::Path;

/// セル内のタブ・改行は空白に置き換える
fn clean_cell(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

pub fn render_text(records: &[AnalysisRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(
        COLUMNS
            .iter()
            .map(|(label, _)| *label)
            .collect::<Vec<_>>()
            .join("\t"),
    );
    for record in records {
        let row: Vec<String> = record_row(record).iter().map(|v| clean_cell(v)).collect();
        lines.push(row.join("\t"));
    }
    lines.join("\n") + "\n"
}

pub fn generate_text(records: &[AnalysisRecord], output_path: &Path) -> Result<()> {
    std::fs::write(output_path, render_text(records))?;
    Ok(())
}
