//! Excel生成（CLI版）

use crate::error::{HairAiError, Result};
use hair_ai_common::export::excel_core::generate_excel_buffer;
use hair_ai_common::AnalysisRecord;
use std::path::Path;

/// シート名に使えない文字を置き換えて31文字に切り詰める
fn sheet_name(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .take(31)
        .collect();
    if name.trim().is_empty() {
        "解析結果".to_string()
    } else {
        name
    }
}

pub fn generate_excel(records: &[AnalysisRecord], output_path: &Path, title: &str) -> Result<()> {
    let buffer = generate_excel_buffer(records, &sheet_name(title)).map_err(HairAiError::ExcelGeneration)?;
    std::fs::write(output_path, buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_name_sanitized() {
        assert_eq!(sheet_name("2024/10 結果"), "2024_10 結果");
        assert_eq!(sheet_name(""), "解析結果");
        assert_eq!(sheet_name(&"あ".repeat(40)).chars().count(), 31);
    }
}
