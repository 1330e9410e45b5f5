//! Excel生成（共通ライブラリ）
//!
//! AnalysisRecord 1件を1行として、ヘッダー付きの一覧シートを生成する。

use crate::types::AnalysisRecord;
use rust_xlsxwriter::*;

/// 出力列（見出し, 列幅）
pub const COLUMNS: &[(&str, f64)] = &[
    ("画像名", 24.0),
    ("スタイリスト名", 16.0),
    ("クーポン名", 32.0),
    ("スタイルタイトル", 32.0),
    ("性別", 10.0),
    ("長さ", 12.0),
    ("スタイルメニュー", 20.0),
    ("ハッシュタグ", 36.0),
    ("候補1", 40.0),
    ("候補2", 40.0),
    ("候補3", 40.0),
];

/// 1レコードを列の並びで取り出す
pub fn record_row(record: &AnalysisRecord) -> Vec<String> {
    let mut row = vec![
        record.image_name.clone(),
        record.stylist_name().to_string(),
        record.coupon_name().to_string(),
        record.style_title().to_string(),
        record.sex_label().to_string(),
        record.length().to_string(),
        record.style_menu().to_string(),
        record.hashtag().to_string(),
    ];

    let decisions = record
        .templates
        .as_ref()
        .map(|m| m.decisions.as_slice())
        .unwrap_or(&[]);
    for rank in 0..3 {
        let cell = match (decisions.get(rank), record.template_details.get(rank)) {
            (Some(decision), Some(template)) => format!("{} ({})", template.title, decision.reason),
            (Some(decision), None) => format!("ID {} ({})", decision.template_id, decision.reason),
            _ => String::new(),
        };
        row.push(cell);
    }

    row
}

/// Excelをバッファに生成
pub fn generate_excel_buffer(records: &[AnalysisRecord], sheet_name: &str) -> Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_size(10.0)
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xAAAAAA));

    let value_format = Format::new()
        .set_font_size(10.0)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)
        .map_err(|e| format!("シート名設定エラー: {}", e))?;

    for (col, (label, width)) in COLUMNS.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, *width)
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
        worksheet.write_string_with_format(0, col, *label, &header_format)
            .map_err(|e| format!("見出し書き込みエラー: {}", e))?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in record_row(record).iter().enumerate() {
            worksheet.write_string_with_format(row, col as u16, value, &value_format)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
        }
    }

    worksheet.set_freeze_panes(1, 0)
        .map_err(|e| format!("ウィンドウ枠固定エラー: {}", e))?;

    workbook.save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AnalysisResult, AttributeResult, MatchDecision, MatchMode, Sex, TemplateCandidate,
        TemplateMatch,
    };

    fn record() -> AnalysisRecord {
        AnalysisRecord {
            image_name: "style1.jpg".to_string(),
            image_path: String::new(),
            analysis: AnalysisResult::default(),
            attributes: Some(AttributeResult { sex: Sex::Mens, length: "ショート".into() }),
            stylist: None,
            coupon: None,
            templates: Some(TemplateMatch {
                mode: MatchMode::Scoring,
                decisions: vec![MatchDecision { template_id: 2, rank: 1, reason: "スコア 10".into() }],
            }),
            template_details: vec![TemplateCandidate {
                id: 2,
                title: "ツーブロック".into(),
                menu: "カット".into(),
                hashtag: "#メンズ".into(),
                ..Default::default()
            }],
            from_cache: false,
        }
    }

    #[test]
    fn test_record_row_columns() {
        let row = record_row(&record());
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "style1.jpg");
        assert_eq!(row[3], "ツーブロック");
        assert_eq!(row[4], "メンズ");
        assert_eq!(row[6], "カット");
        assert_eq!(row[8], "ツーブロック (スコア 10)");
        assert_eq!(row[9], "");
    }

    #[test]
    fn test_generate_excel_buffer() {
        let buffer = generate_excel_buffer(&[record()], "スタイル一覧").unwrap();
        // xlsx は zip 形式
        assert!(buffer.starts_with(b"PK"));
    }
}
