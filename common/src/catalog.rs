//! スタイルテンプレートカタログ
//!
//! テンプレートCSV（category,title,menu,comment,hashtag[,sex,length]）を読み込み、
//! テンプレート照合の候補を提供する。IDは1始まりのデータ行番号。

use crate::error::{Error, Result};
use crate::types::{Sex, TemplateCandidate};
use serde::{Deserialize, Serialize};

/// 必須の列数
const REQUIRED_COLUMNS: usize = 5;

/// テンプレート一覧
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateCatalog {
    templates: Vec<TemplateCandidate>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<TemplateCandidate>) -> Self {
        Self { templates }
    }

    /// CSVファイルから読み込み
    pub fn from_csv(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(&content)
    }

    /// CSV文字列から読み込み
    ///
    /// 列数が足りない行はスキップする（IDは欠番になる）。sex/length 列は空なら未指定。
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let content = content.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let header = reader.headers()?.clone();
        if header.len() < REQUIRED_COLUMNS {
            return Err(Error::Parse(format!(
                "テンプレートCSVのヘッダーが不正です: {}",
                header.iter().collect::<Vec<_>>().join(",")
            )));
        }

        let mut templates = Vec::new();

        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let id = index as u32 + 1;
            if record.len() < REQUIRED_COLUMNS {
                continue;
            }

            let field = |i: usize| record.get(i).unwrap_or_default().to_string();
            let sex = record
                .get(5)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<Sex>().ok());
            let length = record
                .get(6)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());

            templates.push(TemplateCandidate {
                id,
                category: field(0),
                title: field(1),
                menu: field(2),
                comment: field(3),
                hashtag: field(4),
                sex,
                length,
            });
        }

        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[TemplateCandidate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&TemplateCandidate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// カテゴリで絞り込み
    pub fn filter_by_category(&self, category: &str) -> Vec<&TemplateCandidate> {
        self.templates
            .iter()
            .filter(|t| t.category == category)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "category,title,menu,comment,hashtag,sex,length
ボブ,ふんわりミディアムボブ,カット+カラー,柔らかな質感,\"#ナチュラル,#ボブ\",レディース,ミディアム
メンズ,爽やかツーブロック,カット,清潔感のあるショート,#ツーブロック,メンズ,ショート
ボブ,切りっぱなしボブ,カット,,#切りっぱなし,,
短すぎる行,x
";

    #[test]
    fn test_from_csv_str() {
        let catalog = TemplateCatalog::from_csv_str(SAMPLE_CSV).unwrap();
        assert_eq!(catalog.len(), 3);

        let first = catalog.get(1).unwrap();
        assert_eq!(first.title, "ふんわりミディアムボブ");
        assert_eq!(first.hashtag, "#ナチュラル,#ボブ");
        assert_eq!(first.sex, Some(Sex::Ladies));
        assert_eq!(first.length.as_deref(), Some("ミディアム"));

        let third = catalog.get(3).unwrap();
        assert_eq!(third.sex, None);
        assert_eq!(third.length, None);
    }

    #[test]
    fn test_ids_follow_data_rows() {
        let catalog = TemplateCatalog::from_csv_str(SAMPLE_CSV).unwrap();
        let ids: Vec<u32> = catalog.templates().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_filter_by_category() {
        let catalog = TemplateCatalog::from_csv_str(SAMPLE_CSV).unwrap();
        assert_eq!(catalog.filter_by_category("ボブ").len(), 2);
        assert!(catalog.filter_by_category("ロング").is_empty());
    }

    #[test]
    fn test_empty_csv() {
        assert!(TemplateCatalog::from_csv_str("").is_err());
    }

    #[test]
    fn test_multiline_and_escaped_quotes_keep_ids() {
        let csv = "category,title,menu,comment,hashtag\n\
                   ボブ,\"\"\"大人\"\"ボブ\",カット,\"1行目\n2行目\",#ボブ\n\
                   ショート,ベリーショート,カット,,#ショート\n";
        let catalog = TemplateCatalog::from_csv_str(csv).unwrap();
        assert_eq!(catalog.len(), 2);

        let first = catalog.get(1).unwrap();
        assert_eq!(first.title, "\"大人\"ボブ");
        assert_eq!(first.comment, "1行目\n2行目");
        assert_eq!(catalog.get(2).unwrap().title, "ベリーショート");
    }

    #[test]
    fn test_short_row_leaves_gap_in_ids() {
        let csv = "category,title,menu,comment,hashtag\nx,y\nボブ,ボブA,カット,,\n";
        let catalog = TemplateCatalog::from_csv_str(csv).unwrap();
        let ids: Vec<u32> = catalog.templates().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_bom_is_stripped() {
        let csv = "\u{feff}category,title,menu,comment,hashtag\nボブ,ボブA,カット,,\n";
        let catalog = TemplateCatalog::from_csv_str(csv).unwrap();
        assert_eq!(catalog.get(1).unwrap().category, "ボブ");
    }
}
