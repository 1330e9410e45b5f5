//! 解析結果・カタログの型定義
//!
//! CLIとライブラリで共有される型:
//! - AnalysisResult: スタイル解析（カテゴリ・特徴・キーワード）
//! - AttributeResult: 性別・長さの属性判定
//! - StylistProfile / CouponOption / TemplateCandidate: 外部カタログ
//! - MatchDecision / TemplateMatch: テンプレート照合の出力
//! - AnalysisRecord: 1画像分の最終出力（ライターへ渡す単位）

use serde::{Deserialize, Serialize};
use std::fmt;

/// キーワードの最大件数（モデル出力の順序を保ったまま切り詰める）
pub const MAX_KEYWORDS: usize = 5;

/// テンプレート照合で返す候補数
pub const TOP_TEMPLATES: usize = 3;

/// スタイルの4特徴
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleFeatures {
    pub color: String,
    pub cut_technique: String,
    pub styling: String,
    pub impression: String,
}

/// スタイル解析結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisResult {
    /// 設定済みカテゴリから選ばれた1つ
    pub category: String,
    pub features: StyleFeatures,
    /// モデル出力順のキーワード（最大 MAX_KEYWORDS 件）
    pub keywords: Vec<String>,
}

/// 性別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "レディース")]
    Ladies,
    #[serde(rename = "メンズ")]
    Mens,
}

impl Sex {
    pub fn label(&self) -> &'static str {
        match self {
            Sex::Ladies => "レディース",
            Sex::Mens => "メンズ",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "レディース" | "ladies" => Ok(Sex::Ladies),
            "メンズ" | "mens" => Ok(Sex::Mens),
            _ => Err(format!("不正な性別: {}", s)),
        }
    }
}

/// 属性判定結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeResult {
    pub sex: Sex,
    /// 設定済みの長さ選択肢のいずれか
    pub length: String,
}

/// スタイリスト（スクレイパーが取得したカタログの1件）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylistProfile {
    pub name: String,
    #[serde(default)]
    pub specialties: String,
    #[serde(default)]
    pub description: String,
}

/// クーポン（番号はリスト内の位置で決まる）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponOption {
    pub name: String,
    #[serde(default)]
    pub price: Option<u32>,
    #[serde(default)]
    pub description: String,
}

/// スタイルテンプレート（CSVの1行）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCandidate {
    /// 1始まりのデータ行番号
    pub id: u32,
    pub category: String,
    pub title: String,
    pub menu: String,
    pub comment: String,
    pub hashtag: String,
    /// 対象性別（未指定なら照合に使わない）
    #[serde(default)]
    pub sex: Option<Sex>,
    /// 対象の長さ（未指定なら照合に使わない）
    #[serde(default)]
    pub length: Option<String>,
}

impl TemplateCandidate {
    /// タイトル・コメント・ハッシュタグを区切り文字で分割したトークン
    pub fn descriptor_tokens(&self) -> Vec<&str> {
        [self.title.as_str(), self.comment.as_str(), self.hashtag.as_str()]
            .iter()
            .flat_map(|text| {
                text.split(|c: char| c.is_whitespace() || matches!(c, '#' | ',' | '、' | '/' | '・'))
            })
            .filter(|token| !token.is_empty())
            .collect()
    }
}

/// テンプレート照合の1候補
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub template_id: u32,
    /// 1..=3（1が最優先）
    pub rank: u8,
    pub reason: String,
}

/// 照合モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Ai,
    Scoring,
    Cached,
}

/// テンプレート照合結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMatch {
    pub mode: MatchMode,
    pub decisions: Vec<MatchDecision>,
}

/// 選ばれたスタイリスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylistChoice {
    pub stylist: StylistProfile,
    pub reason: String,
    /// AIの選択ではなくデフォルト（先頭）を使った場合 true
    pub is_default: bool,
}

/// 選ばれたクーポン
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponChoice {
    /// 今回渡したリスト内の1始まり番号
    pub ordinal: usize,
    pub coupon: CouponOption,
    pub reason: String,
    pub is_default: bool,
}

/// 1画像分の最終出力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub image_name: String,
    pub image_path: String,
    pub analysis: AnalysisResult,
    pub attributes: Option<AttributeResult>,
    pub stylist: Option<StylistChoice>,
    pub coupon: Option<CouponChoice>,
    pub templates: Option<TemplateMatch>,
    /// テンプレート本体（decisions と同じ順）
    #[serde(default)]
    pub template_details: Vec<TemplateCandidate>,
    pub from_cache: bool,
}

impl AnalysisRecord {
    /// 第1候補のテンプレート
    pub fn top_template(&self) -> Option<&TemplateCandidate> {
        self.template_details.first()
    }

    pub fn stylist_name(&self) -> &str {
        self.stylist.as_ref().map(|s| s.stylist.name.as_str()).unwrap_or("")
    }

    pub fn coupon_name(&self) -> &str {
        self.coupon.as_ref().map(|c| c.coupon.name.as_str()).unwrap_or("")
    }

    pub fn style_title(&self) -> &str {
        self.top_template().map(|t| t.title.as_str()).unwrap_or("")
    }

    pub fn style_menu(&self) -> &str {
        self.top_template().map(|t| t.menu.as_str()).unwrap_or("")
    }

    pub fn hashtag(&self) -> &str {
        self.top_template().map(|t| t.hashtag.as_str()).unwrap_or("")
    }

    pub fn sex_label(&self) -> &str {
        self.attributes.as_ref().map(|a| a.sex.label()).unwrap_or("")
    }

    pub fn length(&self) -> &str {
        self.attributes.as_ref().map(|a| a.length.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_from_str() {
        assert_eq!("レディース".parse::<Sex>().unwrap(), Sex::Ladies);
        assert_eq!("Mens".parse::<Sex>().unwrap(), Sex::Mens);
        assert!("Unknown".parse::<Sex>().is_err());
    }

    #[test]
    fn test_sex_serialize_label() {
        let json = serde_json::to_string(&Sex::Ladies).unwrap();
        assert_eq!(json, "\"レディース\"");
    }

    #[test]
    fn test_descriptor_tokens() {
        let template = TemplateCandidate {
            id: 1,
            title: "ふんわり ミディアムボブ".to_string(),
            comment: "柔らかな質感、ナチュラル".to_string(),
            hashtag: "#ナチュラル,#アッシュ".to_string(),
            ..Default::default()
        };

        let tokens = template.descriptor_tokens();
        assert!(tokens.contains(&"ふんわり"));
        assert!(tokens.contains(&"ナチュラル"));
        assert!(tokens.contains(&"アッシュ"));
        assert!(!tokens.contains(&""));
    }

    #[test]
    fn test_record_accessors_without_matches() {
        let record = AnalysisRecord {
            image_name: "a.jpg".to_string(),
            image_path: "/tmp/a.jpg".to_string(),
            analysis: AnalysisResult::default(),
            attributes: None,
            stylist: None,
            coupon: None,
            templates: None,
            template_details: Vec::new(),
            from_cache: false,
        };

        assert_eq!(record.style_title(), "");
        assert_eq!(record.sex_label(), "");
        assert_eq!(record.coupon_name(), "");
    }
}
