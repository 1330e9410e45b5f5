//! プロンプト生成モジュール
//!
//! プロンプトは呼び出し種別ごとに決まった名前付きスロットを持つ。
//! - Slot: `{categories}` などのスロット名
//! - PromptKind: 呼び出し種別と必須スロット
//! - PromptTemplate: 読み込み時に検証済みのテンプレート
//! - format_*: カタログや解析結果をスロット値へ整形

use crate::error::{Error, Result};
use crate::types::{
    AnalysisResult, AttributeResult, CouponOption, StylistProfile, TemplateCandidate,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref SLOT_PATTERN: Regex = Regex::new(r"\{([a-z_]+)\}").unwrap();
}

/// プロンプトのスロット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Categories,
    LengthChoices,
    Stylists,
    Coupons,
    CouponCount,
    Category,
    Color,
    CutTechnique,
    Styling,
    Impression,
    AnalysisInfo,
    Templates,
}

impl Slot {
    pub const ALL: [Slot; 12] = [
        Slot::Categories,
        Slot::LengthChoices,
        Slot::Stylists,
        Slot::Coupons,
        Slot::CouponCount,
        Slot::Category,
        Slot::Color,
        Slot::CutTechnique,
        Slot::Styling,
        Slot::Impression,
        Slot::AnalysisInfo,
        Slot::Templates,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Slot::Categories => "categories",
            Slot::LengthChoices => "length_choices",
            Slot::Stylists => "stylists",
            Slot::Coupons => "coupons",
            Slot::CouponCount => "coupon_count",
            Slot::Category => "category",
            Slot::Color => "color",
            Slot::CutTechnique => "cut_technique",
            Slot::Styling => "styling",
            Slot::Impression => "impression",
            Slot::AnalysisInfo => "analysis_info",
            Slot::Templates => "templates",
        }
    }

    pub fn from_name(name: &str) -> Option<Slot> {
        Slot::ALL.iter().copied().find(|slot| slot.name() == name)
    }
}

/// モデル呼び出しの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Attribute,
    Analysis,
    Stylist,
    Coupon,
    TemplateMatch,
}

impl PromptKind {
    pub fn name(&self) -> &'static str {
        match self {
            PromptKind::Attribute => "attribute",
            PromptKind::Analysis => "analysis",
            PromptKind::Stylist => "stylist",
            PromptKind::Coupon => "coupon",
            PromptKind::TemplateMatch => "template_match",
        }
    }

    /// 必ず含まれていなければならないスロット
    pub fn required_slots(&self) -> &'static [Slot] {
        match self {
            PromptKind::Attribute => &[Slot::LengthChoices],
            PromptKind::Analysis => &[Slot::Categories],
            PromptKind::Stylist => &[
                Slot::Stylists,
                Slot::Category,
                Slot::Color,
                Slot::CutTechnique,
                Slot::Styling,
                Slot::Impression,
            ],
            PromptKind::Coupon => &[
                Slot::Coupons,
                Slot::CouponCount,
                Slot::Category,
                Slot::Color,
                Slot::CutTechnique,
                Slot::Styling,
                Slot::Impression,
            ],
            PromptKind::TemplateMatch => &[Slot::AnalysisInfo, Slot::Templates],
        }
    }

    /// 使ってよいスロット（必須スロットがそのまま許可範囲）
    pub fn allows(&self, slot: Slot) -> bool {
        self.required_slots().contains(&slot)
    }
}

/// 検証済みプロンプトテンプレート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    kind: PromptKind,
    text: String,
}

impl PromptTemplate {
    /// スロットを検証してテンプレートを作成
    ///
    /// 必須スロットの欠落と、種別に属さないスロットはどちらも設定エラー。
    pub fn new(kind: PromptKind, text: impl Into<String>) -> Result<Self> {
        let text = text.into();

        for caps in SLOT_PATTERN.captures_iter(&text) {
            let name = &caps[1];
            match Slot::from_name(name) {
                Some(slot) if kind.allows(slot) => {}
                _ => {
                    return Err(Error::Config(format!(
                        "{}プロンプトに未定義のスロット {{{}}} があります",
                        kind.name(),
                        name
                    )))
                }
            }
        }

        for slot in kind.required_slots() {
            let placeholder = format!("{{{}}}", slot.name());
            if !text.contains(&placeholder) {
                return Err(Error::Config(format!(
                    "{}プロンプトに必須スロット {} がありません",
                    kind.name(),
                    placeholder
                )));
            }
        }

        Ok(Self { kind, text })
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    /// スロットに値を埋め込む
    pub fn render(&self, values: &HashMap<Slot, String>) -> Result<String> {
        let mut missing = None;
        let rendered = SLOT_PATTERN.replace_all(&self.text, |caps: &regex::Captures| {
            let slot = Slot::from_name(&caps[1]);
            match slot.and_then(|s| values.get(&s)) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });

        if let Some(name) = missing {
            return Err(Error::Config(format!(
                "{}プロンプトのスロット {{{}}} に値がありません",
                self.kind.name(),
                name
            )));
        }

        Ok(rendered.into_owned())
    }
}

/// 特徴4項目とカテゴリのスロット値
pub fn feature_slots(analysis: &AnalysisResult) -> HashMap<Slot, String> {
    let mut values = HashMap::new();
    values.insert(Slot::Category, analysis.category.clone());
    values.insert(Slot::Color, analysis.features.color.clone());
    values.insert(Slot::CutTechnique, analysis.features.cut_technique.clone());
    values.insert(Slot::Styling, analysis.features.styling.clone());
    values.insert(Slot::Impression, analysis.features.impression.clone());
    values
}

/// スタイリスト一覧をプロンプト用に整形
pub fn format_stylists(stylists: &[StylistProfile]) -> String {
    stylists
        .iter()
        .map(|s| {
            format!(
                "- 名前: {}\n  得意な技術: {}\n  説明: {}",
                s.name, s.specialties, s.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// クーポン一覧を番号付きで整形
pub fn format_coupons(coupons: &[CouponOption]) -> String {
    coupons
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let price = c
                .price
                .map(|p| format!("{}円", p))
                .unwrap_or_else(|| "-".to_string());
            format!("{}. {} (価格: {}) {}", i + 1, c.name, price, c.description)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// テンプレート候補を整形
pub fn format_templates(templates: &[TemplateCandidate]) -> String {
    templates
        .iter()
        .map(|t| {
            format!(
                "ID: {}\nカテゴリ: {}\nタイトル: {}\nメニュー: {}\nコメント: {}\nハッシュタグ: {}",
                t.id, t.category, t.title, t.menu, t.comment, t.hashtag
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// テンプレート照合用の解析サマリー
pub fn format_analysis_info(analysis: &AnalysisResult, attributes: Option<&AttributeResult>) -> String {
    let mut lines = vec![
        format!("カテゴリ: {}", analysis.category),
        format!("髪色: {}", analysis.features.color),
        format!("カット技法: {}", analysis.features.cut_technique),
        format!("スタイリング: {}", analysis.features.styling),
        format!("印象: {}", analysis.features.impression),
        format!("キーワード: {}", analysis.keywords.join(", ")),
    ];
    if let Some(attr) = attributes {
        lines.push(format!("性別: {}", attr.sex));
        lines.push(format!("長さ: {}", attr.length));
    }
    lines.join("\n")
}

/// 属性判定プロンプト（既定）
pub const DEFAULT_ATTRIBUTE_PROMPT: &str = r#"あなたはヘアサロンのスタイル分類担当です。
画像のヘアスタイルの性別と長さを判定してください。

## 長さの選択肢
{length_choices}

## 出力形式（厳密にこのJSONオブジェクトで出力）
{"sex": "レディース または メンズ", "length": "長さの選択肢から1つ"}

- 長さは上記リスト以外を出力しない
- JSONのみ出力。説明文は不要"#;

/// スタイル解析プロンプト（既定）
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"あなたはプロのヘアスタイリストです。
画像のヘアスタイルを分析してください。

## カテゴリ
以下から最も適切なものを1つ選択：
{categories}

## 出力形式（厳密にこのJSONオブジェクトで出力）
{"category": "カテゴリ", "features": {"color": "髪色", "cut_technique": "カット技法", "styling": "スタイリング", "impression": "印象"}, "keywords": ["キーワード1", "キーワード2", "キーワード3"]}

- キーワードは5個以内
- JSONのみ出力。説明文は不要"#;

/// スタイリスト選択プロンプト（既定）
pub const DEFAULT_STYLIST_PROMPT: &str = r#"以下のヘアスタイルに最も合うスタイリストを1名選んでください。

## スタイリスト一覧
{stylists}

## ヘアスタイル
カテゴリ: {category}
髪色: {color}
カット技法: {cut_technique}
スタイリング: {styling}
印象: {impression}

## 出力形式（厳密にこのJSONオブジェクトで出力）
{"stylist_name": "一覧にある名前をそのまま", "reason": "選んだ理由"}"#;

/// クーポン選択プロンプト（既定）
pub const DEFAULT_COUPON_PROMPT: &str = r#"以下のヘアスタイルに最も合うクーポンを番号で1つ選んでください。

## クーポン一覧（全{coupon_count}件）
{coupons}

## ヘアスタイル
カテゴリ: {category}
髪色: {color}
カット技法: {cut_technique}
スタイリング: {styling}
印象: {impression}

## 出力形式（厳密にこのJSONオブジェクトで出力）
{"coupon_number": 1から{coupon_count}の整数, "reason": "選んだ理由"}

- クーポン名ではなく番号を出力"#;

/// テンプレート照合プロンプト（既定）
pub const DEFAULT_TEMPLATE_MATCH_PROMPT: &str = r#"ヘアスタイルの解析結果に合うテンプレートを優先度順に3つ選んでください。

## 解析結果
{analysis_info}

## テンプレート候補
{templates}

## 出力形式（厳密にこのJSONオブジェクトで出力）
{"selections": [{"template_id": ID, "reason": "理由"}, {"template_id": ID, "reason": "理由"}, {"template_id": ID, "reason": "理由"}]}

- template_id は候補のIDのみ、重複なし
- JSONのみ出力。説明文は不要"#;
