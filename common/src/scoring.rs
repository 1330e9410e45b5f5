//! テンプレートのスコアリング照合
//!
//! AI照合が無効・失敗したときに使う決定的な順位付け。
//! スコア = カテゴリ一致 + キーワード一致数 + 性別一致 + 長さ一致（重みは定数で固定）。
//! 同点はテンプレートIDの昇順。

use crate::types::{AnalysisResult, AttributeResult, MatchDecision, TemplateCandidate, TOP_TEMPLATES};

/// カテゴリ完全一致の加点
pub const CATEGORY_WEIGHT: u32 = 10;
/// 一致したキーワード1つあたりの加点
pub const KEYWORD_WEIGHT: u32 = 3;
/// 性別一致の加点
pub const SEX_WEIGHT: u32 = 2;
/// 長さ一致の加点
pub const LENGTH_WEIGHT: u32 = 2;

/// 1テンプレートの採点内訳
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateScore {
    pub template_id: u32,
    pub category_match: bool,
    pub matched_keywords: Vec<String>,
    pub sex_match: bool,
    pub length_match: bool,
}

impl TemplateScore {
    pub fn total(&self) -> u32 {
        let mut score = self.matched_keywords.len() as u32 * KEYWORD_WEIGHT;
        if self.category_match {
            score += CATEGORY_WEIGHT;
        }
        if self.sex_match {
            score += SEX_WEIGHT;
        }
        if self.length_match {
            score += LENGTH_WEIGHT;
        }
        score
    }

    /// 加点要因を列挙した理由文
    pub fn reason(&self) -> String {
        let mut factors = Vec::new();
        if self.category_match {
            factors.push("カテゴリ一致".to_string());
        }
        if !self.matched_keywords.is_empty() {
            factors.push(format!("キーワード一致({})", self.matched_keywords.join(", ")));
        }
        if self.sex_match {
            factors.push("性別一致".to_string());
        }
        if self.length_match {
            factors.push("長さ一致".to_string());
        }

        if factors.is_empty() {
            format!("スコア {}: 一致要素なし", self.total())
        } else {
            format!("スコア {}: {}", self.total(), factors.join(" / "))
        }
    }
}

/// 1テンプレートを採点
pub fn score_template(
    template: &TemplateCandidate,
    analysis: &AnalysisResult,
    attributes: Option<&AttributeResult>,
) -> TemplateScore {
    let tokens = template.descriptor_tokens();

    let mut matched_keywords: Vec<String> = Vec::new();
    for keyword in &analysis.keywords {
        let keyword = keyword.trim();
        if keyword.is_empty() || matched_keywords.iter().any(|k| k == keyword) {
            continue;
        }
        if tokens.iter().any(|token| token.contains(keyword)) {
            matched_keywords.push(keyword.to_string());
        }
    }

    let sex_match = match (attributes, template.sex) {
        (Some(attr), Some(sex)) => attr.sex == sex,
        _ => false,
    };
    let length_match = match (attributes, template.length.as_deref()) {
        (Some(attr), Some(length)) => attr.length == length,
        _ => false,
    };

    TemplateScore {
        template_id: template.id,
        category_match: template.category == analysis.category,
        matched_keywords,
        sex_match,
        length_match,
    }
}

/// 候補を採点し、上位 TOP_TEMPLATES 件を順位付きで返す
pub fn rank_templates<'a, I>(
    candidates: I,
    analysis: &AnalysisResult,
    attributes: Option<&AttributeResult>,
) -> Vec<MatchDecision>
where
    I: IntoIterator<Item = &'a TemplateCandidate>,
{
    let mut scores: Vec<TemplateScore> = candidates
        .into_iter()
        .map(|t| score_template(t, analysis, attributes))
        .collect();

    scores.sort_by(|a, b| {
        b.total()
            .cmp(&a.total())
            .then_with(|| a.template_id.cmp(&b.template_id))
    });

    scores
        .into_iter()
        .take(TOP_TEMPLATES)
        .enumerate()
        .map(|(i, score)| MatchDecision {
            template_id: score.template_id,
            rank: (i + 1) as u8,
            reason: score.reason(),
        })
        .collect()
}
