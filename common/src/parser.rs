//! APIレスポンスパーサー
//!
//! モデルのレスポンスからJSONオブジェクトを抽出し、呼び出し種別ごとの
//! 厳密なスキーマで検証する。フィールド名の過不足はすべてパース失敗。

use crate::error::{Error, Result};
use crate::types::{
    AnalysisResult, AttributeResult, CouponOption, MatchDecision, Sex, StylistProfile,
    MAX_KEYWORDS,
};
use serde::Deserialize;
use std::collections::HashSet;

/// APIレスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト
/// 3. エラー
///
/// # Examples
/// ```
/// use hair_ai_common::extract_json;
///
/// let response = "結果: {\"key\": \"value\"}";
/// let json = extract_json(response).unwrap();
/// assert_eq!(json, "{\"key\": \"value\"}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7;
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

fn parse_schema<'a, T: Deserialize<'a>>(response: &'a str, label: &str) -> Result<T> {
    let json_str = extract_json(response)?;
    serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("{} JSONパースエラー: {}", label, e)))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttribute {
    sex: String,
    length: String,
}

/// 属性判定レスポンスをパース
///
/// `sex` はレディース/メンズ、`length` は `length_choices` のいずれかでなければならない。
pub fn parse_attribute_response(response: &str, length_choices: &[String]) -> Result<AttributeResult> {
    let raw: RawAttribute = parse_schema(response, "属性判定")?;

    let sex: Sex = raw.sex.parse().map_err(Error::Validation)?;

    let length = raw.length.trim();
    if !length_choices.iter().any(|c| c == length) {
        return Err(Error::Validation(format!("長さが選択肢にありません: {}", raw.length)));
    }

    Ok(AttributeResult {
        sex,
        length: length.to_string(),
    })
}

/// スタイル解析レスポンスをパース
///
/// `category` は `categories` のいずれか。キーワードは先頭から MAX_KEYWORDS 件に切り詰める。
pub fn parse_analysis_response(response: &str, categories: &[String]) -> Result<AnalysisResult> {
    let mut analysis: AnalysisResult = parse_schema(response, "スタイル解析")?;

    analysis.category = analysis.category.trim().to_string();
    if !categories.iter().any(|c| *c == analysis.category) {
        return Err(Error::Validation(format!(
            "カテゴリが選択肢にありません: {}",
            analysis.category
        )));
    }

    let features = &analysis.features;
    for (field, value) in [
        ("color", &features.color),
        ("cut_technique", &features.cut_technique),
        ("styling", &features.styling),
        ("impression", &features.impression),
    ] {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!("特徴 {} が空です", field)));
        }
    }

    analysis.keywords.retain(|k| !k.trim().is_empty());
    analysis.keywords.truncate(MAX_KEYWORDS);

    Ok(analysis)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStylistSelection {
    stylist_name: String,
    reason: String,
}

/// スタイリスト選択レスポンスをパースし、カタログの添字と理由を返す
///
/// 名前は大文字小文字を区別した完全一致のみ受け付ける。
pub fn parse_stylist_response(response: &str, stylists: &[StylistProfile]) -> Result<(usize, String)> {
    let raw: RawStylistSelection = parse_schema(response, "スタイリスト選択")?;

    stylists
        .iter()
        .position(|s| s.name == raw.stylist_name)
        .map(|index| (index, raw.reason))
        .ok_or_else(|| {
            Error::Validation(format!("スタイリストが一覧にありません: {}", raw.stylist_name))
        })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCouponSelection {
    coupon_number: i64,
    reason: String,
}

/// クーポン選択レスポンスをパースし、1始まりの番号と理由を返す
///
/// 番号は整数のみ。クーポン名などの文字列はパース失敗として扱う。
pub fn parse_coupon_response(response: &str, coupons: &[CouponOption]) -> Result<(usize, String)> {
    let raw: RawCouponSelection = parse_schema(response, "クーポン選択")?;

    let count = coupons.len() as i64;
    if raw.coupon_number < 1 || raw.coupon_number > count {
        return Err(Error::Validation(format!(
            "クーポン番号が範囲外です: {} (1-{})",
            raw.coupon_number, count
        )));
    }

    Ok((raw.coupon_number as usize, raw.reason))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplateSelection {
    template_id: u32,
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplateSelections {
    selections: Vec<RawTemplateSelection>,
}

/// テンプレート照合レスポンスをパース
///
/// ちょうど `expected` 件、重複なし、すべて `candidate_ids` に含まれること。
/// 順位はレスポンスの順に 1 から振る。
pub fn parse_template_response(
    response: &str,
    candidate_ids: &[u32],
    expected: usize,
) -> Result<Vec<MatchDecision>> {
    let raw: RawTemplateSelections = parse_schema(response, "テンプレート照合")?;

    if raw.selections.len() != expected {
        return Err(Error::Validation(format!(
            "テンプレート候補数が不正です: {}件（期待値 {}件）",
            raw.selections.len(),
            expected
        )));
    }

    let mut seen = HashSet::new();
    let mut decisions = Vec::with_capacity(expected);

    for (index, selection) in raw.selections.into_iter().enumerate() {
        if !candidate_ids.contains(&selection.template_id) {
            return Err(Error::Validation(format!(
                "候補にないテンプレートIDです: {}",
                selection.template_id
            )));
        }
        if !seen.insert(selection.template_id) {
            return Err(Error::Validation(format!(
                "テンプレートIDが重複しています: {}",
                selection.template_id
            )));
        }
        decisions.push(MatchDecision {
            template_id: selection.template_id,
            rank: (index + 1) as u8,
            reason: selection.reason,
        });
    }

    Ok(decisions)
}
