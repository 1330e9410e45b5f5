//! カタログファイルの読み込み
//!
//! stylists.json / coupons.json はスクレイパーが保存したJSON配列、
//! templates.csv はテンプレートマスタ。実行中は読み取り専用。

use crate::error::{HairAiError, Result};
use hair_ai_common::{CouponOption, StylistProfile, TemplateCatalog};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Catalogs {
    pub stylists: Arc<Vec<StylistProfile>>,
    pub coupons: Arc<Vec<CouponOption>>,
    pub templates: Arc<TemplateCatalog>,
}

impl Catalogs {
    pub fn new(stylists: Vec<StylistProfile>, coupons: Vec<CouponOption>, templates: TemplateCatalog) -> Self {
        Self {
            stylists: Arc::new(stylists),
            coupons: Arc::new(coupons),
            templates: Arc::new(templates),
        }
    }

    /// 指定されたファイルだけ読み込む（未指定のカタログは空）
    pub fn load(stylists: Option<&Path>, coupons: Option<&Path>, templates: Option<&Path>) -> Result<Self> {
        let stylists: Vec<StylistProfile> = match stylists {
            Some(path) => load_json_list(path)?,
            None => Vec::new(),
        };
        if let Some(s) = stylists.iter().find(|s| s.name.trim().is_empty()) {
            return Err(HairAiError::InvalidCatalog(format!("名前が空のスタイリストがあります: {:?}", s)));
        }

        let coupons: Vec<CouponOption> = match coupons {
            Some(path) => load_json_list(path)?,
            None => Vec::new(),
        };
        if coupons.iter().any(|c| c.name.trim().is_empty()) {
            return Err(HairAiError::InvalidCatalog("名前が空のクーポンがあります".into()));
        }

        let templates = match templates {
            Some(path) => {
                if !path.exists() {
                    return Err(HairAiError::FileNotFound(path.display().to_string()));
                }
                TemplateCatalog::from_csv(path)
                    .map_err(|e| HairAiError::InvalidCatalog(format!("{}: {}", path.display(), e)))?
            }
            None => TemplateCatalog::default(),
        };

        info!(
            stylists = stylists.len(),
            coupons = coupons.len(),
            templates = templates.len(),
            "カタログを読み込みました"
        );
        Ok(Self::new(stylists, coupons, templates))
    }
}

fn load_json_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(HairAiError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| HairAiError::InvalidCatalog(format!("{}: {}", path.display(), e)))
}
