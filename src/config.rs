use crate::error::{HairAiError, Result};
use hair_ai_common::prompts::{
    DEFAULT_ANALYSIS_PROMPT, DEFAULT_ATTRIBUTE_PROMPT, DEFAULT_COUPON_PROMPT,
    DEFAULT_STYLIST_PROMPT, DEFAULT_TEMPLATE_MATCH_PROMPT,
};
use hair_ai_common::{PromptKind, PromptTemplate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
    pub template_matching: TemplateMatchingConfig,
    pub analysis: AnalysisConfig,
    pub prompts: PromptConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".into(),
            fallback_model: "gemini-1.5-flash".into(),
            temperature: 0.2,
            max_output_tokens: 1024,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_days: u32,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            max_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    /// モデル呼び出し前の待機（秒）
    pub api_delay: f64,
    /// モデルごとの試行回数の上限
    pub max_retries: u32,
    /// 試行間の待機（秒）
    pub retry_delay: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            api_delay: 1.0,
            max_retries: 3,
            retry_delay: 2.0,
        }
    }
}

impl ProcessingConfig {
    pub fn api_delay(&self) -> Duration {
        Duration::from_secs_f64(self.api_delay)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateMatchingConfig {
    pub enabled: bool,
    pub max_templates: usize,
    pub use_category_filter: bool,
    pub fallback_on_failure: bool,
    pub timeout_seconds: u64,
}

impl Default for TemplateMatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_templates: 50,
            use_category_filter: true,
            fallback_on_failure: true,
            timeout_seconds: 30,
        }
    }
}

impl TemplateMatchingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub categories: Vec<String>,
    pub length_choices: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let categories = [
            "最新トレンド", "髪質改善", "透明感カラー", "インナーカラー", "ハイライト",
            "ブリーチカラー", "ショート", "ボブ", "ミディアム", "ロング", "パーマ",
            "メンズカット", "ヘアアレンジ",
        ];
        let lengths = [
            "ベリーショート", "ショート", "ミディアム", "セミロング", "ロング", "ヘアセット",
        ];
        Self {
            categories: categories.iter().map(|s| s.to_string()).collect(),
            length_choices: lengths.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub attribute: String,
    pub analysis: String,
    pub stylist: String,
    pub coupon: String,
    pub template_match: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            attribute: DEFAULT_ATTRIBUTE_PROMPT.into(),
            analysis: DEFAULT_ANALYSIS_PROMPT.into(),
            stylist: DEFAULT_STYLIST_PROMPT.into(),
            coupon: DEFAULT_COUPON_PROMPT.into(),
            template_match: DEFAULT_TEMPLATE_MATCH_PROMPT.into(),
        }
    }
}

/// 検証済みプロンプト一式
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub attribute: PromptTemplate,
    pub analysis: PromptTemplate,
    pub stylist: PromptTemplate,
    pub coupon: PromptTemplate,
    pub template_match: PromptTemplate,
}

impl PromptConfig {
    pub fn compile(&self) -> Result<PromptSet> {
        let build = |kind: PromptKind, text: &str| {
            PromptTemplate::new(kind, text).map_err(|e| HairAiError::Config(e.to_string()))
        };
        Ok(PromptSet {
            attribute: build(PromptKind::Attribute, &self.attribute)?,
            analysis: build(PromptKind::Analysis, &self.analysis)?,
            stylist: build(PromptKind::Stylist, &self.stylist)?,
            coupon: build(PromptKind::Coupon, &self.coupon)?,
            template_match: build(PromptKind::TemplateMatch, &self.template_match)?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub cache_file: Option<PathBuf>,
    pub stylists: Option<PathBuf>,
    pub coupons: Option<PathBuf>,
    pub templates: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// 設定ファイルを読み込んで検証（ファイルがなければ既定値）
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content).map_err(|e| {
                HairAiError::Config(format!("{}: {}", config_path.display(), e))
            })?
        } else if path.is_some() {
            return Err(HairAiError::FileNotFound(config_path.display().to_string()));
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| HairAiError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("hair-ai").join("config.json"))
    }

    /// 起動時の検証。失敗したら画像処理を始めない
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(HairAiError::Config(msg.to_string()));

        if self.gemini.model.trim().is_empty() {
            return fail("gemini.model が空です");
        }
        if self.gemini.fallback_model.trim().is_empty() {
            return fail("gemini.fallback_model が空です");
        }
        if self.cache.max_size == 0 {
            return fail("cache.max_size は1以上にしてください");
        }
        if self.processing.batch_size == 0 {
            return fail("processing.batch_size は1以上にしてください");
        }
        if self.processing.max_retries == 0 {
            return fail("processing.max_retries は1以上にしてください");
        }
        if !self.processing.api_delay.is_finite() || self.processing.api_delay < 0.0 {
            return fail("processing.api_delay は0以上の数値にしてください");
        }
        if !self.processing.retry_delay.is_finite() || self.processing.retry_delay < 0.0 {
            return fail("processing.retry_delay は0以上の数値にしてください");
        }
        if self.template_matching.max_templates == 0 {
            return fail("template_matching.max_templates は1以上にしてください");
        }
        if self.template_matching.timeout_seconds == 0 {
            return fail("template_matching.timeout_seconds は1以上にしてください");
        }
        if self.analysis.categories.is_empty() {
            return fail("analysis.categories が空です");
        }
        if self.analysis.length_choices.is_empty() {
            return fail("analysis.length_choices が空です");
        }

        self.prompts.compile()?;
        Ok(())
    }

    /// キャッシュファイルの場所（未指定ならユーザーキャッシュディレクトリ）
    pub fn cache_file(&self) -> PathBuf {
        if let Some(path) = &self.paths.cache_file {
            return path.clone();
        }
        dirs::cache_dir()
            .map(|dir| dir.join("hair-ai").join("analysis_cache.json"))
            .unwrap_or_else(|| PathBuf::from(".hair-ai-cache.json"))
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.gemini.api_key.clone().ok_or(HairAiError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.gemini.api_key = Some(key);
        self.save()
    }
}
