//! Hair AI Common Library
//!
//! 画像解析パイプラインとライターで共有される型とユーティリティ

pub mod types;
pub mod error;
pub mod prompts;
pub mod parser;
pub mod catalog;
pub mod scoring;
pub mod export;

pub use types::{
    AnalysisRecord, AnalysisResult, AttributeResult, CouponChoice, CouponOption, MatchDecision,
    MatchMode, Sex, StyleFeatures, StylistChoice, StylistProfile, TemplateCandidate,
    TemplateMatch, MAX_KEYWORDS, TOP_TEMPLATES,
};
pub use error::{Error, Result};
pub use prompts::{PromptKind, PromptTemplate, Slot};
pub use parser::{
    extract_json, parse_analysis_response, parse_attribute_response, parse_coupon_response,
    parse_stylist_response, parse_template_response,
};
pub use catalog::TemplateCatalog;
pub use scoring::{rank_templates, score_template, TemplateScore};
