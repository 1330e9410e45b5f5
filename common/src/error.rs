//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// レスポンスからJSONを取り出せない・スキーマに合わない
    #[error("Parse error: {0}")]
    Parse(String),

    /// スキーマには合うが値が許可範囲外
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// モデル出力の不備（再試行の対象）かどうか
    pub fn is_model_output_error(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Validation(_))
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
