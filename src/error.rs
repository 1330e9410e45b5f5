use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// パイプラインの処理段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scan,
    Features,
    Attributes,
    Template,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Scan => "画像読み込み",
            Stage::Features => "スタイル解析",
            Stage::Attributes => "属性判定",
            Stage::Template => "テンプレート照合",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum HairAiError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。GEMINI_API_KEY を設定するか `hair-ai config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像が見つかりません: {0}")]
    NoImagesFound(String),

    #[error("カタログが不正: {0}")]
    InvalidCatalog(String),

    /// モデル呼び出しが主・予備モデルとも失敗
    #[error("モデル呼び出しエラー: {0}")]
    ModelCall(String),

    /// モデル出力がスキーマ・許可値に合わない
    #[error("モデル出力の検証エラー: {0}")]
    Validation(String),

    /// 再試行・フォールバックを使い切った段階の失敗
    #[error("{stage}に失敗: {cause}")]
    TerminalStage { stage: Stage, cause: String },

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] hair_ai_common::Error),
}

impl HairAiError {
    pub fn terminal(stage: Stage, cause: impl fmt::Display) -> Self {
        HairAiError::TerminalStage {
            stage,
            cause: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HairAiError>;
