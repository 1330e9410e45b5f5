use crate::export::ExportFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hair-ai")]
#[command(about = "ヘアスタイル画像のAI解析・スタイリスト/クーポン/テンプレート照合ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（省略時は ~/.config/hair-ai/config.json）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像フォルダを解析して一覧を出力
    Analyze {
        /// 画像フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        /// スタイリスト一覧JSON
        #[arg(long)]
        stylists: Option<PathBuf>,

        /// クーポン一覧JSON
        #[arg(long)]
        coupons: Option<PathBuf>,

        /// テンプレートCSV
        #[arg(long)]
        templates: Option<PathBuf>,

        /// 出力先（ディレクトリまたはファイル、省略時は入力フォルダ）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 出力形式 (excel/text/both)
        #[arg(short, long, value_enum, default_value = "both")]
        format: ExportFormat,

        /// バッチサイズ（設定値を上書き）
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// キャッシュを使わない
        #[arg(long)]
        no_cache: bool,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
