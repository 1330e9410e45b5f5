pub mod excel;
pub mod text;

use crate::error::Result;
use crate::pipeline::StageFailure;
use clap::ValueEnum;
use hair_ai_common::AnalysisRecord;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// 出力形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Excel,
    Text,
    Both,
}

fn output_path_for_format(output: &Path, title: &str, extension: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", title, extension))
    } else {
        output.with_extension(extension)
    }
}

/// 出力先がファイル名ならその親ディレクトリ
pub fn output_dir(output: &Path) -> &Path {
    if output.is_dir() || output.extension().is_none() {
        output
    } else {
        output.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// レコードを書き出し、生成したファイルのパスを返す
pub fn export_records(
    records: &[AnalysisRecord],
    format: ExportFormat,
    output: &Path,
    title: &str,
) -> Result<Vec<PathBuf>> {
    let dir = output_dir(output);
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)?;
    }

    let mut written = Vec::new();

    if matches!(format, ExportFormat::Excel | ExportFormat::Both) {
        let path = output_path_for_format(output, title, "xlsx");
        excel::generate_excel(records, &path, title)?;
        written.push(path);
    }

    if matches!(format, ExportFormat::Text | ExportFormat::Both) {
        let path = output_path_for_format(output, title, "txt");
        text::generate_text(records, &path)?;
        written.push(path);
    }

    Ok(written)
}

/// 失敗一覧（画像名, 段階, 原因）を書き出す。失敗がなければ何もしない
pub fn write_failures(failures: &[StageFailure], output_dir: &Path) -> Result<Option<PathBuf>> {
    if failures.is_empty() {
        return Ok(None);
    }

    let mut content = String::new();
    for failure in failures {
        let _ = writeln!(content, "{}\t{}\t{}", failure.image_name, failure.stage, failure.cause);
    }

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join("failures.txt");
    std::fs::write(&path, content)?;
    Ok(Some(path))
}
