use crate::analyzer::cache::content_key;
use crate::error::{HairAiError, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use walkdir::WalkDir;

/// 1枚の元画像（読み込み後は不変）
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub name: String,
    pub path: PathBuf,
    /// 画像内容のSHA-256（キャッシュキー）
    pub key: String,
    pub mime_type: &'static str,
    pub content: Arc<Vec<u8>>,
}

impl ImageHandle {
    pub fn from_bytes(name: impl Into<String>, path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        let path = path.into();
        let mime_type = mime_type_for(&path);
        Self {
            name: name.into(),
            key: content_key(&content),
            mime_type,
            path,
            content: Arc::new(content),
        }
    }
}

/// スキャン結果
#[derive(Debug, Default)]
pub struct ScanResult {
    pub images: Vec<ImageHandle>,
    /// 読み込めなかったファイル（ファイル名, 原因）
    pub unreadable: Vec<(String, String)>,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

pub fn scan_folder(folder: &Path, recursive: bool) -> Result<ScanResult> {
    if !folder.exists() {
        return Err(HairAiError::FolderNotFound(folder.display().to_string()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|ext| is_image_extension(&ext.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();

    // ファイル名でソート
    paths.sort();

    // 読み込みとハッシュ計算は並列
    let loaded: Vec<std::result::Result<ImageHandle, (String, String)>> = paths
        .par_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            std::fs::read(path)
                .map(|content| ImageHandle::from_bytes(name.clone(), path.clone(), content))
                .map_err(|e| (name, e.to_string()))
        })
        .collect();

    let mut result = ScanResult::default();
    for item in loaded {
        match item {
            Ok(image) => result.images.push(image),
            Err((name, cause)) => {
                warn!(image = %name, error = %cause, "画像を読み込めません");
                result.unreadable.push((name, cause));
            }
        }
    }

    Ok(result)
}
