//! 解析結果キャッシュモジュール
//!
//! 画像内容のSHA-256をキーにしてスタイル解析・属性判定の結果を保存し、
//! 同じ画像の再解析をスキップする。
//! - 参照時に ttl_days を超えたエントリは削除して「なし」扱い
//! - 書き込み後に max_size を超えたら古い順に削除
//! - 書き込みのたびにファイルへ保存

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use hair_ai_common::{AnalysisResult, AttributeResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// 画像内容からキャッシュキーを計算（パスや処理順には依存しない）
pub fn content_key(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// 前回の選択結果（再実行時に同じ選択を再利用する）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSelection {
    pub stylist_name: Option<String>,
    pub coupon_name: Option<String>,
    #[serde(default)]
    pub template_ids: Vec<u32>,
}

/// キャッシュエントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub analysis: AnalysisResult,
    pub attributes: AttributeResult,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub selection: Option<CachedSelection>,
}

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    /// バージョン（互換性チェック用）
    version: u32,
    /// 内容キー → エントリ
    entries: HashMap<String, CacheEntry>,
}

impl CacheFile {
    const CURRENT_VERSION: u32 = 1;
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// TTL・件数上限つきの解析結果ストア
///
/// put は読み込み・削除判定・保存を1つのロック区間で行う。
pub struct CacheStore {
    path: Option<PathBuf>,
    ttl: Duration,
    max_size: usize,
    state: Mutex<CacheFile>,
}

impl CacheStore {
    /// ファイルから読み込み（壊れている・バージョン違いなら空）
    pub fn open(path: &Path, ttl_days: u32, max_size: usize) -> Self {
        let mut store = Self::in_memory(ttl_days, max_size);
        store.path = Some(path.to_path_buf());

        let mut file = load_file(path);
        let now = Utc::now();
        let ttl = store.ttl;
        file.entries.retain(|_, entry| !is_expired(entry, now, ttl));
        debug!(path = %path.display(), entries = file.entries.len(), "キャッシュを読み込みました");

        store.state = Mutex::new(file);
        store
    }

    /// ファイルに保存しないストア
    pub fn in_memory(ttl_days: u32, max_size: usize) -> Self {
        Self {
            path: None,
            ttl: Duration::days(ttl_days as i64),
            max_size: max_size.max(1),
            state: Mutex::new(CacheFile::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheFile> {
        // 保存済みデータの整合性は put 単位で保たれるので、poison は無視して続行する
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        self.lookup_at(key, Utc::now())
    }

    /// 指定時刻で参照（期限切れなら削除して None）
    pub fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => is_expired(entry, now, self.ttl),
        };

        if expired {
            state.entries.remove(key);
            debug!(key, "期限切れのキャッシュを削除しました");
            return None;
        }
        state.entries.get(key).cloned()
    }

    pub fn put(
        &self,
        key: &str,
        analysis: AnalysisResult,
        attributes: AttributeResult,
        selection: Option<CachedSelection>,
    ) -> Result<()> {
        self.put_at(key, analysis, attributes, selection, Utc::now())
    }

    /// 指定時刻で書き込み、上限を超えた分を古い順に削除して保存
    pub fn put_at(
        &self,
        key: &str,
        analysis: AnalysisResult,
        attributes: AttributeResult,
        selection: Option<CachedSelection>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                analysis,
                attributes,
                created_at: now,
                selection,
            },
        );

        let overflow = state.entries.len().saturating_sub(self.max_size);
        if overflow > 0 {
            let mut by_age: Vec<(DateTime<Utc>, String)> = state
                .entries
                .iter()
                .map(|(k, e)| (e.created_at, k.clone()))
                .collect();
            by_age.sort();
            for (_, old_key) in by_age.into_iter().take(overflow) {
                state.entries.remove(&old_key);
            }
            debug!(evicted = overflow, "キャッシュ上限を超えた古いエントリを削除しました");
        }

        self.save_locked(&state)
    }

    /// 現在の内容をファイルへ保存
    pub fn flush(&self) -> Result<()> {
        let state = self.lock();
        self.save_locked(&state)
    }

    /// 全エントリを削除
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        state.entries.clear();
        self.save_locked(&state)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save_locked(&self, state: &CacheFile) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // 書きかけのファイルを残さないよう一時ファイルから置き換える
        let tmp_path = temp_path(path);
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn is_expired(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - entry.created_at > ttl
}

fn load_file(path: &Path) -> CacheFile {
    if !path.exists() {
        return CacheFile::default();
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return CacheFile::default(),
    };

    match serde_json::from_reader::<_, CacheFile>(BufReader::new(file)) {
        Ok(cache) if cache.version == CacheFile::CURRENT_VERSION => cache,
        Ok(_) => {
            warn!("キャッシュバージョン不一致、再生成します");
            CacheFile::default()
        }
        Err(e) => {
            warn!(error = %e, "キャッシュファイルが壊れています、再生成します");
            CacheFile::default()
        }
    }
}
