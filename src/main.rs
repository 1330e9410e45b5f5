use clap::Parser;
use hair_ai_rust::analyzer::{CacheStore, GeminiClient};
use hair_ai_rust::catalog::Catalogs;
use hair_ai_rust::cli::{Cli, Commands};
use hair_ai_rust::config::Config;
use hair_ai_rust::error::{HairAiError, Result, Stage};
use hair_ai_rust::pipeline::{PipelineOrchestrator, StageFailure};
use hair_ai_rust::{export, logger, scanner};
use std::sync::atomic::Ordering;
use std::sync::Arc;

const OUTPUT_TITLE: &str = "ヘアスタイル解析結果";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);

    // 設定とプロンプトの検証は画像を読む前に済ませる
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            folder,
            stylists,
            coupons,
            templates,
            output,
            format,
            batch_size,
            no_cache,
            recursive,
        } => {
            println!("💇 hair-ai - ヘアスタイル解析\n");

            let prompts = config.prompts.compile()?;
            let api_key = config.get_api_key()?;

            let catalogs = Catalogs::load(
                stylists.as_deref().or(config.paths.stylists.as_deref()),
                coupons.as_deref().or(config.paths.coupons.as_deref()),
                templates.as_deref().or(config.paths.templates.as_deref()),
            )?;
            println!(
                "- カタログ: スタイリスト {}件 / クーポン {}件 / テンプレート {}件",
                catalogs.stylists.len(),
                catalogs.coupons.len(),
                catalogs.templates.len()
            );

            // 1. 画像スキャン
            println!("[1/3] 画像をスキャン中...");
            let scan = scanner::scan_folder(&folder, recursive)?;
            if scan.images.is_empty() {
                return Err(HairAiError::NoImagesFound(folder.display().to_string()));
            }
            println!("✔ {}枚の画像を検出\n", scan.images.len());

            let mut failures: Vec<StageFailure> = scan
                .unreadable
                .iter()
                .map(|(name, cause)| StageFailure {
                    image_name: name.clone(),
                    stage: Stage::Scan,
                    cause: cause.clone(),
                })
                .collect();

            // 2. AI解析
            let cache = if no_cache {
                None
            } else {
                Some(Arc::new(CacheStore::open(
                    &config.cache_file(),
                    config.cache.ttl_days,
                    config.cache.max_size,
                )))
            };
            println!("[2/3] AI解析中...{}", if cache.is_some() { " (キャッシュ有効)" } else { "" });

            let backend = GeminiClient::new(api_key, &config.gemini)
                .map_err(|e| HairAiError::ModelCall(e.to_string()))?;
            let mut orchestrator =
                PipelineOrchestrator::new(&config, prompts, Arc::new(backend), catalogs, cache.clone())
                    .with_progress(true);
            if let Some(size) = batch_size {
                orchestrator = orchestrator.with_batch_size(size);
            }

            let abort = orchestrator.abort_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\n中断要求を受け付けました。現在のバッチ完了後に停止します...");
                    abort.store(true, Ordering::SeqCst);
                }
            });

            let result = orchestrator.run(&scan.images).await;
            if let Some(cache) = &cache {
                cache.flush()?;
            }
            let cached = result.records.iter().filter(|r| r.from_cache).count();
            println!("✔ 解析完了: {}件（キャッシュ {}件）\n", result.records.len(), cached);
            failures.extend(result.failures);

            // 3. 結果保存
            println!("[3/3] 結果を保存中...");
            let output = output
                .or_else(|| config.paths.output_dir.clone())
                .unwrap_or_else(|| folder.clone());
            for path in export::export_records(&result.records, format, &output, OUTPUT_TITLE)? {
                println!("✔ 出力: {}", path.display());
            }
            if let Some(path) = export::write_failures(&failures, export::output_dir(&output))? {
                println!("⚠ {}件の失敗があります: {}", failures.len(), path.display());
            }

            if result.aborted {
                println!("\n⏹ 中断しました（処理済みの結果のみ保存）");
            } else {
                println!("\n✅ 解析完了");
            }
        }

        Commands::Cache { clear, info } => {
            let cache_path = config.cache_file();

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    let cache = CacheStore::open(&cache_path, config.cache.ttl_days, config.cache.max_size);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache.path().unwrap_or(cache_path.as_path()).display());
                    println!("  件数: {}（上限 {}件 / 有効期限 {}日）", cache.len(), config.cache.max_size, config.cache.ttl_days);
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                if cache_path.exists() {
                    let cache = CacheStore::open(&cache_path, config.cache.ttl_days, config.cache.max_size);
                    cache.clear()?;
                    println!("✔ キャッシュを削除しました: {}", cache.path().unwrap_or(cache_path.as_path()).display());
                } else {
                    println!("キャッシュファイルが存在しません");
                }
            }
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  モデル: {}（予備: {}）", config.gemini.model, config.gemini.fallback_model);
                println!("  バッチサイズ: {}", config.processing.batch_size);
                println!("  呼び出し間隔: {}秒", config.processing.api_delay);
                println!("  試行回数: {}（間隔 {}秒）", config.processing.max_retries, config.processing.retry_delay);
                println!("  キャッシュ: {}（{}日 / {}件）", config.cache_file().display(), config.cache.ttl_days, config.cache.max_size);
                println!(
                    "  テンプレート照合: {}（候補上限 {}件 / タイムアウト {}秒）",
                    if config.template_matching.enabled { "AI" } else { "スコアリング" },
                    config.template_matching.max_templates,
                    config.template_matching.timeout_seconds
                );
                println!("  APIキー: {}", if config.get_api_key().is_ok() { "設定済み" } else { "未設定" });
            }
        }
    }

    Ok(())
}
