//! 画像1枚ごとの解析パイプライン
//!
//! キャッシュ参照 → スタイル解析 ∥ 属性判定 → スタイリスト → クーポン →
//! テンプレート照合 → レコード組み立て → キャッシュ書き込み。
//! バッチ内の画像は並行に処理し、中断フラグはバッチの合間だけ確認する。

use crate::analyzer::{
    AttributeClassifier, CacheEntry, CacheStore, CachedSelection, FeatureExtractor, ModelBackend,
    ModelGateway,
};
use crate::catalog::Catalogs;
use crate::config::{Config, PromptSet};
use crate::error::{HairAiError, Stage};
use crate::matcher::{CouponSelector, StylistSelector, TemplateMatcher};
use crate::scanner::ImageHandle;
use futures::future::join_all;
use hair_ai_common::{AnalysisRecord, MatchMode};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 画像・段階ごとの失敗
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub image_name: String,
    pub stage: Stage,
    pub cause: String,
}

impl StageFailure {
    fn new(image: &ImageHandle, stage: Stage, cause: impl ToString) -> Self {
        Self {
            image_name: image.name.clone(),
            stage,
            cause: cause.to_string(),
        }
    }
}

/// 実行結果（一部の画像が失敗しても最後まで処理する）
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub records: Vec<AnalysisRecord>,
    pub failures: Vec<StageFailure>,
    /// バッチの合間で中断された
    pub aborted: bool,
}

/// 1画像分の結果
#[derive(Debug, Default)]
pub struct ImageOutcome {
    pub record: Option<AnalysisRecord>,
    pub failures: Vec<StageFailure>,
}

pub struct PipelineOrchestrator {
    features: FeatureExtractor,
    attributes: AttributeClassifier,
    stylists: StylistSelector,
    coupons: CouponSelector,
    templates: TemplateMatcher,
    cache: Option<Arc<CacheStore>>,
    batch_size: usize,
    abort: Arc<AtomicBool>,
    show_progress: bool,
}

impl PipelineOrchestrator {
    /// 全段階で1つのゲートウェイ（レート制限）を共有する
    pub fn new(
        config: &Config,
        prompts: PromptSet,
        backend: Arc<dyn ModelBackend>,
        catalogs: Catalogs,
        cache: Option<Arc<CacheStore>>,
    ) -> Self {
        let gateway = Arc::new(ModelGateway::from_config(backend, config));

        Self {
            features: FeatureExtractor::new(
                gateway.clone(),
                prompts.analysis,
                config.analysis.categories.clone(),
            ),
            attributes: AttributeClassifier::new(
                gateway.clone(),
                prompts.attribute,
                config.analysis.length_choices.clone(),
            ),
            stylists: StylistSelector::new(gateway.clone(), prompts.stylist, catalogs.stylists),
            coupons: CouponSelector::new(gateway.clone(), prompts.coupon, catalogs.coupons),
            templates: TemplateMatcher::new(
                gateway,
                prompts.template_match,
                catalogs.templates,
                config.template_matching.clone(),
            ),
            cache,
            batch_size: config.processing.batch_size.max(1),
            abort: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 中断フラグ（true にすると次のバッチから処理しない）
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub async fn run(&self, images: &[ImageHandle]) -> PipelineOutput {
        let mut output = PipelineOutput::default();
        let bar = self.progress_bar(images.len());
        let progress = &bar;

        for (batch_idx, batch) in images.chunks(self.batch_size).enumerate() {
            if self.abort.load(Ordering::SeqCst) {
                warn!(batch = batch_idx + 1, "中断要求により残りのバッチをスキップします");
                output.aborted = true;
                break;
            }
            debug!(batch = batch_idx + 1, images = batch.len(), "バッチ処理開始");

            let outcomes = join_all(batch.iter().map(|image| async move {
                let outcome = self.process_image(image).await;
                progress.inc(1);
                outcome
            }))
            .await;

            for outcome in outcomes {
                output.records.extend(outcome.record);
                output.failures.extend(outcome.failures);
            }
        }

        bar.finish_and_clear();
        info!(
            records = output.records.len(),
            failures = output.failures.len(),
            aborted = output.aborted,
            "パイプライン完了"
        );
        output
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} 枚 ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar
    }

    pub async fn process_image(&self, image: &ImageHandle) -> ImageOutcome {
        if let Some(entry) = self.cache.as_ref().and_then(|c| c.lookup(&image.key)) {
            debug!(image = %image.name, "キャッシュヒット");
            return ImageOutcome {
                record: Some(self.record_from_cache(image, entry)),
                failures: Vec::new(),
            };
        }

        let mut failures = Vec::new();
        let (features, attributes) = tokio::join!(
            self.features.extract(image),
            self.attributes.classify(image)
        );

        let attributes = match attributes {
            Ok(attr) => Some(attr),
            Err(e) => {
                failures.push(StageFailure::new(image, Stage::Attributes, stage_cause(e)));
                None
            }
        };
        let analysis = match features {
            Ok(analysis) => analysis,
            Err(e) => {
                failures.push(StageFailure::new(image, Stage::Features, stage_cause(e)));
                return ImageOutcome {
                    record: None,
                    failures,
                };
            }
        };

        let stylist = self.stylists.select(&analysis).await;
        let coupon = self.coupons.select(&analysis).await;
        let templates = match self
            .templates
            .match_templates(&analysis, attributes.as_ref())
            .await
        {
            Ok(matched) => matched,
            Err(e) => {
                failures.push(StageFailure::new(image, Stage::Template, stage_cause(e)));
                None
            }
        };

        let template_details = templates
            .as_ref()
            .map(|t| self.templates.details(t))
            .unwrap_or_default();

        let record = AnalysisRecord {
            image_name: image.name.clone(),
            image_path: image.path.display().to_string(),
            analysis,
            attributes,
            stylist,
            coupon,
            templates,
            template_details,
            from_cache: false,
        };

        self.write_cache(image, &record);

        ImageOutcome {
            record: Some(record),
            failures,
        }
    }

    /// キャッシュヒット時はモデルを呼ばずに前回の選択を引き直す
    fn record_from_cache(&self, image: &ImageHandle, entry: CacheEntry) -> AnalysisRecord {
        let selection = entry.selection.unwrap_or_default();
        let attributes = Some(entry.attributes);

        let stylist = self.stylists.resolve_cached(selection.stylist_name.as_deref());
        let coupon = self.coupons.resolve_cached(selection.coupon_name.as_deref());
        let templates =
            self.templates
                .resolve_cached(&selection.template_ids, &entry.analysis, attributes.as_ref());
        let template_details = templates
            .as_ref()
            .map(|t| self.templates.details(t))
            .unwrap_or_default();

        AnalysisRecord {
            image_name: image.name.clone(),
            image_path: image.path.display().to_string(),
            analysis: entry.analysis,
            attributes,
            stylist,
            coupon,
            templates,
            template_details,
            from_cache: true,
        }
    }

    /// スタイル解析と属性判定がそろったときだけ書き込む
    fn write_cache(&self, image: &ImageHandle, record: &AnalysisRecord) {
        let (Some(cache), Some(attributes)) = (&self.cache, &record.attributes) else {
            return;
        };

        let selection = CachedSelection {
            stylist_name: record
                .stylist
                .as_ref()
                .filter(|s| !s.is_default)
                .map(|s| s.stylist.name.clone()),
            coupon_name: record
                .coupon
                .as_ref()
                .filter(|c| !c.is_default)
                .map(|c| c.coupon.name.clone()),
            template_ids: record
                .templates
                .as_ref()
                .filter(|t| t.mode == MatchMode::Ai)
                .map(|t| t.decisions.iter().map(|d| d.template_id).collect())
                .unwrap_or_default(),
        };

        if let Err(e) = cache.put(
            &image.key,
            record.analysis.clone(),
            attributes.clone(),
            Some(selection),
        ) {
            warn!(image = %image.name, error = %e, "キャッシュの保存に失敗しました");
        }
    }
}

/// TerminalStage の原因部分だけを取り出す
fn stage_cause(err: HairAiError) -> String {
    match err {
        HairAiError::TerminalStage { cause, .. } => cause,
        other => other.to_string(),
    }
}
