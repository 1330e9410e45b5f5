//! パイプライン結合テスト
//!
//! 台本どおりに応答するバックエンドで、段階ごとの再試行・フォールバック・
//! キャッシュ再利用・中断を検証

use async_trait::async_trait;
use hair_ai_common::{CouponOption, MatchMode, StylistProfile, TemplateCatalog};
use hair_ai_rust::analyzer::{CacheStore, CallError, ModelBackend, ModelRequest};
use hair_ai_rust::catalog::Catalogs;
use hair_ai_rust::config::{Config, PromptConfig};
use hair_ai_rust::error::Stage;
use hair_ai_rust::pipeline::PipelineOrchestrator;
use hair_ai_rust::scanner::ImageHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

type Responder = Box<dyn Fn(&str, &str) -> Result<String, CallError> + Send + Sync>;

/// プロンプト先頭の種別ごとに応答を返すバックエンド
struct ScriptedBackend {
    respond: Responder,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    fn new(respond: impl Fn(&str, &str) -> Result<String, CallError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn count(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(_, k)| k == kind).count()
    }

    fn count_model(&self, model: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _)| m == model).count()
    }

    fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, model: &str, request: &ModelRequest) -> Result<String, CallError> {
        let kind = request.prompt.split_whitespace().next().unwrap_or("").to_string();
        self.calls.lock().unwrap().push((model.to_string(), kind.clone()));
        (self.respond)(model, &kind)
    }
}

/// 正常系の応答
fn happy(kind: &str) -> Result<String, CallError> {
    let text = match kind {
        "ATTRIBUTE" => r#"{"sex": "レディース", "length": "ロング"}"#,
        "ANALYSIS" => {
            r#"```json
{"category": "ボブ", "features": {"color": "アッシュ", "cut_technique": "レイヤー", "styling": "ストレート", "impression": "ナチュラル"}, "keywords": ["ナチュラル", "アッシュ"]}
```"#
        }
        "STYLIST" => r#"{"stylist_name": "鈴木", "reason": "ボブが得意"}"#,
        "COUPON" => r#"{"coupon_number": 2, "reason": "カラー込み"}"#,
        "TEMPLATE" => {
            r#"{"selections": [{"template_id": 2, "reason": "色味"}, {"template_id": 4, "reason": "長さ"}, {"template_id": 1, "reason": "質感"}]}"#
        }
        other => return Err(CallError::InvalidResponse(format!("unexpected prompt: {}", other))),
    };
    Ok(text.to_string())
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.processing.api_delay = 0.0;
    config.processing.retry_delay = 0.0;
    config.processing.max_retries = 2;
    config.analysis.categories = vec!["ボブ".into(), "ショート".into()];
    config.analysis.length_choices = vec!["ショート".into(), "ロング".into()];
    config.prompts = PromptConfig {
        attribute: "ATTRIBUTE {length_choices}".into(),
        analysis: "ANALYSIS {categories}".into(),
        stylist: "STYLIST {stylists} {category} {color} {cut_technique} {styling} {impression}".into(),
        coupon: "COUPON {coupons} {coupon_count} {category} {color} {cut_technique} {styling} {impression}"
            .into(),
        template_match: "TEMPLATE {analysis_info} {templates}".into(),
    };
    config
}

fn catalogs() -> Catalogs {
    let stylists = vec![
        StylistProfile { name: "佐藤".into(), specialties: "ショート".into(), ..Default::default() },
        StylistProfile { name: "鈴木".into(), specialties: "ボブ".into(), ..Default::default() },
    ];
    let coupons = vec![
        CouponOption { name: "カット".into(), price: Some(4400), ..Default::default() },
        CouponOption { name: "カット+カラー".into(), price: Some(9900), ..Default::default() },
    ];
    let templates = TemplateCatalog::from_csv_str(
        "category,title,menu,comment,hashtag,sex,length\n\
         ボブ,ナチュラルボブ,カット,柔らかい質感,#ナチュラル,レディース,ロング\n\
         ボブ,アッシュボブ,カラー,透明感,#アッシュ,レディース,ショート\n\
         ショート,メンズショート,カット,爽やか,#メンズ,メンズ,ショート\n\
         ボブ,ミニボブ,カット,軽やか,#ミニボブ,,\n",
    )
    .unwrap();
    Catalogs::new(stylists, coupons, templates)
}

fn image(name: &str) -> ImageHandle {
    ImageHandle::from_bytes(name, format!("/photos/{}", name), name.as_bytes().to_vec())
}

fn orchestrator(
    config: &Config,
    backend: Arc<ScriptedBackend>,
    cache: Option<Arc<CacheStore>>,
) -> PipelineOrchestrator {
    let prompts = config.prompts.compile().unwrap();
    PipelineOrchestrator::new(config, prompts, backend, catalogs(), cache)
}

fn template_ids(record: &hair_ai_common::AnalysisRecord) -> Vec<u32> {
    record
        .templates
        .as_ref()
        .map(|t| t.decisions.iter().map(|d| d.template_id).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_full_pipeline_with_ai_matching() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| happy(kind));
    let cache = Arc::new(CacheStore::in_memory(30, 100));

    let output = orchestrator(&config, backend.clone(), Some(cache.clone()))
        .run(&[image("a.jpg")])
        .await;

    assert!(output.failures.is_empty());
    assert!(!output.aborted);
    assert_eq!(output.records.len(), 1);

    let record = &output.records[0];
    assert_eq!(record.analysis.category, "ボブ");
    assert_eq!(record.sex_label(), "レディース");
    assert_eq!(record.stylist_name(), "鈴木");
    assert!(!record.stylist.as_ref().unwrap().is_default);
    assert_eq!(record.coupon.as_ref().unwrap().ordinal, 2);
    assert_eq!(record.coupon_name(), "カット+カラー");
    assert_eq!(record.templates.as_ref().unwrap().mode, MatchMode::Ai);
    assert_eq!(template_ids(record), vec![2, 4, 1]);
    assert_eq!(record.style_title(), "アッシュボブ");
    assert!(!record.from_cache);

    assert_eq!(backend.total(), 5);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_warm_cache_makes_no_model_calls() {
    let config = test_config();
    let cache = Arc::new(CacheStore::in_memory(30, 100));

    let first = ScriptedBackend::new(|_, kind| happy(kind));
    orchestrator(&config, first, Some(cache.clone()))
        .run(&[image("a.jpg")])
        .await;

    let second = ScriptedBackend::new(|_, _| Err(CallError::Timeout));
    let output = orchestrator(&config, second.clone(), Some(cache))
        .run(&[image("a.jpg")])
        .await;

    assert_eq!(second.total(), 0);
    assert!(output.failures.is_empty());

    let record = &output.records[0];
    assert!(record.from_cache);
    assert_eq!(record.stylist_name(), "鈴木");
    assert_eq!(record.coupon.as_ref().unwrap().ordinal, 2);
    assert_eq!(record.templates.as_ref().unwrap().mode, MatchMode::Cached);
    assert_eq!(template_ids(record), vec![2, 4, 1]);
}

#[tokio::test]
async fn test_warm_cache_keeps_short_ai_selection() {
    let mut config = test_config();
    config.template_matching.max_templates = 2;
    let cache = Arc::new(CacheStore::in_memory(30, 100));

    // ボブの候補は先頭2件（ID 1, 2）に絞られる
    let first = ScriptedBackend::new(|_, kind| match kind {
        "TEMPLATE" => Ok(
            r#"{"selections": [{"template_id": 2, "reason": "色味"}, {"template_id": 1, "reason": "質感"}]}"#
                .to_string(),
        ),
        other => happy(other),
    });
    let cold = orchestrator(&config, first, Some(cache.clone()))
        .run(&[image("a.jpg")])
        .await;
    assert_eq!(cold.records[0].templates.as_ref().unwrap().mode, MatchMode::Ai);
    assert_eq!(template_ids(&cold.records[0]), vec![2, 1]);

    let second = ScriptedBackend::new(|_, _| Err(CallError::Timeout));
    let warm = orchestrator(&config, second.clone(), Some(cache))
        .run(&[image("a.jpg")])
        .await;

    assert_eq!(second.total(), 0);
    assert_eq!(warm.records[0].templates.as_ref().unwrap().mode, MatchMode::Cached);
    assert_eq!(template_ids(&warm.records[0]), vec![2, 1]);
}

#[tokio::test]
async fn test_invalid_sex_is_attribute_stage_failure() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| match kind {
        "ATTRIBUTE" => Ok(r#"{"sex": "Unknown", "length": "ロング"}"#.to_string()),
        other => happy(other),
    });
    let cache = Arc::new(CacheStore::in_memory(30, 100));

    let output = orchestrator(&config, backend.clone(), Some(cache.clone()))
        .run(&[image("a.jpg")])
        .await;

    assert_eq!(backend.count("ATTRIBUTE"), 2);
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].stage, Stage::Attributes);
    assert_eq!(output.failures[0].image_name, "a.jpg");

    let record = &output.records[0];
    assert!(record.attributes.is_none());
    assert_eq!(record.analysis.features.color, "アッシュ");
    assert!(record.templates.is_some());
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_coupon_name_instead_of_number_defaults_to_first() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| match kind {
        "COUPON" => Ok(r#"{"coupon_number": "カット+カラー", "reason": "名前で回答"}"#.to_string()),
        other => happy(other),
    });

    let output = orchestrator(&config, backend.clone(), None)
        .run(&[image("a.jpg")])
        .await;

    assert_eq!(backend.count("COUPON"), 2);
    assert!(output.failures.is_empty());

    let coupon = output.records[0].coupon.as_ref().unwrap();
    assert_eq!(coupon.ordinal, 1);
    assert_eq!(coupon.coupon.name, "カット");
    assert!(coupon.is_default);
}

#[tokio::test]
async fn test_unknown_stylist_defaults_to_first() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| match kind {
        "STYLIST" => Ok(r#"{"stylist_name": "すずき", "reason": "表記ゆれ"}"#.to_string()),
        other => happy(other),
    });

    let output = orchestrator(&config, backend.clone(), None)
        .run(&[image("a.jpg")])
        .await;

    assert_eq!(backend.count("STYLIST"), 2);
    let stylist = output.records[0].stylist.as_ref().unwrap();
    assert_eq!(stylist.stylist.name, "佐藤");
    assert!(stylist.is_default);
}

#[tokio::test]
async fn test_invalid_template_selection_falls_back_to_scoring() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| match kind {
        "TEMPLATE" => Ok(
            r#"{"selections": [{"template_id": 2, "reason": "a"}, {"template_id": 2, "reason": "b"}, {"template_id": 1, "reason": "c"}]}"#
                .to_string(),
        ),
        other => happy(other),
    });

    let output = orchestrator(&config, backend.clone(), None)
        .run(&[image("a.jpg")])
        .await;

    assert_eq!(backend.count("TEMPLATE"), 1);
    assert!(output.failures.is_empty());

    let record = &output.records[0];
    assert_eq!(record.templates.as_ref().unwrap().mode, MatchMode::Scoring);
    // ナチュラルボブ 17点 / アッシュボブ 15点 / ミニボブ 10点
    assert_eq!(template_ids(record), vec![1, 2, 4]);
}

#[tokio::test]
async fn test_template_failure_without_fallback_keeps_record() {
    let mut config = test_config();
    config.template_matching.fallback_on_failure = false;
    let backend = ScriptedBackend::new(|_, kind| match kind {
        "TEMPLATE" => Ok(r#"{"selections": []}"#.to_string()),
        other => happy(other),
    });

    let output = orchestrator(&config, backend, None).run(&[image("a.jpg")]).await;

    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].stage, Stage::Template);

    let record = &output.records[0];
    assert!(record.templates.is_none());
    assert_eq!(record.style_title(), "");
    assert_eq!(record.stylist_name(), "鈴木");
}

#[tokio::test]
async fn test_scoring_mode_with_batch_of_two() {
    let mut config = test_config();
    config.template_matching.enabled = false;
    config.processing.batch_size = 2;
    let backend = ScriptedBackend::new(|_, kind| happy(kind));

    let output = orchestrator(&config, backend.clone(), None)
        .run(&[image("a.jpg"), image("b.jpg")])
        .await;

    assert_eq!(backend.count("TEMPLATE"), 0);
    assert_eq!(output.records.len(), 2);
    assert_eq!(output.records[0].image_name, "a.jpg");
    assert_eq!(output.records[1].image_name, "b.jpg");
    for record in &output.records {
        assert_eq!(record.templates.as_ref().unwrap().mode, MatchMode::Scoring);
        assert_eq!(template_ids(record), vec![1, 2, 4]);
        assert_eq!(record.template_details.len(), 3);
    }
}

#[tokio::test]
async fn test_primary_failure_escalates_to_fallback_model() {
    let config = test_config();
    let primary = config.gemini.model.clone();
    let fallback = config.gemini.fallback_model.clone();
    let primary_for_backend = primary.clone();
    let backend = ScriptedBackend::new(move |model, kind| {
        if model == primary_for_backend {
            Err(CallError::Server { status: 503, message: "overloaded".into() })
        } else {
            happy(kind)
        }
    });

    let output = orchestrator(&config, backend.clone(), None)
        .run(&[image("a.jpg")])
        .await;

    assert!(output.failures.is_empty());
    assert_eq!(output.records[0].stylist_name(), "鈴木");
    // 5種類の呼び出しそれぞれで主モデル2回 → 予備モデル1回で成功
    assert_eq!(backend.count_model(&primary), 10);
    assert_eq!(backend.count_model(&fallback), 5);
}

#[tokio::test]
async fn test_feature_failure_drops_record() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| match kind {
        "ANALYSIS" => Err(CallError::Rejected { status: 400, message: "bad request".into() }),
        other => happy(other),
    });

    let output = orchestrator(&config, backend.clone(), None)
        .run(&[image("a.jpg")])
        .await;

    assert!(output.records.is_empty());
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].stage, Stage::Features);
    assert_eq!(backend.count("ANALYSIS"), 1);
    assert_eq!(backend.count("STYLIST"), 0);
}

#[tokio::test]
async fn test_abort_stops_between_batches() {
    let mut config = test_config();
    config.processing.batch_size = 2;

    let flag: Arc<OnceLock<Arc<AtomicBool>>> = Arc::new(OnceLock::new());
    let flag_for_backend = flag.clone();
    let backend = ScriptedBackend::new(move |_, kind| {
        if let Some(abort) = flag_for_backend.get() {
            abort.store(true, Ordering::SeqCst);
        }
        happy(kind)
    });

    let pipeline = orchestrator(&config, backend, None);
    flag.set(pipeline.abort_handle()).unwrap();

    let output = pipeline
        .run(&[image("a.jpg"), image("b.jpg"), image("c.jpg")])
        .await;

    assert!(output.aborted);
    assert_eq!(output.records.len(), 2);
    assert!(output.records.iter().all(|r| r.image_name != "c.jpg"));
}

#[tokio::test]
async fn test_empty_catalogs_make_no_selection_calls() {
    let config = test_config();
    let backend = ScriptedBackend::new(|_, kind| happy(kind));
    let prompts = config.prompts.compile().unwrap();
    let empty = Catalogs::new(Vec::new(), Vec::new(), TemplateCatalog::default());

    let output = PipelineOrchestrator::new(&config, prompts, backend.clone(), empty, None)
        .run(&[image("a.jpg")])
        .await;

    let record = &output.records[0];
    assert!(record.stylist.is_none());
    assert!(record.coupon.is_none());
    assert!(record.templates.is_none());
    assert_eq!(backend.total(), 2);
}
