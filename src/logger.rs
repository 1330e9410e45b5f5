use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RUST_LOG 未指定時のフィルタ
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,hair_ai_rust=debug,hair_ai_common=debug"
    } else {
        "warn,hair_ai_rust=info"
    }
}

/// CLI用のログ初期化
///
/// 標準出力は進捗表示に使うため、ログは標準エラーへ出す。
pub fn init_cli_logger(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .compact(),
        )
        .init();
}
