use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// 未设置 `RUST_LOG` 时使用的过滤规则, sqlx 每条语句都会打日志, 压到 warn
static DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init() {
    let tracing_subscriber = tracing_subscriber::registry();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt = tracing_subscriber::fmt::layer()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_owned()))
        .with_target(false);
    tracing_subscriber.with(filter).with(fmt).init();
}
