//! Tracing subscriber setup shared by both binaries

use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter,
    Layer,
};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. `format = "json"` switches to
/// one JSON object per line; anything else is the human-readable format.
/// Both go to stderr so stdout stays free for command output.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let json = config.format.eq_ignore_ascii_case("json");
    let result = tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(json, std::io::stderr))
        .try_init();

    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}

fn output_layer<S, W>(json: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn default_directive(level: &str) -> String {
    format!("feedtrack={},tower_http=info", level)
}
