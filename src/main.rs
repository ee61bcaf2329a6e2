use news_shorts_studio::{ReferenceChoice, Studio, StudioConfig, StudioError};

/// Zero-based pick from `STUDIO_PICK_*`, defaulting to the first option.
fn pick(var: &str, available: usize) -> Result<usize, StudioError> {
    let index = match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<usize>().map_err(|_| {
            StudioError::PreconditionError(format!("{} must be a zero-based index, got '{}'", var, raw))
        })?,
        Err(_) => 0,
    };
    if index >= available {
        return Err(StudioError::PreconditionError(format!(
            "{}={} but only {} options are available",
            var, index, available
        )));
    }
    Ok(index)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = StudioConfig::from_env();
    if config.api_key.is_none() {
        tracing::error!("❌ GEMINI_API_KEY is not set");
        return Err(StudioError::CredentialRequired("set GEMINI_API_KEY to run the studio".to_string()).into());
    }

    let studio = Studio::from_config(config);

    if let Err(e) = run(&studio).await {
        tracing::error!("❌ {}", e);
        tracing::info!("{}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}

/// Headless run: every stage takes the configured (or first) option.
async fn run(studio: &Studio) -> Result<(), StudioError> {
    let news = studio.enter_news().await?;
    for (i, item) in news.iter().enumerate() {
        tracing::info!("  [{}] {}", i, item.title);
    }
    let item = &news[pick("STUDIO_PICK_NEWS", news.len())?];

    let ideas = studio.select_news(&item.id).await?;
    for (i, idea) in ideas.iter().enumerate() {
        tracing::info!("  [{}] {} - {}", i, idea.title, idea.description);
    }
    let idea = &ideas[pick("STUDIO_PICK_IDEA", ideas.len())?];

    let package = studio.select_idea(&idea.id).await?;
    tracing::info!("📝 '{}' ({} segments, {} tags)", package.title, package.segments.len(), package.tags.len());

    let candidates = studio.request_reference_variants().await?;
    let reference = &candidates[pick("STUDIO_PICK_REFERENCE", candidates.len())?];
    studio.select_reference(ReferenceChoice::Candidate(reference.id.clone()))?;

    if let Some(report) = studio.wait_for_production().await? {
        for id in report.failed_scenes() {
            tracing::warn!("⚠️ Scene {} failed; it will be missing from the bundle", id);
        }
    }

    let path = studio.export_bundle().await?;
    tracing::info!("✅ Done: {}", path.display());
    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Get log level from environment or default per build mode
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,news_shorts_studio=trace,reqwest=info,hyper=info".to_string()
        } else {
            "info,news_shorts_studio=info,reqwest=warn,hyper=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    tracing::info!("🎬 News Shorts Studio starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    let gemini_configured = std::env::var("GEMINI_API_KEY").is_ok();
    let motion_enabled = std::env::var("STUDIO_MOTION_ENABLED").as_deref() == Ok("true");
    tracing::info!(
        "Configuration - Gemini AI: {}, Motion: {}",
        if gemini_configured { "✅" } else { "❌" },
        if motion_enabled { "✅" } else { "❌" }
    );

    Ok(())
}
