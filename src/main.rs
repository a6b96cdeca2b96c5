use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use outreach_engine::approval::{
    ApprovalChannel, ReviewQueue, TelegramApprovalChannel, review_routes,
};
use outreach_engine::config::{OutreachConfig, SearchConfig, ServiceConfig, TelegramConfig};
use outreach_engine::discovery::{
    ConnectionsCsvMatcher, ConnectionsExport, ContactSearch, DisabledSearch, XRaySearch,
};
use outreach_engine::generator::LlmMessageGenerator;
use outreach_engine::llm::{LlmConfig, create_provider};
use outreach_engine::model::Job;
use outreach_engine::pipeline::OutreachEngine;
use outreach_engine::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = ServiceConfig::from_env()?;
    let _log_guard = init_tracing(service.log_dir.as_deref());

    let outreach = OutreachConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;

    eprintln!("📨 Outreach Engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Schedule: {}", service.schedule);
    eprintln!("   Review WS: ws://0.0.0.0:{}/ws", service.web_port);
    eprintln!("   Review API: http://0.0.0.0:{}/api/reviews\n", service.web_port);

    // ── Database ─────────────────────────────────────────────────────────
    if let Some(parent) = service.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&service.db_path)
            .await
            .with_context(|| format!("opening database at {}", service.db_path.display()))?,
    );
    tracing::info!(path = %service.db_path.display(), "Database ready");

    if let Some(ref jobs_file) = service.jobs_file {
        let imported = import_jobs(db.as_ref(), jobs_file).await?;
        tracing::info!(count = imported, file = %jobs_file.display(), "Jobs imported");
    }

    // ── Collaborators ────────────────────────────────────────────────────
    let llm = create_provider(&llm_config)?;
    let generator = Arc::new(LlmMessageGenerator::new(llm));

    let search: Arc<dyn ContactSearch> = match SearchConfig::from_env() {
        Some(config) => Arc::new(XRaySearch::new(config, outreach.discovery_limit)),
        None => {
            tracing::warn!("APIFY_API_TOKEN not set, Hunter discovery disabled");
            Arc::new(DisabledSearch)
        }
    };
    let matcher = Arc::new(ConnectionsCsvMatcher::new());

    // The web review queue is always served; Telegram takes over the
    // approval conversation when configured.
    let review_queue = ReviewQueue::new();
    let approvals: Arc<dyn ApprovalChannel> = match TelegramConfig::from_env()? {
        Some(config) => {
            let telegram = TelegramApprovalChannel::new(&config);
            telegram.health_check().await?;
            let _listener = telegram.spawn_listener();
            tracing::info!("Approval channel: telegram");
            telegram as Arc<dyn ApprovalChannel>
        }
        None => {
            tracing::info!("Approval channel: web review queue");
            review_queue.clone() as Arc<dyn ApprovalChannel>
        }
    };

    let app = review_routes(review_queue);
    let port = service.web_port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("binding review server port {port}"))?;
    tokio::spawn(async move {
        tracing::info!(port, "Review server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Review server stopped");
        }
    });

    let engine = OutreachEngine::new(
        db,
        search,
        matcher.clone(),
        generator,
        approvals,
        outreach,
    );

    // ── Farmer import ────────────────────────────────────────────────────
    if let Some(ref csv) = service.connections_csv {
        let export = ConnectionsExport::from_path(csv).await?;
        match matcher.network_stats(&export) {
            Ok(stats) => tracing::info!(
                connections = stats.total_connections,
                top_companies = ?stats.top_companies.iter().take(5).collect::<Vec<_>>(),
                "Connections export loaded"
            ),
            Err(e) => tracing::warn!(error = %e, "Could not summarise connections export"),
        }
        let report = engine.farmer_analyze(&export).await?;
        report.log_summary();
    }

    // ── Scheduled cycle ──────────────────────────────────────────────────
    let schedule = cron::Schedule::from_str(&service.schedule)
        .map_err(|e| anyhow::anyhow!("invalid OUTREACH_SCHEDULE {:?}: {e}", service.schedule))?;

    let cycle_engine = Arc::clone(&engine);
    let scheduler = tokio::spawn(async move {
        loop {
            run_once(&cycle_engine).await;

            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("Schedule has no upcoming fire time, stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tracing::debug!(next = %next, "Next outreach cycle scheduled");
            tokio::time::sleep(wait).await;
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.abort();
    Ok(())
}

/// One cycle, then approvals in the background.
async fn run_once(engine: &Arc<OutreachEngine>) {
    match engine.run_cycle().await {
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Outreach cycle failed"),
    }

    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        match engine.run_approvals().await {
            Ok(report) => report.log_summary(),
            Err(e) => tracing::error!(error = %e, "Approval round failed"),
        }
    });
}

async fn import_jobs(db: &dyn Database, path: &Path) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let jobs: Vec<Job> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    for job in &jobs {
        db.upsert_job(job).await?;
    }
    Ok(jobs.len())
}

/// Console logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "outreach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}
