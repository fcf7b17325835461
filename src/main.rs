use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use deal_watch::{
    config::Config,
    currency::{AwesomeApiRates, CurrencyConverter, RateCache},
    database::{DealStore, DocumentStore},
    job::JobRunner,
    notifier::{LogNotifier, Notifier, WebhookNotifier},
    reconcile::{NotifyPolicy, OfferReconciler},
    scheduler::{CronScheduler, Task},
    steam::SteamStore,
};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct AppState {
    runner: Arc<JobRunner>,
    store: Arc<dyn DealStore>,
    schedules: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("deal_watch=info")),
        )
        .init();

    info!("==================================================");
    info!("  DEAL WATCH");
    info!("==================================================");

    let config = Config::from_env()?;
    info!("Database: {} ({})", config.database_url, config.database_name);
    info!("Target currency: {}", config.target_currency);

    let client = reqwest::Client::builder()
        .user_agent(concat!("deal-watch/", env!("CARGO_PKG_VERSION")))
        .timeout(config.http_timeout)
        .build()?;

    let store: Arc<dyn DealStore> = Arc::new(DocumentStore::new(
        client.clone(),
        &config.database_url,
        &config.database_name,
        &config.deals_collection,
        config.database_key.as_deref(),
    ));

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            let (notifier, _forwarder) = WebhookNotifier::spawn(client.clone(), url, 1000);
            info!("Notifications forwarded to {}", url);
            Arc::new(notifier)
        }
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set, notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    let rate_cache = Arc::new(RateCache::new(config.rate_ttl));
    let converter = Arc::new(CurrencyConverter::new(
        Arc::new(AwesomeApiRates::new(client.clone(), &config.rates_api_url)),
        Arc::clone(&rate_cache),
        &config.target_currency,
    ));

    let reconciler = OfferReconciler::new(
        Arc::clone(&store),
        notifier,
        NotifyPolicy {
            min_discount_pct: config.notify_min_discount,
        },
    );
    let runner = Arc::new(JobRunner::new(
        Arc::new(SteamStore::new(client, &config.steam_country, &config.steam_language)),
        Some(converter),
        reconciler,
        config.fetch_timeout,
    )
    .with_run_timeout(config.run_timeout));

    let task: Task = {
        let runner = Arc::clone(&runner);
        Arc::new(move || -> BoxFuture<'static, ()> {
            let runner = Arc::clone(&runner);
            Box::pin(async move { runner.trigger().await })
        })
    };

    let mut schedulers = Vec::with_capacity(config.schedules.len());
    for expression in &config.schedules {
        let mut scheduler = CronScheduler::new(expression, Arc::clone(&task))?;
        scheduler.start();
        schedulers.push(scheduler);
    }

    if config.run_on_start {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.trigger().await });
    }

    let state = Arc::new(AppState {
        runner,
        store,
        schedules: config.schedules.clone(),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Status server running on port {}", config.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested");
        })
        .await?;

    for scheduler in schedulers {
        scheduler.destroy();
    }
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "deal-watch",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn status(State(s): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = s.runner.stats().await;
    let deals = match s.store.count().await {
        Ok(n) => serde_json::json!(n),
        Err(e) => {
            warn!("Failed to count deals: {}", e);
            serde_json::Value::Null
        }
    };

    Json(serde_json::json!({
        "schedules": s.schedules,
        "runs": stats,
        "deals": deals
    }))
}
