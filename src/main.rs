mod api;
mod comparables;
mod config;
mod dispatch;
mod error;
mod llm;
mod provider;
mod recommend;
mod service;
mod showings;
mod syndication;
mod types;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::ServiceHealth;
use crate::api::routes::{router, ApiState};
use crate::comparables::{ComparableSelector, StatisticsAggregator};
use crate::config::Config;
use crate::dispatch::{WebhookDispatcher, WebhookTarget};
use crate::error::Result;
use crate::llm::{NoopTextGenerator, OpenAiTextGenerator, TextGenerator};
use crate::provider::{MarketDataProvider, RentCastProvider, UnconfiguredProvider};
use crate::recommend::RecommendationRanker;
use crate::service::{LeasingService, WebhookTargets};
use crate::showings::{ShowMojoClient, ShowingsProvider, UnconfiguredShowings};
use crate::syndication::{HttpPresenceChecker, SyndicationCatalog, SyndicationProber};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Syndication catalog ---
    let catalog = match &cfg.catalog_path {
        Some(path) => {
            let c = SyndicationCatalog::from_json_file(path)?;
            info!("Loaded {} platforms ({} primary) from {path}", c.len(), c.primary_count());
            c
        }
        None => {
            let c = SyndicationCatalog::builtin();
            info!("Using built-in catalog: {} platforms ({} primary)", c.len(), c.primary_count());
            c
        }
    };

    // --- External collaborators ---
    let provider: Arc<dyn MarketDataProvider> = match &cfg.rentcast_api_key {
        Some(key) => Arc::new(RentCastProvider::new(
            cfg.rentcast_api_url.clone(),
            key.clone(),
            cfg.provider_timeout,
        )?),
        None => {
            warn!("RENTCAST_API_KEY not set — market analyses will fail with upstream unavailable");
            Arc::new(UnconfiguredProvider)
        }
    };

    let generator: Arc<dyn TextGenerator> = match &cfg.openai_api_key {
        Some(key) => Arc::new(OpenAiTextGenerator::new(
            cfg.openai_base_url.clone(),
            key.clone(),
            cfg.openai_model.clone(),
            cfg.llm_timeout,
        )?),
        None => {
            info!("OPENAI_API_KEY not set — recommendations use built-in rationales");
            Arc::new(NoopTextGenerator)
        }
    };

    let showings: Arc<dyn ShowingsProvider> = match &cfg.showmojo_credentials {
        Some((email, password)) => Arc::new(ShowMojoClient::new(
            cfg.showmojo_api_url.clone(),
            email.clone(),
            password.clone(),
            cfg.showings_timeout,
        )?),
        None => {
            info!("SHOWMOJO_EMAIL/SHOWMOJO_PASSWORD not set — showings sync is disabled");
            Arc::new(UnconfiguredShowings)
        }
    };

    let target = |url: &Option<String>, name: &str| {
        if url.is_none() {
            info!("{name} not set — payloads will not be delivered");
        }
        url.clone().map(|url| WebhookTarget {
            url,
            auth_token: cfg.webhook_auth_token.clone(),
        })
    };
    let targets = WebhookTargets {
        market: target(&cfg.market_webhook_url, "MARKET_WEBHOOK_URL"),
        syndication: target(&cfg.syndication_webhook_url, "SYNDICATION_WEBHOOK_URL"),
        showings: target(&cfg.showings_webhook_url, "SHOWINGS_WEBHOOK_URL"),
    };

    // --- Service wiring ---
    let prober = SyndicationProber::new(
        Arc::new(catalog),
        Arc::new(HttpPresenceChecker::new()?),
        cfg.probe.clone(),
    );
    let service = LeasingService::new(
        provider,
        showings,
        ComparableSelector::new(cfg.selection.clone()),
        StatisticsAggregator::new(cfg.confidence.clone()),
        prober,
        RecommendationRanker::new(generator, cfg.content.clone()),
        WebhookDispatcher::new(cfg.retry.clone())?,
        targets,
        Arc::new(ServiceHealth::new()),
    );

    // HTTP API server
    let app = router(ApiState { service: Arc::new(service) });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
