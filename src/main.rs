use anyhow::{Context, Result};
use std::sync::Arc;

use printquote::{
    app,
    auth::OperatorTokens,
    config::{Environment, Settings, WorkflowSettings},
    db,
    domain::Locale,
    history::OrderHistory,
    logging,
    services::{HttpOrderService, TelegramNotifier},
    store::{MemoryStore, OrderStore, PgStore},
    workflow::OrderService,
};

/// Lifetime of tokens minted by `issue-token` when no hours are given
const DEFAULT_TOKEN_HOURS: i64 = 12;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    let env = Environment::from_str(&std::env::var("ENV").unwrap_or_default());
    logging::init_logging(&env);

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => serve(Settings::from_env()?).await,
        Some("issue-token") => {
            let settings = Settings::from_env()?;
            let operator = args.next().context("usage: printquote issue-token <operator> [hours]")?;
            let hours = match args.next() {
                Some(raw) => raw
                    .parse::<i64>()
                    .with_context(|| format!("invalid hours '{}'", raw))?,
                None => DEFAULT_TOKEN_HOURS,
            };
            let token = OperatorTokens::new(&settings.operator_jwt_secret)
                .issue(&operator, chrono::Duration::hours(hours))?;
            println!("{token}");
            Ok(())
        }
        Some("materials") => list_materials(&WorkflowSettings::from_env()?).await,
        Some("history") => {
            let settings = WorkflowSettings::from_env()?;
            let history = OrderHistory::open(&settings.history_path, settings.history_capacity);
            for entry in history.entries() {
                let price = entry.final_price.or(entry.estimated_total);
                println!(
                    "{}  {:<14} {:<24} {:<16} {}",
                    entry.recorded_at.format("%d.%m.%Y %H:%M"),
                    entry.status,
                    entry.file_name,
                    entry.material_name,
                    price.map(|p| format!("{p} MDL")).unwrap_or_else(|| "-".into())
                );
            }
            Ok(())
        }
        Some(other) => anyhow::bail!(
            "unknown command '{}'; expected serve, issue-token, materials or history",
            other
        ),
    }
}

/// Prints the catalogue as the workflow sees it.
async fn list_materials(settings: &WorkflowSettings) -> Result<()> {
    let service = HttpOrderService::new(&settings.order_service_url, settings.request_timeout)?;
    let materials = service
        .list_materials()
        .await
        .with_context(|| format!("Failed to load materials from {}", settings.order_service_url))?;
    for material in materials {
        println!(
            "{}  {:?}  {}  {:.0} MDL/kg",
            material.id,
            material.family,
            material.display_name(Locale::default()),
            material.effective_price_per_kg()
        );
    }
    Ok(())
}

async fn serve(settings: Settings) -> Result<()> {
    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting printquote order service"
    );

    // Order store
    let store: Arc<dyn OrderStore> = match &settings.database_url {
        Some(url) => {
            let pool = db::create_pool(url, settings.database_max_connections).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set - orders are kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Operator notifications
    let notifier = match &settings.telegram {
        Some(telegram) => {
            tracing::info!(chat_id = %telegram.chat_id, "Telegram notifications enabled");
            Some(TelegramNotifier::new(telegram)?)
        }
        None => {
            tracing::info!("Telegram credentials not set - notifications disabled");
            None
        }
    };

    tokio::fs::create_dir_all(&settings.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.upload_dir.display()))?;

    // Create application state
    let server_addr = settings.server_addr.clone();
    let state = app::AppState::new(store, settings, notifier);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Listening on {}", server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
