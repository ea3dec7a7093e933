//! Vanguard API Gateway Server
//!
//! Server entry point: loads and validates the declarative configuration,
//! builds the gateway orchestrator over the in-memory discovery registry,
//! and runs the actix-web server with the gateway mounted as the default
//! service.

use vanguard_rs::config::settings::load_settings;
use vanguard_rs::config::validation::ConfigValidator;
use vanguard_rs::logs::logger::configure_logger;
use vanguard_rs::routes::{health, http as gateway_http, metrics};
use vanguard_rs::services::discovery::InMemoryRegistry;
use vanguard_rs::services::events::LogEventSink;

use actix_web::{middleware::Logger, App, HttpServer};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Vanguard API Gateway v{}", env!("CARGO_PKG_VERSION"));

    let validation = ConfigValidator::validate_comprehensive(&settings);
    for warning in &validation.warnings {
        warn!("Configuration warning: {}", warning);
    }
    if !validation.is_valid {
        error!("Configuration validation failed:");
        for e in &validation.errors {
            error!("  - {}", e);
        }
        std::process::exit(1);
    }
    info!(
        "Configuration validated: {} route(s), {} warning(s)",
        settings.routes.len(),
        validation.warnings.len()
    );

    let registry = Arc::new(InMemoryRegistry::with_services(
        settings.discovery.services.clone(),
    ));

    let gateway = match gateway_http::GatewayService::from_settings(
        &settings,
        registry,
        Arc::new(LogEventSink),
    ) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            error!("Failed to build gateway: {}", e);
            std::process::exit(1);
        }
    };

    // Canary evaluation timers run for the process lifetime
    gateway.start();

    let host = std::env::var("VANGUARD_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("VANGUARD_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    info!("Starting server on {}:{}", host, port);

    let gateway_for_server = gateway.clone();
    let server = HttpServer::new(move || {
        let gateway = gateway_for_server.clone();
        App::new()
            .wrap(Logger::new(
                r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#,
            ))
            .wrap(actix_web::middleware::Compress::default())
            .configure(health::configure_health)
            .configure(metrics::configure_metrics)
            .configure(|cfg| gateway_http::configure_gateway(cfg, gateway))
    })
    .bind((host.as_str(), port))?
    .run();

    info!("Server started successfully");

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("Server stopped gracefully"),
                Err(e) => error!("Server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, stopping server...");
        }
    }

    gateway.stop().await;
    info!("Gateway stopped");

    Ok(())
}
