#![allow(dead_code)]

mod config;
mod error;
mod frame;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use crate::services::auth::TokenVerifier;
use crate::services::settlement::SettlementClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env().expect("configuration error");

    let verifier = match &config.backend_public_key_pem {
        Some(pem) => TokenVerifier::rs256_pem(pem).expect("invalid BACKEND_PUBLIC_KEY"),
        None => {
            tracing::warn!("BACKEND_PUBLIC_KEY not set — authentication disabled, tokens are taken as user ids");
            TokenVerifier::disabled()
        }
    };

    let settlement = match &config.settlement {
        Some(settlement) => {
            let client = SettlementClient::new(settlement.endpoint.clone(), &settlement.private_key_pem)
                .expect("settlement client init failed");
            tracing::info!(endpoint = %settlement.endpoint, "settlement dispatch configured");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("settlement not configured — completed trades will not be dispatched");
            None
        }
    };

    let state = state::AppState::new(verifier, settlement);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "tradepost listening");
    axum::serve(listener, app).await.expect("server failed");
}
