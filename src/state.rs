use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{
    config::Config,
    services::{
        notify::{DisabledNotifier, HttpNotifier, Notifier},
        payments::{DisabledPaymentProvider, HttpPaymentClient, PaymentProvider},
    },
};

/// Shared application state. The notifier and payment provider are injected
/// here (rather than reached as globals) so tests can substitute stubs.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,
    pub payments: Arc<dyn PaymentProvider>,
}

impl AppState {
    /// Wires the production collaborators from config: HTTP notifier and
    /// payment client when configured, disabled stand-ins otherwise.
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.notify_endpoint {
            Some(endpoint) => Arc::new(HttpNotifier::new(
                endpoint.clone(),
                config.notify_from.clone(),
            )),
            None => Arc::new(DisabledNotifier),
        };

        let payments: Arc<dyn PaymentProvider> =
            match (&config.payment_key_id, &config.payment_key_secret) {
                (Some(key_id), Some(key_secret)) => Arc::new(HttpPaymentClient::new(
                    config.payment_api_base.clone(),
                    key_id.clone(),
                    key_secret.clone(),
                )),
                _ => Arc::new(DisabledPaymentProvider),
            };

        Self {
            pool,
            config,
            notifier,
            payments,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
