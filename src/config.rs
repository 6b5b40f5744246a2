// src/config.rs

use std::env;
use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    /// Origins allowed by CORS, comma-separated in FRONTEND_URL.
    pub frontend_origins: Vec<String>,
    /// HTTP relay that renders and delivers outbound email. Unset disables
    /// email entirely (OTP-gated flows will report the failure).
    pub notify_endpoint: Option<String>,
    pub notify_from: String,
    pub payment_key_id: Option<String>,
    pub payment_key_secret: Option<String>,
    pub payment_api_base: String,
    pub payment_currency: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(604_800); // 7 days

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let frontend_origins = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let notify_endpoint = env::var("NOTIFY_ENDPOINT").ok();

        let notify_from = env::var("NOTIFY_FROM")
            .unwrap_or_else(|_| "no-reply@localhost".to_string());

        let payment_key_id = env::var("PAYMENT_KEY_ID").ok();
        let payment_key_secret = env::var("PAYMENT_KEY_SECRET").ok();

        let payment_api_base = env::var("PAYMENT_API_BASE")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());

        let payment_currency = env::var("PAYMENT_CURRENCY")
            .unwrap_or_else(|_| "INR".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            frontend_origins,
            notify_endpoint,
            notify_from,
            payment_key_id,
            payment_key_secret,
            payment_api_base,
            payment_currency,
        }
    }
}
