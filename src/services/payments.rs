// src/services/payments.rs

use std::fmt;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub enum PaymentError {
    /// Key id/secret not configured.
    NotConfigured,
    /// The provider rejected the request or could not be reached.
    Provider(String),
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentError::NotConfigured => write!(f, "payment service is not configured"),
            PaymentError::Provider(msg) => write!(f, "payment provider error: {}", msg),
        }
    }
}

impl std::error::Error for PaymentError {}

/// An order as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    /// Amount in minor currency units (e.g. paise).
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: String,
}

/// Payment gateway port. The production impl talks to the provider's REST
/// API; tests substitute a stub through AppState.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder, PaymentError>;

    async fn fetch_order(&self, order_id: &str) -> Result<serde_json::Value, PaymentError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// REST client for the gateway: HTTP Basic auth with the key pair, orders
/// created and read under `{base}/orders`.
pub struct HttpPaymentClient {
    client: reqwest::Client,
    base: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentClient {
    pub fn new(base: String, key_id: String, key_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            key_id,
            key_secret,
        }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentClient {
    async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder, PaymentError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider(format!(
                "order creation returned {}",
                response.status()
            )));
        }

        response
            .json::<ProviderOrder>()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))
    }

    async fn fetch_order(&self, order_id: &str) -> Result<serde_json::Value, PaymentError> {
        let response = self
            .client
            .get(format!("{}/orders/{}", self.base, order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider(format!(
                "order lookup returned {}",
                response.status()
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))
    }
}

/// Stand-in when the key pair is unset.
pub struct DisabledPaymentProvider;

#[async_trait]
impl PaymentProvider for DisabledPaymentProvider {
    async fn create_order(
        &self,
        _amount: i64,
        _currency: &str,
        _receipt: &str,
    ) -> Result<ProviderOrder, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn fetch_order(&self, _order_id: &str) -> Result<serde_json::Value, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Checks the gateway's callback signature:
/// hex(HMAC-SHA256(key_secret, "{order_id}|{payment_id}")).
/// Comparison happens on the raw MAC bytes in constant time.
pub fn verify_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let Some(signature_bytes) = decode_hex(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(key_secret.as_bytes()) else {
        return false;
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());

    mac.verify_slice(&signature_bytes).is_ok()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    // Byte pairs, not string slices: the input is client-supplied and may
    // not be ASCII.
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let high = (pair[0] as char).to_digit(16)?;
            let low = (pair[1] as char).to_digit(16)?;
            Some((high * 16 + low) as u8)
        })
        .collect()
}
