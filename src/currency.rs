use crate::error::RateError;
use crate::types::GameOffer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Upstream provider of spot exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Units of `to` per one unit of `from`.
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, RateError>;
}

#[derive(Debug, Deserialize)]
struct AwesomeQuote {
    bid: String,
}

/// AwesomeAPI (`/json/last/USD-BRL`) rate source.
#[derive(Clone)]
pub struct AwesomeApiRates {
    client: Client,
    base_url: String,
}

impl AwesomeApiRates {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RateSource for AwesomeApiRates {
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        let unavailable = |reason: String| RateError::Unavailable {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let response = self
            .client
            .get(format!("{}/json/last/{}-{}", self.base_url, from, to))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("upstream returned {}", status)));
        }

        let body = response.text().await.map_err(|e| unavailable(e.to_string()))?;
        parse_quote(&body, from, to).map_err(unavailable)
    }
}

/// Extracts the `bid` of `{FROM}{TO}` from an AwesomeAPI response.
pub fn parse_quote(body: &str, from: &str, to: &str) -> Result<f64, String> {
    let quotes: HashMap<String, AwesomeQuote> =
        serde_json::from_str(body).map_err(|e| format!("unexpected response: {}", e))?;
    let pair = format!("{}{}", from, to);
    let quote = quotes
        .get(&pair)
        .ok_or_else(|| format!("response has no {} quote", pair))?;
    let rate: f64 = quote
        .bid
        .parse()
        .map_err(|_| format!("bid '{}' is not a number", quote.bid))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("bid {} is not a usable rate", rate));
    }
    Ok(rate)
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: f64,
    fetched_at: DateTime<Utc>,
}

/// Last fetched rate per source currency, with a time-to-live.
pub struct RateCache {
    ttl: Duration,
    rates: RwLock<HashMap<String, CachedRate>>,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Cached rate if it is younger than the TTL at `now`.
    pub async fn fresh(&self, from: &str, now: DateTime<Utc>) -> Option<f64> {
        let rates = self.rates.read().await;
        let cached = rates.get(from)?;
        let age = now.signed_duration_since(cached.fetched_at).to_std().unwrap_or_default();
        (age < self.ttl).then_some(cached.rate)
    }

    /// Cached rate regardless of age.
    pub async fn last_known(&self, from: &str) -> Option<f64> {
        self.rates.read().await.get(from).map(|c| c.rate)
    }

    pub async fn store(&self, from: &str, rate: f64, now: DateTime<Utc>) {
        self.rates.write().await.insert(
            from.to_string(),
            CachedRate {
                rate,
                fetched_at: now,
            },
        );
    }
}

/// Converts storefront prices into one target currency.
pub struct CurrencyConverter {
    source: Arc<dyn RateSource>,
    cache: Arc<RateCache>,
    target: String,
}

impl CurrencyConverter {
    pub fn new(source: Arc<dyn RateSource>, cache: Arc<RateCache>, target: &str) -> Self {
        Self {
            source,
            cache,
            target: target.to_uppercase(),
        }
    }

    pub async fn get_rate(&self, from: &str) -> Result<f64, RateError> {
        self.get_rate_at(from, Utc::now()).await
    }

    /// Same as [`get_rate`](Self::get_rate) with an explicit clock.
    pub async fn get_rate_at(&self, from: &str, now: DateTime<Utc>) -> Result<f64, RateError> {
        let from = from.to_uppercase();
        if from == self.target {
            return Ok(1.0);
        }

        if let Some(rate) = self.cache.fresh(&from, now).await {
            return Ok(rate);
        }

        match self.source.fetch_rate(&from, &self.target).await {
            Ok(rate) => {
                info!("[Rates] {}->{} = {:.4}", from, self.target, rate);
                self.cache.store(&from, rate, now).await;
                Ok(rate)
            }
            Err(e) => match self.cache.last_known(&from).await {
                Some(stale) => {
                    warn!("[Rates] {} - serving stale {}->{} rate {:.4}", e, from, self.target, stale);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Reprices every offer not already in the target currency.
    pub async fn normalize_offers(&self, offers: Vec<GameOffer>) -> Result<Vec<GameOffer>, RateError> {
        let mut normalized = Vec::with_capacity(offers.len());
        for mut offer in offers {
            if !offer.currency.eq_ignore_ascii_case(&self.target) {
                let rate = self.get_rate(&offer.currency).await?;
                offer.reprice(
                    round_cents(offer.price * rate),
                    round_cents(offer.normal_price * rate),
                    self.target.clone(),
                );
            }
            normalized.push(offer);
        }
        Ok(normalized)
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
