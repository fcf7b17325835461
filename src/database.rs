use crate::error::PersistenceError;
use crate::types::{GameDeal, OfferKey};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Persistence for `GameDeal` documents.
#[async_trait]
pub trait DealStore: Send + Sync {
    /// The deal holding an offer with this `(store, external_id)`, if any.
    async fn find_by_offer(&self, key: &OfferKey) -> Result<Option<GameDeal>, PersistenceError>;

    /// Inserts or replaces the document with `deal.id`.
    async fn save(&self, deal: &GameDeal) -> Result<(), PersistenceError>;

    async fn count(&self) -> Result<usize, PersistenceError>;
}

/// In-process store backing the reconciler tests.
#[derive(Default)]
pub struct MemoryDealStore {
    deals: RwLock<HashMap<String, GameDeal>>,
}

impl MemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<GameDeal> {
        self.deals.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<GameDeal> {
        self.deals.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DealStore for MemoryDealStore {
    async fn find_by_offer(&self, key: &OfferKey) -> Result<Option<GameDeal>, PersistenceError> {
        Ok(self
            .deals
            .read()
            .await
            .values()
            .find(|d| d.holds(key))
            .cloned())
    }

    async fn save(&self, deal: &GameDeal) -> Result<(), PersistenceError> {
        self.deals.write().await.insert(deal.id.clone(), deal.clone());
        Ok(())
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        Ok(self.deals.read().await.len())
    }
}

/// Deals collection served over a PostgREST-style document API.
///
/// Each row is `{ "id": .., "offers": [..], .. }` with `offers` as a JSON
/// array column, so offer lookups use the `cs` (contains) operator.
#[derive(Clone)]
pub struct DocumentStore {
    client: Client,
    url: String,
    database: String,
    collection: String,
    service_key: Option<String>,
}

impl DocumentStore {
    pub fn new(
        client: Client,
        url: &str,
        database: &str,
        collection: &str,
        service_key: Option<&str>,
    ) -> Self {
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
            service_key: service_key.map(str::to_string),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.collection)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header("Accept-Profile", &self.database)
            .header("Content-Profile", &self.database)
            .header("Content-Type", "application/json");
        match &self.service_key {
            Some(key) => builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PersistenceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PersistenceError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// `offers=cs.[{"store":..,"externalId":..}]` filter value.
pub fn offer_filter(key: &OfferKey) -> String {
    let needle = serde_json::json!([{ "store": key.store, "externalId": key.external_id }]);
    format!("cs.{}", needle)
}

#[async_trait]
impl DealStore for DocumentStore {
    async fn find_by_offer(&self, key: &OfferKey) -> Result<Option<GameDeal>, PersistenceError> {
        let response = self
            .request(self.client.get(self.endpoint()))
            .query(&[("offers", offer_filter(key)), ("limit", "1".to_string())])
            .send()
            .await?;
        let rows: JsonValue = Self::check(response).await?.json().await?;

        let Some(row) = rows.as_array().and_then(|arr| arr.first()) else {
            debug!("[DealStore] No deal holds {}", key);
            return Ok(None);
        };

        serde_json::from_value(row.clone())
            .map(Some)
            .map_err(|e| PersistenceError::Malformed(e.to_string()))
    }

    async fn save(&self, deal: &GameDeal) -> Result<(), PersistenceError> {
        let response = self
            .request(self.client.post(self.endpoint()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "id")])
            .json(deal)
            .send()
            .await?;

        match Self::check(response).await {
            Ok(_) => {
                info!("[DealStore] Saved deal {} ({}, {} offer(s))", deal.id, deal.title, deal.offers.len());
                Ok(())
            }
            Err(e) => {
                warn!("[DealStore] Failed to save deal {}: {}", deal.id, e);
                Err(e)
            }
        }
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        let response = self
            .request(self.client.head(self.endpoint()))
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::check(response).await?;

        // Content-Range: 0-24/3573
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|total| total.parse().ok())
            .ok_or_else(|| PersistenceError::Malformed("missing Content-Range total".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameOffer;

    fn key(store: &str, id: &str) -> OfferKey {
        OfferKey {
            store: store.into(),
            external_id: id.into(),
        }
    }

    #[test]
    fn offer_filter_uses_containment() {
        let filter = offer_filter(&key("steam", "123"));
        assert_eq!(filter, r#"cs.[{"externalId":"123","store":"steam"}]"#);
    }

    #[tokio::test]
    async fn memory_store_finds_by_any_offer() {
        let store = MemoryDealStore::new();
        let mut deal = GameDeal::from_offer(GameOffer::new("steam", "123", "Hades", 10.0, 20.0, "u", "USD"));
        deal.apply_offer(GameOffer::new("gog", "hades", "Hades", 9.0, 20.0, "g", "USD"));
        store.save(&deal).await.unwrap();

        let found = store.find_by_offer(&key("gog", "hades")).await.unwrap().unwrap();
        assert_eq!(found.id, deal.id);
        assert!(store.find_by_offer(&key("steam", "999")).await.unwrap().is_none());
        assert!(store.find_by_offer(&key("gog", "123")).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_store_save_replaces_by_id() {
        let store = MemoryDealStore::new();
        let mut deal = GameDeal::from_offer(GameOffer::new("steam", "1", "Hades", 10.0, 20.0, "u", "USD"));
        store.save(&deal).await.unwrap();
        deal.apply_offer(GameOffer::new("steam", "1", "Hades", 5.0, 20.0, "u", "USD"));
        store.save(&deal).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(&deal.id).await.unwrap().price, 5.0);
    }
}
