#![allow(dead_code)]

use async_trait::async_trait;
use deal_watch::database::{DealStore, MemoryDealStore};
use deal_watch::error::{NotifyError, PersistenceError, StoreError};
use deal_watch::notifier::{DealEvent, Notifier};
use deal_watch::steam::StoreAdapter;
use deal_watch::types::{GameDeal, GameOffer, OfferKey};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

pub fn steam_offer(external_id: &str, price: f64, normal_price: f64) -> GameOffer {
    GameOffer::new(
        "steam",
        external_id,
        format!("Game {}", external_id),
        price,
        normal_price,
        format!("https://store.steampowered.com/app/{}", external_id),
        "USD",
    )
}

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(DealEvent, GameDeal)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(DealEvent, GameDeal)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: DealEvent, deal: &GameDeal) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((event, deal.clone()));
        Ok(())
    }
}

/// Memory store that rejects saves for chosen offer keys.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryDealStore,
    pub fail_for: HashSet<String>,
}

impl FlakyStore {
    pub fn failing(keys: &[&str]) -> Self {
        Self {
            inner: MemoryDealStore::new(),
            fail_for: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DealStore for FlakyStore {
    async fn find_by_offer(&self, key: &OfferKey) -> Result<Option<GameDeal>, PersistenceError> {
        self.inner.find_by_offer(key).await
    }

    async fn save(&self, deal: &GameDeal) -> Result<(), PersistenceError> {
        let key = format!("{}:{}", deal.store, deal.external_id);
        if self.fail_for.contains(&key) {
            return Err(PersistenceError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.inner.save(deal).await
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        self.inner.count().await
    }
}

/// Store whose calls never complete.
pub struct HangingStore;

#[async_trait]
impl DealStore for HangingStore {
    async fn find_by_offer(&self, _key: &OfferKey) -> Result<Option<GameDeal>, PersistenceError> {
        Ok(None)
    }

    async fn save(&self, _deal: &GameDeal) -> Result<(), PersistenceError> {
        std::future::pending().await
    }

    async fn count(&self) -> Result<usize, PersistenceError> {
        std::future::pending().await
    }
}

/// Storefront returning a fixed batch after an optional delay.
pub struct FixedStore {
    pub offers: Mutex<Vec<GameOffer>>,
    pub delay: Duration,
    pub fail: bool,
}

impl FixedStore {
    pub fn new(offers: Vec<GameOffer>) -> Self {
        Self {
            offers: Mutex::new(offers),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn slow(offers: Vec<GameOffer>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(offers)
        }
    }

    pub fn set(&self, offers: Vec<GameOffer>) {
        *self.offers.lock().unwrap() = offers;
    }
}

#[async_trait]
impl StoreAdapter for FixedStore {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn fetch_trending(&self) -> Result<Vec<GameOffer>, StoreError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(StoreError::Network("connection refused".into()));
        }
        Ok(self.offers.lock().unwrap().clone())
    }
}
