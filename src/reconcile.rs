use crate::database::DealStore;
use crate::notifier::{DealEvent, Notifier};
use crate::types::{GameDeal, GameOffer, OfferKey};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which deal mutations are worth a notification.
///
/// Every creation and every change of price, normal price or url is notable,
/// unless the resulting deal's discount is below `min_discount_pct`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyPolicy {
    pub min_discount_pct: f64,
}

impl NotifyPolicy {
    pub fn is_notable(&self, deal: &GameDeal) -> bool {
        deal.discount_pct + crate::types::PRICE_EPSILON >= self.min_discount_pct
    }
}

/// Counters for one reconciled batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub received: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub persist_failures: usize,
    pub notified: usize,
    pub notify_failures: usize,
}

/// Diffs incoming offers against persisted deals.
pub struct OfferReconciler {
    store: Arc<dyn DealStore>,
    notifier: Arc<dyn Notifier>,
    policy: NotifyPolicy,
}

impl OfferReconciler {
    pub fn new(store: Arc<dyn DealStore>, notifier: Arc<dyn Notifier>, policy: NotifyPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Creates or updates one deal per incoming offer and notifies on notable changes.
    ///
    /// A failure to look up or save one deal is counted and logged, and the
    /// rest of the batch is still processed. A deal that was not saved is
    /// never notified.
    pub async fn upsert_offers_and_notify(&self, offers: Vec<GameOffer>) -> ReconcileReport {
        let mut report = ReconcileReport {
            received: offers.len(),
            ..Default::default()
        };

        let (batch, duplicates) = dedupe_last_wins(offers);
        report.duplicates = duplicates;
        if duplicates > 0 {
            debug!("[Reconciler] Collapsed {} duplicate offer(s) in batch", duplicates);
        }

        // Only the surviving value of each key is validated.
        let batch: Vec<GameOffer> = batch
            .into_iter()
            .filter(|offer| match offer.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        "[Reconciler] Skipping invalid offer {} ({}): {} (price {}, normal {})",
                        offer.key(),
                        offer.title,
                        reason,
                        offer.price,
                        offer.normal_price
                    );
                    report.invalid += 1;
                    false
                }
            })
            .collect();

        for offer in batch {
            let key = offer.key();

            let existing = match self.store.find_by_offer(&key).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!("[Reconciler] Lookup failed for {}: {}", key, e);
                    report.persist_failures += 1;
                    continue;
                }
            };

            let (deal, event) = match existing {
                None => (GameDeal::from_offer(offer), DealEvent::Created),
                Some(mut deal) => {
                    if !deal.apply_offer(offer) {
                        report.unchanged += 1;
                        continue;
                    }
                    (deal, DealEvent::Updated)
                }
            };

            if let Err(e) = self.store.save(&deal).await {
                warn!("[Reconciler] Failed to persist deal {} ({}): {}", deal.id, key, e);
                report.persist_failures += 1;
                continue;
            }

            match event {
                DealEvent::Created => report.created += 1,
                DealEvent::Updated => report.updated += 1,
            }
            info!(
                "[Reconciler] {} {} via {} @ {:.2} {}",
                event, deal.title, key, deal.price, deal.currency
            );

            if !self.policy.is_notable(&deal) {
                debug!(
                    "[Reconciler] {} below notify threshold ({:.0}% off)",
                    deal.title,
                    deal.discount_pct * 100.0
                );
                continue;
            }

            match self.notifier.notify(event, &deal).await {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    warn!("[Reconciler] Failed to notify for {}: {}", deal.id, e);
                    report.notify_failures += 1;
                }
            }
        }

        info!(
            "[Reconciler] Batch done: {} received, {} created, {} updated, {} unchanged, {} invalid, {} failed",
            report.received,
            report.created,
            report.updated,
            report.unchanged,
            report.invalid,
            report.persist_failures
        );
        report
    }
}

/// Collapses offers sharing `(store, external_id)`.
///
/// The surviving offer is the last one seen, placed where the key first
/// appeared. Returns the batch and the number of dropped duplicates.
pub fn dedupe_last_wins(offers: Vec<GameOffer>) -> (Vec<GameOffer>, usize) {
    let mut position: HashMap<OfferKey, usize> = HashMap::with_capacity(offers.len());
    let mut batch: Vec<GameOffer> = Vec::with_capacity(offers.len());
    let mut duplicates = 0;

    for offer in offers {
        match position.get(&offer.key()) {
            Some(&idx) => {
                batch[idx] = offer;
                duplicates += 1;
            }
            None => {
                position.insert(offer.key(), batch.len());
                batch.push(offer);
            }
        }
    }

    (batch, duplicates)
}
