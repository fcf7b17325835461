use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tolerance used when comparing prices and derived ratios.
pub const PRICE_EPSILON: f64 = 1e-6;

/// `1 - price/normal_price`, clamped to `[0, 1]`.
pub fn discount_pct(price: f64, normal_price: f64) -> f64 {
    if normal_price.is_nan() || normal_price <= 0.0 || !price.is_finite() {
        return 0.0;
    }
    (1.0 - price / normal_price).clamp(0.0, 1.0)
}

/// A price quote from one storefront for one title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOffer {
    pub store: String,
    pub external_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub price: f64,
    pub normal_price: f64,
    pub discount_pct: f64,
    pub url: String,
    pub currency: String,
    /// Prices as the storefront quoted them, before any currency conversion.
    #[serde(default)]
    pub source_price: f64,
    #[serde(default)]
    pub source_normal_price: f64,
    #[serde(default)]
    pub source_currency: String,
}

impl GameOffer {
    /// Builds an offer with `discount_pct` derived from the two prices.
    pub fn new(
        store: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
        price: f64,
        normal_price: f64,
        url: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        let currency = currency.into();
        Self {
            store: store.into(),
            external_id: external_id.into(),
            title: title.into(),
            cover_url: None,
            price,
            normal_price,
            discount_pct: discount_pct(price, normal_price),
            url: url.into(),
            source_price: price,
            source_normal_price: normal_price,
            source_currency: currency.clone(),
            currency,
        }
    }

    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    pub fn key(&self) -> OfferKey {
        OfferKey {
            store: self.store.clone(),
            external_id: self.external_id.clone(),
        }
    }

    /// Rewrites both prices after a currency conversion and re-derives the discount.
    ///
    /// The source prices are left untouched.
    pub fn reprice(&mut self, price: f64, normal_price: f64, currency: impl Into<String>) {
        self.price = price;
        self.normal_price = normal_price;
        self.discount_pct = discount_pct(price, normal_price);
        self.currency = currency.into();
    }

    /// Returns the reason an offer must not be persisted, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.store.trim().is_empty() {
            return Err("empty store");
        }
        if self.external_id.trim().is_empty() {
            return Err("empty external id");
        }
        if !self.price.is_finite() || !self.normal_price.is_finite() {
            return Err("non-finite price");
        }
        if self.price <= 0.0 {
            return Err("price must be positive");
        }
        if self.normal_price < self.price {
            return Err("normal price below price");
        }
        Ok(())
    }

    /// Whether the fields tracked for change detection differ.
    ///
    /// Compares the storefront's own quote, so a moving exchange rate alone
    /// never counts as a change.
    pub fn differs_from(&self, other: &GameOffer) -> bool {
        (self.source_price - other.source_price).abs() >= PRICE_EPSILON
            || (self.source_normal_price - other.source_normal_price).abs() >= PRICE_EPSILON
            || !self.source_currency.eq_ignore_ascii_case(&other.source_currency)
            || self.url != other.url
    }
}

/// Natural key of an offer: unique within one storefront.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OfferKey {
    pub store: String,
    pub external_id: String,
}

impl std::fmt::Display for OfferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.store, self.external_id)
    }
}

/// Store-agnostic aggregate for one title.
///
/// Top-level price fields mirror the primary offer, which is the cheapest one
/// in `offers` (first wins on ties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDeal {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub store: String,
    pub external_id: String,
    pub price: f64,
    pub normal_price: f64,
    pub discount_pct: f64,
    pub url: String,
    pub currency: String,
    pub offers: Vec<GameOffer>,
}

impl GameDeal {
    pub fn from_offer(offer: GameOffer) -> Self {
        let mut deal = Self {
            id: Uuid::new_v4().to_string(),
            title: offer.title.clone(),
            description: None,
            cover_url: offer.cover_url.clone(),
            store: String::new(),
            external_id: String::new(),
            price: 0.0,
            normal_price: 0.0,
            discount_pct: 0.0,
            url: String::new(),
            currency: String::new(),
            offers: vec![offer],
        };
        deal.refresh_primary();
        deal
    }

    pub fn holds(&self, key: &OfferKey) -> bool {
        self.offers
            .iter()
            .any(|o| o.store == key.store && o.external_id == key.external_id)
    }

    /// Replaces the offer for `offer.store` when it changed, or appends it
    /// when the deal has no offer from that store yet.
    ///
    /// Returns `true` when the deal was mutated.
    pub fn apply_offer(&mut self, offer: GameOffer) -> bool {
        match self.offers.iter_mut().find(|o| o.store == offer.store) {
            Some(existing) if !existing.differs_from(&offer) => false,
            Some(existing) => {
                *existing = offer;
                self.refresh_primary();
                true
            }
            None => {
                self.offers.push(offer);
                self.refresh_primary();
                true
            }
        }
    }

    fn refresh_primary(&mut self) {
        let Some(primary) = self
            .offers
            .iter()
            .reduce(|best, o| if o.price < best.price { o } else { best })
        else {
            return;
        };

        self.store = primary.store.clone();
        self.external_id = primary.external_id.clone();
        self.price = primary.price;
        self.normal_price = primary.normal_price;
        self.discount_pct = discount_pct(primary.price, primary.normal_price);
        self.url = primary.url.clone();
        self.currency = primary.currency.clone();
        if self.cover_url.is_none() {
            self.cover_url = primary.cover_url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steam(id: &str, price: f64, normal: f64) -> GameOffer {
        GameOffer::new(
            "steam",
            id,
            "Hades",
            price,
            normal,
            format!("https://store.steampowered.com/app/{id}"),
            "USD",
        )
    }

    #[test]
    fn discount_is_derived_from_prices() {
        let offer = steam("1145360", 10.0, 20.0);
        assert!((offer.discount_pct - 0.5).abs() < PRICE_EPSILON);

        let offer = steam("1145360", 7.49, 24.99);
        assert!((offer.discount_pct - (1.0 - 7.49 / 24.99)).abs() < PRICE_EPSILON);
    }

    #[test]
    fn discount_is_clamped() {
        assert_eq!(discount_pct(30.0, 20.0), 0.0);
        assert_eq!(discount_pct(-5.0, 20.0), 1.0);
        assert_eq!(discount_pct(5.0, 0.0), 0.0);
        assert_eq!(discount_pct(f64::NAN, 10.0), 0.0);
    }

    #[test]
    fn validate_rejects_inconsistent_offers() {
        assert!(steam("1", 10.0, 20.0).validate().is_ok());
        assert!(steam("1", 0.0, 20.0).validate().is_err());
        assert!(steam("1", 25.0, 20.0).validate().is_err());
        assert!(steam("", 10.0, 20.0).validate().is_err());
        assert!(steam("1", f64::INFINITY, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn apply_offer_replaces_same_store() {
        let mut deal = GameDeal::from_offer(steam("1", 20.0, 40.0));
        assert!(!deal.apply_offer(steam("1", 20.0, 40.0)));
        assert!(deal.apply_offer(steam("1", 15.0, 40.0)));
        assert_eq!(deal.offers.len(), 1);
        assert_eq!(deal.price, 15.0);
        assert!((deal.discount_pct - 0.625).abs() < PRICE_EPSILON);
    }

    #[test]
    fn conversion_alone_is_not_a_change() {
        let mut yesterday = steam("1", 10.0, 20.0);
        yesterday.reprice(50.0, 100.0, "BRL");
        let mut today = steam("1", 10.0, 20.0);
        today.reprice(51.0, 102.0, "BRL");
        assert!(!today.differs_from(&yesterday));
        assert_eq!(today.source_currency, "USD");

        let mut cheaper = steam("1", 8.0, 20.0);
        cheaper.reprice(40.0, 100.0, "BRL");
        assert!(cheaper.differs_from(&yesterday));
    }

    #[test]
    fn apply_offer_appends_new_store_and_tracks_cheapest() {
        let mut deal = GameDeal::from_offer(steam("1", 20.0, 40.0));
        let gog = GameOffer::new("gog", "hades", "Hades", 12.0, 40.0, "https://gog.com/hades", "USD");
        assert!(deal.apply_offer(gog));
        assert_eq!(deal.offers.len(), 2);
        assert_eq!(deal.store, "gog");
        assert_eq!(deal.price, 12.0);
        assert!(deal.holds(&OfferKey { store: "steam".into(), external_id: "1".into() }));
    }

    #[test]
    fn deal_serializes_with_camel_case_keys() {
        let deal = GameDeal::from_offer(steam("1", 10.0, 20.0));
        let json = serde_json::to_value(&deal).unwrap();
        assert_eq!(json["externalId"], "1");
        assert_eq!(json["normalPrice"], 20.0);
        assert_eq!(json["offers"][0]["discountPct"], 0.5);
        assert!(json.get("description").is_none());
    }
}
