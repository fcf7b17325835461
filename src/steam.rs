use crate::error::StoreError;
use crate::types::GameOffer;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

pub const STORE_NAME: &str = "steam";
const STORE_API: &str = "https://store.steampowered.com/api";

/// A storefront that can list its currently discounted titles.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// An empty list is a valid outcome (no current deals).
    async fn fetch_trending(&self) -> Result<Vec<GameOffer>, StoreError>;
}

#[derive(Debug, Deserialize)]
struct FeaturedCategories {
    specials: Option<Specials>,
}

#[derive(Debug, Deserialize)]
struct Specials {
    #[serde(default)]
    items: Vec<SteamItem>,
}

/// Prices are minor units (cents).
#[derive(Debug, Deserialize)]
struct SteamItem {
    id: u64,
    name: String,
    final_price: Option<u64>,
    original_price: Option<u64>,
    currency: Option<String>,
    header_image: Option<String>,
    large_capsule_image: Option<String>,
}

#[derive(Clone)]
pub struct SteamStore {
    client: Client,
    base_url: String,
    country: String,
    language: String,
}

impl SteamStore {
    pub fn new(client: Client, country: &str, language: &str) -> Self {
        Self::with_base_url(client, STORE_API, country, language)
    }

    pub fn with_base_url(client: Client, base_url: &str, country: &str, language: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            country: country.to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl StoreAdapter for SteamStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn fetch_trending(&self) -> Result<Vec<GameOffer>, StoreError> {
        let response = self
            .client
            .get(format!("{}/featuredcategories", self.base_url))
            .query(&[("cc", self.country.as_str()), ("l", self.language.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Network(format!("featuredcategories returned {}", status)));
        }

        let body = response.text().await?;
        let offers = parse_featured(&body)?;
        info!("[Steam] Fetched {} special(s) (cc={})", offers.len(), self.country);
        Ok(offers)
    }
}

/// Maps a `featuredcategories` payload into normalized offers.
pub fn parse_featured(body: &str) -> Result<Vec<GameOffer>, StoreError> {
    let featured: FeaturedCategories =
        serde_json::from_str(body).map_err(|e| StoreError::Parse(e.to_string()))?;

    let Some(specials) = featured.specials else {
        debug!("[Steam] Payload has no specials section");
        return Ok(vec![]);
    };

    Ok(specials.items.into_iter().filter_map(to_offer).collect())
}

fn to_offer(item: SteamItem) -> Option<GameOffer> {
    let Some(final_cents) = item.final_price else {
        debug!("[Steam] Skipping {} ({}): no price", item.id, item.name);
        return None;
    };
    let original_cents = item.original_price.unwrap_or(final_cents);

    let offer = GameOffer::new(
        STORE_NAME,
        item.id.to_string(),
        item.name,
        final_cents as f64 / 100.0,
        original_cents as f64 / 100.0,
        format!("https://store.steampowered.com/app/{}", item.id),
        item.currency.unwrap_or_else(|| "USD".into()),
    );

    Some(match item.header_image.or(item.large_capsule_image) {
        Some(cover) => offer.with_cover(cover),
        None => offer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PRICE_EPSILON;

    const PAYLOAD: &str = r#"{
        "specials": {
            "id": "cat_specials",
            "name": "Specials",
            "items": [
                {
                    "id": 1145360,
                    "type": 0,
                    "name": "Hades",
                    "discounted": true,
                    "discount_percent": 70,
                    "original_price": 2499,
                    "final_price": 749,
                    "currency": "USD",
                    "large_capsule_image": "https://cdn.example.com/hades_large.jpg",
                    "header_image": "https://cdn.example.com/hades_header.jpg"
                },
                {
                    "id": 620,
                    "name": "Portal 2",
                    "discounted": false,
                    "original_price": null,
                    "final_price": 999,
                    "currency": "USD"
                },
                {
                    "id": 7,
                    "name": "Coming Soon",
                    "final_price": null
                }
            ]
        },
        "coming_soon": { "items": [] }
    }"#;

    #[test]
    fn maps_specials_to_offers() {
        let offers = parse_featured(PAYLOAD).unwrap();
        assert_eq!(offers.len(), 2);

        let hades = &offers[0];
        assert_eq!(hades.store, "steam");
        assert_eq!(hades.external_id, "1145360");
        assert_eq!(hades.title, "Hades");
        assert!((hades.price - 7.49).abs() < PRICE_EPSILON);
        assert!((hades.normal_price - 24.99).abs() < PRICE_EPSILON);
        assert!((hades.discount_pct - (1.0 - 7.49 / 24.99)).abs() < PRICE_EPSILON);
        assert_eq!(hades.url, "https://store.steampowered.com/app/1145360");
        assert_eq!(hades.cover_url.as_deref(), Some("https://cdn.example.com/hades_header.jpg"));
    }

    #[test]
    fn missing_original_price_means_no_discount() {
        let offers = parse_featured(PAYLOAD).unwrap();
        let portal = &offers[1];
        assert_eq!(portal.price, portal.normal_price);
        assert_eq!(portal.discount_pct, 0.0);
    }

    #[test]
    fn empty_or_missing_specials_is_not_an_error() {
        assert!(parse_featured(r#"{"specials": {"items": []}}"#).unwrap().is_empty());
        assert!(parse_featured(r#"{"status": 1}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_payload_is_parse_error() {
        let err = parse_featured("<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }
}
