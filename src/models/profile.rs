//! Per-store scraping configuration.

use serde::{Deserialize, Serialize};

/// Profile name for stores recognized as following the commerce platform's
/// public API conventions.
pub const PLATFORM_PROFILE: &str = "shopify";

/// Per-store scraping configuration: CSS selectors, locale phrase lists and
/// whether a headless render is mandatory. Immutable during a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreProfile {
    pub name: String,
    /// Comma-separated list of stock indicator selectors, tried in order.
    pub stock_selector: Option<String>,
    pub price_selector: Option<String>,
    pub add_to_cart_selector: Option<String>,
    /// Out-of-stock phrases, checked before the in-stock phrases.
    pub out_of_stock_text: Vec<String>,
    pub in_stock_text: Vec<String>,
    #[serde(default)]
    pub requires_render: bool,
}

impl StoreProfile {
    /// Built-in profile for platform stores.
    pub fn platform() -> Self {
        Self {
            name: PLATFORM_PROFILE.to_string(),
            stock_selector: Some(
                ".product-form__buttons, .product__info-container, form[action=\"/cart/add\"]"
                    .to_string(),
            ),
            price_selector: Some(
                ".price-item--regular, .price__regular, .product__price, .price".to_string(),
            ),
            add_to_cart_selector: Some(
                "button[name=\"add\"], .product-form__submit, #AddToCart, [data-add-to-cart]"
                    .to_string(),
            ),
            out_of_stock_text: phrases(&[
                "sold out",
                "out of stock",
                "razprodano",
                "ni na zalogi",
                "unavailable",
            ]),
            in_stock_text: phrases(&["add to cart", "in stock", "na zalogi", "dodaj v košarico"]),
            requires_render: false,
        }
    }

    /// Fallback profile for stores without a dedicated configuration.
    pub fn custom() -> Self {
        Self {
            name: "custom".to_string(),
            stock_selector: Some(".stock, .availability, .product-availability".to_string()),
            price_selector: Some(".price, .product-price, [itemprop=\"price\"]".to_string()),
            add_to_cart_selector: Some(
                "button[type=\"submit\"].add-to-cart, .add-to-cart, #add-to-cart".to_string(),
            ),
            out_of_stock_text: phrases(&[
                "sold out",
                "out of stock",
                "razprodano",
                "ni na zalogi",
                "unavailable",
            ]),
            in_stock_text: phrases(&["in stock", "na zalogi", "available", "takoj na voljo"]),
            requires_render: false,
        }
    }

    /// Look up a built-in profile by store name, defaulting to `custom`.
    pub fn for_store(name: &str) -> Self {
        match name {
            PLATFORM_PROFILE => Self::platform(),
            _ => {
                let mut profile = Self::custom();
                profile.name = name.to_string();
                profile
            }
        }
    }

    /// Merge per-target selector overrides on top of this profile.
    pub fn apply_overrides(&mut self, overrides: &SelectorOverrides) {
        if let Some(ref s) = overrides.stock_selector {
            self.stock_selector = Some(s.clone());
        }
        if let Some(ref s) = overrides.price_selector {
            self.price_selector = Some(s.clone());
        }
        if let Some(ref s) = overrides.add_to_cart_selector {
            self.add_to_cart_selector = Some(s.clone());
        }
        if let Some(ref s) = overrides.out_of_stock_text {
            self.out_of_stock_text = split_phrases(s);
        }
        if let Some(ref s) = overrides.in_stock_text {
            self.in_stock_text = split_phrases(s);
        }
    }
}

/// Per-target selector overrides, stored alongside the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorOverrides {
    pub stock_selector: Option<String>,
    pub price_selector: Option<String>,
    pub add_to_cart_selector: Option<String>,
    /// Comma-separated phrase list.
    pub out_of_stock_text: Option<String>,
    pub in_stock_text: Option<String>,
}

fn phrases(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn split_phrases(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_selectors_and_phrases() {
        let mut profile = StoreProfile::platform();
        profile.apply_overrides(&SelectorOverrides {
            stock_selector: Some(".custom-stock".into()),
            out_of_stock_text: Some("gone, no more".into()),
            ..Default::default()
        });
        assert_eq!(profile.stock_selector.as_deref(), Some(".custom-stock"));
        assert_eq!(profile.out_of_stock_text, vec!["gone", "no more"]);
        // Untouched fields keep their defaults
        assert!(profile.price_selector.is_some());
    }

    #[test]
    fn unknown_store_falls_back_to_custom() {
        let profile = StoreProfile::for_store("somestore.example");
        assert_eq!(profile.name, "somestore.example");
        assert!(!profile.requires_render);
    }
}
