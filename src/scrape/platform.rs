//! Platform-native product endpoints. Stores built on the common commerce
//! platform expose `/products/{handle}.js` with per-variant availability,
//! which is far more reliable than scraping the rendered page.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::models::{Availability, SignalSource, StockSignal};
use crate::net::{Accept, Fetcher};

use super::price::normalize_minor_units;

/// Markers that identify platform-built storefronts from raw HTML.
const PLATFORM_MARKERS: &[&str] = &["cdn.shopify.com", "Shopify.theme", "/cart/add"];

static ANALYTICS_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)var meta\s*=\s*(\{.+?\})\s*;\s*\n").expect("valid regex")
});

pub fn is_platform_markup(html: &str) -> bool {
    PLATFORM_MARKERS.iter().any(|m| html.contains(m))
}

/// Pull `{handle}` out of a `/products/{handle}` product URL.
pub fn product_handle(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "products" {
            return segments
                .next()
                .filter(|h| !h.is_empty())
                .map(|h| h.trim_end_matches(".html").to_string());
        }
    }
    None
}

/// Pull `{handle}` out of a `/collections/{handle}` URL.
pub fn collection_handle(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "collections" {
            return segments
                .next()
                .filter(|h| !h.is_empty() && *h != "all")
                .map(|h| h.to_string());
        }
    }
    None
}

fn store_root(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(format!("{}://{}", url.scheme(), host))
}

fn variant_id(variant: &Value) -> Option<String> {
    match variant.get("id") {
        Some(Value::Number(n)) => n.as_i64().map(|i| i.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn variant_price(variant: &Value) -> Option<f64> {
    let raw = match variant.get("price") {
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(normalize_minor_units(raw))
}

/// Interpret a product JSON payload from the platform endpoint.
fn signal_from_product_json(product: &Value, wanted_variant: Option<&str>) -> Option<StockSignal> {
    let variants = product.get("variants")?.as_array()?;
    if variants.is_empty() {
        return None;
    }

    let chosen = wanted_variant
        .and_then(|id| {
            variants
                .iter()
                .find(|v| variant_id(v).as_deref() == Some(id))
        })
        .or_else(|| {
            variants
                .iter()
                .find(|v| v.get("available").and_then(|a| a.as_bool()) == Some(true))
        })
        .or_else(|| variants.first())?;

    let available = match wanted_variant {
        // A pinned variant answers only for itself.
        Some(_) => chosen.get("available").and_then(|a| a.as_bool()),
        None => {
            let mut any = variants
                .iter()
                .any(|v| v.get("available").and_then(|a| a.as_bool()) == Some(true));
            // Some themes patch the payload with a product-level flag.
            if !any && product.get("available").and_then(|a| a.as_bool()) == Some(true) {
                any = true;
            }
            Some(any)
        }
    };

    let inventory_qty = chosen
        .get("inventory_quantity")
        .and_then(|q| q.as_i64())
        .unwrap_or(0);
    // "continue" policy means the shop oversells, so a zero or negative
    // inventory count with available=true is not a hard quantity signal.
    let policy_ambiguous = available == Some(true)
        && inventory_qty <= 0
        && chosen.get("inventory_policy").and_then(|p| p.as_str()) == Some("continue");

    let image_url = product
        .get("images")
        .and_then(|i| i.as_array())
        .and_then(|list| list.first())
        .and_then(|v| v.as_str())
        .map(|s| {
            if s.starts_with("//") {
                format!("https:{s}")
            } else {
                s.to_string()
            }
        });

    Some(StockSignal {
        source: SignalSource::PlatformApi,
        availability: Availability::from_flag(available),
        price: variant_price(chosen),
        image_url,
        variant_id: variant_id(chosen),
        stock_qty_hint: if inventory_qty > 0 { inventory_qty as u32 } else { 0 },
        raw_stock_text: String::new(),
        policy_ambiguous,
    })
}

/// Last-resort read of the analytics `var meta = {...}` blob embedded in
/// storefront pages, used when the JSON endpoint is blocked.
pub fn signal_from_analytics_meta(html: &str) -> Option<StockSignal> {
    let captures = ANALYTICS_META.captures(html)?;
    let meta: Value = serde_json::from_str(captures.get(1)?.as_str()).ok()?;
    let product = meta.get("product")?;
    let variants = product.get("variants")?.as_array()?;
    let first = variants.first()?;

    Some(StockSignal {
        source: SignalSource::PlatformApi,
        availability: Availability::Unknown,
        price: first
            .get("price")
            .and_then(|p| p.as_f64())
            .map(normalize_minor_units),
        image_url: None,
        variant_id: variant_id(first),
        stock_qty_hint: 0,
        raw_stock_text: String::new(),
        policy_ambiguous: false,
    })
}

/// Query the platform product endpoint for the URL's handle. Returns `None`
/// when the URL has no product handle, the endpoint is missing (not a
/// platform store) or the payload does not parse.
pub async fn fetch_platform_signal(fetcher: &dyn Fetcher, url: &Url) -> Option<StockSignal> {
    let handle = match product_handle(url) {
        Some(handle) => handle,
        // Collection URLs can still resolve to a single product.
        None => resolve_collection_product(fetcher, url).await?,
    };
    let root = store_root(url)?;

    let endpoint = format!("{root}/products/{handle}.js");
    let page = match fetcher.get_lenient(&endpoint, Accept::Json).await {
        Ok(page) => page,
        Err(err) => {
            debug!("platform endpoint fetch failed for {}: {}", endpoint, err);
            return None;
        }
    };
    if !page.is_success() {
        debug!("platform endpoint {} answered {}", endpoint, page.status);
        return None;
    }

    let wanted_variant = url
        .query_pairs()
        .find(|(k, _)| k == "variant")
        .map(|(_, v)| v.to_string());

    signal_from_product_json(&page.json()?, wanted_variant.as_deref())
}

/// Map a single-product collection URL to its product handle via the
/// collection's products.json.
async fn resolve_collection_product(fetcher: &dyn Fetcher, url: &Url) -> Option<String> {
    let handle = collection_handle(url)?;
    let root = store_root(url)?;
    let endpoint = format!("{root}/collections/{handle}/products.json?limit=1");
    let page = fetcher.get_lenient(&endpoint, Accept::Json).await.ok()?;
    if !page.is_success() {
        return None;
    }
    let json = page.json()?;
    let products = json.get("products")?.as_array()?;
    if products.len() != 1 {
        return None;
    }
    products
        .first()?
        .get("handle")
        .and_then(|h| h.as_str())
        .map(|h| h.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handle_parsing() {
        let url = Url::parse("https://shop.example.com/en/products/widget-3000?variant=42").unwrap();
        assert_eq!(product_handle(&url), Some("widget-3000".to_string()));
        assert_eq!(collection_handle(&url), None);

        let coll = Url::parse("https://shop.example.com/collections/new-arrivals").unwrap();
        assert_eq!(collection_handle(&coll), Some("new-arrivals".to_string()));
        assert_eq!(product_handle(&coll), None);

        let all = Url::parse("https://shop.example.com/collections/all").unwrap();
        assert_eq!(collection_handle(&all), None);
    }

    #[test]
    fn any_available_variant_wins_without_pin() {
        let product = json!({
            "variants": [
                {"id": 1, "available": false, "price": "19.99", "inventory_quantity": 0},
                {"id": 2, "available": true, "price": 1350, "inventory_quantity": 4}
            ],
            "images": ["//cdn.example/img.jpg"]
        });
        let signal = signal_from_product_json(&product, None).unwrap();
        assert_eq!(signal.availability, Availability::InStock);
        assert_eq!(signal.price, Some(13.50));
        assert_eq!(signal.variant_id.as_deref(), Some("2"));
        assert_eq!(signal.stock_qty_hint, 4);
        assert_eq!(signal.image_url.as_deref(), Some("https://cdn.example/img.jpg"));
    }

    #[test]
    fn pinned_variant_answers_for_itself() {
        let product = json!({
            "variants": [
                {"id": 1, "available": false, "price": "19.99"},
                {"id": 2, "available": true, "price": "24.99"}
            ]
        });
        let signal = signal_from_product_json(&product, Some("1")).unwrap();
        assert_eq!(signal.availability, Availability::OutOfStock);
        assert_eq!(signal.variant_id.as_deref(), Some("1"));
        assert_eq!(signal.price, Some(19.99));
    }

    #[test]
    fn continue_policy_flags_ambiguous_quantity() {
        let product = json!({
            "variants": [
                {"id": 7, "available": true, "price": "9.99",
                 "inventory_quantity": -3, "inventory_policy": "continue"}
            ]
        });
        let signal = signal_from_product_json(&product, None).unwrap();
        assert_eq!(signal.availability, Availability::InStock);
        assert!(signal.policy_ambiguous);
        assert_eq!(signal.stock_qty_hint, 0);
    }

    #[test]
    fn platform_markers_detected() {
        assert!(is_platform_markup("<script src=\"https://cdn.shopify.com/x.js\">"));
        assert!(!is_platform_markup("<html><body>plain store</body></html>"));
    }

    #[test]
    fn analytics_meta_blob_parses() {
        let html = r#"<script>var meta = {"product":{"variants":[{"id":99,"price":1299}]}} ;
</script>"#;
        let signal = signal_from_analytics_meta(html).unwrap();
        assert_eq!(signal.variant_id.as_deref(), Some("99"));
        assert_eq!(signal.price, Some(12.99));
        assert_eq!(signal.availability, Availability::Unknown);
    }
}
