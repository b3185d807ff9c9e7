//! Structured-data extraction: JSON-LD product schema and og: meta tags.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::models::{Availability, SignalSource, StockSignal};

use super::selectors::og_image;

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn find_product(json: &Value) -> Option<&Value> {
    let is_product = |v: &Value| match v.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    };

    if is_product(json) {
        return Some(json);
    }
    if let Some(graph) = json.get("@graph").and_then(|g| g.as_array()) {
        return graph.iter().find(|g| is_product(g));
    }
    None
}

/// Extract availability/price/image from embedded JSON-LD product schema,
/// falling back to og:price / og:image meta tags.
pub fn extract_structured_signal(html: &str, base_url: &str) -> StockSignal {
    let doc = Html::parse_document(html);
    let mut signal = StockSignal::empty(SignalSource::StructuredData);

    if let Ok(selector) = Selector::parse("script[type=\"application/ld+json\"]") {
        for script in doc.select(&selector) {
            let raw = script.text().collect::<String>();
            let Ok(json) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            let Some(product) = find_product(&json) else {
                continue;
            };
            let Some(offers) = product.get("offers") else {
                continue;
            };

            let offers: Vec<&Value> = match offers {
                Value::Array(list) => list.iter().collect(),
                single => vec![single],
            };

            let mut any_in_stock: Option<bool> = None;
            let mut best_price: Option<f64> = None;
            for offer in offers {
                if let Some(price) = offer.get("price").and_then(json_number) {
                    if best_price.map(|best| price < best).unwrap_or(true) {
                        best_price = Some(price);
                    }
                }
                if let Some(availability) = offer.get("availability").and_then(|a| a.as_str()) {
                    let offer_in_stock = availability.to_lowercase().contains("instock");
                    any_in_stock = Some(any_in_stock.unwrap_or(false) || offer_in_stock);
                }
            }

            signal.availability = Availability::from_flag(any_in_stock);
            signal.price = best_price;
            signal.image_url = match product.get("image") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Array(list)) => {
                    list.first().and_then(|v| v.as_str()).map(|s| s.to_string())
                }
                _ => None,
            };
            break;
        }
    }

    if signal.price.is_none() {
        if let Ok(selector) = Selector::parse(
            "meta[property=\"og:price:amount\"], meta[property=\"product:price:amount\"]",
        ) {
            signal.price = doc
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("content"))
                .and_then(|raw| raw.trim().parse::<f64>().ok());
        }
    }
    if signal.image_url.is_none() {
        signal.image_url = og_image(&doc, base_url);
    }

    signal
}
