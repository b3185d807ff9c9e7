//! CSS-selector based availability and price reads driven by store profiles.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::{Availability, SignalSource, StockSignal, StoreProfile};

use super::price::parse_price;

/// Button captions that force "out of stock" regardless of other text.
pub const SOLD_OUT_BUTTON_TEXTS: &[&str] = &[
    "sold out",
    "out of stock",
    "razprodano",
    "ni na zalogi",
    "unavailable",
];

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn first_match<'a>(doc: &'a Html, selector_list: &str) -> Option<ElementRef<'a>> {
    for raw in selector_list.split(',') {
        let Ok(selector) = Selector::parse(raw.trim()) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            return Some(el);
        }
    }
    None
}

/// Whether an add-to-cart button is visibly unusable.
fn button_disabled(el: &ElementRef<'_>) -> bool {
    let v = el.value();
    v.attr("disabled").is_some()
        || v.attr("aria-disabled") == Some("true")
        || v.attr("data-available") == Some("false")
        || v.classes().any(|c| c == "disabled" || c == "btn--disabled")
}

/// Read stock/price/image signals out of fetched HTML using the profile's
/// selectors and phrase lists. Out-of-stock phrases are checked before
/// in-stock phrases; a disabled or sold-out button forces `false`.
pub fn extract_selector_signal(
    html: &str,
    profile: &StoreProfile,
    base_url: &str,
    source: SignalSource,
) -> StockSignal {
    let doc = Html::parse_document(html);
    let mut signal = StockSignal::empty(source);

    if let Some(ref stock_selector) = profile.stock_selector {
        if let Some(el) = first_match(&doc, stock_selector) {
            let text = element_text(&el).to_lowercase().trim().to_string();
            signal.raw_stock_text = text.clone();
            if profile.out_of_stock_text.iter().any(|p| text.contains(p)) {
                signal.availability = Availability::OutOfStock;
            } else if profile.in_stock_text.iter().any(|p| text.contains(p)) {
                signal.availability = Availability::InStock;
            }
        }
    }

    if let Some(ref cart_selector) = profile.add_to_cart_selector {
        if let Some(btn) = first_match(&doc, cart_selector) {
            let btn_text = element_text(&btn).to_lowercase();
            let sold_out = SOLD_OUT_BUTTON_TEXTS.iter().any(|t| btn_text.contains(t));
            if button_disabled(&btn) || sold_out {
                signal.availability = Availability::OutOfStock;
            } else if signal.availability == Availability::Unknown {
                signal.availability = Availability::InStock;
            }
        }
    }

    if let Some(ref price_selector) = profile.price_selector {
        for raw in price_selector.split(',') {
            let Ok(selector) = Selector::parse(raw.trim()) else {
                continue;
            };
            if let Some(el) = doc.select(&selector).next() {
                if let Some(price) = parse_price(element_text(&el).trim()) {
                    signal.price = Some(price);
                    break;
                }
            }
        }
    }

    signal.image_url = og_image(&doc, base_url);
    signal
}

/// Resolve the og:image meta tag, absolutizing relative URLs.
pub fn og_image(doc: &Html, base_url: &str) -> Option<String> {
    let selector = Selector::parse("meta[property=\"og:image\"]").ok()?;
    let content = doc
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))?;
    if content.starts_with("http") {
        Some(content.to_string())
    } else {
        Url::parse(base_url)
            .and_then(|base| base.join(content))
            .map(|u| u.to_string())
            .ok()
            .or_else(|| Some(content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreProfile;

    fn profile() -> StoreProfile {
        StoreProfile::custom()
    }

    #[test]
    fn out_of_stock_phrase_beats_in_stock_phrase() {
        let html = r#"<div class="stock">Razprodano - ni na zalogi</div>"#;
        let signal = extract_selector_signal(html, &profile(), "https://x.example", SignalSource::SelectorBased);
        assert_eq!(signal.availability, Availability::OutOfStock);
        assert!(signal.raw_stock_text.contains("razprodano"));
    }

    #[test]
    fn in_stock_phrase_matches() {
        let html = r#"<div class="availability">In stock, ships today</div>"#;
        let signal = extract_selector_signal(html, &profile(), "https://x.example", SignalSource::SelectorBased);
        assert_eq!(signal.availability, Availability::InStock);
    }

    #[test]
    fn disabled_button_forces_out_of_stock() {
        let html = r#"
            <div class="stock">In stock</div>
            <button class="add-to-cart" disabled>Add to cart</button>
        "#;
        let signal = extract_selector_signal(html, &profile(), "https://x.example", SignalSource::SelectorBased);
        assert_eq!(signal.availability, Availability::OutOfStock);
    }

    #[test]
    fn sold_out_button_text_forces_out_of_stock() {
        let html = r#"<button class="add-to-cart">Sold out</button>"#;
        let signal = extract_selector_signal(html, &profile(), "https://x.example", SignalSource::SelectorBased);
        assert_eq!(signal.availability, Availability::OutOfStock);
    }

    #[test]
    fn enabled_button_alone_means_in_stock() {
        let html = r#"<button class="add-to-cart">Add to cart</button>"#;
        let signal = extract_selector_signal(html, &profile(), "https://x.example", SignalSource::SelectorBased);
        assert_eq!(signal.availability, Availability::InStock);
    }

    #[test]
    fn price_and_relative_image_extracted() {
        let html = r#"
            <meta property="og:image" content="/cdn/img.jpg">
            <span class="price">€ 24,90</span>
        "#;
        let signal =
            extract_selector_signal(html, &profile(), "https://shop.example.com", SignalSource::SelectorBased);
        assert_eq!(signal.price, Some(24.90));
        assert_eq!(
            signal.image_url.as_deref(),
            Some("https://shop.example.com/cdn/img.jpg")
        );
    }

    #[test]
    fn nothing_found_stays_unknown() {
        let html = "<html><body><p>Landing page</p></body></html>";
        let signal = extract_selector_signal(html, &profile(), "https://x.example", SignalSource::SelectorBased);
        assert_eq!(signal.availability, Availability::Unknown);
        assert_eq!(signal.price, None);
    }
}
