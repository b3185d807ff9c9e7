//! Pure candidate handling for keyword discovery: relevance, price bands,
//! cross-channel merging and run-to-run diffing.

use std::collections::BTreeSet;

use crate::models::{Availability, DiscoveredProduct, KeywordWatch};
use crate::net::canonical_url;

/// Hard cap on candidates per discovery run.
pub const MAX_CANDIDATES: usize = 250;

/// Whether a product name (or URL slug) matches the keyword: the whole
/// keyword as a substring, or at least half of its multi-character tokens.
pub fn is_relevant(keyword: &str, name: &str) -> bool {
    let keyword = keyword.to_lowercase();
    let name = name.to_lowercase();
    if keyword.is_empty() || name.is_empty() {
        return false;
    }
    if name.contains(&keyword) {
        return true;
    }

    let tokens: Vec<&str> = keyword
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .collect();
    if tokens.is_empty() {
        return false;
    }
    let hits = tokens.iter().filter(|t| name.contains(*t)).count();
    hits * 2 >= tokens.len()
}

/// Search page URL for a watch: the explicit template if configured, else
/// the store's standard search endpoint.
pub fn build_search_url(watch: &KeywordWatch) -> String {
    let encoded = urlencoding::encode(&watch.keyword);
    match watch.search_url {
        Some(ref template) if template.contains("{keyword}") => {
            template.replace("{keyword}", &encoded)
        }
        Some(ref explicit) => explicit.clone(),
        None => format!(
            "{}/search?q={}",
            watch.store_url.trim_end_matches('/'),
            encoded
        ),
    }
}

pub fn within_price_band(price: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    match price {
        // Unpriced candidates pass; the band only rejects known prices.
        None => true,
        Some(price) => {
            min.map(|m| price >= m).unwrap_or(true) && max.map(|m| price <= m).unwrap_or(true)
        }
    }
}

/// Merge candidates from all channels. The first channel to see a product
/// wins its identity (the canonical URL); later channels overwrite price,
/// stock and name on the existing entry, since the suggest channel reports
/// the least authoritative data and runs first. Products whose URLs differ
/// across channels are still folded together when their names match
/// exactly.
pub fn merge_candidates(channels: Vec<Vec<DiscoveredProduct>>) -> Vec<DiscoveredProduct> {
    let mut merged: Vec<DiscoveredProduct> = Vec::new();
    for channel in channels {
        for mut candidate in channel {
            candidate.url = canonical_url(&candidate.url);
            let slot = merged.iter().position(|p| p.url == candidate.url).or_else(|| {
                // fallback identity: same title, different URL
                if candidate.name.is_empty() {
                    return None;
                }
                let name = candidate.name.to_lowercase();
                merged.iter().position(|p| p.name.to_lowercase() == name)
            });
            match slot {
                None => {
                    if merged.len() < MAX_CANDIDATES {
                        merged.push(candidate);
                    }
                }
                Some(i) => {
                    let existing = &mut merged[i];
                    if candidate.price.is_some() {
                        existing.price = candidate.price;
                    }
                    if candidate.in_stock != Availability::Unknown {
                        existing.in_stock = candidate.in_stock;
                    }
                    if !candidate.name.is_empty() {
                        existing.name = candidate.name;
                    }
                    if existing.image.is_empty() {
                        existing.image = candidate.image;
                    }
                }
            }
        }
    }
    merged
}

/// Split a run's findings into never-seen products and known products that
/// came back in stock.
pub fn diff_run(
    watch: &KeywordWatch,
    found: &[DiscoveredProduct],
) -> (Vec<DiscoveredProduct>, Vec<DiscoveredProduct>) {
    let mut new_items = Vec::new();
    let mut back_in_stock = Vec::new();
    for product in found {
        if !watch.known_product_urls.contains(&product.url) {
            new_items.push(product.clone());
        } else if product.in_stock == Availability::InStock
            && watch.known_stock_map.get(&product.url) == Some(&false)
        {
            back_in_stock.push(product.clone());
        }
    }
    (new_items, back_in_stock)
}

/// Next generation of the known-URL set: URLs seen this run, plus old
/// entries that are still tracked as targets. Everything else ages out so
/// the set cannot grow without bound as stores rotate their catalogs.
pub fn collect_known_urls(
    old_known: &BTreeSet<String>,
    tracked: &BTreeSet<String>,
    seen_this_run: &[DiscoveredProduct],
) -> BTreeSet<String> {
    let mut next: BTreeSet<String> = old_known.intersection(tracked).cloned().collect();
    next.extend(seen_this_run.iter().map(|p| p.url.clone()));
    next
}
