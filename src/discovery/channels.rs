//! The four discovery channels, cheapest first: search suggestions, the
//! whole-catalog JSON feed, per-collection JSON feeds and the HTML search
//! page. Channels are independent; any of them failing just yields an
//! empty candidate list.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::models::{Availability, DiscoveredProduct, KeywordWatch};
use crate::net::{Accept, Fetcher};
use crate::scrape::price::normalize_minor_units;

use super::merge::{build_search_url, is_relevant};

/// Page caps keep a single run bounded on very large catalogs.
const CATALOG_PAGE_LIMIT: u32 = 20;
const CATALOG_PAGE_SIZE: u32 = 50;
const COLLECTION_PAGE_LIMIT: u32 = 3;
const COLLECTION_SCAN_LIMIT: usize = 5;
const SEARCH_PAGE_LIMIT: u32 = 10;

fn store_root(store_url: &str) -> String {
    store_url.trim_end_matches('/').to_string()
}

fn absolutize(root: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", root, href)
    }
}

fn product_price(product: &Value) -> Option<f64> {
    let variants = product.get("variants")?.as_array()?;
    variants
        .iter()
        .filter_map(|v| match v.get("price") {
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        })
        .map(normalize_minor_units)
        .fold(None, |best: Option<f64>, p| {
            Some(best.map(|b| b.min(p)).unwrap_or(p))
        })
}

fn product_availability(product: &Value) -> Availability {
    match product.get("variants").and_then(|v| v.as_array()) {
        Some(variants) if !variants.is_empty() => Availability::from_flag(Some(
            variants
                .iter()
                .any(|v| v.get("available").and_then(|a| a.as_bool()) == Some(true)),
        )),
        _ => Availability::Unknown,
    }
}

/// Map one entry of a products.json feed to a candidate.
fn product_from_feed(root: &str, product: &Value) -> Option<DiscoveredProduct> {
    let handle = product.get("handle")?.as_str()?;
    let name = product
        .get("title")
        .and_then(|t| t.as_str())
        .unwrap_or(handle)
        .to_string();
    let image = product
        .get("images")
        .and_then(|i| i.as_array())
        .and_then(|list| list.first())
        .and_then(|img| img.get("src").and_then(|s| s.as_str()).or(img.as_str()))
        .unwrap_or("")
        .to_string();

    Some(DiscoveredProduct {
        name,
        url: format!("{}/products/{}", root, handle),
        price: product_price(product),
        in_stock: product_availability(product),
        image,
    })
}

/// Channel A: the store's search suggestion endpoint. Fast and keyword
/// filtered server-side, but reports neither price nor stock.
pub async fn suggest_channel(fetcher: &dyn Fetcher, watch: &KeywordWatch) -> Vec<DiscoveredProduct> {
    let root = store_root(&watch.store_url);
    let url = format!(
        "{}/search/suggest.json?q={}&resources[type]=product&resources[limit]=10",
        root,
        urlencoding::encode(&watch.keyword)
    );

    let Ok(page) = fetcher.get_lenient(&url, Accept::Json).await else {
        return Vec::new();
    };
    if !page.is_success() {
        return Vec::new();
    }
    let Some(json) = page.json() else {
        return Vec::new();
    };

    let products = json
        .pointer("/resources/results/products")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();

    products
        .iter()
        .filter_map(|p| {
            let href = p.get("url")?.as_str()?;
            Some(DiscoveredProduct {
                name: p
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string(),
                url: absolutize(&root, href),
                price: p
                    .get("price")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .map(normalize_minor_units),
                in_stock: Availability::Unknown,
                image: p
                    .get("image")
                    .and_then(|i| i.as_str())
                    .unwrap_or("")
                    .to_string(),
            })
        })
        .collect()
}

/// Channel B: page through the whole-catalog JSON feed.
pub async fn catalog_channel(fetcher: &dyn Fetcher, watch: &KeywordWatch) -> Vec<DiscoveredProduct> {
    let root = store_root(&watch.store_url);
    let mut out = Vec::new();

    for page_no in 1..=CATALOG_PAGE_LIMIT {
        let url = format!(
            "{}/collections/all/products.json?limit={}&page={}",
            root, CATALOG_PAGE_SIZE, page_no
        );
        let Ok(page) = fetcher.get_lenient(&url, Accept::Json).await else {
            break;
        };
        if !page.is_success() {
            break;
        }
        let products = page
            .json()
            .and_then(|json| json.get("products").and_then(|p| p.as_array()).cloned())
            .unwrap_or_default();
        if products.is_empty() {
            break;
        }
        let full_page = products.len() as u32 >= CATALOG_PAGE_SIZE;
        out.extend(products.iter().filter_map(|p| product_from_feed(&root, p)));
        if !full_page {
            break;
        }
    }
    out
}

/// Collection handles linked from a collections index page, keyword-relevant
/// ones first.
fn parse_collection_handles(html: &str, keyword: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href*=\"/collections/\"]") else {
        return Vec::new();
    };
    let mut handles = Vec::new();
    for link in doc.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(handle) = href
            .split("/collections/")
            .nth(1)
            .map(|rest| rest.split(['/', '?', '#']).next().unwrap_or(""))
        else {
            continue;
        };
        if handle.is_empty() || handle == "all" {
            continue;
        }
        let label = link.text().collect::<String>();
        if !is_relevant(keyword, &label) && !is_relevant(keyword, handle) {
            continue;
        }
        if !handles.iter().any(|h| h == handle) {
            handles.push(handle.to_string());
        }
    }
    handles.truncate(COLLECTION_SCAN_LIMIT);
    handles
}

/// Channel C: find keyword-relevant collections and page through their
/// JSON feeds.
pub async fn collections_channel(
    fetcher: &dyn Fetcher,
    watch: &KeywordWatch,
) -> Vec<DiscoveredProduct> {
    let root = store_root(&watch.store_url);
    let index_url = format!("{}/collections", root);
    let Ok(page) = fetcher.get_lenient(&index_url, Accept::Html).await else {
        return Vec::new();
    };
    if !page.is_success() {
        return Vec::new();
    }

    let handles = parse_collection_handles(&page.body, &watch.keyword);
    debug!("watch {}: {} relevant collections", watch.id, handles.len());

    let mut out = Vec::new();
    for handle in handles {
        for page_no in 1..=COLLECTION_PAGE_LIMIT {
            let url = format!(
                "{}/collections/{}/products.json?limit={}&page={}",
                root, handle, CATALOG_PAGE_SIZE, page_no
            );
            let Ok(page) = fetcher.get_lenient(&url, Accept::Json).await else {
                break;
            };
            if !page.is_success() {
                break;
            }
            let products = page
                .json()
                .and_then(|json| json.get("products").and_then(|p| p.as_array()).cloned())
                .unwrap_or_default();
            if products.is_empty() {
                break;
            }
            let full_page = products.len() as u32 >= CATALOG_PAGE_SIZE;
            out.extend(products.iter().filter_map(|p| product_from_feed(&root, p)));
            if !full_page {
                break;
            }
        }
    }
    out
}

struct SearchPage {
    products: Vec<DiscoveredProduct>,
    next_url: Option<String>,
}

/// Parse one HTML search results page: product links plus the next-page
/// link, if any.
fn parse_search_page(html: &str, root: &str) -> SearchPage {
    let doc = Html::parse_document(html);
    let mut products = Vec::new();

    if let Ok(selector) = Selector::parse("a[href*=\"/products/\"]") {
        for link in doc.select(&selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let name = link.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                continue;
            }
            let url = absolutize(root, href);
            if !products.iter().any(|p: &DiscoveredProduct| p.url == url) {
                products.push(DiscoveredProduct {
                    name,
                    url,
                    price: None,
                    in_stock: Availability::Unknown,
                    image: String::new(),
                });
            }
        }
    }

    let next_url = Selector::parse("a[rel=\"next\"], a.pagination__next, link[rel=\"next\"]")
        .ok()
        .and_then(|selector| {
            doc.select(&selector)
                .find_map(|el| el.value().attr("href"))
                .map(|href| absolutize(root, href))
        });

    SearchPage { products, next_url }
}

/// Channel D: the storefront's HTML search, following next links.
pub async fn search_channel(fetcher: &dyn Fetcher, watch: &KeywordWatch) -> Vec<DiscoveredProduct> {
    let root = store_root(&watch.store_url);
    let mut url = build_search_url(watch);
    let mut out = Vec::new();

    for _ in 0..SEARCH_PAGE_LIMIT {
        let Ok(page) = fetcher.get_lenient(&url, Accept::Html).await else {
            break;
        };
        if !page.is_success() {
            break;
        }
        let parsed = parse_search_page(&page.body, &root);
        out.extend(parsed.products);
        match parsed.next_url {
            Some(next) if next != url => url = next,
            _ => break,
        }
    }
    out
}

/// Every channel in evaluation order, for the merge step.
pub async fn run_all_channels(
    fetcher: &dyn Fetcher,
    watch: &KeywordWatch,
) -> Vec<Vec<DiscoveredProduct>> {
    vec![
        suggest_channel(fetcher, watch).await,
        catalog_channel(fetcher, watch).await,
        collections_channel(fetcher, watch).await,
        search_channel(fetcher, watch).await,
    ]
}
