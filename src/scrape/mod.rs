//! Evidence extraction: layered strategies that turn a product URL into
//! fused stock/price evidence.
//!
//! Strategies run in a fixed order. The platform JSON endpoint is tried
//! first and can settle the check on its own; otherwise the fetched HTML is
//! read through structured data and profile selectors, and a headless
//! render is the last resort for script-only storefronts.

pub mod browser;
pub mod platform;
pub mod price;
pub mod selectors;
pub mod structured;

use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::models::{
    resolve_signals, Availability, ScrapeEvidence, SignalSource, StockSignal, StoreProfile,
};
use crate::net::{Accept, Fetcher};

pub use browser::Renderer;

/// Runs the extraction ladder for one product URL.
pub struct EvidenceExtractor {
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl EvidenceExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>, renderer: Option<Arc<dyn Renderer>>) -> Self {
        Self { fetcher, renderer }
    }

    /// Extract evidence for a product URL. Returns `None` only when no
    /// strategy could produce anything at all, so a failed check never
    /// masquerades as "out of stock".
    pub async fn extract(&self, url: &str, profile: &StoreProfile) -> Option<ScrapeEvidence> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("unparseable product URL {}: {}", url, err);
                return None;
            }
        };

        if profile.requires_render {
            return self.extract_rendered(url, profile, Vec::new(), false).await;
        }

        let mut signals: Vec<StockSignal> = Vec::new();
        let mut recognized_platform = false;

        if let Some(platform_signal) = platform::fetch_platform_signal(self.fetcher.as_ref(), &parsed).await
        {
            recognized_platform = true;
            let settled = platform_signal.availability == Availability::InStock
                && platform_signal.variant_id.is_some();
            signals.push(platform_signal);
            // A definite platform "available" with a variant id needs no
            // cross-check; anything else is verified against the page.
            if settled {
                return Some(resolve_signals(&signals, true));
            }
        }

        let html = match self.fetcher.get(url, Accept::Html).await {
            Ok(page) => Some(page.body),
            Err(err) => {
                debug!("page fetch failed for {}: {}", url, err);
                None
            }
        };

        if let Some(ref html) = html {
            if !recognized_platform && platform::is_platform_markup(html) {
                recognized_platform = true;
                if let Some(meta_signal) = platform::signal_from_analytics_meta(html) {
                    signals.push(meta_signal);
                }
            }
            signals.push(structured::extract_structured_signal(html, url));
            signals.push(selectors::extract_selector_signal(
                html,
                profile,
                url,
                SignalSource::SelectorBased,
            ));
        } else if signals.is_empty() {
            // Nothing static worked; the renderer is the only option left.
            return self.extract_rendered(url, profile, signals, recognized_platform).await;
        }

        let evidence = resolve_signals(&signals, recognized_platform);
        if evidence.in_stock == Availability::Unknown && self.renderer.is_some() {
            return self
                .extract_rendered(url, profile, signals, recognized_platform)
                .await;
        }
        Some(evidence)
    }

    /// Render the page and re-read it with the rendered-fallback strategy,
    /// fusing with any signals gathered statically.
    async fn extract_rendered(
        &self,
        url: &str,
        profile: &StoreProfile,
        mut signals: Vec<StockSignal>,
        recognized_platform: bool,
    ) -> Option<ScrapeEvidence> {
        let renderer = match self.renderer {
            Some(ref renderer) => renderer,
            None => {
                if signals.is_empty() {
                    warn!("no renderer available for {}", url);
                    return None;
                }
                return Some(resolve_signals(&signals, recognized_platform));
            }
        };

        let wait_selector = profile.stock_selector.as_deref().and_then(|s| s.split(',').next());
        let html = match renderer.render(url, wait_selector).await {
            Ok(html) => html,
            Err(err) => {
                warn!("render failed for {}: {}", url, err);
                if signals.is_empty() {
                    return None;
                }
                return Some(resolve_signals(&signals, recognized_platform));
            }
        };

        let recognized_platform = recognized_platform || platform::is_platform_markup(&html);
        signals.push(structured::extract_structured_signal(&html, url));
        signals.push(selectors::extract_selector_signal(
            &html,
            profile,
            url,
            SignalSource::RenderedFallback,
        ));
        Some(resolve_signals(&signals, recognized_platform))
    }
}
