//! Fused scraping evidence and the signals it is resolved from.

use serde::{Deserialize, Serialize};

/// Tri-state stock availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    Unknown,
}

impl Availability {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::InStock,
            Some(false) => Self::OutOfStock,
            None => Self::Unknown,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::InStock => Some(true),
            Self::OutOfStock => Some(false),
            Self::Unknown => None,
        }
    }

    /// Value written at the persistence boundary: a product is not flagged
    /// "in stock" on ambiguous evidence.
    pub fn persisted(&self) -> bool {
        matches!(self, Self::InStock)
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Which extraction strategy produced a signal. Order of variants matches the
/// fixed evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    PlatformApi,
    StructuredData,
    SelectorBased,
    RenderedFallback,
}

/// One extraction strategy's verdict for a target.
#[derive(Debug, Clone)]
pub struct StockSignal {
    pub source: SignalSource,
    pub availability: Availability,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub variant_id: Option<String>,
    pub stock_qty_hint: u32,
    pub raw_stock_text: String,
    /// Platform inventory policy allows overselling, so its "unavailable"
    /// verdict is not authoritative.
    pub policy_ambiguous: bool,
}

impl StockSignal {
    pub fn empty(source: SignalSource) -> Self {
        Self {
            source,
            availability: Availability::Unknown,
            price: None,
            image_url: None,
            variant_id: None,
            stock_qty_hint: 0,
            raw_stock_text: String::new(),
            policy_ambiguous: false,
        }
    }
}

/// The fused best-effort output of one evidence extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ScrapeEvidence {
    pub in_stock: Availability,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub variant_id: Option<String>,
    pub stock_qty_hint: u32,
    pub raw_stock_text: String,
    pub is_recognized_platform: bool,
}

/// Fuse signals into final evidence using strict precedence.
///
/// `in_stock` is true if any source says true; false if none says true and at
/// least one says false; unknown otherwise. Price, image and raw text are the
/// first non-empty candidate in signal order; the variant id only ever comes
/// from the platform probe.
pub fn resolve_signals(signals: &[StockSignal], is_recognized_platform: bool) -> ScrapeEvidence {
    let mut evidence = ScrapeEvidence {
        is_recognized_platform,
        ..Default::default()
    };

    let mut any_false = false;
    for signal in signals {
        match signal.availability {
            Availability::InStock => evidence.in_stock = Availability::InStock,
            Availability::OutOfStock => any_false = true,
            Availability::Unknown => {}
        }
        if evidence.price.is_none() {
            evidence.price = signal.price;
        }
        if evidence.image_url.is_none() {
            evidence.image_url = signal.image_url.clone();
        }
        if evidence.variant_id.is_none() && signal.source == SignalSource::PlatformApi {
            evidence.variant_id = signal.variant_id.clone();
        }
        if evidence.stock_qty_hint == 0 {
            evidence.stock_qty_hint = signal.stock_qty_hint;
        }
        if evidence.raw_stock_text.is_empty() && !signal.raw_stock_text.is_empty() {
            evidence.raw_stock_text = signal.raw_stock_text.clone();
        }
    }

    if evidence.in_stock != Availability::InStock && any_false {
        evidence.in_stock = Availability::OutOfStock;
    }
    if evidence.raw_stock_text.is_empty() {
        evidence.raw_stock_text = match evidence.in_stock {
            Availability::InStock => "in stock".to_string(),
            Availability::OutOfStock => "out of stock".to_string(),
            Availability::Unknown => String::new(),
        };
    }

    evidence
}
