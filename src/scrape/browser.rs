//! Headless-browser rendering fallback for storefronts that only populate
//! stock state from JavaScript.

use async_trait::async_trait;

/// Renders a URL to final HTML. Behind a trait so checks can run without a
/// browser installed and tests can feed canned markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, wait_selector: Option<&str>) -> anyhow::Result<String>;
    async fn close(&self);
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumRenderer;

#[cfg(feature = "browser")]
mod chromium {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    use super::Renderer;

    /// Common Chrome/Chromium install locations, checked before PATH.
    const CHROME_PATHS: &[&str] = &[
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/snap/bin/chromium",
    ];

    /// Request patterns not needed to read stock state.
    const BLOCKED_RESOURCES: &[&str] = &[
        "*.png",
        "*.jpg",
        "*.jpeg",
        "*.gif",
        "*.webp",
        "*.woff",
        "*.woff2",
        "*.ttf",
        "*googletagmanager*",
        "*google-analytics*",
        "*facebook*",
        "*hotjar*",
        "*klaviyo*",
    ];

    fn find_chrome() -> Result<String> {
        for path in CHROME_PATHS {
            if std::path::Path::new(path).exists() {
                return Ok(path.to_string());
            }
        }
        for cmd in &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Ok(path);
                    }
                }
            }
        }
        Err(anyhow::anyhow!(
            "Chrome/Chromium not found; install it or disable rendered checks"
        ))
    }

    /// Lazily launched headless Chrome shared across checks.
    pub struct ChromiumRenderer {
        browser: Mutex<Option<Arc<Browser>>>,
        timeout: Duration,
    }

    impl ChromiumRenderer {
        pub fn new(timeout: Duration) -> Self {
            Self {
                browser: Mutex::new(None),
                timeout,
            }
        }

        async fn ensure_browser(&self) -> Result<Arc<Browser>> {
            let mut guard = self.browser.lock().await;
            if let Some(ref browser) = *guard {
                return Ok(Arc::clone(browser));
            }

            let chrome_path = find_chrome()?;
            info!("launching headless browser at {}", chrome_path);

            let config = BrowserConfig::builder()
                .chrome_executable(chrome_path)
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-background-networking")
                .arg("--disable-sync")
                .arg("--no-sandbox")
                .arg("--disable-gpu")
                .build()
                .map_err(|e| anyhow::anyhow!("browser config: {e}"))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .context("failed to launch browser")?;
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let browser = Arc::new(browser);
            *guard = Some(Arc::clone(&browser));
            Ok(browser)
        }

        async fn render_inner(&self, page: &Page, url: &str, wait_selector: Option<&str>) -> Result<String> {
            let blocked = SetBlockedUrLsParams::new(
                BLOCKED_RESOURCES.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            );
            if let Err(e) = page.execute(blocked).await {
                debug!("resource blocking unavailable: {}", e);
            }

            tokio::time::timeout(self.timeout, page.goto(url))
                .await
                .map_err(|_| anyhow::anyhow!("navigation timed out for {url}"))?
                .with_context(|| format!("navigation failed for {url}"))?;

            if let Some(selector) = wait_selector {
                match tokio::time::timeout(Duration::from_secs(5), page.find_element(selector)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => debug!("selector {} not found: {}", selector, e),
                    Err(_) => warn!("timed out waiting for selector {}", selector),
                }
            }
            // Grace period for late stock widgets.
            tokio::time::sleep(Duration::from_millis(800)).await;

            page.content().await.context("failed to read rendered HTML")
        }
    }

    #[async_trait]
    impl Renderer for ChromiumRenderer {
        async fn render(&self, url: &str, wait_selector: Option<&str>) -> Result<String> {
            let browser = self.ensure_browser().await?;
            let page = browser.new_page("about:blank").await?;
            let result = self.render_inner(&page, url, wait_selector).await;
            let _ = page.close().await;
            result
        }

        async fn close(&self) {
            let mut guard = self.browser.lock().await;
            if let Some(browser) = guard.take() {
                if let Ok(mut browser) = Arc::try_unwrap(browser) {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                }
            }
        }
    }
}
