//! [`StoryPage`] backed by a local Chromium through chromiumoxide

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::StoryPage;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::js_string;

/// Launch settings for [`ChromiumBrowser`]
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Chrome/Chromium executable; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub headless: bool,

    /// Disable the Chromium sandbox, needed in most containers
    pub no_sandbox: bool,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: true,
        }
    }
}

/// A launched browser plus the task pumping its CDP connection
pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(options: &ChromiumOptions) -> HarnessResult<Self> {
        let mut builder = BrowserConfig::builder();
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(HarnessError::Page)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(page_error)?;
        let handler = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if let Err(e) = result {
                    warn!("chromium handler error: {}", e);
                }
            }
        });

        debug!("Launched chromium");
        Ok(Self { browser, handler })
    }

    /// Open a blank tab
    pub async fn new_page(&self) -> HarnessResult<ChromiumPage> {
        let page = self.browser.new_page("about:blank").await.map_err(page_error)?;
        Ok(ChromiumPage { page })
    }

    pub async fn close(mut self) -> HarnessResult<()> {
        let closed = self.browser.close().await.map(|_| ()).map_err(page_error);
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed
    }
}

/// One browser tab
#[derive(Clone)]
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Evaluate `expression`, awaiting a returned promise, and return its JSON value
    pub async fn evaluate_json(&self, expression: &str) -> HarnessResult<serde_json::Value> {
        let result = self.page.evaluate(expression).await.map_err(page_error)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Text of the first element matching `selector`, if any
    pub async fn text_content(&self, selector: &str) -> HarnessResult<Option<String>> {
        let value = self
            .evaluate_json(&format!(
                "document.querySelector({})?.textContent ?? null",
                js_string(selector)
            ))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }
}

#[async_trait]
impl StoryPage for ChromiumPage {
    async fn goto(&self, url: &str) -> HarnessResult<()> {
        self.page.goto(url).await.map_err(page_error)?;
        Ok(())
    }

    async fn add_module_script(&self, content: &str) -> HarnessResult<()> {
        self.evaluate_json(&module_script_expression(content)).await?;
        Ok(())
    }

    async fn add_style_link(&self, url: &str) -> HarnessResult<()> {
        self.evaluate_json(&style_link_expression(url)).await?;
        Ok(())
    }
}

fn page_error(e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Page(e.to_string())
}

/// Promise that appends an inline module script and settles once it has run.
///
/// Inline module scripts fire no `load` event, so the script signals
/// completion through a one-off global. Uncaught errors during evaluation
/// surface as window `error` events; failed imports as an element `error`.
fn module_script_expression(content: &str) -> String {
    format!(
        r#"new Promise((resolve, reject) => {{
  const token = "__storyHarness_" + Math.random().toString(36).slice(2);
  const script = document.createElement("script");
  const cleanup = () => {{
    delete window[token];
    window.removeEventListener("error", onError);
  }};
  const onError = (event) => {{
    cleanup();
    const err = event.error;
    reject(new Error(err ? `${{err.name}}: ${{err.message}}` : String(event.message)));
  }};
  window[token] = () => {{ cleanup(); resolve(true); }};
  window.addEventListener("error", onError);
  script.type = "module";
  script.addEventListener("error", () => {{ cleanup(); reject(new Error("module script failed to load")); }});
  script.textContent = {content} + "\nwindow[" + JSON.stringify(token) + "]();\n";
  document.head.appendChild(script);
}})"#,
        content = js_string(content),
    )
}

fn style_link_expression(url: &str) -> String {
    format!(
        r#"new Promise((resolve, reject) => {{
  const link = document.createElement("link");
  link.rel = "stylesheet";
  link.href = {url};
  link.addEventListener("load", () => resolve(true));
  link.addEventListener("error", () => reject(new Error("stylesheet failed to load: " + link.href)));
  document.head.appendChild(link);
}})"#,
        url = js_string(url),
    )
}
