use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::element::Element;
use futures::StreamExt;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::api::ExistenceProbe;
use crate::backend::RetrievalBackend;
use crate::classify::{RawResponse, is_attachment};
use crate::config::BrowserSettings;
use crate::domain::ContractId;
use crate::error::HarvestError;

const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// Drives a headless Chromium page per contract and captures the attachment
/// response triggered by the download button.
///
/// The browser is launched once and shared by every attempt. Each attempt opens
/// its own page with its own response listeners; both are dropped when the
/// attempt resolves.
pub struct BrowserBackend {
    runtime: Runtime,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    probe: Option<ExistenceProbe>,
    settings: BrowserSettings,
}

impl BrowserBackend {
    pub fn launch(settings: BrowserSettings) -> Result<Self, HarvestError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("harvest-browser")
            .enable_all()
            .build()
            .map_err(|err| HarvestError::Browser(err.to_string()))?;

        let config = browser_config(&settings)?;
        let (browser, mut handler) = runtime
            .block_on(Browser::launch(config))
            .map_err(browser_err)?;
        let handler = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let probe = match settings.probe_url {
            Some(_) => Some(ExistenceProbe::new(settings.probe_timeout)?),
            None => None,
        };

        tracing::info!(headless = settings.headless, "browser session started");
        Ok(Self {
            runtime,
            browser: Some(browser),
            handler: Some(handler),
            probe,
            settings,
        })
    }
}

impl RetrievalBackend for BrowserBackend {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn fetch(&mut self, id: &ContractId) -> Result<RawResponse, HarvestError> {
        if let (Some(probe), Some(url)) = (&self.probe, self.settings.probe_url_for(id.as_str())) {
            let status = probe.status(&url)?;
            if status != 200 {
                return Ok(RawResponse::Missing { status });
            }
        }

        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("browser session already closed".to_string()))?;
        let url = self.settings.page_url_for(id.as_str());
        let settings = &self.settings;

        self.runtime.block_on(async {
            let page = browser.new_page("about:blank").await.map_err(browser_err)?;
            let result = tokio::time::timeout(
                settings.attempt_timeout(),
                capture_download(&page, &url, settings),
            )
            .await
            .unwrap_or_else(|_| Err(HarvestError::BrowserTimeout(format!("download from {url}"))));
            if let Err(err) = page.close().await {
                tracing::debug!(%url, error = %err, "page close failed");
            }
            result
        })
    }

    fn close(&mut self) -> Result<(), HarvestError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = self.runtime.block_on(async {
            browser.close().await.map_err(browser_err)?;
            browser
                .wait()
                .await
                .map_err(|err| HarvestError::Browser(err.to_string()))?;
            Ok::<(), HarvestError>(())
        });
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        tracing::info!("browser session closed");
        result
    }
}

impl Drop for BrowserBackend {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "browser shutdown failed");
        }
    }
}

fn browser_config(settings: &BrowserSettings) -> Result<BrowserConfig, HarvestError> {
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--disable-extensions");
    if !settings.headless {
        builder = builder.with_head();
    }
    if let Some(executable) = &settings.executable {
        builder = builder.chrome_executable(executable);
    }
    builder.build().map_err(HarvestError::Browser)
}

async fn capture_download(
    page: &Page,
    url: &str,
    settings: &BrowserSettings,
) -> Result<RawResponse, HarvestError> {
    page.execute(EnableParams::default())
        .await
        .map_err(browser_err)?;
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_err)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(browser_err)?;

    page.goto(url).await.map_err(browser_err)?;
    tokio::time::sleep(settings.settle).await;

    let button = wait_for_element(page, &settings.ready_selector, settings.ready_timeout).await?;
    button.click().await.map_err(browser_err)?;

    let capture = async {
        let mut found = None;
        while let Some(event) = responses.next().await {
            if let Some(disposition) = content_disposition(&event)
                && is_attachment(Some(&disposition))
            {
                found = Some((event.request_id.clone(), disposition));
                break;
            }
        }
        let (request_id, disposition) = found.ok_or_else(|| {
            HarvestError::Browser("response stream ended before a download".to_string())
        })?;
        while let Some(event) = finished.next().await {
            if event.request_id == request_id {
                return Ok((request_id, disposition));
            }
        }
        Err(HarvestError::Browser(
            "response stream ended before the download finished".to_string(),
        ))
    };
    let (request_id, disposition) = tokio::time::timeout(settings.capture_timeout, capture)
        .await
        .map_err(|_| HarvestError::BrowserTimeout("attachment response".to_string()))??;

    let body = page
        .execute(GetResponseBodyParams::new(request_id))
        .await
        .map_err(browser_err)?;
    let bytes = if body.result.base64_encoded {
        STANDARD
            .decode(body.result.body.as_bytes())
            .map_err(|err| HarvestError::Malformed(err.to_string()))?
    } else {
        body.result.body.clone().into_bytes()
    };

    Ok(RawResponse::Document {
        bytes,
        disposition: Some(disposition),
    })
}

async fn wait_for_element(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Element, HarvestError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match page.find_element(selector).await {
            Ok(element) => return Ok(element),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(ELEMENT_POLL).await;
            }
            Err(err) => {
                return Err(HarvestError::BrowserTimeout(format!("{selector} ({err})")));
            }
        }
    }
}

fn content_disposition(event: &EventResponseReceived) -> Option<String> {
    event
        .response
        .headers
        .inner()
        .as_object()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-disposition"))
        .and_then(|(_, value)| value.as_str())
        .map(|value| value.to_string())
}

fn browser_err(err: chromiumoxide::error::CdpError) -> HarvestError {
    HarvestError::Browser(err.to_string())
}
