// Scripted network and browser doubles for unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::browser::{BrowserAutomation, BrowserPage, WaitUntil};
use super::errors::{BrowserError, TransportError};
use super::transport::{HttpTransport, ProbeResponse};

pub fn video_response(length: u64) -> ProbeResponse {
    ProbeResponse {
        status: 200,
        content_type: Some("video/mp4".to_string()),
        content_length: Some(length),
    }
}

/// Answers probes and fetches from per-URL tables; anything else is a 404.
/// Every requested URL is recorded in order.
#[derive(Default)]
pub struct ScriptedTransport {
    probes: HashMap<String, ProbeResponse>,
    pages: HashMap<String, String>,
    pub requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn with_probe(mut self, url: &str, response: ProbeResponse) -> Self {
        self.probes.insert(url.to_string(), response);
        self
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<ProbeResponse, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(self.probes.get(url).cloned().unwrap_or(ProbeResponse {
            status: 404,
            content_type: Some("text/html".to_string()),
            content_length: None,
        }))
    }

    async fn fetch_text(&self, url: &str, _timeout: Duration) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or(TransportError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Browser whose pages answer `evaluate` from a script-fragment table
#[derive(Default, Clone)]
pub struct ScriptedBrowser {
    /// (substring of the script, value returned)
    pub answers: Vec<(String, Value)>,
    pub fail_navigation: bool,
    pub missing_selector: bool,
    /// Navigation never completes
    pub hang_navigation: bool,
    /// Script evaluation never completes
    pub hang_evaluate: bool,
    pub opened: Arc<Mutex<u32>>,
    pub closed: Arc<Mutex<u32>>,
}

impl ScriptedBrowser {
    pub fn answering(mut self, fragment: &str, value: Value) -> Self {
        self.answers.push((fragment.to_string(), value));
        self
    }

    pub fn open_count(&self) -> u32 {
        *self.opened.lock().unwrap()
    }

    pub fn close_count(&self) -> u32 {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl BrowserAutomation for ScriptedBrowser {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        *self.opened.lock().unwrap() += 1;
        Ok(Box::new(ScriptedPage {
            browser: self.clone(),
            closed: false,
        }))
    }
}

struct ScriptedPage {
    browser: ScriptedBrowser,
    closed: bool,
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn navigate(
        &mut self,
        url: &str,
        _wait_until: WaitUntil,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        if self.browser.hang_navigation {
            std::future::pending::<()>().await;
        }
        if self.browser.fail_navigation {
            return Err(BrowserError::Navigation(url.to_string()));
        }
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<(), BrowserError> {
        if self.browser.missing_selector {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        if self.browser.hang_evaluate {
            std::future::pending::<()>().await;
        }
        Ok(self
            .browser
            .answers
            .iter()
            .find(|(fragment, _)| script.contains(fragment.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.closed {
            self.closed = true;
            *self.browser.closed.lock().unwrap() += 1;
        }
        Ok(())
    }
}
