//! Scripted browser fake shared by the integration tests.
//!
//! Every session started by [`FakeLauncher`] appends what it did to a shared
//! [`Record`], so a test can assert on launches, saves and quits across proxies.

#![allow(dead_code)]

use async_trait::async_trait;
use journal_relay::browser::{Browser, BrowserError, BrowserLauncher};
use journal_relay::posting::selectors;
use journal_relay::proxy::ProxyEndpoint;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LOGIN_TITLE: &str = "ログイン | スラド";
pub const LOGGED_IN_TITLE: &str = "posterのページ | スラド";

/// How one browser session behaves.
#[derive(Debug, Clone)]
pub struct Script {
    /// Returned by every `title()` call.
    pub title: String,
    pub page_source: String,
    /// The first `n` navigations fail.
    pub goto_failures: usize,
    /// Waiting on this selector for the given (1-based) time times out.
    pub timeout_on: Option<(&'static str, usize)>,
    /// Teardown reports a driver error.
    pub quit_fails: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            title: LOGIN_TITLE.to_string(),
            page_source: String::new(),
            goto_failures: 0,
            timeout_on: None,
            quit_fails: false,
        }
    }
}

impl Script {
    pub fn listing(html: impl Into<String>) -> Self {
        Self {
            page_source: html.into(),
            ..Self::default()
        }
    }

    pub fn timing_out_on(selector: &'static str, occurrence: usize) -> Self {
        Self {
            timeout_on: Some((selector, occurrence)),
            ..Self::default()
        }
    }
}

/// Everything every session did.
#[derive(Debug, Default)]
pub struct Record {
    /// Proxy of each launch in order; `None` for direct sessions.
    pub launches: Vec<Option<String>>,
    pub gotos: Vec<String>,
    /// Titles filled into the editor.
    pub filled_titles: Vec<String>,
    /// Bodies filled into the editor.
    pub filled_bodies: Vec<String>,
    /// Titles of the posts the save button was clicked for.
    pub saved_titles: Vec<String>,
    pub preview_clicks: usize,
    pub logins: usize,
    pub quits: usize,
}

pub struct FakeBrowser {
    script: Script,
    record: Arc<Mutex<Record>>,
    gotos: Mutex<usize>,
    waits: Mutex<HashMap<String, usize>>,
    current_title: Mutex<Option<String>>,
}

impl FakeBrowser {
    fn new(script: Script, record: Arc<Mutex<Record>>) -> Self {
        Self {
            script,
            record,
            gotos: Mutex::new(0),
            waits: Mutex::new(HashMap::new()),
            current_title: Mutex::new(None),
        }
    }

    fn wait(&self, css: &str, timeout: Duration) -> Result<(), BrowserError> {
        let mut waits = self.waits.lock().unwrap();
        let seen = waits.entry(css.to_string()).or_insert(0);
        *seen += 1;
        match self.script.timeout_on {
            Some((selector, occurrence)) if selector == css && occurrence == *seen => {
                Err(BrowserError::Timeout {
                    condition: css.to_string(),
                    timeout,
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut gotos = self.gotos.lock().unwrap();
        *gotos += 1;
        self.record.lock().unwrap().gotos.push(url.to_string());
        if *gotos <= self.script.goto_failures {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.script.title.clone())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.script.page_source.clone())
    }

    async fn wait_present(&self, css: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.wait(css, timeout)
    }

    async fn wait_clickable(&self, css: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.wait(css, timeout)
    }

    async fn wait_text(
        &self,
        css: &str,
        _text: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.wait(css, timeout)
    }

    async fn fill(&self, name: &str, text: &str) -> Result<(), BrowserError> {
        let mut record = self.record.lock().unwrap();
        match name {
            selectors::FIELD_TITLE => {
                record.filled_titles.push(text.to_string());
                *self.current_title.lock().unwrap() = Some(text.to_string());
            }
            selectors::FIELD_BODY => record.filled_bodies.push(text.to_string()),
            _ => {}
        }
        Ok(())
    }

    async fn clear(&self, _name: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn click_named(&self, name: &str) -> Result<(), BrowserError> {
        if name == selectors::FIELD_LOGIN_SUBMIT {
            self.record.lock().unwrap().logins += 1;
        }
        Ok(())
    }

    async fn click_css(&self, css: &str) -> Result<(), BrowserError> {
        let mut record = self.record.lock().unwrap();
        match css {
            selectors::PREVIEW_BUTTON => record.preview_clicks += 1,
            selectors::SAVE_BUTTON => {
                let title = self.current_title.lock().unwrap().clone().unwrap_or_default();
                record.saved_titles.push(title);
            }
            _ => {}
        }
        Ok(())
    }

    async fn scroll_into_view(&self, _css: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        self.record.lock().unwrap().quits += 1;
        if self.script.quit_fails {
            return Err(BrowserError::Driver("session already gone".to_string()));
        }
        Ok(())
    }
}

/// Hands out scripted sessions: `listing` for direct launches, then the queued
/// `sessions` for proxied ones, then `fallback`.
pub struct FakeLauncher {
    pub record: Arc<Mutex<Record>>,
    listing: Script,
    sessions: Mutex<VecDeque<Script>>,
    fallback: Script,
}

impl FakeLauncher {
    pub fn new(listing: Script) -> Self {
        Self {
            record: Arc::new(Mutex::new(Record::default())),
            listing,
            sessions: Mutex::new(VecDeque::new()),
            fallback: Script::default(),
        }
    }

    /// Only proxied posting sessions are expected.
    pub fn posting() -> Self {
        Self::new(Script::default())
    }

    pub fn with_sessions(self, sessions: impl IntoIterator<Item = Script>) -> Self {
        self.sessions.lock().unwrap().extend(sessions);
        self
    }

    pub fn with_fallback(mut self, fallback: Script) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeBrowser;

    async fn launch(&self, proxy: Option<&ProxyEndpoint>) -> Result<FakeBrowser, BrowserError> {
        self.record
            .lock()
            .unwrap()
            .launches
            .push(proxy.map(|p| p.as_str().to_string()));

        let script = match proxy {
            None => self.listing.clone(),
            Some(_) => self
                .sessions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()),
        };
        Ok(FakeBrowser::new(script, Arc::clone(&self.record)))
    }
}

/// A proxy listing page with `proxies` as links, best first.
pub fn listing_html(proxies: &[String]) -> String {
    let links: String = proxies
        .iter()
        .map(|p| format!("<li><a href=\"#\">{p}</a></li>"))
        .collect();
    format!(
        r#"<html><body><ol style="list-style-type: none;">{links}</ol></body></html>"#
    )
}
