//! One authenticated browser session working through the pending queue.
//!
//! The workflow is an explicit state machine. [`PostingSession::step`] performs
//! exactly one transition, so the flow can be driven and inspected state by
//! state against a fake [`Browser`].

use super::compose::compose_reply;
use super::queue::PendingQueue;
use crate::browser::{scroll_and_click, Browser, BrowserError};
use crate::config::Config;
use crate::snapshot::Snapshots;
use crate::util::truncate_chars;
use secrecy::ExposeSecret;
use thiserror::Error;

/// Form fields and CSS selectors of the site's login and journal editor.
pub mod selectors {
    /// Present on both the login page and the logged-in landing page.
    pub const LANDING: &str = "#content #firehose";
    pub const USER_MENU_TITLE: &str = ".user-menu-title";
    pub const PREVIEW_BUTTON: &str = "input#edit-preview-button";
    pub const SAVE_BUTTON: &str = "input#edit-edit-save";
    pub const SAVED_MODAL: &str = "span.modal_ok";

    pub const FIELD_NICKNAME: &str = "unickname";
    pub const FIELD_PASSWORD: &str = "upasswd";
    pub const FIELD_LOGIN_TEMP: &str = "login_temp";
    pub const FIELD_LOGIN_SUBMIT: &str = "userlogin";
    pub const FIELD_TITLE: &str = "title";
    pub const FIELD_BODY: &str = "introtext";
    pub const FIELD_TAGS: &str = "tag-entry-input";
}

use selectors::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingLoginPage,
    LoginForm,
    Authenticated,
    /// Editor loaded for the queue head.
    ComposerLoaded,
    FilledForm,
    PreviewRendered,
    /// Save acknowledged (or skipped in dry-run); the head is dequeued next.
    Confirmed,
    Done,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// A wait or navigation ran out of time. The proxy is abandoned and the
    /// queue is retried through the next one.
    #[error("Session timed out: {0}")]
    Timeout(#[source] BrowserError),
    /// The login page had a title matching neither known layout.
    #[error("Unknown page: {0}")]
    UnknownPage(String),
    #[error(transparent)]
    Browser(BrowserError),
}

impl SessionError {
    /// Retryable errors move on to the next proxy; anything else ends the run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Timeout(_))
    }
}

impl From<BrowserError> for SessionError {
    fn from(e: BrowserError) -> Self {
        if e.is_transient() {
            SessionError::Timeout(e)
        } else {
            SessionError::Browser(e)
        }
    }
}

/// Which page the login URL landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPage {
    LoginForm,
    AlreadyAuthenticated,
}

/// `ログイン…` is the login form; `…のページ` is a logged-in user page.
pub fn classify_title(title: &str) -> Option<LoginPage> {
    if title.starts_with("ログイン") {
        Some(LoginPage::LoginForm)
    } else if title.contains("のページ") {
        Some(LoginPage::AlreadyAuthenticated)
    } else {
        None
    }
}

pub struct PostingSession<'a, B: Browser + ?Sized> {
    browser: &'a B,
    config: &'a Config,
    snapshots: &'a Snapshots,
}

impl<'a, B: Browser + ?Sized> PostingSession<'a, B> {
    pub fn new(browser: &'a B, config: &'a Config, snapshots: &'a Snapshots) -> Self {
        Self {
            browser,
            config,
            snapshots,
        }
    }

    /// Log in and post until the queue is empty.
    ///
    /// On error the unconfirmed head stays queued.
    pub async fn run(&self, queue: &mut PendingQueue) -> Result<(), SessionError> {
        let mut state = SessionState::AwaitingLoginPage;
        while state != SessionState::Done {
            state = self.step(state, queue).await?;
        }
        Ok(())
    }

    /// Perform the transition out of `state`.
    pub async fn step(
        &self,
        state: SessionState,
        queue: &mut PendingQueue,
    ) -> Result<SessionState, SessionError> {
        let browser = self.browser;
        let timeout = self.config.render_timeout;

        match state {
            SessionState::AwaitingLoginPage => {
                tracing::info!("Opening login page");
                browser.goto(&self.config.login_url()).await?;
                browser.wait_present(LANDING, timeout).await?;

                let title = browser.title().await?;
                tracing::info!(title = %title, "Login page loaded");
                self.snapshots.screenshot(browser, "my-login-page").await;

                match classify_title(&title) {
                    Some(LoginPage::LoginForm) => Ok(SessionState::LoginForm),
                    Some(LoginPage::AlreadyAuthenticated) => {
                        tracing::info!("Already logged in");
                        self.snapshots.screenshot(browser, "after-login").await;
                        Ok(SessionState::Authenticated)
                    }
                    None => Err(SessionError::UnknownPage(title)),
                }
            }

            SessionState::LoginForm => {
                tracing::info!(user = %self.config.user_id, "Logging in");
                browser.fill(FIELD_NICKNAME, &self.config.user_id).await?;
                browser
                    .fill(FIELD_PASSWORD, self.config.password.expose_secret())
                    .await?;
                if self.config.login_temporarily {
                    browser.click_named(FIELD_LOGIN_TEMP).await?;
                }
                self.snapshots.screenshot(browser, "before-login").await;

                browser.click_named(FIELD_LOGIN_SUBMIT).await?;
                browser
                    .wait_text(USER_MENU_TITLE, &self.config.user_id, timeout)
                    .await?;

                let title = browser.title().await?;
                tracing::info!(title = %title, "Logged in");
                self.snapshots.screenshot(browser, "after-login").await;
                Ok(SessionState::Authenticated)
            }

            SessionState::Authenticated => {
                if queue.is_empty() {
                    return Ok(SessionState::Done);
                }
                tracing::info!(post = queue.confirmed(), "Opening journal editor");
                browser.goto(&self.config.composer_url()).await?;
                browser.wait_clickable(PREVIEW_BUTTON, timeout).await?;
                Ok(SessionState::ComposerLoaded)
            }

            SessionState::ComposerLoaded => {
                let Some(item) = queue.head() else {
                    return Ok(SessionState::Done);
                };
                let n = queue.confirmed();
                self.snapshots
                    .screenshot(browser, &format!("journal-posting-{n:03}-before-input"))
                    .await;

                let reply = compose_reply(item, &self.config.target_id, self.config.quote_length);
                tracing::info!(
                    post = n,
                    title = %item.title,
                    body = %truncate_chars(&reply.body, 60),
                    "Filling journal form"
                );

                browser.clear(FIELD_TITLE).await?;
                browser.fill(FIELD_TITLE, &reply.title).await?;
                browser.fill(FIELD_BODY, &reply.body).await?;
                browser.fill(FIELD_TAGS, &reply.tags).await?;

                self.snapshots
                    .screenshot(browser, &format!("journal-posting-{n:03}-after-input"))
                    .await;
                Ok(SessionState::FilledForm)
            }

            SessionState::FilledForm => {
                tracing::info!(post = queue.confirmed(), "Previewing");
                scroll_and_click(browser, PREVIEW_BUTTON).await?;
                // The first click does not always register; the site tolerates a second.
                browser.click_css(PREVIEW_BUTTON).await?;
                browser.wait_clickable(SAVE_BUTTON, timeout).await?;
                Ok(SessionState::PreviewRendered)
            }

            SessionState::PreviewRendered => {
                let n = queue.confirmed();
                self.snapshots
                    .screenshot(browser, &format!("journal-posting-{n:03}-previewing"))
                    .await;

                let interval = self.config.post_interval;
                if !interval.is_zero() && n > 0 {
                    tracing::info!(secs = interval.as_secs_f64(), "Waiting before next post");
                    tokio::time::sleep(interval).await;
                }

                if self.config.dry_run {
                    tracing::info!(post = n, "Dry run, not saving");
                } else {
                    tracing::info!(post = n, "Posting");
                    scroll_and_click(browser, SAVE_BUTTON).await?;
                    browser.wait_present(SAVED_MODAL, timeout).await?;
                }
                Ok(SessionState::Confirmed)
            }

            SessionState::Confirmed => {
                let n = queue.confirmed();
                self.snapshots
                    .screenshot(browser, &format!("journal-posting-{n:03}-after-posting"))
                    .await;
                if let Some(item) = queue.confirm_head() {
                    tracing::info!(post = n, title = %item.title, link = %item.link, "Posted");
                }
                Ok(SessionState::Authenticated)
            }

            SessionState::Done => Ok(SessionState::Done),
        }
    }
}
