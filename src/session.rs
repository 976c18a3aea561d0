//! Session lifecycle: a session owns at most one page at a time and
//! mediates cross-navigation transfer.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::page::{Page, WaitOutcome};

/// Result of one `Session::wait` pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWaitOutcome {
    /// The page is idle and no navigation is queued.
    Done,
    /// Work remains on the current page.
    Pending,
    /// The session has no page (none created yet, or removed).
    NoPage,
}

/// Owns at most one [`Page`]. Queued navigations replace the page in place,
/// preserving the session's identity across the boundary.
pub struct Session {
    config: EngineConfig,
    next_page_id: u64,
    page: Option<Page>,
    queued_navigation: Option<String>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            next_page_id: 0,
            page: None,
            queued_navigation: None,
        }
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn page_mut(&mut self) -> Option<&mut Page> {
        self.page.as_mut()
    }

    /// Creates the session's page. Fails if one already exists — callers must
    /// `remove_page` or `replace_page` first.
    pub fn create_page(&mut self, url: impl Into<String>) -> Result<()> {
        if self.page.is_some() {
            return Err(Error::ProtocolViolation("a page already exists on this session".into()));
        }
        let id = self.next_page_id;
        self.next_page_id += 1;
        let page = Page::new(id, url, self.config.clone())?;
        log::info!("page {id} created");
        self.page = Some(page);
        Ok(())
    }

    /// Drops the current page, if any, first cancelling its outstanding
    /// network requests.
    pub fn remove_page(&mut self) {
        if let Some(mut page) = self.page.take() {
            page.abort_outstanding();
            log::info!("page {} removed", page.id());
        }
    }

    /// Tears down the current page and creates a fresh one at `url`,
    /// reusing the session's page id (transfer-safe navigation).
    pub fn replace_page(&mut self, url: impl Into<String>) -> Result<()> {
        let id = match self.page.take() {
            Some(mut old) => {
                old.abort_outstanding();
                old.id()
            }
            None => {
                let id = self.next_page_id;
                self.next_page_id += 1;
                id
            }
        };
        let page = Page::new(id, url, self.config.clone())?;
        log::info!("page {id} replaced via navigation");
        self.page = Some(page);
        Ok(())
    }

    /// Queues a navigation to be processed the next time `wait` observes the
    /// current page as `Done`, rather than interrupting in-flight work.
    pub fn queue_navigation(&mut self, url: impl Into<String>) {
        self.queued_navigation = Some(url.into());
    }

    /// Pumps the current page, then applies any queued navigation once it
    /// reports `Done`.
    pub fn wait(&mut self, timeout_ms: u64) -> Result<SessionWaitOutcome> {
        let Some(page) = self.page.as_mut() else {
            return Ok(SessionWaitOutcome::NoPage);
        };

        match page.wait(timeout_ms) {
            WaitOutcome::Pending => Ok(SessionWaitOutcome::Pending),
            WaitOutcome::Done => {
                if let Some(url) = self.queued_navigation.take() {
                    self.replace_page(url)?;
                    return self.wait(timeout_ms);
                }
                Ok(SessionWaitOutcome::Done)
            }
        }
    }
}
