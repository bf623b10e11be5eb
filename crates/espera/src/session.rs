//! Wait sessions
//!
//! A [`WaitSession`] is the per-browser-session arena for the wait engine. It
//! owns the driver, the session's [`WaitSettings`], the element-kind registry,
//! and a cache of [`Poller`]s keyed by exact timeout value. Entries are built
//! lazily on first use, reused thereafter, and dropped with the session.
//!
//! One-shot timeouts are call-scoped: every explicit wait takes an
//! `Option<Duration>` override and never mutates the session default, so
//! concurrent waits with different overrides cannot race.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::config::WaitSettings;
use crate::dispatch::ElementRegistry;
use crate::driver::{BrowserDriver, RawElement, READY_STATE_COMPLETE};
use crate::element::{has_class_token, ElementHandle, CLASS_ATTRIBUTE};
use crate::result::EsperaResult;
use crate::wait::{Poller, Truthy};

/// Session-scoped wait engine state
pub struct WaitSession {
    id: Uuid,
    driver: Arc<dyn BrowserDriver>,
    settings: WaitSettings,
    registry: ElementRegistry,
    pollers: Mutex<HashMap<Duration, Poller>>,
}

impl fmt::Debug for WaitSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSession")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl WaitSession {
    /// Create a session with the built-in element kinds registered
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `settings` fail validation
    pub fn new(driver: Arc<dyn BrowserDriver>, settings: WaitSettings) -> EsperaResult<Arc<Self>> {
        Self::with_registry(driver, settings, ElementRegistry::with_builtin_kinds())
    }

    /// Create a session with a caller-supplied element registry
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `settings` fail validation
    pub fn with_registry(
        driver: Arc<dyn BrowserDriver>,
        settings: WaitSettings,
        registry: ElementRegistry,
    ) -> EsperaResult<Arc<Self>> {
        settings.validate()?;
        let session = Self {
            id: Uuid::new_v4(),
            driver,
            settings,
            registry,
            pollers: Mutex::new(HashMap::new()),
        };
        tracing::debug!(
            session = %session.id,
            default_timeout_secs = session.settings.default_timeout_secs,
            poll_interval_ms = session.settings.poll_interval_ms,
            "wait session created"
        );
        Ok(Arc::new(session))
    }

    /// Unique id, recorded in log fields
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The browser driver this session polls
    #[must_use]
    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    /// Session settings
    #[must_use]
    pub const fn settings(&self) -> &WaitSettings {
        &self.settings
    }

    /// Registered element kinds
    #[must_use]
    pub const fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    /// Timeout used when a call supplies no override
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.settings.default_timeout()
    }

    /// The override if present, else the session default
    #[must_use]
    pub fn effective_timeout(&self, temp_timeout: Option<Duration>) -> Duration {
        temp_timeout.unwrap_or_else(|| self.default_timeout())
    }

    /// Poller for `timeout`, created on first use and reused thereafter
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero timeout
    pub fn poller(&self, timeout: Duration) -> EsperaResult<Poller> {
        let mut pollers = self.pollers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(poller) = pollers.get(&timeout) {
            return Ok(*poller);
        }
        let poller = self.settings.poller(timeout)?;
        pollers.insert(timeout, poller);
        tracing::debug!(
            session = %self.id,
            timeout_ms = timeout.as_millis() as u64,
            cached = pollers.len(),
            "poller created"
        );
        Ok(poller)
    }

    /// Number of distinct timeouts with a cached poller
    #[must_use]
    pub fn cached_poller_count(&self) -> usize {
        self.pollers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Poll a named condition with an optional one-shot timeout
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout, or any non-transient predicate error
    pub fn wait_for<R, F>(
        &self,
        waited_for: &str,
        temp_timeout: Option<Duration>,
        predicate: F,
    ) -> EsperaResult<R::Output>
    where
        R: Truthy,
        F: FnMut() -> EsperaResult<R>,
    {
        self.poller(self.effective_timeout(temp_timeout))?
            .until(waited_for, predicate)
    }

    /// Poll an arbitrary predicate until it returns a truthy value.
    ///
    /// ```ignore
    /// session.wait_for_custom_condition(|| Ok(banner.is_present()?), None)?;
    /// ```
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout, or any non-transient predicate error
    pub fn wait_for_custom_condition<R, F>(
        &self,
        predicate: F,
        temp_timeout: Option<Duration>,
    ) -> EsperaResult<R::Output>
    where
        R: Truthy,
        F: FnMut() -> EsperaResult<R>,
    {
        self.wait_for("custom condition", temp_timeout, predicate)
    }

    /// Wait until the element's text contains `text`
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout; driver errors other than `NotFound` and
    /// `StaleReference` unchanged
    pub fn wait_for_text_to_contain(
        &self,
        element: &ElementHandle,
        text: &str,
        temp_timeout: Option<Duration>,
    ) -> EsperaResult<bool> {
        element.await_condition(
            &format!("text of {element} to contain {text:?}"),
            self.effective_timeout(temp_timeout),
            |driver, raw| Ok(driver.text(raw)?.contains(text).then_some(true)),
        )
    }

    /// Wait until the element is enabled
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout; driver errors other than `NotFound` and
    /// `StaleReference` unchanged
    pub fn wait_until_element_is_enabled(
        &self,
        element: &ElementHandle,
        temp_timeout: Option<Duration>,
    ) -> EsperaResult<bool> {
        element.await_condition(
            &format!("{element} to be enabled"),
            self.effective_timeout(temp_timeout),
            |driver, raw| Ok(driver.is_enabled(raw)?.then_some(true)),
        )
    }

    /// Wait until `class_name` is one of the element's class tokens
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout; driver errors other than `NotFound` and
    /// `StaleReference` unchanged
    pub fn wait_for_element_to_have_class(
        &self,
        element: &ElementHandle,
        class_name: &str,
        temp_timeout: Option<Duration>,
    ) -> EsperaResult<bool> {
        element.await_condition(
            &format!("{element} to have class {class_name:?}"),
            self.effective_timeout(temp_timeout),
            |driver, raw| {
                let classes = driver.attribute(raw, CLASS_ATTRIBUTE)?.unwrap_or_default();
                Ok(has_class_token(&classes, class_name).then_some(true))
            },
        )
    }

    /// Wait until `class_name` is not one of the element's class tokens
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout; driver errors other than `NotFound` and
    /// `StaleReference` unchanged
    pub fn wait_for_element_to_not_have_class(
        &self,
        element: &ElementHandle,
        class_name: &str,
        temp_timeout: Option<Duration>,
    ) -> EsperaResult<bool> {
        element.await_condition(
            &format!("{element} to not have class {class_name:?}"),
            self.effective_timeout(temp_timeout),
            |driver, raw| {
                let classes = driver.attribute(raw, CLASS_ATTRIBUTE)?.unwrap_or_default();
                Ok((!has_class_token(&classes, class_name)).then_some(true))
            },
        )
    }

    /// Wait until the document ready state is `complete`
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout, or a driver error from the script
    pub fn wait_until_page_is_loaded(&self, temp_timeout: Option<Duration>) -> EsperaResult<bool> {
        let script = self.settings.ready_state_script.as_str();
        self.wait_for("document ready state to be complete", temp_timeout, || {
            let state = self.driver.execute_script(script)?;
            Ok(matches!(&state, Value::String(s) if s == READY_STATE_COMPLETE))
        })
    }

    /// Wait until the element is displayed and return its fresh raw reference
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` on timeout; driver errors other than `NotFound` and
    /// `StaleReference` unchanged
    pub fn wait_until_displayed(
        &self,
        element: &ElementHandle,
        temp_timeout: Option<Duration>,
    ) -> EsperaResult<RawElement> {
        element.await_condition(
            &format!("{element} to be displayed"),
            self.effective_timeout(temp_timeout),
            |driver, raw| Ok(driver.is_displayed(raw)?.then(|| raw.clone())),
        )
    }
}
