//! Self-waiting element handles
//!
//! An [`ElementHandle`] is bound to a [`Locator`], not to a DOM node. Every
//! query and interaction re-resolves the locator (parent chain first) inside a
//! [`Poller`](crate::Poller) loop, so callers never manage staleness or write
//! explicit waits before touching an element.
//!
//! Handles produced by a bulk resolution are the exception: they are bound to
//! the raw reference captured at snapshot time and cannot re-resolve. For
//! those a stale reference is fatal rather than retried.
//!
//! ```ignore
//! let save = ElementHandle::new(session, Locator::css("button#save"));
//! save.click()?;              // waits until visible and enabled
//! assert!(save.is_active()?); // exact `active` class token
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::dispatch::{Element, Resolver};
use crate::driver::{BrowserDriver, RawElement};
use crate::locator::Locator;
use crate::result::{EsperaError, EsperaResult};
use crate::session::WaitSession;

/// Class token marking an element as active
pub const ACTIVE_CLASS: &str = "active";

/// Attribute holding the class list
pub const CLASS_ATTRIBUTE: &str = "class";

/// Exact whitespace-separated token match against a raw `class` value.
///
/// `"btn btn-primary"` has `btn` but not `primary`; `"active-panel"` does not
/// have `active`.
#[must_use]
pub fn has_class_token(class_attribute: &str, token: &str) -> bool {
    let token = token.trim();
    !token.is_empty() && class_attribute.split_ascii_whitespace().any(|t| t == token)
}

/// What an [`ElementHandle`] re-resolves on each access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Re-resolved through the locator (and its parents) every time
    Located(Locator),
    /// Fixed reference captured by a bulk resolution
    Resolved(RawElement),
}

/// Lazy, self-waiting reference to an element
#[derive(Clone)]
pub struct ElementHandle {
    session: Arc<WaitSession>,
    binding: Binding,
    timeout: Option<Duration>,
    last_resolved: Arc<Mutex<Option<RawElement>>>,
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("session", &self.session.id())
            .field("binding", &self.binding)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Binding::Located(locator) => write!(f, "{locator}"),
            Binding::Resolved(raw) => write!(f, "element {raw}"),
        }
    }
}

impl ElementHandle {
    /// Handle that re-resolves `locator` on every access
    #[must_use]
    pub fn new(session: Arc<WaitSession>, locator: Locator) -> Self {
        Self::bound(session, Binding::Located(locator))
    }

    /// Handle fixed to an already-resolved node
    #[must_use]
    pub fn from_raw(session: Arc<WaitSession>, raw: RawElement) -> Self {
        Self::bound(session, Binding::Resolved(raw))
    }

    fn bound(session: Arc<WaitSession>, binding: Binding) -> Self {
        Self {
            session,
            binding,
            timeout: None,
            last_resolved: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the timeout for this handle's implicit waits
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective timeout for implicit waits
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.session.effective_timeout(self.timeout)
    }

    /// Owning session
    #[must_use]
    pub const fn session(&self) -> &Arc<WaitSession> {
        &self.session
    }

    /// What this handle resolves
    #[must_use]
    pub const fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Locator, if this handle is locator-bound
    #[must_use]
    pub const fn locator(&self) -> Option<&Locator> {
        match &self.binding {
            Binding::Located(locator) => Some(locator),
            Binding::Resolved(_) => None,
        }
    }

    /// Most recent successful resolution. Diagnostic only: never reused for
    /// driver calls.
    #[must_use]
    pub fn last_resolved(&self) -> Option<RawElement> {
        self.last_resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve once, without waiting.
    ///
    /// # Errors
    ///
    /// `NotFound` if any level of the chain matches nothing, `StaleReference`
    /// if a raw-bound node has been detached
    pub fn resolve_now(&self) -> EsperaResult<RawElement> {
        let raw = match &self.binding {
            Binding::Located(locator) => resolve_chain(self.session.driver(), locator)?,
            Binding::Resolved(raw) => {
                // surfaces detachment as StaleReference
                self.session.driver().is_displayed(raw)?;
                raw.clone()
            }
        };
        *self
            .last_resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(raw.clone());
        Ok(raw)
    }

    /// Resolve, waiting for presence up to this handle's timeout
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element is still missing at the handle's
    /// timeout; driver errors unchanged
    pub fn resolve(&self) -> EsperaResult<RawElement> {
        self.await_condition(&format!("presence of {self}"), self.timeout(), |_, raw| {
            Ok(Some(raw.clone()))
        })
    }

    /// Whether the element is present right now. Never waits.
    ///
    /// # Errors
    ///
    /// Driver failures other than `NotFound` and `StaleReference`
    pub fn is_present(&self) -> EsperaResult<bool> {
        match self.resolve_now() {
            Ok(_) => Ok(true),
            Err(err) if err.is_transient() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Poll `check` against a freshly resolved node until it yields a value.
    ///
    /// Resolution happens inside every attempt, so a node re-rendered between
    /// attempts is picked up transparently.
    pub(crate) fn await_condition<T, F>(
        &self,
        waited_for: &str,
        timeout: Duration,
        mut check: F,
    ) -> EsperaResult<T>
    where
        F: FnMut(&dyn BrowserDriver, &RawElement) -> EsperaResult<Option<T>>,
    {
        let driver = self.session.driver();
        self.session
            .poller(timeout)?
            .until_ignoring(
                waited_for,
                |err| self.absorbs(err),
                || {
                    let raw = self.resolve_now()?;
                    check(driver, &raw)
                },
            )
            .map(|outcome| outcome.value)
    }

    fn absorbs(&self, err: &EsperaError) -> bool {
        match self.binding {
            Binding::Located(_) => err.is_transient(),
            Binding::Resolved(_) => err.is_not_found(),
        }
    }

    fn query<T, F>(&self, what: &str, mut query: F) -> EsperaResult<T>
    where
        F: FnMut(&dyn BrowserDriver, &RawElement) -> EsperaResult<T>,
    {
        self.await_condition(&format!("{what} of {self}"), self.timeout(), |driver, raw| {
            query(driver, raw).map(Some)
        })
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Whether the element is displayed. Waits for presence.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element is still missing at the handle's
    /// timeout; driver errors unchanged
    pub fn is_displayed(&self) -> EsperaResult<bool> {
        self.query("visibility", |driver, raw| driver.is_displayed(raw))
    }

    /// Whether the element is enabled. Waits for presence.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element is still missing at the handle's
    /// timeout; driver errors unchanged
    pub fn is_enabled(&self) -> EsperaResult<bool> {
        self.query("enabled state", |driver, raw| driver.is_enabled(raw))
    }

    /// Attribute value. Waits for presence.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element is still missing at the handle's
    /// timeout; driver errors unchanged
    pub fn attribute(&self, name: &str) -> EsperaResult<Option<String>> {
        self.query(&format!("attribute {name:?}"), |driver, raw| {
            driver.attribute(raw, name)
        })
    }

    /// Rendered text. Waits for presence.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element is still missing at the handle's
    /// timeout; driver errors unchanged
    pub fn text(&self) -> EsperaResult<String> {
        self.query("text", |driver, raw| driver.text(raw))
    }

    /// Class tokens in attribute order
    ///
    /// # Errors
    ///
    /// Same as [`ElementHandle::attribute`]
    pub fn class_tokens(&self) -> EsperaResult<Vec<String>> {
        Ok(self
            .attribute(CLASS_ATTRIBUTE)?
            .unwrap_or_default()
            .split_ascii_whitespace()
            .map(ToString::to_string)
            .collect())
    }

    /// Exact class-token membership
    ///
    /// # Errors
    ///
    /// Same as [`ElementHandle::attribute`]
    pub fn has_class(&self, class_name: &str) -> EsperaResult<bool> {
        Ok(has_class_token(
            &self.attribute(CLASS_ATTRIBUTE)?.unwrap_or_default(),
            class_name,
        ))
    }

    /// Whether the element carries the `active` class token
    ///
    /// # Errors
    ///
    /// Same as [`ElementHandle::attribute`]
    pub fn is_active(&self) -> EsperaResult<bool> {
        self.has_class(ACTIVE_CLASS)
    }

    // =========================================================================
    // INTERACTIONS
    // =========================================================================

    /// Wait until displayed and return the fresh raw reference
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element is not displayed within the handle's
    /// timeout
    pub fn wait_until_visible(&self) -> EsperaResult<RawElement> {
        self.await_condition(&format!("{self} to be visible"), self.timeout(), |driver, raw| {
            Ok(driver.is_displayed(raw)?.then(|| raw.clone()))
        })
    }

    /// Scroll into view and click once visible and enabled
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element never becomes clickable; non-transient
    /// driver errors from the click itself
    pub fn click(&self) -> EsperaResult<()> {
        self.interact("click", |driver, raw| {
            driver.scroll_into_view(raw)?;
            driver.click(raw)
        })
    }

    /// Type `text` once visible and enabled
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element never accepts input
    pub fn send_keys(&self, text: &str) -> EsperaResult<()> {
        self.interact("typing into", |driver, raw| driver.send_keys(raw, text))
    }

    /// Clear once visible and enabled
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element never accepts input
    pub fn clear(&self) -> EsperaResult<()> {
        self.interact("clearing", |driver, raw| driver.clear(raw))
    }

    fn interact<F>(&self, what: &str, mut action: F) -> EsperaResult<()>
    where
        F: FnMut(&dyn BrowserDriver, &RawElement) -> EsperaResult<()>,
    {
        self.await_condition(&format!("{what} {self}"), self.timeout(), |driver, raw| {
            if !(driver.is_displayed(raw)? && driver.is_enabled(raw)?) {
                return Ok(None);
            }
            action(driver, raw).map(Some)
        })
    }

    /// Scroll the element into view and return its re-resolved reference.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if the element never settles into a displayed state
    /// within this handle's timeout
    pub fn scroll_into_view(&self) -> EsperaResult<RawElement> {
        self.await_condition(
            &format!("{self} to scroll into view"),
            self.timeout(),
            |driver, raw| {
                driver.scroll_into_view(raw)?;
                let settled = self.resolve_now()?;
                Ok(driver.is_displayed(&settled)?.then_some(settled))
            },
        )
    }

    // =========================================================================
    // CHILD LOOKUP
    // =========================================================================

    /// Lazily resolve a child of kind `E` scoped under this element
    ///
    /// # Errors
    ///
    /// Configuration error if `E` is unregistered or this handle is bound to a
    /// raw reference rather than a locator
    pub fn find<E: Element>(&self, child: Locator) -> EsperaResult<E> {
        self.resolver().resolve_one(self.scoped(child)?)
    }

    /// Eagerly resolve every child of kind `E` matching `child`
    ///
    /// # Errors
    ///
    /// Configuration error as for [`ElementHandle::find`], or
    /// `DeadlineExceeded` if this element never appears
    pub fn find_all<E: Element>(&self, child: Locator) -> EsperaResult<Vec<E>> {
        self.resolver().resolve_many(self.scoped(child)?)
    }

    fn resolver(&self) -> Resolver {
        Resolver::new(Arc::clone(&self.session))
    }

    fn scoped(&self, child: Locator) -> EsperaResult<Locator> {
        match &self.binding {
            Binding::Located(parent) => Ok(child.within(parent.clone())),
            Binding::Resolved(raw) => Err(EsperaError::configuration(format!(
                "cannot scope {child} under element {raw}: it has no locator"
            ))),
        }
    }
}

/// Resolve every level of `locator` root first, each inside the previous node
fn resolve_chain(driver: &dyn BrowserDriver, locator: &Locator) -> EsperaResult<RawElement> {
    let mut scope: Option<RawElement> = None;
    for level in locator.chain() {
        let found = driver
            .find_element(level, scope.as_ref())
            .map_err(|err| match err {
                EsperaError::NotFound { .. } => EsperaError::NotFound {
                    locator: locator.to_string(),
                },
                other => other,
            })?;
        tracing::trace!(level = %level, element = %found, "resolved locator level");
        scope = Some(found);
    }
    scope.ok_or_else(|| EsperaError::configuration(format!("locator {locator} has no levels")))
}
