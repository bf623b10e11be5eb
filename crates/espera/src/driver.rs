//! Browser driver seam.
//!
//! Everything Espera knows about the live page comes through [`BrowserDriver`].
//! Every method is a point-in-time primitive: no method waits, retries, or
//! caches. Waiting lives in [`Poller`](crate::Poller); freshness lives in
//! [`ElementHandle`](crate::ElementHandle).
//!
//! Implementations report a failed lookup as [`EsperaError::NotFound`] and an
//! operation on a detached node as [`EsperaError::StaleReference`]. Any other
//! error is treated as fatal by the wait engine.
//!
//! [`EsperaError::NotFound`]: crate::EsperaError::NotFound
//! [`EsperaError::StaleReference`]: crate::EsperaError::StaleReference

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::locator::Selector;
use crate::result::EsperaResult;

/// Script used to poll the document ready state
pub const READY_STATE_SCRIPT: &str = "return document.readyState";

/// Ready state reported once the document has fully loaded
pub const READY_STATE_COMPLETE: &str = "complete";

/// Opaque driver-side reference to a DOM node.
///
/// Only valid for as long as the node stays attached. Never hold one across
/// calls; re-resolve through a [`Locator`](crate::Locator) instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawElement {
    /// Driver-assigned element id
    pub id: String,
}

impl RawElement {
    /// Wrap a driver element id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for RawElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Point-in-time browser primitives consumed by the wait engine.
///
/// `scope` narrows a search to the subtree of an already-resolved node; `None`
/// searches from the document root.
pub trait BrowserDriver: Send + Sync {
    /// First node matching `selector`, or `NotFound`
    fn find_element(
        &self,
        selector: &Selector,
        scope: Option<&RawElement>,
    ) -> EsperaResult<RawElement>;

    /// Every node currently matching `selector`, possibly empty
    fn find_elements(
        &self,
        selector: &Selector,
        scope: Option<&RawElement>,
    ) -> EsperaResult<Vec<RawElement>>;

    /// Attribute value, `None` when the attribute is absent
    fn attribute(&self, element: &RawElement, name: &str) -> EsperaResult<Option<String>>;

    /// Rendered text content
    fn text(&self, element: &RawElement) -> EsperaResult<String>;

    /// Whether the node is rendered and visible
    fn is_displayed(&self, element: &RawElement) -> EsperaResult<bool>;

    /// Whether the node accepts interaction
    fn is_enabled(&self, element: &RawElement) -> EsperaResult<bool>;

    /// Click the node
    fn click(&self, element: &RawElement) -> EsperaResult<()>;

    /// Type text into the node
    fn send_keys(&self, element: &RawElement, text: &str) -> EsperaResult<()>;

    /// Clear an editable node
    fn clear(&self, element: &RawElement) -> EsperaResult<()>;

    /// Scroll the node into the viewport
    fn scroll_into_view(&self, element: &RawElement) -> EsperaResult<()>;

    /// Run a script in the page and return its JSON result
    fn execute_script(&self, script: &str) -> EsperaResult<serde_json::Value>;
}
