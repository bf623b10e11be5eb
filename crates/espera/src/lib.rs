//! Espera: self-waiting element handles for browser automation
//!
//! Espera (Spanish: "wait") removes explicit waits from UI test code. Elements
//! are addressed by immutable [`Locator`]s; every query or interaction on an
//! [`ElementHandle`] re-resolves its locator inside a [`Poller`] loop that
//! absorbs "not found yet" and "re-rendered" errors until a deadline passes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ESPERA Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Resolver + │    │ Element    │    │ Browser    │            │
//! │   │ Registry   │───►│ Handle     │───►│ Driver     │            │
//! │   │ (kinds)    │    │ (locator)  │    │ (trait)    │            │
//! │   └────────────┘    └─────┬──────┘    └────────────┘            │
//! │                           │                                      │
//! │                     ┌─────▼──────┐    ┌────────────┐            │
//! │                     │ Poller     │◄───│ Wait       │            │
//! │                     │ (deadline) │    │ Session    │            │
//! │                     └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use espera::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> EsperaResult<()> {
//! let dom = MockDom::new();
//! let form = dom.append(None, NodeSpec::new("form").id("login"));
//! dom.append(Some(&form), NodeSpec::new("input").name("user"));
//!
//! let session = WaitSession::new(Arc::new(dom.driver()), WaitSettings::default())?;
//! let resolver = Resolver::new(session);
//!
//! let user: TextInput = resolver.resolve_one(Locator::name("user").within(Locator::id("login")))?;
//! user.clear_and_send_keys("ada")?;
//! assert_eq!(user.value()?.as_deref(), Some("ada"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod config;
mod dispatch;
mod driver;
mod element;
mod elements;
mod locator;
/// In-memory browser used by tests and examples
pub mod mock;
mod result;
mod session;
mod wait;

pub use config::{WaitSettings, ENV_POLL_INTERVAL_MS, ENV_TIMEOUT_SECS};
pub use dispatch::{AnyElement, Constructor, Element, ElementRegistry, Resolver};
pub use driver::{BrowserDriver, RawElement, READY_STATE_COMPLETE, READY_STATE_SCRIPT};
pub use element::{has_class_token, Binding, ElementHandle, ACTIVE_CLASS, CLASS_ATTRIBUTE};
pub use elements::{Button, DropDown, GenericElement, TextInput};
pub use locator::{Locator, Selector, Strategy};
pub use result::{EsperaError, EsperaResult};
pub use session::WaitSession;
pub use wait::{
    wait_until, Poller, Truthy, WaitOutcome, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_SECS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::*;
    pub use super::dispatch::*;
    pub use super::driver::*;
    pub use super::element::*;
    pub use super::elements::*;
    pub use super::locator::*;
    pub use super::mock::{MockDom, MockDriver, NodeSpec};
    pub use super::result::*;
    pub use super::session::*;
    pub use super::wait::*;
}
