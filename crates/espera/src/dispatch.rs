//! Element kind dispatch
//!
//! Maps element-kind tags to constructors so that a caller can ask for "a
//! `DropDown` at this locator" and get a ready, lazy typed handle back. The
//! kind set is open: any type implementing [`Element`] can be registered on an
//! [`ElementRegistry`] without touching the resolver.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::RawElement;
use crate::element::ElementHandle;
use crate::elements::{Button, DropDown, GenericElement, TextInput};
use crate::locator::Locator;
use crate::result::{EsperaError, EsperaResult};
use crate::session::WaitSession;

/// A typed element kind built on an [`ElementHandle`]
pub trait Element: Send + Sync + Sized + 'static {
    /// Registry tag for this kind
    const KIND: &'static str;

    /// Wrap a handle
    fn from_handle(handle: ElementHandle) -> Self;

    /// The underlying handle
    fn handle(&self) -> &ElementHandle;
}

/// Type-erased element kind
pub trait AnyElement: Send + Sync {
    /// Registry tag
    fn kind(&self) -> &'static str;

    /// The underlying handle
    fn element_handle(&self) -> &ElementHandle;

    /// Erase to `Any` for downcasting to the concrete kind
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<E: Element> AnyElement for E {
    fn kind(&self) -> &'static str {
        E::KIND
    }

    fn element_handle(&self) -> &ElementHandle {
        Element::handle(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl fmt::Debug for dyn AnyElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyElement")
            .field("kind", &self.kind())
            .field("handle", self.element_handle())
            .finish()
    }
}

/// Constructor registered for one element kind
pub type Constructor = Arc<dyn Fn(ElementHandle) -> Box<dyn AnyElement> + Send + Sync>;

/// Registry of element kinds
#[derive(Clone, Default)]
pub struct ElementRegistry {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ElementRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the kinds shipped in [`crate::elements`]
    #[must_use]
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry
            .register::<GenericElement>()
            .register::<Button>()
            .register::<TextInput>()
            .register::<DropDown>();
        registry
    }

    /// Register `E` under [`Element::KIND`]
    pub fn register<E: Element>(&mut self) -> &mut Self {
        self.register_with(E::KIND, |handle| {
            Box::new(E::from_handle(handle)) as Box<dyn AnyElement>
        })
    }

    /// Register a custom constructor under `kind`, replacing any previous one
    pub fn register_with<F>(&mut self, kind: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(ElementHandle) -> Box<dyn AnyElement> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let replaced = self
            .constructors
            .insert(kind.clone(), Arc::new(constructor))
            .is_some();
        tracing::debug!(kind = %kind, replaced, "element kind registered");
        self
    }

    /// Whether `kind` has a constructor
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Number of registered kinds
    #[must_use]
    pub fn count(&self) -> usize {
        self.constructors.len()
    }

    /// Build a `kind` element around `handle`
    ///
    /// # Errors
    ///
    /// Configuration error if `kind` is not registered
    pub fn construct(&self, kind: &str, handle: ElementHandle) -> EsperaResult<Box<dyn AnyElement>> {
        Ok(self.constructor(kind)?(handle))
    }

    fn constructor(&self, kind: &str) -> EsperaResult<&Constructor> {
        self.constructors.get(kind).ok_or_else(|| {
            EsperaError::configuration(format!(
                "element kind {kind:?} is not registered (known: {})",
                self.kinds().join(", ")
            ))
        })
    }
}

/// Resolves locators into typed elements for one session
#[derive(Debug, Clone)]
pub struct Resolver {
    session: Arc<WaitSession>,
}

impl Resolver {
    /// Resolver over the session's registry
    #[must_use]
    pub const fn new(session: Arc<WaitSession>) -> Self {
        Self { session }
    }

    /// Lazy typed handle; nothing is looked up until first use
    ///
    /// # Errors
    ///
    /// Configuration error for an unregistered kind or malformed locator
    pub fn resolve_one<E: Element>(&self, locator: Locator) -> EsperaResult<E> {
        downcast(self.resolve_one_kind(E::KIND, locator)?)
    }

    /// Lazy handle of a kind chosen at runtime
    ///
    /// # Errors
    ///
    /// Configuration error for an unregistered kind or malformed locator
    pub fn resolve_one_kind(&self, kind: &str, locator: Locator) -> EsperaResult<Box<dyn AnyElement>> {
        locator.validate()?;
        let constructor = self.session.registry().constructor(kind)?;
        Ok(constructor(ElementHandle::new(Arc::clone(&self.session), locator)))
    }

    /// Every current match, as typed handles bound to this snapshot.
    ///
    /// Returns an empty list when nothing matches. A parent scope is waited
    /// for like any implicit wait.
    ///
    /// # Errors
    ///
    /// Configuration error for an unregistered kind or malformed locator;
    /// `DeadlineExceeded` if a parent scope never appears
    pub fn resolve_many<E: Element>(&self, locator: Locator) -> EsperaResult<Vec<E>> {
        self.resolve_many_kind(E::KIND, &locator)?
            .into_iter()
            .map(downcast)
            .collect()
    }

    /// Snapshot resolution for a kind chosen at runtime
    ///
    /// # Errors
    ///
    /// Same as [`Resolver::resolve_many`]
    pub fn resolve_many_kind(
        &self,
        kind: &str,
        locator: &Locator,
    ) -> EsperaResult<Vec<Box<dyn AnyElement>>> {
        locator.validate()?;
        let constructor = self.session.registry().constructor(kind)?;
        let matches = self.snapshot(locator)?;
        tracing::debug!(
            session = %self.session.id(),
            kind,
            locator = %locator,
            count = matches.len(),
            "resolved element snapshot"
        );
        Ok(matches
            .into_iter()
            .map(|raw| constructor(ElementHandle::from_raw(Arc::clone(&self.session), raw)))
            .collect())
    }

    fn snapshot(&self, locator: &Locator) -> EsperaResult<Vec<RawElement>> {
        let Some(parent) = locator.parent() else {
            return self.session.driver().find_elements(locator.selector(), None);
        };
        let scope = ElementHandle::new(Arc::clone(&self.session), parent.clone());
        scope.await_condition(
            &format!("children {locator}"),
            scope.timeout(),
            |driver, raw| driver.find_elements(locator.selector(), Some(raw)).map(Some),
        )
    }
}

fn downcast<E: Element>(element: Box<dyn AnyElement>) -> EsperaResult<E> {
    let kind = element.kind();
    element.into_any().downcast::<E>().map(|e| *e).map_err(|_| {
        EsperaError::configuration(format!(
            "element kind {kind:?} is registered with a type other than {}",
            std::any::type_name::<E>()
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::WaitSettings;
    use crate::mock::{MockDom, NodeSpec};
    use std::time::Duration;

    fn session(dom: &MockDom, registry: ElementRegistry) -> Arc<WaitSession> {
        let settings = WaitSettings::new()
            .with_timeout_secs(1)
            .with_poll_interval_ms(20);
        WaitSession::with_registry(Arc::new(dom.driver()), settings, registry).unwrap()
    }

    /// A kind defined outside the built-in set
    #[derive(Debug)]
    struct Badge {
        handle: ElementHandle,
    }

    impl Element for Badge {
        const KIND: &'static str = "badge";

        fn from_handle(handle: ElementHandle) -> Self {
            Self { handle }
        }

        fn handle(&self) -> &ElementHandle {
            &self.handle
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_builtin_kinds() {
            let registry = ElementRegistry::with_builtin_kinds();
            assert_eq!(
                registry.kinds(),
                vec!["button", "dropdown", "element", "text_input"]
            );
            assert_eq!(registry.count(), 4);
        }

        #[test]
        fn test_register_custom_kind() {
            let mut registry = ElementRegistry::with_builtin_kinds();
            registry.register::<Badge>();
            assert!(registry.contains("badge"));
        }

        #[test]
        fn test_unregistered_kind_is_configuration_error() {
            let dom = MockDom::new();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let err = resolver.resolve_one::<Badge>(Locator::id("x")).unwrap_err();
            assert!(matches!(err, EsperaError::Configuration { .. }));
            assert!(err.to_string().contains("badge"));
        }

        #[test]
        fn test_mismatched_constructor_is_configuration_error() {
            let mut registry = ElementRegistry::new();
            registry.register_with("badge", |handle| {
                Box::new(GenericElement::from_handle(handle)) as Box<dyn AnyElement>
            });
            let resolver = Resolver::new(session(&MockDom::new(), registry));
            let err = resolver.resolve_one::<Badge>(Locator::id("x")).unwrap_err();
            assert!(matches!(err, EsperaError::Configuration { .. }));
        }
    }

    mod resolve_one_tests {
        use super::*;

        #[test]
        fn test_resolve_one_is_lazy() {
            let dom = MockDom::new();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let badge_registry = {
                let mut r = ElementRegistry::with_builtin_kinds();
                r.register::<Badge>();
                r
            };
            let badges = Resolver::new(session(&dom, badge_registry));

            let button: Button = resolver.resolve_one(Locator::id("later")).unwrap();
            let badge: Badge = badges.resolve_one(Locator::css(".badge")).unwrap();
            assert!(dom.history().is_empty());

            dom.append(None, NodeSpec::new("button").id("later"));
            assert!(button.is_present().unwrap());
            assert!(!badge.handle().is_present().unwrap());
        }

        #[test]
        fn test_resolve_one_kind_dynamic() {
            let dom = MockDom::new();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let element = resolver
                .resolve_one_kind("dropdown", Locator::tag_name("select"))
                .unwrap();
            assert_eq!(element.kind(), "dropdown");
            assert!(element.into_any().downcast::<DropDown>().is_ok());
        }

        #[test]
        fn test_malformed_locator_rejected() {
            let dom = MockDom::new();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let err = resolver
                .resolve_one::<GenericElement>(Locator::css(""))
                .unwrap_err();
            assert!(matches!(err, EsperaError::Configuration { .. }));
        }
    }

    mod resolve_many_tests {
        use super::*;

        #[test]
        fn test_empty_when_nothing_matches() {
            let dom = MockDom::new();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let rows: Vec<GenericElement> = resolver.resolve_many(Locator::css("tr")).unwrap();
            assert!(rows.is_empty());
        }

        #[test]
        fn test_snapshot_survives_later_removal() {
            let dom = MockDom::new();
            let list = dom.append(None, NodeSpec::new("ul").id("items"));
            let raws: Vec<_> = ["a", "b", "c"]
                .iter()
                .map(|t| dom.append(Some(&list), NodeSpec::new("li").text(*t)))
                .collect();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));

            let items: Vec<GenericElement> = resolver
                .resolve_many(Locator::tag_name("li").within(Locator::id("items")))
                .unwrap();
            assert_eq!(items.len(), 3);

            dom.remove(&raws[1]);
            assert_eq!(items.len(), 3);
            assert_eq!(items[0].text().unwrap(), "a");
            assert!(matches!(
                items[1].text().unwrap_err(),
                EsperaError::StaleReference { .. }
            ));
            assert_eq!(items[2].text().unwrap(), "c");
        }

        #[test]
        fn test_parent_scope_waits_then_fails() {
            let dom = MockDom::new();
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let scoped = Locator::tag_name("li").within(Locator::id("missing"));
            let handle_timeout = Duration::from_secs(1);
            let start = std::time::Instant::now();
            let err = resolver.resolve_many::<GenericElement>(scoped).unwrap_err();
            assert!(err.is_deadline_exceeded());
            assert!(start.elapsed() >= handle_timeout);
        }

        #[test]
        fn test_dynamic_kind_snapshot() {
            let dom = MockDom::new();
            dom.append(None, NodeSpec::new("input").name("q"));
            dom.append(None, NodeSpec::new("input").name("r"));
            let resolver = Resolver::new(session(&dom, ElementRegistry::with_builtin_kinds()));
            let inputs = resolver
                .resolve_many_kind("text_input", &Locator::tag_name("input"))
                .unwrap();
            assert_eq!(inputs.len(), 2);
            assert!(inputs.iter().all(|i| i.kind() == "text_input"));
            assert!(inputs[0].element_handle().locator().is_none());
        }
    }
}
