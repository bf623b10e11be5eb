//! Locator descriptors: immutable descriptions of how to find an element.
//!
//! A [`Locator`] is a selector strategy plus selector text, optionally scoped
//! under a parent locator. Locators never touch the browser themselves; they
//! are handed to a [`BrowserDriver`](crate::BrowserDriver) one level at a time,
//! root first, each level searched inside the node the previous level found.
//!
//! Equality is structural: two locators are equal when strategy, value and the
//! whole parent chain are equal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::result::{EsperaError, EsperaResult};

/// How the selector text is interpreted by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// CSS selector (e.g., "button.primary")
    Css,
    /// XPath expression
    XPath,
    /// Single class name
    ClassName,
    /// `id` attribute
    Id,
    /// `name` attribute
    Name,
    /// Tag name
    TagName,
    /// Exact anchor text
    LinkText,
    /// Anchor text substring
    PartialLinkText,
}

impl Strategy {
    /// Short name used when rendering locators
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::XPath => "xpath",
            Self::ClassName => "class",
            Self::Id => "id",
            Self::Name => "name",
            Self::TagName => "tag",
            Self::LinkText => "link",
            Self::PartialLinkText => "partial-link",
        }
    }

    /// Strategies whose value must be a single token
    const fn is_single_token(self) -> bool {
        matches!(self, Self::ClassName | Self::Id | Self::TagName | Self::Name)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One level of a locator: strategy plus selector text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    /// Selector strategy
    pub strategy: Strategy,
    /// Selector text
    pub value: String,
}

impl Selector {
    /// Create a new selector
    #[must_use]
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    fn validate(&self) -> EsperaResult<()> {
        if self.value.trim().is_empty() {
            return Err(EsperaError::configuration(format!(
                "{} locator has an empty value",
                self.strategy
            )));
        }
        if self.strategy.is_single_token() && self.value.split_whitespace().count() > 1 {
            return Err(EsperaError::configuration(format!(
                "{} locator expects a single token, got {:?}",
                self.strategy, self.value
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// An immutable, optionally parent-scoped element locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    selector: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<Box<Locator>>,
}

impl Locator {
    /// Create a locator from a strategy and selector text
    #[must_use]
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            selector: Selector::new(strategy, value),
            parent: None,
        }
    }

    /// CSS selector locator. Preferred over XPath in almost every case.
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    /// XPath locator
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, expression)
    }

    /// `id` attribute locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Strategy::Id, id)
    }

    /// Class name locator
    #[must_use]
    pub fn class_name(class: impl Into<String>) -> Self {
        Self::new(Strategy::ClassName, class)
    }

    /// `name` attribute locator
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(Strategy::Name, name)
    }

    /// Tag name locator
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::new(Strategy::TagName, tag)
    }

    /// Scope this locator under `parent`.
    ///
    /// If this locator already has a parent, `parent` becomes the new root of
    /// the chain, so `a.within(b).within(c)` searches `c`, then `b`, then `a`.
    #[must_use]
    pub fn within(self, parent: Locator) -> Self {
        let parent = match self.parent {
            None => parent,
            Some(existing) => existing.within(parent),
        };
        Self {
            selector: self.selector,
            parent: Some(Box::new(parent)),
        }
    }

    /// The selector of this (leaf) level
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Strategy of the leaf level
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.selector.strategy
    }

    /// Selector text of the leaf level
    #[must_use]
    pub fn value(&self) -> &str {
        &self.selector.value
    }

    /// Parent scope, if any
    #[must_use]
    pub fn parent(&self) -> Option<&Locator> {
        self.parent.as_deref()
    }

    /// All levels, root first, leaf last
    #[must_use]
    pub fn chain(&self) -> Vec<&Selector> {
        let mut levels = Vec::with_capacity(self.depth());
        let mut current = Some(self);
        while let Some(locator) = current {
            levels.push(&locator.selector);
            current = locator.parent();
        }
        levels.reverse();
        levels
    }

    /// Number of levels in the chain
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.parent().map_or(0, Locator::depth)
    }

    /// Reject empty values and multi-token single-token strategies
    pub fn validate(&self) -> EsperaResult<()> {
        for level in self.chain() {
            level.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.chain().iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(" >> "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod selector_tests {
        use super::*;

        #[test]
        fn test_selector_display() {
            let selector = Selector::new(Strategy::Css, "button.primary");
            assert_eq!(selector.to_string(), "css=button.primary");
        }

        #[test]
        fn test_strategy_names() {
            assert_eq!(Strategy::XPath.as_str(), "xpath");
            assert_eq!(Strategy::ClassName.as_str(), "class");
            assert_eq!(Strategy::TagName.to_string(), "tag");
        }
    }

    mod locator_tests {
        use super::*;

        #[test]
        fn test_constructors() {
            assert_eq!(Locator::css("a").strategy(), Strategy::Css);
            assert_eq!(Locator::id("main").strategy(), Strategy::Id);
            assert_eq!(Locator::class_name("row").value(), "row");
            assert!(Locator::tag_name("li").parent().is_none());
        }

        #[test]
        fn test_within_builds_chain_root_first() {
            let locator = Locator::css("input")
                .within(Locator::css("form"))
                .within(Locator::id("page"));
            let chain: Vec<String> = locator.chain().iter().map(ToString::to_string).collect();
            assert_eq!(chain, vec!["id=page", "css=form", "css=input"]);
            assert_eq!(locator.depth(), 3);
            assert_eq!(locator.to_string(), "id=page >> css=form >> css=input");
        }

        #[test]
        fn test_structural_equality_includes_parent() {
            let a = Locator::css("li").within(Locator::id("menu"));
            let b = Locator::css("li").within(Locator::id("menu"));
            let c = Locator::css("li").within(Locator::id("footer"));
            assert_eq!(a, b);
            assert_ne!(a, c);
            assert_ne!(a, Locator::css("li"));
        }

        #[test]
        fn test_validate_rejects_blank_value() {
            let err = Locator::css("   ").validate().unwrap_err();
            assert!(matches!(err, EsperaError::Configuration { .. }));
        }

        #[test]
        fn test_validate_rejects_compound_class_name() {
            assert!(Locator::class_name("btn primary").validate().is_err());
            assert!(Locator::css("button.btn.primary").validate().is_ok());
        }

        #[test]
        fn test_validate_checks_parent_levels() {
            let locator = Locator::css("input").within(Locator::id(""));
            assert!(locator.validate().is_err());
        }

        #[test]
        fn test_yaml_roundtrip_keeps_parent() {
            let locator = Locator::name("email").within(Locator::css("form#signup"));
            let yaml = serde_yaml_ng::to_string(&locator).unwrap();
            let parsed: Locator = serde_yaml_ng::from_str(&yaml).unwrap();
            assert_eq!(parsed, locator);
        }
    }

    mod property_tests {
        use super::super::{Locator, Strategy as Kind};
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = Kind> {
            prop_oneof![
                Just(Kind::Css),
                Just(Kind::Id),
                Just(Kind::ClassName),
                Just(Kind::TagName),
            ]
        }

        proptest! {
            #[test]
            fn prop_equality_is_structural(
                k in kind(),
                value in "[a-z]{1,8}",
                parent in proptest::option::of("[a-z]{1,8}"),
            ) {
                let build = || {
                    let leaf = Locator::new(k, value.clone());
                    match &parent {
                        Some(p) => leaf.within(Locator::css(p.clone())),
                        None => leaf,
                    }
                };
                prop_assert_eq!(build(), build());
                prop_assert_eq!(build().depth(), 1 + usize::from(parent.is_some()));
            }
        }
    }
}
