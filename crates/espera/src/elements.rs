//! Built-in element kinds
//!
//! Each kind wraps an [`ElementHandle`] and derefs to it, so every self-waiting
//! query and interaction is available on every kind. Kinds add the operations
//! specific to their widget.

use std::ops::Deref;

use crate::dispatch::Element;
use crate::driver::{BrowserDriver, RawElement};
use crate::element::ElementHandle;
use crate::locator::{Selector, Strategy};
use crate::result::EsperaResult;

macro_rules! element_kind {
    ($(#[$meta:meta])* $name:ident => $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            handle: ElementHandle,
        }

        impl Element for $name {
            const KIND: &'static str = $kind;

            fn from_handle(handle: ElementHandle) -> Self {
                Self { handle }
            }

            fn handle(&self) -> &ElementHandle {
                &self.handle
            }
        }

        impl Deref for $name {
            type Target = ElementHandle;

            fn deref(&self) -> &ElementHandle {
                &self.handle
            }
        }
    };
}

element_kind! {
    /// Any element, with only the base handle operations
    GenericElement => "element"
}

element_kind! {
    /// A clickable button
    Button => "button"
}

element_kind! {
    /// A text field
    TextInput => "text_input"
}

element_kind! {
    /// A `<select>` drop-down
    DropDown => "dropdown"
}

impl Button {
    /// Button label
    pub fn label(&self) -> EsperaResult<String> {
        Ok(self.text()?.trim().to_string())
    }
}

impl TextInput {
    /// Current `value` attribute
    pub fn value(&self) -> EsperaResult<Option<String>> {
        self.attribute("value")
    }

    /// Clear, then type `text` unless it is empty. Whitespace-only text is
    /// typed.
    pub fn clear_and_send_keys(&self, text: &str) -> EsperaResult<()> {
        self.clear()?;
        if text.is_empty() {
            return Ok(());
        }
        self.send_keys(text)
    }
}

const OPTION_TAG: &str = "option";

fn option_selector() -> Selector {
    Selector::new(Strategy::TagName, OPTION_TAG)
}

impl DropDown {
    /// Text of every option, in document order
    pub fn options_text(&self) -> EsperaResult<Vec<String>> {
        self.handle.await_condition(
            &format!("options of {}", self.handle),
            self.handle.timeout(),
            |driver, select| {
                driver
                    .find_elements(&option_selector(), Some(select))?
                    .iter()
                    .map(|option| driver.text(option))
                    .collect::<EsperaResult<Vec<_>>>()
                    .map(Some)
            },
        )
    }

    /// Text of the selected option, if any
    pub fn selected_text(&self) -> EsperaResult<Option<String>> {
        self.handle.await_condition(
            &format!("selection of {}", self.handle),
            self.handle.timeout(),
            |driver, select| {
                for option in driver.find_elements(&option_selector(), Some(select))? {
                    if driver.attribute(&option, "selected")?.is_some() {
                        return Ok(Some(Some(driver.text(&option)?)));
                    }
                }
                Ok(Some(None))
            },
        )
    }

    /// Select the option at `index`, waiting for it to exist
    pub fn select_by_index(&self, index: usize) -> EsperaResult<()> {
        self.select(&format!("option #{index}"), |_, options| {
            Ok(options.get(index).cloned())
        })
    }

    /// Select the option whose `value` attribute equals `value`
    pub fn select_by_value(&self, value: &str) -> EsperaResult<()> {
        self.select(&format!("option with value {value:?}"), |driver, options| {
            for option in options {
                if driver.attribute(option, "value")?.as_deref() == Some(value) {
                    return Ok(Some(option.clone()));
                }
            }
            Ok(None)
        })
    }

    /// Select the option whose trimmed text equals `text` exactly.
    ///
    /// Blank text selects nothing and returns immediately.
    ///
    /// # Errors
    ///
    /// `DeadlineExceeded` if no option with that text shows up in time
    pub fn select_by_visible_text(&self, text: &str) -> EsperaResult<()> {
        if text.trim().is_empty() {
            tracing::debug!(dropdown = %self.handle, "blank option text, nothing selected");
            return Ok(());
        }
        self.select(&format!("option {text:?}"), |driver, options| {
            for option in options {
                if driver.text(option)?.trim() == text {
                    return Ok(Some(option.clone()));
                }
            }
            Ok(None)
        })
    }

    fn select<F>(&self, what: &str, mut pick: F) -> EsperaResult<()>
    where
        F: FnMut(&dyn BrowserDriver, &[RawElement]) -> EsperaResult<Option<RawElement>>,
    {
        self.handle.await_condition(
            &format!("{what} in {}", self.handle),
            self.handle.timeout(),
            |driver, select| {
                if !(driver.is_displayed(select)? && driver.is_enabled(select)?) {
                    return Ok(None);
                }
                let options = driver.find_elements(&option_selector(), Some(select))?;
                let Some(option) = pick(driver, &options)? else {
                    return Ok(None);
                };
                driver.click(&option)?;
                Ok(Some(()))
            },
        )
    }
}
