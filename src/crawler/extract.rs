//! HTML documents and selector-driven extraction
//!
//! Extraction is partial-failure tolerant: an invalid selector or failing
//! callback is logged and recorded as `null`, and the remaining selectors
//! still run. One bad selector must not void the rest of the extraction.

use crate::error::{CrawlError, ErrorKind};
use crate::Result;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A parsed HTML document
///
/// Not `Send`: parse and extract between suspension points rather than
/// holding a document across an await.
#[derive(Debug)]
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses markup into a queryable document
    pub fn parse(markup: &str) -> Result<Self> {
        if markup.trim().is_empty() {
            return Err(CrawlError::new(ErrorKind::Parse, "cannot parse empty markup"));
        }
        Ok(Self {
            html: Html::parse_document(markup),
        })
    }

    /// Returns all elements matching a CSS selector
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'_>>> {
        let selector = Selector::parse(selector).map_err(|_| {
            CrawlError::new(
                ErrorKind::Validation,
                format!("invalid selector '{}'", selector),
            )
        })?;
        Ok(self
            .html
            .select(&selector)
            .map(|inner| Element { inner })
            .collect())
    }
}

/// A handle to one matched element
#[derive(Debug)]
pub struct Element<'a> {
    inner: ElementRef<'a>,
}

impl Element<'_> {
    /// Concatenated text content, trimmed
    pub fn text(&self) -> String {
        self.inner.text().collect::<String>().trim().to_string()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.inner.value().attr(name)
    }

    pub fn html(&self) -> String {
        self.inner.html()
    }
}

/// One named extraction rule: a CSS selector or a callback over the document
#[derive(Clone)]
pub enum SelectorSpec {
    Css(String),
    Fn(Arc<dyn Fn(&Document) -> Result<Value> + Send + Sync>),
}

impl SelectorSpec {
    pub fn css(selector: impl Into<String>) -> Self {
        SelectorSpec::Css(selector.into())
    }

    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&Document) -> Result<Value> + Send + Sync + 'static,
    {
        SelectorSpec::Fn(Arc::new(callback))
    }
}

impl fmt::Debug for SelectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorSpec::Css(selector) => f.debug_tuple("Css").field(selector).finish(),
            SelectorSpec::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

/// Applies each named selector to the document.
///
/// Zero matches yield `null`, one match yields its trimmed text, several
/// matches yield an array of trimmed texts. Per-selector failures are
/// logged and recorded as `null` without aborting the other selectors.
pub fn extract(document: &Document, selectors: &BTreeMap<String, SelectorSpec>) -> Value {
    let mut out = serde_json::Map::new();

    for (name, spec) in selectors {
        let value = match spec {
            SelectorSpec::Css(css) => match Selector::parse(css) {
                Ok(selector) => {
                    let mut texts: Vec<String> = document
                        .html
                        .select(&selector)
                        .map(|el| el.text().collect::<String>().trim().to_string())
                        .collect();

                    match texts.len() {
                        0 => Value::Null,
                        1 => Value::String(texts.remove(0)),
                        _ => Value::Array(texts.into_iter().map(Value::String).collect()),
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        field = %name,
                        selector = %css,
                        "invalid selector, recording null"
                    );
                    Value::Null
                }
            },
            SelectorSpec::Fn(callback) => match callback(document) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        field = %name,
                        error = %err,
                        "selector callback failed, recording null"
                    );
                    Value::Null
                }
            },
        };

        out.insert(name.clone(), value);
    }

    Value::Object(out)
}
