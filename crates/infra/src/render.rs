//! Message rendering.
//!
//! Templates use `{{ key }}` placeholders. The known keys are `name`, `quote`,
//! `author` and `date`; any other placeholder is left untouched. Values are
//! HTML-escaped in the HTML body and inserted verbatim in the plain-text body.

use std::path::Path;

use mindfuel_core::{Content, Recipient};

use crate::config::ConfigError;

const BUILTIN_HTML: &str = include_str!("../templates/email.html");
const BUILTIN_TEXT: &str = include_str!("../templates/email_plain.txt");

pub const HTML_TEMPLATE_FILE: &str = "email.html";
pub const TEXT_TEMPLATE_FILE: &str = "email_plain.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub html: String,
    pub text: String,
}

/// Pure rendering function over a recipient and the day's content.
pub trait Renderer: Send + Sync {
    fn render(&self, recipient: &Recipient, content: &Content) -> RenderedMessage;
}

#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    html: String,
    text: String,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRenderer {
    pub fn builtin() -> Self {
        Self::new(BUILTIN_HTML, BUILTIN_TEXT)
    }

    pub fn new(html: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            text: text.into(),
        }
    }

    /// Load `email.html` and `email_plain.txt` from `dir`.
    ///
    /// A missing or unreadable file is a configuration error.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| ConfigError::Template {
                path,
                reason: e.to_string(),
            })
        };
        Ok(Self::new(read(HTML_TEMPLATE_FILE)?, read(TEXT_TEMPLATE_FILE)?))
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, recipient: &Recipient, content: &Content) -> RenderedMessage {
        let date = content.date.format("%A, %B %-d, %Y").to_string();
        let name = display_name(recipient);
        let lookup = |key: &str| match key {
            "name" => Some(name),
            "quote" => Some(content.body.as_str()),
            "author" => Some(content.attribution.as_str()),
            "date" => Some(date.as_str()),
            _ => None,
        };

        RenderedMessage {
            html: substitute(&self.html, &lookup, escape_html),
            text: substitute(&self.text, &lookup, |s| s.to_string()),
        }
    }
}

fn display_name(recipient: &Recipient) -> &str {
    let name = recipient.name.trim();
    if name.is_empty() { "friend" } else { name }
}

fn substitute<'a>(
    template: &str,
    lookup: &impl Fn(&str) -> Option<&'a str>,
    encode: impl Fn(&str) -> String,
) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after_open[..close].trim();
        match lookup(key) {
            Some(value) => out.push_str(&encode(value)),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
