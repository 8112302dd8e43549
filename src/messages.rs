//! Message lookup.
//!
//! A [`MessageSource`] is constructed explicitly and passed to whatever
//! renders user-facing text. Loading bundles from disk is left to the caller;
//! [`MessageCatalog`] only holds what it is given.

use std::collections::HashMap;

pub trait MessageSource: Send + Sync {
    /// Render the message for `code`, substituting `{0}`, `{1}`, ... with
    /// `args`. Unknown codes render the code itself.
    fn message(&self, code: &str, args: &[&str]) -> String;

    /// Lookup keyed by a numeric code, e.g. an HTTP status.
    fn status_message(&self, status: u16, args: &[&str]) -> String {
        self.message(&status.to_string(), args)
    }
}

/// In-memory, per-locale message catalog.
///
/// Resolution order for a locale tag such as `fr-CA`: `fr-CA`, then `fr`,
/// then the default locale, then the code itself.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    default_locale: String,
    bundles: HashMap<String, HashMap<String, String>>,
}

impl MessageCatalog {
    pub fn new<S: Into<String>>(default_locale: S) -> Self {
        Self {
            default_locale: default_locale.into(),
            bundles: HashMap::new(),
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn insert<L, C, T>(&mut self, locale: L, code: C, template: T)
    where
        L: Into<String>,
        C: Into<String>,
        T: Into<String>,
    {
        self.bundles
            .entry(locale.into())
            .or_default()
            .insert(code.into(), template.into());
    }

    pub fn with_message<L, C, T>(mut self, locale: L, code: C, template: T) -> Self
    where
        L: Into<String>,
        C: Into<String>,
        T: Into<String>,
    {
        self.insert(locale, code, template);
        self
    }

    pub fn extend<L, I, C, T>(&mut self, locale: L, messages: I)
    where
        L: Into<String>,
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: Into<String>,
    {
        let bundle = self.bundles.entry(locale.into()).or_default();
        for (code, template) in messages {
            bundle.insert(code.into(), template.into());
        }
    }

    /// Raw template for `code` in `locale`, following the fallback chain.
    pub fn resolve(&self, locale: &str, code: &str) -> Option<&str> {
        let language = locale.split(['-', '_']).next().unwrap_or(locale);
        [locale, language, self.default_locale.as_str()]
            .into_iter()
            .find_map(|l| self.bundles.get(l).and_then(|b| b.get(code)))
            .map(String::as_str)
    }

    pub fn message_in(&self, locale: &str, code: &str, args: &[&str]) -> String {
        let template = self.resolve(locale, code).unwrap_or(code);
        format_message(template, args)
    }
}

impl MessageSource for MessageCatalog {
    fn message(&self, code: &str, args: &[&str]) -> String {
        self.message_in(&self.default_locale, code, args)
    }
}

/// Replace `{n}` placeholders with `args[n]`. Placeholders without a matching
/// argument are left as written.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            let arg = args.get(index)?;
            Some((arg, close))
        });

        match substituted {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
