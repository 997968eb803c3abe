//! Prefix-scoped collector for recoverable decoding problems.

use log::warn;

/// Accumulated warnings of one decoding run.
#[derive(Debug, Default, Clone)]
pub struct Warnings {
    entries: Vec<String>,
}

impl Warnings {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn add(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{msg}");
        self.entries.push(msg);
    }

    /// Collector that prefixes every message with `prefix`.
    pub fn scope(&mut self, prefix: impl Into<String>) -> Scope<'_> {
        Scope {
            target: self,
            prefix: prefix.into(),
        }
    }

    /// Recorded messages.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All messages, one per line. `None` when empty.
    pub fn into_text(self) -> Option<String> {
        (!self.entries.is_empty()).then(|| self.entries.join("\n"))
    }
}

/// Borrowed collector adding a path-like prefix.
pub struct Scope<'a> {
    target: &'a mut Warnings,
    prefix: String,
}

impl Scope<'_> {
    /// Record `prefix: msg`.
    pub fn add(&mut self, msg: impl AsRef<str>) {
        let full = format!("{}: {}", self.prefix, msg.as_ref());
        self.target.add(full);
    }

    /// Nested scope, prefixes joined with `/`.
    pub fn scope(&mut self, prefix: impl AsRef<str>) -> Scope<'_> {
        let prefix = format!("{}/{}", self.prefix, prefix.as_ref());
        Scope {
            target: &mut *self.target,
            prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_prefixes() {
        let mut warnings = Warnings::new();
        warnings.add("plain");
        {
            let mut pattern = warnings.scope("Pattern 2");
            pattern.add("line too long");
            pattern.scope("Channel 1").add("bad sample");
        }
        assert_eq!(
            warnings.entries(),
            &[
                "plain".to_string(),
                "Pattern 2: line too long".to_string(),
                "Pattern 2/Channel 1: bad sample".to_string(),
            ]
        );
        assert_eq!(
            warnings.into_text().as_deref(),
            Some("plain\nPattern 2: line too long\nPattern 2/Channel 1: bad sample")
        );
    }

    #[test]
    fn test_empty_has_no_text() {
        assert!(Warnings::new().into_text().is_none());
    }
}
