use std::fmt;

use tracing::error;

/// One recoverable failure of an item inside a larger batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Input the item came from (file path, URL or wordlist name).
    pub source: String,
    /// Identifier of the failing item, such as an API id or `api[3]`.
    pub item: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: String::new(),
            item: item.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "[{}] {}", self.item, self.message)
        } else {
            write!(f, "{} [{}] {}", self.source, self.item, self.message)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticSet {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Logs every diagnostic under `source` and keeps it.
    pub fn record(&mut self, source: &str, diagnostics: Vec<Diagnostic>) {
        for mut d in diagnostics {
            if d.source.is_empty() {
                d.source = source.to_string();
            }
            error!(source = %d.source, id = %d.item, "{}", d.message);
            self.entries.push(d);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn extend(&mut self, other: DiagnosticSet) {
        self.entries.extend(other.entries);
    }
}

/// The result of a batch operation that completed, possibly with some items
/// failing. A whole-operation failure is an `Err` instead.
#[derive(Clone, Debug)]
pub struct Partial<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Partial<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    pub fn new(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }

    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U> {
        Partial {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tags_untagged_diagnostics_with_source() {
        let mut set = DiagnosticSet::new();
        set.record(
            "petstore.yaml",
            vec![
                Diagnostic::new("pets", "bad operation"),
                Diagnostic {
                    source: "nested.kite".to_string(),
                    item: "users".to_string(),
                    message: "bad".to_string(),
                },
            ],
        );
        let items: Vec<_> = set.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(items, vec!["petstore.yaml", "nested.kite"]);
        assert_eq!(
            set.iter().next().unwrap().to_string(),
            "petstore.yaml [pets] bad operation"
        );
    }

    #[test]
    fn partial_map_keeps_diagnostics() {
        let p = Partial::new(vec![1, 2], vec![Diagnostic::new("x", "y")]);
        let p = p.map(|v| v.len());
        assert_eq!(p.value, 2);
        assert!(!p.is_complete());
    }
}
