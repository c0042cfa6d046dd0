use std::fmt;

/// Separator between the subdirectory and file name in a selection key.
pub const SELECTION_DELIMITER: &str = "__";

/// A file picked for a partial archive: `<subdirectory>__<filename>`.
///
/// An empty subdirectory names a file directly under the model, as in
/// `"__part.pdf"`. The key is split at the first delimiter, so file names
/// may themselves contain `__`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionKey {
    subdirectory: String,
    file_name: String,
}

impl SelectionKey {
    pub fn new(subdirectory: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            subdirectory: subdirectory.into(),
            file_name: file_name.into(),
        }
    }

    /// Parse a client key; `None` when the delimiter or file name is missing.
    pub fn parse(key: &str) -> Option<Self> {
        let (subdirectory, file_name) = key.split_once(SELECTION_DELIMITER)?;
        if file_name.is_empty() {
            return None;
        }
        Some(Self::new(subdirectory, file_name))
    }

    pub fn subdirectory(&self) -> &str {
        &self.subdirectory
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.subdirectory, SELECTION_DELIMITER, self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_root_key() {
        let key = SelectionKey::parse("__part.pdf").unwrap();
        assert_eq!(key.subdirectory(), "");
        assert_eq!(key.file_name(), "part.pdf");
        assert_eq!(key.to_string(), "__part.pdf");
    }

    #[test]
    fn test_parse_splits_at_first_delimiter() {
        let key = SelectionKey::parse("wiring__rear__lights.pdf").unwrap();
        assert_eq!(key.subdirectory(), "wiring");
        assert_eq!(key.file_name(), "rear__lights.pdf");
    }

    #[test]
    fn test_malformed_keys() {
        assert_eq!(SelectionKey::parse("manual.pdf"), None);
        assert_eq!(SelectionKey::parse("wiring__"), None);
        assert_eq!(SelectionKey::parse(""), None);
    }
}
