use thiserror::Error;

use crate::store::StoreError;

/// Failures a redirect request can end in.
#[derive(Debug, Error)]
pub enum RedirectError {
    /// The `gameid` parameter was absent or not exactly six characters.
    #[error("invalid game identifier: expected 6 characters, got {}", describe_length(.length))]
    InvalidIdentifier { length: Option<usize> },

    /// The page/redirect store could not answer the lookup or record the miss.
    #[error("redirect store failure: {0}")]
    StoreFailure(#[from] StoreError),
}

impl RedirectError {
    pub fn is_invalid_identifier(&self) -> bool {
        matches!(self, Self::InvalidIdentifier { .. })
    }
}

fn describe_length(length: &Option<usize>) -> String {
    match length {
        Some(length) => length.to_string(),
        None => "no value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_identifier_message_reports_length() {
        let error = RedirectError::InvalidIdentifier { length: Some(5) };
        assert_eq!(
            error.to_string(),
            "invalid game identifier: expected 6 characters, got 5"
        );
        assert!(error.is_invalid_identifier());
    }

    #[test]
    fn invalid_identifier_message_reports_absent_value() {
        let error = RedirectError::InvalidIdentifier { length: None };
        assert!(error.to_string().ends_with("got no value"));
    }

    #[test]
    fn store_failure_wraps_store_error() {
        let error = RedirectError::from(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        assert!(!error.is_invalid_identifier());
        assert!(error.to_string().starts_with("redirect store failure:"));
    }
}
