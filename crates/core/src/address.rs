//! Bus addresses: non-empty, dotted-name, length-bounded strings.

use crate::error::CoreError;

/// Maximum byte length of an [`Address`].
pub const ADDRESS_MAX_LEN: usize = 255;

/// A validated bus address.
///
/// Construction is the single enforcement point for the address invariant:
/// every public operation that accepts a raw address string must go
/// through [`Address::parse`] before storing or comparing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Validate and wrap a raw address string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::InvalidAddress("address must not be empty".into()));
        }
        if raw.len() > ADDRESS_MAX_LEN {
            return Err(CoreError::InvalidAddress(format!(
                "address exceeds {ADDRESS_MAX_LEN} bytes ({} bytes)",
                raw.len()
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(matches!(Address::parse(""), Err(CoreError::InvalidAddress(_))));
    }

    #[test]
    fn accepts_exactly_255() {
        let raw = "a".repeat(255);
        assert!(Address::parse(raw).is_ok());
    }

    #[test]
    fn rejects_256() {
        let raw = "a".repeat(256);
        assert!(matches!(Address::parse(raw), Err(CoreError::InvalidAddress(_))));
    }

    #[test]
    fn accepts_dotted_name() {
        assert!(Address::parse("job.events.created").is_ok());
    }
}
