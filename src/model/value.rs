//! Opaque value references.

use std::fmt;
use std::sync::Arc;

/// Reference to a stored value.
///
/// The engine threads these through jobs without interpreting them;
/// dereferencing and storage belong to an external reference service. Two
/// conventions are layered on top of the opaque identifier:
///
/// - `error:` scheme references minted by [`ValueRef::error_document`] stand
///   in for values that failed to be produced;
/// - the loop layer treats a reference rendering the literal `true` as a
///   boolean true condition output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueRef(Arc<str>);

impl ValueRef {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Mint a reference to an error document describing `message`.
    pub fn error_document(message: &str) -> Self {
        Self(Arc::from(format!("error:{message}")))
    }

    /// True if this reference points at an error document.
    pub fn is_error_document(&self) -> bool {
        self.0.starts_with("error:")
    }

    /// Loop-condition convention: the reference renders the literal `true`.
    pub fn is_literal_true(&self) -> bool {
        &*self.0 == "true"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_document() {
        let v = ValueRef::error_document("boom");
        assert!(v.is_error_document());
        assert_eq!(v.as_str(), "error:boom");
        assert!(!ValueRef::new("ref-1").is_error_document());
    }

    #[test]
    fn test_literal_true() {
        assert!(ValueRef::new("true").is_literal_true());
        assert!(!ValueRef::new("false").is_literal_true());
        assert!(!ValueRef::new("TRUE").is_literal_true());
    }
}
