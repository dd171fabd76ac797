//! Shared outbound message buffers.

use crate::codec::CodecError;
use bytes::Bytes;
use std::fmt;

/// One encoded message, ready to be written to any number of connections.
///
/// Backed by [`Bytes`], so cloning bumps an atomic reference count instead of
/// copying the payload. The contents are always valid UTF-8 and are sent as a
/// WebSocket text frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Package {
    bytes: Bytes,
}

impl Package {
    /// Wrap an owned string.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            bytes: Bytes::from(text.into()),
        }
    }

    /// Wrap a received buffer after checking it is UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidUtf8`] if the payload is not valid UTF-8.
    pub fn from_utf8(bytes: Bytes) -> Result<Self, CodecError> {
        std::str::from_utf8(&bytes)?;
        Ok(Self { bytes })
    }

    /// Raw payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `other` points at the same underlying buffer.
    #[must_use]
    pub fn shares_buffer_with(&self, other: &Package) -> bool {
        self.bytes.as_ptr() == other.bytes.as_ptr() && self.len() == other.len()
    }
}

impl From<Package> for Bytes {
    fn from(package: Package) -> Self {
        package.bytes
    }
}

// Payloads can carry player chat; keep them out of logs.
impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_buffer() {
        let package = Package::from_text(r#"{"type":"move","x":1}"#);
        let copy = package.clone();

        assert!(package.shares_buffer_with(&copy));
        assert_eq!(package, copy);
    }

    #[test]
    fn test_separately_built_packages_do_not_share() {
        let a = Package::from_text("hello");
        let b = Package::from_text("hello");

        assert_eq!(a, b);
        assert!(!a.shares_buffer_with(&b));
    }

    #[test]
    fn test_from_utf8_rejects_invalid_payload() {
        let result = Package::from_utf8(Bytes::from_static(&[0xff, 0xfe, 0x00]));
        assert!(matches!(result, Err(CodecError::InvalidUtf8(_))));

        let ok = Package::from_utf8(Bytes::from_static(b"{}")).unwrap();
        assert_eq!(ok.as_bytes(), b"{}");
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn test_debug_hides_payload() {
        let package = Package::from_text("secret chat");
        let debug = format!("{package:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("len"));
    }
}
