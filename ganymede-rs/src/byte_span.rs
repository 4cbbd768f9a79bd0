//! Provides an immutable view on a cached value.
//!
//! Values handed out by a [Group](crate::group::Group) are always wrapped in a [ByteSpan]. The span
//! owns its bytes (internally a **bytes::Bytes** which is reference counted but can never be
//! modified). Therefore a caller can keep a value around as long as it likes, without being able
//! to alter the state of the cache it was fetched from.
//!
//! # Examples
//! ```
//! # use ganymede::byte_span::ByteSpan;
//! let mut source = b"630".to_vec();
//! let span = ByteSpan::copy_from(&source);
//!
//! // Modifying the source doesn't affect the span, as it owns a private copy...
//! source[0] = b'7';
//! assert_eq!(span.to_text(), "630");
//! assert_eq!(span.len(), 3);
//! assert_eq!(span.to_vec(), b"630".to_vec());
//! ```
use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::lru::ByteSize;

/// Represents an immutable sequence of bytes.
///
/// Cloning a span is cheap as the underlying buffer is shared. As nobody is able to mutate the
/// buffer, sharing it is safe.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash)]
pub struct ByteSpan {
    data: Bytes,
}

impl ByteSpan {
    /// Creates a new span by copying the given bytes.
    pub fn copy_from(data: &[u8]) -> Self {
        ByteSpan {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the number of bytes in this span.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the underlying bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Returns a copy of the underlying bytes as string.
    ///
    /// Invalid UTF-8 sequences are replaced by the unicode replacement character.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Provides read-only access to the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns a shared handle to the underlying buffer.
    ///
    /// This is used to hand the value to the transport layer without copying it once more.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

impl From<Vec<u8>> for ByteSpan {
    fn from(data: Vec<u8>) -> Self {
        ByteSpan {
            data: Bytes::from(data),
        }
    }
}

impl From<Bytes> for ByteSpan {
    fn from(data: Bytes) -> Self {
        ByteSpan { data }
    }
}

impl ByteSize for ByteSpan {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

impl Display for ByteSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use crate::byte_span::ByteSpan;
    use crate::lru::ByteSize;
    use bytes::Bytes;

    #[test]
    fn spans_are_detached_from_their_source() {
        let mut source = vec![1u8, 2, 3];
        let span = ByteSpan::copy_from(&source);
        source[0] = 42;

        assert_eq!(span.as_slice(), &[1, 2, 3]);

        // Handing out a copy doesn't permit to change the span either...
        let mut copy = span.to_vec();
        copy[1] = 42;
        assert_eq!(span.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn size_and_text_are_reported() {
        let span = ByteSpan::from(Bytes::from_static(b"Hello"));
        assert_eq!(span.len(), 5);
        assert_eq!(span.allocated_size(), 5);
        assert_eq!(span.to_text(), "Hello");
        assert_eq!(format!("{}", span), "Hello");

        let empty = ByteSpan::default();
        assert!(empty.is_empty());
        assert_eq!(empty.to_text(), "");
    }
}
