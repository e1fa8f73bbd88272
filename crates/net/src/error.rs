//! Wire codec failures.

use mdcomponents_core::ComponentCodecError;
use thiserror::Error;

/// Errors raised while reading or writing patches on the wire.
#[derive(Debug, Error)]
pub enum WireError {
    /// A value codec failed, or a key is missing from the registry.
    #[error(transparent)]
    Codec(#[from] ComponentCodecError),
    /// A network id does not resolve to a registered component.
    #[error("no component with network id {0}")]
    UnknownNetworkId(u32),
    /// A varint in the header or key stream is malformed or cut short.
    #[error("malformed varint: {0}")]
    Varint(#[source] postcard::Error),
    /// A length-prefixed value claims more bytes than remain.
    #[error("value payload of {needed} bytes exceeds the {available} bytes remaining")]
    Truncated {
        /// Declared payload length.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },
    /// A length-prefixed value was not fully consumed by its codec.
    #[error("value for {component} left {unread} bytes unread")]
    PayloadLength {
        /// Component whose payload was mis-sized.
        component: String,
        /// Bytes the codec did not consume.
        unread: usize,
    },
    /// A whole-buffer decode finished before the end of the input.
    #[error("{0} trailing bytes after component patch")]
    TrailingBytes(usize),
}
