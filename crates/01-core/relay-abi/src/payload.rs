//! Move-only marshalled request buffers.
//!
//! An [`OwnedPayload`] has exactly one owner at any time. Its release function
//! runs when the payload is released or dropped, whichever comes first, so a
//! buffer cannot be freed twice and cannot be leaked without its release
//! observer noticing.

use std::fmt;

use zeroize::Zeroize;

/// Summary handed to a release function once the buffer is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Released {
    /// Length of the freed buffer in bytes.
    pub len: usize,
    /// Whether the contents were zeroed before the memory was returned.
    pub erased: bool,
}

/// One-shot callback fired when an [`OwnedPayload`] is freed.
pub type ReleaseFn = Box<dyn FnOnce(Released) + Send>;

/// Exclusively owned request buffer with a one-shot release.
pub struct OwnedPayload {
    bytes: Vec<u8>,
    secure_erase: bool,
    release: Option<ReleaseFn>,
}

impl OwnedPayload {
    /// Wraps marshalled bytes. When `secure_erase` is set the contents are
    /// zeroed before the allocation is returned.
    pub fn new(bytes: Vec<u8>, secure_erase: bool) -> Self {
        Self {
            bytes,
            secure_erase,
            release: None,
        }
    }

    /// Attaches the release function, replacing any previous one.
    pub fn with_release(mut self, release: ReleaseFn) -> Self {
        self.release = Some(release);
        self
    }

    /// Read-only view of the marshalled bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Frees the buffer now, firing the release function.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for OwnedPayload {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.bytes);
        let len = bytes.len();
        if self.secure_erase {
            bytes.zeroize();
        }
        drop(bytes);
        if let Some(release) = self.release.take() {
            release(Released {
                len,
                erased: self.secure_erase,
            });
        }
    }
}

impl fmt::Debug for OwnedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedPayload")
            .field("len", &self.bytes.len())
            .field("secure_erase", &self.secure_erase)
            .field("release_attached", &self.release.is_some())
            .finish()
    }
}
