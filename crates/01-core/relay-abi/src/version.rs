use serde::{Deserialize, Serialize};
use std::fmt;

/// Negotiated interface revision of a bound client.
///
/// Ordering is by `(major, minor)`, so a higher revision always compares
/// greater and selection can use plain `<=` comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major revision.
    pub major: u8,
    /// Minor revision.
    pub minor: u8,
}

impl ProtocolVersion {
    /// Revision 1.0.
    pub const V1_0: Self = Self::new(1, 0);
    /// Revision 1.1.
    pub const V1_1: Self = Self::new(1, 1);
    /// Revision 1.2.
    pub const V1_2: Self = Self::new(1, 2);
    /// Revision 1.3.
    pub const V1_3: Self = Self::new(1, 3);
    /// Revision 1.4.
    pub const V1_4: Self = Self::new(1, 4);
    /// Revision 1.5.
    pub const V1_5: Self = Self::new(1, 5);
    /// Revision 1.6.
    pub const V1_6: Self = Self::new(1, 6);

    /// Creates a version from its components.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
