use pending_registry::LaneConfig;
use relay_codec::MarshalOptions;
use serde::{Deserialize, Serialize};

/// Named options that distinguish one response surface from another.
///
/// Every surface runs the same dispatcher; the differences between them live
/// here and nowhere else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Label used in logs.
    pub name: String,
    /// Zero request buffers before they are freed.
    pub secure_erase: bool,
    /// Live requests allowed per transport before registration reports
    /// exhaustion.
    pub max_in_flight: usize,
    /// Abandoned tickets remembered per transport.
    pub max_abandoned: usize,
    /// Largest marshalled payload accepted.
    pub max_payload_bytes: usize,
    /// Longest string argument accepted.
    pub max_string_len: usize,
    /// Forward indications to the bound client.
    pub indications_enabled: bool,
}

impl SurfaceConfig {
    /// Primary surface used by ordinary clients.
    pub fn base() -> Self {
        Self {
            name: "base".to_owned(),
            secure_erase: false,
            max_in_flight: 512,
            max_abandoned: 1024,
            max_payload_bytes: 64 * 1024,
            max_string_len: 4096,
            indications_enabled: true,
        }
    }

    /// Extension surface. Carries credentials, so buffers are erased.
    pub fn extended() -> Self {
        Self {
            name: "extended".to_owned(),
            secure_erase: true,
            max_in_flight: 1024,
            max_payload_bytes: 256 * 1024,
            max_string_len: 8192,
            ..Self::base()
        }
    }

    /// Diagnostic surface: small limits, no unsolicited traffic.
    pub fn diagnostic() -> Self {
        Self {
            name: "diagnostic".to_owned(),
            max_in_flight: 64,
            max_abandoned: 128,
            max_payload_bytes: 8 * 1024,
            max_string_len: 1024,
            indications_enabled: false,
            ..Self::base()
        }
    }

    /// Renames the surface.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets [`secure_erase`](Self::secure_erase).
    pub fn with_secure_erase(mut self, enabled: bool) -> Self {
        self.secure_erase = enabled;
        self
    }

    /// Sets [`max_in_flight`](Self::max_in_flight).
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Sets [`max_payload_bytes`](Self::max_payload_bytes).
    pub fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Sets [`max_string_len`](Self::max_string_len).
    pub fn with_max_string_len(mut self, limit: usize) -> Self {
        self.max_string_len = limit;
        self
    }

    /// Sets [`indications_enabled`](Self::indications_enabled).
    pub fn with_indications(mut self, enabled: bool) -> Self {
        self.indications_enabled = enabled;
        self
    }

    /// Registry limits for one transport on this surface.
    pub fn lane_config(&self) -> LaneConfig {
        LaneConfig {
            max_in_flight: self.max_in_flight,
            max_abandoned: self.max_abandoned,
        }
    }

    /// Codec limits for this surface.
    pub fn marshal_options(&self) -> MarshalOptions {
        MarshalOptions {
            max_payload_bytes: self.max_payload_bytes,
            max_string_len: self.max_string_len,
            secure_erase: self.secure_erase,
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self::base()
    }
}
