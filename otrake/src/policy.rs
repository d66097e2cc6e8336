// Version and auto-start policy.

use serde::{Deserialize, Serialize};

use crate::wire::ProtocolVersion;

/// The read-only view of a policy the handshake consults per inbound message.
pub trait VersionPolicy {
    fn allows_v2(&self) -> bool;
    fn allows_v3(&self) -> bool;

    /// Whether messages of `version` may be processed.
    fn allows(&self, version: ProtocolVersion) -> bool {
        match version {
            ProtocolVersion::V2 => self.allows_v2(),
            ProtocolVersion::V3 => self.allows_v3(),
        }
    }
}

/// Policy bit set; bit values match libotr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyFlags(pub u32);

impl PolicyFlags {
    pub const ALLOW_V1: Self = Self(0x01);
    pub const ALLOW_V2: Self = Self(0x02);
    pub const REQUIRE_ENCRYPTION: Self = Self(0x04);
    pub const SEND_WHITESPACE_TAG: Self = Self(0x08);
    pub const WHITESPACE_START_AKE: Self = Self(0x10);
    pub const ERROR_START_AKE: Self = Self(0x20);
    pub const ALLOW_V3: Self = Self(0x40);

    pub const NEVER: Self = Self(0x00);
    pub const MANUAL: Self = Self(Self::ALLOW_V2.0 | Self::ALLOW_V3.0);
    pub const OPPORTUNISTIC: Self = Self(
        Self::MANUAL.0
            | Self::SEND_WHITESPACE_TAG.0
            | Self::WHITESPACE_START_AKE.0
            | Self::ERROR_START_AKE.0,
    );
    pub const ALWAYS: Self = Self(Self::OPPORTUNISTIC.0 | Self::REQUIRE_ENCRYPTION.0);

    pub fn contains(self, flag: PolicyFlags) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Copy with `flag` set or cleared.
    pub fn with(self, flag: PolicyFlags, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | flag.0)
        } else {
            Self(self.0 & !flag.0)
        }
    }

    pub fn allows_v1(self) -> bool {
        self.contains(Self::ALLOW_V1)
    }

    /// At least one protocol version is enabled.
    pub fn enable_manual(self) -> bool {
        self.allows_v1() || self.allows_v2() || self.allows_v3()
    }

    pub fn require_encryption(self) -> bool {
        self.enable_manual() && self.contains(Self::REQUIRE_ENCRYPTION)
    }

    pub fn send_whitespace_tag(self) -> bool {
        self.contains(Self::SEND_WHITESPACE_TAG)
    }

    pub fn whitespace_start_ake(self) -> bool {
        self.contains(Self::WHITESPACE_START_AKE)
    }

    pub fn error_start_ake(self) -> bool {
        self.contains(Self::ERROR_START_AKE)
    }

    pub fn enable_opportunistic(self) -> bool {
        self.enable_manual()
            && self.send_whitespace_tag()
            && self.whitespace_start_ake()
            && self.error_start_ake()
    }

    pub fn enable_always(self) -> bool {
        self.enable_opportunistic() && self.require_encryption()
    }

    /// Highest version this policy permits for the AKE, if any.
    pub fn preferred_version(self) -> Option<ProtocolVersion> {
        if self.allows_v3() {
            Some(ProtocolVersion::V3)
        } else if self.allows_v2() {
            Some(ProtocolVersion::V2)
        } else {
            None
        }
    }
}

impl VersionPolicy for PolicyFlags {
    fn allows_v2(&self) -> bool {
        self.contains(Self::ALLOW_V2)
    }

    fn allows_v3(&self) -> bool {
        self.contains(Self::ALLOW_V3)
    }
}

impl std::ops::BitOr for PolicyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
