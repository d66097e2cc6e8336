// Per-account AKE configuration, loadable from JSON.

use serde::{Deserialize, Serialize};

use crate::error::{AkeError, Result};
use crate::policy::{PolicyFlags, VersionPolicy};
use crate::wire::ProtocolVersion;

/// Smallest valid v3 instance tag; lower values are reserved.
pub const MIN_INSTANCE_TAG: u32 = 0x100;

/// Settings shared by every conversation of one local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AkeConfig {
    /// Policy consulted for inbound messages and for handshakes we start.
    pub policy: PolicyFlags,
    /// Version used for handshakes we initiate.
    pub preferred_version: ProtocolVersion,
    /// Fixed v3 instance tag; a random one is picked per state machine when unset.
    pub instance_tag: Option<u32>,
}

impl Default for AkeConfig {
    fn default() -> Self {
        Self {
            policy: PolicyFlags::MANUAL,
            preferred_version: ProtocolVersion::V3,
            instance_tag: None,
        }
    }
}

impl AkeConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AkeError::Config(format!("{e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AkeError::Config(format!("{e}")))
    }

    /// Reject settings that cannot produce a working handshake.
    pub fn validate(&self) -> Result<()> {
        if let Some(tag) = self.instance_tag {
            if tag < MIN_INSTANCE_TAG {
                return Err(AkeError::Config(format!(
                    "instance tag 0x{tag:x} is below 0x{MIN_INSTANCE_TAG:x}"
                )));
            }
        }
        // A policy that allows no AKE version leaves OTR off; anything
        // else must allow the version we would initiate with.
        let enabled = self.policy.allows_v2() || self.policy.allows_v3();
        if enabled && !self.policy.allows(self.preferred_version) {
            return Err(AkeError::Config(format!(
                "preferred version {} is not allowed by policy 0x{:x}",
                self.preferred_version, self.policy.0
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AkeConfig::from_json("{}").unwrap();
        assert_eq!(config, AkeConfig::default());
    }

    #[test]
    fn parses_policy_bits_and_version() {
        let config =
            AkeConfig::from_json(r#"{"policy": 2, "preferred_version": 2, "instance_tag": 4096}"#)
                .unwrap();
        assert!(config.policy.allows_v2());
        assert!(!config.policy.allows_v3());
        assert_eq!(config.preferred_version, ProtocolVersion::V2);
        assert_eq!(config.instance_tag, Some(4096));
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(matches!(
            AkeConfig::from_json(r#"{"preferred_version": 1}"#),
            Err(AkeError::Config(_))
        ));
    }

    #[test]
    fn rejects_reserved_instance_tag() {
        assert!(matches!(
            AkeConfig::from_json(r#"{"instance_tag": 255}"#),
            Err(AkeError::Config(_))
        ));
    }

    #[test]
    fn json_roundtrip() {
        let config = AkeConfig {
            policy: PolicyFlags::ALWAYS,
            preferred_version: ProtocolVersion::V2,
            instance_tag: Some(0x1000),
        };
        assert_eq!(AkeConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
    }

    #[test]
    fn rejects_preferred_version_outside_policy() {
        let err = AkeConfig::from_json(r#"{"policy": 2, "preferred_version": 3}"#);
        assert!(matches!(err, Err(AkeError::Config(_))));

        let config = AkeConfig {
            policy: PolicyFlags::ALLOW_V3,
            preferred_version: ProtocolVersion::V2,
            instance_tag: None,
        };
        assert!(matches!(config.validate(), Err(AkeError::Config(_))));
    }

    #[test]
    fn disabled_policy_is_valid() {
        let config = AkeConfig {
            policy: PolicyFlags::NEVER,
            ..AkeConfig::default()
        };
        config.validate().unwrap();
    }
}
