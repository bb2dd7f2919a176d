//! FTP Transfer modes
//!
//! Mode policy enforced by the negotiator and the data mode a session is
//! currently set up for.

use std::net::SocketAddr;

use serde::Deserialize;

/// Which data-connection modes the server accepts.
///
/// Configured either by name (`"active"`, `"passive"`, `"both"`) or in the
/// tri-state integer form, see [`ModePolicy::from_tristate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "PolicySetting")]
pub enum ModePolicy {
    /// PORT only
    Active,
    /// PASV only
    Passive,
    #[default]
    Both,
}

impl ModePolicy {
    /// Tri-state integer form: positive is active-only, negative is
    /// passive-only, zero allows both.
    pub fn from_tristate(value: i64) -> Self {
        match value.signum() {
            1 => ModePolicy::Active,
            -1 => ModePolicy::Passive,
            _ => ModePolicy::Both,
        }
    }

    pub fn allows_passive(self) -> bool {
        self != ModePolicy::Active
    }

    pub fn allows_active(self) -> bool {
        self != ModePolicy::Passive
    }
}

/// Raw `mode_policy` value as found in a file or the environment.
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicySetting {
    Tristate(i64),
    Named(String),
}

impl TryFrom<PolicySetting> for ModePolicy {
    type Error = String;

    fn try_from(setting: PolicySetting) -> Result<Self, Self::Error> {
        match setting {
            PolicySetting::Tristate(value) => Ok(ModePolicy::from_tristate(value)),
            PolicySetting::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
                "active" => Ok(ModePolicy::Active),
                "passive" => Ok(ModePolicy::Passive),
                "both" => Ok(ModePolicy::Both),
                // environment variables always arrive as strings
                other => other
                    .parse::<i64>()
                    .map(ModePolicy::from_tristate)
                    .map_err(|_| format!("unknown mode policy: {name}")),
            },
        }
    }
}

/// Data mode a session has negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataMode {
    #[default]
    None,
    /// Server listens on `local` for the peer to connect.
    Passive { local: SocketAddr },
    /// Server connects out to `target` when the transfer starts.
    Active { target: SocketAddr },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tristate_policy() {
        assert_eq!(ModePolicy::from_tristate(1), ModePolicy::Active);
        assert_eq!(ModePolicy::from_tristate(42), ModePolicy::Active);
        assert_eq!(ModePolicy::from_tristate(-3), ModePolicy::Passive);
        assert_eq!(ModePolicy::from_tristate(0), ModePolicy::Both);
    }

    #[test]
    fn test_policy_settings() {
        let parse = |setting| ModePolicy::try_from(setting);
        assert_eq!(parse(PolicySetting::Tristate(-1)), Ok(ModePolicy::Passive));
        assert_eq!(
            parse(PolicySetting::Named("Active".into())),
            Ok(ModePolicy::Active)
        );
        assert_eq!(parse(PolicySetting::Named("0".into())), Ok(ModePolicy::Both));
        assert!(parse(PolicySetting::Named("sideways".into())).is_err());
    }

    #[test]
    fn test_policy_restrictions_are_symmetric() {
        assert!(!ModePolicy::Active.allows_passive());
        assert!(ModePolicy::Active.allows_active());
        assert!(ModePolicy::Passive.allows_passive());
        assert!(!ModePolicy::Passive.allows_active());
        assert!(ModePolicy::Both.allows_passive() && ModePolicy::Both.allows_active());
    }
}
