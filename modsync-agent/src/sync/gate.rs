//! Version gate: decides whether a manifest may be applied by this client.
//!
//! Checks run in a fixed order and stop at the first failure:
//! manifest schema version, local settings version, client version, pack
//! version, server identity.

use crate::manifest::version::VersionRange;
use crate::manifest::{Manifest, SUPPORTED_MANIFEST_VERSION};
use crate::settings::SyncSettings;
use std::fmt;

/// Local settings schema version this agent understands.
pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Why a manifest was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    UnsupportedManifestVersion { found: u32 },
    UnsupportedConfigVersion { found: u32 },
    ClientVersionNotAccepted { version: String, range: String },
    /// Carries the server's human-readable message
    PackVersionNotAccepted { message: String },
    MismatchedServer { expected: String, found: String },
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::UnsupportedManifestVersion { found } => write!(
                f,
                "unsupported manifest version {} (supported: {})",
                found, SUPPORTED_MANIFEST_VERSION
            ),
            GateRejection::UnsupportedConfigVersion { found } => write!(
                f,
                "unsupported local config version {} (supported: {})",
                found, SUPPORTED_CONFIG_VERSION
            ),
            GateRejection::ClientVersionNotAccepted { version, range } => write!(
                f,
                "client version {} not accepted (server accepts {})",
                version, range
            ),
            GateRejection::PackVersionNotAccepted { message } => f.write_str(message),
            GateRejection::MismatchedServer { expected, found } => write!(
                f,
                "mismatched server identity (expected '{}', manifest is for '{}')",
                expected, found
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Reject(GateRejection),
}

/// Evaluate the manifest against local settings and the running client version.
pub fn evaluate(manifest: &Manifest, settings: &SyncSettings, client_version: &str) -> GateDecision {
    match check(manifest, settings, client_version) {
        Ok(()) => GateDecision::Allow,
        Err(rejection) => GateDecision::Reject(rejection),
    }
}

fn check(manifest: &Manifest, settings: &SyncSettings, client_version: &str) -> Result<(), GateRejection> {
    if manifest.manifest_version != SUPPORTED_MANIFEST_VERSION {
        return Err(GateRejection::UnsupportedManifestVersion {
            found: manifest.manifest_version,
        });
    }

    if settings.config_version != SUPPORTED_CONFIG_VERSION {
        return Err(GateRejection::UnsupportedConfigVersion {
            found: settings.config_version,
        });
    }

    let client_accepted = VersionRange::parse(&manifest.accept_client_mod)
        .map(|range| range.satisfies(client_version))
        .unwrap_or(false);
    if !client_accepted {
        return Err(GateRejection::ClientVersionNotAccepted {
            version: client_version.to_string(),
            range: manifest.accept_client_mod.clone(),
        });
    }

    let pack_accepted = VersionRange::parse(&manifest.accept_client_pack)
        .map(|range| range.satisfies(&settings.pack_version))
        .unwrap_or(false);
    if !pack_accepted {
        let message = manifest
            .not_supported_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "pack version {} not accepted (server accepts {})",
                    settings.pack_version, manifest.accept_client_pack
                )
            });
        return Err(GateRejection::PackVersionNotAccepted { message });
    }

    if manifest.server_name != settings.server_name {
        return Err(GateRejection::MismatchedServer {
            expected: settings.server_name.clone(),
            found: manifest.server_name.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(overrides: serde_json::Value) -> Manifest {
        let mut value = json!({
            "manifestVersion": 1,
            "serverName": "SyncCraftExample",
            "acceptClientMod": "[1.0,2.0)",
            "acceptClientPack": "[1.0.0,)",
            "notSupportedMessage": "Your pack is too old, please reinstall.",
            "timestamp": "1700000000"
        });
        if let (Some(target), Some(source)) = (value.as_object_mut(), overrides.as_object()) {
            for (k, v) in source {
                target.insert(k.clone(), v.clone());
            }
        }
        Manifest::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_allow() {
        let decision = evaluate(&manifest(json!({})), &SyncSettings::default(), "1.2.0");
        assert_eq!(decision, GateDecision::Allow);
    }

    #[test]
    fn test_unsupported_manifest_version() {
        let decision = evaluate(
            &manifest(json!({"manifestVersion": 2})),
            &SyncSettings::default(),
            "1.2.0",
        );
        assert_eq!(
            decision,
            GateDecision::Reject(GateRejection::UnsupportedManifestVersion { found: 2 })
        );
    }

    #[test]
    fn test_manifest_version_checked_before_everything_else() {
        let settings = SyncSettings {
            config_version: 7,
            server_name: "Other".to_string(),
            ..SyncSettings::default()
        };
        let decision = evaluate(&manifest(json!({"manifestVersion": 2})), &settings, "9.9.9");
        assert!(matches!(
            decision,
            GateDecision::Reject(GateRejection::UnsupportedManifestVersion { .. })
        ));
    }

    #[test]
    fn test_unsupported_config_version() {
        let settings = SyncSettings {
            config_version: 2,
            ..SyncSettings::default()
        };
        let decision = evaluate(&manifest(json!({})), &settings, "1.2.0");
        assert_eq!(
            decision,
            GateDecision::Reject(GateRejection::UnsupportedConfigVersion { found: 2 })
        );
    }

    #[test]
    fn test_client_version_not_accepted() {
        let decision = evaluate(&manifest(json!({})), &SyncSettings::default(), "2.0.0");
        assert!(matches!(
            decision,
            GateDecision::Reject(GateRejection::ClientVersionNotAccepted { .. })
        ));
    }

    #[test]
    fn test_unparsable_client_range_rejects() {
        let decision = evaluate(
            &manifest(json!({"acceptClientMod": "[oops"})),
            &SyncSettings::default(),
            "1.2.0",
        );
        assert!(matches!(
            decision,
            GateDecision::Reject(GateRejection::ClientVersionNotAccepted { .. })
        ));
    }

    #[test]
    fn test_pack_version_rejection_uses_server_message() {
        let settings = SyncSettings {
            pack_version: "0.9.0".to_string(),
            ..SyncSettings::default()
        };
        let decision = evaluate(&manifest(json!({})), &settings, "1.2.0");
        assert_eq!(
            decision,
            GateDecision::Reject(GateRejection::PackVersionNotAccepted {
                message: "Your pack is too old, please reinstall.".to_string()
            })
        );
    }

    #[test]
    fn test_pack_version_rejection_without_message() {
        let settings = SyncSettings {
            pack_version: "0.9.0".to_string(),
            ..SyncSettings::default()
        };
        let decision = evaluate(
            &manifest(json!({"notSupportedMessage": null})),
            &settings,
            "1.2.0",
        );
        match decision {
            GateDecision::Reject(rejection @ GateRejection::PackVersionNotAccepted { .. }) => {
                assert!(rejection.to_string().contains("0.9.0"));
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_server() {
        let decision = evaluate(
            &manifest(json!({"serverName": "Creative"})),
            &SyncSettings::default(),
            "1.2.0",
        );
        assert_eq!(
            decision,
            GateDecision::Reject(GateRejection::MismatchedServer {
                expected: "SyncCraftExample".to_string(),
                found: "Creative".to_string()
            })
        );
    }
}
