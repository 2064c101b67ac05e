//! Controller version compatibility.

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Range of controller versions this client supports.
pub const VERSION_CONSTRAINT: &str = ">=2.3.0,<2.5.0";

/// Record returned by `GET /system_information`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInformation {
    /// Controller version, e.g. `2.4.1+build.7`.
    pub version: String,
    /// Whether the controller accepts API calls.
    pub ready: bool,
}

/// Outcome of a successful compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    /// The version compared against the constraint, suffixes stripped.
    pub version: Version,
    /// True when the controller runs a development build.
    pub development: bool,
}

/// Check a controller version string against [`VERSION_CONSTRAINT`].
///
/// Build metadata (`+build.*`) and development suffixes (`.dev*`) are stripped
/// before comparison. Development builds pass but are flagged.
///
/// # Errors
///
/// Returns `ClientError::IncompatibleController` if the version is outside
/// the constraint or cannot be parsed.
pub fn check_version(raw: &str) -> Result<Compatibility> {
    let incompatible = || ClientError::IncompatibleController {
        want: VERSION_CONSTRAINT.to_string(),
        got: raw.to_string(),
    };

    let trimmed = raw.trim();
    let without_build = trimmed.split('+').next().unwrap_or(trimmed);
    let (core, development) = match without_build.find(".dev") {
        Some(idx) => (&without_build[..idx], true),
        None => (without_build, false),
    };

    let version = Version::parse(core).map_err(|_| incompatible())?;
    let req = VersionReq::parse(&VERSION_CONSTRAINT.replace(',', ", ")).map_err(|_| incompatible())?;

    if req.matches(&version) {
        Ok(Compatibility {
            version,
            development,
        })
    } else {
        Err(incompatible())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries() {
        assert!(check_version("2.3.0").is_ok());
        assert!(check_version("2.4.9").is_ok());
        assert!(check_version("2.2.9").is_err());
        assert!(check_version("2.5.0").is_err());
    }

    #[test]
    fn dev_build_accepted_with_flag() {
        let compat = check_version("2.4.0.dev0").unwrap();
        assert!(compat.development);
        assert_eq!(compat.version, Version::new(2, 4, 0));
    }

    #[test]
    fn build_metadata_stripped() {
        let compat = check_version("2.4.0+build.1").unwrap();
        assert!(!compat.development);
        assert_eq!(compat.version, Version::new(2, 4, 0));
    }

    #[test]
    fn rejection_message() {
        let err = check_version("2.5.1").unwrap_err();
        assert!(err.to_string().contains("want >=2.3.0,<2.5.0, got 2.5.1"));
        assert_eq!(err.label(), "incompatible-controller");
    }

    #[test]
    fn garbage_rejected() {
        assert!(check_version("banana").is_err());
        assert!(check_version("").is_err());
    }

    #[test]
    fn system_information_decodes() {
        let info: SystemInformation = serde_json::from_str(
            r#"{"version": "2.4.0", "ready": true, "allow_ssh_pubkey_auth": false}"#,
        )
        .unwrap();
        assert!(info.ready);
        assert_eq!(info.version, "2.4.0");
    }
}
