//! Override map configuration.
//!
//! The base identifier is always passed explicitly; the override map is the
//! only other input. It pins roles or identifiers for targets that the rule
//! tables cannot classify correctly:
//!
//! ```toml
//! [roles]
//! "Legacy Widget" = "widget"
//!
//! [identifiers]
//! "Partner SDK" = "com.partner.sdk"
//! ```
//!
//! Keys match a target's name or its object id.

use crate::classify::Role;
use crate::descriptor::Target;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overrides {
    /// Target name (or id) to role.
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
    /// Target name (or id) to a fixed identifier.
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
}

impl Overrides {
    /// Parse an override map from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed TOML or unknown sections.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid override map: {e}")))
    }

    /// Read an override map file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.identifiers.is_empty()
    }

    pub fn role_for(&self, target: &Target) -> Option<Role> {
        lookup(&self.roles, target).copied()
    }

    pub fn identifier_for(&self, target: &Target) -> Option<&str> {
        lookup(&self.identifiers, target).map(String::as_str)
    }
}

fn lookup<'a, V>(map: &'a BTreeMap<String, V>, target: &Target) -> Option<&'a V> {
    map.get(&target.name).or_else(|| map.get(&target.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::BuildConfiguration;

    fn target(id: &str, name: &str) -> Target {
        Target {
            id: id.into(),
            name: name.into(),
            product_name: None,
            product_type: None,
            extension_point: None,
            configurations: vec![BuildConfiguration::new("C", "Debug")],
        }
    }

    #[test]
    fn test_parse_overrides() {
        let overrides = Overrides::from_toml_str(
            r#"
[roles]
"Legacy Widget" = "widget"
ABC123 = "notification-service"

[identifiers]
"Partner SDK" = "com.partner.sdk"
"#,
        )
        .unwrap();

        assert_eq!(
            overrides.role_for(&target("X", "Legacy Widget")),
            Some(Role::Widget)
        );
        assert_eq!(
            overrides.role_for(&target("ABC123", "Push")),
            Some(Role::NotificationService)
        );
        assert_eq!(
            overrides.identifier_for(&target("Y", "Partner SDK")),
            Some("com.partner.sdk")
        );
        assert!(overrides.role_for(&target("Z", "Other")).is_none());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = Overrides::from_toml_str("[roles]\nA = \"gadget\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(Overrides::from_toml_str("[extras]\nA = 1\n").is_err());
    }

    #[test]
    fn test_empty_file() {
        assert!(Overrides::from_toml_str("").unwrap().is_empty());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("overrides.toml");
        fs::write(&path, "not toml [").unwrap();
        let err = Overrides::load(&path).unwrap_err();
        assert!(err.to_string().contains("overrides.toml"));
    }
}
