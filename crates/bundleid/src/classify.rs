//! Target classification.
//!
//! Every target gets a [`Role`] that decides its canonical identifier
//! suffix. Classification is table driven: the product type taxonomy, the
//! extension point table and the name heuristics are static ordered lists
//! evaluated first-match-wins.
//!
//! | Step | Signal | Confidence |
//! |------|--------|------------|
//! | 1 | role pinned in the override map | `configured` |
//! | 2 | `productType` taxonomy entry | `explicit` |
//! | 3 | substring of the target name | `heuristic` |
//! | 4 | a configuration declares `TEST_HOST` | `heuristic` |
//! | 5 | nothing matched: [`Role::Unknown`] | `heuristic` |

use crate::config::Overrides;
use crate::descriptor::{Descriptor, Target};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic role of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Main,
    Test,
    Widget,
    NotificationService,
    ShareExtension,
    IntentsExtension,
    GenericExtension,
    Framework,
    WatchApp,
    WatchExtension,
    Unknown,
}

/// Canonical identifier suffix per role. `Main` has none.
static SUFFIXES: &[(Role, &str)] = &[
    (Role::Test, "tests"),
    (Role::Widget, "widget"),
    (Role::NotificationService, "notificationservice"),
    (Role::ShareExtension, "shareextension"),
    (Role::IntentsExtension, "intents"),
    (Role::GenericExtension, "extension"),
    (Role::Framework, "framework"),
    (Role::WatchApp, "watchkitapp"),
    (Role::WatchExtension, "watchkitextension"),
];

/// Suffix used when an `Unknown` target has to be relocated.
pub const UNKNOWN_DISAMBIGUATION_SUFFIX: &str = "component";

impl Role {
    /// Canonical suffix appended to the base identifier, `None` for
    /// [`Role::Main`] and [`Role::Unknown`].
    pub fn suffix(self) -> Option<&'static str> {
        SUFFIXES
            .iter()
            .find(|(role, _)| *role == self)
            .map(|(_, suffix)| *suffix)
    }

    /// Suffix used in `<base>.<suffix>.<n>` disambiguators.
    pub fn disambiguation_suffix(self) -> &'static str {
        match self {
            Role::Main => "app",
            Role::Unknown => UNKNOWN_DISAMBIGUATION_SUFFIX,
            role => role.suffix().unwrap_or(UNKNOWN_DISAMBIGUATION_SUFFIX),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Main => "main",
            Role::Test => "test",
            Role::Widget => "widget",
            Role::NotificationService => "notification-service",
            Role::ShareExtension => "share-extension",
            Role::IntentsExtension => "intents-extension",
            Role::GenericExtension => "generic-extension",
            Role::Framework => "framework",
            Role::WatchApp => "watch-app",
            Role::WatchExtension => "watch-extension",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a role was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    /// Pinned by the override map.
    Configured,
    /// Derived from an unambiguous product type.
    Explicit,
    /// Derived from name patterns or build settings.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub target_id: String,
    pub target_name: String,
    pub role: Role,
    pub confidence: Confidence,
}

const PRODUCT_TYPE_PREFIX: &str = "com.apple.product-type.";

#[derive(Debug, Clone, Copy)]
enum ProductKind {
    Role(Role),
    /// App extension whose subtype still has to be worked out.
    Extension,
}

/// Product type taxonomy, matched against the type with its
/// `com.apple.product-type.` prefix removed.
static PRODUCT_TYPES: &[(&str, ProductKind)] = &[
    ("application", ProductKind::Role(Role::Main)),
    ("application.watchapp2", ProductKind::Role(Role::WatchApp)),
    ("application.watchapp", ProductKind::Role(Role::WatchApp)),
    ("watchkit2.app", ProductKind::Role(Role::WatchApp)),
    ("watchkit2-extension", ProductKind::Role(Role::WatchExtension)),
    ("watchkit-extension", ProductKind::Role(Role::WatchExtension)),
    ("bundle.unit-test", ProductKind::Role(Role::Test)),
    ("bundle.ui-testing", ProductKind::Role(Role::Test)),
    ("app-extension", ProductKind::Extension),
    ("app-extension.messages", ProductKind::Extension),
    ("extensionkit-extension", ProductKind::Extension),
    ("framework", ProductKind::Role(Role::Framework)),
    ("framework.static", ProductKind::Role(Role::Framework)),
];

/// `NSExtensionPointIdentifier` values with a dedicated role.
static EXTENSION_POINTS: &[(&str, Role)] = &[
    ("com.apple.usernotifications.service", Role::NotificationService),
    ("com.apple.widgetkit-extension", Role::Widget),
    ("com.apple.widget-extension", Role::Widget),
    ("com.apple.share-services", Role::ShareExtension),
    ("com.apple.intents-service", Role::IntentsExtension),
    ("com.apple.watchkit", Role::WatchExtension),
];

type NamePredicate = fn(&str) -> bool;

/// Extension subtype by target name, for targets already known to be app
/// extensions.
static EXTENSION_NAME_RULES: &[(NamePredicate, Role)] = &[
    (|n: &str| n.contains("notification"), Role::NotificationService),
    (|n: &str| n.contains("widget"), Role::Widget),
    (|n: &str| n.contains("share"), Role::ShareExtension),
    (|n: &str| n.contains("intents"), Role::IntentsExtension),
];

/// Name heuristics for targets without a usable product type.
static NAME_RULES: &[(NamePredicate, Role)] = &[
    (|n: &str| n.contains("notification"), Role::NotificationService),
    (|n: &str| n.contains("widget"), Role::Widget),
    (|n: &str| n.contains("share"), Role::ShareExtension),
    (|n: &str| n.contains("intents"), Role::IntentsExtension),
    (|n: &str| n.contains("test"), Role::Test),
    (|n: &str| n.contains("watch") && n.contains("extension"), Role::WatchExtension),
    (|n: &str| n.contains("watch"), Role::WatchApp),
    (|n: &str| n.contains("framework"), Role::Framework),
    (|n: &str| n.contains("extension"), Role::GenericExtension),
];

fn match_name(rules: &[(NamePredicate, Role)], name: &str) -> Option<Role> {
    let name = name.to_lowercase();
    rules
        .iter()
        .find(|(matches, _)| matches(name.as_str()))
        .map(|(_, role)| *role)
}

fn product_kind(product_type: &str) -> Option<ProductKind> {
    let short = product_type
        .strip_prefix(PRODUCT_TYPE_PREFIX)
        .unwrap_or(product_type);
    PRODUCT_TYPES
        .iter()
        .find(|(name, _)| *name == short)
        .map(|(_, kind)| *kind)
}

fn extension_role(target: &Target) -> Role {
    target
        .extension_point
        .as_deref()
        .and_then(|point| {
            EXTENSION_POINTS
                .iter()
                .find(|(known, _)| *known == point)
                .map(|(_, role)| *role)
        })
        .or_else(|| match_name(EXTENSION_NAME_RULES, &target.name))
        .unwrap_or(Role::GenericExtension)
}

/// Classify a single target.
pub fn classify(target: &Target, overrides: &Overrides) -> Classification {
    let (role, confidence) = decide(target, overrides);
    Classification {
        target_id: target.id.clone(),
        target_name: target.name.clone(),
        role,
        confidence,
    }
}

fn decide(target: &Target, overrides: &Overrides) -> (Role, Confidence) {
    if let Some(role) = overrides.role_for(target) {
        return (role, Confidence::Configured);
    }

    match target.product_type.as_deref().and_then(product_kind) {
        Some(ProductKind::Role(role)) => return (role, Confidence::Explicit),
        Some(ProductKind::Extension) => return (extension_role(target), Confidence::Explicit),
        None => {}
    }

    if let Some(role) = match_name(NAME_RULES, &target.name) {
        return (role, Confidence::Heuristic);
    }

    if target.declares_test_host() {
        return (Role::Test, Confidence::Heuristic);
    }

    (Role::Unknown, Confidence::Heuristic)
}

/// Classify every target of `descriptor`, in descriptor order.
///
/// # Errors
///
/// Returns [`Error::Classification`] unless exactly one target resolves to
/// [`Role::Main`].
pub fn classify_all(descriptor: &Descriptor, overrides: &Overrides) -> Result<Vec<Classification>> {
    let classifications: Vec<Classification> = descriptor
        .targets
        .iter()
        .map(|target| classify(target, overrides))
        .collect();

    for c in &classifications {
        tracing::debug!(
            target_name = %c.target_name,
            role = %c.role,
            confidence = ?c.confidence,
            "classified target"
        );
    }

    let mains: Vec<&str> = classifications
        .iter()
        .filter(|c| c.role == Role::Main)
        .map(|c| c.target_name.as_str())
        .collect();

    match mains.len() {
        1 => Ok(classifications),
        0 => {
            let names: Vec<&str> = classifications
                .iter()
                .map(|c| c.target_name.as_str())
                .collect();
            Err(Error::Classification(format!(
                "no target classified as the main application (targets: {})",
                names.join(", ")
            )))
        }
        _ => Err(Error::Classification(format!(
            "ambiguous project: {} targets classified as the main application ({})",
            mains.len(),
            mains.join(", ")
        ))),
    }
}
