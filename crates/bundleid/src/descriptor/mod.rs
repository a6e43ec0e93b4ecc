//! Project descriptor model.
//!
//! A [`Descriptor`] is the target graph of one Xcode project: its native
//! targets in project order, each with its build configurations and their
//! settings. Only what identifier resolution needs is modelled; everything
//! else in the file is skipped by the reader and preserved byte for byte by
//! [`writer`].
//!
//! # Examples
//!
//! ```no_run
//! use bundleid::descriptor::Descriptor;
//!
//! let descriptor = Descriptor::load("Runner.xcodeproj/project.pbxproj")?;
//! for target in &descriptor.targets {
//!     println!("{} -> {:?}", target.name, target.bundle_identifier());
//! }
//! # Ok::<(), bundleid::Error>(())
//! ```

pub mod parser;
pub mod writer;

use crate::{Error, Result};
use parser::{Node, Span};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Build setting holding a target's bundle identifier.
pub const BUNDLE_ID_KEY: &str = "PRODUCT_BUNDLE_IDENTIFIER";

/// Build setting pointing unit tests at their host application.
pub const TEST_HOST_KEY: &str = "TEST_HOST";

/// File name of the descriptor inside an `.xcodeproj` directory.
pub const PROJECT_FILE: &str = "project.pbxproj";

/// A build setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Scalar(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Scalar(s) => Some(s),
            SettingValue::List(_) => None,
        }
    }
}

/// One named build configuration (Debug, Release, Profile...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub id: String,
    pub name: String,
    pub settings: BTreeMap<String, SettingValue>,
    /// Location of the `PRODUCT_BUNDLE_IDENTIFIER` value in the source text.
    pub(crate) identifier_span: Option<Span>,
}

impl BuildConfiguration {
    /// Create a configuration that does not come from descriptor text.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            settings: BTreeMap::new(),
            identifier_span: None,
        }
    }

    /// Set a scalar build setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings
            .insert(key.into(), SettingValue::Scalar(value.into()));
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(SettingValue::as_str)
    }

    /// The declared bundle identifier, if this configuration declares one.
    pub fn bundle_identifier(&self) -> Option<&str> {
        self.setting(BUNDLE_ID_KEY)
    }

    pub fn declares_test_host(&self) -> bool {
        self.settings.contains_key(TEST_HOST_KEY)
    }
}

/// One buildable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Object reference key, stable within one descriptor.
    pub id: String,
    pub name: String,
    /// Name of the built product (`productName`), used to match bundle
    /// directories back to targets.
    pub product_name: Option<String>,
    /// Raw product type taxonomy string, e.g.
    /// `com.apple.product-type.app-extension`.
    pub product_type: Option<String>,
    /// `NSExtensionPointIdentifier`, known only for targets synthesized from
    /// built bundles.
    pub extension_point: Option<String>,
    pub configurations: Vec<BuildConfiguration>,
}

impl Target {
    /// First bundle identifier declared by any configuration.
    pub fn bundle_identifier(&self) -> Option<&str> {
        self.configurations
            .iter()
            .find_map(BuildConfiguration::bundle_identifier)
    }

    pub fn declares_test_host(&self) -> bool {
        self.configurations
            .iter()
            .any(BuildConfiguration::declares_test_host)
    }

    /// Names a built bundle directory of this target could carry.
    pub fn product_names(&self) -> impl Iterator<Item = &str> {
        let from_settings = self
            .configurations
            .iter()
            .filter_map(|c| c.setting("PRODUCT_NAME"))
            .filter(|name| !name.contains("$("));
        self.product_name
            .as_deref()
            .into_iter()
            .chain(from_settings)
            .chain(std::iter::once(self.name.as_str()))
    }
}

/// The target graph of one project descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub targets: Vec<Target>,
}

impl Descriptor {
    /// Build a descriptor from targets that were not read from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] if a target has no configurations.
    pub fn from_targets(targets: Vec<Target>) -> Result<Self> {
        for target in &targets {
            if target.configurations.is_empty() {
                return Err(Error::Descriptor(format!(
                    "target `{}` has no build configurations",
                    target.name
                )));
            }
        }
        Ok(Self { targets })
    }

    /// Parse descriptor text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for unreadable text and
    /// [`Error::Descriptor`] for a structurally broken target graph.
    pub fn parse(source: &str) -> Result<Self> {
        let root = parser::parse(source)?;
        extract(&root)
    }

    /// Read and parse a descriptor file. An `.xcodeproj` directory resolves
    /// to the `project.pbxproj` inside it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = resolve_path(path.as_ref());
        let source = fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
        Self::parse(&source)
    }

    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }
}

/// Map an `.xcodeproj` bundle to the descriptor file inside it.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_dir() || path.extension().is_some_and(|e| e == "xcodeproj") {
        path.join(PROJECT_FILE)
    } else {
        path.to_path_buf()
    }
}

fn extract(root: &Node) -> Result<Descriptor> {
    let objects = root
        .get("objects")
        .and_then(Node::as_dict)
        .ok_or_else(|| Error::Descriptor("missing `objects` dictionary".into()))?;

    let index: HashMap<&str, &Node> = objects
        .iter()
        .map(|(key, node)| (key.value.as_str(), node))
        .collect();
    let isa = |node: &Node| node.get("isa").and_then(Node::as_str).map(str::to_string);

    // Project order first (the `targets` list of the root project object),
    // then any native target the project does not list.
    let mut order: Vec<&str> = Vec::new();
    if let Some(project) = root
        .get("rootObject")
        .and_then(Node::as_str)
        .and_then(|id| index.get(id))
    {
        if let Some(listed) = project.get("targets").and_then(Node::as_array) {
            order.extend(listed.iter().filter_map(Node::as_str));
        }
    }
    for (key, node) in objects {
        if isa(node).as_deref() == Some("PBXNativeTarget") {
            order.push(&key.value);
        }
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for id in order {
        if !seen.insert(id) {
            continue;
        }
        let node = index
            .get(id)
            .ok_or_else(|| Error::Descriptor(format!("project lists unknown target `{id}`")))?;
        if isa(node).as_deref() != Some("PBXNativeTarget") {
            continue;
        }
        targets.push(extract_target(id, node, &index)?);
    }

    Ok(Descriptor { targets })
}

fn extract_target(id: &str, node: &Node, index: &HashMap<&str, &Node>) -> Result<Target> {
    let text = |key: &str| node.get(key).and_then(Node::as_str).map(str::to_string);
    let product_name = text("productName");
    let name = text("name")
        .or_else(|| product_name.clone())
        .unwrap_or_else(|| id.to_string());

    let list_id = node
        .get("buildConfigurationList")
        .and_then(Node::as_str)
        .ok_or_else(|| {
            Error::Descriptor(format!("target `{name}` has no buildConfigurationList"))
        })?;
    let list = index.get(list_id).ok_or_else(|| {
        Error::Descriptor(format!(
            "target `{name}` references missing configuration list `{list_id}`"
        ))
    })?;

    let mut configurations = Vec::new();
    for reference in list
        .get("buildConfigurations")
        .and_then(Node::as_array)
        .unwrap_or_default()
    {
        let Some(config_id) = reference.as_str() else {
            continue;
        };
        let config = index.get(config_id).ok_or_else(|| {
            Error::Descriptor(format!(
                "target `{name}` references missing build configuration `{config_id}`"
            ))
        })?;
        configurations.push(extract_configuration(config_id, config));
    }

    if configurations.is_empty() {
        return Err(Error::Descriptor(format!(
            "target `{name}` has no build configurations"
        )));
    }

    Ok(Target {
        id: id.to_string(),
        name,
        product_name,
        product_type: text("productType"),
        extension_point: None,
        configurations,
    })
}

fn extract_configuration(id: &str, node: &Node) -> BuildConfiguration {
    let name = node
        .get("name")
        .and_then(Node::as_str)
        .unwrap_or(id)
        .to_string();

    let mut settings = BTreeMap::new();
    let mut identifier_span = None;
    for (key, value) in node
        .get("buildSettings")
        .and_then(Node::as_dict)
        .unwrap_or_default()
    {
        let setting = match value {
            Node::String(scalar) => {
                if key.value == BUNDLE_ID_KEY {
                    identifier_span = Some(scalar.span);
                }
                SettingValue::Scalar(scalar.value.clone())
            }
            Node::Array(items) => SettingValue::List(
                items
                    .iter()
                    .filter_map(Node::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Node::Data(_) | Node::Dict(_) => continue,
        };
        settings.insert(key.value.clone(), setting);
    }

    BuildConfiguration {
        id: id.to_string(),
        name,
        settings,
        identifier_span,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Descriptor text builders shared by tests across the crate.

    /// `(name, productType, [(configuration, bundle id)])`
    pub type TargetSpec<'a> = (&'a str, Option<&'a str>, &'a [(&'a str, &'a str)]);

    pub fn project(targets: &[TargetSpec<'_>]) -> String {
        let mut objects = String::new();
        let mut listed = String::new();
        for (t, (name, product_type, configs)) in targets.iter().enumerate() {
            let target_id = format!("T{t:023}");
            let list_id = format!("L{t:023}");
            listed.push_str(&format!("\t\t\t\t{target_id} /* {name} */,\n"));
            objects.push_str(&format!(
                "\t\t{target_id} /* {name} */ = {{\n\t\t\tisa = PBXNativeTarget;\n\t\t\tbuildConfigurationList = {list_id};\n\t\t\tname = {name};\n\t\t\tproductName = {name};\n"
            ));
            if let Some(product_type) = product_type {
                objects.push_str(&format!(
                    "\t\t\tproductType = \"com.apple.product-type.{product_type}\";\n"
                ));
            }
            objects.push_str("\t\t};\n");
            let mut refs = String::new();
            for (c, (config, bundle_id)) in configs.iter().enumerate() {
                let config_id = format!("C{t:011}{c:012}");
                refs.push_str(&format!("\t\t\t\t{config_id} /* {config} */,\n"));
                objects.push_str(&format!(
                    "\t\t{config_id} /* {config} */ = {{\n\t\t\tisa = XCBuildConfiguration;\n\t\t\tbuildSettings = {{\n\t\t\t\tCODE_SIGN_STYLE = Automatic;\n\t\t\t\tPRODUCT_BUNDLE_IDENTIFIER = {bundle_id};\n\t\t\t\tPRODUCT_NAME = \"$(TARGET_NAME)\";\n\t\t\t}};\n\t\t\tname = {config};\n\t\t}};\n"
                ));
            }
            objects.push_str(&format!(
                "\t\t{list_id} = {{\n\t\t\tisa = XCConfigurationList;\n\t\t\tbuildConfigurations = (\n{refs}\t\t\t);\n\t\t\tdefaultConfigurationName = Release;\n\t\t}};\n"
            ));
        }
        format!(
            "// !$*UTF8*$!\n{{\n\tarchiveVersion = 1;\n\tclasses = {{\n\t}};\n\tobjectVersion = 54;\n\tobjects = {{\n\n/* Begin PBXProject section */\n\t\tP00000000000000000000000 /* Project object */ = {{\n\t\t\tisa = PBXProject;\n\t\t\ttargets = (\n{listed}\t\t\t);\n\t\t}};\n/* End PBXProject section */\n{objects}\t}};\n\trootObject = P00000000000000000000000 /* Project object */;\n}}\n"
        )
    }

    /// Runner app, unit tests and a share extension with debug and release
    /// configurations that all still carry the template identifier.
    pub fn runner_project() -> String {
        project(&[
            (
                "Runner",
                Some("application"),
                &[("Debug", "com.example.app"), ("Release", "com.example.app")],
            ),
            (
                "RunnerTests",
                Some("bundle.unit-test"),
                &[("Debug", "com.example.app"), ("Release", "com.example.app")],
            ),
            (
                "ShareExt",
                Some("app-extension"),
                &[("Debug", "com.example.app"), ("Release", "com.example.app")],
            ),
        ])
    }
}
