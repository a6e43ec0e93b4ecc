//! Read-only uniqueness checks.
//!
//! [`validate_path`] re-scans any layer and reports every identifier it
//! finds, grouped by whether more than one target (or component) carries
//! it. Validation never writes; the verdict alone decides the exit status.
//!
//! # Examples
//!
//! ```no_run
//! let report = bundleid::validate::validate_path("build/Runner.ipa")?;
//! if !report.collision_free {
//!     eprintln!("{report}");
//! }
//! # Ok::<(), bundleid::Error>(())
//! ```

use crate::allocate::Assignment;
use crate::bundle::{self, Component, DirectoryStore, MetadataStore};
use crate::classify::{classify, Role};
use crate::config::Overrides;
use crate::descriptor::{self, Descriptor};
use crate::identifier;
use crate::ipa::ArchiveStore;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Which representation of the project a path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    Descriptor,
    Bundle,
    Archive,
}

impl Layer {
    /// Guess the layer from the extension, falling back to the structure.
    pub fn detect(path: &Path) -> Result<Layer> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !path.exists() {
            return Err(Error::io_at(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "path does not exist"),
            ));
        }
        if matches!(ext, "xcodeproj" | "pbxproj") {
            return Ok(Layer::Descriptor);
        }
        if path.is_dir() {
            if path.join(descriptor::PROJECT_FILE).is_file() {
                return Ok(Layer::Descriptor);
            }
            return Ok(Layer::Bundle);
        }
        if matches!(ext, "ipa" | "zip") || has_zip_magic(path) {
            return Ok(Layer::Archive);
        }
        Ok(Layer::Descriptor)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::Descriptor => "descriptor",
            Layer::Bundle => "bundle",
            Layer::Archive => "archive",
        })
    }
}

fn has_zip_magic(path: &Path) -> bool {
    let mut magic = [0u8; 2];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok()
        && &magic == b"PK"
}

/// One identifier value and everything that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierGroup {
    pub identifier: String,
    /// Target names or component paths, in discovery order.
    pub owners: Vec<String>,
}

/// A value that fails the bundle identifier grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidIdentifier {
    pub owner: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub layer: Layer,
    pub path: PathBuf,
    pub collision_free: bool,
    pub unique: Vec<IdentifierGroup>,
    pub duplicates: Vec<IdentifierGroup>,
    pub invalid: Vec<InvalidIdentifier>,
    /// Targets no rule could classify; left untouched by allocation.
    pub unknown: Vec<String>,
}

impl Report {
    fn build(layer: Layer, path: &Path, declared: Vec<(String, String)>, unknown: Vec<String>) -> Self {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut invalid = Vec::new();
        for (owner, value) in declared {
            if !identifier::is_valid(&value) && !value.contains("$(") {
                invalid.push(InvalidIdentifier {
                    owner: owner.clone(),
                    identifier: value.clone(),
                });
            }
            let owners = groups.entry(value).or_default();
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }

        let (duplicates, unique): (Vec<_>, Vec<_>) = groups
            .into_iter()
            .map(|(identifier, owners)| IdentifierGroup { identifier, owners })
            .partition(|g| g.owners.len() > 1);

        for group in &duplicates {
            tracing::warn!(
                identifier = %group.identifier,
                owners = %group.owners.join(", "),
                "duplicate identifier"
            );
        }

        Report {
            layer,
            path: path.to_path_buf(),
            collision_free: duplicates.is_empty(),
            unique,
            duplicates,
            invalid,
            unknown,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.path.display(), self.layer)?;
        for group in &self.unique {
            writeln!(f, "  ok         {}  {}", group.identifier, group.owners.join(", "))?;
        }
        for group in &self.duplicates {
            writeln!(f, "  DUPLICATE  {}  {}", group.identifier, group.owners.join(", "))?;
        }
        for bad in &self.invalid {
            writeln!(f, "  invalid    {}  {}", bad.identifier, bad.owner)?;
        }
        for name in &self.unknown {
            writeln!(f, "  unknown    {name}")?;
        }
        if self.collision_free {
            writeln!(f, "collision-free")
        } else {
            writeln!(f, "{} duplicate identifier(s)", self.duplicates.len())
        }
    }
}

/// Report on a parsed descriptor. Configurations of the same target may
/// share a value; only values shared across targets are duplicates.
pub fn validate_descriptor(descriptor: &Descriptor, path: &Path) -> Report {
    let overrides = Overrides::default();
    let mut declared = Vec::new();
    let mut unknown = Vec::new();
    for target in &descriptor.targets {
        for value in target
            .configurations
            .iter()
            .filter_map(|c| c.bundle_identifier())
        {
            declared.push((target.name.clone(), value.to_string()));
        }
        if classify(target, &overrides).role == Role::Unknown {
            unknown.push(target.name.clone());
        }
    }
    Report::build(Layer::Descriptor, path, declared, unknown)
}

/// Report on the components of a built bundle or archive.
pub fn validate_components(components: &[Component], layer: Layer, path: &Path) -> Result<Report> {
    let declared = components
        .iter()
        .filter_map(|c| Some((c.path.clone(), c.info.identifier.clone()?)))
        .collect();
    let overrides = Overrides::default();
    let unknown = bundle::synthesize_descriptor(components)?
        .targets
        .iter()
        .filter(|t| classify(t, &overrides).role == Role::Unknown)
        .map(|t| t.id.clone())
        .collect();
    Ok(Report::build(layer, path, declared, unknown))
}

/// Report on the values `assignment` would leave behind, without reading
/// storage. Untouched targets contribute their current values.
pub fn validate_assignment(assignment: &Assignment, layer: Layer, path: &Path) -> Report {
    let mut declared = Vec::new();
    for target in &assignment.targets {
        match &target.identifier {
            Some(identifier) => declared.push((target.target_name.clone(), identifier.to_string())),
            None => declared.extend(
                target
                    .configurations
                    .iter()
                    .filter_map(|c| c.current.clone())
                    .map(|value| (target.target_name.clone(), value)),
            ),
        }
    }
    let unknown = assignment
        .targets
        .iter()
        .filter(|t| t.role == Role::Unknown)
        .map(|t| t.target_name.clone())
        .collect();
    Report::build(layer, path, declared, unknown)
}

/// Detect the layer at `path` and validate it.
pub fn validate_path(path: impl AsRef<Path>) -> Result<Report> {
    let path = path.as_ref();
    let layer = Layer::detect(path)?;
    tracing::debug!(path = %path.display(), layer = %layer, "validating");
    match layer {
        Layer::Descriptor => {
            let file = descriptor::resolve_path(path);
            let descriptor = Descriptor::load(&file)?;
            Ok(validate_descriptor(&descriptor, &file))
        }
        Layer::Bundle => {
            let mut store = DirectoryStore::open(path)?;
            let components = bundle::scan(&mut store)?;
            validate_components(&components, layer, store.location())
        }
        Layer::Archive => {
            let mut store = ArchiveStore::open(path)?;
            let components = bundle::scan(&mut store)?;
            validate_components(&components, layer, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::metadata::fixtures::info_plist;
    use crate::descriptor::fixtures::{project, runner_project};
    use crate::ipa::fixtures::write_ipa;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_template_project_has_duplicates() {
        let descriptor = Descriptor::parse(&runner_project()).unwrap();
        let report = validate_descriptor(&descriptor, Path::new("project.pbxproj"));
        assert!(!report.collision_free);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].identifier, "com.example.app");
        assert_eq!(report.duplicates[0].owners, ["Runner", "RunnerTests", "ShareExt"]);
    }

    #[test]
    fn test_shared_value_within_one_target_is_fine() {
        let descriptor = Descriptor::parse(&project(&[(
            "Runner",
            Some("application"),
            &[("Debug", "com.acme.app"), ("Release", "com.acme.app")],
        )]))
        .unwrap();
        let report = validate_descriptor(&descriptor, Path::new("project.pbxproj"));
        assert!(report.collision_free);
        assert_eq!(report.unique.len(), 1);
    }

    #[test]
    fn test_invalid_and_unknown_reported() {
        let descriptor = Descriptor::parse(&project(&[
            ("Runner", Some("application"), &[("Release", "com.acme_app")]),
            ("Helper", None, &[("Release", "com.acme.helper")]),
        ]))
        .unwrap();
        let report = validate_descriptor(&descriptor, Path::new("project.pbxproj"));
        assert!(report.collision_free);
        assert_eq!(report.invalid[0].identifier, "com.acme_app");
        assert_eq!(report.unknown, ["Helper"]);
    }

    #[test]
    fn test_detect_layers() {
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join("Runner.xcodeproj");
        fs::create_dir_all(&project_dir).unwrap();
        let app = dir.path().join("Runner.app");
        fs::create_dir_all(&app).unwrap();
        let ipa = dir.path().join("build.bin");
        write_ipa(&ipa, &[]);

        assert_eq!(Layer::detect(&project_dir).unwrap(), Layer::Descriptor);
        assert_eq!(Layer::detect(&app).unwrap(), Layer::Bundle);
        assert_eq!(Layer::detect(&ipa).unwrap(), Layer::Archive);
        assert!(Layer::detect(&dir.path().join("missing.ipa")).is_err());
    }

    #[test]
    fn test_validate_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Runner.ipa");
        write_ipa(
            &path,
            &[
                ("Payload/Runner.app/Info.plist", info_plist("com.acme.app", "Runner").as_slice()),
                (
                    "Payload/Runner.app/PlugIns/Share.appex/Info.plist",
                    info_plist("com.acme.app", "Share").as_slice(),
                ),
            ],
        );
        let report = validate_path(&path).unwrap();
        assert_eq!(report.layer, Layer::Archive);
        assert!(!report.collision_free);
        assert_eq!(
            report.duplicates[0].owners,
            ["Payload/Runner.app", "Payload/Runner.app/PlugIns/Share.appex"]
        );
        // validation never writes
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
