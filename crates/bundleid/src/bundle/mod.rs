//! Built bundle components.
//!
//! A built application is a tree of nested bundles: the root `.app`, its
//! `PlugIns/*.appex`, `Frameworks/*.framework`, an embedded `Watch/*.app`
//! and so on. Each of them carries its own `Info.plist`. This module finds
//! those components in a [`MetadataStore`] (an unpacked directory or a
//! packaged archive), reads their metadata and maps them back to descriptor
//! targets.
//!
//! | Extension | Kind |
//! |-----------|------|
//! | `.app` | [`ComponentKind::App`] |
//! | `.appex` | [`ComponentKind::AppExtension`] |
//! | `.framework` | [`ComponentKind::Framework`] |
//! | `.xctest` | [`ComponentKind::TestBundle`] |
//!
//! # Examples
//!
//! ```no_run
//! use bundleid::bundle::{self, DirectoryStore};
//!
//! let mut store = DirectoryStore::open("build/Runner.app")?;
//! for component in bundle::scan(&mut store)? {
//!     println!("{} {:?}", component.path, component.info.identifier);
//! }
//! # Ok::<(), bundleid::Error>(())
//! ```

pub mod directory;
pub mod metadata;

pub use directory::DirectoryStore;
pub use metadata::{patch_metadata, read_info, BundleInfo, MetadataPatch};

use crate::descriptor::{BuildConfiguration, Descriptor, Target, BUNDLE_ID_KEY};
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name of a component's metadata document.
pub const INFO_PLIST: &str = "Info.plist";

/// Extension point of WatchKit extensions.
const WATCHKIT_EXTENSION_POINT: &str = "com.apple.watchkit";

/// Storage holding component metadata documents.
///
/// Paths are store-relative and `/`-separated. Writes are staged and only
/// reach storage on [`commit`](MetadataStore::commit), so a failure while
/// planning leaves the store untouched.
pub trait MetadataStore {
    /// Location shown in logs and reports.
    fn location(&self) -> &Path;

    /// Paths of every `Info.plist` that belongs to a bundle component.
    fn metadata_paths(&mut self) -> Result<Vec<String>>;

    fn read(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Queue new content for `path`.
    fn stage(&mut self, path: &str, contents: Vec<u8>);

    /// Write every staged document. Returns the backup taken, if any.
    fn commit(self) -> Result<Option<PathBuf>>
    where
        Self: Sized;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    App,
    AppExtension,
    Framework,
    TestBundle,
}

impl ComponentKind {
    /// Kind of a bundle directory, by its extension.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext {
            "app" => Some(ComponentKind::App),
            "appex" => Some(ComponentKind::AppExtension),
            "framework" => Some(ComponentKind::Framework),
            "xctest" => Some(ComponentKind::TestBundle),
            _ => None,
        }
    }
}

/// One nested bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Store-relative path of the bundle directory.
    pub path: String,
    /// Store-relative path of its `Info.plist`.
    pub metadata_path: String,
    pub kind: ComponentKind,
    /// Number of enclosing bundles; the root application is at depth 0.
    pub depth: usize,
    /// Bundle directory name without its extension.
    pub stem: String,
    pub info: BundleInfo,
}

impl Component {
    /// Describe the component behind a metadata path, if the path is the
    /// `Info.plist` at the top of a bundle directory.
    pub fn locate(metadata_path: &str) -> Option<(String, ComponentKind, usize, String)> {
        let dir = metadata_path.strip_suffix(INFO_PLIST)?.strip_suffix('/')?;
        let name = dir.rsplit('/').next()?;
        let kind = ComponentKind::from_dir_name(name)?;
        let depth = dir
            .split('/')
            .filter(|segment| ComponentKind::from_dir_name(segment).is_some())
            .count()
            .saturating_sub(1);
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        Some((dir.to_string(), kind, depth, stem.to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0 && self.kind == ComponentKind::App
    }

    pub fn is_watch_app(&self) -> bool {
        self.kind == ComponentKind::App
            && self.depth > 0
            && (self.info.watch_app || self.path.contains("/Watch/"))
    }

    pub fn is_watch_extension(&self) -> bool {
        self.kind == ComponentKind::AppExtension
            && self.info.extension_point.as_deref() == Some(WATCHKIT_EXTENSION_POINT)
    }

    /// Names this component could have been built under.
    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.stem.as_str())
            .chain(self.info.executable.as_deref())
            .chain(self.info.name.as_deref())
    }

    /// Product type a target building this component would declare.
    fn product_type(&self) -> Option<&'static str> {
        let product_type = match self.kind {
            ComponentKind::App if self.depth == 0 => "com.apple.product-type.application",
            ComponentKind::App if self.is_watch_app() => {
                "com.apple.product-type.application.watchapp2"
            }
            // App clips and other embedded apps fall back to name heuristics.
            ComponentKind::App => return None,
            ComponentKind::AppExtension if self.is_watch_extension() => {
                "com.apple.product-type.watchkit2-extension"
            }
            ComponentKind::AppExtension => "com.apple.product-type.app-extension",
            ComponentKind::Framework => "com.apple.product-type.framework",
            ComponentKind::TestBundle => "com.apple.product-type.bundle.unit-test",
        };
        Some(product_type)
    }
}

/// Find and read every component in `store`, root first.
///
/// # Errors
///
/// Fails on unreadable storage or a malformed `Info.plist`.
pub fn scan<S: MetadataStore>(store: &mut S) -> Result<Vec<Component>> {
    let mut components = Vec::new();
    for metadata_path in store.metadata_paths()? {
        let Some((path, kind, depth, stem)) = Component::locate(&metadata_path) else {
            continue;
        };
        let bytes = store.read(&metadata_path)?;
        let info = read_info(&bytes, Path::new(&metadata_path))?;
        components.push(Component {
            path,
            metadata_path,
            kind,
            depth,
            stem,
            info,
        });
    }
    components.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.path.cmp(&b.path)));
    tracing::debug!(
        location = %store.location().display(),
        count = components.len(),
        "scanned bundle components"
    );
    Ok(components)
}

/// Build a descriptor from the components themselves.
///
/// Used when no project descriptor is available: every component becomes a
/// target whose id is its path and whose only configuration carries the
/// current `CFBundleIdentifier`.
pub fn synthesize_descriptor(components: &[Component]) -> Result<Descriptor> {
    let targets = components
        .iter()
        .map(|component| {
            let mut configuration = BuildConfiguration::new(&component.metadata_path, INFO_PLIST);
            if let Some(current) = &component.info.identifier {
                configuration = configuration.with_setting(BUNDLE_ID_KEY, current);
            }
            Target {
                id: component.path.clone(),
                name: component.stem.clone(),
                product_name: component.info.executable.clone(),
                product_type: component.product_type().map(str::to_string),
                extension_point: component.info.extension_point.clone(),
                configurations: vec![configuration],
            }
        })
        .collect();
    Descriptor::from_targets(targets)
}

/// Map each component to the index of the target that builds it.
///
/// Synthesized targets match by id. Otherwise the root application maps to
/// `main_target` and every other component to the first unclaimed target
/// whose product names include the bundle's directory stem, executable or
/// display name.
pub fn match_components(
    components: &[Component],
    descriptor: &Descriptor,
    main_target: Option<usize>,
) -> Vec<Option<usize>> {
    let mut claimed = vec![false; descriptor.targets.len()];
    let mut matches = Vec::with_capacity(components.len());

    for component in components {
        let by_id = descriptor
            .targets
            .iter()
            .position(|t| t.id == component.path);
        let found = by_id
            .or_else(|| main_target.filter(|_| component.is_root()))
            .or_else(|| {
                descriptor
                    .targets
                    .iter()
                    .enumerate()
                    .find(|&(i, target)| {
                        !claimed[i]
                            && Some(i) != main_target
                            && target
                                .product_names()
                                .any(|name| component.names().any(|n| n == name))
                    })
                    .map(|(i, _)| i)
            });
        if let Some(i) = found {
            claimed[i] = true;
        } else {
            tracing::warn!(component = %component.path, "no target matches bundle component");
        }
        matches.push(found);
    }
    matches
}
