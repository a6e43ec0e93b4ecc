//! Resolver builder API
//!
//! Ties the pipeline together: parse, classify, allocate, rewrite one layer,
//! then validate that same layer.

use crate::allocate::{allocate, Assignment};
use crate::bundle::{self, DirectoryStore, MetadataStore};
use crate::classify::{classify_all, Classification};
use crate::config::Overrides;
use crate::descriptor::{self, Descriptor};
use crate::identifier::BundleId;
use crate::ipa::ArchiveStore;
use crate::rewrite::{
    rewrite_descriptor, rewrite_packaged_archive, rewrite_unpacked_bundle, RewriteOptions,
    RewriteSummary,
};
use crate::validate::{self, Layer, Report};
use crate::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Bundle identifier resolution with builder pattern API.
///
/// # Example
///
/// ```no_run
/// use bundleid::Resolver;
///
/// let outcome = Resolver::new("com.acme.app")
///     .descriptor("ios/Runner.xcodeproj")
///     .apply_archive("build/Runner.ipa")?;
/// assert!(outcome.is_collision_free());
/// # Ok::<(), bundleid::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    base: String,
    overrides: Overrides,
    descriptor: Option<PathBuf>,
    dry_run: bool,
}

/// Everything one run decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub classifications: Vec<Classification>,
    pub assignment: Assignment,
    pub summary: RewriteSummary,
    /// Validation of the rewritten layer, or of the planned values for a
    /// dry run.
    pub report: Report,
}

impl Outcome {
    /// No duplicates on disk and none left over by the allocator.
    pub fn is_collision_free(&self) -> bool {
        self.report.collision_free && self.assignment.is_collision_free()
    }
}

impl Resolver {
    /// Create a resolver for the given base identifier.
    ///
    /// The value is checked against the bundle identifier grammar before any
    /// file is read or written.
    pub fn new(base_id: impl Into<String>) -> Self {
        Self {
            base: base_id.into(),
            overrides: Overrides::default(),
            descriptor: None,
            dry_run: false,
        }
    }

    /// Set the override map.
    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Set the project descriptor used to match built components.
    ///
    /// Without one, bundle and archive rewrites derive targets from the
    /// components themselves.
    pub fn descriptor(mut self, path: impl AsRef<Path>) -> Self {
        self.descriptor = Some(path.as_ref().to_path_buf());
        self
    }

    /// Plan and report without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate the builder configuration.
    pub fn validate(&self) -> Result<()> {
        BundleId::parse(&self.base)?;
        Ok(())
    }

    /// Classify and allocate without touching storage.
    pub fn plan(&self, descriptor: &Descriptor) -> Result<(Vec<Classification>, Assignment)> {
        self.validate()?;
        let classifications = classify_all(descriptor, &self.overrides)?;
        let assignment = allocate(descriptor, &self.base, &classifications, &self.overrides)?;
        for collision in &assignment.residual {
            tracing::warn!("residual collision: {collision}");
        }
        Ok((classifications, assignment))
    }

    fn options(&self) -> RewriteOptions {
        RewriteOptions {
            dry_run: self.dry_run,
        }
    }

    /// Rewrite the project descriptor at `path`.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<Outcome> {
        self.validate()?;
        let file = descriptor::resolve_path(path.as_ref());
        let descriptor = Descriptor::load(&file)?;
        let (classifications, assignment) = self.plan(&descriptor)?;
        let summary = rewrite_descriptor(&file, &assignment, self.options())?;
        let report = if self.dry_run {
            validate::validate_assignment(&assignment, Layer::Descriptor, &file)
        } else {
            validate::validate_path(&file)?
        };
        Ok(Outcome {
            classifications,
            assignment,
            summary,
            report,
        })
    }

    /// Rewrite the component metadata of a built `.app` directory.
    pub fn apply_bundle(&self, path: impl AsRef<Path>) -> Result<Outcome> {
        self.validate()?;
        let path = path.as_ref();
        let mut store = DirectoryStore::open(path)?;
        let descriptor = self.target_graph(&mut store)?;
        let (classifications, assignment) = self.plan(&descriptor)?;
        let summary = rewrite_unpacked_bundle(path, &descriptor, &assignment, self.options())?;
        let report = if self.dry_run {
            validate::validate_assignment(&assignment, Layer::Bundle, store.location())
        } else {
            validate::validate_path(store.app_path())?
        };
        Ok(Outcome {
            classifications,
            assignment,
            summary,
            report,
        })
    }

    /// Rewrite the component metadata inside a packaged `.ipa`.
    pub fn apply_archive(&self, path: impl AsRef<Path>) -> Result<Outcome> {
        self.validate()?;
        let path = path.as_ref();
        let descriptor = {
            let mut store = ArchiveStore::open(path)?;
            self.target_graph(&mut store)?
        };
        let (classifications, assignment) = self.plan(&descriptor)?;
        let summary = rewrite_packaged_archive(path, &descriptor, &assignment, self.options())?;
        let report = if self.dry_run {
            validate::validate_assignment(&assignment, Layer::Archive, path)
        } else {
            validate::validate_path(path)?
        };
        Ok(Outcome {
            classifications,
            assignment,
            summary,
            report,
        })
    }

    /// The configured descriptor, or one synthesized from the components in
    /// `store`.
    fn target_graph<S: MetadataStore>(&self, store: &mut S) -> Result<Descriptor> {
        match &self.descriptor {
            Some(path) => Descriptor::load(path),
            None => {
                let components = bundle::scan(store)?;
                bundle::synthesize_descriptor(&components)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::fixtures::runner_project;
    use crate::Error;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_base_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("project.pbxproj");
        fs::write(&file, runner_project()).unwrap();

        let err = Resolver::new("com.acme_app").resolve(&file).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(fs::read_to_string(&file).unwrap(), runner_project());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_resolve_reports_collision_free() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("project.pbxproj");
        fs::write(&file, runner_project()).unwrap();

        let outcome = Resolver::new("com.acme.app").resolve(&file).unwrap();
        assert!(outcome.is_collision_free());
        assert_eq!(outcome.summary.changes.len(), 6);
        assert!(outcome.summary.backup.is_some());
    }

    #[test]
    fn test_dry_run_reports_planned_values() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("project.pbxproj");
        fs::write(&file, runner_project()).unwrap();

        let outcome = Resolver::new("com.acme.app")
            .dry_run(true)
            .resolve(&file)
            .unwrap();
        assert!(outcome.is_collision_free());
        assert_eq!(fs::read_to_string(&file).unwrap(), runner_project());
    }
}
