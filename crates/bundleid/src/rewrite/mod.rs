//! Replaying an [`Assignment`] against storage.
//!
//! | Entry point | Layer |
//! |-------------|-------|
//! | [`rewrite_descriptor`] | `project.pbxproj` before the build |
//! | [`rewrite_unpacked_bundle`] | a built `.app` directory |
//! | [`rewrite_packaged_archive`] | a packaged `.ipa` |
//!
//! All three are idempotent: when every value already matches the
//! assignment nothing is written and no backup is taken.
//!
//! [`Assignment`]: crate::allocate::Assignment

mod bundle;
mod descriptor;

pub use bundle::{rewrite_packaged_archive, rewrite_unpacked_bundle};
pub use descriptor::{render_descriptor, rewrite_descriptor};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Options shared by every rewrite entry point.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions {
    /// Compute the summary without writing anything.
    pub dry_run: bool,
}

/// One rewritten value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Configuration (`Runner [Release]`) or metadata path.
    pub location: String,
    pub target: String,
    pub from: Option<String>,
    pub to: String,
}

/// Outcome of one rewrite.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteSummary {
    pub path: PathBuf,
    pub changes: Vec<Change>,
    /// Components no target could be matched to; left untouched.
    pub unmatched: Vec<String>,
    pub backup: Option<PathBuf>,
    pub dry_run: bool,
}

impl RewriteSummary {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for RewriteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would change" } else { "changed" };
        writeln!(
            f,
            "{}: {verb} {} value(s)",
            self.path.display(),
            self.changes.len()
        )?;
        for change in &self.changes {
            writeln!(
                f,
                "  {} ({}): {} -> {}",
                change.location,
                change.target,
                change.from.as_deref().unwrap_or("<none>"),
                change.to
            )?;
        }
        for path in &self.unmatched {
            writeln!(f, "  unmatched: {path}")?;
        }
        if let Some(backup) = &self.backup {
            writeln!(f, "  backup: {}", backup.display())?;
        }
        Ok(())
    }
}
