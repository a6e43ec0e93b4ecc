use super::{Change, RewriteOptions, RewriteSummary};
use crate::allocate::Assignment;
use crate::descriptor::writer::{self, Edit};
use crate::descriptor::{self, Descriptor};
use crate::fs::{atomic_write, backup};
use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Render `source` with every assigned identifier spliced in.
///
/// Returns the new text and the values that changed. Bytes outside the
/// changed identifier tokens are copied unchanged.
pub fn render_descriptor(source: &str, assignment: &Assignment) -> Result<(String, Vec<Change>)> {
    let parsed = Descriptor::parse(source)?;
    let mut edits = Vec::new();
    let mut changes = Vec::new();

    for target in &parsed.targets {
        for config in &target.configurations {
            let (Some(span), Some(assigned)) = (
                config.identifier_span,
                assignment.get(&target.id, &config.name),
            ) else {
                continue;
            };
            let current = config.bundle_identifier();
            if current == Some(assigned.as_str()) {
                continue;
            }
            edits.push(Edit {
                span,
                value: assigned.to_string(),
            });
            changes.push(Change {
                location: format!("{} [{}]", target.name, config.name),
                target: target.name.clone(),
                from: current.map(str::to_string),
                to: assigned.to_string(),
            });
        }
    }

    Ok((writer::apply(source, &edits), changes))
}

/// Rewrite the descriptor at `path` to match `assignment`.
///
/// `path` may be the `project.pbxproj` file or its `.xcodeproj` directory.
/// The original is copied to a timestamped backup before the new text is
/// renamed into place.
pub fn rewrite_descriptor(
    path: impl AsRef<Path>,
    assignment: &Assignment,
    options: RewriteOptions,
) -> Result<RewriteSummary> {
    let path = descriptor::resolve_path(path.as_ref());
    let source = fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
    let (rendered, changes) = render_descriptor(&source, assignment)?;

    let mut summary = RewriteSummary {
        path: path.clone(),
        changes,
        dry_run: options.dry_run,
        ..RewriteSummary::default()
    };
    if summary.is_noop() {
        tracing::info!(descriptor = %path.display(), "descriptor already up to date");
        return Ok(summary);
    }
    if options.dry_run {
        return Ok(summary);
    }

    summary.backup = Some(backup(&path)?);
    atomic_write(&path, rendered.as_bytes())?;
    tracing::info!(
        descriptor = %path.display(),
        changes = summary.changes.len(),
        "descriptor rewritten"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocate::allocate;
    use crate::classify::classify_all;
    use crate::config::Overrides;
    use crate::descriptor::fixtures::runner_project;
    use tempfile::TempDir;

    fn assignment_for(source: &str, base: &str) -> Assignment {
        let descriptor = Descriptor::parse(source).unwrap();
        let overrides = Overrides::default();
        let classes = classify_all(&descriptor, &overrides).unwrap();
        allocate(&descriptor, base, &classes, &overrides).unwrap()
    }

    #[test]
    fn test_render_changes_only_identifier_lines() {
        let source = runner_project();
        let assignment = assignment_for(&source, "com.acme.app");
        let (rendered, changes) = render_descriptor(&source, &assignment).unwrap();

        // the main target leaves the template identifier as well
        assert_eq!(changes.len(), 6);
        let differing: Vec<(&str, &str)> = source
            .lines()
            .zip(rendered.lines())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(differing.len(), 6);
        assert!(differing
            .iter()
            .all(|(a, b)| a.contains("PRODUCT_BUNDLE_IDENTIFIER")
                && b.contains("PRODUCT_BUNDLE_IDENTIFIER")));
        assert_eq!(source.lines().count(), rendered.lines().count());
    }

    #[test]
    fn test_render_round_trip() {
        let source = runner_project();
        let assignment = assignment_for(&source, "com.acme.app");
        let (rendered, _) = render_descriptor(&source, &assignment).unwrap();

        let reparsed = Descriptor::parse(&rendered).unwrap();
        for target in &reparsed.targets {
            for config in &target.configurations {
                assert_eq!(
                    config.bundle_identifier(),
                    assignment.get(&target.id, &config.name).map(|id| id.as_str())
                );
            }
        }
    }

    #[test]
    fn test_rewrite_writes_backup_then_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("Runner.xcodeproj");
        fs::create_dir_all(&project).unwrap();
        let file = project.join("project.pbxproj");
        let source = runner_project();
        fs::write(&file, &source).unwrap();

        let assignment = assignment_for(&source, "com.acme.app");
        let first = rewrite_descriptor(&project, &assignment, RewriteOptions::default()).unwrap();
        assert_eq!(first.changes.len(), 6);
        let saved = first.backup.unwrap();
        assert_eq!(fs::read_to_string(&saved).unwrap(), source);

        let after_first = fs::read_to_string(&file).unwrap();
        let second = rewrite_descriptor(&file, &assignment, RewriteOptions::default()).unwrap();
        assert!(second.is_noop());
        assert!(second.backup.is_none());
        assert_eq!(fs::read_to_string(&file).unwrap(), after_first);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("project.pbxproj");
        let source = runner_project();
        fs::write(&file, &source).unwrap();

        let assignment = assignment_for(&source, "com.acme.app");
        let summary =
            rewrite_descriptor(&file, &assignment, RewriteOptions { dry_run: true }).unwrap();
        assert_eq!(summary.changes.len(), 6);
        assert!(summary.backup.is_none());
        assert_eq!(fs::read_to_string(&file).unwrap(), source);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
