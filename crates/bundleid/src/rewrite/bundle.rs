use super::{Change, RewriteOptions, RewriteSummary};
use crate::allocate::Assignment;
use crate::bundle::{self, patch_metadata, DirectoryStore, MetadataPatch, MetadataStore};
use crate::classify::Role;
use crate::descriptor::Descriptor;
use crate::identifier::BundleId;
use crate::ipa::ArchiveStore;
use crate::Result;
use std::path::Path;

/// Rewrite the component metadata of a built `.app` directory.
///
/// `descriptor` is the target graph `assignment` was computed from: either
/// the project descriptor or the one synthesized from the bundle itself.
pub fn rewrite_unpacked_bundle(
    path: impl AsRef<Path>,
    descriptor: &Descriptor,
    assignment: &Assignment,
    options: RewriteOptions,
) -> Result<RewriteSummary> {
    let store = DirectoryStore::open(path)?;
    rewrite_store(store, descriptor, assignment, options)
}

/// Rewrite the component metadata inside a packaged `.ipa`.
pub fn rewrite_packaged_archive(
    path: impl AsRef<Path>,
    descriptor: &Descriptor,
    assignment: &Assignment,
    options: RewriteOptions,
) -> Result<RewriteSummary> {
    let store = ArchiveStore::open(path)?;
    rewrite_store(store, descriptor, assignment, options)
}

fn rewrite_store<S: MetadataStore>(
    mut store: S,
    descriptor: &Descriptor,
    assignment: &Assignment,
    options: RewriteOptions,
) -> Result<RewriteSummary> {
    let components = bundle::scan(&mut store)?;
    let main_target = descriptor.targets.iter().position(|t| {
        assignment
            .target(&t.id)
            .is_some_and(|a| a.role == Role::Main)
    });
    let matches = bundle::match_components(&components, descriptor, main_target);

    // identifier each component ends up with, `None` when left untouched
    let identifiers: Vec<Option<&BundleId>> = matches
        .iter()
        .map(|&found| {
            found
                .and_then(|i| assignment.target(&descriptor.targets[i].id))
                .and_then(|a| a.identifier.as_ref())
        })
        .collect();
    let main_identifier = assignment.main().and_then(|m| m.identifier.as_ref());

    let mut summary = RewriteSummary {
        path: store.location().to_path_buf(),
        dry_run: options.dry_run,
        ..RewriteSummary::default()
    };

    for (index, component) in components.iter().enumerate() {
        let Some(target) = matches[index] else {
            tracing::warn!(component = %component.path, "no target matches component, left untouched");
            summary.unmatched.push(component.path.clone());
            continue;
        };
        let Some(identifier) = identifiers[index] else {
            continue;
        };

        // a watch extension points at the watch app that embeds it
        let watch_app = if component.is_watch_extension() {
            components
                .iter()
                .zip(&identifiers)
                .find(|(app, _)| {
                    app.is_watch_app() && component.path.starts_with(&format!("{}/", app.path))
                })
                .and_then(|(_, id)| *id)
        } else {
            None
        };
        let patch = MetadataPatch {
            identifier,
            companion_app: main_identifier.filter(|_| component.is_watch_app()),
            watch_app,
        };

        let bytes = store.read(&component.metadata_path)?;
        let Some(patched) = patch_metadata(&bytes, &patch, Path::new(&component.metadata_path))?
        else {
            continue;
        };
        tracing::debug!(
            component = %component.path,
            from = ?component.info.identifier,
            to = %identifier,
            "metadata patched"
        );
        summary.changes.push(Change {
            location: component.metadata_path.clone(),
            target: descriptor.targets[target].name.clone(),
            from: component.info.identifier.clone(),
            to: identifier.to_string(),
        });
        store.stage(&component.metadata_path, patched);
    }

    if summary.is_noop() {
        tracing::info!(location = %summary.path.display(), "bundle metadata already up to date");
    } else if !options.dry_run {
        summary.backup = store.commit()?;
        tracing::info!(
            location = %summary.path.display(),
            changes = summary.changes.len(),
            "bundle metadata rewritten"
        );
    }
    Ok(summary)
}
