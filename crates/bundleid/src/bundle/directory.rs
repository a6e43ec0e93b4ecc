//! Unpacked bundle directories.

use super::{Component, MetadataStore, INFO_PLIST};
use crate::fs::{persist, write_temp};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A built `.app` on disk.
///
/// Opening accepts the `.app` itself, an unpacked archive root holding
/// `Payload/<App>.app`, or a build products directory with exactly one
/// `.app` in it.
#[derive(Debug)]
pub struct DirectoryStore {
    /// Directory containing the application bundle.
    root: PathBuf,
    app: PathBuf,
    staged: BTreeMap<String, Vec<u8>>,
}

impl DirectoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let app = find_app_bundle(path.as_ref())?;
        let root = app
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            root,
            app,
            staged: BTreeMap::new(),
        })
    }

    /// The application bundle directory.
    pub fn app_path(&self) -> &Path {
        &self.app
    }
}

impl MetadataStore for DirectoryStore {
    fn location(&self) -> &Path {
        &self.app
    }

    fn metadata_paths(&mut self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.app).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.app.clone());
                Error::io_at(path, io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() || entry.file_name() != INFO_PLIST {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if Component::locate(&relative).is_some() {
                paths.push(relative);
            }
        }
        Ok(paths)
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        fs::read(&full).map_err(|e| Error::io_at(full, e))
    }

    fn stage(&mut self, path: &str, contents: Vec<u8>) {
        self.staged.insert(path.to_string(), contents);
    }

    /// Every staged document is written to a temporary file first; the
    /// originals are only replaced once all of them are on disk.
    fn commit(self) -> Result<Option<PathBuf>> {
        let mut pending = Vec::with_capacity(self.staged.len());
        for (path, contents) in &self.staged {
            let full = self.root.join(path);
            let temp = write_temp(&full, contents)?;
            pending.push((path, full, temp));
        }

        let mut replaced: Vec<&str> = Vec::with_capacity(pending.len());
        for (path, full, temp) in pending {
            if let Err(e) = persist(temp, &full) {
                tracing::error!(
                    failed = %path,
                    replaced = %replaced.join(", "),
                    "bundle left partially rewritten"
                );
                return Err(e);
            }
            tracing::debug!(path = %path, "metadata rewritten");
            replaced.push(path);
        }
        Ok(None)
    }
}

/// Locate the application bundle for `path`.
fn find_app_bundle(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Bundle not found: {}", path.display()),
        )));
    }

    if path.is_dir() && path.extension().is_some_and(|ext| ext == "app") {
        return Ok(path.to_path_buf());
    }

    let payload = path.join("Payload");
    let search = if payload.is_dir() { payload } else { path.to_path_buf() };

    let mut apps = Vec::new();
    for entry in fs::read_dir(&search).map_err(|e| Error::io_at(&search, e))? {
        let entry = entry.map_err(|e| Error::io_at(&search, e))?;
        let candidate = entry.path();
        if candidate.is_dir() && candidate.extension().is_some_and(|ext| ext == "app") {
            apps.push(candidate);
        }
    }

    match apps.len() {
        1 => Ok(apps.remove(0)),
        0 => Err(Error::archive(search, "no .app bundle found")),
        n => Err(Error::archive(
            search,
            format!("{n} .app bundles found, expected exactly one"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::metadata::fixtures::info_plist;
    use crate::bundle::scan;
    use tempfile::TempDir;

    fn write_app(root: &Path) -> PathBuf {
        let app = root.join("Runner.app");
        let ext = app.join("PlugIns/Share.appex");
        fs::create_dir_all(&ext).unwrap();
        fs::create_dir_all(app.join("Settings.bundle")).unwrap();
        fs::write(app.join("Info.plist"), info_plist("com.example.app", "Runner")).unwrap();
        fs::write(ext.join("Info.plist"), info_plist("com.example.app", "Share")).unwrap();
        fs::write(app.join("Settings.bundle/Info.plist"), b"ignored").unwrap();
        app
    }

    #[test]
    fn test_open_app_directly() {
        let dir = TempDir::new().unwrap();
        let app = write_app(dir.path());
        let store = DirectoryStore::open(&app).unwrap();
        assert_eq!(store.app_path(), app);
    }

    #[test]
    fn test_open_unpacked_payload() {
        let dir = TempDir::new().unwrap();
        let payload = dir.path().join("Payload");
        fs::create_dir_all(&payload).unwrap();
        let app = write_app(&payload);
        let store = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(store.app_path(), app);
    }

    #[test]
    fn test_open_rejects_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = DirectoryStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }

    #[test]
    fn test_open_not_found() {
        assert!(DirectoryStore::open("/nonexistent/Runner.app").is_err());
    }

    #[test]
    fn test_scan_finds_components() {
        let dir = TempDir::new().unwrap();
        let app = write_app(dir.path());
        let mut store = DirectoryStore::open(&app).unwrap();
        let components = scan(&mut store).unwrap();
        let paths: Vec<_> = components.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["Runner.app", "Runner.app/PlugIns/Share.appex"]);
        assert_eq!(components[1].info.executable.as_deref(), Some("Share"));
    }

    #[test]
    fn test_commit_writes_staged_only() {
        let dir = TempDir::new().unwrap();
        let app = write_app(dir.path());
        let mut store = DirectoryStore::open(&app).unwrap();
        store.stage("Runner.app/Info.plist", b"patched".to_vec());
        assert_eq!(store.commit().unwrap(), None);
        assert_eq!(fs::read(app.join("Info.plist")).unwrap(), b"patched");
        assert_eq!(
            fs::read(app.join("PlugIns/Share.appex/Info.plist")).unwrap(),
            info_plist("com.example.app", "Share")
        );
    }

    #[test]
    fn test_failed_commit_replaces_nothing() {
        let dir = TempDir::new().unwrap();
        let app = write_app(dir.path());
        let mut store = DirectoryStore::open(&app).unwrap();
        store.stage("Runner.app/Info.plist", b"patched".to_vec());
        // no such directory, so no temporary file can be created for it
        store.stage("Runner.app/Missing.appex/Info.plist", b"patched".to_vec());

        assert!(store.commit().is_err());
        assert_eq!(
            fs::read(app.join("Info.plist")).unwrap(),
            info_plist("com.example.app", "Runner")
        );
        let leftovers = fs::read_dir(&app)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
