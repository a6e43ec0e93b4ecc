//! Packaged archive (`.ipa`) handling.
//!
//! An IPA is a ZIP archive with exactly one application bundle under
//! `Payload/`. [`ArchiveStore`] reads component metadata straight from the
//! memory-mapped archive and, on commit, writes a new archive next to the
//! original:
//!
//! - patched `Info.plist` entries are recompressed with their original
//!   method, permissions and timestamp;
//! - every other entry is copied raw, without recompression;
//! - entry order is preserved.
//!
//! The new archive is reopened and checked before it replaces the original,
//! and the original is kept as a timestamped backup.
//!
//! # Examples
//!
//! ```no_run
//! use bundleid::bundle::{self, MetadataStore};
//! use bundleid::ipa::ArchiveStore;
//!
//! let mut store = ArchiveStore::open("Runner.ipa")?;
//! let components = bundle::scan(&mut store)?;
//! println!("{} components in {}", components.len(), store.app_entry());
//! # Ok::<(), bundleid::Error>(())
//! ```

use crate::bundle::{Component, MetadataStore};
use crate::fs::{backup, persist, sibling_temp};
use crate::{Error, Result};
use memmap2::Mmap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const PAYLOAD: &str = "Payload/";

/// A packaged application archive.
pub struct ArchiveStore {
    path: PathBuf,
    archive: ZipArchive<Cursor<Mmap>>,
    /// `Payload/<App>.app`
    app: String,
    staged: BTreeMap<String, Vec<u8>>,
}

impl ArchiveStore {
    /// Open and validate an archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] unless the archive holds exactly one
    /// `.app` directly under `Payload/`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_ipa(path)?;

        let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
        // The original is never written in place; rewrites go through a
        // sibling file and a rename.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io_at(path, e))?;
        let archive = ZipArchive::new(Cursor::new(mmap))?;
        let app = payload_app(&archive, path)?;
        tracing::debug!(archive = %path.display(), app = %app, entries = archive.len(), "opened archive");

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            app,
            staged: BTreeMap::new(),
        })
    }

    /// Archive path of the application bundle, e.g. `Payload/Runner.app`.
    pub fn app_entry(&self) -> &str {
        &self.app
    }
}

impl MetadataStore for ArchiveStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn metadata_paths(&mut self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.app);
        let mut paths: Vec<String> = self
            .archive
            .file_names()
            .filter(|name| name.starts_with(&prefix) && Component::locate(name).is_some())
            .map(str::to_string)
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(path)?;
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|e| Error::io_at(&self.path, e))?;
        Ok(contents)
    }

    fn stage(&mut self, path: &str, contents: Vec<u8>) {
        self.staged.insert(path.to_string(), contents);
    }

    fn commit(self) -> Result<Option<PathBuf>> {
        let ArchiveStore {
            path,
            mut archive,
            staged,
            ..
        } = self;
        if staged.is_empty() {
            return Ok(None);
        }

        let mut temp = sibling_temp(&path)?;
        let entries = archive.len();
        {
            let mut writer = ZipWriter::new(temp.as_file_mut());
            for i in 0..entries {
                let entry = archive.by_index_raw(i)?;
                match staged.get(entry.name()) {
                    Some(contents) => {
                        let name = entry.name().to_string();
                        let method = match entry.compression() {
                            CompressionMethod::Stored => CompressionMethod::Stored,
                            _ => CompressionMethod::Deflated,
                        };
                        let mut options = SimpleFileOptions::default().compression_method(method);
                        if let Some(mode) = entry.unix_mode() {
                            options = options.unix_permissions(mode);
                        }
                        if let Some(time) = entry.last_modified() {
                            options = options.last_modified_time(time);
                        }
                        writer.start_file(name, options)?;
                        writer
                            .write_all(contents)
                            .map_err(|e| Error::io_at(&path, e))?;
                    }
                    None => writer.raw_copy_file(entry)?,
                }
            }
            let file = writer.finish()?;
            file.sync_all().map_err(|e| Error::io_at(&path, e))?;
        }
        drop(archive);

        verify(temp.path(), entries, &staged).map_err(|reason| {
            Error::archive(&path, format!("rewritten archive failed verification: {reason}"))
        })?;

        let saved = backup(&path)?;
        persist(temp, &path)?;
        tracing::info!(
            archive = %path.display(),
            patched = staged.len(),
            backup = %saved.display(),
            "archive rewritten"
        );
        Ok(Some(saved))
    }
}

/// Reopen a freshly written archive and compare the patched entries.
fn verify(path: &Path, entries: usize, staged: &BTreeMap<String, Vec<u8>>) -> std::result::Result<(), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;
    if archive.len() != entries {
        return Err(format!("{} entries, expected {entries}", archive.len()));
    }
    for (name, expected) in staged {
        let mut entry = archive.by_name(name).map_err(|e| format!("{name}: {e}"))?;
        let mut actual = Vec::new();
        entry
            .read_to_end(&mut actual)
            .map_err(|e| format!("{name}: {e}"))?;
        if &actual != expected {
            return Err(format!("{name}: content mismatch"));
        }
    }
    Ok(())
}

/// The single `Payload/<App>.app` directory of an archive.
fn payload_app<R: Read + io::Seek>(archive: &ZipArchive<R>, path: &Path) -> Result<String> {
    let mut payload_seen = false;
    let mut apps = BTreeSet::new();
    for name in archive.file_names() {
        let Some(rest) = name.strip_prefix(PAYLOAD) else {
            continue;
        };
        payload_seen = true;
        if let Some((top, _)) = rest.split_once('/') {
            if top.ends_with(".app") {
                apps.insert(top.to_string());
            }
        }
    }

    if !payload_seen {
        return Err(Error::archive(path, "no Payload/ directory"));
    }
    let mut apps = apps.into_iter();
    match (apps.next(), apps.next()) {
        (Some(app), None) => Ok(format!("{PAYLOAD}{app}")),
        (None, _) => Err(Error::archive(path, "no .app bundle found in Payload/")),
        (Some(first), Some(second)) => Err(Error::archive(
            path,
            format!("more than one .app bundle in Payload/ ({first}, {second})"),
        )),
    }
}

/// Validate that a path is a ZIP file.
///
/// Checks that the file exists and starts with the `PK` signature.
pub fn validate_ipa(ipa_path: impl AsRef<Path>) -> Result<()> {
    let ipa_path = ipa_path.as_ref();

    if !ipa_path.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("IPA file not found: {}", ipa_path.display()),
        )));
    }

    let mut file = File::open(ipa_path).map_err(|e| Error::io_at(ipa_path, e))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic[0..2] != b"PK" {
        return Err(Error::archive(ipa_path, "not a ZIP archive"));
    }

    Ok(())
}
