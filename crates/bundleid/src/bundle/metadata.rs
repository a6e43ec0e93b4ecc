//! `Info.plist` reading and patching.
//!
//! [`patch_metadata`] is the single routine that rewrites a component's
//! metadata document, whether the document came from a directory walk or
//! from an archive entry. The document keeps its property list format: a
//! binary plist is written back as binary, an XML plist as XML.

use crate::identifier::BundleId;
use crate::{Error, Result};
use plist::{Dictionary, Value};
use std::io::Cursor;
use std::path::Path;

pub const BUNDLE_ID_KEY: &str = "CFBundleIdentifier";
pub const EXECUTABLE_KEY: &str = "CFBundleExecutable";
pub const NAME_KEY: &str = "CFBundleName";
/// Set in a watch app, names the iPhone app it belongs to.
pub const COMPANION_KEY: &str = "WKCompanionAppBundleIdentifier";
/// Set in a watch extension's `NSExtensionAttributes`, names its watch app.
pub const WATCH_APP_KEY: &str = "WKAppBundleIdentifier";

const BINARY_MAGIC: &[u8] = b"bplist00";

/// Keys of interest read from one metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleInfo {
    pub identifier: Option<String>,
    pub executable: Option<String>,
    pub name: Option<String>,
    pub extension_point: Option<String>,
    /// Declares itself a watch app (`WKWatchKitApp` or `WKApplication`).
    pub watch_app: bool,
}

/// Values to write into one metadata document.
#[derive(Debug, Clone, Copy)]
pub struct MetadataPatch<'a> {
    pub identifier: &'a BundleId,
    /// New value for `WKCompanionAppBundleIdentifier`, if the key exists.
    pub companion_app: Option<&'a BundleId>,
    /// New value for `NSExtension.NSExtensionAttributes.WKAppBundleIdentifier`,
    /// if the key exists.
    pub watch_app: Option<&'a BundleId>,
}

fn parse(bytes: &[u8], path: &Path) -> Result<Dictionary> {
    let value = Value::from_reader(Cursor::new(bytes)).map_err(|source| Error::Plist {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Dictionary(dict) => Ok(dict),
        _ => Err(Error::Metadata {
            path: path.to_path_buf(),
            reason: "root is not a dictionary".into(),
        }),
    }
}

fn string<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a str> {
    dict.get(key).and_then(Value::as_string)
}

/// Read the keys identifier resolution cares about.
///
/// `path` is only used in error messages.
pub fn read_info(bytes: &[u8], path: &Path) -> Result<BundleInfo> {
    let dict = parse(bytes, path)?;
    let extension_point = dict
        .get("NSExtension")
        .and_then(Value::as_dictionary)
        .and_then(|ext| string(ext, "NSExtensionPointIdentifier"))
        .map(str::to_string);
    let watch_app = dict
        .get("WKWatchKitApp")
        .or_else(|| dict.get("WKApplication"))
        .and_then(Value::as_boolean)
        .unwrap_or(false);

    Ok(BundleInfo {
        identifier: string(&dict, BUNDLE_ID_KEY).map(str::to_string),
        executable: string(&dict, EXECUTABLE_KEY).map(str::to_string),
        name: string(&dict, NAME_KEY).map(str::to_string),
        extension_point,
        watch_app,
    })
}

/// Apply `patch` to one metadata document.
///
/// Returns `None` when the document already carries every requested value,
/// so callers can skip the write entirely.
pub fn patch_metadata(bytes: &[u8], patch: &MetadataPatch<'_>, path: &Path) -> Result<Option<Vec<u8>>> {
    let mut dict = parse(bytes, path)?;
    let mut changed = set_string(&mut dict, BUNDLE_ID_KEY, patch.identifier, true);

    if let Some(companion) = patch.companion_app {
        changed |= set_string(&mut dict, COMPANION_KEY, companion, false);
    }

    if let Some(watch_app) = patch.watch_app {
        if let Some(attributes) = dict
            .get_mut("NSExtension")
            .and_then(Value::as_dictionary_mut)
            .and_then(|ext| ext.get_mut("NSExtensionAttributes"))
            .and_then(Value::as_dictionary_mut)
        {
            changed |= set_string(attributes, WATCH_APP_KEY, watch_app, false);
        }
    }

    if !changed {
        return Ok(None);
    }

    let value = Value::Dictionary(dict);
    let mut out = Vec::with_capacity(bytes.len() + 64);
    let written = if bytes.starts_with(BINARY_MAGIC) {
        value.to_writer_binary(&mut out)
    } else {
        value.to_writer_xml(&mut out)
    };
    written.map_err(|source| Error::Plist {
        path: path.to_path_buf(),
        source,
    })?;
    if !bytes.starts_with(BINARY_MAGIC) && bytes.ends_with(b"\n") && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    Ok(Some(out))
}

/// Set `key` to `value`. Missing keys are only added when `insert` is set.
fn set_string(dict: &mut Dictionary, key: &str, value: &BundleId, insert: bool) -> bool {
    match dict.get(key).and_then(Value::as_string) {
        Some(current) if current == value.as_str() => false,
        None if !insert && !dict.contains_key(key) => false,
        _ => {
            dict.insert(key.to_string(), Value::String(value.to_string()));
            true
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> BundleId {
        BundleId::parse(value).unwrap()
    }

    fn only_identifier(identifier: &BundleId) -> MetadataPatch<'_> {
        MetadataPatch {
            identifier,
            companion_app: None,
            watch_app: None,
        }
    }

    #[test]
    fn test_non_dictionary_root_rejected() {
        let bytes = br#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<array>
	<string>com.a.b</string>
</array>
</plist>
"#;
        let err = read_info(bytes, Path::new("Payload/Runner.app/Info.plist")).unwrap_err();
        assert!(matches!(err, Error::Metadata { ref path, .. } if path.ends_with("Info.plist")));
        assert_eq!(err.exit_code(), 2);
        assert!(patch_metadata(bytes, &only_identifier(&id("com.a.c")), Path::new("Info.plist")).is_err());
    }

    #[test]
    fn test_read_info() {
        let bytes = fixtures::extension_plist("com.a.b", "Share", "com.apple.share-services");
        let info = read_info(&bytes, Path::new("Info.plist")).unwrap();
        assert_eq!(info.identifier.as_deref(), Some("com.a.b"));
        assert_eq!(info.executable.as_deref(), Some("Share"));
        assert_eq!(info.extension_point.as_deref(), Some("com.apple.share-services"));
        assert!(!info.watch_app);
    }

    #[test]
    fn test_patch_xml_keeps_other_keys() {
        let bytes = fixtures::info_plist("com.old.app", "Runner");
        let new_id = id("com.acme.app");
        let out = patch_metadata(&bytes, &only_identifier(&new_id), Path::new("Info.plist"))
            .unwrap()
            .unwrap();
        assert!(out.starts_with(b"<?xml"));
        let info = read_info(&out, Path::new("Info.plist")).unwrap();
        assert_eq!(info.identifier.as_deref(), Some("com.acme.app"));
        assert_eq!(info.executable.as_deref(), Some("Runner"));
    }

    #[test]
    fn test_patch_is_noop_when_current() {
        let bytes = fixtures::info_plist("com.acme.app", "Runner");
        let same = id("com.acme.app");
        let out = patch_metadata(&bytes, &only_identifier(&same), Path::new("Info.plist")).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_patch_keeps_binary_format() {
        let mut dict = Dictionary::new();
        dict.insert(BUNDLE_ID_KEY.into(), Value::String("com.old.app".into()));
        let mut bytes = Vec::new();
        Value::Dictionary(dict).to_writer_binary(&mut bytes).unwrap();

        let new_id = id("com.acme.app");
        let out = patch_metadata(&bytes, &only_identifier(&new_id), Path::new("Info.plist"))
            .unwrap()
            .unwrap();
        assert!(out.starts_with(BINARY_MAGIC));
        let info = read_info(&out, Path::new("Info.plist")).unwrap();
        assert_eq!(info.identifier.as_deref(), Some("com.acme.app"));
    }

    #[test]
    fn test_missing_identifier_is_added() {
        let bytes = b"<?xml version=\"1.0\"?><plist version=\"1.0\"><dict></dict></plist>";
        let new_id = id("com.acme.app");
        let out = patch_metadata(bytes, &only_identifier(&new_id), Path::new("Info.plist"))
            .unwrap()
            .unwrap();
        let info = read_info(&out, Path::new("Info.plist")).unwrap();
        assert_eq!(info.identifier.as_deref(), Some("com.acme.app"));
    }

    #[test]
    fn test_watch_app_reference_updated_only_when_present() {
        let bytes = fixtures::extension_plist("com.old.w.ext", "Ext", "com.apple.watchkit");
        let ext_id = id("com.acme.app.watchkitextension");
        let app_id = id("com.acme.app.watchkitapp");
        let patch = MetadataPatch {
            identifier: &ext_id,
            companion_app: Some(&app_id),
            watch_app: Some(&app_id),
        };
        let out = patch_metadata(&bytes, &patch, Path::new("Info.plist"))
            .unwrap()
            .unwrap();
        let dict = parse(&out, Path::new("Info.plist")).unwrap();
        let attributes = dict
            .get("NSExtension")
            .and_then(Value::as_dictionary)
            .and_then(|e| e.get("NSExtensionAttributes"))
            .and_then(Value::as_dictionary)
            .unwrap();
        assert_eq!(
            attributes.get(WATCH_APP_KEY).and_then(Value::as_string),
            Some("com.acme.app.watchkitapp")
        );
        // the companion key did not exist and is not invented
        assert!(!dict.contains_key(COMPANION_KEY));
    }

    #[test]
    fn test_malformed_plist() {
        let new_id = id("com.acme.app");
        let err = patch_metadata(b"not a plist", &only_identifier(&new_id), Path::new("X/Info.plist"))
            .unwrap_err();
        assert!(err.to_string().contains("X/Info.plist"));
    }
}
