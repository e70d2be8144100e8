//! Update archive handling
//!
//! Update packages are plain zip files with a `version.json` manifest at
//! their root. This module checks that an upload looks like a zip, pulls the
//! manifest out of it, and writes new archives for the package generator.

use std::io::{Cursor, Read, Write};

use updist_schema::{MANIFEST_ENTRY, Manifest, ManifestError};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Largest manifest entry we are willing to decompress.
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Local file header and empty-archive (end of central directory) signatures.
const ZIP_SIGNATURES: [&[u8; 4]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Returns `true` if the upload is named like a zip and starts with a zip signature.
pub fn is_zip_archive(filename: &str, bytes: &[u8]) -> bool {
    let named_zip = filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("zip"));

    named_zip && ZIP_SIGNATURES.iter().any(|sig| bytes.starts_with(*sig))
}

/// Extract and validate the manifest of an update archive.
///
/// # Errors
///
/// - [`ManifestError::Malformed`] if the bytes are not a readable zip or the
///   manifest is not JSON of the right shape
/// - [`ManifestError::Missing`] if there is no `version.json` at the root
/// - [`ManifestError::Invalid`] if a field fails validation
pub fn read_manifest(bytes: &[u8]) -> Result<Manifest, ManifestError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ManifestError::Malformed(format!("not a zip archive: {e}")))?;

    let entry = match archive.by_name(MANIFEST_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ManifestError::Missing),
        Err(e) => return Err(ManifestError::Malformed(e.to_string())),
    };

    let mut raw = Vec::new();
    entry
        .take(MAX_MANIFEST_BYTES + 1)
        .read_to_end(&mut raw)
        .map_err(|e| ManifestError::Malformed(e.to_string()))?;

    if raw.len() as u64 > MAX_MANIFEST_BYTES {
        return Err(ManifestError::Malformed(format!(
            "{MANIFEST_ENTRY} exceeds {MAX_MANIFEST_BYTES} bytes"
        )));
    }

    Manifest::from_json(&raw)
}

/// Build a deflated zip archive from `(name, contents)` pairs, in order.
///
/// # Errors
///
/// Returns the underlying zip error if an entry cannot be written.
pub fn write_archive<'a, I>(entries: I) -> Result<Vec<u8>, ZipError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, contents) in entries {
        writer.start_file(name, options)?;
        writer.write_all(contents)?;
    }

    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &[u8] =
        br#"{"version":"1.2.0","changelog":"fixes","minimumClientVersion":"1.0.0"}"#;

    #[test]
    fn reads_manifest_from_root() {
        let zip = write_archive([(MANIFEST_ENTRY, MANIFEST), ("app/main.js", b"x".as_slice())])
            .unwrap();
        let manifest = read_manifest(&zip).unwrap();
        assert_eq!(manifest.version, "1.2.0");
    }

    #[test]
    fn nested_manifest_is_missing() {
        let zip = write_archive([("nested/version.json", MANIFEST)]).unwrap();
        assert_eq!(read_manifest(&zip), Err(ManifestError::Missing));
    }

    #[test]
    fn non_zip_bytes_are_malformed() {
        assert!(matches!(
            read_manifest(b"definitely not a zip"),
            Err(ManifestError::Malformed(_))
        ));
    }

    #[test]
    fn bad_json_inside_zip_is_malformed() {
        let zip = write_archive([(MANIFEST_ENTRY, b"{ nope".as_slice())]).unwrap();
        assert!(matches!(read_manifest(&zip), Err(ManifestError::Malformed(_))));
    }

    #[test]
    fn invalid_field_propagates() {
        let zip = write_archive([(
            MANIFEST_ENTRY,
            br#"{"version":"1.2","changelog":"x","minimumClientVersion":"1.0.0"}"#.as_slice(),
        )])
        .unwrap();
        assert!(matches!(
            read_manifest(&zip),
            Err(ManifestError::Invalid { field: "version", .. })
        ));
    }

    #[test]
    fn zip_detection_needs_name_and_signature() {
        let zip = write_archive([(MANIFEST_ENTRY, MANIFEST)]).unwrap();
        assert!(is_zip_archive("update-1.2.0.zip", &zip));
        assert!(is_zip_archive("UPDATE.ZIP", &zip));
        assert!(!is_zip_archive("update.tar.gz", &zip));
        assert!(!is_zip_archive(".zip", &zip));
        assert!(!is_zip_archive("update.zip", b"%PDF-1.7"));
    }
}
