//! Archive Reader (spec §4.A): random access into a scene's zip archive.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use wallpaperd_error::WdError;

/// A scene archive opened read-only. Dropping it closes the underlying file.
pub struct ArchiveReader {
    archive: zip::ZipArchive<File>,
    source: String,
}

impl ArchiveReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WdError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| WdError::ArchiveOpen(format!("{}: {e}", path.display())))?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| WdError::ArchiveOpen(format!("{}: {e}", path.display())))?;
        Ok(Self {
            archive,
            source: path.display().to_string(),
        })
    }

    /// Read one entry's full decompressed bytes.
    ///
    /// Entry paths are absolute within the archive on the wire (spec §3); the
    /// zip central directory stores them without a leading slash, so it is
    /// stripped before lookup.
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>, WdError> {
        let name = path.trim_start_matches('/');
        let mut entry = self.archive.by_name(name).map_err(|_| {
            WdError::ArchiveMissingEntry(format!("{}: no entry named '{}'", self.source, path))
        })?;

        let declared_size = entry.size();
        let mut buf = Vec::with_capacity(declared_size as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| WdError::ArchiveIo(format!("{}: reading '{}': {e}", self.source, path)))?;

        // Entries whose decompressed size could not be determined ahead of
        // time (streaming data-descriptor entries) are out of scope; detect
        // the mismatch and reject rather than silently serve a short read.
        if declared_size != 0 && buf.len() as u64 != declared_size {
            return Err(WdError::ArchiveIo(format!(
                "{}: '{}' has unknown/mismatched decompressed size",
                self.source, path
            )));
        }

        Ok(buf)
    }

    /// `true` if `path` names an entry in this archive.
    pub fn contains(&mut self, path: &str) -> bool {
        let name = path.trim_start_matches('/');
        self.archive.by_name(name).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct ScratchFile {
        path: std::path::PathBuf,
    }

    impl Drop for ScratchFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn make_test_archive(entries: &[(&str, &[u8])]) -> ScratchFile {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let mut path = std::env::temp_dir();
        path.push(format!(
            "wallpaperd-archive-test-{}-{}.zip",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options =
            zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        ScratchFile { path }
    }

    #[test]
    fn reads_known_entry() {
        let file = make_test_archive(&[("scene.wasm", b"not actually wasm")]);
        let mut reader = ArchiveReader::open(&file.path).unwrap();
        let bytes = reader.read("scene.wasm").unwrap();
        assert_eq!(bytes, b"not actually wasm");
    }

    #[test]
    fn absolute_path_is_normalised() {
        let file = make_test_archive(&[("shaders/tri.spv", b"\x03\x02\x23\x07")]);
        let mut reader = ArchiveReader::open(&file.path).unwrap();
        let bytes = reader.read("/shaders/tri.spv").unwrap();
        assert_eq!(bytes, b"\x03\x02\x23\x07");
    }

    #[test]
    fn missing_entry_is_archive_missing_entry() {
        let file = make_test_archive(&[("scene.wasm", b"x")]);
        let mut reader = ArchiveReader::open(&file.path).unwrap();
        let err = reader.read("not-there.bin").unwrap_err();
        assert!(matches!(err, WdError::ArchiveMissingEntry(_)));
    }

    #[test]
    fn missing_archive_file_is_archive_open() {
        let err = ArchiveReader::open("/nonexistent/path/does-not-exist.zip").unwrap_err();
        assert!(matches!(err, WdError::ArchiveOpen(_)));
    }
}
