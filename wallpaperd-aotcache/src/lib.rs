//! AOT Cache (spec §4.B): a per-user store of precompiled module artifacts
//! keyed by the FNV-1a-64 hash of the module's bytes.
//!
//! This crate owns the cache directory layout, key derivation, and the
//! precompilation call itself (`wasmtime::Engine::precompile_module`, the
//! same serialized-module format `Module::deserialize` expects on load). It
//! deliberately does *not* know how to validate that a cached artifact is
//! actually loadable by the sandbox runtime — that's `wallpaperd-sandbox`'s
//! job (spec §4.F: "readers that cannot load a cached artifact discard it
//! and re-compile"). This crate exposes [`AotCache::invalidate`] for exactly
//! that callback.

use std::fs;
use std::path::{Path, PathBuf};

use wallpaperd_error::WdError;
use wasmtime::Engine;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a, 64-bit variant, over `data`.
pub fn fnv1a64(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Cache key: zero-padded, 16 lowercase hex digits (spec §3 AOT Artifact).
pub fn cache_key(module_bytes: &[u8]) -> String {
    format!("{:016x}", fnv1a64(module_bytes))
}

pub struct AotCache {
    aot_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl AotCache {
    /// Derive `<user-cache-root>/aot` and `<user-cache-root>/tmp` beneath the
    /// OS cache directory and make sure both exist.
    pub fn new() -> Result<Self, WdError> {
        let base = directories::BaseDirs::new().ok_or_else(|| {
            WdError::AotCompileFailed("could not determine user cache directory".into())
        })?;
        let cache_root = base.cache_dir().join("wallpaperd");
        Self::at(cache_root)
    }

    /// Like [`Self::new`] but with an explicit cache root; used by tests.
    pub fn at(cache_root: impl Into<PathBuf>) -> Result<Self, WdError> {
        let cache_root = cache_root.into();
        let aot_dir = cache_root.join("aot");
        let tmp_dir = cache_root.join("tmp");
        fs::create_dir_all(&aot_dir)
            .map_err(|e| WdError::AotCompileFailed(format!("creating {}: {e}", aot_dir.display())))?;
        fs::create_dir_all(&tmp_dir)
            .map_err(|e| WdError::AotCompileFailed(format!("creating {}: {e}", tmp_dir.display())))?;
        Ok(Self { aot_dir, tmp_dir })
    }

    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.aot_dir.join(format!("{key}.aot"))
    }

    /// Return the cached artifact's bytes if the file exists and can be read.
    /// Never errors: a missing or unreadable cache entry is the ordinary
    /// cache-miss path, not a failure (spec §4.B).
    pub fn try_load(&self, module_bytes: &[u8]) -> Option<Vec<u8>> {
        let path = self.artifact_path(&cache_key(module_bytes));
        match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                log::warn!("aot cache entry {} is empty, discarding", path.display());
                None
            }
            Err(_) => None,
        }
    }

    /// Delete a corrupt/unloadable cached artifact so the next run recompiles
    /// from scratch (spec §5: readers that encounter a corrupt artifact delete it).
    pub fn invalidate(&self, module_bytes: &[u8]) {
        let path = self.artifact_path(&cache_key(module_bytes));
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove corrupt aot artifact {}: {e}", path.display());
            }
        }
    }

    /// Compile `module_bytes` fresh via `engine`'s precompiler and persist
    /// the result into the canonical cache path, returning the artifact's
    /// bytes. `engine` must be the same `wasmtime::Engine` (same target,
    /// same `Config`) the sandbox host will later deserialize artifacts
    /// with; a mismatched engine produces bytes `Module::deserialize`
    /// rejects, which the caller's invalidate-on-failure path handles.
    ///
    /// On any failure this returns `Err(WdError::AotCompileFailed)`, which the
    /// caller is expected to treat as non-fatal and fall back to the original
    /// module bytes (spec §4.B, §7).
    pub fn compile(&self, engine: &Engine, module_bytes: &[u8]) -> Result<Vec<u8>, WdError> {
        let key = cache_key(module_bytes);
        let tmp_aot = self.tmp_dir.join(format!("{key}.tmp-aot"));

        let compiled = engine
            .precompile_module(module_bytes)
            .map_err(|e| WdError::AotCompileFailed(format!("precompile failed: {e}")))?;

        fs::write(&tmp_aot, &compiled)
            .map_err(|e| WdError::AotCompileFailed(format!("writing {}: {e}", tmp_aot.display())))?;

        let final_path = self.artifact_path(&key);
        // Rename, not copy: concurrent readers must see either the old file
        // or the new one, never a half-written artifact (spec §5).
        fs::rename(&tmp_aot, &final_path).map_err(|e| {
            WdError::AotCompileFailed(format!("renaming into {}: {e}", final_path.display()))
        })?;

        Ok(compiled)
    }

    pub fn aot_dir(&self) -> &Path {
        &self.aot_dir
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a64_matches_known_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn cache_key_is_zero_padded_16_hex() {
        let key = cache_key(b"");
        assert_eq!(key.len(), 16);
        assert_eq!(key, "cbf29ce484222325");
    }

    fn scratch_root(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("wallpaperd-aotcache-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn try_load_misses_until_compiled_and_present() {
        let root = scratch_root("roundtrip");
        let _ = fs::remove_dir_all(&root);
        let cache = AotCache::at(&root).unwrap();
        let module = b"pretend-wasm-bytes";

        assert!(cache.try_load(module).is_none());

        let key = cache_key(module);
        fs::write(cache.artifact_path(&key), b"pretend-aot-bytes").unwrap();

        assert_eq!(cache.try_load(module).unwrap(), b"pretend-aot-bytes");
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn invalidate_removes_corrupt_artifact() {
        let root = scratch_root("invalidate");
        let _ = fs::remove_dir_all(&root);
        let cache = AotCache::at(&root).unwrap();
        let module = b"other-module-bytes";
        let key = cache_key(module);
        fs::write(cache.artifact_path(&key), b"").unwrap();

        // Empty file reads back as a cache miss, matching a truncated artifact.
        assert!(cache.try_load(module).is_none());

        fs::write(cache.artifact_path(&key), b"garbage").unwrap();
        cache.invalidate(module);
        assert!(!cache.artifact_path(&key).exists());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn compile_persists_a_loadable_artifact() {
        let root = scratch_root("compile-roundtrip");
        let _ = fs::remove_dir_all(&root);
        let cache = AotCache::at(&root).unwrap();
        let engine = Engine::default();
        let wasm = wat::parse_str("(module)").unwrap();

        let compiled = cache.compile(&engine, &wasm).unwrap();
        assert_eq!(cache.try_load(&wasm).unwrap(), compiled);
        // Confirm `compile`'s output round-trips through the same loader the
        // sandbox host uses (spec §4.F).
        unsafe {
            wasmtime::Module::deserialize(&engine, &compiled).unwrap();
        }
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn compile_rejects_malformed_modules_recoverably() {
        let root = scratch_root("compile-malformed");
        let _ = fs::remove_dir_all(&root);
        let cache = AotCache::at(&root).unwrap();
        let engine = Engine::default();
        let err = cache.compile(&engine, b"not a wasm module").unwrap_err();
        assert!(err.is_recoverable());
        fs::remove_dir_all(&root).ok();
    }
}
