//! Local binary discovery, naming and zip handling.

use crate::error::{ReleaseError, Result, TransportError};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

/// Extensions of the native libraries a publish picks up
pub const BINARY_EXTENSIONS: &[&str] = &["a", "dylib", "so", "dll", "lib"];

/// Link category of a native library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibCategory {
    /// `dll`, `so`, `dylib`
    Shared,
    /// `a`, `lib`
    Static,
}

impl LibCategory {
    /// Category from the file extension, if it is a library at all
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "dll" | "so" | "dylib" => Some(LibCategory::Shared),
            "a" | "lib" => Some(LibCategory::Static),
            _ => None,
        }
    }

    /// Name used in archive names
    pub fn as_str(&self) -> &'static str {
        match self {
            LibCategory::Shared => "shared",
            LibCategory::Static => "static",
        }
    }
}

impl fmt::Display for LibCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<package>-<target>-<category>.zip`
pub fn archive_name(package: &str, target: &str, category: LibCategory) -> String {
    format!("{package}-{target}-{category}.zip")
}

/// Target triple a binary was built for.
///
/// Binaries in a per-target build directory take the directory name with
/// `-ffi` dropped (`aarch64-apple-darwin-ffi/target/release/x.a` gives
/// `aarch64-apple-darwin`). Binaries directly under `working_dir` carry the
/// target after the first `-` of their stem (`libstatsig_ffi-x86_64.a` gives
/// `x86_64`).
pub fn derive_target(binary: &Path, working_dir: &Path) -> Result<String> {
    let relative = binary.strip_prefix(working_dir).unwrap_or(binary);
    let mut components = relative.components().filter_map(|c| match c {
        Component::Normal(part) => part.to_str(),
        _ => None,
    });

    let first = components.next().ok_or_else(|| invalid(binary, "empty path"))?;
    let target = if components.next().is_some() {
        first.replace("-ffi", "")
    } else {
        let stem = relative
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid(binary, "file name is not valid UTF-8"))?;
        match stem.split_once('-') {
            Some((_, target)) => target.to_string(),
            None => stem.to_string(),
        }
    };

    if target.is_empty() {
        return Err(invalid(binary, "could not derive a target"));
    }
    Ok(target)
}

fn invalid(path: &Path, reason: &str) -> ReleaseError {
    TransportError::InvalidArtifact {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

/// Every native library under `working_dir`, sorted
pub fn find_binaries(working_dir: &Path) -> Result<Vec<PathBuf>> {
    let root = glob::Pattern::escape(&working_dir.to_string_lossy());
    let mut found = Vec::new();

    for ext in BINARY_EXTENSIONS {
        let pattern = format!("{root}/**/*.{ext}");
        let paths = glob::glob(&pattern).map_err(|e| invalid(working_dir, &e.to_string()))?;
        for path in paths {
            let path = path.map_err(|e| invalid(working_dir, &e.to_string()))?;
            if path.is_file() {
                found.push(path);
            }
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

/// A native library and the archive it was zipped into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBinary {
    /// Source library
    pub binary: PathBuf,
    /// `<out_dir>/<package>-<target>-<category>.zip`
    pub archive: PathBuf,
}

/// Zip every native library under `working_dir` into `out_dir`, one archive
/// per library, named by [`archive_name`].
///
/// Two libraries mapping to the same archive name is an error rather than a
/// silent overwrite.
pub async fn compress_binaries(
    package: &str,
    working_dir: &Path,
    out_dir: &Path,
) -> Result<Vec<CompressedBinary>> {
    let mut names = HashSet::new();
    let mut compressed = Vec::new();

    for binary in find_binaries(working_dir)? {
        let Some(category) = LibCategory::from_path(&binary) else {
            continue;
        };
        let target = derive_target(&binary, working_dir)?;
        let name = archive_name(package, &target, category);
        if !names.insert(name.clone()) {
            return Err(invalid(&binary, &format!("another binary already maps to {name}")));
        }

        log::debug!("Compressing {} -> {name}", binary.display());
        let archive = compress(&binary, &out_dir.join(&name)).await?;
        compressed.push(CompressedBinary { binary, archive });
    }

    Ok(compressed)
}

/// Zip `binary` alone into `dest`, storing it under its file name
pub async fn compress(binary: &Path, dest: &Path) -> Result<PathBuf> {
    let binary = binary.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let entry = binary
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid(&binary, "file name is not valid UTF-8"))?
            .to_string();

        let mut source = BufReader::new(File::open(&binary)?);
        let mut writer = zip::ZipWriter::new(BufWriter::new(File::create(&dest)?));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .large_file(true);

        writer.start_file(entry, options)?;
        std::io::copy(&mut source, &mut writer)?;
        writer.finish()?.flush()?;

        Ok(dest)
    })
    .await
    .map_err(|e| TransportError::TaskFailed {
        reason: format!("compression task failed: {e}"),
    })?
}

/// Extract `archive` into `dir`, returning the files written.
///
/// Entries that would land outside `dir` are rejected.
pub async fn unzip_into(archive: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let archive = archive.to_path_buf();
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut zip = zip::ZipArchive::new(BufReader::new(File::open(&archive)?))?;
        let mut written = Vec::new();

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| invalid(&archive, &format!("unsafe entry path {}", entry.name())))?;
            let out = dir.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = BufWriter::new(File::create(&out)?);
            std::io::copy(&mut entry, &mut file)?;
            file.flush()?;
            written.push(out);
        }

        Ok(written)
    })
    .await
    .map_err(|e| TransportError::TaskFailed {
        reason: format!("extraction task failed: {e}"),
    })?
}
