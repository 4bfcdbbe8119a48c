//! Prebuilt data tarballs
//!
//! Turns the binary packages listed in a `.changes` file into a single
//! `data/<package>/<arch>/...` tree, packed as `<changes-stem>.tar.gz`.
//! Consumers unpack the tarball instead of installing the packages.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;

use dockdeb_core::{Architecture, Distribution};
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prebuilt tarball errors
#[derive(Error, Debug)]
pub enum PrebuiltError {
    /// No usable `.changes` file
    #[error("No .changes file found at {}", path.display())]
    ChangesNotFound { path: PathBuf },

    /// `.changes` file lists no binary packages
    #[error("No .deb files referenced in {}", path.display())]
    NoPackages { path: PathBuf },

    /// Every referenced package failed to extract
    #[error("No .deb files were successfully extracted")]
    NothingExtracted,

    /// Package extraction failed
    #[error("Failed to extract {}: {reason}", deb.display())]
    Extract { deb: PathBuf, reason: String },

    /// Filesystem error
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PrebuiltError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PrebuiltError + '_ {
    move |source| PrebuiltError::Io { path: path.to_path_buf(), source }
}

/// Unpacks a binary package into a directory
pub trait DebExtractor: Send + Sync {
    fn extract(&self, deb: &Path, dest: &Path) -> Result<()>;
}

/// Extractor backed by `dpkg-deb -x`
#[derive(Debug, Default, Clone, Copy)]
pub struct DpkgDebExtractor;

impl DebExtractor for DpkgDebExtractor {
    fn extract(&self, deb: &Path, dest: &Path) -> Result<()> {
        let output = Command::new("dpkg-deb")
            .arg("-x")
            .arg(deb)
            .arg(dest)
            .output()
            .map_err(|e| PrebuiltError::Extract {
                deb: deb.to_path_buf(),
                reason: format!("failed to run dpkg-deb (is dpkg installed?): {e}"),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PrebuiltError::Extract {
                deb: deb.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Resolve a `.changes` file, or the newest one in a directory
pub fn find_changes_file(input: &Path) -> Result<PathBuf> {
    if input.is_file() && input.extension().is_some_and(|ext| ext == "changes") {
        return Ok(input.to_path_buf());
    }

    if input.is_dir() {
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in fs::read_dir(input).map_err(io_err(input))? {
            let path = entry.map_err(io_err(input))?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "changes") {
                continue;
            }
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_err(io_err(&path))?;
            if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
                newest = Some((modified, path));
            }
        }
        if let Some((_, path)) = newest {
            return Ok(path);
        }
    }

    Err(PrebuiltError::ChangesNotFound { path: input.to_path_buf() })
}

/// Binary package file names referenced by a `.changes` file, in order
pub fn collect_debs_from_changes(changes: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(changes).map_err(io_err(changes))?;
    let text = String::from_utf8_lossy(&bytes);

    let deb_re = Regex::new(r"(?m)(?:^|\s)(\S+\.deb)\b").map_err(|e| PrebuiltError::Extract {
        deb: changes.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut debs: Vec<String> = Vec::new();
    for cap in deb_re.captures_iter(&text) {
        let name = cap[1].to_string();
        if !debs.contains(&name) {
            debs.push(name);
        }
    }

    if debs.is_empty() {
        return Err(PrebuiltError::NoPackages { path: changes.to_path_buf() });
    }
    Ok(debs)
}

/// Package name of a `package_version_arch.deb` file
fn package_name(deb: &Path) -> String {
    let base = deb.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    match base.split_once('_') {
        Some((pkg, _)) => pkg.to_string(),
        None => base.trim_end_matches(".deb").to_string(),
    }
}

/// Pack `work_dir/data` as a gzip tarball at `tar_path`
pub fn create_tar_of_data(work_dir: &Path, tar_path: &Path) -> Result<PathBuf> {
    let data_root = work_dir.join("data");
    if !data_root.is_dir() {
        return Err(PrebuiltError::Io {
            path: data_root,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing data directory"),
        });
    }

    if let Some(parent) = tar_path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    debug!("Creating tarball {}", tar_path.display());
    let file = File::create(tar_path).map_err(io_err(tar_path))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all("data", &data_root).map_err(io_err(&data_root))?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(io_err(tar_path))?;

    Ok(tar_path.to_path_buf())
}

/// Builds prebuilt data tarballs from `.changes` files
pub struct PrebuiltPacker<E = DpkgDebExtractor> {
    extractor: E,
}

impl Default for PrebuiltPacker {
    fn default() -> Self {
        Self::new(DpkgDebExtractor)
    }
}

impl<E: DebExtractor> PrebuiltPacker<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Extract every referenced package into `work_dir/data/<pkg>/<arch>`
    pub fn extract_debs(
        &self,
        debs: &[String],
        work_dir: &Path,
        arch: Architecture,
    ) -> Result<usize> {
        let data_root = work_dir.join("data");
        fs::create_dir_all(&data_root).map_err(io_err(&data_root))?;

        let mut extracted = 0;
        for name in debs {
            let deb = if Path::new(name).is_absolute() {
                PathBuf::from(name)
            } else {
                work_dir.join(name)
            };
            if !deb.exists() {
                warn!("Referenced .deb not found: {} (skipping)", deb.display());
                continue;
            }

            let dest = data_root.join(package_name(&deb)).join(arch.as_str());
            fs::create_dir_all(&dest).map_err(io_err(&dest))?;

            debug!("Extracting {} -> {}", deb.display(), dest.display());
            match self.extractor.extract(&deb, &dest) {
                Ok(()) => extracted += 1,
                Err(e) => warn!("{}", e),
            }
        }

        if extracted == 0 {
            return Err(PrebuiltError::NothingExtracted);
        }
        Ok(extracted)
    }

    /// Build the tarball for `input` (a `.changes` file or a directory)
    ///
    /// The tarball lands in `<output_root>/prebuilt_<distro>/`, or directly
    /// in `output_root` without a distribution. Without an output root the
    /// `.changes` directory is used.
    pub fn pack(
        &self,
        input: &Path,
        arch: Architecture,
        distribution: Option<Distribution>,
        output_root: Option<&Path>,
    ) -> Result<PathBuf> {
        let changes = find_changes_file(input)?;
        let work_dir = changes.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!("Using .changes file {}", changes.display());

        let debs = collect_debs_from_changes(&changes)?;
        self.extract_debs(&debs, &work_dir, arch)?;

        let stem = changes
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "prebuilt".to_string());
        let base = output_root.unwrap_or(&work_dir);
        let dest_dir = match distribution {
            Some(distribution) => base.join(format!("prebuilt_{distribution}")),
            None => base.to_path_buf(),
        };

        let tar_path = create_tar_of_data(&work_dir, &dest_dir.join(format!("{stem}.tar.gz")))?;
        info!("Created tarball {}", tar_path.display());
        Ok(tar_path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    use super::*;

    /// Writes a marker file instead of unpacking a real package
    struct FakeExtractor;

    impl DebExtractor for FakeExtractor {
        fn extract(&self, deb: &Path, dest: &Path) -> Result<()> {
            let name = deb.file_name().unwrap().to_string_lossy().to_string();
            fs::create_dir_all(dest.join("usr/lib")).unwrap();
            fs::write(dest.join("usr/lib").join(format!("{name}.so")), b"elf").unwrap();
            Ok(())
        }
    }

    const CHANGES: &str = "\
Format: 1.8
Source: hello
Files:
 0123 1024 libs optional hello_1.0-1_arm64.deb
 4567 2048 debug optional hello-dbgsym_1.0-1_arm64.ddeb
 89ab 512 libs optional libhello-dev_1.0-1_arm64.deb
Checksums-Sha256:
 ffff 1024 hello_1.0-1_arm64.deb
";

    #[test]
    fn test_collect_debs_dedups_in_order() {
        let temp = TempDir::new().unwrap();
        let changes = temp.path().join("hello_1.0-1_arm64.changes");
        fs::write(&changes, CHANGES).unwrap();

        let debs = collect_debs_from_changes(&changes).unwrap();
        assert_eq!(debs, vec!["hello_1.0-1_arm64.deb", "libhello-dev_1.0-1_arm64.deb"]);
    }

    #[test]
    fn test_collect_debs_none_referenced() {
        let temp = TempDir::new().unwrap();
        let changes = temp.path().join("empty.changes");
        fs::write(&changes, "Source: hello\n").unwrap();
        assert!(matches!(
            collect_debs_from_changes(&changes),
            Err(PrebuiltError::NoPackages { .. })
        ));
    }

    #[test]
    fn test_find_changes_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            find_changes_file(temp.path()),
            Err(PrebuiltError::ChangesNotFound { .. })
        ));

        let changes = temp.path().join("a.changes");
        fs::write(&changes, CHANGES).unwrap();
        fs::write(temp.path().join("notes.txt"), "x").unwrap();

        assert_eq!(find_changes_file(temp.path()).unwrap(), changes);
        assert_eq!(find_changes_file(&changes).unwrap(), changes);
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name(Path::new("/x/hello_1.0_arm64.deb")), "hello");
        assert_eq!(package_name(Path::new("plain.deb")), "plain");
    }

    #[test]
    fn test_pack_with_distribution() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("questing/arm64");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("hello_1.0-1_arm64.changes"), CHANGES).unwrap();
        fs::write(work.join("hello_1.0-1_arm64.deb"), b"deb").unwrap();
        // libhello-dev is referenced but missing and gets skipped

        let out = temp.path().join("out");
        let packer = PrebuiltPacker::new(FakeExtractor);
        let tarball = packer
            .pack(&work, Architecture::Arm64, Some(Distribution::Questing), Some(&out))
            .unwrap();

        assert_eq!(tarball, out.join("prebuilt_questing").join("hello_1.0-1_arm64.tar.gz"));

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&tarball).unwrap()));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let mut sink = Vec::new();
            entry.read_to_end(&mut sink).unwrap();
            names.push(entry.path().unwrap().to_string_lossy().to_string());
        }
        assert!(names
            .iter()
            .any(|n| n == "data/hello/arm64/usr/lib/hello_1.0-1_arm64.deb.so"));
    }

    #[test]
    fn test_pack_nothing_extracted() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("hello_1.0-1_arm64.changes"), CHANGES).unwrap();

        let packer = PrebuiltPacker::new(FakeExtractor);
        let err = packer.pack(temp.path(), Architecture::Arm64, None, None).unwrap_err();
        assert!(matches!(err, PrebuiltError::NothingExtracted));
    }
}
