use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::HarvestError;

/// A directory to bundle, stored under `name/` at the top of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    pub name: String,
    pub dir: Utf8PathBuf,
}

impl ArchiveSource {
    pub fn new(name: impl Into<String>, dir: Utf8PathBuf) -> Self {
        Self {
            name: name.into(),
            dir,
        }
    }
}

/// Bundles `sources` into one zip at `destination`.
///
/// The archive is assembled in a temp file, read back in full, and only then
/// moved over `destination`; a failure leaves no partial archive behind.
pub fn archive(sources: &[ArchiveSource], destination: &Utf8Path) -> Result<Utf8PathBuf, HarvestError> {
    let present: Vec<&ArchiveSource> = sources
        .iter()
        .filter(|source| source.dir.as_std_path().is_dir())
        .collect();
    if present.is_empty() {
        return Err(HarvestError::Archive(
            "none of the source directories exist".to_string(),
        ));
    }

    let parent = destination
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HarvestError::Archive(format!("create {parent}: {err}")))?;
    let temp = tempfile::Builder::new()
        .prefix(".harvest-archive")
        .suffix(".zip")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Archive(err.to_string()))?;

    let file = temp
        .reopen()
        .map_err(|err| HarvestError::Archive(err.to_string()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    for source in present {
        add_directory(&mut writer, source, options)?;
    }
    writer
        .finish()
        .map_err(|err| HarvestError::Archive(err.to_string()))?;

    validate_zip(temp.path())?;
    temp.persist(destination.as_std_path())
        .map_err(|err| HarvestError::Archive(format!("persist {destination}: {}", err.error)))?;
    Ok(destination.to_path_buf())
}

fn add_directory(
    writer: &mut ZipWriter<fs::File>,
    source: &ArchiveSource,
    options: SimpleFileOptions,
) -> Result<(), HarvestError> {
    let root = source.name.trim_matches('/');
    writer
        .add_directory(format!("{root}/"), options)
        .map_err(|err| HarvestError::Archive(err.to_string()))?;

    let mut entries = walk_dir(source.dir.as_std_path())?;
    entries.sort();
    for path in entries {
        let relative = path
            .strip_prefix(source.dir.as_std_path())
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
        let name = entry_name(root, relative)?;
        if path.is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|err| HarvestError::Archive(err.to_string()))?;
            continue;
        }
        writer
            .start_file(name.as_str(), options)
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
        let mut file = fs::File::open(&path)
            .map_err(|err| HarvestError::Archive(format!("open {}: {err}", path.display())))?;
        io::copy(&mut file, writer)
            .map_err(|err| HarvestError::Archive(format!("copy {}: {err}", path.display())))?;
    }
    Ok(())
}

fn entry_name(root: &str, relative: &Path) -> Result<String, HarvestError> {
    let mut name = root.to_string();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            HarvestError::Archive(format!("non-utf8 path {}", relative.display()))
        })?;
        name.push('/');
        name.push_str(part);
    }
    Ok(name)
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path)
            .map_err(|err| HarvestError::Archive(format!("read {}: {err}", path.display())))?;
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Archive(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

/// Reads every entry of the zip at `zip_path` to the end.
pub fn validate_zip(zip_path: &Path) -> Result<(), HarvestError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        HarvestError::Archive(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| HarvestError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| HarvestError::Archive(err.to_string()))?;
    }
    Ok(())
}

pub fn entry_names(zip_path: &Path) -> Result<Vec<String>, HarvestError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        HarvestError::Archive(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let archive = ZipArchive::new(file).map_err(|err| HarvestError::Archive(err.to_string()))?;
    Ok(archive.file_names().map(|name| name.to_string()).collect())
}
