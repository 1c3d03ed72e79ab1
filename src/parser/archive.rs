use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use log::info;

use crate::errors::{Error, Result};

/// The two source formats an archive may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Xml,
    Dimacs,
}

pub fn kind_of(name: &str) -> Option<SourceKind> {
    if name.ends_with(".xml") {
        Some(SourceKind::Xml)
    } else if name.ends_with(".dimacs") {
        Some(SourceKind::Dimacs)
    } else {
        None
    }
}

/// Load the model source from a path, unwrapping `.tar.gz` and `.zip`
/// archives. Exactly one `.xml` or `.dimacs` entry must be present in an
/// archive; several are rejected as ambiguous.
pub fn load_source(path: &Path) -> Result<(SourceKind, String)> {
    let path_str = path.to_string_lossy();
    if path_str.ends_with(".tar.gz") {
        return load_tar_gz(path);
    }
    if path_str.ends_with(".zip") {
        return load_zip(path);
    }
    let kind = kind_of(&path_str).ok_or_else(|| {
        Error::MalformedInput(format!(
            "unsupported input file {path_str}; expected .xml, .dimacs, .tar.gz or .zip"
        ))
    })?;
    let mut source = String::new();
    File::open(path)?.read_to_string(&mut source)?;
    Ok((kind, source))
}

fn load_tar_gz(path: &Path) -> Result<(SourceKind, String)> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path)?));
    let mut found: Option<(SourceKind, String)> = None;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let Some(kind) = kind_of(&name) else {
            continue;
        };
        if found.is_some() {
            return Err(Error::MalformedInput(format!(
                "archive contains more than one model file, e.g. {name}"
            )));
        }
        info!("extracting {name} from archive");
        let mut source = String::new();
        entry.read_to_string(&mut source)?;
        found = Some((kind, source));
    }
    found.ok_or_else(|| {
        Error::MalformedInput("archive contains no .xml or .dimacs file".to_string())
    })
}

fn load_zip(path: &Path) -> Result<(SourceKind, String)> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)
        .map_err(|e| Error::MalformedInput(format!("invalid zip archive: {e}")))?;
    let mut found: Option<(SourceKind, String)> = None;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::MalformedInput(format!("invalid zip entry: {e}")))?;
        if !entry.is_file() {
            continue;
        }
        let Some(kind) = kind_of(entry.name()) else {
            continue;
        };
        if found.is_some() {
            return Err(Error::MalformedInput(format!(
                "archive contains more than one model file, e.g. {}",
                entry.name()
            )));
        }
        info!("extracting {} from archive", entry.name());
        let mut source = String::new();
        entry.read_to_string(&mut source)?;
        found = Some((kind, source));
    }
    found.ok_or_else(|| {
        Error::MalformedInput("archive contains no .xml or .dimacs file".to_string())
    })
}
