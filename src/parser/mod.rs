pub mod archive;
pub mod dimacs;
pub mod xml;

use std::path::Path;

use log::info;

use crate::errors::Result;
use crate::instances::Instance;

pub use archive::SourceKind;
pub use dimacs::parse_dimacs;
pub use xml::parse_xml;

/// Parse a feature model from a file path. Supports the FeatureIDE XML
/// format, DIMACS CNF, and `.tar.gz`/`.zip` archives wrapping either.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Instance> {
    let path = path.as_ref();
    let (kind, source) = archive::load_source(path)?;
    let name = path.to_string_lossy();
    let instance = match kind {
        SourceKind::Xml => parse_xml(&source, &name)?,
        SourceKind::Dimacs => parse_dimacs(&source, &name)?,
    };
    info!(
        "parsed instance '{}' with {} features and {} rules",
        name,
        instance.features.len(),
        instance.rules.len()
    );
    Ok(instance)
}
