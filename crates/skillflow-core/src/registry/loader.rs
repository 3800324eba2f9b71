//! Filesystem discovery of registry sources.
//!
//! Layout under the registry root:
//! ```text
//! skill_registry.yaml          (optional descriptor)
//! skills/<dir>/manifest.yaml   (one skill per directory)
//! flows/*.yaml | flows/*.yml   (one flow per file)
//! ```
//! Entries are read in sorted order so that error reporting and duplicate
//! detection are deterministic.

use std::path::{Path, PathBuf};

use thiserror::Error;

use skillflow_types::error::ManifestValidationError;

use super::index::{ManifestSource, RegistryIndex, RegistrySources};

pub const DESCRIPTOR_FILE: &str = "skill_registry.yaml";
pub const SKILLS_DIR: &str = "skills";
pub const FLOWS_DIR: &str = "flows";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry root '{0}' does not exist")]
    MissingRoot(PathBuf),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ManifestValidationError),

    #[error("registry has no root directory to reload from")]
    NoRoot,
}

/// Read every registry document under `root`.
pub fn discover(root: &Path) -> Result<RegistrySources, RegistryError> {
    if !root.is_dir() {
        return Err(RegistryError::MissingRoot(root.to_path_buf()));
    }

    let mut sources = RegistrySources::default();

    let descriptor_path = root.join(DESCRIPTOR_FILE);
    if descriptor_path.is_file() {
        sources.descriptor = Some(read_source(root, &descriptor_path)?);
    } else {
        tracing::debug!(root = %root.display(), "no {DESCRIPTOR_FILE}, using defaults");
    }

    let skills_dir = root.join(SKILLS_DIR);
    if skills_dir.is_dir() {
        for dir in sorted_entries(&skills_dir)? {
            if !dir.is_dir() {
                continue;
            }
            let manifest = ["manifest.yaml", "manifest.yml"]
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.is_file());
            match manifest {
                Some(path) => sources.skills.push(read_source(root, &path)?),
                None => tracing::warn!(dir = %dir.display(), "skill directory has no manifest.yaml, skipping"),
            }
        }
    } else {
        tracing::warn!(path = %skills_dir.display(), "skills directory not found");
    }

    let flows_dir = root.join(FLOWS_DIR);
    if flows_dir.is_dir() {
        for path in sorted_entries(&flows_dir)? {
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if path.is_file() && is_yaml {
                sources.flows.push(read_source(root, &path)?);
            }
        }
    } else {
        tracing::warn!(path = %flows_dir.display(), "flows directory not found");
    }

    Ok(sources)
}

/// Discover and build an index from `root`.
pub fn load_index(root: &Path) -> Result<RegistryIndex, RegistryError> {
    let sources = discover(root)?;
    let index = RegistryIndex::load(&sources)?;
    tracing::info!(
        root = %root.display(),
        skills = index.skill_count(),
        flows = index.flow_count(),
        "registry loaded"
    );
    Ok(index)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    paths.sort();
    Ok(paths)
}

fn read_source(root: &Path, path: &Path) -> Result<ManifestSource, RegistryError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(ManifestSource::new(name, contents))
}
