use super::ArtifactLogger;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    artifacts: Vec<Artifact>,
}

/// Records artifacts in a JSON manifest
///
/// The manifest is rewritten after every registration so it stays valid if
/// the run is interrupted. Existing entries are kept.
pub struct ManifestLogger {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestLogger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let manifest = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read manifest {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse manifest {}", path.display()))?
        } else {
            Manifest::default()
        };
        Ok(Self { path, manifest })
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.manifest.artifacts
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.manifest)
            .context("Failed to serialize manifest")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write manifest {}", self.path.display()))
    }
}

impl ArtifactLogger for ManifestLogger {
    fn add_artifact(&mut self, path: &Path, name: &str) -> Result<()> {
        tracing::debug!("Artifact {} -> {}", name, path.display());
        self.manifest.artifacts.push(Artifact {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
        self.persist()
    }
}
