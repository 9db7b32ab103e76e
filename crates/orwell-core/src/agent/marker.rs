use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

/// File announcing a running client, containing its process id
#[derive(Debug)]
pub struct InstanceMarker {
    path: PathBuf,
}

impl InstanceMarker {
    pub fn create(path: PathBuf) -> Result<Self> {
        std::fs::write(&path, std::process::id().to_string()).map_err(|source| {
            Error::Persistence {
                path: path.clone(),
                source,
            }
        })?;
        debug!("Wrote instance marker {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove instance marker {}: {}", self.path.display(), e);
        }
    }
}
