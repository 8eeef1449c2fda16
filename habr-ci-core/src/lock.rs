use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use log::{debug, warn};
use uuid::Uuid;
use crate::error::{PipelineError, PipelineResult};

/// Lock esclusivo sulla directory di lavoro, rilasciato al drop.
///
/// Il file sta accanto alla directory (`<workspace>.lock`) perché `git clone`
/// richiede una destinazione vuota.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    pub fn lock_path(workspace: &Path) -> PathBuf {
        let mut name = workspace.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn acquire(workspace: &Path, run_id: Uuid) -> PipelineResult<Self> {
        let path = Self::lock_path(workspace);
        if let Some(parent) = path.parent().filter(|it| !it.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io_with_path(e.to_string(), parent.display().to_string()))?;
        }

        match Self::create(&path, run_id) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if Self::is_stale(&path) {
                    warn!("Removing stale workspace lock '{}'", path.display());
                    fs::remove_file(&path)
                        .map_err(|e| PipelineError::io_with_path(e.to_string(), path.display().to_string()))?;
                    Self::create(&path, run_id)
                        .map_err(|_| PipelineError::Locked { path: workspace.display().to_string() })
                } else {
                    Err(PipelineError::Locked { path: workspace.display().to_string() })
                }
            }
            Err(e) => Err(PipelineError::io_with_path(e.to_string(), path.display().to_string())),
        }
    }

    fn create(path: &Path, run_id: Uuid) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{} {}", std::process::id(), run_id)?;
        debug!("Acquired workspace lock '{}'", path.display());
        Ok(Self { path: path.to_path_buf() })
    }

    /// Un lock è stale se il processo che lo ha creato non esiste più.
    /// Senza `/proc` non possiamo saperlo e il lock viene considerato valido.
    fn is_stale(path: &Path) -> bool {
        let Ok(content) = fs::read_to_string(path) else {
            return false;
        };
        let Some(pid) = content.split_whitespace().next().and_then(|it| it.parse::<u32>().ok()) else {
            return false;
        };
        let proc_root = Path::new("/proc");
        proc_root.is_dir() && !proc_root.join(pid.to_string()).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Cannot release workspace lock '{}': {}", self.path.display(), e);
        }
    }
}
