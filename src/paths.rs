//! Where a run writes its artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Uses `root` when given, otherwise `<data dir>/connres/results`.
    /// The directory is created if it does not exist.
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let root = match root {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_root()?,
        };
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn default_root() -> Result<PathBuf> {
        let base = dirs::data_dir().ok_or_else(|| {
            Error::InvalidInput("could not determine data directory; set `output_dir`".into())
        })?;
        Ok(base.join("connres").join("results"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Result table of one workflow job.
    pub fn results_file(&self, label: &str) -> PathBuf {
        self.root.join(format!("res_{label}.csv"))
    }

    /// Connectivity matrix a job actually simulated, saved before normalization.
    pub fn matrix_file(&self, label: &str) -> PathBuf {
        self.root.join(format!("{label}.npy"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_the_label() {
        let dir = std::env::temp_dir().join(format!("connres-paths-{}", std::process::id()));
        let layout = OutputLayout::new(Some(&dir)).unwrap();
        assert!(layout.root().is_dir());
        assert_eq!(layout.results_file("null_3"), dir.join("res_null_3.csv"));
        assert_eq!(layout.matrix_file("null_3"), dir.join("null_3.npy"));
    }
}
