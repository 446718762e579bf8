use std::path::Path;

/// Trait for different cleanup strategies (local filesystem, cloud storage, etc.)
pub trait StorageCleanup {
    type Error: std::error::Error + Send + Sync + 'static;

    fn delete_file(&self, path: &Path) -> Result<(), Self::Error>;

    fn cleanup_segment(&self, store_path: &Path, index_path: &Path) -> Result<(), Self::Error> {
        self.delete_file(store_path)?;
        self.delete_file(index_path)?;
        Ok(())
    }

    fn cleanup_log_directory(&self, _log_dir: &Path) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct LocalFileSystem;

impl StorageCleanup for LocalFileSystem {
    type Error = std::io::Error;

    fn delete_file(&self, path: &Path) -> Result<(), Self::Error> {
        std::fs::remove_file(path)
    }

    fn cleanup_log_directory(&self, log_dir: &Path) -> Result<(), Self::Error> {
        if log_dir.exists() && std::fs::read_dir(log_dir)?.next().is_none() {
            std::fs::remove_dir(log_dir)?;
        }
        Ok(())
    }
}
