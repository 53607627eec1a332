//! Data directory layout for Palaver.

use std::path::{Path, PathBuf};

/// Name of the SQLite database file inside the data directory.
pub const DATABASE_FILE: &str = "palaver.db";

/// Resolve the data directory: `PALAVER_DATA_DIR`, else `~/.palaver`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PALAVER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".palaver");
    }

    // Last resort: current directory
    PathBuf::from(".palaver")
}

/// Create the data directory if it does not exist.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

/// SQLite URL for the database inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join(DATABASE_FILE).display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_points_into_data_dir() {
        let url = database_url(Path::new("/tmp/palaver-test"));
        assert_eq!(url, "sqlite:///tmp/palaver-test/palaver.db?mode=rwc");
    }

    #[tokio::test]
    async fn test_ensure_data_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_data_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
