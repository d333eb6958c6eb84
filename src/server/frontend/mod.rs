pub mod routes;

use std::path::{Component, Path, PathBuf};

/// Static single-page-app bundle on disk
#[derive(Debug, Clone)]
pub struct StaticAssets {
    root: PathBuf,
}

impl StaticAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a request path onto a file under the asset root.
    ///
    /// Returns `None` for paths that try to leave the root (`..`, absolute
    /// components) or that do not name an existing regular file.
    pub async fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = Path::new(request_path.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return None;
        }
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }

        let candidate = self.root.join(relative);
        match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => Some(candidate),
            _ => None,
        }
    }

    pub fn index(&self) -> PathBuf {
        self.root.join("index.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> (tempfile::TempDir, StaticAssets) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "console.log(1)").unwrap();
        let assets = StaticAssets::new(dir.path());
        (dir, assets)
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let (dir, assets) = assets();
        assert_eq!(
            assets.resolve("/js/app.js").await,
            Some(dir.path().join("js/app.js"))
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal_and_directories() {
        let (_dir, assets) = assets();
        assert_eq!(assets.resolve("../etc/passwd").await, None);
        assert_eq!(assets.resolve("js/../index.html").await, None);
        assert_eq!(assets.resolve("js").await, None);
        assert_eq!(assets.resolve("").await, None);
        assert_eq!(assets.resolve("missing.css").await, None);
    }
}
