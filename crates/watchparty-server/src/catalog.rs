//! Movie library catalog.
//!
//! A library is a directory with one folder per movie. Each folder that holds
//! a readable `metadata.json` object contributes one [`Movie`]; everything
//! else is skipped.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use watchparty_core::{Movie, MovieId};

use crate::errors::{Result, ServerError};

/// File read from each movie folder.
pub const METADATA_FILE: &str = "metadata.json";

/// Source of the movie list served to clients.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All movies, sorted by title.
    async fn list(&self) -> Result<Vec<Movie>>;
}

/// Catalog backed by a library directory on disk.
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    /// Catalog rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn catalog_error(&self, source: std::io::Error) -> ServerError {
        ServerError::Catalog {
            path: self.root.display().to_string(),
            source,
        }
    }

    async fn read_movie(&self, folder: &str) -> Option<Movie> {
        let path = self.root.join(folder).join(METADATA_FILE);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        let mut metadata: Map<String, Value> = match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                debug!(?path, error = %e, "skipping unreadable metadata");
                return None;
            }
        };
        let id = metadata
            .remove("id")
            .and_then(MovieId::from_value)
            .unwrap_or_else(|| MovieId::from(folder));
        Some(Movie { id, metadata })
    }
}

#[async_trait]
impl Catalog for DirectoryCatalog {
    async fn list(&self) -> Result<Vec<Movie>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = ?self.root, "library directory missing, catalog empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.catalog_error(e)),
        };

        let mut movies = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.catalog_error(e))?
        {
            let Some(folder) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(movie) = self.read_movie(&folder).await {
                movies.push(movie);
            }
        }

        movies.sort_by(|a, b| {
            a.title()
                .unwrap_or_default()
                .cmp(b.title().unwrap_or_default())
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        Ok(movies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_movie(root: &std::path::Path, folder: &str, json: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(METADATA_FILE), json).unwrap();
    }

    #[tokio::test]
    async fn missing_library_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = DirectoryCatalog::new(dir.path().join("nope"));
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_movies_sorted_by_title() {
        let dir = tempfile::tempdir().unwrap();
        write_movie(dir.path(), "m2", r#"{"id":"m2","title":"Zodiac","year":2007}"#);
        write_movie(dir.path(), "m1", r#"{"id":"m1","title":"Alien"}"#);
        write_movie(dir.path(), "m3", r#"{"title":"Metropolis"}"#);

        let movies = DirectoryCatalog::new(dir.path()).list().await.unwrap();
        let titles: Vec<_> = movies.iter().filter_map(Movie::title).collect();
        assert_eq!(titles, ["Alien", "Metropolis", "Zodiac"]);
        assert_eq!(movies[1].id, "m3");
        assert_eq!(movies[2].metadata["year"], 2007);
    }

    #[tokio::test]
    async fn numeric_ids_are_kept_as_written() {
        let dir = tempfile::tempdir().unwrap();
        write_movie(dir.path(), "152601", r#"{"id":152601,"title":"Her"}"#);
        write_movie(dir.path(), "odd", r#"{"id":{"tmdb":1},"title":"Odd"}"#);

        let movies = DirectoryCatalog::new(dir.path()).list().await.unwrap();
        assert_eq!(movies[0].id, MovieId::from(152_601));
        assert_eq!(serde_json::to_value(&movies[0]).unwrap()["id"], 152_601);
        // non-scalar ids fall back to the folder name
        assert_eq!(movies[1].id, "odd");
    }

    #[tokio::test]
    async fn folders_without_metadata_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_movie(dir.path(), "good", r#"{"title":"Good"}"#);
        write_movie(dir.path(), "broken", "{not json");
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join(".gitkeep"), "").unwrap();

        let movies = DirectoryCatalog::new(dir.path()).list().await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].id, "good");
    }
}
