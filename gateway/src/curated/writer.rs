use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::model::{Category, Item, OnSearchContext, Provider, ProviderDescriptor};

const STRIPES: usize = 16;

/// One curated line per accepted provider. The latest line in a provider's
/// file is its current state, which keeps the log upsert-friendly for the
/// downstream lake ingestion and for the read-through queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedRecord {
    pub provider_id: String,
    pub domain: String,
    pub city: String,
    pub bap_id: String,
    pub bpp_id: String,
    pub timestamp: String,
    pub descriptor: ProviderDescriptor,
    pub categories: Vec<Category>,
    pub items: Vec<Item>,
}

#[derive(Error, Debug)]
pub enum CuratedError {
    #[error("failed to serialize curated record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("curated write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only provider log under `<data_dir>/hudi/providers/`. Files are
/// opened per append and appends to one provider are serialized through a
/// striped lock, so concurrent writers cannot interleave lines.
pub struct CuratedStore {
    dir: PathBuf,
    stripes: Vec<Mutex<()>>,
}

impl CuratedStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("hudi").join("providers"),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stripe(&self, provider_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        provider_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % STRIPES]
    }

    pub async fn append(
        &self,
        ctx: &OnSearchContext,
        provider: &Provider,
        commit_timestamp: &str,
    ) -> Result<(), CuratedError> {
        let record = CuratedRecord {
            provider_id: provider.id.clone(),
            domain: ctx.domain.clone(),
            city: ctx.city.clone(),
            bap_id: ctx.bap_id.clone(),
            bpp_id: ctx.bpp_id.clone(),
            timestamp: commit_timestamp.to_string(),
            descriptor: provider.descriptor.clone(),
            categories: provider.categories.clone(),
            items: provider.items.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.stripe(&provider.id).lock().await;

        create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.jsonl", provider.id));
        let mut file = open_append(&path).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    builder.mode(0o755);
    builder.create(dir).await
}

#[cfg(not(unix))]
async fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    options.mode(0o644);
    options.open(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OnSearchContext;

    fn context() -> OnSearchContext {
        OnSearchContext {
            domain: "retail".to_string(),
            city: "std:080".to_string(),
            bap_id: "buyer-app".to_string(),
            bpp_id: "s1".to_string(),
            ..Default::default()
        }
    }

    fn provider(id: &str) -> Provider {
        Provider {
            id: id.to_string(),
            descriptor: ProviderDescriptor {
                name: "Foo".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_write() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = CuratedStore::new(dir.path());

        store
            .append(&context(), &provider("p1"), "2024-05-01T10:00:00Z")
            .await
            .expect("first append failed");
        store
            .append(&context(), &provider("p1"), "2024-05-01T11:00:00Z")
            .await
            .expect("second append failed");

        let contents = std::fs::read_to_string(store.dir().join("p1.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let latest: CuratedRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(latest.timestamp, "2024-05-01T11:00:00Z");
        assert_eq!(latest.bpp_id, "s1");
    }

    #[tokio::test]
    async fn concurrent_appends_stay_line_atomic() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = std::sync::Arc::new(CuratedStore::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(&context(), &provider("p1"), &format!("t{i}"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().expect("append failed");
        }

        let contents = std::fs::read_to_string(store.dir().join("p1.jsonl")).unwrap();
        let mut parsed = 0;
        for line in contents.lines() {
            serde_json::from_str::<CuratedRecord>(line).expect("corrupt line");
            parsed += 1;
        }
        assert_eq!(parsed, 32);
    }
}
