use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::curated::writer::{CuratedError, CuratedRecord};

/// Read-through over the curated JSONL log: the latest line per provider
/// file is that provider's current state (upsert-on-read).
pub struct CuratedQuery {
    dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    pub provider_id: String,
    pub city: String,
    pub domain: String,
    pub item_id: String,
    pub item_name: String,
    pub category_id: String,
    pub price_value: String,
    pub price_currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CuratedStats {
    pub total_providers: usize,
    pub total_items: usize,
}

impl CuratedQuery {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("hudi").join("providers"),
        }
    }

    /// Latest curated record for one provider, or None when it was never
    /// accepted.
    pub async fn latest(&self, provider_id: &str) -> Result<Option<CuratedRecord>, CuratedError> {
        let path = self.dir.join(format!("{provider_id}.jsonl"));
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Self::last_record(&contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Current state of every provider, filtered and paged. Results are
    /// ordered by provider id so pagination is stable.
    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
        city: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Vec<CuratedRecord>, CuratedError> {
        let mut records = Vec::new();
        for contents in self.read_all_files().await? {
            let Some(record) = Self::last_record(&contents) else {
                continue;
            };
            if city.is_some_and(|c| c != record.city) {
                continue;
            }
            if domain.is_some_and(|d| d != record.domain) {
                continue;
            }
            records.push(record);
        }
        records.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    /// Flattened item rows across the current provider states.
    pub async fn items(
        &self,
        provider_id: Option<&str>,
        category_id: Option<&str>,
        city: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ItemRow>, CuratedError> {
        let mut rows = Vec::new();
        for contents in self.read_all_files().await? {
            let Some(record) = Self::last_record(&contents) else {
                continue;
            };
            if provider_id.is_some_and(|p| p != record.provider_id) {
                continue;
            }
            if city.is_some_and(|c| c != record.city) {
                continue;
            }
            for item in &record.items {
                if category_id.is_some_and(|c| c != item.category_id) {
                    continue;
                }
                rows.push(ItemRow {
                    provider_id: record.provider_id.clone(),
                    city: record.city.clone(),
                    domain: record.domain.clone(),
                    item_id: item.id.clone(),
                    item_name: item.descriptor.name.clone(),
                    category_id: item.category_id.clone(),
                    price_value: item.price.value.clone(),
                    price_currency: item.price.currency.clone(),
                });
                if rows.len() >= limit {
                    return Ok(rows);
                }
            }
        }
        Ok(rows)
    }

    pub async fn stats(&self) -> Result<CuratedStats, CuratedError> {
        let mut stats = CuratedStats {
            total_providers: 0,
            total_items: 0,
        };
        for contents in self.read_all_files().await? {
            let Some(record) = Self::last_record(&contents) else {
                continue;
            };
            stats.total_providers += 1;
            stats.total_items += record.items.len();
        }
        Ok(stats)
    }

    async fn read_all_files(&self) -> Result<Vec<String>, CuratedError> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // No accepted providers yet
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(tokio::fs::read_to_string(&path).await?);
            }
        }
        Ok(files)
    }

    fn last_record(contents: &str) -> Option<CuratedRecord> {
        contents
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str(line).ok())
    }
}
