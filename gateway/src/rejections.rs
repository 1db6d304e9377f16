use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

use crate::model::{OnSearchContext, Rejection};

/// Audit record, one JSON object per line in the day's rejection file.
/// Records never mutate after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub scope: String,
    pub reason: String,
    pub transaction_id: String,
    pub message_id: String,
    pub timestamp: String,
}

/// Appends rejections to `<data_dir>/rejections/rejections_<date>.jsonl`.
/// The audit is advisory: callers log write failures and move on.
pub struct RejectionStore {
    dir: PathBuf,
}

impl RejectionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("rejections"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn append(
        &self,
        ctx: &OnSearchContext,
        rejection: &Rejection,
    ) -> Result<(), std::io::Error> {
        let now = OffsetDateTime::now_utc();
        let record = AuditRecord {
            scope: rejection.scope.clone(),
            reason: rejection.reason.clone(),
            transaction_id: ctx.transaction_id.clone(),
            message_id: ctx.message_id.clone(),
            timestamp: now.format(&Rfc3339).expect("failed to format UTC time"),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        create_dir_all(&self.dir).await?;
        let date = now
            .format(format_description!("[year]-[month]-[day]"))
            .expect("failed to format date");
        let path = self.dir.join(format!("rejections_{date}.jsonl"));
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

    #[tokio::test]
    async fn appends_dated_audit_records() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let store = RejectionStore::new(dir.path());
        let ctx = OnSearchContext {
            transaction_id: "tx1".to_string(),
            message_id: "m1".to_string(),
            ..Default::default()
        };

        store
            .append(&ctx, &Rejection::provider("p1", "provider.descriptor.name missing"))
            .await
            .expect("append failed");
        store
            .append(&ctx, &Rejection::item("p1", "i1", "item.price.value missing"))
            .await
            .expect("append failed");

        let date = OffsetDateTime::now_utc()
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap();
        let path = store.dir().join(format!("rejections_{date}.jsonl"));
        let contents = std::fs::read_to_string(path).unwrap();
        let records: Vec<AuditRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scope, "provider:p1");
        assert_eq!(records[0].transaction_id, "tx1");
        assert_eq!(records[1].scope, "item:p1:i1");
    }
}
