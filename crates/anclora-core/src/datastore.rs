use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anclora_shared::DashboardSnapshot;
use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::permission::Permission;

/// Local state kept between runs: the last dashboard snapshot, the
/// terminal's notification permission and the ledger of immediate alerts
/// already shown.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub permission_path: PathBuf,
    pub sent_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let snapshot_path = data_dir.join("dashboard.json");
        let permission_path = data_dir.join("permission.data");
        let sent_path = data_dir.join("sent.data");

        if !permission_path.exists() {
            fs::write(&permission_path, "")?;
        }
        if !sent_path.exists() {
            fs::write(&sent_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            snapshot = %snapshot_path.display(),
            permission = %permission_path.display(),
            sent = %sent_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            snapshot_path,
            permission_path,
            sent_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_snapshot(&self) -> anyhow::Result<Option<DashboardSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        load_snapshot_file(&self.snapshot_path).map(Some)
    }

    #[tracing::instrument(skip(self, snapshot), fields(user = %snapshot.user.id))]
    pub fn save_snapshot(&self, snapshot: &DashboardSnapshot) -> anyhow::Result<()> {
        let serialized = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.snapshot_path, serialized.as_bytes())
            .context("failed to save dashboard.json")
    }

    /// An empty permission file means the user was never asked.
    #[tracing::instrument(skip(self))]
    pub fn load_permission(&self) -> anyhow::Result<Permission> {
        let raw = fs::read_to_string(&self.permission_path)
            .with_context(|| format!("failed reading {}", self.permission_path.display()))?;
        Permission::parse(&raw).ok_or_else(|| {
            anyhow!(
                "invalid permission in {}: {}",
                self.permission_path.display(),
                raw.trim()
            )
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn save_permission(&self, permission: Permission) -> anyhow::Result<()> {
        write_atomic(&self.permission_path, permission.as_str().as_bytes())
            .context("failed to save permission.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_sent(&self) -> anyhow::Result<BTreeSet<String>> {
        debug!(file = %self.sent_path.display(), "loading sent ledger");
        let file = fs::File::open(&self.sent_path)?;
        let reader = BufReader::new(file);

        let mut out = BTreeSet::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            out.insert(trimmed.to_string());
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self, sent))]
    pub fn save_sent(&self, sent: &BTreeSet<String>) -> anyhow::Result<()> {
        debug!(count = sent.len(), "saving sent ledger");
        let mut body = String::new();
        for key in sent {
            body.push_str(key);
            body.push('\n');
        }
        write_atomic(&self.sent_path, body.as_bytes()).context("failed to save sent.data")
    }
}

/// Reads a snapshot exported by the backend's dashboard endpoint.
#[tracing::instrument]
pub fn load_snapshot_file(path: &Path) -> anyhow::Result<DashboardSnapshot> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

#[tracing::instrument(skip(path, contents))]
fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "writing atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::DataStore;
    use crate::permission::Permission;

    #[test]
    fn permission_defaults_until_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");
        assert_eq!(store.load_permission().expect("load"), Permission::Default);

        store.save_permission(Permission::Denied).expect("save");
        let reopened = DataStore::open(dir.path()).expect("reopen");
        assert_eq!(reopened.load_permission().expect("load"), Permission::Denied);
    }

    #[test]
    fn garbage_permission_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");
        std::fs::write(&store.permission_path, "maybe").expect("write");
        assert!(store.load_permission().is_err());
    }

    #[test]
    fn sent_ledger_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");
        assert!(store.load_sent().expect("empty").is_empty());

        let sent: BTreeSet<String> = [
            "Ocio:budget-alert:90".to_string(),
            "g-1:savings-goal:75".to_string(),
        ]
        .into_iter()
        .collect();
        store.save_sent(&sent).expect("save");
        assert_eq!(store.load_sent().expect("load"), sent);
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");
        assert!(store.load_snapshot().expect("load").is_none());
    }
}
