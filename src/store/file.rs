use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{DataStore, DataUpdate, UserAccount, UserData};

const USERS_FILE: &str = "users.json";

/// JSON blobs on disk: `users.json` plus one `storage_<user_id>.json` per user.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, user_id: &str) -> Result<PathBuf, StoreError> {
        validate_user_id(user_id)?;
        Ok(self.root.join(format!("storage_{user_id}.json")))
    }

    fn users_path(&self) -> PathBuf {
        self.root.join(USERS_FILE)
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes beside the target and renames over it so readers never see a torn file.
    async fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

fn validate_user_id(user_id: &str) -> Result<(), StoreError> {
    let valid = !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidUserId(user_id.to_string()))
    }
}

#[async_trait]
impl DataStore for JsonFileStore {
    async fn load_data(&self, user_id: &str) -> Result<UserData, StoreError> {
        let path = self.data_path(user_id)?;
        Ok(self.read_json(&path).await?.unwrap_or_default())
    }

    async fn save_data(&self, user_id: &str, data: &UserData) -> Result<(), StoreError> {
        let path = self.data_path(user_id)?;
        let _guard = self.write_lock.lock().await;
        self.write_json(&path, data).await
    }

    async fn update_data(
        &self,
        user_id: &str,
        update: DataUpdate,
    ) -> Result<UserData, StoreError> {
        let path = self.data_path(user_id)?;
        let _guard = self.write_lock.lock().await;
        let mut data: UserData = self.read_json(&path).await?.unwrap_or_default();
        update(&mut data)?;
        self.write_json(&path, &data).await?;
        Ok(data)
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError> {
        Ok(self
            .read_json(&self.users_path())
            .await?
            .unwrap_or_default())
    }

    async fn insert_user(&self, user: UserAccount) -> Result<UserAccount, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.list_users().await?;
        if users.iter().any(|existing| existing.email == user.email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        users.push(user.clone());
        self.write_json(&self.users_path(), &users).await?;
        Ok(user)
    }

    async fn update_user(&self, user: UserAccount) -> Result<UserAccount, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.list_users().await?;
        let Some(slot) = users.iter_mut().find(|existing| existing.id == user.id) else {
            return Err(StoreError::UserNotFound(user.id));
        };
        *slot = user.clone();
        self.write_json(&self.users_path(), &users).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};

    use crate::attendance::{AttendanceRecord, AttendanceStatus};
    use crate::error::StoreError;
    use crate::schedule::{ScheduleEntry, SequentialIds};
    use crate::store::{DataStore, DataUpdate, UserAccount, UserData};

    use super::JsonFileStore;

    fn account(id: &str, email: &str) -> UserAccount {
        UserAccount {
            id: id.to_string(),
            email: email.to_string(),
            name: "Test".to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_user_data_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open store");
        let data = store.load_data("nobody").await.expect("load");
        assert_eq!(data, UserData::default());
        assert!(store.list_users().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn saves_and_reloads_user_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open store");
        let ids = SequentialIds::new("rec");
        let data = UserData {
            schedule: vec![
                ScheduleEntry::new("math", "Monday", "9:00 AM", "10:00 AM", "Math")
                    .with_group("G1"),
            ],
            records: vec![AttendanceRecord::new(
                &ids,
                "math",
                NaiveDate::from_ymd_opt(2024, 9, 2).expect("valid date"),
                AttendanceStatus::Present,
            )],
        };
        store.save_data("user-1", &data).await.expect("save");
        assert!(dir.path().join("storage_user-1.json").exists());

        let loaded = store.load_data("user-1").await.expect("load");
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn rejects_path_like_user_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open store");
        let err = store
            .load_data("../etc/passwd")
            .await
            .expect_err("should reject");
        assert!(matches!(err, StoreError::InvalidUserId(_)));
    }

    #[tokio::test]
    async fn inserts_finds_and_updates_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open store");
        store
            .insert_user(account("u1", "a@example.com"))
            .await
            .expect("insert");
        store
            .insert_user(account("u2", "b@example.com"))
            .await
            .expect("insert");

        let found = store
            .find_user_by_email("b@example.com")
            .await
            .expect("find")
            .expect("user should exist");
        assert_eq!(found.id, "u2");

        let mut renamed = found.clone();
        renamed.name = "Renamed".to_string();
        store.update_user(renamed).await.expect("update");
        let users = store.list_users().await.expect("list");
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "Renamed");

        let err = store
            .update_user(account("ghost", "g@example.com"))
            .await
            .expect_err("unknown user");
        assert!(matches!(err, StoreError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn second_account_for_an_email_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open store");
        store
            .insert_user(account("u1", "a@example.com"))
            .await
            .expect("insert");
        let err = store
            .insert_user(account("u2", "a@example.com"))
            .await
            .expect_err("duplicate email");
        assert!(matches!(err, StoreError::DuplicateEmail(_)));
        assert_eq!(store.list_users().await.expect("list").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_marks_are_all_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(JsonFileStore::open(dir.path()).expect("open store"));
        let schedule = (0..16)
            .map(|i| {
                ScheduleEntry::new(format!("class-{i}"), "Monday", "9:00 AM", "10:00 AM", "Math")
            })
            .collect();
        store
            .replace_schedule("u1", schedule)
            .await
            .expect("seed schedule");

        let date = NaiveDate::from_ymd_opt(2024, 9, 2).expect("valid date");
        let ids = Arc::new(SequentialIds::new("rec"));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let record = AttendanceRecord::new(
                    ids.as_ref(),
                    format!("class-{i}"),
                    date,
                    AttendanceStatus::Present,
                );
                tokio::spawn(async move { store.mark_attendance("u1", record).await })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("mark");
        }

        let data = store.load_data("u1").await.expect("load");
        assert_eq!(data.records.len(), 16);
        assert_eq!(data.schedule.len(), 16);
    }

    #[tokio::test]
    async fn failed_update_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open store");
        let ids = SequentialIds::new("rec");
        let record = AttendanceRecord::new(
            &ids,
            "ghost",
            NaiveDate::from_ymd_opt(2024, 9, 2).expect("valid date"),
            AttendanceStatus::Absent,
        );
        let err = store
            .mark_attendance("u1", record)
            .await
            .expect_err("unknown class");
        assert!(matches!(err, StoreError::EntryNotFound(_)));
        assert!(!dir.path().join("storage_u1.json").exists());
    }
}
