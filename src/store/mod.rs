pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attendance::{upsert_record, AttendanceRecord};
use crate::error::StoreError;
use crate::schedule::ScheduleEntry;

pub use file::JsonFileStore;

/// Everything persisted for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserData {
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default)]
    pub records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl From<&UserAccount> for PublicUser {
    fn from(value: &UserAccount) -> Self {
        Self {
            id: value.id.clone(),
            email: value.email.clone(),
            name: value.name.clone(),
        }
    }
}

/// Edit applied to a user's data while the store holds its write lock.
pub type DataUpdate = Box<dyn FnOnce(&mut UserData) -> Result<(), StoreError> + Send>;

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Missing data reads as an empty schedule and no records.
    async fn load_data(&self, user_id: &str) -> Result<UserData, StoreError>;
    async fn save_data(&self, user_id: &str, data: &UserData) -> Result<(), StoreError>;
    /// Read, edit and write back as one step. Nothing is written when `update` fails.
    async fn update_data(&self, user_id: &str, update: DataUpdate)
        -> Result<UserData, StoreError>;
    async fn list_users(&self) -> Result<Vec<UserAccount>, StoreError>;
    /// Fails with `DuplicateEmail` when the address is taken.
    async fn insert_user(&self, user: UserAccount) -> Result<UserAccount, StoreError>;
    async fn update_user(&self, user: UserAccount) -> Result<UserAccount, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .find(|user| user.email == email))
    }

    /// Upserts `record` for a class that must exist in the user's schedule.
    async fn mark_attendance(
        &self,
        user_id: &str,
        record: AttendanceRecord,
    ) -> Result<UserData, StoreError> {
        let update: DataUpdate = Box::new(move |data: &mut UserData| {
            if !data
                .schedule
                .iter()
                .any(|entry| entry.id == record.schedule_item_id)
            {
                return Err(StoreError::EntryNotFound(record.schedule_item_id));
            }
            upsert_record(&mut data.records, record);
            Ok(())
        });
        self.update_data(user_id, update).await
    }

    /// Swaps in a new schedule and keeps the attendance history.
    async fn replace_schedule(
        &self,
        user_id: &str,
        schedule: Vec<ScheduleEntry>,
    ) -> Result<UserData, StoreError> {
        let update: DataUpdate = Box::new(move |data: &mut UserData| {
            data.schedule = schedule;
            Ok(())
        });
        self.update_data(user_id, update).await
    }
}
