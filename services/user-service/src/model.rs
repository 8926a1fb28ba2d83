//! Row types of the `uc_users` table

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::biz::UcUser;

pub const TABLE: &str = "uc_users";

#[derive(Debug, Clone, FromRow)]
pub struct UcUserRow {
    pub id: i64,
    /// Soft-delete flag, 0 = live
    pub is_del: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub serial_number: i64,
}

impl UcUserRow {
    pub fn into_domain(self) -> UcUser {
        UcUser {
            id: u64::try_from(self.id).unwrap_or_default(),
            name: self.name,
            serial_number: self.serial_number,
        }
    }
}
