//! Customer profiles backed by the `user_profiles` table.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use parley_core::error::ParleyError;

use crate::db::{storage_err, Database};

/// Fields to write for a user. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate<'a> {
    pub name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub preferences: Option<&'a Value>,
}

/// A stored customer profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub preferences: Option<Value>,
    pub created_at: i64,
    pub last_interaction: i64,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the profile or merge `update` into it, and stamp the
    /// interaction time. Returns the stored profile.
    pub fn upsert(
        &self,
        user_id: &str,
        update: &ProfileUpdate<'_>,
    ) -> Result<UserProfile, ParleyError> {
        if user_id.trim().is_empty() {
            return Err(ParleyError::Storage("user id must not be blank".to_string()));
        }
        let preferences_json = update.preferences.map(serde_json::to_string).transpose()?;

        let profile = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_profiles (user_id, name, email, phone, preferences)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     name = COALESCE(excluded.name, name),
                     email = COALESCE(excluded.email, email),
                     phone = COALESCE(excluded.phone, phone),
                     preferences = COALESCE(excluded.preferences, preferences),
                     last_interaction = strftime('%s', 'now')",
                params![user_id, update.name, update.email, update.phone, preferences_json],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to save user profile: {}", e)))?;

            conn.query_row(SELECT_PROFILE, params![user_id], |row| Ok(row_to_profile(row)))
                .map_err(storage_err)?
        })?;

        debug!(user_id = %profile.user_id, "User profile saved");
        Ok(profile)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<UserProfile>, ParleyError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(SELECT_PROFILE, params![user_id], |row| Ok(row_to_profile(row)))
                .optional()
                .map_err(storage_err)?;
            result.transpose()
        })
    }
}

const SELECT_PROFILE: &str = "SELECT user_id, name, email, phone, preferences, created_at, last_interaction
     FROM user_profiles WHERE user_id = ?1";

fn row_to_profile(row: &Row<'_>) -> Result<UserProfile, ParleyError> {
    let preferences_json: Option<String> = row.get(4).map_err(storage_err)?;
    let preferences = preferences_json
        .map(|json| serde_json::from_str::<Value>(&json))
        .transpose()?;
    Ok(UserProfile {
        user_id: row.get(0).map_err(storage_err)?,
        name: row.get(1).map_err(storage_err)?,
        email: row.get(2).map_err(storage_err)?,
        phone: row.get(3).map_err(storage_err)?,
        preferences,
        created_at: row.get(5).map_err(storage_err)?,
        last_interaction: row.get(6).map_err(storage_err)?,
    })
}
