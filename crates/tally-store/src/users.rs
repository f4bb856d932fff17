//! Users table backing the dashboard login gate.

use crate::sqlite::{initialize_schema, open_connection};
use crate::{StoreError, StoreResult};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Viewer,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Viewer => "viewer",
        }
    }

    fn parse(value: &str) -> StoreResult<Self> {
        match value {
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            other => Err(StoreError::InvalidPersistedValue {
                field: "role",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

/// Credential store sharing the log database file.
#[derive(Debug, Clone)]
pub struct UserStore {
    db_path: PathBuf,
    hash_cost: u32,
}

impl UserStore {
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = open_connection(&db_path)?;
        initialize_schema(&connection)?;
        // Lower cost factor for development speed.
        let hash_cost = if cfg!(debug_assertions) { 4 } else { 10 };
        Ok(Self { db_path, hash_cost })
    }

    /// Creates `username` if missing. An existing user whose stored hash no
    /// longer matches `password` gets its hash and role refreshed.
    pub fn ensure_user(&self, username: &str, password: &str, role: UserRole) -> StoreResult<User> {
        if let Some(existing) = self.find_user(username)? {
            if bcrypt::verify(password, &existing.password_hash)? && existing.role == role {
                return Ok(existing);
            }
            let password_hash = bcrypt::hash(password, self.hash_cost)?;
            let connection = open_connection(&self.db_path)?;
            connection.execute(
                "UPDATE users SET password_hash = ?1, role = ?2 WHERE id = ?3",
                params![password_hash, role.as_str(), existing.id],
            )?;
            tracing::info!(username, "refreshed bootstrap user credentials");
            return Ok(User {
                password_hash,
                role,
                ..existing
            });
        }

        let password_hash = bcrypt::hash(password, self.hash_cost)?;
        let connection = open_connection(&self.db_path)?;
        connection.execute(
            "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
            params![username, password_hash, role.as_str()],
        )?;
        tracing::info!(username, role = role.as_str(), "created bootstrap user");
        Ok(User {
            id: connection.last_insert_rowid(),
            username: username.to_string(),
            password_hash,
            role,
        })
    }

    pub fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        let connection = open_connection(&self.db_path)?;
        let row = connection
            .query_row(
                "SELECT id, username, password_hash, role FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, username, password_hash, role)| {
            Ok(User {
                id,
                username,
                password_hash,
                role: UserRole::parse(&role)?,
            })
        })
        .transpose()
    }

    /// Returns the user when `password` matches the stored bcrypt hash.
    pub fn verify_credentials(&self, username: &str, password: &str) -> StoreResult<Option<User>> {
        let Some(user) = self.find_user(username)? else {
            return Ok(None);
        };
        if bcrypt::verify(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}
