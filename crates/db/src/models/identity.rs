//! Identity and profile models.

use alem_core::identity::Identity;
use alem_core::roles::{Role, UnknownRole};
use alem_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `identities` table.
#[derive(Debug, Clone, FromRow)]
pub struct IdentityRow {
    pub id: DbId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub role: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl IdentityRow {
    /// Convert to the domain type, failing on a role the schema should have
    /// rejected.
    pub fn to_identity(&self) -> Result<Identity, UnknownRole> {
        Ok(Identity {
            id: self.id,
            email: self.email.clone(),
            phone: self.phone.clone(),
            role: self.role.parse::<Role>()?,
            created_at: self.created_at,
        })
    }
}

/// DTO for inserting an identity.
pub struct CreateIdentity<'a> {
    pub id: DbId,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub role: Role,
    pub created_at: Timestamp,
}

/// A row from the `user_profiles` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub user_id: DbId,
    pub first_name: String,
    pub last_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
