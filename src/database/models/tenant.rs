use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

/// A user's seat in a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub member_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}
