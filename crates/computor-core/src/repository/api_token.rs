//! API token repository.
//!
//! Token lookups sit on the hot authentication path, so they cache by hash
//! prefix; revocation is an update setting `revoked_at`, and the hash tag
//! guarantees the cached lookup dies with it.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use computor_error::Result;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::ApiToken;

const TOKEN_COLUMNS: &str = "id, user_id, name, token_hash, token_prefix, revoked_at";

fn token_from_row(row: &Row) -> Result<ApiToken> {
    Ok(ApiToken {
        id:           row.try_get("id")?,
        user_id:      row.try_get("user_id")?,
        name:         row.try_get("name")?,
        token_hash:   row.try_get("token_hash")?,
        token_prefix: row.try_get("token_prefix")?,
        revoked_at:   row.try_get("revoked_at")?,
    })
}

/// Patch for [`ApiToken`]. Revocation sets `revoked_at`.
#[derive(Debug, Default)]
pub struct ApiTokenPatch {
    /// New display name.
    pub name:       Option<String>,
    /// Set the revocation instant.
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Tag and SQL policy for [`ApiToken`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiTokenPolicy;

/// Tags for a token row.
pub(crate) fn api_token_tags(entity: &ApiToken) -> HashSet<String> {
    let mut tags = HashSet::from([
        format!("api_token:{}", entity.id),
        "api_token:list".to_string(),
        format!("api_token:user:{}", entity.user_id),
    ]);
    if let Some(name) = &entity.name {
        tags.insert(format!("api_token:name:{}:{name}", entity.user_id));
    }
    // Hash prefix tag keeps lookups-by-secret invalidatable without putting
    // the full hash into the tag namespace.
    let hash_prefix: String = entity.token_hash.chars().take(16).collect();
    tags.insert(format!("api_token:hash:{hash_prefix}"));
    tags
}

#[async_trait]
impl EntityPolicy for ApiTokenPolicy {
    type Entity = ApiToken;
    type Patch = ApiTokenPatch;

    fn entity_type(&self) -> &'static str {
        "api_token"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn entity_id(&self, entity: &ApiToken) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &ApiToken) -> Result<HashSet<String>> {
        Ok(api_token_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["api_token:list".to_string()]);
        if let Some(user_id) = filters.get("user_id") {
            tags.insert(format!("api_token:user:{user_id}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<ApiToken>> {
        let row = db
            .query_opt(format!("SELECT {TOKEN_COLUMNS} FROM api_token WHERE id = $1").as_str(), &[&id])
            .await?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<ApiToken>> {
        let (clause, params) = filter_clause(filters, &["user_id", "token_prefix", "name"])?;
        let rows = db
            .query(format!("SELECT {TOKEN_COLUMNS} FROM api_token{clause}").as_str(), &params)
            .await?;
        rows.iter().map(token_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &ApiToken) -> Result<ApiToken> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO api_token \
                     (id, user_id, name, token_hash, token_prefix, revoked_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {TOKEN_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.user_id,
                    &entity.name,
                    &entity.token_hash,
                    &entity.token_prefix,
                    &entity.revoked_at,
                ],
            )
            .await?;
        token_from_row(&row)
    }

    async fn apply_update(&self, db: &Client, id: Uuid, patch: &ApiTokenPatch) -> Result<ApiToken> {
        let row = db
            .query_one(
                format!(
                    "UPDATE api_token SET \
                       name = COALESCE($2, name), \
                       revoked_at = COALESCE($3, revoked_at) \
                     WHERE id = $1 RETURNING {TOKEN_COLUMNS}"
                ).as_str(),
                &[&id, &patch.name, &patch.revoked_at],
            )
            .await?;
        token_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &ApiToken) -> Result<()> {
        db.execute("DELETE FROM api_token WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_tags_include_hash_prefix() {
        let entity = ApiToken {
            id:           Uuid::new_v4(),
            user_id:      Uuid::new_v4(),
            name:         Some("ci".to_string()),
            token_hash:   "deadbeefdeadbeefdeadbeefdeadbeef".to_string(),
            token_prefix: "ctp_dead".to_string(),
            revoked_at:   None,
        };
        let tags = api_token_tags(&entity);
        assert!(tags.contains("api_token:hash:deadbeefdeadbeef"));
        assert!(tags.contains(format!("api_token:user:{}", entity.user_id).as_str()));
        assert!(tags.contains(format!("api_token:name:{}:ci", entity.user_id).as_str()));
    }

    #[test]
    fn test_revocation_does_not_shrink_tag_set() {
        let mut entity = ApiToken {
            id:           Uuid::new_v4(),
            user_id:      Uuid::new_v4(),
            name:         None,
            token_hash:   "cafebabecafebabecafebabecafebabe".to_string(),
            token_prefix: "ctp_cafe".to_string(),
            revoked_at:   None,
        };
        let before = api_token_tags(&entity);
        entity.revoked_at = Some(Utc::now());
        assert_eq!(before, api_token_tags(&entity));
    }
}
