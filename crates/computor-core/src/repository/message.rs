//! Message repository.
//!
//! Messages are soft-deleted (archived), and their unread counts surface in
//! the student and tutor content projections, which cache under the
//! `course_content:{id}` and `submission_group:{id}` tags carried here.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use computor_error::Result;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::Message;

const MESSAGE_COLUMNS: &str =
    "id, author_id, course_content_id, submission_group_id, course_id, user_id, archived_at";

fn message_from_row(row: &Row) -> Result<Message> {
    Ok(Message {
        id:                  row.try_get("id")?,
        author_id:           row.try_get("author_id")?,
        course_content_id:   row.try_get("course_content_id")?,
        submission_group_id: row.try_get("submission_group_id")?,
        course_id:           row.try_get("course_id")?,
        user_id:             row.try_get("user_id")?,
        archived_at:         row.try_get("archived_at")?,
    })
}

/// Patch for [`Message`]. Soft deletion sets `archived_at`.
#[derive(Debug, Default)]
pub struct MessagePatch {
    /// Set or clear the archive marker.
    pub archived_at: Option<Option<DateTime<Utc>>>,
}

/// Tag and SQL policy for [`Message`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePolicy;

/// Tags for a message row.
pub(crate) fn message_tags(entity: &Message) -> HashSet<String> {
    let mut tags =
        HashSet::from([format!("message:{}", entity.id), "message:list".to_string()]);
    if let Some(content_id) = entity.course_content_id {
        tags.insert(format!("course_content:{content_id}"));
        tags.insert(format!("message:content:{content_id}"));
    }
    if let Some(group_id) = entity.submission_group_id {
        tags.insert(format!("submission_group:{group_id}"));
        tags.insert(format!("message:group:{group_id}"));
    }
    tags.insert(format!("user:{}", entity.author_id));
    tags.insert(format!("message:author:{}", entity.author_id));
    tags
}

#[async_trait]
impl EntityPolicy for MessagePolicy {
    type Entity = Message;
    type Patch = MessagePatch;

    fn entity_type(&self) -> &'static str {
        "message"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn entity_id(&self, entity: &Message) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &Message) -> Result<HashSet<String>> {
        Ok(message_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["message:list".to_string()]);
        if let Some(content_id) = filters.get("course_content_id") {
            tags.insert(format!("message:content:{content_id}"));
            tags.insert(format!("course_content:{content_id}"));
        }
        if let Some(group_id) = filters.get("submission_group_id") {
            tags.insert(format!("message:group:{group_id}"));
            tags.insert(format!("submission_group:{group_id}"));
        }
        if let Some(author_id) = filters.get("author_id") {
            tags.insert(format!("message:author:{author_id}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<Message>> {
        let row = db
            .query_opt(format!("SELECT {MESSAGE_COLUMNS} FROM message WHERE id = $1").as_str(), &[&id])
            .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<Message>> {
        let (clause, params) = filter_clause(
            filters,
            &["course_content_id", "submission_group_id", "course_id", "user_id", "author_id"],
        )?;
        let rows = db
            .query(format!("SELECT {MESSAGE_COLUMNS} FROM message{clause}").as_str(), &params)
            .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &Message) -> Result<Message> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO message \
                     (id, author_id, course_content_id, submission_group_id, course_id, \
                      user_id, archived_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MESSAGE_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.author_id,
                    &entity.course_content_id,
                    &entity.submission_group_id,
                    &entity.course_id,
                    &entity.user_id,
                    &entity.archived_at,
                ],
            )
            .await?;
        message_from_row(&row)
    }

    async fn apply_update(&self, db: &Client, id: Uuid, patch: &MessagePatch) -> Result<Message> {
        let row = db
            .query_one(
                format!(
                    "UPDATE message SET \
                       archived_at = CASE WHEN $2 THEN $3 ELSE archived_at END \
                     WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
                ).as_str(),
                &[&id, &patch.archived_at.is_some(), &patch.archived_at.clone().flatten()],
            )
            .await?;
        message_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &Message) -> Result<()> {
        db.execute("DELETE FROM message WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_message_tags() {
        let entity = Message {
            id:                  Uuid::new_v4(),
            author_id:           Uuid::new_v4(),
            course_content_id:   Some(Uuid::new_v4()),
            submission_group_id: None,
            course_id:           None,
            user_id:             None,
            archived_at:         None,
        };
        let tags = message_tags(&entity);
        let content_id = entity.course_content_id.expect("set above");
        assert!(tags.contains(format!("course_content:{content_id}").as_str()));
        assert!(tags.contains(format!("message:content:{content_id}").as_str()));
        assert!(tags.contains(format!("user:{}", entity.author_id).as_str()));
    }

    #[test]
    fn test_group_message_tags() {
        let entity = Message {
            id:                  Uuid::new_v4(),
            author_id:           Uuid::new_v4(),
            course_content_id:   None,
            submission_group_id: Some(Uuid::new_v4()),
            course_id:           None,
            user_id:             None,
            archived_at:         None,
        };
        let tags = message_tags(&entity);
        let group_id = entity.submission_group_id.expect("set above");
        assert!(tags.contains(format!("submission_group:{group_id}").as_str()));
        assert!(tags.contains(format!("message:group:{group_id}").as_str()));
    }
}
