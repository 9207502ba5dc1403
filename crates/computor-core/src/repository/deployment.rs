//! Course content deployment repository.
//!
//! Deployments mutate while the workflow engine provisions example material
//! into a content. Student and tutor views embed deployment status in content
//! listings, so every deployment write carries the `course_content:{id}` tag.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use computor_error::Result;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::{CourseContentDeployment, Ltree};

const DEPLOYMENT_COLUMNS: &str = "id, course_content_id, example_version_id, deployment_status, \
                                  example_identifier::text AS example_identifier, workflow_id";

fn deployment_from_row(row: &Row) -> Result<CourseContentDeployment> {
    let identifier: Option<String> = row.try_get("example_identifier")?;
    Ok(CourseContentDeployment {
        id:                 row.try_get("id")?,
        course_content_id:  row.try_get("course_content_id")?,
        example_version_id: row.try_get("example_version_id")?,
        deployment_status:  row.try_get("deployment_status")?,
        example_identifier: identifier.map(Ltree::new).transpose()?,
        workflow_id:        row.try_get("workflow_id")?,
    })
}

/// Patch for [`CourseContentDeployment`].
#[derive(Debug, Default)]
pub struct CourseContentDeploymentPatch {
    /// New lifecycle status.
    pub deployment_status:  Option<String>,
    /// Pin a different example version.
    pub example_version_id: Option<Uuid>,
    /// New driving workflow.
    pub workflow_id:        Option<String>,
}

/// Tag and SQL policy for [`CourseContentDeployment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CourseContentDeploymentPolicy;

/// Tags for a deployment row.
pub(crate) fn deployment_tags(entity: &CourseContentDeployment) -> HashSet<String> {
    let mut tags = HashSet::from([
        format!("course_content_deployment:{}", entity.id),
        "course_content_deployment:list".to_string(),
        format!("course_content_deployment:content:{}", entity.course_content_id),
        format!("course_content:{}", entity.course_content_id),
        format!("course_content_deployment:status:{}", entity.deployment_status),
    ]);
    if let Some(version_id) = entity.example_version_id {
        tags.insert(format!("course_content_deployment:version:{version_id}"));
        tags.insert(format!("example_version:{version_id}"));
    }
    if let Some(identifier) = &entity.example_identifier {
        tags.insert(format!("course_content_deployment:example_identifier:{identifier}"));
    }
    if let Some(workflow_id) = &entity.workflow_id {
        tags.insert(format!("course_content_deployment:workflow:{workflow_id}"));
    }
    tags
}

#[async_trait]
impl EntityPolicy for CourseContentDeploymentPolicy {
    type Entity = CourseContentDeployment;
    type Patch = CourseContentDeploymentPatch;

    fn entity_type(&self) -> &'static str {
        "course_content_deployment"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn entity_id(&self, entity: &CourseContentDeployment) -> Uuid {
        entity.id
    }

    async fn entity_tags(
        &self,
        _db: &Client,
        entity: &CourseContentDeployment,
    ) -> Result<HashSet<String>> {
        Ok(deployment_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["course_content_deployment:list".to_string()]);
        if let Some(content_id) = filters.get("course_content_id") {
            tags.insert(format!("course_content_deployment:content:{content_id}"));
            tags.insert(format!("course_content:{content_id}"));
        }
        if let Some(status) = filters.get("deployment_status") {
            tags.insert(format!("course_content_deployment:status:{status}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<CourseContentDeployment>> {
        let row = db
            .query_opt(
                format!(
                    "SELECT {DEPLOYMENT_COLUMNS} FROM course_content_deployment WHERE id = $1"
                ).as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(deployment_from_row).transpose()
    }

    async fn fetch_filtered(
        &self,
        db: &Client,
        filters: &Filters,
    ) -> Result<Vec<CourseContentDeployment>> {
        let (clause, params) = filter_clause(
            filters,
            &["course_content_id", "deployment_status", "example_identifier"],
        )?;
        let rows = db
            .query(
                format!("SELECT {DEPLOYMENT_COLUMNS} FROM course_content_deployment{clause}").as_str(),
                &params,
            )
            .await?;
        rows.iter().map(deployment_from_row).collect()
    }

    async fn insert(
        &self,
        db: &Client,
        entity: &CourseContentDeployment,
    ) -> Result<CourseContentDeployment> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO course_content_deployment \
                     (id, course_content_id, example_version_id, deployment_status, \
                      example_identifier, workflow_id) \
                     VALUES ($1, $2, $3, $4, $5::ltree, $6) RETURNING {DEPLOYMENT_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.course_content_id,
                    &entity.example_version_id,
                    &entity.deployment_status,
                    &entity.example_identifier.as_ref().map(Ltree::as_str),
                    &entity.workflow_id,
                ],
            )
            .await?;
        deployment_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &CourseContentDeploymentPatch,
    ) -> Result<CourseContentDeployment> {
        let row = db
            .query_one(
                format!(
                    "UPDATE course_content_deployment SET \
                       deployment_status = COALESCE($2, deployment_status), \
                       example_version_id = COALESCE($3, example_version_id), \
                       workflow_id = COALESCE($4, workflow_id) \
                     WHERE id = $1 RETURNING {DEPLOYMENT_COLUMNS}"
                ).as_str(),
                &[&id, &patch.deployment_status, &patch.example_version_id, &patch.workflow_id],
            )
            .await?;
        deployment_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &CourseContentDeployment) -> Result<()> {
        db.execute("DELETE FROM course_content_deployment WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_tags_pin_content() {
        let entity = CourseContentDeployment {
            id:                 Uuid::new_v4(),
            course_content_id:  Uuid::new_v4(),
            example_version_id: Some(Uuid::new_v4()),
            deployment_status:  "deployed".to_string(),
            example_identifier: Some(Ltree::new("itp.py.hello").expect("valid path")),
            workflow_id:        None,
        };
        let tags = deployment_tags(&entity);
        // Student/tutor views embed deployment status under this tag.
        assert!(tags.contains(format!("course_content:{}", entity.course_content_id).as_str()));
        assert!(tags.contains(format!(
            "example_version:{}",
            entity.example_version_id.expect("set above")
        ).as_str()));
        assert!(tags
            .contains("course_content_deployment:example_identifier:itp.py.hello"));
        assert!(tags.contains("course_content_deployment:status:deployed"));
    }

    #[test]
    fn test_status_transition_union_covers_old_status() {
        let mut entity = CourseContentDeployment {
            id:                 Uuid::new_v4(),
            course_content_id:  Uuid::new_v4(),
            example_version_id: None,
            deployment_status:  "pending".to_string(),
            example_identifier: None,
            workflow_id:        None,
        };
        let before = deployment_tags(&entity);
        entity.deployment_status = "deployed".to_string();
        let after = deployment_tags(&entity);

        let union: HashSet<_> = before.union(&after).collect();
        assert!(union.contains(&"course_content_deployment:status:pending".to_string()));
        assert!(union.contains(&"course_content_deployment:status:deployed".to_string()));
    }
}
