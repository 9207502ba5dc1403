//! Submission group, artifact, and grade repositories.
//!
//! This file carries the heaviest invalidation fan-out in the system. A grade
//! feeds three projections: the artifact's latest-status, the group's
//! aggregated status, and every group member's grading dashboard. The writer
//! resolves (artifact → group → members) once, at write time, to learn the
//! member set; the mapping is immutable relative to the artifact and group,
//! so the resolution itself is safe to cache.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use computor_cache::Cache;
use computor_error::{CoreError, Result};
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{filter_clause, EntityPolicy, Filters};
use crate::model::{GradingStatus, SubmissionArtifact, SubmissionGrade, SubmissionGroup};

const GROUP_COLUMNS: &str = "id, course_id, course_content_id, max_test_runs, max_submissions";
const ARTIFACT_COLUMNS: &str =
    "id, submission_group_id, uploaded_by_course_member_id, submit, created_at";
const GRADE_COLUMNS: &str =
    "id, artifact_id, graded_by_course_member_id, grade, status, graded_at";

fn group_from_row(row: &Row) -> Result<SubmissionGroup> {
    Ok(SubmissionGroup {
        id:                row.try_get("id")?,
        course_id:         row.try_get("course_id")?,
        course_content_id: row.try_get("course_content_id")?,
        max_test_runs:     row.try_get("max_test_runs")?,
        max_submissions:   row.try_get("max_submissions")?,
    })
}

fn artifact_from_row(row: &Row) -> Result<SubmissionArtifact> {
    Ok(SubmissionArtifact {
        id:                           row.try_get("id")?,
        submission_group_id:          row.try_get("submission_group_id")?,
        uploaded_by_course_member_id: row.try_get("uploaded_by_course_member_id")?,
        submit:                       row.try_get("submit")?,
        created_at:                   row.try_get("created_at")?,
    })
}

fn grade_from_row(row: &Row) -> Result<SubmissionGrade> {
    Ok(SubmissionGrade {
        id:                         row.try_get("id")?,
        artifact_id:                row.try_get("artifact_id")?,
        graded_by_course_member_id: row.try_get("graded_by_course_member_id")?,
        grade:                      row.try_get("grade")?,
        status:                     GradingStatus::from_code(row.try_get("status")?),
        graded_at:                  row.try_get("graded_at")?,
    })
}

/// The course and member set behind a submission group.
///
/// Both attributes are immutable for the life of the group, which is what
/// makes resolving them once per write sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupScope {
    pub course_id:  Uuid,
    pub member_ids: Vec<Uuid>,
}

/// Resolve (group → course, members) for a submission group.
async fn resolve_group_scope(db: &Client, group_id: Uuid) -> Result<Option<GroupScope>> {
    let rows = db
        .query(
            "SELECT sg.course_id, sgm.course_member_id \
             FROM submission_group sg \
             LEFT JOIN submission_group_member sgm ON sgm.submission_group_id = sg.id \
             WHERE sg.id = $1",
            &[&group_id],
        )
        .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let course_id = first.try_get("course_id")?;
    let mut member_ids = Vec::new();
    for row in &rows {
        if let Some(member_id) = row.try_get::<_, Option<Uuid>>("course_member_id")? {
            member_ids.push(member_id);
        }
    }
    Ok(Some(GroupScope { course_id, member_ids }))
}

/// Resolve (artifact → group → course, members) for a grade write.
async fn resolve_artifact_scope(db: &Client, artifact_id: Uuid) -> Result<Option<GroupScope>> {
    let rows = db
        .query(
            "SELECT sg.course_id, sgm.course_member_id \
             FROM submission_artifact sa \
             JOIN submission_group sg ON sg.id = sa.submission_group_id \
             LEFT JOIN submission_group_member sgm ON sgm.submission_group_id = sg.id \
             WHERE sa.id = $1",
            &[&artifact_id],
        )
        .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let course_id = first.try_get("course_id")?;
    let mut member_ids = Vec::new();
    for row in &rows {
        if let Some(member_id) = row.try_get::<_, Option<Uuid>>("course_member_id")? {
            member_ids.push(member_id);
        }
    }
    Ok(Some(GroupScope { course_id, member_ids }))
}

// ============================================================================
// SubmissionGroup
// ============================================================================

/// Tag and SQL policy for [`SubmissionGroup`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionGroupPolicy;

/// Tags for a submission-group row.
pub(crate) fn submission_group_tags(entity: &SubmissionGroup) -> HashSet<String> {
    HashSet::from([
        format!("submission_group:{}", entity.id),
        "submission_group:list".to_string(),
        format!("submission_group:course:{}", entity.course_id),
        format!("course:{}", entity.course_id),
        format!("submission_group:content:{}", entity.course_content_id),
        format!("course_content:{}", entity.course_content_id),
    ])
}

#[async_trait]
impl EntityPolicy for SubmissionGroupPolicy {
    type Entity = SubmissionGroup;
    type Patch = ();

    fn entity_type(&self) -> &'static str {
        "submission_group"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(600)
    }

    fn entity_id(&self, entity: &SubmissionGroup) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, _db: &Client, entity: &SubmissionGroup) -> Result<HashSet<String>> {
        Ok(submission_group_tags(entity))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["submission_group:list".to_string()]);
        if let Some(course_id) = filters.get("course_id") {
            tags.insert(format!("submission_group:course:{course_id}"));
            tags.insert(format!("course:{course_id}"));
        }
        if let Some(content_id) = filters.get("course_content_id") {
            tags.insert(format!("submission_group:content:{content_id}"));
            tags.insert(format!("course_content:{content_id}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<SubmissionGroup>> {
        let row = db
            .query_opt(
                format!("SELECT {GROUP_COLUMNS} FROM submission_group WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<SubmissionGroup>> {
        let (clause, params) = filter_clause(filters, &["course_id", "course_content_id"])?;
        let rows = db
            .query(format!("SELECT {GROUP_COLUMNS} FROM submission_group{clause}").as_str(), &params)
            .await?;
        rows.iter().map(group_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &SubmissionGroup) -> Result<SubmissionGroup> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO submission_group \
                     (id, course_id, course_content_id, max_test_runs, max_submissions) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {GROUP_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.course_id,
                    &entity.course_content_id,
                    &entity.max_test_runs,
                    &entity.max_submissions,
                ],
            )
            .await?;
        group_from_row(&row)
    }

    async fn apply_update(
        &self,
        _db: &Client,
        _id: Uuid,
        _patch: &(),
    ) -> Result<SubmissionGroup> {
        // Groups are course-scoped for life and carry no mutable attributes
        // at this layer; membership changes go through their own rows.
        Err(CoreError::validation("submission groups are not updatable"))
    }

    async fn remove(&self, db: &Client, entity: &SubmissionGroup) -> Result<()> {
        db.execute("DELETE FROM submission_group WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

// ============================================================================
// SubmissionArtifact
// ============================================================================

/// Tag and SQL policy for [`SubmissionArtifact`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionArtifactPolicy;

/// Tags for an artifact row, given the resolved group scope.
pub(crate) fn submission_artifact_tags(
    entity: &SubmissionArtifact,
    scope: Option<&GroupScope>,
) -> HashSet<String> {
    let mut tags = HashSet::from([
        format!("submission_artifact:{}", entity.id),
        "submission_artifact:list".to_string(),
        format!("submission_group:{}", entity.submission_group_id),
        format!("submission_artifact:group:{}", entity.submission_group_id),
        format!("submission_artifact:submit:{}", entity.submit),
    ]);

    if let Some(scope) = scope {
        tags.insert(format!("tutor_view:{}", scope.course_id));
        tags.insert(format!("lecturer_view:{}", scope.course_id));
        tags.insert(format!("student_view:{}", scope.course_id));
        tags.insert(format!("course:{}", scope.course_id));
        for member_id in &scope.member_ids {
            tags.insert(format!("cm_grading:{member_id}"));
            tags.insert(format!("course_member:{member_id}"));
        }
    }

    if let Some(uploader) = entity.uploaded_by_course_member_id {
        tags.insert(format!("course_member:{uploader}"));
        tags.insert(format!("submission_artifact:member:{uploader}"));
    }
    tags
}

#[async_trait]
impl EntityPolicy for SubmissionArtifactPolicy {
    type Entity = SubmissionArtifact;
    type Patch = ();

    fn entity_type(&self) -> &'static str {
        "submission_artifact"
    }

    fn ttl(&self) -> Duration {
        // Frequently created during active work.
        Duration::from_secs(300)
    }

    fn entity_id(&self, entity: &SubmissionArtifact) -> Uuid {
        entity.id
    }

    async fn entity_tags(
        &self,
        db: &Client,
        entity: &SubmissionArtifact,
    ) -> Result<HashSet<String>> {
        let scope = resolve_group_scope(db, entity.submission_group_id).await?;
        Ok(submission_artifact_tags(entity, scope.as_ref()))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["submission_artifact:list".to_string()]);
        if let Some(group_id) = filters.get("submission_group_id") {
            tags.insert(format!("submission_artifact:group:{group_id}"));
            tags.insert(format!("submission_group:{group_id}"));
        }
        if let Some(member_id) = filters.get("uploaded_by_course_member_id") {
            tags.insert(format!("submission_artifact:member:{member_id}"));
            tags.insert(format!("course_member:{member_id}"));
        }
        if let Some(submit) = filters.get("submit") {
            tags.insert(format!("submission_artifact:submit:{submit}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<SubmissionArtifact>> {
        let row = db
            .query_opt(
                format!("SELECT {ARTIFACT_COLUMNS} FROM submission_artifact WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn fetch_filtered(
        &self,
        db: &Client,
        filters: &Filters,
    ) -> Result<Vec<SubmissionArtifact>> {
        let (clause, params) = filter_clause(
            filters,
            &["submission_group_id", "uploaded_by_course_member_id", "submit"],
        )?;
        let rows = db
            .query(
                format!(
                    "SELECT {ARTIFACT_COLUMNS} FROM submission_artifact{clause} \
                     ORDER BY created_at DESC"
                ).as_str(),
                &params,
            )
            .await?;
        rows.iter().map(artifact_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &SubmissionArtifact) -> Result<SubmissionArtifact> {
        let row = db
            .query_one(
                format!(
                    "INSERT INTO submission_artifact \
                     (id, submission_group_id, uploaded_by_course_member_id, submit, created_at) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {ARTIFACT_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.submission_group_id,
                    &entity.uploaded_by_course_member_id,
                    &entity.submit,
                    &entity.created_at,
                ],
            )
            .await?;
        artifact_from_row(&row)
    }

    async fn apply_update(
        &self,
        _db: &Client,
        _id: Uuid,
        _patch: &(),
    ) -> Result<SubmissionArtifact> {
        Err(CoreError::validation("submission artifacts are immutable once uploaded"))
    }

    async fn remove(&self, db: &Client, entity: &SubmissionArtifact) -> Result<()> {
        db.execute("DELETE FROM submission_artifact WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

// ============================================================================
// SubmissionGrade
// ============================================================================

/// Patch for [`SubmissionGrade`].
///
/// Grades are append-only in spirit — the usual write is a new row — but a
/// grader may amend their own latest grade in place.
#[derive(Debug, Default)]
pub struct SubmissionGradePatch {
    /// New grade in `[0, 1]`.
    pub grade:  Option<f64>,
    /// New review status.
    pub status: Option<GradingStatus>,
}

/// Tag and SQL policy for [`SubmissionGrade`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionGradePolicy;

/// Tags for a grade row, given the resolved artifact scope.
pub(crate) fn submission_grade_tags(
    entity: &SubmissionGrade,
    scope: Option<&GroupScope>,
) -> HashSet<String> {
    let mut tags = HashSet::from([
        format!("submission_grade:{}", entity.id),
        "submission_grade:list".to_string(),
        format!("submission_grade:artifact:{}", entity.artifact_id),
        format!("submission_artifact:{}", entity.artifact_id),
        format!("submission_grade:status:{}", entity.status.code()),
    ]);

    if let Some(scope) = scope {
        tags.insert(format!("course:{}", scope.course_id));
        tags.insert(format!("course_id:{}", scope.course_id));
        tags.insert(format!("student_view:{}", scope.course_id));
        tags.insert(format!("tutor_view:{}", scope.course_id));
        tags.insert(format!("lecturer_view:{}", scope.course_id));
        for member_id in &scope.member_ids {
            tags.insert(format!("cm_grading:{member_id}"));
            tags.insert(format!("course_member:{member_id}"));
            tags.insert(format!("course_member_id:{member_id}"));
        }
    }

    if let Some(grader) = entity.graded_by_course_member_id {
        tags.insert(format!("submission_grade:grader:{grader}"));
    }
    tags
}

#[async_trait]
impl EntityPolicy for SubmissionGradePolicy {
    type Entity = SubmissionGrade;
    type Patch = SubmissionGradePatch;

    fn entity_type(&self) -> &'static str {
        "submission_grade"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn entity_id(&self, entity: &SubmissionGrade) -> Uuid {
        entity.id
    }

    async fn entity_tags(&self, db: &Client, entity: &SubmissionGrade) -> Result<HashSet<String>> {
        let scope = resolve_artifact_scope(db, entity.artifact_id).await?;
        Ok(submission_grade_tags(entity, scope.as_ref()))
    }

    fn list_tags(&self, filters: &Filters) -> HashSet<String> {
        let mut tags = HashSet::from(["submission_grade:list".to_string()]);
        if let Some(artifact_id) = filters.get("artifact_id") {
            tags.insert(format!("submission_grade:artifact:{artifact_id}"));
            tags.insert(format!("submission_artifact:{artifact_id}"));
        }
        if let Some(grader) = filters.get("graded_by_course_member_id") {
            tags.insert(format!("submission_grade:grader:{grader}"));
        }
        if let Some(status) = filters.get("status") {
            tags.insert(format!("submission_grade:status:{status}"));
        }
        tags
    }

    async fn fetch_by_id(&self, db: &Client, id: Uuid) -> Result<Option<SubmissionGrade>> {
        let row = db
            .query_opt(
                format!("SELECT {GRADE_COLUMNS} FROM submission_grade WHERE id = $1").as_str(),
                &[&id],
            )
            .await?;
        row.as_ref().map(grade_from_row).transpose()
    }

    async fn fetch_filtered(&self, db: &Client, filters: &Filters) -> Result<Vec<SubmissionGrade>> {
        let (clause, params) =
            filter_clause(filters, &["artifact_id", "graded_by_course_member_id", "status"])?;
        let rows = db
            .query(
                format!(
                    "SELECT {GRADE_COLUMNS} FROM submission_grade{clause} ORDER BY graded_at DESC"
                ).as_str(),
                &params,
            )
            .await?;
        rows.iter().map(grade_from_row).collect()
    }

    async fn insert(&self, db: &Client, entity: &SubmissionGrade) -> Result<SubmissionGrade> {
        if !(0.0..=1.0).contains(&entity.grade) {
            return Err(CoreError::validation("grade must be within [0, 1]"));
        }
        let row = db
            .query_one(
                format!(
                    "INSERT INTO submission_grade \
                     (id, artifact_id, graded_by_course_member_id, grade, status, graded_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {GRADE_COLUMNS}"
                ).as_str(),
                &[
                    &entity.id,
                    &entity.artifact_id,
                    &entity.graded_by_course_member_id,
                    &entity.grade,
                    &entity.status.code(),
                    &entity.graded_at,
                ],
            )
            .await?;
        grade_from_row(&row)
    }

    async fn apply_update(
        &self,
        db: &Client,
        id: Uuid,
        patch: &SubmissionGradePatch,
    ) -> Result<SubmissionGrade> {
        if let Some(grade) = patch.grade {
            if !(0.0..=1.0).contains(&grade) {
                return Err(CoreError::validation("grade must be within [0, 1]"));
            }
        }
        let row = db
            .query_one(
                format!(
                    "UPDATE submission_grade SET \
                       grade = COALESCE($2, grade), \
                       status = COALESCE($3, status) \
                     WHERE id = $1 RETURNING {GRADE_COLUMNS}"
                ).as_str(),
                &[&id, &patch.grade, &patch.status.map(GradingStatus::code)],
            )
            .await?;
        grade_from_row(&row)
    }

    async fn remove(&self, db: &Client, entity: &SubmissionGrade) -> Result<()> {
        db.execute("DELETE FROM submission_grade WHERE id = $1", &[&entity.id]).await?;
        Ok(())
    }
}

/// Latest artifact in a submission group, cache-assisted.
///
/// Hot path for submission flows. The entry carries the group's full tag set
/// plus `submission_artifact:latest:{group}`, so any artifact write in the
/// group replaces the lookup and a targeted bump stays possible.
pub async fn find_latest_artifact_by_group(
    db: &Client,
    cache: Option<&Cache>,
    submission_group_id: Uuid,
) -> Result<Option<SubmissionArtifact>> {
    let key = cache.map(|cache| {
        cache.entity_key("submission_artifact", &format!("latest:{submission_group_id}"))
    });
    if let (Some(cache), Some(key)) = (cache, &key) {
        if let Some(artifact) = cache.get_by_key::<SubmissionArtifact>(key).await {
            return Ok(Some(artifact));
        }
    }

    let row = db
        .query_opt(
            format!(
                "SELECT {ARTIFACT_COLUMNS} FROM submission_artifact \
                 WHERE submission_group_id = $1 ORDER BY created_at DESC LIMIT 1"
            )
            .as_str(),
            &[&submission_group_id],
        )
        .await?;
    let artifact = row.as_ref().map(artifact_from_row).transpose()?;

    if let (Some(cache), Some(key), Some(artifact)) = (cache, &key, &artifact) {
        let scope = resolve_group_scope(db, submission_group_id).await?;
        let mut tags = submission_artifact_tags(artifact, scope.as_ref());
        tags.insert(format!("submission_artifact:latest:{submission_group_id}"));
        cache.set_with_tags(key, artifact, tags, Some(Duration::from_secs(300))).await;
    }
    Ok(artifact)
}

/// Latest grade for an artifact, by grading instant.
pub async fn find_latest_grade_by_artifact(
    db: &Client,
    artifact_id: Uuid,
) -> Result<Option<SubmissionGrade>> {
    let row = db
        .query_opt(
            format!(
                "SELECT {GRADE_COLUMNS} FROM submission_grade \
                 WHERE artifact_id = $1 ORDER BY graded_at DESC LIMIT 1"
            ).as_str(),
            &[&artifact_id],
        )
        .await?;
    row.as_ref().map(grade_from_row).transpose()
}

/// Average grade across an artifact's grades, `None` when ungraded.
pub async fn average_grade_for_artifact(db: &Client, artifact_id: Uuid) -> Result<Option<f64>> {
    let row = db
        .query_one(
            "SELECT AVG(grade) FROM submission_grade WHERE artifact_id = $1",
            &[&artifact_id],
        )
        .await?;
    Ok(row.try_get(0)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn scope() -> GroupScope {
        GroupScope {
            course_id:  Uuid::new_v4(),
            member_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        }
    }

    fn grade(artifact_id: Uuid) -> SubmissionGrade {
        SubmissionGrade {
            id:                         Uuid::new_v4(),
            artifact_id,
            graded_by_course_member_id: Some(Uuid::new_v4()),
            grade:                      0.6,
            status:                     GradingStatus::Corrected,
            graded_at:                  Utc::now(),
        }
    }

    #[test]
    fn test_grade_tags_fan_out_to_every_member_dashboard() {
        let scope = scope();
        let entity = grade(Uuid::new_v4());
        let tags = submission_grade_tags(&entity, Some(&scope));

        for member_id in &scope.member_ids {
            assert!(tags.contains(format!("cm_grading:{member_id}").as_str()));
            assert!(tags.contains(format!("course_member:{member_id}").as_str()));
            assert!(tags.contains(format!("course_member_id:{member_id}").as_str()));
        }
        assert!(tags.contains(format!("student_view:{}", scope.course_id).as_str()));
        assert!(tags.contains(format!("tutor_view:{}", scope.course_id).as_str()));
        assert!(tags.contains(format!("lecturer_view:{}", scope.course_id).as_str()));
        assert!(tags.contains(format!("course_id:{}", scope.course_id).as_str()));
        assert!(tags.contains(format!("submission_artifact:{}", entity.artifact_id).as_str()));
    }

    #[test]
    fn test_grade_status_change_union_covers_both_statuses() {
        // The §8 scenario: replacing a corrected grade with
        // correction_necessary must invalidate caches pinned to either state.
        let scope = scope();
        let mut entity = grade(Uuid::new_v4());
        let before = submission_grade_tags(&entity, Some(&scope));
        entity.status = GradingStatus::CorrectionNecessary;
        entity.grade = 0.9;
        let after = submission_grade_tags(&entity, Some(&scope));

        let union: HashSet<_> = before.union(&after).cloned().collect();
        assert!(union.contains("submission_grade:status:1"));
        assert!(union.contains("submission_grade:status:2"));
        // Projection buckets are present regardless of the grade value.
        assert!(union.contains(format!("student_view:{}", scope.course_id).as_str()));
    }

    #[test]
    fn test_grade_tags_without_scope_still_pin_artifact() {
        let entity = grade(Uuid::new_v4());
        let tags = submission_grade_tags(&entity, None);
        assert!(tags.contains(format!("submission_artifact:{}", entity.artifact_id).as_str()));
        assert!(tags.contains(format!("submission_grade:{}", entity.id).as_str()));
    }

    #[test]
    fn test_artifact_tags_cover_group_and_views() {
        let scope = scope();
        let entity = SubmissionArtifact {
            id:                           Uuid::new_v4(),
            submission_group_id:          Uuid::new_v4(),
            uploaded_by_course_member_id: Some(scope.member_ids[0]),
            submit:                       true,
            created_at:                   Utc::now(),
        };
        let tags = submission_artifact_tags(&entity, Some(&scope));
        assert!(tags.contains(format!("submission_group:{}", entity.submission_group_id).as_str()));
        assert!(tags.contains("submission_artifact:submit:true"));
        assert!(tags.contains(format!("tutor_view:{}", scope.course_id).as_str()));
        assert!(tags.contains(format!("cm_grading:{}", scope.member_ids[1]).as_str()));
        assert!(tags.contains(format!("submission_artifact:member:{}", scope.member_ids[0]).as_str()));
    }

    #[test]
    fn test_group_tags_pin_course_and_content() {
        let entity = SubmissionGroup {
            id:                Uuid::new_v4(),
            course_id:         Uuid::new_v4(),
            course_content_id: Uuid::new_v4(),
            max_test_runs:     None,
            max_submissions:   None,
        };
        let tags = submission_group_tags(&entity);
        assert!(tags.contains(format!("course:{}", entity.course_id).as_str()));
        assert!(tags.contains(format!("course_content:{}", entity.course_content_id).as_str()));
    }
}
