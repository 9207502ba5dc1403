//! Composite view queries.
//!
//! The per-user content projections compose one SQL statement from named
//! subqueries (CTEs): latest result, result count, submission count, latest
//! submission-grade status (window function), and unread message counts —
//! all LEFT-joined over the course-content spine so a content without
//! submissions still appears, with COALESCE producing zeroes.
//!
//! Unread counts use `COUNT(DISTINCT ...)` and the outer select is DISTINCT:
//! eagerly-joined relations multiply rows, and without the distinct guard a
//! content with two group members would report every unread message twice.

pub mod gradings;

use computor_error::Result;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use crate::model::{GradingStatus, Ltree};

/// Whose submissions the query correlates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Correlate via user → member → group (student views).
    User(Uuid),
    /// Correlate via member → group (tutor and lecturer views).
    Member(Uuid),
}

/// Parameters of the composite content query.
#[derive(Debug, Clone)]
pub struct ContentQuery {
    /// Submission correlation scope.
    pub scope:             Scope,
    /// Reader whose unread counts are computed (excluded as author).
    pub reader_user_id:    Uuid,
    /// Restrict to one course.
    pub course_id:         Option<Uuid>,
    /// Restrict to one content (single-content reads).
    pub course_content_id: Option<Uuid>,
    /// Restrict to one content type.
    pub content_type_id:   Option<Uuid>,
    /// Restrict to a subtree.
    pub path_prefix:       Option<Ltree>,
    /// Include archived contents.
    pub include_archived:  bool,
}

impl ContentQuery {
    /// Query every content visible to the scope, unread counts for `reader`.
    #[must_use]
    pub fn new(scope: Scope, reader_user_id: Uuid) -> Self {
        Self {
            scope,
            reader_user_id,
            course_id: None,
            course_content_id: None,
            content_type_id: None,
            path_prefix: None,
            include_archived: false,
        }
    }
}

/// One row of the composite content query.
#[derive(Debug, Clone)]
pub struct CourseContentRow {
    /// Content id.
    pub course_content_id:      Uuid,
    /// Owning course.
    pub course_id:              Uuid,
    /// Owning course family.
    pub course_family_id:       Uuid,
    /// Tree position.
    pub path:                   Ltree,
    /// Display title.
    pub title:                  Option<String>,
    /// Content type.
    pub course_content_type_id: Uuid,
    /// Content kind.
    pub course_content_kind_id: String,
    /// Whether the kind receives submissions.
    pub submittable:            bool,
    /// Sibling ordering.
    pub position:               f64,
    /// Submission limit.
    pub max_submissions:        Option<i32>,
    /// The scope's submission group for this content, when one exists.
    pub submission_group_id:    Option<Uuid>,
    /// Total finished test results.
    pub result_count:           i64,
    /// Latest test result value.
    pub latest_result:          Option<f64>,
    /// Latest test result instant.
    pub latest_result_at:       Option<chrono::DateTime<chrono::Utc>>,
    /// Official submissions.
    pub submission_count:       i64,
    /// Latest grade value on the latest submitted artifact.
    pub grading:                Option<f64>,
    /// Latest grade status on the latest submitted artifact.
    pub grading_status:         Option<GradingStatus>,
    /// 1 when the latest submission has no grade or status `not_reviewed`.
    pub is_unreviewed:          i32,
    /// Unread messages on the content, for the reader.
    pub content_unread_count:   i64,
    /// Unread messages on the scope's group, for the reader.
    pub group_unread_count:     i64,
    /// Deployment status of the content, when one is deployed.
    pub deployment_status:      Option<String>,
}

impl CourseContentRow {
    /// Messages unread by the reader across both targets.
    #[must_use]
    pub fn unread_message_count(&self) -> i64 {
        self.content_unread_count + self.group_unread_count
    }
}

fn row_to_content(row: &Row) -> Result<CourseContentRow> {
    let status_code: Option<i32> = row.try_get("latest_grade_status")?;
    Ok(CourseContentRow {
        course_content_id:      row.try_get("id")?,
        course_id:              row.try_get("course_id")?,
        course_family_id:       row.try_get("course_family_id")?,
        path:                   Ltree::new(row.try_get::<_, String>("path")?)?,
        title:                  row.try_get("title")?,
        course_content_type_id: row.try_get("course_content_type_id")?,
        course_content_kind_id: row.try_get("course_content_kind_id")?,
        submittable:            row.try_get("submittable")?,
        position:               row.try_get("position")?,
        max_submissions:        row.try_get("max_submissions")?,
        submission_group_id:    row.try_get("submission_group_id")?,
        result_count:           row.try_get::<_, Option<i64>>("total_results_count")?.unwrap_or(0),
        latest_result:          row.try_get("result_grade")?,
        latest_result_at:       row.try_get("result_created_at")?,
        submission_count:       row.try_get::<_, Option<i64>>("submission_count")?.unwrap_or(0),
        grading:                row.try_get("latest_grade")?,
        grading_status:         status_code.map(GradingStatus::from_code),
        is_unreviewed:          row.try_get("is_unreviewed")?,
        content_unread_count:   row.try_get("content_unread_count")?,
        group_unread_count:     row.try_get("group_unread_count")?,
        deployment_status:      row.try_get("deployment_status")?,
    })
}

/// Compose the content query SQL for the given parameter shape.
///
/// `$1` is the scope id, `$2` the reader user id; optional filters take the
/// following positions in declaration order.
#[must_use]
pub fn content_query_sql(query: &ContentQuery) -> String {
    // The scope's submission groups; unrelated users' groups never join.
    let scope_groups = match query.scope {
        Scope::User(_) => {
            "SELECT sg.id FROM submission_group sg \
             JOIN submission_group_member sgm ON sgm.submission_group_id = sg.id \
             JOIN course_member cm ON cm.id = sgm.course_member_id \
             WHERE cm.user_id = $1"
        },
        Scope::Member(_) => {
            "SELECT sg.id FROM submission_group sg \
             JOIN submission_group_member sgm ON sgm.submission_group_id = sg.id \
             WHERE sgm.course_member_id = $1"
        },
    };
    let spine_filter = match query.scope {
        Scope::User(_) => "cm.user_id = $1",
        Scope::Member(_) => "cm.id = $1",
    };

    let mut conditions = vec![spine_filter.to_string()];
    let mut position = 2;
    if query.course_id.is_some() {
        position += 1;
        conditions.push(format!("cc.course_id = ${position}"));
    }
    if query.course_content_id.is_some() {
        position += 1;
        conditions.push(format!("cc.id = ${position}"));
    }
    if query.content_type_id.is_some() {
        position += 1;
        conditions.push(format!("cc.course_content_type_id = ${position}"));
    }
    if query.path_prefix.is_some() {
        position += 1;
        conditions.push(format!("cc.path <@ ${position}::ltree"));
    }
    if !query.include_archived {
        conditions.push("cc.archived_at IS NULL".to_string());
    }
    let where_clause = conditions.join(" AND ");

    format!(
        "WITH scope_groups AS ({scope_groups}), \
         latest_result AS ( \
             SELECT r.course_content_id, MAX(r.created_at) AS latest_result_at \
             FROM result r \
             WHERE r.submission_group_id IN (SELECT id FROM scope_groups) \
               AND r.status = 0 AND r.test_system_id IS NOT NULL \
             GROUP BY r.course_content_id), \
         results_count AS ( \
             SELECT r.course_content_id, COUNT(*) AS total_results_count \
             FROM result r \
             WHERE r.submission_group_id IN (SELECT id FROM scope_groups) \
               AND r.status = 0 AND r.test_system_id IS NOT NULL \
             GROUP BY r.course_content_id), \
         submission_count AS ( \
             SELECT sg.course_content_id, COUNT(sa.id) AS submission_count \
             FROM submission_artifact sa \
             JOIN submission_group sg ON sg.id = sa.submission_group_id \
             WHERE sa.submit AND sg.id IN (SELECT id FROM scope_groups) \
             GROUP BY sg.course_content_id), \
         latest_artifact AS ( \
             SELECT sa.submission_group_id, MAX(sa.created_at) AS latest_artifact_at \
             FROM submission_artifact sa WHERE sa.submit \
             GROUP BY sa.submission_group_id), \
         latest_grade AS ( \
             SELECT ranked.submission_group_id, ranked.status, ranked.grade \
             FROM ( \
                 SELECT sa.submission_group_id, g.status, g.grade, \
                        ROW_NUMBER() OVER (PARTITION BY sa.submission_group_id \
                                           ORDER BY g.graded_at DESC) AS rn \
                 FROM submission_artifact sa \
                 JOIN latest_artifact la \
                   ON la.submission_group_id = sa.submission_group_id \
                  AND la.latest_artifact_at = sa.created_at \
                 JOIN submission_grade g ON g.artifact_id = sa.id \
                 WHERE sa.submit \
             ) ranked WHERE ranked.rn = 1), \
         latest_grade_status AS ( \
             SELECT la.submission_group_id, \
                    lg.status AS latest_grade_status, \
                    lg.grade AS latest_grade, \
                    CASE WHEN lg.status IS NULL THEN 1 \
                         WHEN lg.status = 0 THEN 1 \
                         ELSE 0 END AS is_unreviewed \
             FROM latest_artifact la \
             LEFT JOIN latest_grade lg \
               ON lg.submission_group_id = la.submission_group_id), \
         unread_by_content AS ( \
             SELECT m.course_content_id, COUNT(DISTINCT m.id) AS unread_count \
             FROM message m \
             LEFT JOIN message_read mr \
               ON mr.message_id = m.id AND mr.reader_user_id = $2 \
             WHERE m.archived_at IS NULL AND m.course_content_id IS NOT NULL \
               AND m.submission_group_id IS NULL AND mr.id IS NULL \
               AND m.author_id <> $2 \
             GROUP BY m.course_content_id), \
         unread_by_group AS ( \
             SELECT m.submission_group_id, COUNT(DISTINCT m.id) AS unread_count \
             FROM message m \
             LEFT JOIN message_read mr \
               ON mr.message_id = m.id AND mr.reader_user_id = $2 \
             WHERE m.archived_at IS NULL AND m.submission_group_id IS NOT NULL \
               AND mr.id IS NULL AND m.author_id <> $2 \
             GROUP BY m.submission_group_id) \
         SELECT DISTINCT \
             cc.id, cc.course_id, c.course_family_id, cc.path::text AS path, cc.title, \
             cc.course_content_type_id, cc.course_content_kind_id, cck.submittable, \
             cc.position, cc.max_submissions, \
             sg.id AS submission_group_id, \
             rc.total_results_count, \
             r.result AS result_grade, r.created_at AS result_created_at, \
             sc.submission_count, \
             lgs.latest_grade, lgs.latest_grade_status, \
             COALESCE(lgs.is_unreviewed, 0) AS is_unreviewed, \
             COALESCE(uc.unread_count, 0) AS content_unread_count, \
             COALESCE(ug.unread_count, 0) AS group_unread_count, \
             d.deployment_status \
         FROM course_member cm \
         JOIN course c ON c.id = cm.course_id \
         JOIN course_content cc ON cc.course_id = c.id \
         JOIN course_content_kind cck ON cck.id = cc.course_content_kind_id \
         LEFT JOIN submission_group sg \
           ON sg.course_content_id = cc.id \
          AND sg.id IN (SELECT id FROM scope_groups) \
         LEFT JOIN latest_result lr ON lr.course_content_id = cc.id \
         LEFT JOIN result r \
           ON r.course_content_id = lr.course_content_id \
          AND r.created_at = lr.latest_result_at \
         LEFT JOIN results_count rc ON rc.course_content_id = cc.id \
         LEFT JOIN submission_count sc ON sc.course_content_id = cc.id \
         LEFT JOIN latest_grade_status lgs ON lgs.submission_group_id = sg.id \
         LEFT JOIN unread_by_content uc ON uc.course_content_id = cc.id \
         LEFT JOIN unread_by_group ug ON ug.submission_group_id = sg.id \
         LEFT JOIN course_content_deployment d ON d.course_content_id = cc.id \
         WHERE {where_clause} \
         ORDER BY cc.position, path"
    )
}

/// Run the composite content query.
pub async fn fetch_content_rows(
    db: &Client,
    query: &ContentQuery,
) -> Result<Vec<CourseContentRow>> {
    let sql = content_query_sql(query);

    let scope_id = match query.scope {
        Scope::User(id) | Scope::Member(id) => id,
    };
    let path_prefix = query.path_prefix.as_ref().map(Ltree::as_str);

    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&scope_id, &query.reader_user_id];
    if let Some(course_id) = &query.course_id {
        params.push(course_id);
    }
    if let Some(content_id) = &query.course_content_id {
        params.push(content_id);
    }
    if let Some(type_id) = &query.content_type_id {
        params.push(type_id);
    }
    if let Some(prefix) = &path_prefix {
        params.push(prefix);
    }

    let rows = db.query(sql.as_str(), &params).await?;
    rows.iter().map(row_to_content).collect()
}
