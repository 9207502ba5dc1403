//! Grading statistics queries.
//!
//! Scoped reads feeding the pure rollup aggregators: the submittable content
//! set, a member's submitted contents, the member's latest grade per content
//! (LATERAL, newest `graded_at` wins), and the course-wide batch of every
//! member's submissions in one aggregation.

use std::collections::BTreeMap;

use computor_error::Result;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;
use uuid::Uuid;

use crate::aggregate::{
    ContentTypeInfo, GradedContent, MemberInfo, MemberSubmittedContent, SubmittableContent,
    SubmittedContent,
};
use crate::model::{GradingStatus, Ltree};

/// Optional scope filters shared by the gradings queries.
#[derive(Debug, Clone, Default)]
pub struct GradingScope {
    /// Restrict to a subtree.
    pub path_prefix:     Option<Ltree>,
    /// Restrict to one content type.
    pub content_type_id: Option<Uuid>,
}

fn scope_conditions(scope: &GradingScope, mut position: usize) -> (String, usize) {
    let mut sql = String::new();
    if scope.path_prefix.is_some() {
        position += 1;
        sql.push_str(format!(" AND cc.path <@ ${position}::ltree").as_str());
    }
    if scope.content_type_id.is_some() {
        position += 1;
        sql.push_str(format!(" AND cct.id = ${position}").as_str());
    }
    (sql, position)
}

/// All submittable, non-archived contents of a course.
pub async fn fetch_submittable_contents(
    db: &Client,
    course_id: Uuid,
    scope: &GradingScope,
) -> Result<Vec<SubmittableContent>> {
    let (conditions, _) = scope_conditions(scope, 1);
    let sql = format!(
        "SELECT cc.id, cc.path::text AS path, cc.title, \
                cct.id AS content_type_id, cct.slug, cct.title AS content_type_title, \
                cct.color \
         FROM course_content cc \
         JOIN course_content_type cct ON cct.id = cc.course_content_type_id \
         JOIN course_content_kind cck ON cck.id = cct.course_content_kind_id \
         WHERE cc.course_id = $1 AND cck.submittable AND cc.archived_at IS NULL{conditions} \
         ORDER BY cc.path"
    );

    let prefix = scope.path_prefix.as_ref().map(Ltree::as_str);
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&course_id];
    if let Some(prefix) = &prefix {
        params.push(prefix);
    }
    if let Some(type_id) = &scope.content_type_id {
        params.push(type_id);
    }

    let rows = db.query(sql.as_str(), &params).await?;
    rows.iter()
        .map(|row| {
            Ok(SubmittableContent {
                course_content_id: row.try_get("id")?,
                path:              Ltree::new(row.try_get::<_, String>("path")?)?,
                title:             row.try_get("title")?,
                content_type:      ContentTypeInfo {
                    course_content_type_id: row.try_get("content_type_id")?,
                    slug:                   row.try_get("slug")?,
                    title:                  row.try_get("content_type_title")?,
                    color:                  row.try_get("color")?,
                },
            })
        })
        .collect()
}

/// Contents with at least one official submission by the member.
pub async fn fetch_member_submitted_contents(
    db: &Client,
    course_member_id: Uuid,
    course_id: Uuid,
    scope: &GradingScope,
) -> Result<Vec<SubmittedContent>> {
    let (conditions, _) = scope_conditions(scope, 2);
    let sql = format!(
        "SELECT cc.id, cc.path::text AS path, cct.id AS content_type_id, \
                MAX(sa.created_at) AS latest_submission_at \
         FROM submission_artifact sa \
         JOIN submission_group sg ON sg.id = sa.submission_group_id \
         JOIN submission_group_member sgm ON sgm.submission_group_id = sg.id \
         JOIN course_content cc ON cc.id = sg.course_content_id \
         JOIN course_content_type cct ON cct.id = cc.course_content_type_id \
         JOIN course_content_kind cck ON cck.id = cct.course_content_kind_id \
         WHERE sgm.course_member_id = $1 AND cc.course_id = $2 AND sa.submit \
           AND cck.submittable AND cc.archived_at IS NULL{conditions} \
         GROUP BY cc.id, cc.path, cct.id"
    );

    let prefix = scope.path_prefix.as_ref().map(Ltree::as_str);
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&course_member_id, &course_id];
    if let Some(prefix) = &prefix {
        params.push(prefix);
    }
    if let Some(type_id) = &scope.content_type_id {
        params.push(type_id);
    }

    let rows = db.query(sql.as_str(), &params).await?;
    rows.iter()
        .map(|row| {
            Ok(SubmittedContent {
                course_content_id:    row.try_get("id")?,
                path:                 Ltree::new(row.try_get::<_, String>("path")?)?,
                content_type_id:      row.try_get("content_type_id")?,
                latest_submission_at: row.try_get("latest_submission_at")?,
            })
        })
        .collect()
}

/// Latest grade per submittable content for a member.
///
/// Grades can land on any artifact of the member's group; the LATERAL picks
/// the newest by `graded_at`. Contents without any grade come back with
/// grade 0 and no status, so downstream averages include them.
pub async fn fetch_member_graded_contents(
    db: &Client,
    course_member_id: Uuid,
    course_id: Uuid,
) -> Result<Vec<GradedContent>> {
    let sql = "SELECT cc.id, \
                      COALESCE(latest_grade.grade, 0) AS grade, \
                      latest_grade.status \
               FROM course_content cc \
               JOIN course_content_type cct ON cct.id = cc.course_content_type_id \
               JOIN course_content_kind cck ON cck.id = cct.course_content_kind_id \
               LEFT JOIN LATERAL ( \
                   SELECT g.grade, g.status \
                   FROM submission_grade g \
                   JOIN submission_artifact sa ON sa.id = g.artifact_id \
                   JOIN submission_group sg ON sg.id = sa.submission_group_id \
                   JOIN submission_group_member sgm \
                     ON sgm.submission_group_id = sg.id \
                   WHERE sg.course_content_id = cc.id \
                     AND sgm.course_member_id = $1 \
                   ORDER BY g.graded_at DESC \
                   LIMIT 1 \
               ) latest_grade ON true \
               WHERE cc.course_id = $2 AND cck.submittable AND cc.archived_at IS NULL";

    let rows = db.query(sql, &[&course_member_id, &course_id]).await?;
    rows.iter()
        .map(|row| {
            let status: Option<i32> = row.try_get("status")?;
            Ok(GradedContent {
                course_content_id: row.try_get("id")?,
                grade:             row.try_get("grade")?,
                status:            status.map(GradingStatus::from_code),
            })
        })
        .collect()
}

/// Titles of every non-archived content path in a course.
pub async fn fetch_path_titles(db: &Client, course_id: Uuid) -> Result<BTreeMap<String, String>> {
    let rows = db
        .query(
            "SELECT path::text AS path, title FROM course_content \
             WHERE course_id = $1 AND archived_at IS NULL",
            &[&course_id],
        )
        .await?;

    let mut titles = BTreeMap::new();
    for row in &rows {
        if let Some(title) = row.try_get::<_, Option<String>>("title")? {
            titles.insert(row.try_get::<_, String>("path")?, title);
        }
    }
    Ok(titles)
}

/// Every `_student` member of a course, ordered by name.
pub async fn fetch_student_members(db: &Client, course_id: Uuid) -> Result<Vec<MemberInfo>> {
    let rows = db
        .query(
            "SELECT cm.id AS course_member_id, cm.user_id, \
                    u.username, u.given_name, u.family_name, \
                    sp.student_id \
             FROM course_member cm \
             JOIN \"user\" u ON u.id = cm.user_id \
             LEFT JOIN student_profile sp \
               ON sp.user_id = cm.user_id \
              AND sp.organization_id = (SELECT organization_id FROM course WHERE id = $1) \
             WHERE cm.course_id = $1 AND cm.course_role_id = '_student' \
             ORDER BY u.family_name, u.given_name",
            &[&course_id],
        )
        .await?;

    rows.iter()
        .map(|row| {
            Ok(MemberInfo {
                course_member_id: row.try_get("course_member_id")?,
                user_id:          row.try_get("user_id")?,
                username:         row.try_get("username")?,
                given_name:       row.try_get("given_name")?,
                family_name:      row.try_get("family_name")?,
                student_id:       row.try_get("student_id")?,
            })
        })
        .collect()
}

/// Every (member, content) submission in a course, one SQL aggregation.
///
/// The batch feed for [`crate::aggregate::rollup_stats_for_all_members`],
/// avoiding a per-member query fan-out.
pub async fn fetch_all_submitted_for_course(
    db: &Client,
    course_id: Uuid,
    scope: &GradingScope,
) -> Result<Vec<MemberSubmittedContent>> {
    let (conditions, _) = scope_conditions(scope, 1);
    let sql = format!(
        "SELECT sgm.course_member_id, cc.id, cc.path::text AS path, \
                cct.id AS content_type_id, \
                MAX(sa.created_at) AS latest_submission_at \
         FROM submission_artifact sa \
         JOIN submission_group sg ON sg.id = sa.submission_group_id \
         JOIN submission_group_member sgm ON sgm.submission_group_id = sg.id \
         JOIN course_content cc ON cc.id = sg.course_content_id \
         JOIN course_content_type cct ON cct.id = cc.course_content_type_id \
         JOIN course_content_kind cck ON cck.id = cct.course_content_kind_id \
         WHERE cc.course_id = $1 AND sa.submit \
           AND cck.submittable AND cc.archived_at IS NULL{conditions} \
         GROUP BY sgm.course_member_id, cc.id, cc.path, cct.id"
    );

    let prefix = scope.path_prefix.as_ref().map(Ltree::as_str);
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&course_id];
    if let Some(prefix) = &prefix {
        params.push(prefix);
    }
    if let Some(type_id) = &scope.content_type_id {
        params.push(type_id);
    }

    let rows = db.query(sql.as_str(), &params).await?;
    rows.iter()
        .map(|row| {
            Ok(MemberSubmittedContent {
                course_member_id:     row.try_get("course_member_id")?,
                course_content_id:    row.try_get("id")?,
                path:                 Ltree::new(row.try_get::<_, String>("path")?)?,
                content_type_id:      row.try_get("content_type_id")?,
                latest_submission_at: row.try_get("latest_submission_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_conditions_number_params_after_fixed_ones() {
        let scope = GradingScope {
            path_prefix:     Some(Ltree::new("w1").expect("valid path")),
            content_type_id: Some(Uuid::nil()),
        };
        let (sql, last) = scope_conditions(&scope, 2);
        assert!(sql.contains("cc.path <@ $3::ltree"));
        assert!(sql.contains("cct.id = $4"));
        assert_eq!(last, 4);
    }

    #[test]
    fn test_empty_scope_adds_no_conditions() {
        let (sql, last) = scope_conditions(&GradingScope::default(), 1);
        assert!(sql.is_empty());
        assert_eq!(last, 1);
    }
}
