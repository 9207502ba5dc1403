//! Pure aggregation transforms.
//!
//! Everything here is deterministic and non-suspending: hierarchical
//! tree-path rollups, the grading-status reduction, and the per-member batch
//! statistics. Identical input rows produce byte-identical output, which is
//! what makes the cached projections reproducible.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{GradingStatus, Ltree};

/// Combine per-descendant grading statuses into one enclosing-node status.
///
/// Priority rules:
/// 1. Any `correction_necessary` → `correction_necessary`.
/// 2. Else any `improvement_possible` → `improvement_possible`.
/// 3. Else all `corrected` → `corrected`.
/// 4. Else → `not_reviewed`.
///
/// Empty input yields no status.
#[must_use]
pub fn reduce_grading_status(statuses: &[GradingStatus]) -> Option<GradingStatus> {
    if statuses.is_empty() {
        return None;
    }
    if statuses.contains(&GradingStatus::CorrectionNecessary) {
        return Some(GradingStatus::CorrectionNecessary);
    }
    if statuses.contains(&GradingStatus::ImprovementPossible) {
        return Some(GradingStatus::ImprovementPossible);
    }
    if statuses.iter().all(|s| *s == GradingStatus::Corrected) {
        return Some(GradingStatus::Corrected);
    }
    Some(GradingStatus::NotReviewed)
}

/// Content-type identity carried through rollups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeInfo {
    /// Content type id.
    pub course_content_type_id: Uuid,
    /// Stable slug.
    pub slug:                   String,
    /// Display title.
    pub title:                  Option<String>,
    /// Display color.
    pub color:                  Option<String>,
}

/// One submittable content row, as returned by the gradings queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittableContent {
    /// Content id.
    pub course_content_id: Uuid,
    /// Tree position.
    pub path:              Ltree,
    /// Display title.
    pub title:             Option<String>,
    /// Content type.
    pub content_type:      ContentTypeInfo,
}

/// A content the member submitted at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedContent {
    /// Content id.
    pub course_content_id:    Uuid,
    /// Tree position.
    pub path:                 Ltree,
    /// Content type id.
    pub content_type_id:      Uuid,
    /// Latest official submission instant.
    pub latest_submission_at: Option<DateTime<Utc>>,
}

/// Latest grade for a content (ungraded and unsubmitted contribute 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedContent {
    /// Content id.
    pub course_content_id: Uuid,
    /// Latest grade, 0 when none exists.
    pub grade:             f64,
    /// Latest grade status, `None` when no grade exists.
    pub status:            Option<GradingStatus>,
}

/// Per-content-type breakdown of a rollup node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypeStats {
    /// Content type id.
    pub course_content_type_id: Uuid,
    /// Stable slug.
    pub course_content_type_slug: String,
    /// Display title.
    pub course_content_type_title: Option<String>,
    /// Display color.
    pub course_content_type_color: Option<String>,
    /// Submittable descendants of this type.
    pub max_assignments: u32,
    /// Of those, how many were submitted.
    pub submitted_assignments: u32,
    /// `100 · submitted / max`, 0 when max is 0.
    pub progress_percentage: f64,
    /// Latest submission across descendants of this type.
    pub latest_submission_at: Option<DateTime<Utc>>,
}

/// One rollup node, produced per path prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupNode {
    /// The path prefix this node aggregates.
    pub path: String,
    /// Title of the content at this exact path, when one exists.
    pub title: Option<String>,
    /// Submittable descendants under the prefix.
    pub max_assignments: u32,
    /// Of those, how many were submitted.
    pub submitted_assignments: u32,
    /// `100 · submitted / max`, 0 when max is 0.
    pub progress_percentage: f64,
    /// Latest submission across descendants.
    pub latest_submission_at: Option<DateTime<Utc>>,
    /// Breakdown by content type, ordered by slug.
    pub by_content_type: Vec<ContentTypeStats>,
    /// Descendants carrying a grade value (actual, or 0 when missing).
    pub graded_assignments: u32,
    /// Average grade across descendants, missing grades as 0.
    pub average_grading: Option<f64>,
    /// Status reduction over descendants' latest-grade statuses.
    pub aggregated_grading_status: Option<GradingStatus>,
}

/// Full hierarchical rollup for one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRollup {
    /// All submittable contents in scope.
    pub total_max_assignments: u32,
    /// Of those, how many were submitted.
    pub total_submitted_assignments: u32,
    /// `100 · submitted / max`, 0 when max is 0.
    pub overall_progress_percentage: f64,
    /// Latest submission overall.
    pub latest_submission_at: Option<DateTime<Utc>>,
    /// Average grade overall, missing grades as 0.
    pub overall_average_grading: Option<f64>,
    /// Course-level breakdown by content type, ordered by slug.
    pub by_content_type: Vec<ContentTypeStats>,
    /// One node per path prefix, depth-first then lexicographic.
    pub nodes: Vec<RollupNode>,
}

fn percentage(submitted: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        f64::from(submitted) / f64::from(max) * 100.0
    }
}

fn latest_of(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Content types present in the input, keyed by slug for stable ordering.
fn content_types_by_slug(
    submittable: &[SubmittableContent],
) -> BTreeMap<String, ContentTypeInfo> {
    let mut types = BTreeMap::new();
    for content in submittable {
        types
            .entry(content.content_type.slug.clone())
            .or_insert_with(|| content.content_type.clone());
    }
    types
}

fn content_type_stats<'a>(
    contents: impl Iterator<Item = &'a SubmittableContent> + Clone,
    submitted_ids: &HashSet<Uuid>,
    submitted_by_id: &HashMap<Uuid, &SubmittedContent>,
    types: &BTreeMap<String, ContentTypeInfo>,
) -> Vec<ContentTypeStats> {
    let mut stats = Vec::new();
    for info in types.values() {
        let ct_contents: Vec<&SubmittableContent> = contents
            .clone()
            .filter(|c| c.content_type.course_content_type_id == info.course_content_type_id)
            .collect();
        if ct_contents.is_empty() {
            continue;
        }

        #[allow(clippy::cast_possible_truncation)]
        let max = ct_contents.len() as u32;
        let mut submitted = 0u32;
        let mut latest = None;
        for content in &ct_contents {
            if submitted_ids.contains(&content.course_content_id) {
                submitted += 1;
            }
            if let Some(sub) = submitted_by_id.get(&content.course_content_id) {
                latest = latest_of(latest, sub.latest_submission_at);
            }
        }

        stats.push(ContentTypeStats {
            course_content_type_id: info.course_content_type_id,
            course_content_type_slug: info.slug.clone(),
            course_content_type_title: info.title.clone(),
            course_content_type_color: info.color.clone(),
            max_assignments: max,
            submitted_assignments: submitted,
            progress_percentage: percentage(submitted, max),
            latest_submission_at: latest,
        });
    }
    stats
}

/// Hierarchical rollup over the tree-path course-content structure.
///
/// Produces one node per prefix of any submittable path (up to `max_depth`
/// labels when given), ordered by depth then lexicographically. Unsubmitted
/// and ungraded contents contribute grade 0 to `average_grading` and status
/// `not_reviewed` to the reduction.
#[must_use]
pub fn rollup_grading_stats(
    submittable: &[SubmittableContent],
    submitted: &[SubmittedContent],
    graded: &[GradedContent],
    path_titles: &BTreeMap<String, String>,
    max_depth: Option<usize>,
) -> GradingRollup {
    let submitted_ids: HashSet<Uuid> =
        submitted.iter().map(|s| s.course_content_id).collect();
    let submitted_by_id: HashMap<Uuid, &SubmittedContent> =
        submitted.iter().map(|s| (s.course_content_id, s)).collect();
    let graded_by_id: HashMap<Uuid, &GradedContent> =
        graded.iter().map(|g| (g.course_content_id, g)).collect();
    let types = content_types_by_slug(submittable);

    // Every prefix of every submittable path, depth-filtered, sorted by
    // (depth, path) for deterministic node order.
    let mut prefixes: Vec<Ltree> = submittable
        .iter()
        .flat_map(|c| c.path.prefixes())
        .filter(|p| max_depth.is_none_or(|d| p.nlevel() <= d))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    prefixes.sort_by_key(|p| (p.nlevel(), p.as_str().to_string()));

    let mut nodes = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let under: Vec<&SubmittableContent> =
            submittable.iter().filter(|c| c.path.is_descendant_of(&prefix)).collect();
        if under.is_empty() {
            continue;
        }

        #[allow(clippy::cast_possible_truncation)]
        let max = under.len() as u32;
        let mut submitted_count = 0u32;
        let mut latest = None;
        let mut grade_sum = 0.0;
        let mut statuses = Vec::with_capacity(under.len());
        for content in &under {
            if submitted_ids.contains(&content.course_content_id) {
                submitted_count += 1;
            }
            if let Some(sub) = submitted_by_id.get(&content.course_content_id) {
                latest = latest_of(latest, sub.latest_submission_at);
            }
            let graded = graded_by_id.get(&content.course_content_id);
            grade_sum += graded.map_or(0.0, |g| g.grade);
            statuses.push(
                graded.and_then(|g| g.status).unwrap_or(GradingStatus::NotReviewed),
            );
        }

        nodes.push(RollupNode {
            path: prefix.as_str().to_string(),
            title: path_titles.get(prefix.as_str()).cloned(),
            max_assignments: max,
            submitted_assignments: submitted_count,
            progress_percentage: percentage(submitted_count, max),
            latest_submission_at: latest,
            by_content_type: content_type_stats(
                under.iter().copied(),
                &submitted_ids,
                &submitted_by_id,
                &types,
            ),
            graded_assignments: max,
            average_grading: Some(grade_sum / f64::from(max)),
            aggregated_grading_status: reduce_grading_status(&statuses),
        });
    }

    // Course-level totals.
    #[allow(clippy::cast_possible_truncation)]
    let total_max = submittable.len() as u32;
    let total_submitted = submittable
        .iter()
        .filter(|c| submitted_ids.contains(&c.course_content_id))
        .count();
    #[allow(clippy::cast_possible_truncation)]
    let total_submitted = total_submitted as u32;
    let latest = submitted.iter().fold(None, |acc, s| latest_of(acc, s.latest_submission_at));
    let overall_average = if submittable.is_empty() {
        None
    } else {
        let sum: f64 = submittable
            .iter()
            .map(|c| graded_by_id.get(&c.course_content_id).map_or(0.0, |g| g.grade))
            .sum();
        Some(sum / f64::from(total_max))
    };

    GradingRollup {
        total_max_assignments: total_max,
        total_submitted_assignments: total_submitted,
        overall_progress_percentage: percentage(total_submitted, total_max),
        latest_submission_at: latest,
        overall_average_grading: overall_average,
        by_content_type: content_type_stats(
            submittable.iter(),
            &submitted_ids,
            &submitted_by_id,
            &types,
        ),
        nodes,
    }
}

/// Identity of a course member in batch statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Course member id.
    pub course_member_id: Uuid,
    /// User id.
    pub user_id:          Option<Uuid>,
    /// Login name.
    pub username:         Option<String>,
    /// Given name.
    pub given_name:       Option<String>,
    /// Family name.
    pub family_name:      Option<String>,
    /// Student number within the organization.
    pub student_id:       Option<String>,
}

/// One member's submission of one content, from the course-wide batch query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSubmittedContent {
    /// Submitting member.
    pub course_member_id:     Uuid,
    /// Content id.
    pub course_content_id:    Uuid,
    /// Tree position.
    pub path:                 Ltree,
    /// Content type id.
    pub content_type_id:      Uuid,
    /// Latest official submission instant.
    pub latest_submission_at: Option<DateTime<Utc>>,
}

/// Course-level statistics for one member (no hierarchy nodes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberGradingStats {
    /// Member identity.
    pub member: MemberInfo,
    /// All submittable contents in scope.
    pub total_max_assignments: u32,
    /// Of those, how many this member submitted.
    pub total_submitted_assignments: u32,
    /// `100 · submitted / max`, 0 when max is 0.
    pub overall_progress_percentage: f64,
    /// This member's latest submission.
    pub latest_submission_at: Option<DateTime<Utc>>,
    /// Breakdown by content type, ordered by slug.
    pub by_content_type: Vec<ContentTypeStats>,
}

/// Batch course-level statistics for every member in one pass.
///
/// Members with no submissions get zeroed stats; missing contents contribute
/// 0 submissions.
#[must_use]
pub fn rollup_stats_for_all_members(
    submittable: &[SubmittableContent],
    all_submitted: &[MemberSubmittedContent],
    members: &[MemberInfo],
) -> Vec<MemberGradingStats> {
    let types = content_types_by_slug(submittable);
    #[allow(clippy::cast_possible_truncation)]
    let total_max = submittable.len() as u32;

    let mut by_member: HashMap<Uuid, Vec<&MemberSubmittedContent>> = HashMap::new();
    for submitted in all_submitted {
        by_member.entry(submitted.course_member_id).or_default().push(submitted);
    }

    members
        .iter()
        .map(|member| {
            let submissions = by_member.get(&member.course_member_id);
            let submitted_ids: HashSet<Uuid> = submissions
                .map(|subs| subs.iter().map(|s| s.course_content_id).collect())
                .unwrap_or_default();
            let submitted_rows: Vec<SubmittedContent> = submissions
                .map(|subs| {
                    subs.iter()
                        .map(|s| SubmittedContent {
                            course_content_id:    s.course_content_id,
                            path:                 s.path.clone(),
                            content_type_id:      s.content_type_id,
                            latest_submission_at: s.latest_submission_at,
                        })
                        .collect()
                })
                .unwrap_or_default();
            let submitted_by_id: HashMap<Uuid, &SubmittedContent> =
                submitted_rows.iter().map(|s| (s.course_content_id, s)).collect();

            let total_submitted = submittable
                .iter()
                .filter(|c| submitted_ids.contains(&c.course_content_id))
                .count();
            #[allow(clippy::cast_possible_truncation)]
            let total_submitted = total_submitted as u32;
            let latest = submitted_rows
                .iter()
                .fold(None, |acc, s| latest_of(acc, s.latest_submission_at));

            MemberGradingStats {
                member: member.clone(),
                total_max_assignments: total_max,
                total_submitted_assignments: total_submitted,
                overall_progress_percentage: percentage(total_submitted, total_max),
                latest_submission_at: latest,
                by_content_type: content_type_stats(
                    submittable.iter(),
                    &submitted_ids,
                    &submitted_by_id,
                    &types,
                ),
            }
        })
        .collect()
}
