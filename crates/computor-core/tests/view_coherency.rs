//! End-to-end coherency properties of the view layer.
//!
//! Uses an in-memory cache backend and a connection pool pointing at a
//! deliberately unreachable endpoint: the pool builds lazily, so a cache hit
//! that touches it at all fails loudly.

use std::sync::Arc;
use std::time::Duration;

use computor_cache::{Cache, RelatedId};
use computor_core::config::DatabaseConfig;
use computor_core::db::{create_pool, PgPool};
use computor_core::model::{GradingStatus, Ltree};
use computor_core::views::{StudentCourseContent, StudentViewRepository, ViewContext};
use serde_json::Value;
use uuid::Uuid;

fn unreachable_pool() -> PgPool {
    let config = DatabaseConfig {
        host:            "127.0.0.1".to_string(),
        port:            1,
        user:            "nobody".to_string(),
        password:        "wrong".to_string(),
        dbname:          "absent".to_string(),
        pool_size:       1,
        acquire_timeout: Duration::from_millis(200),
    };
    create_pool(&config).expect("pool construction is lazy")
}

fn content_dto(id: Uuid, course_id: Uuid) -> StudentCourseContent {
    StudentCourseContent {
        id,
        course_id,
        course_family_id: Uuid::new_v4(),
        path: Ltree::new("w1.a").expect("valid path"),
        title: Some("Hello".to_string()),
        course_content_type_id: Uuid::new_v4(),
        submittable: true,
        position: 1.0,
        max_submissions: Some(3),
        submission_group_id: Some(Uuid::new_v4()),
        result_count: 2,
        latest_result: Some(0.9),
        latest_result_at: None,
        submission_count: 1,
        status: Some(GradingStatus::Corrected),
        grading: Some(0.6),
        unread_message_count: 1,
        unreviewed_count: 0,
        deployment_status: Some("deployed".to_string()),
    }
}

#[tokio::test]
async fn cache_hit_acquires_no_database_connection() {
    let cache = Arc::new(Cache::in_memory("computor"));
    let user_id = Uuid::new_v4();
    let content_id = Uuid::new_v4();
    let dto = content_dto(content_id, Uuid::new_v4());

    cache
        .set_user_view(
            &user_id.to_string(),
            "course_content",
            Some(&content_id.to_string()),
            &dto,
            None,
            &[],
        )
        .await;

    let ctx = ViewContext::new(unreachable_pool(), Some(cache), None);
    let repo = StudentViewRepository::new(ctx);

    let got = repo.get_course_content(user_id, content_id).await.expect("served from cache");
    assert_eq!(got.id, content_id);
    assert_eq!(got.status, Some(GradingStatus::Corrected));

    // The whole point: the hit path never consulted the pool.
    assert!(!repo.context().db().was_acquired());
}

#[tokio::test]
async fn cache_miss_surfaces_store_unavailable() {
    let cache = Arc::new(Cache::in_memory("computor"));
    let ctx = ViewContext::new(unreachable_pool(), Some(cache), None);
    let repo = StudentViewRepository::new(ctx);

    let err = repo
        .get_course_content(Uuid::new_v4(), Uuid::new_v4())
        .await
        .expect_err("no database behind the pool");
    assert_eq!(err.error_code(), "store_unavailable");
}

#[tokio::test]
async fn grade_write_fanout_kills_every_dependent_projection() {
    // The §8 cascade, expressed against the cache contract: a grade write on
    // an artifact in a two-member group invalidates the student view, the
    // tutor view, and both members' grading dashboards, while an unrelated
    // course's views survive.
    let cache = Cache::in_memory("computor");
    let course = Uuid::new_v4();
    let other_course = Uuid::new_v4();
    let (member_a, member_b) = (Uuid::new_v4(), Uuid::new_v4());
    let (student, tutor) = (Uuid::new_v4(), Uuid::new_v4());

    cache
        .set_user_view(
            &student.to_string(),
            "course_contents:abc",
            None,
            &serde_json::json!([{"grade": 0.6}]),
            None,
            &[RelatedId::pair("student_view", &course.to_string())],
        )
        .await;
    cache
        .set_user_view(
            &tutor.to_string(),
            "tutor:courses",
            None,
            &serde_json::json!([1]),
            None,
            &[RelatedId::pair("tutor_view", &course.to_string())],
        )
        .await;
    cache
        .set_user_view(
            &tutor.to_string(),
            &format!("cm_grading:{member_a}"),
            None,
            &serde_json::json!({"avg": 0.6}),
            None,
            &[RelatedId::pair("cm_grading", &member_a.to_string())],
        )
        .await;
    cache
        .set_user_view(
            &tutor.to_string(),
            &format!("cm_grading:{member_b}"),
            None,
            &serde_json::json!({"avg": 0.6}),
            None,
            &[RelatedId::pair("cm_grading", &member_b.to_string())],
        )
        .await;
    cache
        .set_user_view(
            &student.to_string(),
            "other",
            None,
            &serde_json::json!(1),
            None,
            &[RelatedId::pair("student_view", &other_course.to_string())],
        )
        .await;

    // The tag set a grade write resolves at write time (artifact → group →
    // members) and invalidates.
    let write_tags = vec![
        format!("student_view:{course}"),
        format!("tutor_view:{course}"),
        format!("lecturer_view:{course}"),
        format!("cm_grading:{member_a}"),
        format!("cm_grading:{member_b}"),
        format!("course_id:{course}"),
    ];
    cache.invalidate_tags(&write_tags).await;

    let student_view: Option<Value> =
        cache.get_user_view(&student.to_string(), "course_contents:abc", None).await;
    let tutor_view: Option<Value> =
        cache.get_user_view(&tutor.to_string(), "tutor:courses", None).await;
    let dash_a: Option<Value> =
        cache.get_user_view(&tutor.to_string(), &format!("cm_grading:{member_a}"), None).await;
    let dash_b: Option<Value> =
        cache.get_user_view(&tutor.to_string(), &format!("cm_grading:{member_b}"), None).await;
    let unrelated: Option<Value> =
        cache.get_user_view(&student.to_string(), "other", None).await;

    assert_eq!(student_view, None);
    assert_eq!(tutor_view, None);
    assert_eq!(dash_a, None);
    assert_eq!(dash_b, None);
    assert!(unrelated.is_some());
}

#[tokio::test]
async fn example_version_cascade_reaches_every_deploying_course() {
    // Three courses deploy the same example identifier; creating a new
    // version invalidates each deploying content's projections.
    let cache = Cache::in_memory("computor");
    let contents: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    for (index, content_id) in contents.iter().enumerate() {
        cache
            .set_user_view(
                &format!("user-{index}"),
                "course_contents:q",
                None,
                &serde_json::json!([{"deployment": "v1"}]),
                None,
                &[RelatedId::bare(format!("course_content:{content_id}"))],
            )
            .await;
    }

    // The version-create cascade collects one tag per dependent deployment.
    let tags: Vec<String> =
        contents.iter().map(|id| format!("course_content:{id}")).collect();
    cache.invalidate_tags(&tags).await;

    for index in 0..contents.len() {
        let view: Option<Value> =
            cache.get_user_view(&format!("user-{index}"), "course_contents:q", None).await;
        assert_eq!(view, None, "course {index} still sees the stale deployment");
    }
}
