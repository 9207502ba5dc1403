//! Entity repositories, view projections, and aggregators for the Computor
//! coherency core.
//!
//! # Overview
//!
//! This crate is the repository-level integration of the tag-indexed cache:
//!
//! - **`repository`** — one CRUD façade per persistent entity kind. Each
//!   repository owns the tag set of its entity, reads through the cache,
//!   writes through the cache, and invalidates exactly the tags its mutation
//!   touches, including cross-entity cascades (grade → artifact → group
//!   members → each member's grading dashboard; example version → dependent
//!   deployments).
//! - **`views`** — per-user aggregated projections (student, tutor, lecturer,
//!   grading dashboards) composed from multi-way joins and cached under
//!   user-scoped keys. A cache hit never acquires a database connection.
//! - **`aggregate`** — pure transforms: hierarchical tree-path rollups with
//!   status reduction, and per-member grading statistics.
//! - **`query`** — the composite SQL the views run: latest-result,
//!   submission-count, latest-grade-status (window function), and unread
//!   message subqueries, LEFT-joined over the course-content spine.
//! - **`deployment`** — the declarative table-row → deployment-config mapper
//!   whose output feeds bulk member creation (and therefore the member
//!   invalidation cascade).
//!
//! # Mutation contract
//!
//! Every entity mutation MUST flow through the corresponding repository so the
//! monotone-tag-superset invariant holds: the tag set invalidated by a write
//! covers every tag under which any projection over the old or new row state
//! could have been cached. Direct SQL mutation bypassing the repositories is a
//! contract violation.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod deployment;
pub mod model;
pub mod query;
pub mod repository;
pub mod views;
