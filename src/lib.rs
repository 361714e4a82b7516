//! Relops hardware controller — job admission service.
//!
//! Authenticates callers against Taskcluster, checks their scopes for the
//! requested task, and hands validated jobs to a task queue.

pub mod admission;
pub mod auth;
pub mod config;
pub mod error;
pub mod queue;
pub mod routes;
