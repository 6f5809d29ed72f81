//! Gridline - client for a schemaless entity/collection HTTP API.
//!
//! This crate provides:
//! - Session and token lifecycle management (client-credentials and
//!   password grants, optional super-user override, auto-reconnect).
//! - A single dispatch path with service-error classification and a default
//!   timeout policy.
//! - Entity CRUD, relationship, activity, and file-upload operations.
//! - Cursor-driven pagination and relationship-graph archival.
//! - An in-memory record-and-replay stand-in for offline tests.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]

mod api;
mod archive;
mod client;
mod config;
mod entity;
mod error;
mod replay;
mod session;

pub use api::{EntityApi, MAX_PAGE_SIZE};
pub use client::GridlineClient;
pub use config::{GridlineConfig, DEFAULT_TIMEOUT};
pub use entity::{actor_from_user, connections, Entity, EntityPage, Query};
pub use error::{
    or_not_found, GridlineError, GridlineResult, RESOURCE_NOT_FOUND,
};
pub use replay::{PageKey, ReplayClient};
pub use session::{LoginGrant, Session};
