//! mlqa store
//!
//! Artifact persistence for ML test and evaluation. One contract
//! ([`ArtifactStore`]) over in-memory, filesystem and HTTP back-ends, all
//! scoped by model and version, plus the process-wide session context.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::uninlined_format_args))]

pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod http;
pub mod kind;
pub mod memory;
pub mod store;
pub mod uri;

pub use config::SessionConfig;
pub use context::{
    Context, DEFAULT_NAMESPACE, clear_session, context, session_store, set_context,
    set_namespace, set_store, store_uri,
};
pub use error::{Error, Result};
pub use fs::LocalStore;
pub use http::HttpStore;
pub use kind::ArtifactKind;
pub use memory::MemoryStore;
pub use store::{ArtifactStore, Scope, open_store, validate_identifier};
pub use uri::StoreUri;
