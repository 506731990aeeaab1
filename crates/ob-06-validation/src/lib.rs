//! # Obsidian Validation — Blocks, Branches, Slashing
//!
//! Validates blocks — own-mined and received — against the global account
//! state. An incoming block is located relative to the current head; when a
//! competing branch wins, the old branch is rolled back block by block and
//! the new one replayed. Every block passes `pre_validate` (static and
//! cryptographic checks plus payload fetching), `validate_state` (ordered
//! state application with cumulative rollback on failure), and
//! `post_validate` (parameter activation, storage moves, compaction).
//!
//! Own-mined and received blocks are serialized through a single
//! process-wide validation lock.

pub mod branch;
pub mod error;
pub mod rollback;
pub mod service;
pub mod slashing;

pub use error::{Result, ValidationError};
pub use service::Validator;
pub use slashing::SlashingDetector;
