//! ipl-pipeline: from action request to sidecar files
//!
//! # Pipeline Flow
//!
//! ```text
//! ActionRequest → ConfigLoader → Resolver → aggregate → Executor → share
//!                      ↓             ↓           ↓           ↓
//!                 DataSources   ResolvedSource  LabelGroups  .ip-labels
//! ```
//!
//! Sources are handled one after another and warnings are recorded in
//! order, so the same inputs always produce the same warning text.

pub mod aggregate;
pub mod executor;
pub mod resolver;

pub use aggregate::{aggregate, group_rows, group_source, group_values, place_row, scan, PlacedRow};
pub use executor::{
    share_target, Action, ExecutionOutcome, ExecutionPhase, Executor, ENCRYPT_ACTION,
    VERIFY_CONFIG_ACTION,
};
pub use resolver::Resolver;
