//! Stateprobe: differential mutation testing for infrastructure fixtures
//!
//! Stateprobe copies an Ansible role or a Puppet acceptance spec, installs
//! a state-capture hook, applies one structural mutation and, once an
//! external backend has executed the fixture, compares the captured
//! system state against an unmodified baseline run.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐    ┌──────────┐    ┌───────────┐    ┌──────────┐
//! │ Fixture   │───►│ Mutation │───►│ (backend  │───►│ Compare  │
//! │ Handle    │    │ Catalog  │    │  executes)│    │ baseline │
//! └───────────┘    └──────────┘    └───────────┘    └──────────┘
//!       │               │                                 ▲
//!       ▼               ▼                                 │
//!   Locator +       Token                            Snapshot
//!   Dialect         Generator                        Store
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

#[allow(clippy::missing_errors_doc)]
pub mod batch;
#[allow(clippy::missing_errors_doc)]
pub mod compare;
#[allow(clippy::missing_errors_doc)]
pub mod config;
pub mod dialect;
#[allow(clippy::missing_errors_doc)]
pub mod fixture;
pub mod locator;
#[allow(clippy::missing_errors_doc)]
pub mod mutation;
mod result;
#[allow(clippy::missing_errors_doc)]
pub mod snapshot;
pub mod token;

pub use batch::{evaluate, next_run_dir, BatchReport, RunOutcome, RunRecord};
pub use compare::{
    compare, BaselineRegistry, ComparisonOutcome, Divergence, LengthMismatch, RunKind, RunResult,
};
pub use config::{FixtureConfig, HarnessConfig};
pub use dialect::{Dialect, DialectKind, ManifestCall, TaskList, UnitEdit};
pub use fixture::FixtureHandle;
pub use locator::{BlockGrammar, BlockSpan, Document, Locator};
pub use mutation::{Mutation, MutationOptions, MutationPlan, MutationReport, MutationSpec};
pub use result::{HarnessError, HarnessResult};
pub use snapshot::{
    CaptureCategory, CaptureConfig, DirTree, Snapshot, SnapshotSequence, SnapshotStore,
};
pub use token::{sanitize, Seed, TokenGenerator};
