//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the trigger scheduler workspace.
//!
//! ## Features
//!
//! - **Executable doubles**: recording, failing and panicking executables
//! - **Event recorder**: a `TaskEventListener` that keeps every event it sees
//! - **Lock repository mock**: a `mockall` mock of `TaskLockRepository`
//! - **Test data builders**: `TaskBuilder` for tasks and task definitions
//! - **SQLite test store**: a file-backed database shared by several nodes
//! - **Helpers**: polling waits and a fast-ticking test configuration
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
