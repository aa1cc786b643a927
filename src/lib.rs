//! Unit of Work Coordinator
//!
//! This crate groups repository operations into a single atomic transaction.
//! Repositories are registered by name as factories, materialized against the
//! coordinator's live transaction, and committed or rolled back together.

pub mod context;
pub mod error;
pub mod executor;
pub mod registry;
pub mod source;
pub mod unit_of_work;

pub use context::{CancelHandle, Context, ContextError};
pub use error::{BoxError, UnitOfWorkError, UnitOfWorkResult};
pub use executor::{Executor, PostgresSource};
pub use registry::RepositoryRegistry;
pub use source::{TransactionHandle, TransactionSource};
pub use unit_of_work::{UnitOfWork, UnitOfWorkCoordinator, WorkFuture};
