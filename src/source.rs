use async_trait::async_trait;

use crate::{BoxError, Context};

/// A transactional data source the coordinator opens transactions against.
///
/// The coordinator treats the source as opaque: it only ever begins
/// transactions and finalizes the handles it gets back.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    type Transaction: TransactionHandle;

    /// Begin a new transaction scoped to `ctx`.
    ///
    /// The coordinator additionally races this call against the context's
    /// cancellation and deadline, so implementations may ignore `ctx`.
    async fn begin(&self, ctx: &Context) -> Result<Self::Transaction, BoxError>;
}

/// An open, uncommitted transaction.
///
/// Finalization borrows the handle instead of consuming it: when a rollback
/// fails the coordinator keeps the handle, because the transaction's real
/// state is unknown.
#[async_trait]
pub trait TransactionHandle: Send + Sync + 'static {
    /// Commit the transaction.
    async fn commit(&mut self) -> Result<(), BoxError>;

    /// Roll the transaction back.
    async fn rollback(&mut self) -> Result<(), BoxError>;
}
