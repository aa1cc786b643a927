use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    Context, RepositoryRegistry, TransactionHandle, TransactionSource, UnitOfWorkError,
    UnitOfWorkResult,
};

/// Future returned by the work passed to [`UnitOfWork::run`].
pub type WorkFuture<'a, R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'a>>;

struct ActiveTransaction<T> {
    id: Uuid,
    handle: T,
}

/// Unit of Work coordinator.
///
/// Owns a transactional data source, at most one open transaction against it,
/// and a registry of named repository factories. Repositories fetched while a
/// transaction is open are all bound to that one transaction, so the work
/// they do commits or rolls back as a whole.
///
/// A coordinator serves one workflow at a time; it can be reused once its
/// transaction has been finalized.
pub struct UnitOfWork<S: TransactionSource> {
    source: S,
    active: Option<ActiveTransaction<S::Transaction>>,
    repositories: RepositoryRegistry<S::Transaction>,
}

impl<S: TransactionSource> UnitOfWork<S> {
    /// Create an idle coordinator over `source` with no repositories registered.
    pub fn new(source: S) -> Self {
        Self {
            source,
            active: None,
            repositories: RepositoryRegistry::new(),
        }
    }

    /// The data source transactions are opened against.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Whether a transaction is open, or was left uncertain by a failed rollback.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the open transaction, as logged under the `uow` target.
    pub fn transaction_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|active| active.id)
    }

    /// The open transaction handle, if any.
    pub fn transaction(&self) -> Option<&S::Transaction> {
        self.active.as_ref().map(|active| &active.handle)
    }

    /// Register `factory` under `name`, replacing any previous registration.
    ///
    /// Registrations may change while a transaction is open; they apply to
    /// the next `get_repository` call.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        R: Send + 'static,
        F: Fn(&S::Transaction) -> R + Send + Sync + 'static,
    {
        self.repositories.register(name, factory);
    }

    /// Remove the factory under `name`; a no-op when it is not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.repositories.unregister(name)
    }

    /// Whether a factory is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.repositories.contains(name)
    }

    /// Names of all registered factories, in no particular order.
    pub fn repository_names(&self) -> impl Iterator<Item = &str> {
        self.repositories.names()
    }

    /// Build the repository registered under `name`, bound to the open
    /// transaction.
    ///
    /// When no transaction is open one is started against `ctx`, and the
    /// caller becomes responsible for finalizing it with
    /// [`commit_or_rollback`](Self::commit_or_rollback) or
    /// [`rollback`](Self::rollback). The factory runs on every call.
    pub async fn get_repository<R>(&mut self, ctx: &Context, name: &str) -> UnitOfWorkResult<R>
    where
        R: Send + 'static,
    {
        self.repositories.ensure_registered(name)?;

        if self.active.is_none() {
            self.begin(ctx).await?;
        }

        let active = self
            .active
            .as_ref()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;
        self.repositories.build(name, &active.handle)
    }

    /// Run `work` inside a new transaction.
    ///
    /// The transaction commits when `work` succeeds. When `work` fails it is
    /// rolled back and the error is returned unchanged; if that rollback
    /// fails too, both errors come back together as a
    /// [`UnitOfWorkError::CombinedFailure`] converted into `E`.
    ///
    /// ```ignore
    /// uow.run(&ctx, |uow, ctx| {
    ///     Box::pin(async move {
    ///         let orders: OrderRepository = uow.get_repository(ctx, "orders").await?;
    ///         orders.place("laptop").await?;
    ///         Ok::<_, UnitOfWorkError>(())
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn run<F, R, E>(&mut self, ctx: &Context, work: F) -> Result<R, E>
    where
        F: for<'u> FnOnce(&'u mut Self, &'u Context) -> WorkFuture<'u, R, E>,
        E: StdError + Send + Sync + 'static + From<UnitOfWorkError>,
    {
        if self.active.is_some() {
            return Err(UnitOfWorkError::TransactionAlreadyActive.into());
        }

        self.begin(ctx).await?;

        let outcome = work(self, ctx).await;
        match outcome {
            // The work finalized the transaction itself.
            Ok(value) if self.active.is_none() => Ok(value),
            Err(err) if self.active.is_none() => Err(err),
            Ok(value) => {
                self.commit_or_rollback().await?;
                Ok(value)
            }
            Err(err) => {
                let rolled_back = self.rollback().await;
                match rolled_back {
                    Ok(()) => Err(err),
                    Err(rollback_err) => Err(UnitOfWorkError::combined(err, rollback_err).into()),
                }
            }
        }
    }

    /// Commit the open transaction.
    ///
    /// A failed commit triggers one recovery rollback. If that rollback
    /// fails the handle is kept and both causes are returned.
    pub async fn commit_or_rollback(&mut self) -> UnitOfWorkResult<()> {
        let active = self
            .active
            .as_mut()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;
        let id = active.id;

        let committed = active.handle.commit().await;
        match committed {
            Ok(()) => {
                self.active = None;
                debug!(target: "uow", transaction_id = %id, "transaction committed");
                Ok(())
            }
            Err(err) => {
                warn!(target: "uow", transaction_id = %id, error = %err, "commit failed, rolling back");
                let commit_err = UnitOfWorkError::CommitFailed(err);
                let rolled_back = self.rollback().await;
                match rolled_back {
                    Ok(()) => Err(commit_err),
                    Err(rollback_err) => Err(UnitOfWorkError::combined(commit_err, rollback_err)),
                }
            }
        }
    }

    /// Roll back the open transaction.
    ///
    /// A failed rollback leaves the handle in place: the transaction's final
    /// state is unknown and must not be treated as clean.
    pub async fn rollback(&mut self) -> UnitOfWorkResult<()> {
        let active = self
            .active
            .as_mut()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;
        let id = active.id;

        let rolled_back = active.handle.rollback().await;
        match rolled_back {
            Ok(()) => {
                self.active = None;
                debug!(target: "uow", transaction_id = %id, "transaction rolled back");
                Ok(())
            }
            Err(err) => {
                warn!(target: "uow", transaction_id = %id, error = %err, "rollback failed, transaction state is uncertain");
                Err(UnitOfWorkError::RollbackFailed(err))
            }
        }
    }

    async fn begin(&mut self, ctx: &Context) -> UnitOfWorkResult<()> {
        let started = match ctx.scope(self.source.begin(ctx)).await {
            Ok(started) => started,
            Err(err) => Err(err.into()),
        };

        let handle = started.map_err(|err| {
            warn!(target: "uow", error = %err, "failed to start transaction");
            UnitOfWorkError::TransactionStartFailed(err)
        })?;

        let id = Uuid::new_v4();
        debug!(target: "uow", transaction_id = %id, "transaction started");
        self.active = Some(ActiveTransaction { id, handle });
        Ok(())
    }
}

/// Coordinator operations callers can depend on instead of a concrete
/// [`UnitOfWork`], so a test double can stand in for it.
#[async_trait]
pub trait UnitOfWorkCoordinator: Send {
    /// Transaction handle passed to repository factories.
    type Transaction: TransactionHandle;

    /// Register `factory` under `name`, replacing any previous registration.
    fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        R: Send + 'static,
        F: Fn(&Self::Transaction) -> R + Send + Sync + 'static;

    /// Remove the factory under `name`. Returns whether one was registered.
    fn unregister(&mut self, name: &str) -> bool;

    /// Build the repository registered under `name`, starting a transaction if needed.
    async fn get_repository<R>(&mut self, ctx: &Context, name: &str) -> UnitOfWorkResult<R>
    where
        R: Send + 'static;

    /// Run `work` inside a new transaction, committing on success.
    async fn run<F, R, E>(&mut self, ctx: &Context, work: F) -> Result<R, E>
    where
        F: for<'u> FnOnce(&'u mut Self, &'u Context) -> WorkFuture<'u, R, E> + Send,
        R: Send,
        E: StdError + Send + Sync + 'static + From<UnitOfWorkError>;

    /// Commit the open transaction, rolling back if the commit fails.
    async fn commit_or_rollback(&mut self) -> UnitOfWorkResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> UnitOfWorkResult<()>;
}

#[async_trait]
impl<S: TransactionSource> UnitOfWorkCoordinator for UnitOfWork<S> {
    type Transaction = S::Transaction;

    fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        R: Send + 'static,
        F: Fn(&Self::Transaction) -> R + Send + Sync + 'static,
    {
        UnitOfWork::register(self, name, factory);
    }

    fn unregister(&mut self, name: &str) -> bool {
        UnitOfWork::unregister(self, name)
    }

    async fn get_repository<R>(&mut self, ctx: &Context, name: &str) -> UnitOfWorkResult<R>
    where
        R: Send + 'static,
    {
        UnitOfWork::get_repository(self, ctx, name).await
    }

    async fn run<F, R, E>(&mut self, ctx: &Context, work: F) -> Result<R, E>
    where
        F: for<'u> FnOnce(&'u mut Self, &'u Context) -> WorkFuture<'u, R, E> + Send,
        R: Send,
        E: StdError + Send + Sync + 'static + From<UnitOfWorkError>,
    {
        UnitOfWork::run(self, ctx, work).await
    }

    async fn commit_or_rollback(&mut self) -> UnitOfWorkResult<()> {
        UnitOfWork::commit_or_rollback(self).await
    }

    async fn rollback(&mut self) -> UnitOfWorkResult<()> {
        UnitOfWork::rollback(self).await
    }
}

impl<S: TransactionSource> fmt::Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("transaction_id", &self.transaction_id())
            .field("repositories", &self.repositories)
            .finish_non_exhaustive()
    }
}

impl<S: TransactionSource> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            warn!(target: "uow", transaction_id = %active.id, "unit of work dropped with an unfinished transaction");
        }
    }
}
