use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{BoxError, Context, TransactionHandle, TransactionSource, UnitOfWorkError};

/// Executor wraps a database transaction for use by repositories.
///
/// This struct provides a shared reference to a PostgreSQL transaction
/// that can be passed to every repository built within a unit of work.
/// Once the transaction is committed or rolled back the slot is empty and
/// repositories still holding a clone get `TransactionFinalized`.
#[derive(Clone, Debug)]
pub struct Executor {
    pub tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl Executor {
    /// Creates a new Executor from a PostgreSQL transaction.
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Whether the wrapped transaction has not been finalized yet.
    pub async fn is_open(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    /// Takes ownership of the transaction, leaving None in its place.
    /// This should only be called when committing or rolling back.
    async fn take_transaction(&self) -> Result<Transaction<'static, Postgres>, UnitOfWorkError> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or(UnitOfWorkError::TransactionFinalized)
    }
}

#[async_trait]
impl TransactionHandle for Executor {
    async fn commit(&mut self) -> Result<(), BoxError> {
        let tx = self.take_transaction().await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BoxError> {
        // A failed commit already consumed the transaction; sqlx rolls back
        // a dropped transaction on its connection.
        let Some(tx) = self.tx.lock().await.take() else {
            return Ok(());
        };
        tx.rollback().await?;
        Ok(())
    }
}

/// Transaction source backed by a PostgreSQL connection pool.
#[derive(Clone, Debug)]
pub struct PostgresSource {
    pool: Arc<PgPool>,
}

impl PostgresSource {
    /// Create a new PostgresSource with the given connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Connect a new pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, UnitOfWorkError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// The pool transactions are started on.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionSource for PostgresSource {
    type Transaction = Executor;

    async fn begin(&self, _ctx: &Context) -> Result<Self::Transaction, BoxError> {
        let tx = self.pool.begin().await?;
        Ok(Executor::new(tx))
    }
}
