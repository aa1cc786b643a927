use std::any::{self, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{UnitOfWorkError, UnitOfWorkResult};

type ErasedFactory<T> = Arc<dyn Fn(&T) -> Box<dyn Any + Send> + Send + Sync>;

struct Registration<T> {
    factory: ErasedFactory<T>,
    repository_type: &'static str,
}

/// Named repository factories over a transaction handle type `T`.
///
/// Each registration keeps its concrete repository type, so lookups are
/// checked: asking for a repository as the wrong type is an error rather
/// than an untyped value the caller has to trust.
pub struct RepositoryRegistry<T> {
    factories: HashMap<String, Registration<T>>,
}

impl<T: 'static> RepositoryRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Insert `factory` under `name`, replacing any previous registration.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        R: Send + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let factory: ErasedFactory<T> =
            Arc::new(move |tx: &T| -> Box<dyn Any + Send> { Box::new(factory(tx)) });
        self.factories.insert(
            name.into(),
            Registration {
                factory,
                repository_type: any::type_name::<R>(),
            },
        );
    }

    /// Remove the factory under `name`. Returns whether one was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Fails with `UnknownRepository` unless `name` is registered.
    pub fn ensure_registered(&self, name: &str) -> UnitOfWorkResult<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(UnitOfWorkError::UnknownRepository(name.to_string()))
        }
    }

    /// Build a fresh repository bound to `tx`.
    pub fn build<R: 'static>(&self, name: &str, tx: &T) -> UnitOfWorkResult<R> {
        let registration = self
            .factories
            .get(name)
            .ok_or_else(|| UnitOfWorkError::UnknownRepository(name.to_string()))?;

        (registration.factory)(tx)
            .downcast::<R>()
            .map(|repository| *repository)
            .map_err(|_| UnitOfWorkError::RepositoryTypeMismatch {
                name: name.to_string(),
                expected: any::type_name::<R>(),
                registered: registration.repository_type,
            })
    }
}

impl<T: 'static> Default for RepositoryRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RepositoryRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.factories
                    .iter()
                    .map(|(name, registration)| (name, registration.repository_type)),
            )
            .finish()
    }
}
