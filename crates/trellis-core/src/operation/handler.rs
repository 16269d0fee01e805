//! Operation handlers and the per-store handler registry

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{handlers, impls, Data, KnownOperation, Operation, OperationKind};
use crate::store::Store;
use crate::{Context, CoreError};

/// Executes one kind of operation
pub trait Handler: Send + Sync {
    /// Run `operation` on `input`
    fn handle(
        &self,
        operation: &dyn Operation,
        input: Data,
        context: &mut Context,
        store: &dyn Store,
    ) -> Result<Data, CoreError>;
}

/// A handler written against a concrete operation type
pub trait OperationHandler<O: KnownOperation>: Send + Sync {
    /// Run `operation` on `input`
    fn handle(
        &self,
        operation: &O,
        input: Data,
        context: &mut Context,
        store: &dyn Store,
    ) -> Result<Data, CoreError>;
}

struct Typed<O, H> {
    handler: H,
    _operation: PhantomData<fn() -> O>,
}

impl<O, H> Handler for Typed<O, H>
where
    O: KnownOperation,
    H: OperationHandler<O>,
{
    fn handle(
        &self,
        operation: &dyn Operation,
        input: Data,
        context: &mut Context,
        store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let typed = operation.as_any().downcast_ref::<O>().ok_or_else(|| {
            CoreError::operation(format!(
                "handler for {} received a {} operation",
                O::KIND,
                operation.kind()
            ))
        })?;
        self.handler.handle(typed, input, context, store)
    }
}

/// Handlers keyed by operation kind
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<OperationKind, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the store-agnostic handlers every store supports
    pub fn with_core_handlers() -> Self {
        let mut registry = Self::new();
        registry.register::<impls::Sort, _>(handlers::SortHandler);
        registry.register::<impls::Max, _>(handlers::MaxHandler);
        registry.register::<impls::Min, _>(handlers::MinHandler);
        registry.register::<impls::Limit, _>(handlers::LimitHandler);
        registry.register::<impls::Count, _>(handlers::CountHandler);
        registry.register::<impls::ToEntitySeeds, _>(handlers::ToEntitySeedsHandler);
        registry.register::<impls::ToVertices, _>(handlers::ToVerticesHandler);
        registry.register::<impls::ExportToCache, _>(handlers::ExportToCacheHandler);
        registry.register::<impls::GetExport, _>(handlers::GetExportHandler);
        registry.register::<impls::FetchCache, _>(handlers::FetchCacheHandler);
        registry.register::<impls::GetCacheKeys, _>(handlers::GetCacheKeysHandler);
        registry.register::<impls::DiscardOutput, _>(handlers::DiscardOutputHandler);
        registry
    }

    /// Register a typed handler, replacing any handler for the same kind
    pub fn register<O, H>(&mut self, handler: H)
    where
        O: KnownOperation,
        H: OperationHandler<O> + 'static,
    {
        self.handlers.insert(
            O::KIND,
            Arc::new(Typed {
                handler,
                _operation: PhantomData,
            }),
        );
    }

    /// Register an untyped handler for a kind
    pub fn register_dyn(&mut self, kind: OperationKind, handler: Arc<dyn Handler>) {
        self.handlers.insert(kind, handler);
    }

    /// Look up a handler
    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Whether a kind is supported
    pub fn supports(&self, kind: OperationKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<OperationKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_handlers_are_registered() {
        let registry = HandlerRegistry::with_core_handlers();
        for kind in [
            <impls::Sort as KnownOperation>::KIND,
            <impls::Count as KnownOperation>::KIND,
            <impls::FetchCache as KnownOperation>::KIND,
            <impls::DiscardOutput as KnownOperation>::KIND,
        ] {
            assert!(registry.supports(kind), "{} missing", kind);
        }
        assert!(!registry.supports(<impls::AddElements as KnownOperation>::KIND));
        assert_eq!(registry.kinds().len(), 12);
    }
}
