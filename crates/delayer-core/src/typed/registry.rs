//! TypedRegistry - バケットごとの Handler 登録

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::TaskKind;
use crate::domain::Bucket;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for bucket {0} is already registered")]
    AlreadyRegistered(Bucket),
}

/// Type-erased handlers keyed by [`Bucket`].
#[derive(Default, Clone)]
pub struct TypedRegistry {
    handlers: HashMap<Bucket, Arc<dyn DynHandler>>,
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: TaskKind, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let bucket = T::bucket();
        if self.handlers.contains_key(&bucket) {
            return Err(RegistryError::AlreadyRegistered(bucket));
        }
        self.handlers
            .insert(bucket, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, bucket: Bucket) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(&bucket).cloned()
    }

    /// Sorted, so consumers start in a stable order.
    pub fn buckets(&self) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = self.handlers.keys().copied().collect();
        buckets.sort_by_key(|b| (b.task_type, b.priority));
        buckets
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::handler::fixtures::{FailingWarmup, RecordingHandler};
    use crate::typed::task::fixtures::{ArticleReview, CacheWarmup};

    #[test]
    fn register_and_get() {
        let mut registry = TypedRegistry::new();
        registry
            .register::<ArticleReview, _>(Arc::new(RecordingHandler::default()))
            .unwrap();

        let handler = registry.get(ArticleReview::bucket()).unwrap();
        assert_eq!(handler.bucket(), ArticleReview::bucket());
        assert!(registry.get(CacheWarmup::bucket()).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TypedRegistry::new();
        registry.register::<CacheWarmup, _>(FailingWarmup).unwrap();
        let err = registry.register::<CacheWarmup, _>(FailingWarmup).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(b) if b == CacheWarmup::bucket()));
    }

    #[test]
    fn buckets_lists_every_registration() {
        let mut registry = TypedRegistry::new();
        assert!(registry.is_empty());
        registry.register::<CacheWarmup, _>(FailingWarmup).unwrap();
        registry
            .register::<ArticleReview, _>(Arc::new(RecordingHandler::default()))
            .unwrap();

        assert_eq!(
            registry.buckets(),
            vec![ArticleReview::bucket(), CacheWarmup::bucket()]
        );
    }
}
