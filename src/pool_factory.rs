//! Typed pools for the tracer's record kinds
//!
//! A [`PoolFactory`] is an explicitly constructed context object: the tracer
//! builds one at startup and passes it to whatever needs records. There is no
//! process-wide default instance, so tests get isolated pools for free.

use crate::config::PoolConfig;
use crate::object_handle::HandlePool;
use crate::object_pool::{
    Allocator, BoundedObjectPool, PoolStats, Recyclable, RecyclableResetter, Resetter,
};
use crate::records::{ErrorRecord, SpanLinkRecord, SpanRecord, StackTraceId, TransactionRecord};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Records handed out but never recycled
#[derive(Error, Debug, PartialEq, Eq)]
#[error("{count} pooled {kind} records were not recycled")]
pub struct OutstandingRecords {
    pub kind: &'static str,
    pub count: u64,
}

/// Construct a pool with explicit allocation and reset strategies
pub fn create_pool<T>(
    capacity: usize,
    allocator: impl Allocator<T> + 'static,
    resetter: impl Resetter<T> + 'static,
) -> BoundedObjectPool<T> {
    BoundedObjectPool::new(capacity, allocator, resetter)
}

/// Construct a pool of default-constructed, self-resetting records
pub fn create_recyclable_pool<T>(capacity: usize) -> BoundedObjectPool<T>
where
    T: Recyclable + Default + 'static,
{
    BoundedObjectPool::new(capacity, T::default, RecyclableResetter)
}

/// Pools for every record kind the tracer produces
#[derive(Debug)]
pub struct PoolFactory {
    transactions: Arc<BoundedObjectPool<TransactionRecord>>,
    spans: Arc<BoundedObjectPool<SpanRecord>>,
    errors: Arc<BoundedObjectPool<ErrorRecord>>,
    span_links: Arc<BoundedObjectPool<SpanLinkRecord>>,
    stack_trace_ids: Arc<BoundedObjectPool<StackTraceId>>,
}

impl PoolFactory {
    pub fn new(config: &PoolConfig) -> Self {
        tracing::debug!(
            "Creating record pools: transactions={}, spans={}, errors={}, span_links={}",
            config.transaction_capacity(),
            config.span_capacity(),
            config.error_capacity(),
            config.span_link_capacity()
        );
        Self {
            transactions: Arc::new(create_recyclable_pool(config.transaction_capacity())),
            spans: Arc::new(create_recyclable_pool(config.span_capacity())),
            errors: Arc::new(create_recyclable_pool(config.error_capacity())),
            span_links: Arc::new(create_recyclable_pool(config.span_link_capacity())),
            stack_trace_ids: Arc::new(create_recyclable_pool(config.stack_trace_id_capacity())),
        }
    }

    pub fn transaction_pool(&self) -> &Arc<BoundedObjectPool<TransactionRecord>> {
        &self.transactions
    }

    pub fn span_pool(&self) -> &Arc<BoundedObjectPool<SpanRecord>> {
        &self.spans
    }

    pub fn error_pool(&self) -> &Arc<BoundedObjectPool<ErrorRecord>> {
        &self.errors
    }

    pub fn span_link_pool(&self) -> &Arc<BoundedObjectPool<SpanLinkRecord>> {
        &self.span_links
    }

    pub fn stack_trace_id_pool(&self) -> &Arc<BoundedObjectPool<StackTraceId>> {
        &self.stack_trace_ids
    }

    /// Handle pool for payloads that carry no resettable state
    pub fn create_handle_pool<T>(
        &self,
        capacity: usize,
        allocator: impl Allocator<T> + 'static,
    ) -> Arc<HandlePool<T>>
    where
        T: Send + Sync + 'static,
    {
        HandlePool::new(capacity, allocator)
    }

    /// Statistics of every record pool
    pub fn stats(&self) -> FactoryStats {
        FactoryStats {
            transactions: self.transactions.stats(),
            spans: self.spans.stats(),
            errors: self.errors.stats(),
            span_links: self.span_links.stats(),
            stack_trace_ids: self.stack_trace_ids.stats(),
        }
    }

    /// Records handed out and not yet recycled, across all pools
    pub fn outstanding(&self) -> u64 {
        self.stats().iter().map(|(_, s)| s.outstanding()).sum()
    }

    /// Verify that every record handed out has been recycled
    pub fn check_all_recycled(&self) -> Result<(), OutstandingRecords> {
        match self.stats().iter().find(|(_, s)| s.outstanding() > 0) {
            Some((kind, stats)) => Err(OutstandingRecords {
                kind,
                count: stats.outstanding(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for PoolFactory {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

/// Per-kind pool statistics
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FactoryStats {
    pub transactions: PoolStats,
    pub spans: PoolStats,
    pub errors: PoolStats,
    pub span_links: PoolStats,
    pub stack_trace_ids: PoolStats,
}

impl FactoryStats {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, PoolStats)> {
        [
            ("transaction", self.transactions),
            ("span", self.spans),
            ("error", self.errors),
            ("span_link", self.span_links),
            ("stack_trace_id", self.stack_trace_ids),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacities() {
        let factory = PoolFactory::default();
        assert_eq!(factory.transaction_pool().size(), 1024);
        assert_eq!(factory.span_pool().size(), 1024);
        assert_eq!(factory.error_pool().size(), 512);
        assert_eq!(factory.span_link_pool().size(), 10_000);
        assert_eq!(factory.stack_trace_id_pool().size(), 1024);
    }

    #[test]
    fn test_records_are_reset_on_reuse() {
        let factory = PoolFactory::default();
        let spans = factory.span_pool();

        let mut span = spans.create_instance();
        span.set_name_static("db:query");
        span.timestamp_nanos = 42;
        spans.recycle(span);

        let span = spans.create_instance();
        assert_eq!(span.name.as_ref(), "");
        assert_eq!(span.timestamp_nanos, 0);
        spans.recycle(span);
    }

    #[test]
    fn test_check_all_recycled() {
        let factory = PoolFactory::default();
        assert_eq!(factory.check_all_recycled(), Ok(()));

        let error = factory.error_pool().create_instance();
        let _tx = factory.transaction_pool().create_instance();
        assert_eq!(factory.outstanding(), 2);
        assert_eq!(
            factory.check_all_recycled(),
            Err(OutstandingRecords {
                kind: "transaction",
                count: 1
            })
        );

        factory.error_pool().recycle(error);
        assert_eq!(factory.outstanding(), 1);
    }

    #[test]
    fn test_factories_are_isolated() {
        let a = PoolFactory::default();
        let b = PoolFactory::default();
        let span = a.span_pool().create_instance();
        a.span_pool().recycle(span);
        assert_eq!(a.span_pool().objects_in_pool(), 1);
        assert_eq!(b.span_pool().objects_in_pool(), 0);
    }

    #[test]
    fn test_create_pool_with_custom_strategies() {
        let pool = create_pool(4, || Vec::<u8>::with_capacity(16), |v: &mut Vec<u8>| v.clear());
        let mut buf = pool.create_instance();
        buf.extend_from_slice(b"abc");
        pool.recycle(buf);
        let buf = pool.create_instance();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 16);
    }

    #[test]
    fn test_handle_pool_from_factory() {
        let factory = PoolFactory::default();
        let buffers = factory.create_handle_pool(2, || String::with_capacity(64));
        drop(buffers.acquire());
        assert_eq!(buffers.objects_in_pool(), 1);
    }
}
