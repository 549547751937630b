//! Bounded, age-aware connection pool.
//!
//! A [`Pool`] hands out at most `size` connections at a time. Idle
//! connections are reused in FIFO order; once every connection is checked
//! out, callers of [`Pool::get`] wait in arrival order until one comes back.
//!
//! Connections are returned with [`Pool::release`]. A [`PooledConnection`]
//! dropped without being released (an early `?` return, a cancelled task) is
//! still returned to its pool from a background task, so a checked-out
//! connection is never leaked.
//!
//! On release a connection is reset: an open transaction is rolled back and
//! unread rows of its last result are dropped. It is closed instead of being
//! reused when it is older than the configured lifetime, when it reports
//! itself unusable, when the pool has been closed, or when the reset fails.
//! The idle queue therefore only holds `Idle` connections with nothing left
//! to fetch.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{Backend, Connector, Dialect};
use crate::error::{Error, Result};

/// Default number of live connections per pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Pool sizing and recycling options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live connections.
    pub size: usize,
    /// Age after which a released connection is closed. Zero disables recycling.
    pub lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            lifetime: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of live connections.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sets the connection lifetime.
    #[must_use]
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidConfig(
                "pool size must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

struct IdleConnection {
    backend: Box<dyn Backend>,
    created: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<IdleConnection>,
    // Idle + checked out + being opened or closed.
    live: usize,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    dialect: Arc<dyn Dialect>,
    config: PoolConfig,
    // One permit per connection that may be checked out. FIFO fair.
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

// A reserved slot in `PoolState::live`. Dropping an armed slot gives it back,
// which keeps the count right when an open or close is cancelled midway.
struct LiveSlot<'a> {
    state: &'a Mutex<PoolState>,
    armed: bool,
}

impl<'a> LiveSlot<'a> {
    fn reserve(state: &'a Mutex<PoolState>) -> Self {
        state.lock().live += 1;
        Self { state, armed: true }
    }

    fn held(state: &'a Mutex<PoolState>) -> Self {
        Self { state, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for LiveSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            state.live = state.live.saturating_sub(1);
        }
    }
}

impl PoolInner {
    // Puts a returned connection back in the idle queue, or closes it.
    async fn recycle(&self, mut backend: Box<dyn Backend>, created: Instant, broken: bool) {
        let slot = LiveSlot::held(&self.state);
        let lifetime = self.config.lifetime;
        let expired = !lifetime.is_zero() && created.elapsed() >= lifetime;
        let closing = self.permits.is_closed();
        let mut reusable = !expired && !broken && !closing && backend.is_usable();

        if reusable {
            if let Err(e) = backend.reset().await {
                warn!(error = %e, "reset on release failed, closing connection");
                reusable = false;
            }
        }

        if reusable {
            let mut state = self.state.lock();
            // `close` closes the permits before draining under this lock.
            if !self.permits.is_closed() {
                state.idle.push_back(IdleConnection { backend, created });
                debug!(idle = state.idle.len(), live = state.live, "connection returned to pool");
                drop(state);
                slot.keep();
                return;
            }
        }

        if closing || self.permits.is_closed() {
            debug!("pool is closed, closing released connection");
        } else if broken {
            debug!("closing connection marked broken");
        } else if expired {
            debug!(age = ?created.elapsed(), ?lifetime, "connection reached its lifetime, closing");
        } else {
            warn!("closing unusable connection");
        }
        if let Err(e) = backend.close().await {
            warn!(error = %e, "error while closing connection");
        }
        drop(slot);
    }
}

/// A bounded pool of backend connections.
///
/// Cloning a `Pool` is cheap; clones share the same connections.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_db::backend::sqlite::SqliteConnector;
/// use rttp_db::pool::{Pool, PoolConfig};
///
/// # async fn example() -> rttp_db::Result<()> {
/// let pool = Pool::new(SqliteConnector::open_path("app.db"), PoolConfig::new().size(4))?;
///
/// let mut conn = pool.get().await?;
/// conn.execute_query("SELECT 1", &Default::default()).await?;
/// let row = conn.fetch_one().await?;
/// pool.release(conn).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pool")
            .field("dialect", &self.inner.dialect.name())
            .field("config", &self.inner.config)
            .field("live", &state.live)
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl Pool {
    /// Creates an empty pool. No connection is opened until the first
    /// [`get`](Self::get).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config.size` is zero.
    pub fn new(connector: impl Connector + 'static, config: PoolConfig) -> Result<Self> {
        Self::with_connector(Arc::new(connector), config)
    }

    /// Same as [`new`](Self::new) for an already shared connector.
    pub fn with_connector(connector: Arc<dyn Connector>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let dialect = connector.dialect();
        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                dialect,
                config,
                permits: Arc::new(Semaphore::new(config.size)),
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    /// Checks out a connection.
    ///
    /// Reuses the oldest idle connection if there is one, otherwise opens a
    /// new one while below capacity, otherwise waits for a release.
    ///
    /// # Errors
    ///
    /// Propagates the connector's error when a new connection cannot be
    /// opened, and returns [`Error::State`] once the pool has been closed.
    pub async fn get(&self) -> Result<PooledConnection> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::state("pool is closed"))?;

        let idle = self.inner.state.lock().idle.pop_front();
        if let Some(idle) = idle {
            debug!(dialect = self.inner.dialect.name(), "reusing idle connection");
            return Ok(PooledConnection::new(
                idle.backend,
                idle.created,
                &self.inner,
                permit,
            ));
        }

        let slot = LiveSlot::reserve(&self.inner.state);
        match self.inner.connector.open().await {
            Ok(backend) => {
                slot.keep();
                debug!(
                    dialect = self.inner.dialect.name(),
                    live = self.live_count(),
                    capacity = self.capacity(),
                    "opened new connection"
                );
                Ok(PooledConnection::new(
                    backend,
                    Instant::now(),
                    &self.inner,
                    permit,
                ))
            }
            Err(e) => {
                warn!(error = %e, "failed to open connection");
                Err(e)
            }
        }
    }

    /// Returns a connection to the pool.
    ///
    /// # Panics
    ///
    /// Panics if `conn` was checked out from a different pool.
    pub async fn release(&self, mut conn: PooledConnection) {
        assert!(
            Arc::ptr_eq(&conn.pool, &self.inner),
            "connection released into a pool that did not issue it"
        );
        let Some(backend) = conn.backend.take() else {
            return;
        };
        let permit = conn.permit.take();
        self.inner.recycle(backend, conn.created, conn.broken).await;
        drop(permit);
    }

    /// Closes every idle connection and refuses further checkouts.
    /// Connections still checked out are closed as they are released.
    pub async fn close(&self) {
        self.inner.permits.close();
        let idle = std::mem::take(&mut self.inner.state.lock().idle);
        for mut conn in idle {
            let slot = LiveSlot::held(&self.inner.state);
            if let Err(e) = conn.backend.close().await {
                warn!(error = %e, "error while closing connection");
            }
            drop(slot);
        }
        debug!(live = self.live_count(), "pool closed");
    }

    /// Maximum number of live connections.
    pub fn capacity(&self) -> usize {
        self.inner.config.size
    }

    pub fn lifetime(&self) -> Duration {
        self.inner.config.lifetime
    }

    /// Connections currently open, idle or checked out.
    pub fn live_count(&self) -> usize {
        self.inner.state.lock().live
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// The dialect of the connections this pool opens.
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.inner.dialect)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }
}

/// A connection checked out of a [`Pool`].
///
/// Dereferences to the underlying [`Backend`]. Give it back with
/// [`Pool::release`]; dropping it instead returns it from a background task
/// (or closes it when no Tokio runtime is running).
pub struct PooledConnection {
    backend: Option<Box<dyn Backend>>,
    created: Instant,
    pool: Arc<PoolInner>,
    permit: Option<OwnedSemaphorePermit>,
    broken: bool,
}

impl PooledConnection {
    fn new(
        backend: Box<dyn Backend>,
        created: Instant,
        pool: &Arc<PoolInner>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            backend: Some(backend),
            created,
            pool: Arc::clone(pool),
            permit: Some(permit),
            broken: false,
        }
    }

    /// When the underlying connection was opened.
    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Flags the connection so it is closed, not reused, when released.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl Deref for PooledConnection {
    type Target = dyn Backend;

    fn deref(&self) -> &Self::Target {
        match &self.backend {
            Some(backend) => backend.as_ref(),
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.backend {
            Some(backend) => backend.as_mut(),
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("dialect", &self.pool.dialect.name())
            .field("age", &self.created.elapsed())
            .field(
                "state",
                &self.backend.as_ref().map(|b| b.transaction_state()),
            )
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(backend) = self.backend.take() else {
            return;
        };
        let pool = Arc::clone(&self.pool);
        let created = self.created;
        let broken = self.broken;
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("connection dropped without release, returning it in the background");
                handle.spawn(async move {
                    pool.recycle(backend, created, broken).await;
                    drop(permit);
                });
            }
            Err(_) => {
                warn!("connection dropped outside a runtime, closing it");
                drop(backend);
                let mut state = pool.state.lock();
                state.live = state.live.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::sqlite::{Sqlite, SqliteConnector};
    use crate::backend::{RawRow, TransactionState};
    use crate::value::Params;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
        rolled_back: AtomicUsize,
    }

    #[derive(Default)]
    struct FakeConnector {
        counters: Arc<Counters>,
        fail_open: AtomicBool,
    }

    struct FakeBackend {
        counters: Arc<Counters>,
        state: TransactionState,
        open: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn dialect(&self) -> Arc<dyn Dialect> {
            Arc::new(Sqlite)
        }

        async fn open(&self) -> Result<Box<dyn Backend>> {
            if self.fail_open.load(Ordering::SeqCst) {
                return Err(Error::state("refused"));
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeBackend {
                counters: Arc::clone(&self.counters),
                state: TransactionState::Idle,
                open: true,
            }))
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn dialect(&self) -> Arc<dyn Dialect> {
            Arc::new(Sqlite)
        }

        fn transaction_state(&self) -> TransactionState {
            self.state
        }

        fn is_usable(&self) -> bool {
            self.open
        }

        async fn close(&mut self) -> Result<()> {
            self.open = false;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn begin_transaction(&mut self) -> Result<()> {
            self.state = TransactionState::Open;
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.state = TransactionState::Committed;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
            self.state = TransactionState::Idle;
            Ok(())
        }

        async fn reset(&mut self) -> Result<()> {
            if self.state == TransactionState::Open {
                self.rollback().await?;
            }
            self.state = TransactionState::Idle;
            Ok(())
        }

        async fn execute_query(&mut self, _sql: &str, _params: &Params) -> Result<()> {
            self.state = TransactionState::Open;
            Ok(())
        }

        async fn fetch_one(&mut self) -> Result<Option<RawRow>> {
            Ok(None)
        }

        async fn fetch_many(&mut self, _n: usize) -> Result<Vec<RawRow>> {
            Ok(Vec::new())
        }

        async fn fetch_all(&mut self) -> Result<Vec<RawRow>> {
            Ok(Vec::new())
        }

        async fn affected_count(&mut self) -> Result<u64> {
            Ok(0)
        }
    }

    fn pool(config: PoolConfig) -> (Pool, Arc<Counters>) {
        let connector = FakeConnector::default();
        let counters = Arc::clone(&connector.counters);
        (Pool::new(connector, config).unwrap(), counters)
    }

    fn assert_bounded(pool: &Pool) {
        assert!(pool.idle_count() <= pool.live_count());
        assert!(pool.live_count() <= pool.capacity());
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = Pool::new(FakeConnector::default(), PoolConfig::new().size(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.size, DEFAULT_POOL_SIZE);
        assert!(config.lifetime.is_zero());
    }

    #[tokio::test]
    async fn opens_lazily_and_reuses_released_connection() {
        let (pool, counters) = pool(PoolConfig::new().size(2));
        assert_eq!(pool.live_count(), 0);

        let conn = pool.get().await.unwrap();
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 0);

        pool.release(conn).await;
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 1);

        let conn = pool.get().await.unwrap();
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
        pool.release(conn).await;
        assert_bounded(&pool);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_when_at_capacity() {
        let (pool, _) = pool(PoolConfig::new().size(1));
        let held = pool.get().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.get()).await;
        assert!(waiting.is_err(), "second checkout must wait while the only connection is out");

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get().await.map(|c| c.created()) })
        };
        tokio::task::yield_now().await;
        let created = held.created();
        pool.release(held).await;

        let reused = waiter.await.unwrap().unwrap();
        assert_eq!(reused, created);
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_connection_is_closed_on_release() {
        let (pool, counters) = pool(PoolConfig::new().size(2).lifetime(Duration::from_secs(10)));

        let conn = pool.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        pool.release(conn).await;

        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn young_connection_is_kept_on_release() {
        let (pool, counters) = pool(PoolConfig::new().size(2).lifetime(Duration::from_secs(10)));

        let conn = pool.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        pool.release(conn).await;

        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn open_transaction_is_rolled_back_before_reuse() {
        let (pool, counters) = pool(PoolConfig::new());
        let mut conn = pool.get().await.unwrap();
        conn.execute_query("UPDATE t SET a = 1", &Params::new())
            .await
            .unwrap();
        assert_eq!(conn.transaction_state(), TransactionState::Open);
        pool.release(conn).await;

        assert_eq!(counters.rolled_back.load(Ordering::SeqCst), 1);
        let conn = pool.get().await.unwrap();
        assert_eq!(conn.transaction_state(), TransactionState::Idle);
        pool.release(conn).await;
    }

    #[tokio::test]
    async fn unusable_connection_is_closed_on_release() {
        let (pool, counters) = pool(PoolConfig::new());
        let mut conn = pool.get().await.unwrap();
        conn.close().await.unwrap();
        pool.release(conn).await;

        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test]
    async fn reused_connection_has_no_unread_rows() {
        let pool = Pool::new(SqliteConnector::open_path(":memory:"), PoolConfig::new().size(1))
            .unwrap();
        let mut conn = pool.get().await.unwrap();
        conn.execute_query("SELECT 'first' UNION ALL SELECT 'second'", &Params::new())
            .await
            .unwrap();
        assert!(conn.fetch_one().await.unwrap().is_some());
        pool.release(conn).await;

        let mut conn = pool.get().await.unwrap();
        assert_eq!(conn.transaction_state(), TransactionState::Idle);
        assert!(matches!(conn.fetch_one().await, Err(Error::State(_))));
        pool.release(conn).await;
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn release_after_close_closes_the_connection() {
        let (pool, counters) = pool(PoolConfig::new());
        let conn = pool.get().await.unwrap();
        pool.close().await;
        pool.release(conn).await;

        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test]
    async fn broken_connection_is_not_reused() {
        let (pool, counters) = pool(PoolConfig::new());
        let mut conn = pool.get().await.unwrap();
        conn.mark_broken();
        assert!(conn.is_broken());
        pool.release(conn).await;

        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn dropped_connection_returns_to_pool() {
        let (pool, _) = pool(PoolConfig::new().size(1));
        {
            let _conn = pool.get().await.unwrap();
        }
        for _ in 0..10 {
            if pool.idle_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.live_count(), 1);

        let conn = pool.get().await.unwrap();
        pool.release(conn).await;
    }

    #[tokio::test]
    async fn failed_open_frees_the_slot() {
        let connector = FakeConnector::default();
        connector.fail_open.store(true, Ordering::SeqCst);
        let pool = Pool::new(connector, PoolConfig::new().size(1)).unwrap();

        assert!(pool.get().await.is_err());
        assert_eq!(pool.live_count(), 0);
        assert!(pool.get().await.is_err(), "permit must have been returned");
    }

    #[tokio::test]
    #[should_panic(expected = "did not issue it")]
    async fn releasing_into_foreign_pool_panics() {
        let (first, _) = pool(PoolConfig::new());
        let (second, _) = pool(PoolConfig::new());
        let conn = first.get().await.unwrap();
        second.release(conn).await;
    }

    #[tokio::test]
    async fn close_drains_idle_and_rejects_checkouts() {
        let (pool, counters) = pool(PoolConfig::new());
        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        pool.release(a).await;
        pool.release(b).await;

        pool.close().await;
        assert!(pool.is_closed());
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.live_count(), 0);
        assert!(matches!(pool.get().await, Err(Error::State(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn live_count_never_exceeds_capacity_under_contention() {
        let (pool, counters) = pool(PoolConfig::new().size(3));
        let out = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let pool = pool.clone();
            let out = Arc::clone(&out);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let conn = pool.get().await.unwrap();
                let now = out.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(pool.live_count() <= pool.capacity());
                tokio::task::yield_now().await;
                out.fetch_sub(1, Ordering::SeqCst);
                pool.release(conn).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(counters.opened.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.live_count(), pool.idle_count());
        assert_bounded(&pool);
    }
}
