//! Connection pool for the federation endpoint.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use fedtx_core::{ConnectionId, Credentials, Endpoint, PhysicalConnection};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};

/// Something that hands out logical connections.
pub trait ConnectionProvider: Send + Sync {
    /// Borrow a connection, blocking until one is free or the timeout passes.
    fn acquire(&self) -> PoolResult<LogicalConnection>;

    /// Give a connection back.
    fn release(&self, connection: LogicalConnection);

    fn stats(&self) -> PoolStats;
}

/// Statistics about connection pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub acquisitions: u64,
    pub releases: u64,
    pub created: u64,
    pub closed: u64,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

struct IdleConnection {
    conn: Box<dyn PhysicalConnection>,
    since: Instant,
}

#[derive(Default)]
struct PoolState {
    /// Oldest first; reuse takes from the back.
    idle: VecDeque<IdleConnection>,
    /// Open physical connections, idle or lent out.
    total: usize,
    closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    created: AtomicU64,
    closed: AtomicU64,
}

struct PoolShared {
    endpoint: Arc<dyn Endpoint>,
    credentials: Credentials,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    counters: Counters,
}

impl PoolShared {
    fn open(&self) -> PoolResult<Box<dyn PhysicalConnection>> {
        let mut conn = self.endpoint.connect(&self.credentials)?;
        let configured = conn
            .set_auto_commit(self.config.auto_commit)
            .and_then(|_| conn.set_isolation(self.config.isolation));
        if let Err(e) = configured {
            conn.close();
            return Err(e.into());
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        debug!(connection = %conn.id(), endpoint = %self.endpoint.address(), "pool opened connection");
        Ok(conn)
    }

    fn discard(&self, state: &mut PoolState, mut conn: Box<dyn PhysicalConnection>) {
        conn.close();
        state.total = state.total.saturating_sub(1);
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }

    /// Close idle connections above `min_idle` that exceeded the idle timeout.
    fn evict_expired(&self, state: &mut PoolState) {
        let timeout = self.config.idle_timeout();
        while state.idle.len() > self.config.min_idle {
            match state.idle.front() {
                Some(oldest) if oldest.since.elapsed() >= timeout => {
                    if let Some(expired) = state.idle.pop_front() {
                        debug!(connection = %expired.conn.id(), "evicting idle connection");
                        self.discard(state, expired.conn);
                    }
                }
                _ => break,
            }
        }
    }

    fn give_back(&self, mut conn: Box<dyn PhysicalConnection>) {
        if conn.in_transaction() {
            warn!(connection = %conn.id(), "connection returned with an open transaction, rolling back");
            if let Err(e) = conn.rollback() {
                warn!(connection = %conn.id(), error = %e, "rollback on return failed");
                conn.close();
            }
        }
        self.counters.releases.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.closed || !conn.is_valid() {
            self.discard(&mut state, conn);
        } else {
            state.idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
        self.available.notify_one();
    }
}

/// Bounded pool of connections to one federation endpoint.
///
/// Cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("endpoint", &self.shared.endpoint.address())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ConnectionPool {
    /// Create a pool and open `min_idle` connections up front.
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        credentials: Credentials,
        config: PoolConfig,
    ) -> PoolResult<Self> {
        config.validate()?;
        let pool = Self {
            shared: Arc::new(PoolShared {
                endpoint,
                credentials,
                config,
                state: Mutex::new(PoolState::default()),
                available: Condvar::new(),
                counters: Counters::default(),
            }),
        };
        pool.fill_min_idle()?;
        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    fn fill_min_idle(&self) -> PoolResult<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        while state.total < shared.config.min_idle {
            let conn = shared.open()?;
            state.total += 1;
            state.idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
        Ok(())
    }

    /// Close surplus idle connections that exceeded the idle timeout.
    pub fn evict_idle(&self) {
        let mut state = self.shared.state.lock();
        self.shared.evict_expired(&mut state);
    }

    /// Close the pool. Lent-out connections are closed when they come back.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        while let Some(idle) = state.idle.pop_front() {
            self.shared.discard(&mut state, idle.conn);
        }
        self.shared.available.notify_all();
    }
}

impl ConnectionProvider for ConnectionPool {
    fn acquire(&self) -> PoolResult<LogicalConnection> {
        let shared = &self.shared;
        let started = Instant::now();
        let deadline = started + shared.config.connection_timeout();
        let mut state = shared.state.lock();

        loop {
            if state.closed {
                return Err(PoolError::Closed);
            }
            shared.evict_expired(&mut state);

            while let Some(idle) = state.idle.pop_back() {
                if idle.conn.is_valid() {
                    shared.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
                    return Ok(LogicalConnection::new(idle.conn, Arc::clone(shared)));
                }
                shared.discard(&mut state, idle.conn);
            }

            if state.total < shared.config.max_size {
                state.total += 1;
                drop(state);
                return match shared.open() {
                    Ok(conn) => {
                        shared.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
                        Ok(LogicalConnection::new(conn, Arc::clone(shared)))
                    }
                    Err(e) => {
                        let mut state = shared.state.lock();
                        state.total = state.total.saturating_sub(1);
                        shared.available.notify_one();
                        Err(e)
                    }
                };
            }

            if shared.available.wait_until(&mut state, deadline).timed_out() {
                warn!(max_size = shared.config.max_size, "connection pool exhausted");
                return Err(PoolError::Timeout {
                    waited: started.elapsed(),
                });
            }
        }
    }

    fn release(&self, connection: LogicalConnection) {
        debug!(connection = %connection.id(), "releasing connection");
        drop(connection);
    }

    fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let counters = &self.shared.counters;
        PoolStats {
            acquisitions: counters.acquisitions.load(Ordering::SeqCst),
            releases: counters.releases.load(Ordering::SeqCst),
            created: counters.created.load(Ordering::SeqCst),
            closed: counters.closed.load(Ordering::SeqCst),
            idle: state.idle.len(),
            in_use: state.total - state.idle.len(),
            max_size: self.shared.config.max_size,
        }
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct LogicalConnection {
    conn: Option<Box<dyn PhysicalConnection>>,
    id: ConnectionId,
    pool: Arc<PoolShared>,
}

impl LogicalConnection {
    fn new(conn: Box<dyn PhysicalConnection>, pool: Arc<PoolShared>) -> Self {
        Self {
            id: conn.id(),
            conn: Some(conn),
            pool,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl fmt::Debug for LogicalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalConnection").field("id", &self.id).finish()
    }
}

impl Deref for LogicalConnection {
    type Target = dyn PhysicalConnection;

    fn deref(&self) -> &Self::Target {
        // Only taken in Drop.
        self.conn.as_deref().expect("connection already returned to the pool")
    }
}

impl DerefMut for LogicalConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection already returned to the pool")
    }
}

impl Drop for LogicalConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}
