//! Connection manager and scoped sessions.
//!
//! # Responsibility
//! - Dial the backend, verify liveness, keep the long-lived primary handle.
//! - Hand out independent per-operation [`Session`]s from an idle pool.
//! - Release sessions on every exit path through `Drop`.
//!
//! # Invariants
//! - The primary handle never serves operations; it only anchors the
//!   backend (keeping in-memory databases alive) until [`Database::close`].
//! - After `close`, `acquire` fails with [`DbError::Closed`].
//! - A session left inside an open transaction is discarded, never pooled.
//! - Every session carries a deadline of `operation_timeout` from acquire;
//!   statements still running past it are interrupted.

use super::collection::Collection;
use super::url::ConnectionUrl;
use super::{translate, DbError, DbResult};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_IDLE_SESSIONS: usize = 8;
const LIVENESS_PROBE_SQL: &str = "SELECT count(*) FROM sqlite_master;";
/// Virtual machine steps between deadline checks.
const DEADLINE_CHECK_INTERVAL_OPS: i32 = 1_000;

/// Tuning knobs for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    /// Deadline for a single storage call. Bounds both lock waits (busy
    /// timeout) and statement execution (interrupt once it has passed).
    pub operation_timeout: Duration,
    /// Upper bound on released sessions kept for reuse.
    pub max_idle_sessions: usize,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_idle_sessions: DEFAULT_MAX_IDLE_SESSIONS,
        }
    }
}

/// Snapshot of session pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    pub closed: bool,
}

/// Long-lived handle to one document database.
///
/// Share it behind an `Arc`; every storage call goes through
/// [`Database::acquire`].
pub struct Database {
    url: ConnectionUrl,
    options: DbOptions,
    primary: Mutex<Option<Connection>>,
    idle: Mutex<Vec<Connection>>,
    in_use: AtomicUsize,
    closed: AtomicBool,
    ready_collections: Mutex<HashSet<String>>,
}

impl Database {
    /// Opens the backend named by `url` and verifies it answers a probe.
    ///
    /// # Errors
    /// - [`DbError::InvalidUrl`] / [`DbError::Connect`] when the target
    ///   cannot be parsed or opened.
    /// - [`DbError::ConnectivityCheck`] when the liveness probe fails.
    pub fn connect(url: &str, options: DbOptions) -> DbResult<Self> {
        let started_at = Instant::now();
        let url = ConnectionUrl::parse(url).inspect_err(|err| {
            error!(
                "event=db_connect module=db status=error error_code=invalid_url error={}",
                err
            );
        })?;
        info!(
            "event=db_connect module=db status=start mode={}",
            url.mode()
        );

        let primary = open_connection(&url, &options).map_err(|source| {
            error!(
                "event=db_connect module=db status=error mode={} duration_ms={} error_code=open_failed error={}",
                url.mode(),
                started_at.elapsed().as_millis(),
                source
            );
            DbError::Connect {
                target: url.to_string(),
                source,
            }
        })?;

        if let Err(err) = probe(&primary) {
            error!(
                "event=db_connect module=db status=error mode={} duration_ms={} error_code=probe_failed error={}",
                url.mode(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(DbError::ConnectivityCheck(err));
        }

        if !url.is_memory() {
            enable_wal(&primary).map_err(|source| DbError::Connect {
                target: url.to_string(),
                source,
            })?;
        }

        info!(
            "event=db_connect module=db status=ok mode={} duration_ms={}",
            url.mode(),
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            url,
            options,
            primary: Mutex::new(Some(primary)),
            idle: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            ready_collections: Mutex::new(HashSet::new()),
        })
    }

    pub fn url(&self) -> &ConnectionUrl {
        &self.url
    }

    /// Returns an independent session for exactly one operation.
    pub fn acquire(&self) -> DbResult<Session<'_>> {
        let pooled = {
            let mut idle = lock(&self.idle);
            if self.closed.load(Ordering::Acquire) {
                return Err(DbError::Closed);
            }
            idle.pop()
        };

        let conn = match pooled {
            Some(conn) => conn,
            None => open_connection(&self.url, &self.options).map_err(translate)?,
        };

        let deadline = Instant::now() + self.options.operation_timeout;
        conn.progress_handler(
            DEADLINE_CHECK_INTERVAL_OPS,
            Some(move || Instant::now() >= deadline),
        );

        let in_use = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("event=session_acquire module=db status=ok in_use={in_use}");
        Ok(Session {
            db: self,
            conn: Some(conn),
        })
    }

    /// Re-runs the liveness probe on a scoped session.
    pub fn ping(&self) -> DbResult<()> {
        let session = self.acquire()?;
        probe(session.connection()).map_err(DbError::ConnectivityCheck)
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            idle: lock(&self.idle).len(),
            in_use: self.in_use.load(Ordering::Acquire),
            closed: self.closed.load(Ordering::Acquire),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Terminates the primary handle and drops idle sessions. Idempotent.
    ///
    /// Sessions still in flight finish their call and are discarded on
    /// release.
    pub fn close(&self) {
        {
            let mut idle = lock(&self.idle);
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            idle.clear();
        }
        lock(&self.ready_collections).clear();

        if let Some(primary) = lock(&self.primary).take() {
            if let Err((_, err)) = primary.close() {
                warn!("event=db_close module=db status=error error={err}");
                return;
            }
        }
        info!("event=db_close module=db status=ok mode={}", self.url.mode());
    }

    pub(crate) fn is_collection_ready(&self, name: &str) -> bool {
        lock(&self.ready_collections).contains(name)
    }

    pub(crate) fn mark_collection_ready(&self, name: &str, ready: bool) {
        let mut collections = lock(&self.ready_collections);
        if ready {
            collections.insert(name.to_string());
        } else {
            collections.remove(name);
        }
    }

    fn release(&self, conn: Connection) {
        let in_use = self.in_use.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);

        if !conn.is_autocommit() {
            warn!("event=session_release module=db status=discarded reason=open_transaction in_use={in_use}");
            return;
        }

        let mut idle = lock(&self.idle);
        if self.closed.load(Ordering::Acquire) || idle.len() >= self.options.max_idle_sessions {
            debug!("event=session_release module=db status=closed in_use={in_use}");
            return;
        }
        idle.push(conn);
        debug!(
            "event=session_release module=db status=pooled in_use={in_use} idle={}",
            idle.len()
        );
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("pool", &self.pool_status())
            .finish()
    }
}

/// Scoped per-operation handle. Dropping it releases the connection.
pub struct Session<'db> {
    db: &'db Database,
    conn: Option<Connection>,
}

impl Session<'_> {
    pub fn connection(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("session connection is present until drop")
    }

    /// Opens a named collection, creating its backing table on first use.
    pub fn collection(&self, name: &str) -> DbResult<Collection<'_>> {
        Collection::open(self.db, self.connection(), name)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.db.release(conn);
        }
    }
}

fn open_connection(url: &ConnectionUrl, options: &DbOptions) -> rusqlite::Result<Connection> {
    let conn = Connection::open(url.open_target())?;
    conn.busy_timeout(options.operation_timeout)?;
    Ok(conn)
}

fn probe(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row(LIVENESS_PROBE_SQL, [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

fn enable_wal(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("event=db_connect module=db status=configured journal_mode={mode}");
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::{Database, DbOptions};

    #[test]
    fn released_sessions_are_pooled_up_to_the_idle_limit() {
        let options = DbOptions {
            max_idle_sessions: 1,
            ..DbOptions::default()
        };
        let db = Database::connect("sqlite::memory:", options).unwrap();

        let first = db.acquire().unwrap();
        let second = db.acquire().unwrap();
        assert_eq!(db.pool_status().in_use, 2);

        drop(first);
        drop(second);
        let status = db.pool_status();
        assert_eq!(status.in_use, 0);
        assert_eq!(status.idle, 1);
    }

    #[test]
    fn session_left_in_transaction_is_discarded() {
        let db = Database::connect("sqlite::memory:", DbOptions::default()).unwrap();

        let session = db.acquire().unwrap();
        session.connection().execute_batch("BEGIN;").unwrap();
        drop(session);

        assert_eq!(db.pool_status().idle, 0);
        assert_eq!(db.pool_status().in_use, 0);
    }
}
