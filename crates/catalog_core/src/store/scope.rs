//! Transaction scopes with an explicit lifecycle.
//!
//! # Responsibility
//! - Model connect -> begin -> commit | rollback -> release as a state
//!   machine bound to one connection.
//! - Drive that lifecycle around a unit of work (`run_in_scope`).
//!
//! # Invariants
//! - At most one active transaction per scope and per connection.
//! - `Released` is terminal; any further operation is rejected.
//! - `run_in_scope` releases exactly once on every path, including when
//!   commit or rollback fails.
//! - Writes through a scope are only possible while it is `Active`.

use log::{debug, error, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ScopeResult<T> = Result<T, ScopeError>;

/// Lifecycle state of a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Idle,
    Connected,
    Active,
    Committed,
    RolledBack,
    Released,
}

impl ScopeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Released => "released",
        }
    }
}

impl Display for ScopeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum ScopeError {
    /// Operation is not valid in the current state.
    InvalidTransition {
        operation: &'static str,
        state: ScopeState,
    },
    /// Underlying connection already has an open transaction.
    ConnectionBusy,
    Sqlite(rusqlite::Error),
}

impl Display for ScopeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { operation, state } => {
                write!(f, "cannot {operation} a transaction scope in state `{state}`")
            }
            Self::ConnectionBusy => write!(f, "connection already has an open transaction"),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ScopeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ScopeError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Lifecycle operations of a unit of work.
pub trait UnitOfWork {
    fn state(&self) -> ScopeState;
    fn connect(&mut self) -> ScopeResult<()>;
    fn begin(&mut self) -> ScopeResult<()>;
    fn commit(&mut self) -> ScopeResult<()>;
    fn rollback(&mut self) -> ScopeResult<()>;
    fn release(&mut self) -> ScopeResult<()>;

    fn is_transaction_active(&self) -> bool {
        self.state() == ScopeState::Active
    }
}

/// Hands out transaction scopes over one connection.
#[derive(Clone, Copy)]
pub struct DataSource<'conn> {
    conn: &'conn Connection,
}

impl<'conn> DataSource<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Connection used for reads outside any scope.
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn create_scope(&self) -> TransactionScope<'conn> {
        TransactionScope::new(self.conn)
    }
}

/// SQLite transaction scope.
pub struct TransactionScope<'conn> {
    conn: &'conn Connection,
    state: ScopeState,
    scope_id: Uuid,
}

impl<'conn> TransactionScope<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            state: ScopeState::Idle,
            scope_id: Uuid::new_v4(),
        }
    }

    /// Correlation id used in scope log events.
    pub fn scope_id(&self) -> Uuid {
        self.scope_id
    }

    /// Connection for writes bound to this scope's transaction.
    pub fn connection(&self) -> ScopeResult<&'conn Connection> {
        if self.state != ScopeState::Active {
            return Err(self.invalid("write through"));
        }
        Ok(self.conn)
    }

    fn invalid(&self, operation: &'static str) -> ScopeError {
        ScopeError::InvalidTransition {
            operation,
            state: self.state,
        }
    }

    fn expect_state(&self, expected: ScopeState, operation: &'static str) -> ScopeResult<()> {
        if self.state != expected {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    // A failed COMMIT/ROLLBACK may or may not have closed the transaction.
    fn settle_after_failure(&mut self) {
        if self.conn.is_autocommit() {
            self.state = ScopeState::RolledBack;
        }
    }

    fn transition(&mut self, next: ScopeState) {
        debug!(
            "event=scope_transition module=store scope_id={} from={} to={}",
            self.scope_id, self.state, next
        );
        self.state = next;
    }
}

impl UnitOfWork for TransactionScope<'_> {
    fn state(&self) -> ScopeState {
        self.state
    }

    fn connect(&mut self) -> ScopeResult<()> {
        self.expect_state(ScopeState::Idle, "connect")?;
        if !self.conn.is_autocommit() {
            return Err(ScopeError::ConnectionBusy);
        }
        self.transition(ScopeState::Connected);
        Ok(())
    }

    fn begin(&mut self) -> ScopeResult<()> {
        self.expect_state(ScopeState::Connected, "begin")?;
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.transition(ScopeState::Active);
        Ok(())
    }

    fn commit(&mut self) -> ScopeResult<()> {
        self.expect_state(ScopeState::Active, "commit")?;
        if let Err(err) = self.conn.execute_batch("COMMIT;") {
            self.settle_after_failure();
            return Err(err.into());
        }
        self.transition(ScopeState::Committed);
        Ok(())
    }

    fn rollback(&mut self) -> ScopeResult<()> {
        self.expect_state(ScopeState::Active, "rollback")?;
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            self.settle_after_failure();
            return Err(err.into());
        }
        self.transition(ScopeState::RolledBack);
        Ok(())
    }

    fn release(&mut self) -> ScopeResult<()> {
        if self.state == ScopeState::Released {
            return Err(self.invalid("release"));
        }

        let mut outcome = Ok(());
        if self.state == ScopeState::Active {
            warn!(
                "event=scope_release module=store status=forced_rollback scope_id={}",
                self.scope_id
            );
            if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
                outcome = Err(ScopeError::Sqlite(err));
            }
        }
        self.transition(ScopeState::Released);
        outcome
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if matches!(self.state, ScopeState::Idle | ScopeState::Released) {
            return;
        }
        warn!(
            "event=scope_drop module=store status=unreleased scope_id={} state={}",
            self.scope_id, self.state
        );
        if let Err(err) = self.release() {
            error!(
                "event=scope_drop module=store status=error scope_id={} error_code=release_failed error={}",
                self.scope_id, err
            );
        }
    }
}

/// Runs `work` inside `scope`: connect, begin, work, commit.
///
/// Any error after the scope is active rolls back (only while the
/// transaction is still active). The scope is released exactly once on
/// every path and the first error is returned. Rollback and release
/// failures that occur while handling an earlier error are logged, not
/// returned.
pub fn run_in_scope<U, T, E, F>(mut scope: U, work: F) -> Result<T, E>
where
    U: UnitOfWork,
    E: From<ScopeError> + Display,
    F: FnOnce(&U) -> Result<T, E>,
{
    let outcome = execute(&mut scope, work);

    let outcome = match outcome {
        Ok(value) => Ok(value),
        Err(err) => {
            if scope.is_transaction_active() {
                if let Err(rollback_err) = scope.rollback() {
                    error!(
                        "event=scope_rollback module=store status=error error_code=rollback_failed error={} cause={}",
                        rollback_err, err
                    );
                }
            }
            Err(err)
        }
    };

    match (outcome, scope.release()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => {
            error!(
                "event=scope_release module=store status=error error_code=release_failed error={}",
                release_err
            );
            Err(release_err.into())
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            error!(
                "event=scope_release module=store status=error error_code=release_failed error={} cause={}",
                release_err, err
            );
            Err(err)
        }
    }
}

fn execute<U, T, E, F>(scope: &mut U, work: F) -> Result<T, E>
where
    U: UnitOfWork,
    E: From<ScopeError>,
    F: FnOnce(&U) -> Result<T, E>,
{
    scope.connect()?;
    scope.begin()?;
    let value = work(&*scope)?;
    scope.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{
        run_in_scope, DataSource, ScopeError, ScopeResult, ScopeState, TransactionScope,
        UnitOfWork,
    };
    use rusqlite::Connection;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Scope double recording lifecycle calls, with injectable failures.
    struct RecordingScope {
        calls: Rc<RefCell<Vec<&'static str>>>,
        state: ScopeState,
        fail_commit: bool,
        fail_rollback: bool,
        fail_release: bool,
    }

    impl RecordingScope {
        fn new(calls: Rc<RefCell<Vec<&'static str>>>) -> Self {
            Self {
                calls,
                state: ScopeState::Idle,
                fail_commit: false,
                fail_rollback: false,
                fail_release: false,
            }
        }

        fn step(
            &mut self,
            name: &'static str,
            next: ScopeState,
            fail: bool,
        ) -> ScopeResult<()> {
            self.calls.borrow_mut().push(name);
            if fail {
                return Err(ScopeError::InvalidTransition {
                    operation: name,
                    state: self.state,
                });
            }
            self.state = next;
            Ok(())
        }
    }

    impl UnitOfWork for RecordingScope {
        fn state(&self) -> ScopeState {
            self.state
        }
        fn connect(&mut self) -> ScopeResult<()> {
            self.step("connect", ScopeState::Connected, false)
        }
        fn begin(&mut self) -> ScopeResult<()> {
            self.step("begin", ScopeState::Active, false)
        }
        fn commit(&mut self) -> ScopeResult<()> {
            let fail = self.fail_commit;
            self.step("commit", ScopeState::Committed, fail)
        }
        fn rollback(&mut self) -> ScopeResult<()> {
            let fail = self.fail_rollback;
            self.step("rollback", ScopeState::RolledBack, fail)
        }
        fn release(&mut self) -> ScopeResult<()> {
            let fail = self.fail_release;
            self.step("release", ScopeState::Released, fail)
        }
    }

    #[derive(Debug, PartialEq)]
    enum WorkError {
        Business,
        Scope(String),
    }

    impl std::fmt::Display for WorkError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl From<ScopeError> for WorkError {
        fn from(value: ScopeError) -> Self {
            Self::Scope(value.to_string())
        }
    }

    fn calls() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn success_commits_then_releases() {
        let log = calls();
        let result: Result<i32, WorkError> =
            run_in_scope(RecordingScope::new(log.clone()), |_| Ok(7));
        assert_eq!(result, Ok(7));
        assert_eq!(*log.borrow(), vec!["connect", "begin", "commit", "release"]);
    }

    #[test]
    fn work_error_rolls_back_then_releases() {
        let log = calls();
        let result: Result<(), WorkError> =
            run_in_scope(RecordingScope::new(log.clone()), |_| Err(WorkError::Business));
        assert_eq!(result, Err(WorkError::Business));
        assert_eq!(*log.borrow(), vec!["connect", "begin", "rollback", "release"]);
    }

    #[test]
    fn release_still_runs_when_rollback_fails() {
        let log = calls();
        let mut scope = RecordingScope::new(log.clone());
        scope.fail_rollback = true;

        let result: Result<(), WorkError> = run_in_scope(scope, |_| Err(WorkError::Business));

        assert_eq!(result, Err(WorkError::Business));
        assert_eq!(*log.borrow(), vec!["connect", "begin", "rollback", "release"]);
    }

    #[test]
    fn failed_commit_rolls_back_and_releases() {
        let log = calls();
        let mut scope = RecordingScope::new(log.clone());
        scope.fail_commit = true;

        let result: Result<(), WorkError> = run_in_scope(scope, |_| Ok(()));

        assert!(matches!(result, Err(WorkError::Scope(_))));
        assert_eq!(
            *log.borrow(),
            vec!["connect", "begin", "commit", "rollback", "release"]
        );
    }

    #[test]
    fn release_failure_after_commit_is_reported() {
        let log = calls();
        let mut scope = RecordingScope::new(log.clone());
        scope.fail_release = true;

        let result: Result<(), WorkError> = run_in_scope(scope, |_| Ok(()));

        assert!(matches!(result, Err(WorkError::Scope(_))));
        assert_eq!(*log.borrow(), vec!["connect", "begin", "commit", "release"]);
    }

    #[test]
    fn sqlite_scope_follows_state_machine() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();
        let source = DataSource::new(&conn);

        let mut scope = source.create_scope();
        assert_eq!(scope.state(), ScopeState::Idle);
        assert!(scope.connection().is_err());
        assert!(scope.begin().is_err());

        scope.connect().unwrap();
        scope.begin().unwrap();
        assert!(scope.is_transaction_active());
        scope
            .connection()
            .unwrap()
            .execute("INSERT INTO t (v) VALUES (1)", [])
            .unwrap();
        scope.rollback().unwrap();
        assert_eq!(scope.state(), ScopeState::RolledBack);
        assert!(scope.commit().is_err());

        scope.release().unwrap();
        assert_eq!(scope.state(), ScopeState::Released);
        assert!(scope.release().is_err());
        assert!(scope.connect().is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn second_scope_cannot_connect_while_first_is_active() {
        let conn = Connection::open_in_memory().unwrap();
        let mut first = TransactionScope::new(&conn);
        first.connect().unwrap();
        first.begin().unwrap();

        let mut second = TransactionScope::new(&conn);
        assert!(matches!(second.connect(), Err(ScopeError::ConnectionBusy)));

        first.release().unwrap();
        assert!(conn.is_autocommit());
        second.connect().unwrap();
    }

    #[test]
    fn dropping_an_active_scope_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();
        {
            let mut scope = TransactionScope::new(&conn);
            scope.connect().unwrap();
            scope.begin().unwrap();
            conn.execute("INSERT INTO t (v) VALUES (1)", []).unwrap();
        }
        assert!(conn.is_autocommit());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
