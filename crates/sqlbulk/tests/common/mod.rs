//! Recording in-memory connection shared by the integration tests.
//!
//! Statements executed inside a transaction are staged and only become
//! visible in [`MockConnection::committed`] after a commit. Failures can be
//! injected at the Nth `execute` call (as an error or a cancellation), and
//! `query` serves scripted results.

#![allow(dead_code)]

use asupersync::CancelReason;
use asupersync::runtime::RuntimeBuilder;
use sqlbulk::{
    Connection, Cx, Error, Outcome, QueryError, QueryErrorKind, Row, TransactionError,
    TransactionErrorKind, TransactionOps, Value,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Execute(String),
    Query(String),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<Event>,
    staged: Vec<String>,
    committed: Vec<String>,
    execute_calls: usize,
    fail_at: Option<usize>,
    cancel_at: Option<usize>,
    fail_begin: bool,
    query_results: VecDeque<Vec<Row>>,
}

impl MockState {
    fn execute(&mut self, sql: &str, in_tx: bool) -> Outcome<u64, Error> {
        self.execute_calls += 1;
        self.events.push(Event::Execute(sql.to_string()));
        if self.fail_at == Some(self.execute_calls) {
            return Outcome::Err(Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                sql: Some(sql.to_string()),
                sqlstate: Some("23000".to_string()),
                message: "injected failure".to_string(),
                source: None,
            }));
        }
        if self.cancel_at == Some(self.execute_calls) {
            return Outcome::Cancelled(CancelReason::user("cancelled mid-statement"));
        }
        if in_tx {
            self.staged.push(sql.to_string());
        } else {
            self.committed.push(sql.to_string());
        }
        Outcome::Ok(1)
    }

    fn query(&mut self, sql: &str) -> Outcome<Vec<Row>, Error> {
        self.events.push(Event::Query(sql.to_string()));
        Outcome::Ok(self.query_results.pop_front().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th (1-based) `execute` call fail.
    pub fn fail_on_execute(&self, n: usize) {
        self.state.lock().expect("lock poisoned").fail_at = Some(n);
    }

    /// Make the `n`th (1-based) `execute` call report cancellation.
    pub fn cancel_on_execute(&self, n: usize) {
        self.state.lock().expect("lock poisoned").cancel_at = Some(n);
    }

    pub fn fail_begin(&self) {
        self.state.lock().expect("lock poisoned").fail_begin = true;
    }

    /// Queue the rows returned by the next `query` call.
    pub fn push_query_result(&self, rows: Vec<Row>) {
        self.state
            .lock()
            .expect("lock poisoned")
            .query_results
            .push_back(rows);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().expect("lock poisoned").events.clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.state.lock().expect("lock poisoned").committed.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }
}

impl Connection for MockConnection {
    type Tx<'conn>
        = MockTransaction
    where
        Self: 'conn;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.state.lock().expect("lock poisoned").query(sql);
        async move { result }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.state.lock().expect("lock poisoned").execute(sql, false);
        async move { result }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        let mut guard = self.state.lock().expect("lock poisoned");
        let result = if guard.fail_begin {
            Outcome::Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Begin,
                message: "injected begin failure".to_string(),
            }))
        } else {
            guard.events.push(Event::Begin);
            guard.staged.clear();
            Outcome::Ok(MockTransaction {
                state: Arc::clone(&self.state),
            })
        };
        drop(guard);
        async move { result }
    }
}

#[derive(Debug)]
pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
}

impl TransactionOps for MockTransaction {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.state.lock().expect("lock poisoned").query(sql);
        async move { result }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.state.lock().expect("lock poisoned").execute(sql, true);
        async move { result }
    }

    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.events.push(Event::Commit);
        let staged = std::mem::take(&mut guard.staged);
        guard.committed.extend(staged);
        drop(guard);
        async { Outcome::Ok(()) }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.events.push(Event::Rollback);
        guard.staged.clear();
        drop(guard);
        async { Outcome::Ok(()) }
    }
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(v) => panic!("expected an error, got {v:?}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_cancelled<T: std::fmt::Debug>(outcome: Outcome<T, Error>) {
    match outcome {
        Outcome::Cancelled(_) => {}
        Outcome::Ok(v) => panic!("expected cancellation, got {v:?}"),
        Outcome::Err(e) => panic!("expected cancellation, got error: {e}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Run an async test body on a current-thread runtime.
pub fn run<F, Fut>(body: F)
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = ()>,
{
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    rt.block_on(body(cx));
}
