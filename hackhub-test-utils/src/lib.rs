//! HackHub Test Utilities
//!
//! Shared test infrastructure for the HackHub workspace:
//! - `ScriptedPool`, a fake SQL driver that records every statement and
//!   replays scripted outcomes while tracking connection occupancy
//! - `TableAllocationSim`, an in-memory stand-in for the judging-table
//!   allocation statement, serialized under a mutex like a row lock
//! - `FailingCache`, a query cache whose writes always fail
//! - Proptest generators, fixtures, and assertions

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub use hackhub_core::{
    AuthLevel, Category, CategoryId, DataError, DataResult, ErrorKind, Hackathon, HackathonId,
    LiveUpdate, Project, ProjectId, TableAssignment, TableNumber,
};
pub use hackhub_storage::{
    CacheStats, InMemoryTreeStore, LruQueryCache, PoolStatus, QueryCache, SqlConnection, SqlParam,
    SqlPool, SqlUow, Statement, TreeUow,
};

// ============================================================================
// SCRIPTED SQL POOL
// ============================================================================

/// Computes the rows for a statement that has no scripted outcome queued.
pub type Responder = Arc<dyn Fn(&str, &[SqlParam]) -> DataResult<Vec<JsonValue>> + Send + Sync>;

/// Box a closure as a [`Responder`].
pub fn respond_with<F>(respond: F) -> Responder
where
    F: Fn(&str, &[SqlParam]) -> DataResult<Vec<JsonValue>> + Send + Sync + 'static,
{
    Arc::new(respond)
}

/// Something that happened on a scripted connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    Acquire,
    Begin,
    Execute(String),
    Commit,
    Rollback,
    Release,
}

struct Shared {
    max_size: usize,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    script: Mutex<VecDeque<DataResult<Vec<JsonValue>>>>,
    responder: Mutex<Option<Responder>>,
    statements: Mutex<Vec<Statement>>,
    events: Mutex<Vec<PoolEvent>>,
}

/// Fake SQL pool.
///
/// `execute` pops the next scripted outcome; with the script empty it asks the
/// responder, and with no responder it returns zero rows. Connections are
/// counted with a semaphore so leak checks see exactly what a real pool would.
#[derive(Clone)]
pub struct ScriptedPool {
    shared: Arc<Shared>,
}

impl ScriptedPool {
    pub fn new(max_size: usize) -> Self {
        Self::with_acquire_timeout(max_size, Duration::from_millis(200))
    }

    /// Pool whose `acquire` gives up after `timeout`.
    pub fn with_acquire_timeout(max_size: usize, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_size,
                permits: Arc::new(Semaphore::new(max_size)),
                acquire_timeout: timeout,
                script: Mutex::new(VecDeque::new()),
                responder: Mutex::new(None),
                statements: Mutex::new(Vec::new()),
                events: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queue rows for the next unscripted `execute`.
    pub fn push_rows(&self, rows: Vec<JsonValue>) -> &Self {
        self.shared.script.lock().push_back(Ok(rows));
        self
    }

    /// Queue a failure for the next unscripted `execute`.
    pub fn push_error(&self, err: DataError) -> &Self {
        self.shared.script.lock().push_back(Err(err));
        self
    }

    pub fn set_responder(&self, responder: Responder) {
        *self.shared.responder.lock() = Some(responder);
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.shared.statements.lock().clone()
    }

    pub fn events(&self) -> Vec<PoolEvent> {
        self.shared.events.lock().clone()
    }

    pub fn count_events(&self, event: &PoolEvent) -> usize {
        self.shared.events.lock().iter().filter(|e| *e == event).count()
    }

    pub fn available(&self) -> usize {
        self.shared.permits.available_permits()
    }

    pub fn max_size(&self) -> usize {
        self.shared.max_size
    }

    fn record(&self, event: PoolEvent) {
        self.shared.events.lock().push(event);
    }
}

#[async_trait]
impl SqlPool for ScriptedPool {
    async fn acquire(&self) -> DataResult<Box<dyn SqlConnection>> {
        let permits = Arc::clone(&self.shared.permits);
        let permit = tokio::time::timeout(self.shared.acquire_timeout, permits.acquire_owned())
            .await
            .map_err(|_| DataError::unavailable("Database connection pool exhausted"))?
            .map_err(|_| DataError::unavailable("Database connection pool closed"))?;
        self.record(PoolEvent::Acquire);
        Ok(Box::new(ScriptedConnection {
            pool: self.clone(),
            _permit: permit,
        }))
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            max_size: self.shared.max_size,
            available: self.available(),
        }
    }
}

struct ScriptedConnection {
    pool: ScriptedPool,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    async fn begin(&mut self) -> DataResult<()> {
        self.pool.record(PoolEvent::Begin);
        Ok(())
    }

    async fn execute(&mut self, statement: &str, params: &[SqlParam]) -> DataResult<Vec<JsonValue>> {
        self.pool.record(PoolEvent::Execute(statement.to_string()));
        self.pool
            .shared
            .statements
            .lock()
            .push(Statement::new(statement, params.to_vec()));
        // Let concurrent callers interleave between acquiring and executing.
        tokio::task::yield_now().await;

        let scripted = self.pool.shared.script.lock().pop_front();
        if let Some(outcome) = scripted {
            return outcome;
        }
        let responder = self.pool.shared.responder.lock().clone();
        match responder {
            Some(respond) => respond(statement, params),
            None => Ok(Vec::new()),
        }
    }

    async fn commit(&mut self) -> DataResult<()> {
        self.pool.record(PoolEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> DataResult<()> {
        self.pool.record(PoolEvent::Rollback);
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.pool.record(PoolEvent::Release);
    }
}

// ============================================================================
// TABLE ALLOCATION SIMULATION
// ============================================================================

#[derive(Debug, Default)]
struct AllocationState {
    /// (table, priority, supported categories)
    tables: Vec<(TableNumber, i32, HashSet<CategoryId>)>,
    /// (hackathon, assignment)
    assignments: Vec<(HackathonId, TableAssignment)>,
    /// Upcoming allocations that pick an already taken table.
    stale_reads: usize,
}

/// In-memory judging tables answering the allocation statement.
///
/// The statement is recognised by its target table and bound as
/// `[$1 project, $2 hackathon, $3 categories, $4 required count, ..]`. Each
/// allocation runs entirely under one lock, which plays the part of the row
/// lock taken by the real statement. [`TableAllocationSim::stale_reads`]
/// replays the window where a statement's snapshot predates a concurrent
/// commit.
#[derive(Debug, Default)]
pub struct TableAllocationSim {
    state: Mutex<AllocationState>,
}

impl TableAllocationSim {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_table(&self, number: TableNumber, priority: i32, categories: &[CategoryId]) {
        self.state
            .lock()
            .tables
            .push((number, priority, categories.iter().copied().collect()));
    }

    pub fn assignments(&self) -> Vec<(HackathonId, TableAssignment)> {
        self.state.lock().assignments.clone()
    }

    /// Make the next `count` allocations that find a taken table in their
    /// hackathon pick it anyway and hit the unique constraint.
    pub fn stale_reads(&self, count: usize) {
        self.state.lock().stale_reads = count;
    }

    /// Responder that serves the allocation statement and returns zero rows
    /// for anything else.
    pub fn responder(self: &Arc<Self>) -> Responder {
        let sim = Arc::clone(self);
        respond_with(move |statement, params| {
            if !statement.starts_with("INSERT INTO \"table_assignments\"") {
                return Ok(Vec::new());
            }
            match params {
                [SqlParam::Long(project), SqlParam::Text(hackathon), SqlParam::IntArray(categories), SqlParam::Long(required), ..] => {
                    sim.allocate(*project, hackathon, categories, *required)
                }
                _ => Err(DataError::new(ErrorKind::MalformedStatement, "unexpected allocation parameters")),
            }
        })
    }

    fn allocate(
        &self,
        project: ProjectId,
        hackathon: &str,
        categories: &[CategoryId],
        required: i64,
    ) -> DataResult<Vec<JsonValue>> {
        let mut state = self.state.lock();
        let wanted: HashSet<CategoryId> = categories.iter().copied().collect();
        let taken: HashSet<TableNumber> = state
            .assignments
            .iter()
            .filter(|(h, _)| h == hackathon)
            .map(|(_, a)| a.table_number)
            .collect();
        if state.stale_reads > 0 && !taken.is_empty() {
            state.stale_reads -= 1;
            return Err(fixtures::duplicate_error());
        }

        let mut candidates: Vec<&(TableNumber, i32, HashSet<CategoryId>)> = state
            .tables
            .iter()
            .filter(|(number, _, _)| !taken.contains(number))
            .filter(|(_, _, supports)| supports.intersection(&wanted).count() as i64 == required)
            .collect();
        candidates.sort_by_key(|(_, priority, _)| *priority);

        let Some(&(table_number, _, _)) = candidates.first().copied() else {
            return Ok(Vec::new());
        };
        let assignment = TableAssignment {
            table_number,
            project_id: project,
        };
        state.assignments.push((hackathon.to_string(), assignment));
        Ok(vec![json!({ "table_number": table_number, "project_id": project })])
    }
}

// ============================================================================
// FAILING CACHE
// ============================================================================

/// Query cache that never hits and refuses every write.
#[derive(Debug, Default)]
pub struct FailingCache {
    attempts: Mutex<u64>,
}

impl FailingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rejected writes.
    pub fn write_attempts(&self) -> u64 {
        *self.attempts.lock()
    }
}

impl QueryCache for FailingCache {
    fn get(&self, _key: &str) -> Option<Vec<JsonValue>> {
        None
    }

    fn set(&self, _key: &str, _rows: Vec<JsonValue>) -> DataResult<()> {
        *self.attempts.lock() += 1;
        Err(DataError::unavailable("cache backend offline"))
    }

    fn set_global_flag(&self, _enabled: bool) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Unit of Work over `pool` with a fresh default LRU cache.
pub fn scripted_uow(pool: &ScriptedPool) -> SqlUow {
    SqlUow::new(Arc::new(pool.clone()), Arc::new(LruQueryCache::default()))
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating test data.

    use super::*;
    use proptest::prelude::*;

    /// A capability string such as `project:read`.
    pub fn arb_capability() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["project", "category", "event", "active-hackathon"]),
            prop::sample::select(vec!["create", "read", "readall", "update", "delete", "count"]),
        )
            .prop_map(|(entity, verb)| format!("{}:{}", entity, verb))
    }

    pub fn arb_capability_set() -> impl Strategy<Value = HashSet<String>> {
        prop::collection::hash_set(arb_capability(), 0..8)
    }

    pub fn arb_role_name() -> impl Strategy<Value = String> {
        prop::sample::select(AuthLevel::ALL.to_vec()).prop_map(|l| l.role_name().to_string())
    }

    pub fn arb_auth_level() -> impl Strategy<Value = AuthLevel> {
        prop::sample::select(AuthLevel::ALL.to_vec())
    }

    pub fn arb_category_ids() -> impl Strategy<Value = Vec<CategoryId>> {
        prop::collection::hash_set(1i32..20, 1..4).prop_map(|s| s.into_iter().collect())
    }

    pub fn arb_project() -> impl Strategy<Value = Project> {
        (
            "[A-Za-z][A-Za-z0-9 ]{0,30}",
            prop::collection::hash_set("[a-z0-9]{8}", 0..5),
            arb_category_ids(),
        )
            .prop_map(|(name, team, categories)| Project {
                uid: None,
                project_name: name,
                hackathon: None,
                team: team.into_iter().collect(),
                categories,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities for common scenarios.

    use super::*;

    pub const ACTIVE_HACKATHON: &str = "0f8fad5bd9cb469fa16570867728950e";

    pub fn active_hackathon() -> Hackathon {
        Hackathon {
            uid: ACTIVE_HACKATHON.to_string(),
            name: "Spring Hack".to_string(),
            start_time: 1_700_000_000_000,
            end_time: None,
            base_pin: Some(0),
            active: true,
        }
    }

    pub fn hackathon_row() -> JsonValue {
        json!({
            "uid": ACTIVE_HACKATHON,
            "name": "Spring Hack",
            "start_time": 1_700_000_000_000i64,
            "end_time": null,
            "base_pin": 0,
            "active": true,
        })
    }

    pub fn project(uid: ProjectId, categories: &[CategoryId]) -> Project {
        Project {
            uid: Some(uid),
            project_name: format!("Project {}", uid),
            hackathon: Some(ACTIVE_HACKATHON.to_string()),
            team: vec!["alice".to_string(), "bob".to_string()],
            categories: categories.to_vec(),
        }
    }

    pub fn project_row(uid: ProjectId) -> JsonValue {
        json!({
            "uid": uid,
            "project_name": format!("Project {}", uid),
            "hackathon": ACTIVE_HACKATHON,
            "team": ["alice", "bob"],
        })
    }

    pub fn category(name: &str) -> Category {
        Category {
            uid: None,
            category_name: name.to_string(),
            is_sponsor: false,
        }
    }

    pub fn live_update(title: &str) -> LiveUpdate {
        LiveUpdate {
            uid: None,
            update_title: title.to_string(),
            update_text: format!("{} in the atrium", title),
            update_image: None,
            update_time: 1_700_000_000_000,
            push_notification: false,
        }
    }

    pub fn duplicate_error() -> DataError {
        DataError::from_kind(ErrorKind::Duplicate)
            .with_detail("SQLSTATE 23505: duplicate key value violates unique constraint")
    }

    pub fn memory_tree_uow() -> TreeUow {
        TreeUow::new(Arc::new(InMemoryTreeStore::new()))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over data-layer results.

    use super::*;

    pub fn assert_kind<T: std::fmt::Debug>(result: &DataResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind, kind, "unexpected error: {:?}", e),
            Ok(v) => panic!("Expected {:?}, got Ok({:?})", kind, v),
        }
    }

    pub fn assert_not_found<T: std::fmt::Debug>(result: &DataResult<T>) {
        assert_kind(result, ErrorKind::NotFound);
    }

    pub fn assert_forbidden<T: std::fmt::Debug>(result: &DataResult<T>) {
        assert_kind(result, ErrorKind::Forbidden);
    }

    /// Every connection has gone back to the pool.
    pub fn assert_no_leak(pool: &ScriptedPool) {
        assert_eq!(
            pool.available(),
            pool.max_size(),
            "connections leaked: {:?}",
            pool.events()
        );
    }
}
