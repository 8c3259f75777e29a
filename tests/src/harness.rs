//! Wiring of a federation, a pool and a coordinator for one test.

use std::sync::Arc;
use std::time::Duration;

use fedtx_core::{row, Credentials, Relation, Row, StoreResult, TableDescriptor, VisibilityStrategy};
use fedtx_federation::Federation;
use fedtx_orders::{order_process, schema, ProcessEngine};
use fedtx_pool::{ConnectionPool, PoolConfig};
use fedtx_transaction::TransactionCoordinator;

use crate::assertion::TableCheck;

/// Runtime tasks, keyed by a generated `ID_`.
pub fn tasks() -> Relation {
    Relation::new("runtime", "ACT_RU_TASK")
}

/// Audit trail on the history backend, keyed by a generated `ID_`.
pub fn audit() -> Relation {
    Relation::new("history", "AUDIT_LOG")
}

/// Counters on the business backend, keyed by `NAME`.
pub fn counters() -> Relation {
    Relation::new("business", "COUNTERS")
}

pub fn credentials() -> Credentials {
    Credentials::new("sa", "sa")
}

/// One federation, pool and coordinator.
pub struct Harness {
    pub federation: Federation,
    pub pool: Arc<ConnectionPool>,
    pub coordinator: Arc<TransactionCoordinator>,
}

impl Harness {
    /// The task/audit/counter schema with a default pool.
    pub fn new(strategy: VisibilityStrategy) -> Self {
        Self::with_pool(strategy, PoolConfig::default().with_min_idle(0))
    }

    pub fn with_pool(strategy: VisibilityStrategy, pool: PoolConfig) -> Self {
        let federation = Federation::builder()
            .address("memory://harness")
            .credentials(credentials())
            .table(
                "runtime",
                TableDescriptor::new(tasks(), "ID_")
                    .columns(["NAME_", "ASSIGNEE_", "PRIORITY_"])
                    .generated(),
            )
            .table(
                "history",
                TableDescriptor::new(audit(), "ID_")
                    .columns(["TASK_ID_", "ACTION_"])
                    .generated(),
            )
            .table("business", TableDescriptor::new(counters(), "NAME").column("VALUE"))
            .build()
            .unwrap_or_else(|e| panic!("invalid harness schema: {}", e));
        Self::assemble(federation, strategy, pool)
    }

    /// The order sample schema with seeded inventory.
    pub fn orders(strategy: VisibilityStrategy) -> Self {
        let federation = schema::build_federation("memory://orders", credentials())
            .and_then(|federation| schema::seed_inventory(&federation).map(|()| federation))
            .unwrap_or_else(|e| panic!("invalid order schema: {}", e));
        Self::assemble(federation, strategy, PoolConfig::default().with_min_idle(0))
    }

    fn assemble(federation: Federation, strategy: VisibilityStrategy, pool: PoolConfig) -> Self {
        let pool = Arc::new(
            ConnectionPool::new(Arc::new(federation.clone()), credentials(), pool)
                .unwrap_or_else(|e| panic!("pool setup failed: {}", e)),
        );
        let coordinator = Arc::new(TransactionCoordinator::new(pool.clone(), strategy));
        Self {
            federation,
            pool,
            coordinator,
        }
    }

    /// A process engine with the order process deployed.
    pub fn engine(&self) -> ProcessEngine {
        let mut engine = ProcessEngine::new(self.coordinator.clone());
        engine.deploy(order_process());
        engine
    }

    pub fn seed_counter(&self, name: &str, value: i64) -> StoreResult<()> {
        self.federation
            .seed(&counters(), vec![row! { "NAME" => name, "VALUE" => value }])
    }

    pub fn committed(&self, relation: &Relation) -> Vec<Row> {
        self.federation
            .committed_rows(relation)
            .unwrap_or_else(|e| panic!("cannot read {}: {}", relation, e))
    }

    pub fn check(&self, relation: Relation) -> TableCheck<'_> {
        TableCheck::new(&self.federation, relation)
    }

    /// Nothing registered and every connection back in the pool.
    pub fn assert_quiescent(&self) {
        assert!(
            self.coordinator.registry().is_empty(),
            "transactions still registered: {:?}",
            self.coordinator.registry().entries()
        );
        let stats = fedtx_pool::ConnectionProvider::stats(self.pool.as_ref());
        assert_eq!(stats.in_use, 0, "connections still in use: {:?}", stats);
        assert!(self.coordinator.report_leaks(Duration::ZERO).is_empty());
    }
}

/// Install a test log subscriber once. Honors `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
