//! Connection lifecycle: pooling, release on completion, guards and leaks.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use fedtx_tests::prelude::*;
use pretty_assertions::assert_eq;

fn single_connection() -> PoolConfig {
    PoolConfig::default()
        .with_max_size(1)
        .with_min_idle(0)
        .with_connection_timeout(Duration::from_millis(50))
}

mod pooling {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_begin_times_out_when_pool_exhausted() {
        // GIVEN
        let harness = Harness::with_pool(VisibilityStrategy::Immediate, single_connection());
        let held = harness.coordinator.begin_or_join(ScopeToken::fresh()).unwrap();

        // WHEN
        let result = harness.coordinator.begin_or_join(ScopeToken::fresh());

        // THEN
        expect_error(&result, "timed out after").unwrap();
        assert!(matches!(result, Err(TransactionError::Pool(PoolError::Timeout { .. }))));
        harness.coordinator.commit(held).unwrap();
        harness.assert_quiescent();
    }

    #[test]
    fn test_completion_returns_connection_to_pool() {
        let harness = Harness::with_pool(VisibilityStrategy::Deferred, single_connection());

        for n in 0..20 {
            let unit = harness.coordinator.unit_of_work(ScopeToken::fresh()).unwrap();
            unit.issue(&Statement::insert(tasks(), row! { "NAME_" => format!("t{}", n) }))
                .unwrap();
            if n % 2 == 0 {
                unit.commit().unwrap();
            } else {
                unit.rollback().unwrap();
            }
        }

        let stats = harness.pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.acquisitions, 20);
        assert_eq!(stats.releases, 20);
        harness.check(tasks()).rows(10).verify().unwrap();
        harness.assert_quiescent();
    }

    #[test]
    fn test_waiting_begin_proceeds_after_release() {
        // GIVEN
        let harness = Harness::with_pool(
            VisibilityStrategy::Immediate,
            single_connection().with_connection_timeout(Duration::from_secs(5)),
        );
        let held = harness.coordinator.begin_or_join(ScopeToken::fresh()).unwrap();
        let (started, waiting) = mpsc::channel();

        // WHEN
        let coordinator = harness.coordinator.clone();
        let waiter = thread::spawn(move || {
            started.send(()).unwrap();
            let context = coordinator.begin_or_join(ScopeToken::fresh())?;
            coordinator.issue(&context, &Statement::insert(tasks(), row! { "NAME_" => "second" }))?;
            coordinator.commit(context)
        });
        waiting.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        harness.coordinator.commit(held).unwrap();

        // THEN
        waiter.join().unwrap().unwrap();
        harness.check(tasks()).rows(1).verify().unwrap();
        harness.assert_quiescent();
    }
}

mod guard {
    use super::*;

    #[test]
    fn test_early_return_rolls_back() {
        fn work(coordinator: &TransactionCoordinator) -> Result<(), TransactionError> {
            let unit = coordinator.unit_of_work(ScopeToken::fresh())?;
            unit.issue(&Statement::insert(tasks(), row! { "NAME_" => "doomed" }))?;
            unit.issue(&Statement::insert(counters(), row! { "VALUE" => 1i64 }))?;
            unit.commit()
        }

        for strategy in STRATEGIES {
            let harness = Harness::new(strategy);

            let result = work(&harness.coordinator);

            // the keyless counter insert fails under both strategies
            expect_error(&result, "Missing key column").unwrap();
            harness.check(tasks()).empty().verify().unwrap();
            harness.assert_quiescent();
        }
    }

    #[test]
    fn test_panicking_participant_rolls_back_owner() {
        // GIVEN
        let harness = Harness::new(VisibilityStrategy::Deferred);
        let scope = ScopeToken::fresh();
        let owner = harness.coordinator.unit_of_work(scope).unwrap();
        owner
            .issue(&Statement::insert(tasks(), row! { "NAME_" => "owner" }))
            .unwrap();

        // WHEN
        let coordinator = harness.coordinator.clone();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let joined = coordinator.unit_of_work(scope).unwrap();
            joined
                .issue(&Statement::insert(tasks(), row! { "NAME_" => "participant" }))
                .unwrap();
            panic!("delegate failed");
        }));

        // THEN
        assert!(panicked.is_err());
        assert!(owner.context().is_rollback_only());
        expect_error(&owner.commit(), "rollback-only").unwrap();
        harness.check(tasks()).empty().verify().unwrap();
        harness.assert_quiescent();
    }
}

mod leaks {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_open_transactions_are_reported() {
        // GIVEN
        let harness = Harness::new(VisibilityStrategy::Immediate);
        let scope = ScopeToken::fresh();
        let owner = harness.coordinator.begin_or_join(scope).unwrap();
        let joined = harness.coordinator.begin_or_join(scope).unwrap();
        thread::sleep(Duration::from_millis(2));

        // WHEN
        let leaks = harness.coordinator.report_leaks(Duration::ZERO);
        let young = harness.coordinator.report_leaks(Duration::from_secs(3600));

        // THEN
        assert_eq!(leaks.len(), 1);
        assert!(young.is_empty());
        match &leaks[0] {
            TransactionError::ParticipationLeak {
                txn_id,
                scope: leaked,
                participants,
                ..
            } => {
                assert_eq!(*txn_id, owner.id());
                assert_eq!(*leaked, scope);
                assert_eq!(*participants, 2);
            }
            other => panic!("unexpected error {}", other),
        }

        harness.coordinator.commit(joined).unwrap();
        harness.coordinator.commit(owner).unwrap();
        harness.assert_quiescent();
    }
}
