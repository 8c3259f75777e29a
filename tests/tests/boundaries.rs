//! Transaction boundaries: begin-or-join, owner-only completion, rollback-only.

use std::sync::{Arc, Barrier};
use std::thread;

use fedtx_tests::prelude::*;
use pretty_assertions::assert_eq;

fn insert_task(name: &str) -> Statement {
    Statement::insert(tasks(), row! { "NAME_" => name })
}

mod single_owner {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concurrent_begin_yields_one_owner() {
        for strategy in STRATEGIES {
            // GIVEN
            init_logging();
            let harness = Harness::new(strategy);
            let scope = ScopeToken::fresh();
            let workers = 8;
            let begun = Arc::new(Barrier::new(workers));
            let joined_done = Arc::new(Barrier::new(workers));

            // WHEN
            let owners: Vec<bool> = (0..workers)
                .map(|n| {
                    let coordinator = harness.coordinator.clone();
                    let begun = begun.clone();
                    let joined_done = joined_done.clone();
                    thread::spawn(move || {
                        let context = coordinator.begin_or_join(scope).unwrap();
                        begun.wait();
                        coordinator
                            .issue(&context, &insert_task(&format!("task-{}", n)))
                            .unwrap();
                        let is_owner = context.is_owner();
                        if is_owner {
                            joined_done.wait();
                            coordinator.commit(context).unwrap();
                        } else {
                            coordinator.commit(context).unwrap();
                            joined_done.wait();
                        }
                        is_owner
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect();

            // THEN
            assert_eq!(owners.iter().filter(|owner| **owner).count(), 1, "{}", strategy);
            let stats = harness.federation.stats();
            assert_eq!(stats.begins, 1);
            assert_eq!(stats.commits, 1);
            harness.check(tasks()).rows(workers).verify().unwrap();
            harness.assert_quiescent();
        }
    }

    #[test]
    fn test_distinct_scopes_get_distinct_transactions() {
        let harness = Harness::new(VisibilityStrategy::Immediate);

        let first = harness.coordinator.begin_or_join(ScopeToken::fresh()).unwrap();
        let second = harness.coordinator.begin_or_join(ScopeToken::fresh()).unwrap();

        assert!(first.is_owner() && second.is_owner());
        assert_ne!(first.id(), second.id());
        assert_ne!(first.connection_id(), second.connection_id());
        harness.coordinator.commit(first).unwrap();
        harness.coordinator.commit(second).unwrap();
        harness.assert_quiescent();
    }
}

mod join_transparency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_joined_commit_is_not_physical() {
        for strategy in STRATEGIES {
            // GIVEN
            let harness = Harness::new(strategy);
            let scope = ScopeToken::fresh();
            let owner = harness.coordinator.begin_or_join(scope).unwrap();
            let joined = harness.coordinator.begin_or_join(scope).unwrap();
            assert!(!joined.is_owner());
            assert_eq!(joined.id(), owner.id());
            assert_eq!(joined.connection_id(), owner.connection_id());

            // WHEN
            harness.coordinator.issue(&joined, &insert_task("review")).unwrap();
            harness.coordinator.commit(joined).unwrap();

            // THEN
            assert_eq!(harness.federation.stats().commits, 0, "{}", strategy);
            harness.check(tasks()).empty().verify().unwrap();

            harness.coordinator.commit(owner).unwrap();
            assert_eq!(harness.federation.stats().commits, 1);
            let stats = harness.pool.stats();
            assert_eq!((stats.acquisitions, stats.releases), (1, 1), "{}", strategy);
            harness
                .check(tasks())
                .rows(1)
                .contains(row! { "NAME_" => "review" })
                .verify()
                .unwrap();
        }
    }

    #[test]
    fn test_participant_sees_owner_writes() {
        for strategy in STRATEGIES {
            let harness = Harness::new(strategy);
            let scope = ScopeToken::fresh();
            let owner = harness.coordinator.begin_or_join(scope).unwrap();
            let key = harness
                .coordinator
                .issue(&owner, &insert_task("draft"))
                .unwrap()
                .inserted_key()
                .cloned()
                .unwrap();

            let joined = harness.coordinator.begin_or_join(scope).unwrap();
            let rows = harness
                .coordinator
                .issue(&joined, &Statement::select(tasks(), Filter::Key(key)))
                .unwrap()
                .into_rows();

            assert_eq!(rows.len(), 1, "{}", strategy);
            assert_eq!(rows[0].get("NAME_"), Some(&Value::from("draft")));
            harness.coordinator.commit(joined).unwrap();
            harness.coordinator.commit(owner).unwrap();
            harness.assert_quiescent();
        }
    }

    #[test]
    fn test_nested_run_in_transaction_commits_once() {
        let harness = Harness::new(VisibilityStrategy::Deferred);
        let coordinator = harness.coordinator.clone();
        let scope = ScopeToken::fresh();

        let result: Result<(), TransactionError> = coordinator.run_in_transaction(scope, |outer| {
            coordinator.issue(outer, &insert_task("outer"))?;
            coordinator.run_in_transaction(scope, |inner| {
                assert!(!inner.is_owner());
                coordinator.issue(inner, &insert_task("inner"))?;
                Ok::<_, TransactionError>(())
            })?;
            assert_eq!(outer.pending_operations(), 2);
            Ok(())
        });

        result.unwrap();
        assert_eq!(harness.federation.stats().commits, 1);
        harness.check(tasks()).rows(2).verify().unwrap();
        harness.assert_quiescent();
    }
}

mod rollback {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_participant_rollback_marks_rollback_only() {
        for strategy in STRATEGIES {
            // GIVEN
            let harness = Harness::new(strategy);
            let scope = ScopeToken::fresh();
            let owner = harness.coordinator.begin_or_join(scope).unwrap();
            harness.coordinator.issue(&owner, &insert_task("kept?")).unwrap();
            let joined = harness.coordinator.begin_or_join(scope).unwrap();

            // WHEN
            harness.coordinator.rollback(joined).unwrap();
            assert!(owner.is_rollback_only());
            let result = harness.coordinator.commit(owner);

            // THEN
            expect_error(&result, "rollback-only").unwrap();
            assert!(result.unwrap_err().rolled_back());
            assert_eq!(harness.federation.stats().commits, 0, "{}", strategy);
            harness.check(tasks()).empty().verify().unwrap();
            harness.assert_quiescent();
        }
    }

    #[test]
    fn test_owner_rollback_discards_everything() {
        for strategy in STRATEGIES {
            let harness = Harness::new(strategy);
            let scope = ScopeToken::fresh();
            let owner = harness.coordinator.begin_or_join(scope).unwrap();
            harness.coordinator.issue(&owner, &insert_task("a")).unwrap();
            harness
                .coordinator
                .issue(&owner, &Statement::insert(audit(), row! { "ACTION_" => "created" }))
                .unwrap();

            harness.coordinator.rollback(owner).unwrap();

            harness.check(tasks()).empty().verify().unwrap();
            harness.check(audit()).empty().verify().unwrap();
            harness.assert_quiescent();
        }
    }
}

mod completion_errors {
    use super::*;

    #[test]
    fn test_completing_after_owner_finished() {
        // GIVEN
        let harness = Harness::new(VisibilityStrategy::Immediate);
        let scope = ScopeToken::fresh();
        let owner = harness.coordinator.begin_or_join(scope).unwrap();
        let joined = harness.coordinator.begin_or_join(scope).unwrap();
        harness.coordinator.commit(owner).unwrap();

        // WHEN
        let issued = harness.coordinator.issue(&joined, &insert_task("late"));
        let completed = harness.coordinator.commit(joined);

        // THEN
        expect_error(&issued, "stale context").unwrap();
        expect_error(&completed, "no active transaction").unwrap();
        harness.check(tasks()).empty().verify().unwrap();
        harness.assert_quiescent();
    }

    #[test]
    fn test_scope_reusable_after_completion() {
        let harness = Harness::new(VisibilityStrategy::Deferred);
        let scope = ScopeToken::fresh();

        let first = harness.coordinator.begin_or_join(scope).unwrap();
        let first_id = first.id();
        harness.coordinator.commit(first).unwrap();
        let second = harness.coordinator.begin_or_join(scope).unwrap();

        assert!(second.is_owner());
        assert_ne!(second.id(), first_id);
        harness.coordinator.rollback(second).unwrap();
        harness.assert_quiescent();
    }
}
