//! Random interleavings of begin/join, writes and completion on several
//! scopes, checked against a simple model of the expected counters.

use std::collections::HashMap;

use fedtx_tests::prelude::*;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SCOPES: usize = 3;
const STEPS: usize = 300;

/// Expected state of one scope's open transaction.
#[derive(Default)]
struct OpenTransaction {
    /// Owner first, then joined participants in join order.
    contexts: Vec<TransactionContext>,
    pending: i64,
    rollback_only: bool,
}

struct Model<'h> {
    harness: &'h Harness,
    scopes: Vec<ScopeToken>,
    open: HashMap<usize, OpenTransaction>,
    committed: Vec<i64>,
}

impl<'h> Model<'h> {
    fn new(harness: &'h Harness) -> Self {
        for n in 0..SCOPES {
            harness.seed_counter(&counter(n), 0).unwrap();
        }
        Self {
            harness,
            scopes: (0..SCOPES).map(|_| ScopeToken::fresh()).collect(),
            open: HashMap::new(),
            committed: vec![0; SCOPES],
        }
    }

    fn begin_or_join(&mut self, n: usize) {
        let context = self.harness.coordinator.begin_or_join(self.scopes[n]).unwrap();
        let txn = self.open.entry(n).or_default();
        assert_eq!(context.is_owner(), txn.contexts.is_empty());
        if let Some(owner) = txn.contexts.first() {
            assert_eq!(context.id(), owner.id());
        }
        txn.contexts.push(context);
    }

    fn add(&mut self, n: usize, amount: i64) {
        let Some(txn) = self.open.get_mut(&n) else {
            return;
        };
        let Some(context) = txn.contexts.last() else {
            return;
        };
        let update = Statement::update(counters(), counter(n), vec![("VALUE".to_string(), Assignment::Add(amount))]);
        self.harness.coordinator.issue(context, &update).unwrap();
        txn.pending += amount;

        // own writes are visible inside the transaction
        let rows = self
            .harness
            .coordinator
            .issue(context, &Statement::select(counters(), Filter::Key(Key::from(counter(n)))))
            .unwrap()
            .into_rows();
        assert_eq!(
            rows[0].get("VALUE").and_then(Value::as_int),
            Some(self.committed[n] + txn.pending)
        );
    }

    /// Complete the most recent participant of scope `n`.
    fn complete(&mut self, n: usize, outcome: Outcome) {
        let Some(txn) = self.open.get_mut(&n) else {
            return;
        };
        let Some(context) = txn.contexts.pop() else {
            return;
        };
        let is_owner = context.is_owner();
        let result = self.harness.coordinator.complete(context, outcome);

        if !is_owner {
            result.unwrap();
            if outcome == Outcome::Rollback {
                txn.rollback_only = true;
            }
            return;
        }

        match (outcome, txn.rollback_only) {
            (Outcome::Commit, false) => {
                result.unwrap();
                self.committed[n] += txn.pending;
            }
            (Outcome::Commit, true) => {
                assert!(matches!(result, Err(TransactionError::RollbackOnly { .. })));
            }
            (Outcome::Rollback, _) => result.unwrap(),
        }
        self.open.remove(&n);
    }

    fn finish(&mut self) {
        for n in 0..SCOPES {
            while self.open.contains_key(&n) {
                self.complete(n, Outcome::Commit);
            }
        }
    }

    fn verify(&self) {
        for n in 0..SCOPES {
            self.harness
                .check(counters())
                .value(counter(n), "VALUE", self.committed[n])
                .verify()
                .unwrap();
        }
    }
}

fn counter(n: usize) -> String {
    format!("counter-{}", n)
}

fn run(strategy: VisibilityStrategy, seed: u64) {
    let harness = Harness::new(strategy);
    let mut model = Model::new(&harness);
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..STEPS {
        let n = rng.gen_range(0..SCOPES);
        match rng.gen_range(0..10) {
            0..=2 => model.begin_or_join(n),
            3..=6 => model.add(n, rng.gen_range(-5..=20)),
            7 | 8 => model.complete(n, Outcome::Commit),
            _ => model.complete(n, Outcome::Rollback),
        }
    }
    model.finish();

    model.verify();
    harness.assert_quiescent();
}

#[test]
fn test_random_schedules_immediate() {
    for seed in 1..=5 {
        run(VisibilityStrategy::Immediate, seed);
    }
}

#[test]
fn test_random_schedules_deferred() {
    for seed in 1..=5 {
        run(VisibilityStrategy::Deferred, seed);
    }
}
