//! Order fulfilment end to end, under both visibility strategies.

use std::thread;

use fedtx_orders::{schema, Order, OrdersError, ProcessOutcome, Variables, ORDER_PROCESS};
use fedtx_tests::prelude::*;
use pretty_assertions::assert_eq;

fn order(sku: &str, qty: i64) -> Variables {
    let mut variables = Variables::new();
    variables.insert("customer".to_string(), Value::Int(7));
    variables.insert("sku".to_string(), Value::from(sku));
    variables.insert("qty".to_string(), Value::Int(qty));
    variables.insert("unitPrice".to_string(), Value::Int(400));
    variables.insert("currency".to_string(), Value::from("CHF"));
    variables
}

#[test]
fn test_happy_path() {
    for strategy in STRATEGIES {
        // GIVEN
        init_logging();
        let harness = Harness::orders(strategy);
        let engine = harness.engine();

        // WHEN
        let instance = engine.start_process(ORDER_PROCESS, order("SKU-001", 5)).unwrap();

        // THEN
        assert_eq!(instance.outcome, ProcessOutcome::Completed, "{}", strategy);
        let order_id = instance.variables.get("orderId").and_then(Value::as_int).unwrap();
        harness
            .check(schema::orders())
            .rows(1)
            .value(order_id, "STATUS", "PROCESSED")
            .value(order_id, "TOTAL_AMOUNT", 2_000i64)
            .value(order_id, "CURRENCY", "CHF")
            .verify()
            .unwrap();
        harness
            .check(schema::order_items())
            .rows(1)
            .contains(row! { "ORDER_ID" => order_id, "SKU" => "SKU-001", "QUANTITY" => 5i64 })
            .verify()
            .unwrap();
        harness
            .check(schema::inventory())
            .value("SKU-001", "QUANTITY", 95i64)
            .value("SKU-001", "RESERVED", 0i64)
            .verify()
            .unwrap();
        harness
            .check(schema::payments())
            .value(order_id, "status", "PENDING")
            .value(order_id, "amount", 2_000i64)
            .value(order_id, "currency", "CHF")
            .verify()
            .unwrap();
        harness.check(schema::order_issues()).empty().verify().unwrap();
        harness.check(schema::execution()).empty().verify().unwrap();
        harness
            .check(schema::process_instance_history())
            .value(instance.id, "STATE_", "COMPLETED")
            .verify()
            .unwrap();
        assert_eq!(harness.federation.stats().commits, 1);
        harness.assert_quiescent();
    }
}

#[test]
fn test_technical_failure_rolls_back_every_backend() {
    for strategy in STRATEGIES {
        // GIVEN
        let harness = Harness::orders(strategy);
        let engine = harness.engine();
        let mut variables = order("SKU-002", 1);
        variables.insert("mustFailTechnically".to_string(), Value::Bool(true));

        // WHEN
        let result = engine.start_process(ORDER_PROCESS, variables);

        // THEN
        expect_error(&result, "send-continuation-message").unwrap();
        assert!(matches!(result, Err(OrdersError::Activity { .. })));
        for relation in harness.federation.relations() {
            if relation == schema::inventory() {
                continue;
            }
            harness.check(relation).empty().verify().unwrap();
        }
        harness
            .check(schema::inventory())
            .value("SKU-002", "QUANTITY", 100i64)
            .value("SKU-002", "RESERVED", 0i64)
            .verify()
            .unwrap();
        assert_eq!(harness.federation.stats().commits, 0, "{}", strategy);
        harness.assert_quiescent();
    }
}

#[test]
fn test_business_failure_commits_with_issue() {
    for strategy in STRATEGIES {
        // GIVEN
        let harness = Harness::orders(strategy);
        let engine = harness.engine();
        let mut variables = order("SKU-003", 4);
        variables.insert("mustFailBusiness".to_string(), Value::Bool(true));

        // WHEN
        let instance = engine.start_process(ORDER_PROCESS, variables).unwrap();

        // THEN
        assert!(matches!(instance.outcome, ProcessOutcome::BusinessFailure { ref code, .. } if code == "MUST_FAIL"));
        let order_id = instance.variables.get("orderId").and_then(Value::as_int).unwrap();
        harness.check(schema::orders()).value(order_id, "STATUS", "CREATED").verify().unwrap();
        harness.check(schema::payments()).rows(1).verify().unwrap();
        harness
            .check(schema::inventory())
            .value("SKU-003", "RESERVED", 4i64)
            .value("SKU-003", "QUANTITY", 100i64)
            .verify()
            .unwrap();
        harness
            .check(schema::order_issues())
            .rows(1)
            .contains(row! { "orderId" => order_id, "errorCode" => "MUST_FAIL", "severity" => "HIGH" })
            .verify()
            .unwrap();
        assert_eq!(harness.federation.stats().commits, 1, "{}", strategy);
        harness.assert_quiescent();
    }
}

#[test]
fn test_concurrent_orders_are_independent() {
    for strategy in STRATEGIES {
        // GIVEN
        let harness = Harness::orders(strategy);
        let engine = std::sync::Arc::new(harness.engine());

        // WHEN
        let outcomes: Vec<_> = (1..=9)
            .map(|n| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let mut variables = order(&format!("SKU-{:03}", n), n);
                    if n % 3 == 0 {
                        variables.insert("mustFailTechnically".to_string(), Value::Bool(true));
                    }
                    engine.start_process(ORDER_PROCESS, variables)
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect();

        // THEN
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 6, "{}", strategy);
        let orders = harness.committed(&schema::orders());
        assert_eq!(orders.len(), 6);
        assert!(orders
            .iter()
            .filter_map(Order::from_row)
            .all(|order| order.status == "PROCESSED"));
        for n in 1..=9i64 {
            let expected = if n % 3 == 0 { 100 } else { 100 - n };
            harness
                .check(schema::inventory())
                .value(format!("SKU-{:03}", n), "QUANTITY", expected)
                .verify()
                .unwrap();
        }
        harness.assert_quiescent();
    }
}

#[test]
fn test_concurrent_orders_share_stock() {
    for strategy in STRATEGIES {
        // GIVEN
        let harness = Harness::orders(strategy);
        let engine = std::sync::Arc::new(harness.engine());

        // WHEN - every order draws on the same SKU while the others are open
        let outcomes: Vec<_> = (1..=8)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || engine.start_process(ORDER_PROCESS, order("SKU-001", 3)))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect();

        // THEN
        assert!(outcomes.iter().all(Result::is_ok), "{}", strategy);
        harness.check(schema::orders()).rows(8).verify().unwrap();
        harness
            .check(schema::inventory())
            .value("SKU-001", "QUANTITY", 76i64)
            .value("SKU-001", "RESERVED", 0i64)
            .verify()
            .unwrap();
        harness.assert_quiescent();
    }
}
