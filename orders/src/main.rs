//! FedTx Orders - runs one order through the fulfilment process.
//!
//! Usage: `fedtx-orders [CONFIG.toml] [--sku SKU] [--qty N] [--fail-business] [--fail-technical]`
//!
//! Without a config file the defaults apply, overridden by `FEDTX_*`
//! environment variables. Log output is controlled by `RUST_LOG`.

use std::env;
use std::error::Error;
use std::sync::Arc;

use fedtx_config::FederationConfig;
use fedtx_core::Value;
use fedtx_orders::{order_process, schema, ProcessEngine, ProcessInstance, Variables, ORDER_PROCESS};
use fedtx_pool::ConnectionPool;
use fedtx_transaction::TransactionCoordinator;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Options {
    config: Option<String>,
    variables: Variables,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        config: None,
        variables: Variables::new(),
    };
    options.variables.insert("customer".to_string(), Value::Int(1));
    options.variables.insert("sku".to_string(), Value::from("SKU-001"));
    options.variables.insert("qty".to_string(), Value::Int(1));
    options.variables.insert("unitPrice".to_string(), Value::Int(1_999));

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--sku" => {
                let sku = iter.next().ok_or("--sku needs a value")?;
                options.variables.insert("sku".to_string(), Value::from(sku.as_str()));
            }
            "--qty" => {
                let qty: i64 = iter
                    .next()
                    .ok_or("--qty needs a value")?
                    .parse()
                    .map_err(|_| "--qty expects an integer")?;
                options.variables.insert("qty".to_string(), Value::Int(qty));
            }
            "--fail-business" => {
                options.variables.insert("mustFailBusiness".to_string(), Value::Bool(true));
            }
            "--fail-technical" => {
                options.variables.insert("mustFailTechnically".to_string(), Value::Bool(true));
            }
            other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
            path => options.config = Some(path.to_string()),
        }
    }
    Ok(options)
}

fn run(options: Options) -> Result<ProcessInstance, Box<dyn Error>> {
    let config = match &options.config {
        Some(path) => FederationConfig::load(path)?,
        None => FederationConfig::from_env()?,
    };
    info!(url = %config.endpoint.url(), strategy = %config.strategy, "starting");

    let federation = schema::build_federation(config.endpoint.url(), config.endpoint.credentials())?;
    schema::seed_inventory(&federation)?;
    let pool = ConnectionPool::new(Arc::new(federation), config.endpoint.credentials(), config.pool.clone())?;
    let coordinator = Arc::new(TransactionCoordinator::new(Arc::new(pool), config.strategy));

    let mut engine = ProcessEngine::new(coordinator);
    engine.deploy(order_process());
    Ok(engine.start_process(ORDER_PROCESS, options.variables)?)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match run(options) {
        Ok(instance) => {
            println!("process instance {} ended: {:?}", instance.id, instance.outcome);
            if let Some(order) = instance.variables.get("orderId") {
                println!("order id: {}", order);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
