//! Minimal process engine.
//!
//! A process instance runs its activities in order inside one unit of work.
//! Engine bookkeeping (runtime execution, history) and delegate writes share
//! that transaction: delegates join it, only the engine commits it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use fedtx_core::{row, Assignment, Key, ScopeToken, Statement, StatementResult, StoreError, TxnId, Value};
use fedtx_transaction::{
    TransactionContext, TransactionCoordinator, TransactionError, UnitOfWork,
};
use tracing::{debug, error, info, warn};

use crate::error::{DelegateError, DelegateResult, OrdersError, OrdersResult};
use crate::schema;

/// Process variables by name.
pub type Variables = BTreeMap<String, Value>;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Statements issued by a delegate within the joined transaction.
pub struct Tx<'a> {
    coordinator: &'a TransactionCoordinator,
    context: &'a TransactionContext,
}

impl Tx<'_> {
    pub fn issue(&self, statement: &Statement) -> Result<StatementResult, TransactionError> {
        self.coordinator.issue(self.context, statement)
    }

    pub fn context(&self) -> &TransactionContext {
        self.context
    }
}

/// State of a running process instance as seen by a delegate.
pub struct Execution<'e> {
    coordinator: &'e TransactionCoordinator,
    scope: ScopeToken,
    process_instance_id: i64,
    activity: String,
    variables: Variables,
}

impl<'e> Execution<'e> {
    pub fn process_instance_id(&self) -> i64 {
        self.process_instance_id
    }

    /// Name of the activity being executed.
    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).filter(|v| !v.is_null())
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.variable(name).and_then(Value::as_int)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.variable(name).and_then(Value::as_str)
    }

    /// A boolean variable; absent means false.
    pub fn flag(&self, name: &str) -> bool {
        self.variable(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Run `f` in the process instance's transaction, joining it.
    ///
    /// An error from `f` marks the transaction rollback-only.
    pub fn transaction<T, F>(&self, f: F) -> DelegateResult<T>
    where
        F: FnOnce(&Tx<'_>) -> DelegateResult<T>,
    {
        let coordinator = self.coordinator;
        coordinator.run_in_transaction(self.scope, |context| {
            f(&Tx {
                coordinator,
                context,
            })
        })
    }
}

/// One activity of a process definition.
pub trait Delegate: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, execution: &mut Execution<'_>) -> DelegateResult<()>;
}

/// Ordered activities plus an optional handler for business errors.
#[derive(Clone)]
pub struct ProcessDefinition {
    key: String,
    activities: Vec<Arc<dyn Delegate>>,
    on_business_error: Option<Arc<dyn Delegate>>,
}

impl ProcessDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            activities: Vec::new(),
            on_business_error: None,
        }
    }

    pub fn activity(mut self, delegate: impl Delegate + 'static) -> Self {
        self.activities.push(Arc::new(delegate));
        self
    }

    /// Activity run when another activity raises a business error.
    pub fn on_business_error(mut self, delegate: impl Delegate + 'static) -> Self {
        self.on_business_error = Some(Arc::new(delegate));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn activity_names(&self) -> Vec<&str> {
        self.activities.iter().map(|a| a.name()).collect()
    }
}

impl fmt::Debug for ProcessDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDefinition")
            .field("key", &self.key)
            .field("activities", &self.activity_names())
            .finish()
    }
}

/// How a process instance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    /// A business error was handled; the instance still ended normally.
    BusinessFailure { code: String, message: String },
}

/// An ended process instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInstance {
    pub id: i64,
    pub definition_key: String,
    pub txn_id: TxnId,
    pub outcome: ProcessOutcome,
    pub variables: Variables,
}

/// Runs deployed process definitions.
pub struct ProcessEngine {
    coordinator: Arc<TransactionCoordinator>,
    definitions: HashMap<String, ProcessDefinition>,
}

impl ProcessEngine {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self {
            coordinator,
            definitions: HashMap::new(),
        }
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// Deploy a definition, replacing any with the same key.
    pub fn deploy(&mut self, definition: ProcessDefinition) {
        debug!(process = %definition.key, activities = definition.activities.len(), "deployed process definition");
        self.definitions.insert(definition.key.clone(), definition);
    }

    /// Start an instance and run it to its end within one transaction.
    ///
    /// Technical errors roll back every write of the instance and are
    /// returned. Business errors are handed to the definition's handler and
    /// the instance commits.
    pub fn start_process(&self, key: &str, variables: Variables) -> OrdersResult<ProcessInstance> {
        let definition = self
            .definitions
            .get(key)
            .ok_or_else(|| OrdersError::UnknownProcess(key.to_string()))?;

        let unit = self.coordinator.unit_of_work(ScopeToken::fresh())?;
        match self.run(&unit, definition, variables) {
            Ok(instance) => {
                unit.commit()?;
                info!(process = key, instance = instance.id, outcome = ?instance.outcome, "process instance ended");
                Ok(instance)
            }
            Err(e) => {
                warn!(process = key, error = %e, "process instance failed, rolling back");
                if let Err(rollback_error) = unit.rollback() {
                    error!(process = key, error = %rollback_error, "rollback of failed process instance failed");
                }
                Err(e)
            }
        }
    }

    fn run(
        &self,
        unit: &UnitOfWork<'_>,
        definition: &ProcessDefinition,
        variables: Variables,
    ) -> OrdersResult<ProcessInstance> {
        let key = definition.key.as_str();
        let started = now_millis();
        let id = unit
            .issue(&Statement::insert(
                schema::execution(),
                row! {
                    "PROC_DEF_KEY_" => key,
                    "ACT_ID_" => "start",
                    "START_TIME_" => Value::Timestamp(started),
                },
            ))?
            .inserted_key()
            .and_then(Key::as_int)
            .ok_or_else(|| StoreError::MissingKey(schema::execution()))?;
        unit.issue(&Statement::insert(
            schema::process_instance_history(),
            row! {
                "ID_" => id,
                "PROC_DEF_KEY_" => key,
                "START_TIME_" => Value::Timestamp(started),
                "STATE_" => "ACTIVE",
            },
        ))?;

        let mut execution = Execution {
            coordinator: &self.coordinator,
            scope: unit.context().scope(),
            process_instance_id: id,
            activity: String::new(),
            variables,
        };
        let mut outcome = ProcessOutcome::Completed;

        for activity in &definition.activities {
            match self.execute(unit, &mut execution, activity.as_ref()) {
                Ok(()) => {}
                Err(DelegateError::Business { code, message }) => {
                    info!(process = key, instance = id, activity = activity.name(), code = %code, "business error, running failure handler");
                    if execution.variable("errorCode").is_none() {
                        execution.set_variable("errorCode", code.as_str());
                    }
                    if execution.variable("errorMessage").is_none() {
                        execution.set_variable("errorMessage", message.as_str());
                    }
                    if let Some(handler) = &definition.on_business_error {
                        self.execute(unit, &mut execution, handler.as_ref())
                            .map_err(|e| OrdersError::activity(handler.name(), e))?;
                    }
                    outcome = ProcessOutcome::BusinessFailure { code, message };
                    break;
                }
                Err(e) => return Err(OrdersError::activity(activity.name(), e)),
            }
        }

        for (name, value) in execution.variables() {
            unit.issue(&Statement::insert(
                schema::variable_history(),
                row! {
                    "PROC_INST_ID_" => id,
                    "NAME_" => name.as_str(),
                    "VALUE_" => value.clone(),
                },
            ))?;
        }
        unit.issue(&Statement::delete(schema::execution(), id))?;
        unit.issue(&Statement::update(
            schema::process_instance_history(),
            id,
            vec![
                ("END_TIME_".to_string(), Assignment::Set(Value::Timestamp(now_millis()))),
                ("STATE_".to_string(), Assignment::Set("COMPLETED".into())),
            ],
        ))?;

        Ok(ProcessInstance {
            id,
            definition_key: key.to_string(),
            txn_id: unit.context().id(),
            outcome,
            variables: execution.variables,
        })
    }

    fn execute(
        &self,
        unit: &UnitOfWork<'_>,
        execution: &mut Execution<'_>,
        activity: &dyn Delegate,
    ) -> DelegateResult<()> {
        execution.activity = activity.name().to_string();
        unit.issue(&Statement::insert(
            schema::activity_history(),
            row! {
                "PROC_INST_ID_" => execution.process_instance_id,
                "ACT_ID_" => activity.name(),
                "START_TIME_" => Value::Timestamp(now_millis()),
            },
        ))?;
        debug!(instance = execution.process_instance_id, activity = activity.name(), "executing activity");
        activity.execute(execution)
    }
}
