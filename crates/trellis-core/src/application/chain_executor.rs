use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, info_span};

use crate::operation::handler::Handler;
use crate::operation::{Data, Operation, OperationChain, ReleaseHandle};
use crate::store::Store;
use crate::{Context, CoreError};

/// Status of one chain execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// Received, not yet checked
    Created,
    /// Types, handlers and schema checks passed
    Validated,
    /// Running the operation at this index
    Running(usize),
    /// Every operation succeeded
    Completed,
    /// An operation failed, or the chain was rejected
    Failed,
}

impl ChainStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ChainStatus::Completed | ChainStatus::Failed)
    }
}

/// Record of one chain execution and its status history
#[derive(Debug, Clone)]
pub struct ChainExecution {
    /// Job id of the owning context
    pub job_id: String,

    /// Current status
    pub status: ChainStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,

    /// Every status entered, with its time
    pub transitions: Vec<(ChainStatus, DateTime<Utc>)>,

    /// Error that failed the chain
    pub error: Option<CoreError>,
}

impl ChainExecution {
    /// A new execution record in `Created`
    pub fn new(job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: ChainStatus::Created,
            created_at: now,
            updated_at: now,
            transitions: vec![(ChainStatus::Created, now)],
            error: None,
        }
    }

    fn enter(&mut self, status: ChainStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        self.transitions.push((status, now));
    }

    /// Mark the chain as checked
    pub fn validated(&mut self) -> Result<(), CoreError> {
        if self.status != ChainStatus::Created {
            return Err(CoreError::Execution(format!(
                "Cannot validate chain in state: {:?}",
                self.status
            )));
        }
        self.enter(ChainStatus::Validated);
        Ok(())
    }

    /// Move to the operation at `index`
    pub fn start_operation(&mut self, index: usize) -> Result<(), CoreError> {
        let expected = match self.status {
            ChainStatus::Validated => 0,
            ChainStatus::Running(current) => current + 1,
            _ => {
                return Err(CoreError::Execution(format!(
                    "Cannot start operation {} in state: {:?}",
                    index, self.status
                )))
            }
        };
        if index != expected {
            return Err(CoreError::Execution(format!(
                "Cannot start operation {} in state: {:?}",
                index, self.status
            )));
        }
        self.enter(ChainStatus::Running(index));
        Ok(())
    }

    /// Mark the chain as completed
    pub fn complete(&mut self) -> Result<(), CoreError> {
        match self.status {
            ChainStatus::Running(_) => {
                self.enter(ChainStatus::Completed);
                Ok(())
            }
            _ => Err(CoreError::Execution(format!(
                "Cannot complete chain in state: {:?}",
                self.status
            ))),
        }
    }

    /// Mark the chain as failed
    pub fn fail(&mut self, error: CoreError) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Execution(format!(
                "Cannot fail chain in state: {:?}",
                self.status
            )));
        }
        self.error = Some(error);
        self.enter(ChainStatus::Failed);
        Ok(())
    }
}

/// Runs operation chains against a store
///
/// Before any handler runs the chain is checked in three passes: adjacent
/// declared types, handler resolution, then schema-level operation checks.
/// A chain that fails a check has no side effects.
pub struct ChainExecutor<'a> {
    store: &'a dyn Store,
}

impl<'a> ChainExecutor<'a> {
    /// An executor for a store
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Execute a chain; the result is the last operation's output
    pub fn execute(&self, chain: OperationChain, context: &mut Context) -> Result<Data, CoreError> {
        let mut execution = ChainExecution::new(context.job_id());
        self.execute_recorded(chain, context, &mut execution)
    }

    /// Execute a chain, recording its status transitions in `execution`
    pub fn execute_recorded(
        &self,
        chain: OperationChain,
        context: &mut Context,
        execution: &mut ChainExecution,
    ) -> Result<Data, CoreError> {
        let span = info_span!(
            "operation_chain",
            job_id = %context.job_id(),
            graph_id = %self.store.graph_id(),
            operations = chain.len()
        );
        let _guard = span.enter();

        let handlers = match self.check(&chain) {
            Ok(handlers) => handlers,
            Err(e) => {
                info!(error = %e, "Rejected operation chain");
                execution.fail(e.clone())?;
                return Err(e);
            }
        };
        execution.validated()?;

        let mut held: Vec<ReleaseHandle> = Vec::new();
        let mut current = Data::Null;
        for (index, (mut operation, handler)) in
            chain.into_operations().into_iter().zip(handlers).enumerate()
        {
            execution.start_operation(index)?;
            let upstream = std::mem::replace(&mut current, Data::Null);
            let own_input = operation.take_input();
            let input = if own_input.is_null() {
                upstream
            } else {
                // configured input wins; dropping upstream releases it
                drop(upstream);
                own_input
            };
            debug!(index, operation = %operation.kind(), input = %input.data_type(), "Running operation");

            match handler.handle(operation.as_ref(), input, context, self.store) {
                Ok(output) => {
                    if let Some(handle) = output.release_handle() {
                        held.push(handle);
                    }
                    current = output;
                }
                Err(e) => {
                    error!(index, operation = %operation.kind(), error = %e, "Operation failed");
                    for handle in held.iter().rev() {
                        handle.release();
                    }
                    execution.fail(e.clone())?;
                    return Err(e);
                }
            }
        }

        execution.complete()?;
        info!(output = %current.data_type(), "Operation chain completed");
        Ok(current)
    }

    fn check(&self, chain: &OperationChain) -> Result<Vec<Arc<dyn Handler>>, CoreError> {
        let operations = chain.operations();
        if operations.is_empty() {
            return Err(CoreError::InvalidChain(vec![
                "operation chain is empty".to_string()
            ]));
        }

        for (index, pair) in operations.windows(2).enumerate() {
            let (producer, consumer) = (&pair[0], &pair[1]);
            if !producer.output_type().is_assignable_to(consumer.input_type()) {
                return Err(CoreError::ChainType {
                    index: index + 1,
                    producer: producer.kind().to_string(),
                    output: producer.output_type().to_string(),
                    consumer: consumer.kind().to_string(),
                    input: consumer.input_type().to_string(),
                });
            }
        }

        let handlers = operations
            .iter()
            .map(|operation| self.store.handler(operation.kind()))
            .collect::<Result<Vec<_>, _>>()?;

        let problems: Vec<String> = operations
            .iter()
            .flat_map(|operation| operation.validate(self.store.schema()))
            .collect();
        if !problems.is_empty() {
            return Err(CoreError::InvalidChain(problems));
        }

        Ok(handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let mut execution = ChainExecution::new("job");
        execution.validated().unwrap();
        execution.start_operation(0).unwrap();
        execution.start_operation(1).unwrap();
        execution.complete().unwrap();
        let statuses: Vec<_> = execution.transitions.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            statuses,
            vec![
                ChainStatus::Created,
                ChainStatus::Validated,
                ChainStatus::Running(0),
                ChainStatus::Running(1),
                ChainStatus::Completed
            ]
        );
    }

    #[test]
    fn test_cannot_run_before_validation() {
        let mut execution = ChainExecution::new("job");
        let err = execution.start_operation(0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Chain execution error: Cannot start operation 0 in state: Created"
        );
    }

    #[test]
    fn test_operations_run_in_order() {
        let mut execution = ChainExecution::new("job");
        execution.validated().unwrap();
        assert!(execution.start_operation(1).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut execution = ChainExecution::new("job");
        execution.fail(CoreError::EmptyInput("x".to_string())).unwrap();
        assert!(execution.fail(CoreError::EmptyInput("y".to_string())).is_err());
        assert!(execution.validated().is_err());
        assert_eq!(execution.error, Some(CoreError::EmptyInput("x".to_string())));
    }
}
