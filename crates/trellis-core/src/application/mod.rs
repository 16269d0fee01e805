/// Operation chain execution
pub mod chain_executor;
