//! Request executor seam: performs a transaction's request and validates the
//! response. The HTTP side lives outside this crate.

use async_trait::async_trait;

use hookwire_core::{AppError, Transaction};

/// Error from performing or validating a request.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The request could not be performed; the transaction is reported as errored.
    #[error("{0}")]
    Request(String),

    /// The run cannot continue.
    #[error(transparent)]
    Fatal(#[from] AppError),
}

/// Performs requests for the pipeline.
#[async_trait]
pub trait TransactionExecutor: Send + Sync + std::fmt::Debug {
    /// Sends the request of `transaction` and validates the response.
    ///
    /// Implementations store the response in `transaction.real` and the
    /// verdict in `transaction.test.valid`.
    async fn execute(&self, transaction: &mut Transaction) -> Result<(), ExecutionError>;
}
