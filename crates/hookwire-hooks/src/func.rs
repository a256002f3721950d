//! Closure adapters for native hooks.

use std::sync::Arc;

use async_trait::async_trait;

use hookwire_core::Transaction;

use crate::definitions::{HookData, HookEventKind};
use crate::error::HookError;
use crate::registry::Hook;

type EachFn = dyn Fn(&mut Transaction) -> Result<(), HookError> + Send + Sync;
type AllFn = dyn Fn(&mut [Transaction]) -> Result<(), HookError> + Send + Sync;

enum Body {
    Each(Box<EachFn>),
    All(Box<AllFn>),
}

/// A hook backed by a synchronous closure.
///
/// An `each` closure given the whole list runs once per transaction; an
/// `all` closure given a single transaction sees a one-element slice.
pub struct FnHook {
    body: Body,
}

impl FnHook {
    /// Wraps a closure over one transaction.
    pub fn each<F>(f: F) -> Arc<dyn Hook>
    where
        F: Fn(&mut Transaction) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            body: Body::Each(Box::new(f)),
        })
    }

    /// Wraps a closure over the transaction list.
    pub fn all<F>(f: F) -> Arc<dyn Hook>
    where
        F: Fn(&mut [Transaction]) -> Result<(), HookError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            body: Body::All(Box::new(f)),
        })
    }
}

impl std::fmt::Debug for FnHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self.body {
            Body::Each(_) => "each",
            Body::All(_) => "all",
        };
        f.debug_struct("FnHook").field("shape", &shape).finish()
    }
}

#[async_trait]
impl Hook for FnHook {
    async fn call(&self, _event: HookEventKind, mut data: HookData<'_>) -> Result<(), HookError> {
        match &self.body {
            Body::Each(f) => {
                for transaction in data.transactions_mut() {
                    f(transaction)?;
                }
                Ok(())
            }
            Body::All(f) => f(data.transactions_mut()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_runs_per_transaction_on_batches() {
        let hook = FnHook::each(|t| {
            t.skip = true;
            Ok(())
        });
        let mut transactions = vec![Transaction::new("a"), Transaction::new("b")];

        hook.call(
            HookEventKind::BeforeAll,
            HookData::Transactions(&mut transactions),
        )
        .await
        .unwrap();

        assert!(transactions.iter().all(|t| t.skip));
    }

    #[tokio::test]
    async fn all_sees_single_transaction_as_slice() {
        let hook = FnHook::all(|ts| {
            assert_eq!(ts.len(), 1);
            ts[0].fail = Some("from all".to_string());
            Ok(())
        });
        let mut t = Transaction::new("a");

        hook.call(HookEventKind::BeforeEach, HookData::Transaction(&mut t))
            .await
            .unwrap();

        assert_eq!(t.fail.as_deref(), Some("from all"));
    }
}
