//! Concurrent fan-out combinators.
//!
//! Both combinators launch every operation as a detached task and differ only
//! in how they report failure: [`run_all`] fails fast on the first error,
//! [`run_some`] always drains every result and aggregates the errors.
//!
//! Neither combinator cancels in-flight operations. When `run_all` returns an
//! error, or a caller's deadline elapses, the remaining tasks keep running on
//! the runtime until they finish on their own; only the waiting stops.

use std::fmt;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

/// A boxed fallible operation over a shared argument.
pub type Op<A, E> = Box<dyn FnOnce(A) -> BoxFuture<'static, Result<(), E>> + Send>;

/// Runs every operation concurrently, failing fast.
///
/// Returns the first error observed — which operation "wins" is a race and
/// intentionally non-deterministic. On success, returns only after all
/// operations have completed. Each operation gets exactly one attempt.
pub async fn run_all<A, E>(arg: A, ops: Vec<Op<A, E>>) -> Result<(), E>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(ops.len().max(1));
    for op in ops {
        let arg = arg.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            // The receiver may be gone already if a sibling failed first.
            let _ = tx.send(op(arg).await).await;
        });
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        result?;
    }
    Ok(())
}

/// Runs every operation concurrently, collecting every error.
///
/// Always waits for all operations to finish; one failure never prevents a
/// sibling from completing. Returns an [`Aggregate`] of the individual errors,
/// or `Ok` if none failed.
pub async fn run_some<A, E>(arg: A, ops: Vec<Op<A, E>>) -> Result<(), Aggregate<E>>
where
    A: Clone + Send + 'static,
    E: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(ops.len().max(1));
    for op in ops {
        let arg = arg.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(op(arg).await).await;
        });
    }
    drop(tx);

    let mut errors = Vec::new();
    while let Some(result) = rx.recv().await {
        if let Err(e) = result {
            errors.push(e);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Aggregate { errors })
    }
}

/// A collection of errors from a best-effort fan-out.
#[derive(Debug)]
pub struct Aggregate<E> {
    errors: Vec<E>,
}

impl<E> Aggregate<E> {
    /// The individual errors, in completion order.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// Number of failed operations.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<E: fmt::Display> fmt::Display for Aggregate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} operation(s) failed", self.errors.len())?;
        for e in &self.errors {
            write!(f, "; {e}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for Aggregate<E> {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn ok_op(counter: Arc<AtomicUsize>) -> Op<(), String> {
        Box::new(move |_| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_op(counter: Arc<AtomicUsize>) -> Op<(), String> {
        Box::new(move |_| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
        })
    }

    #[tokio::test]
    async fn run_all_waits_for_every_op() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ops: Vec<Op<(), String>> = (0..8).map(|_| ok_op(Arc::clone(&counter))).collect();

        run_all((), ops).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn run_all_reports_single_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ops: Vec<Op<(), String>> = (0..4).map(|_| ok_op(Arc::clone(&counter))).collect();
        ops.push(failing_op(Arc::clone(&counter)));

        assert!(run_all((), ops).await.is_err());
    }

    #[tokio::test]
    async fn run_all_with_no_ops_succeeds() {
        run_all::<(), String>((), Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn run_some_collects_every_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut ops: Vec<Op<(), String>> = (0..5).map(|_| ok_op(Arc::clone(&counter))).collect();
        for _ in 0..3 {
            ops.push(failing_op(Arc::clone(&counter)));
        }

        let err = run_some((), ops).await.unwrap_err();
        assert_eq!(err.len(), 3);
        // Every op ran to completion, including the failing ones.
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn run_some_with_no_failures_succeeds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ops: Vec<Op<(), String>> = (0..3).map(|_| ok_op(Arc::clone(&counter))).collect();

        run_some((), ops).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn aggregate_display_includes_each_error() {
        let ops: Vec<Op<(), String>> = vec![
            Box::new(|_| Box::pin(async { Err("first".to_string()) })),
            Box::new(|_| Box::pin(async { Err("second".to_string()) })),
        ];
        let err = run_some((), ops).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("2 operation(s) failed"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }
}
