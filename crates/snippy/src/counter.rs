use std::sync::Arc;

use crate::{
    CommitReport, Counter, CounterDelta, CounterUpdate, Event, Observer, Result, SnippetId,
    Transaction,
};

/// Keeps the denormalized counters on a snippet in step with its child rows.
///
/// Callers pair exactly one [`increment`](Self::increment) with each child
/// row they create and one [`decrement`](Self::decrement) with each child
/// row they delete, on the same transaction. Updates are relative, so
/// concurrent requests on the same snippet serialize in the store rather
/// than overwrite each other, and a rollback takes the counter change with
/// it.
pub struct CounterMaintainer {
    observer: Arc<dyn Observer>,
}

impl CounterMaintainer {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    /// Adds one to `counter` on `snippet`.
    ///
    /// # Errors
    ///
    /// Whatever the transaction reports. The caller must then abandon the
    /// transaction; the child row must not be committed without its counter.
    pub async fn increment<X: Transaction>(
        &self,
        tx: &X,
        snippet: SnippetId,
        counter: Counter,
    ) -> Result<CounterUpdate> {
        tx.adjust_counter(snippet, counter, CounterDelta::Increment)
            .await
    }

    /// Subtracts one from `counter` on `snippet`, flooring at zero.
    ///
    /// Hitting the floor means the counter had already drifted below the
    /// live row count; it is reported as [`Event::CounterClamped`] and the
    /// operation carries on.
    ///
    /// # Errors
    ///
    /// Whatever the transaction reports.
    pub async fn decrement<X: Transaction>(
        &self,
        tx: &X,
        snippet: SnippetId,
        counter: Counter,
    ) -> Result<CounterUpdate> {
        let update = tx
            .adjust_counter(snippet, counter, CounterDelta::Decrement)
            .await?;
        if update.clamped {
            self.observer
                .on_event(&Event::CounterClamped { snippet, counter });
        }
        Ok(update)
    }

    /// Commits `tx` and reports decrements that only hit zero against the
    /// committed value, after a concurrent transaction got there first.
    ///
    /// # Errors
    ///
    /// Whatever the commit reports; nothing is emitted then.
    pub async fn commit<X: Transaction>(&self, tx: X) -> Result<CommitReport> {
        let report = tx.commit().await?;
        for late in report.late_clamps() {
            self.observer.on_event(&Event::CounterClamped {
                snippet: late.snippet,
                counter: late.counter,
            });
        }
        Ok(report)
    }
}
