//! Bounded waits. Every wait here ends in a value, never a hang and never an
//! error for "nothing happened in time".

use crate::error::Result;
use crate::page::{Locator, Page};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll until the first element matching `locator` is visible.
///
/// Returns `Ok(false)` when `timeout` elapses first. Errors from the page
/// (an unparseable selector, say) are returned as-is.
pub async fn wait_for_visible<P>(
    page: &P,
    locator: &Locator,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool>
where
    P: Page + ?Sized,
{
    let deadline = Instant::now() + timeout;
    loop {
        if page.is_locator_visible(locator).await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("{} not visible after {:?}", locator, timeout);
            return Ok(false);
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Race `signals` and return the first one that fires.
///
/// A signal fires by resolving to `Some`; one resolving to `None` drops out
/// of the race. `None` is returned when no signal fires within `timeout`,
/// which is an ordinary outcome rather than a failure.
pub async fn await_first<'a, T>(
    signals: Vec<BoxFuture<'a, Option<T>>>,
    timeout: Duration,
) -> Option<T>
where
    T: Send + 'a,
{
    let mut pending: FuturesUnordered<_> = signals.into_iter().collect();
    let race = async {
        while let Some(outcome) = pending.next().await {
            if outcome.is_some() {
                return outcome;
            }
        }
        None
    };
    tokio::time::timeout(timeout, race).await.unwrap_or(None)
}
