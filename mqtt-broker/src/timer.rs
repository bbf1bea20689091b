//! The single external tick the broker loop reacts to. Firing this tick
//! must never mutate broker state directly — it only ever causes
//! `Broker::check_timeouts` to run as one arm of the same `select!` that
//! handles every other broker event, so protocol state is never touched
//! from outside that loop.

use std::time::Duration;

use tokio::time::Interval;

pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

pub fn housekeeping_ticker() -> Interval {
    tokio::time::interval(HOUSEKEEPING_INTERVAL)
}
