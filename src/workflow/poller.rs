use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::state::{PollOutcome, WorkflowState};
use super::{OrderService, Shared};
use crate::config::PollPolicy;
use crate::history::OrderHistory;

/// Observable progress of the confirmation poll
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(tag = "progress", rename_all = "snake_case")]
pub enum PollProgress {
    #[default]
    Idle,
    Waiting {
        attempts: u32,
    },
    /// Recent requests failed; the status could not be confirmed
    Degraded {
        consecutive_failures: u32,
    },
    Settled,
    /// Round exhausted without an operator decision
    GaveUp {
        attempts: u32,
    },
}

pub(super) fn spawn<S: OrderService>(
    service: Arc<S>,
    shared: Arc<Mutex<Shared>>,
    history: OrderHistory,
    order_id: Uuid,
    policy: PollPolicy,
) -> JoinHandle<()> {
    let span = info_span!("confirmation_poll", %order_id);
    tokio::spawn(poll_order(service, shared, history, order_id, policy).instrument(span))
}

async fn poll_order<S: OrderService>(
    service: Arc<S>,
    shared: Arc<Mutex<Shared>>,
    history: OrderHistory,
    order_id: Uuid,
    policy: PollPolicy,
) {
    let mut ticker = time::interval_at(Instant::now() + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    for attempt in 1..=policy.max_attempts {
        ticker.tick().await;
        let result = service.order_status(order_id).await;

        let mut inner = shared.lock();
        // Results for an order the user walked away from are dropped
        if !inner.state.is_awaiting(order_id) {
            debug!("Order no longer awaiting confirmation");
            return;
        }

        let outcome = result.map(|status| (PollOutcome::from_status(&status), status));
        match outcome {
            Ok((PollOutcome::Confirmed { price, confirmation }, status)) => {
                inner.state = WorkflowState::confirmed_from(order_id, price, confirmation);
                inner.progress = PollProgress::Settled;
                inner.poller = None;
                drop(inner);

                history.update(order_id, |entry| {
                    entry.status = status.status;
                    entry.final_price = Some(price);
                });
                info!(price, ?confirmation, attempt, "Order confirmed by operator");
                return;
            }
            Ok((PollOutcome::Placed { price }, status)) => {
                inner.poller = None;
                inner.complete(&shared, order_id, price);
                drop(inner);

                history.update(order_id, |entry| {
                    entry.status = status.status;
                    entry.final_price = Some(price);
                });
                info!(price, status = %status.status, attempt, "Order already placed");
                return;
            }
            Ok((PollOutcome::StillPending, _)) => {
                failures = 0;
                inner.progress = PollProgress::Waiting { attempts: attempt };
            }
            Ok((PollOutcome::MissingPrice, status)) => {
                failures += 1;
                warn!(status = %status.status, "Order confirmed without a price");
                inner.progress = after_failure(attempt, failures, policy.failure_threshold);
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, attempt, failures, "Order status poll failed");
                inner.progress = after_failure(attempt, failures, policy.failure_threshold);
            }
        }
    }

    let mut inner = shared.lock();
    if inner.state.is_awaiting(order_id) {
        inner.progress = PollProgress::GaveUp {
            attempts: policy.max_attempts,
        };
        inner.poller = None;
        warn!(
            attempts = policy.max_attempts,
            "Stopped polling before the operator confirmed"
        );
    }
}

fn after_failure(attempt: u32, failures: u32, threshold: u32) -> PollProgress {
    if failures >= threshold {
        PollProgress::Degraded {
            consecutive_failures: failures,
        }
    } else {
        PollProgress::Waiting { attempts: attempt }
    }
}
