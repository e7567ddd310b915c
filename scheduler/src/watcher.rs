//! Background completion detector.
//!
//! Polls every pile's executing head once per tick and settles any request
//! whose accrued mock time has reached its requested energy. The scheduler
//! itself decides "due"; this loop only drives the cadence and the
//! settlement calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, instrument, warn};

use billing::OrderRepository;
use core_types::Clock;

use crate::engine::Scheduler;

pub struct CompletionWatcher<C: Clock, O: OrderRepository> {
    scheduler: Arc<Scheduler<C, O>>,
    poll_interval: Duration,
}

impl<C: Clock + 'static, O: OrderRepository + 'static> CompletionWatcher<C, O> {
    pub fn new(scheduler: Arc<Scheduler<C, O>>, poll_interval: Duration) -> Self {
        Self {
            scheduler,
            poll_interval,
        }
    }

    /// Runs until `shutdown` fires. A settlement failure from
    /// `end_request` is treated as fatal and returned: the caller should
    /// let this task's error bring the process down rather than keep
    /// polling a scheduler whose invariants may now be broken.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.check_completions().await {
                        error!(error = %err, "completion check failed, watcher exiting");
                        return Err(err);
                    }
                }
                _ = shutdown.changed() => {
                    warn!("completion watcher shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn check_completions(&self) -> anyhow::Result<()> {
        let now = self.scheduler.clock().now();
        self.scheduler.complete_due_requests(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex as StdMutex;
    use rust_decimal_macros::dec;

    use billing::Order;
    use core_types::{MockInstant, Pile, PileKind, PileRepository, PileStatus};

    use crate::engine::{Scheduler, SchedulerConfig};
    use crate::status::RequestStatusKind;

    struct TestClock {
        now: StdMutex<MockInstant>,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                now: StdMutex::new(Utc::now()),
            }
        }

        fn advance_seconds(&self, seconds: i64) {
            let mut now = self.now.lock();
            *now += chrono::Duration::seconds(seconds);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> MockInstant {
            *self.now.lock()
        }
    }

    struct FixedPileRepository {
        piles: Vec<Pile>,
    }

    #[async_trait::async_trait]
    impl PileRepository for FixedPileRepository {
        async fn list_all(&self) -> anyhow::Result<Vec<Pile>> {
            Ok(self.piles.clone())
        }
    }

    #[derive(Default)]
    struct RecordingOrderRepository {
        orders: StdMutex<Vec<Order>>,
    }

    #[async_trait::async_trait]
    impl OrderRepository for RecordingOrderRepository {
        async fn save(&self, order: &Order) -> anyhow::Result<()> {
            self.orders.lock().push(order.clone());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn settles_a_request_once_its_energy_target_is_reached() {
        let clock = Arc::new(TestClock::new());
        let order_repo = Arc::new(RecordingOrderRepository::default());
        let pile_repo = FixedPileRepository {
            piles: vec![Pile::new(1, PileKind::Slow, PileStatus::Running)],
        };
        let scheduler = Arc::new(
            Scheduler::new(
                SchedulerConfig::default(),
                clock.clone(),
                order_repo.clone(),
                &pile_repo,
            )
            .await
            .unwrap(),
        );
        let request_id = scheduler
            .submit_request(PileKind::Slow, "alice", dec!(30.0), dec!(60.0))
            .await
            .unwrap();

        let poll_interval = Duration::from_millis(10);
        let watcher = CompletionWatcher::new(scheduler.clone(), poll_interval);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { watcher.run(shutdown_rx).await });

        clock.advance_seconds(3600);
        tokio::time::advance(poll_interval).await;
        tokio::task::yield_now().await;

        assert!(scheduler.get_request_status(request_id).await.is_err());
        assert_eq!(order_repo.orders.lock().len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_unfinished_requests_untouched_and_exits_on_shutdown() {
        let clock = Arc::new(TestClock::new());
        let order_repo = Arc::new(RecordingOrderRepository::default());
        let pile_repo = FixedPileRepository {
            piles: vec![Pile::new(1, PileKind::Slow, PileStatus::Running)],
        };
        let scheduler = Arc::new(
            Scheduler::new(
                SchedulerConfig::default(),
                clock.clone(),
                order_repo.clone(),
                &pile_repo,
            )
            .await
            .unwrap(),
        );
        let request_id = scheduler
            .submit_request(PileKind::Slow, "alice", dec!(30.0), dec!(60.0))
            .await
            .unwrap();

        let poll_interval = Duration::from_millis(10);
        let watcher = CompletionWatcher::new(scheduler.clone(), poll_interval);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { watcher.run(shutdown_rx).await });

        tokio::time::advance(poll_interval).await;
        tokio::task::yield_now().await;

        let status = scheduler.get_request_status(request_id).await.unwrap();
        assert_eq!(status.status, RequestStatusKind::Charging);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
