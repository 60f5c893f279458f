//! Feature-gated reconcile runner
//!
//! One runner task per reconciler. Every interval the runner checks the
//! reconciler's gates and, if all are enabled, executes one tick. Ticks
//! of the same reconciler never overlap; ticks of different reconcilers
//! run concurrently because each runner is its own task.
//!
//! A tick runs inside its own spawned task so a panic is contained
//! there: it is logged and the reconciler resumes on the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::features::{Feature, FeatureGates};
use crate::observability::ResManagerMetrics;

/// A single-purpose control loop hosted by the manager.
///
/// Created once at startup and never unregistered; the runner skips
/// ticks while any gate is off.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Gates that must all be enabled for a tick to run.
    fn gates(&self) -> &[Feature];

    /// Interval between ticks.
    fn interval(&self) -> Duration;

    /// One-time setup before the first tick. The default is a no-op.
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn tick(&self);
}

/// Periodically tick the reconciler while its gates are enabled.
pub async fn run_feature(
    reconciler: Arc<dyn Reconciler>,
    gates: FeatureGates,
    shutdown: broadcast::Receiver<()>,
) {
    run_loop(reconciler, gates, shutdown).await;
}

/// As [`run_feature`], but run `init` exactly once first. An init
/// failure disables the reconciler for the process lifetime.
pub async fn run_feature_with_init(
    reconciler: Arc<dyn Reconciler>,
    gates: FeatureGates,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::select! {
        result = reconciler.init() => {
            if let Err(err) = result {
                error!(
                    reconciler = reconciler.name(),
                    error = %err,
                    "Reconciler init failed, disabling for process lifetime"
                );
                return;
            }
        }
        _ = shutdown.recv() => return,
    }

    run_loop(reconciler, gates, shutdown).await;
}

async fn run_loop(
    reconciler: Arc<dyn Reconciler>,
    gates: FeatureGates,
    mut shutdown: broadcast::Receiver<()>,
) {
    let metrics = ResManagerMetrics::new();
    // A zero interval would make the ticker panic.
    let period = reconciler.interval().max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        reconciler = reconciler.name(),
        interval_secs = period.as_secs(),
        "Starting reconciler"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !gates.all_enabled(reconciler.gates()) {
                    debug!(reconciler = reconciler.name(), "Skipping tick, feature gate disabled");
                    continue;
                }

                metrics.record_reconcile_tick(reconciler.name());

                let task = tokio::spawn({
                    let reconciler = Arc::clone(&reconciler);
                    async move { reconciler.tick().await }
                });
                if let Err(err) = task.await {
                    if err.is_panic() {
                        error!(
                            reconciler = reconciler.name(),
                            error = %err,
                            "Reconciler tick panicked, resuming on next tick"
                        );
                    }
                }
            }
            _ = shutdown.recv() => {
                info!(reconciler = reconciler.name(), "Shutting down reconciler");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReconciler {
        gates: Vec<Feature>,
        interval: Duration,
        ticks: AtomicUsize,
        inits: AtomicUsize,
        fail_init: bool,
        panic_on_first_tick: bool,
    }

    impl CountingReconciler {
        fn new(gates: Vec<Feature>, interval: Duration) -> Self {
            Self {
                gates,
                interval,
                ticks: AtomicUsize::new(0),
                inits: AtomicUsize::new(0),
                fail_init: false,
                panic_on_first_tick: false,
            }
        }
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        fn name(&self) -> &str {
            "counting"
        }

        fn gates(&self) -> &[Feature] {
            &self.gates
        }

        fn interval(&self) -> Duration {
            self.interval
        }

        async fn init(&self) -> anyhow::Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                anyhow::bail!("init failed");
            }
            Ok(())
        }

        async fn tick(&self) {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_first_tick && n == 0 {
                panic!("tick exploded");
            }
        }
    }

    #[tokio::test]
    async fn test_ticks_while_gate_enabled() {
        let reconciler = Arc::new(CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        ));
        let gates = FeatureGates::with_enabled(&[Feature::BEMemoryEvict]);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_feature(reconciler.clone(), gates, rx));
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(reconciler.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_no_ticks_while_gate_disabled() {
        let reconciler = Arc::new(CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        ));
        let gates = FeatureGates::new();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_feature(reconciler.clone(), gates, rx));
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(reconciler.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gate_flip_takes_effect_between_ticks() {
        let reconciler = Arc::new(CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        ));
        let gates = FeatureGates::new();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_feature(reconciler.clone(), gates.clone(), rx));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(reconciler.ticks.load(Ordering::SeqCst), 0);

        gates.set(Feature::BEMemoryEvict, true);
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(reconciler.ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_init_runs_once_before_ticks() {
        let reconciler = Arc::new(CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        ));
        let gates = FeatureGates::with_enabled(&[Feature::BEMemoryEvict]);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_feature_with_init(reconciler.clone(), gates, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(reconciler.inits.load(Ordering::SeqCst), 1);
        assert!(reconciler.ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_init_failure_disables_reconciler() {
        let mut reconciler = CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        );
        reconciler.fail_init = true;
        let reconciler = Arc::new(reconciler);
        let gates = FeatureGates::with_enabled(&[Feature::BEMemoryEvict]);
        let (_tx, rx) = broadcast::channel(1);

        // Returns without ever ticking.
        run_feature_with_init(reconciler.clone(), gates, rx).await;
        assert_eq!(reconciler.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_tick_does_not_stop_the_loop() {
        let mut reconciler = CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        );
        reconciler.panic_on_first_tick = true;
        let reconciler = Arc::new(reconciler);
        let gates = FeatureGates::with_enabled(&[Feature::BEMemoryEvict]);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_feature(reconciler.clone(), gates, rx));
        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(reconciler.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_stop_ends_runner() {
        let reconciler = Arc::new(CountingReconciler::new(
            vec![Feature::BEMemoryEvict],
            Duration::from_millis(10),
        ));
        let gates = FeatureGates::with_enabled(&[Feature::BEMemoryEvict]);
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_feature(reconciler, gates, rx));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("runner did not stop")
            .unwrap();
    }
}
