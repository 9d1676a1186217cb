use crate::config::SweepConfig;
use crate::error::Result;
use crate::provider::{now_unix, Provider, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Callback invoked with `(key, value)` once a key is due.
///
/// Runs on Tokio's blocking pool, so it may block without stalling other
/// tasks. The sweep waits for it before deleting the key.
pub type Handler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// A TTL keyed store that calls back when keys expire.
///
/// Dropping the store stops its sweep task.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use timerstore::{MemProvider, Registry, TimerStore};
///
/// # async fn demo() -> timerstore::Result<()> {
/// let registry = Registry::new();
/// registry.register("mem", Arc::new(MemProvider::new()))?;
///
/// let timers = TimerStore::new(&registry, "orders", "mem", Duration::from_secs(1), |key, value| {
///     println!("{} expired with {}", key, value);
/// })?;
/// timers.set("order:17", "unpaid", 30).await?;
/// # Ok(())
/// # }
/// ```
pub struct TimerStore {
    prefix: String,
    store: Arc<dyn Provider>,
    handler: Handler,
    config: SweepConfig,
    /// Held for the whole of every sweep
    sweep_lock: Arc<Mutex<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TimerStore {
    /// Builds a timer store on the provider registered as `provider`.
    ///
    /// Sets `prefix` on the provider and starts the sweep task, so it must
    /// be called from within a Tokio runtime. Fails with
    /// [`TimerError::UnknownProvider`](crate::TimerError::UnknownProvider)
    /// when the name was never registered.
    pub fn new<F>(
        registry: &Registry,
        prefix: &str,
        provider: &str,
        interval: Duration,
        handler: F,
    ) -> Result<Self>
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let store = registry.lookup(provider)?;
        Ok(Self::start(
            prefix,
            store,
            SweepConfig::new().with_interval(interval),
            Arc::new(handler),
        ))
    }

    /// Builds a timer store directly on a provider instance.
    pub fn start(
        prefix: &str,
        store: Arc<dyn Provider>,
        config: SweepConfig,
        handler: Handler,
    ) -> Self {
        store.set_prefix(prefix);

        let sweep_lock = Arc::new(Mutex::new(()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweep_loop(
            Arc::clone(&store),
            Arc::clone(&handler),
            Arc::clone(&sweep_lock),
            config.interval,
            shutdown_rx,
        ));

        info!(prefix = %prefix, interval_ms = config.interval.as_millis(), "Timer sweep started");

        Self {
            prefix: prefix.to_string(),
            store,
            handler,
            config,
            sweep_lock,
            shutdown_tx,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Stores `value` under `key` for `ttl` seconds.
    pub async fn set(&self, key: &str, value: &str, ttl: i64) -> Result<()> {
        self.store.set(key, value, ttl).await
    }

    /// Returns the value under `key`, or `None` if absent.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key).await
    }

    /// Removes `key` without firing the handler.
    pub async fn del(&self, key: &str) -> Result<()> {
        self.store.del(key).await
    }

    /// Runs one sweep now and returns how many keys were delivered.
    ///
    /// Waits for a background sweep that is already running.
    pub async fn sweep_once(&self) -> Result<usize> {
        let _turn = self.sweep_lock.lock().await;
        sweep(self.store.as_ref(), &self.handler, now_unix()).await
    }

    /// Stops the sweep task. Called on drop.
    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!(prefix = %self.prefix, "Timer sweep stopped");
        }
    }
}

impl Drop for TimerStore {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(
    store: Arc<dyn Provider>,
    handler: Handler,
    sweep_lock: Arc<Mutex<()>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Timer sweep received shutdown signal");
                    return;
                }
            }
        }

        let _turn = sweep_lock.lock().await;
        if let Err(e) = sweep(store.as_ref(), &handler, now_unix()).await {
            warn!(error = %e, "Sweep failed, retrying next interval");
        }
    }
}

/// Delivers and deletes every key due by `now`, then prunes the visited
/// buckets. Per-key failures are logged and skipped.
async fn sweep(store: &dyn Provider, handler: &Handler, now: i64) -> Result<usize> {
    let due = store.before(now).await?;
    let delivered = due.len();

    for (key, value) in &due.entries {
        let call = {
            let handler = Arc::clone(handler);
            let (key, value) = (key.clone(), value.clone());
            tokio::task::spawn_blocking(move || handler(&key, &value))
        };
        if let Err(e) = call.await {
            warn!(key = %key, panicked = e.is_panic(), "Expiry handler failed");
        }
        if let Err(e) = store.del(key).await {
            warn!(key = %key, error = %e, "Failed to delete expired key");
        }
    }

    if let Err(e) = store.prune(&due.buckets).await {
        warn!(error = %e, "Failed to prune expired buckets");
    }

    if delivered > 0 {
        debug!(delivered = delivered, buckets = due.buckets.len(), "Expired keys delivered");
    }

    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::faulty::FaultyBackend;
    use crate::backend::MemoryBackend;
    use crate::provider::{MemProvider, SharedProvider};
    use crate::TimerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    type Fired = Arc<Mutex<Vec<(String, String)>>>;

    fn recorder() -> (Fired, impl Fn(&str, &str) + Send + Sync + 'static) {
        let fired: Fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let handler = move |key: &str, value: &str| {
            sink.lock().unwrap().push((key.to_string(), value.to_string()));
        };
        (fired, handler)
    }

    async fn wait_for(fired: &Fired, count: usize, timeout: Duration) {
        let started = Instant::now();
        while fired.lock().unwrap().len() < count && started.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_handler_fires_once_then_key_is_gone() {
        let registry = Registry::new();
        registry.register("mem", Arc::new(MemProvider::new())).unwrap();

        let (fired, handler) = recorder();
        let timers =
            TimerStore::new(&registry, "Test", "mem", Duration::from_millis(200), handler).unwrap();

        timers.set("x", "X", 1).await.unwrap();
        assert_eq!(timers.get("x").await.unwrap().as_deref(), Some("X"));

        wait_for(&fired, 1, Duration::from_secs(4)).await;
        // A few more sweeps must not deliver it again.
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(
            *fired.lock().unwrap(),
            vec![("x".to_string(), "X".to_string())]
        );
        assert_eq!(timers.get("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let registry = Registry::new();
        let result = TimerStore::new(&registry, "Test", "redis", Duration::from_secs(1), |_, _| {});
        assert!(matches!(result, Err(TimerError::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn test_new_sets_prefix_on_provider() {
        let mem = Arc::new(MemProvider::new());
        let registry = Registry::new();
        registry.register("mem", mem.clone()).unwrap();

        let timers =
            TimerStore::new(&registry, "orders", "mem", Duration::from_secs(60), |_, _| {}).unwrap();
        assert_eq!(timers.prefix(), "orders");
        assert_eq!(mem.prefix(), "orders");
    }

    #[tokio::test]
    async fn test_sweep_once_delivers_and_deletes() {
        let mem = Arc::new(MemProvider::new());
        let (fired, handler) = recorder();
        let timers = TimerStore::start(
            "Test",
            mem.clone(),
            SweepConfig::new().with_interval(Duration::from_secs(60)),
            Arc::new(handler),
        );

        timers.set("a", "A", -1).await.unwrap();
        timers.set("b", "B", 0).await.unwrap();
        timers.set("later", "L", 600).await.unwrap();

        assert_eq!(timers.sweep_once().await.unwrap(), 2);
        assert_eq!(fired.lock().unwrap().len(), 2);
        assert_eq!(mem.len(), 1);
        assert_eq!(timers.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let mem = Arc::new(MemProvider::new());
        let (fired, record) = recorder();
        let handler: Handler = Arc::new(move |key: &str, value: &str| {
            if key == "bad" {
                panic!("handler failure");
            }
            record(key, value);
        });
        let timers = TimerStore::start(
            "Test",
            mem.clone(),
            SweepConfig::new().with_interval(Duration::from_secs(60)),
            handler,
        );

        timers.set("bad", "B", -1).await.unwrap();
        timers.set("good", "G", -1).await.unwrap();

        assert_eq!(timers.sweep_once().await.unwrap(), 2);
        assert_eq!(
            *fired.lock().unwrap(),
            vec![("good".to_string(), "G".to_string())]
        );
        assert!(mem.is_empty());
    }

    #[tokio::test]
    async fn test_stop_halts_sweeps() {
        let mem = Arc::new(MemProvider::new());
        let (fired, handler) = recorder();
        let timers = TimerStore::start(
            "Test",
            mem.clone(),
            SweepConfig::new().with_interval(Duration::from_millis(50)),
            Arc::new(handler),
        );

        timers.stop();
        timers.set("k", "v", -1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(timers.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_sweep_prunes_shared_index() {
        let backend = Arc::new(MemoryBackend::new());
        let shared = Arc::new(SharedProvider::new(Arc::clone(&backend)));
        let (fired, handler) = recorder();
        let timers = TimerStore::start(
            "jobs",
            shared,
            SweepConfig::new().with_interval(Duration::from_secs(60)),
            Arc::new(handler),
        );

        timers.set("a", "A", -1).await.unwrap();
        timers.set("b", "B", -2).await.unwrap();
        timers.set("later", "L", 600).await.unwrap();
        assert_eq!(backend.zcard("jobs:index"), 3);

        assert_eq!(timers.sweep_once().await.unwrap(), 2);
        assert_eq!(fired.lock().unwrap().len(), 2);
        assert_eq!(backend.zcard("jobs:index"), 1);
        assert_eq!(timers.get("a").await.unwrap(), None);
        assert_eq!(timers.get("later").await.unwrap().as_deref(), Some("L"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweep_once_waits_for_running_sweep() {
        let mem = Arc::new(MemProvider::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: Handler = Arc::new(move |_: &str, _: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(400));
        });
        let timers = TimerStore::start(
            "Test",
            mem.clone(),
            SweepConfig::new().with_interval(Duration::from_millis(50)),
            handler,
        );

        timers.set("x", "X", -1).await.unwrap();
        // The background sweep is now inside the slow handler.
        tokio::time::sleep(Duration::from_millis(150)).await;
        timers.sweep_once().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(mem.is_empty());
    }

    #[tokio::test]
    async fn test_blocking_handler_does_not_stall_runtime() {
        let mem = Arc::new(MemProvider::new());
        let handler: Handler = Arc::new(|_: &str, _: &str| {
            std::thread::sleep(Duration::from_millis(400));
        });
        let timers = TimerStore::start(
            "Test",
            mem.clone(),
            SweepConfig::new().with_interval(Duration::from_millis(20)),
            handler,
        );

        timers.set("x", "X", -1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_sweep_survives_backend_failure() {
        let backend = Arc::new(FaultyBackend::new());
        let shared = Arc::new(SharedProvider::new(Arc::clone(&backend)));
        let (fired, handler) = recorder();
        let timers = TimerStore::start(
            "jobs",
            shared,
            SweepConfig::new().with_interval(Duration::from_millis(50)),
            Arc::new(handler),
        );

        backend.fail_on("zrange");
        timers.set("x", "X", -1).await.unwrap();
        assert!(matches!(
            timers.sweep_once().await,
            Err(TimerError::Backend(_))
        ));

        // Several failing background sweeps.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(fired.lock().unwrap().is_empty());

        backend.recover();
        wait_for(&fired, 1, Duration::from_secs(2)).await;
        // Waits out the sweep that delivered it.
        assert_eq!(timers.sweep_once().await.unwrap(), 0);
        assert_eq!(
            *fired.lock().unwrap(),
            vec![("x".to_string(), "X".to_string())]
        );
        assert_eq!(timers.get("x").await.unwrap(), None);
        assert_eq!(backend.inner().zcard("jobs:index"), 0);
    }
}
