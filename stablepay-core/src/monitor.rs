//! Transaction monitor.
//!
//! The TransactionMonitor is responsible for:
//! - Polling for the receipt of a submitted transaction, once immediately and
//!   then every `interval`, up to `max_attempts` polls in total
//! - Reporting the confirmation depth after every poll that finds a receipt
//! - Settling exactly once: confirmed at the network's depth, reverted,
//!   timed out, or cancelled
//!
//! Monitors are keyed by transaction hash in a [`MonitorSet`] owned by the
//! wallet session, which cancels them all when the wallet disconnects or
//! moves to another chain. Once `cancel()` returns, no further update
//! callback fires for that monitor.

use crate::error::MonitorError;
use crate::provider::{ChainRpc, ProviderError};
use parking_lot::{Mutex, ReentrantMutex};
use stablepay_sdk::TxHash;
use stablepay_sdk::config::MonitorPolicy;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Public data types
// ---------------------------------------------------------------------------

/// Progress of one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorState {
    pub tx_hash: TxHash,
    pub attempts_made: u32,
    pub last_known_confirmations: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Disconnected,
    ChainChanged,
    Requested,
}

/// Delivered to the update callback after every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorUpdate {
    /// No receipt yet.
    Pending { attempt: u32, max_attempts: u32 },
    /// Mined; `confirmations` never decreases between updates.
    Confirmations {
        confirmations: u64,
        required: u64,
        block_number: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Confirmed { confirmations: u64, block_number: u64 },
    Reverted { block_number: u64 },
    Timeout {
        attempts: u32,
        last_confirmations: Option<u64>,
    },
    Cancelled(CancelReason),
}

// ---------------------------------------------------------------------------
// Monitor control
// ---------------------------------------------------------------------------

/// Shared between a running monitor, its handle and the set.
///
/// Callbacks run while `gate` is held and re-check `cancelled` under it.
/// `cancel` sets the flag and then takes the gate once, so it waits for a
/// callback running on another thread. The gate is reentrant so a callback
/// can cancel its own monitor. No other lock is held while user code runs.
struct MonitorControl {
    tx_hash: TxHash,
    cancelled: AtomicBool,
    progress: Mutex<MonitorState>,
    gate: ReentrantMutex<()>,
    cancel_tx: watch::Sender<Option<CancelReason>>,
}

impl MonitorControl {
    fn new(tx_hash: TxHash) -> Arc<Self> {
        let (cancel_tx, _) = watch::channel(None);
        Arc::new(Self {
            tx_hash,
            cancelled: AtomicBool::new(false),
            progress: Mutex::new(MonitorState {
                tx_hash,
                attempts_made: 0,
                last_known_confirmations: None,
            }),
            gate: ReentrantMutex::new(()),
            cancel_tx,
        })
    }

    fn state(&self) -> MonitorState {
        *self.progress.lock()
    }

    fn cancel(&self, reason: CancelReason) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_tx.send_replace(Some(reason));
        drop(self.gate.lock());
    }

    fn record_attempt(&self, attempt: u32) {
        self.progress.lock().attempts_made = attempt;
    }

    /// Store `confirmations` unless a deeper value was already seen, and
    /// return the depth to report.
    fn advance(&self, confirmations: u64) -> u64 {
        let mut progress = self.progress.lock();
        let depth = progress
            .last_known_confirmations
            .map_or(confirmations, |last| last.max(confirmations));
        progress.last_known_confirmations = Some(depth);
        depth
    }

    /// Run `f` unless the monitor was cancelled.
    fn emit(&self, f: impl FnOnce()) {
        let _gate = self.gate.lock();
        if !self.cancelled.load(Ordering::Acquire) {
            f();
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorSet
// ---------------------------------------------------------------------------

/// Active monitors, keyed by transaction hash.
///
/// Only a handful of monitors are ever alive at once, so they are kept in a
/// `Vec` and searched linearly.
#[derive(Clone, Default)]
pub struct MonitorSet {
    entries: Arc<Mutex<Vec<Arc<MonitorControl>>>>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, control: Arc<MonitorControl>) -> Result<(), MonitorError> {
        let tx_hash = control.tx_hash;
        let mut entries = self.entries.lock();
        if entries.iter().any(|c| c.tx_hash == tx_hash) {
            return Err(MonitorError::AlreadyMonitoring(tx_hash));
        }
        entries.push(control);
        Ok(())
    }

    fn remove(&self, control: &Arc<MonitorControl>) {
        self.entries.lock().retain(|c| !Arc::ptr_eq(c, control));
    }

    /// Cancel the monitor for `tx_hash`. Returns `false` if none is active.
    pub fn cancel(&self, tx_hash: TxHash, reason: CancelReason) -> bool {
        let control = {
            let mut entries = self.entries.lock();
            let position = entries.iter().position(|c| c.tx_hash == tx_hash);
            position.map(|i| entries.remove(i))
        };
        match control {
            Some(control) => {
                control.cancel(reason);
                true
            }
            None => false,
        }
    }

    /// Cancel every active monitor and return how many there were.
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        let drained: Vec<_> = self.entries.lock().drain(..).collect();
        for control in &drained {
            control.cancel(reason);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), ?reason, "Cancelled active monitors");
        }
        drained.len()
    }

    pub fn active(&self) -> Vec<MonitorState> {
        self.entries.lock().iter().map(|c| c.state()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// TransactionMonitor
// ---------------------------------------------------------------------------

/// Starts confirmation monitors against one chain.
pub struct TransactionMonitor {
    rpc: Arc<dyn ChainRpc>,
    policy: MonitorPolicy,
    monitors: MonitorSet,
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    control: Arc<MonitorControl>,
    monitors: MonitorSet,
    outcome_rx: oneshot::Receiver<MonitorOutcome>,
    task: JoinHandle<()>,
}

enum Observation {
    Pending,
    Mined { block_number: u64, height: u64 },
    Reverted { block_number: u64 },
}

impl TransactionMonitor {
    pub fn new(rpc: Arc<dyn ChainRpc>, policy: MonitorPolicy, monitors: MonitorSet) -> Self {
        Self {
            rpc,
            policy,
            monitors,
        }
    }

    /// Start monitoring `tx_hash` until it is `min_confirmations` deep.
    pub fn watch<F>(
        &self,
        tx_hash: TxHash,
        min_confirmations: u64,
        on_update: F,
    ) -> Result<MonitorHandle, MonitorError>
    where
        F: Fn(MonitorUpdate) + Send + Sync + 'static,
    {
        let control = MonitorControl::new(tx_hash);
        self.monitors.register(Arc::clone(&control))?;

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let rpc = Arc::clone(&self.rpc);
        let policy = self.policy;
        let monitors = self.monitors.clone();
        let task_control = Arc::clone(&control);

        info!(
            tx_hash = ?tx_hash,
            min_confirmations,
            max_attempts = policy.max_attempts,
            "Monitoring transaction"
        );

        let task = tokio::spawn(async move {
            let outcome = run(rpc, policy, &task_control, min_confirmations, on_update).await;
            monitors.remove(&task_control);
            match outcome {
                MonitorOutcome::Confirmed { confirmations, .. } => {
                    info!(tx_hash = ?tx_hash, confirmations, "Transaction confirmed");
                }
                MonitorOutcome::Reverted { block_number } => {
                    warn!(tx_hash = ?tx_hash, block_number, "Transaction reverted");
                }
                MonitorOutcome::Timeout { attempts, .. } => {
                    warn!(tx_hash = ?tx_hash, attempts, "Confirmation timed out");
                }
                MonitorOutcome::Cancelled(reason) => {
                    info!(tx_hash = ?tx_hash, ?reason, "Monitoring cancelled");
                }
            }
            let _ = outcome_tx.send(outcome);
        });

        Ok(MonitorHandle {
            control,
            monitors: self.monitors.clone(),
            outcome_rx,
            task,
        })
    }
}

async fn run<F>(
    rpc: Arc<dyn ChainRpc>,
    policy: MonitorPolicy,
    control: &MonitorControl,
    min_confirmations: u64,
    on_update: F,
) -> MonitorOutcome
where
    F: Fn(MonitorUpdate),
{
    let tx_hash = control.tx_hash;
    let mut cancel_rx = control.cancel_tx.subscribe();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tokio::select! {
                biased;
                reason = cancelled(&mut cancel_rx) => return MonitorOutcome::Cancelled(reason),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }

        let observation = tokio::select! {
            biased;
            reason = cancelled(&mut cancel_rx) => return MonitorOutcome::Cancelled(reason),
            observation = observe(rpc.as_ref(), tx_hash) => observation,
        };
        control.record_attempt(attempt);

        match observation {
            Ok(Observation::Pending) => {
                debug!(tx_hash = ?tx_hash, attempt, max_attempts, "Receipt not available yet");
                control.emit(|| on_update(MonitorUpdate::Pending {
                    attempt,
                    max_attempts,
                }));
            }
            Ok(Observation::Reverted { block_number }) => {
                return MonitorOutcome::Reverted { block_number };
            }
            Ok(Observation::Mined {
                block_number,
                height,
            }) => {
                let confirmations = control.advance(height.saturating_sub(block_number));
                debug!(
                    tx_hash = ?tx_hash,
                    attempt,
                    confirmations,
                    required = min_confirmations,
                    "Transaction mined"
                );
                control.emit(|| on_update(MonitorUpdate::Confirmations {
                    confirmations,
                    required: min_confirmations,
                    block_number,
                }));
                if confirmations >= min_confirmations {
                    return MonitorOutcome::Confirmed {
                        confirmations,
                        block_number,
                    };
                }
            }
            Err(e) => {
                warn!(tx_hash = ?tx_hash, attempt, error = %e, "Receipt poll failed");
            }
        }
    }

    MonitorOutcome::Timeout {
        attempts: max_attempts,
        last_confirmations: control.state().last_known_confirmations,
    }
}

async fn observe(rpc: &dyn ChainRpc, tx_hash: TxHash) -> Result<Observation, ProviderError> {
    let Some(receipt) = rpc.transaction_receipt(tx_hash).await? else {
        return Ok(Observation::Pending);
    };
    if !receipt.status {
        return Ok(Observation::Reverted {
            block_number: receipt.block_number,
        });
    }
    let height = rpc.block_number().await?;
    Ok(Observation::Mined {
        block_number: receipt.block_number,
        height,
    })
}

/// Resolves once a cancel reason is published.
async fn cancelled(rx: &mut watch::Receiver<Option<CancelReason>>) -> CancelReason {
    loop {
        if let Some(reason) = *rx.borrow_and_update() {
            return reason;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// -- MonitorHandle ------------------------------------------------------

impl MonitorHandle {
    pub fn tx_hash(&self) -> TxHash {
        self.control.tx_hash
    }

    pub fn state(&self) -> MonitorState {
        self.control.state()
    }

    /// Stop monitoring. No update callback fires after this returns.
    pub fn cancel(&self) {
        if !self.monitors.cancel(self.tx_hash(), CancelReason::Requested) {
            self.control.cancel(CancelReason::Requested);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the monitor to settle.
    pub async fn outcome(self) -> MonitorOutcome {
        self.outcome_rx
            .await
            .unwrap_or(MonitorOutcome::Cancelled(CancelReason::Requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{TransactionReceipt, WalletProvider};
    use crate::testing::MockWallet;
    use std::sync::Mutex;
    use std::time::Duration;

    fn receipt(block_number: u64, status: bool) -> TransactionReceipt {
        TransactionReceipt {
            block_number,
            status,
            gas_used: 52_000,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<MonitorUpdate>>>, impl Fn(MonitorUpdate) + Send + Sync + 'static) {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        (updates, move |u| sink.lock().unwrap().push(u))
    }

    fn confirmations(updates: &Mutex<Vec<MonitorUpdate>>) -> Vec<u64> {
        updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                MonitorUpdate::Confirmations { confirmations, .. } => Some(*confirmations),
                MonitorUpdate::Pending { .. } => None,
            })
            .collect()
    }

    fn monitor(wallet: &MockWallet, max_attempts: u32) -> (TransactionMonitor, MonitorSet) {
        let set = MonitorSet::new();
        let policy = MonitorPolicy::new(Duration::from_secs(5), max_attempts);
        (TransactionMonitor::new(wallet.rpc(), policy, set.clone()), set)
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_at_required_depth() {
        let wallet = MockWallet::new(1);
        wallet.set_receipt(Ok(Some(receipt(100, true))));
        wallet.set_heights(vec![100, 105, 112]);
        let (monitor, set) = monitor(&wallet, 60);
        let (updates, on_update) = recorder();

        let handle = monitor.watch(TxHash::repeat_byte(1), 12, on_update).unwrap();
        assert_eq!(set.len(), 1);
        let outcome = handle.outcome().await;

        assert_eq!(
            outcome,
            MonitorOutcome::Confirmed {
                confirmations: 12,
                block_number: 100
            }
        );
        assert_eq!(confirmations(&updates), vec![0, 5, 12]);
        assert_eq!(wallet.count("eth_getTransactionReceipt"), 3);
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmations_never_decrease() {
        let wallet = MockWallet::new(1);
        wallet.set_receipt(Ok(Some(receipt(100, true))));
        wallet.set_heights(vec![110, 108, 111]);
        let (monitor, _set) = monitor(&wallet, 60);
        let (updates, on_update) = recorder();

        let handle = monitor.watch(TxHash::repeat_byte(2), 11, on_update).unwrap();
        handle.outcome().await;
        assert_eq!(confirmations(&updates), vec![10, 10, 11]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_exactly_once() {
        let wallet = MockWallet::new(1);
        let (monitor, set) = monitor(&wallet, 4);
        let (updates, on_update) = recorder();

        let handle = monitor.watch(TxHash::repeat_byte(3), 3, on_update).unwrap();
        let outcome = handle.outcome().await;
        assert_eq!(
            outcome,
            MonitorOutcome::Timeout {
                attempts: 4,
                last_confirmations: None
            }
        );
        assert_eq!(updates.lock().unwrap().len(), 4);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(wallet.count("eth_getTransactionReceipt"), 4);
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_polls_count_toward_budget() {
        let wallet = MockWallet::new(1);
        wallet.set_receipt(Err(ProviderError::Transport("connection reset".into())));
        let (monitor, _set) = monitor(&wallet, 3);
        let (updates, on_update) = recorder();

        let handle = monitor.watch(TxHash::repeat_byte(4), 1, on_update).unwrap();
        assert!(matches!(
            handle.outcome().await,
            MonitorOutcome::Timeout { attempts: 3, .. }
        ));
        assert!(updates.lock().unwrap().is_empty());
        assert_eq!(wallet.count("eth_getTransactionReceipt"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_receipt_settles_immediately() {
        let wallet = MockWallet::new(1);
        wallet.set_receipt(Ok(Some(receipt(90, false))));
        let (monitor, _set) = monitor(&wallet, 60);

        let handle = monitor.watch(TxHash::repeat_byte(5), 12, |_| {}).unwrap();
        assert_eq!(
            handle.outcome().await,
            MonitorOutcome::Reverted { block_number: 90 }
        );
        assert_eq!(wallet.count("eth_blockNumber"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_updates_after_cancel() {
        let wallet = MockWallet::new(1);
        let (monitor, set) = monitor(&wallet, 60);
        let (updates, on_update) = recorder();

        let handle = monitor.watch(TxHash::repeat_byte(6), 12, on_update).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(updates.lock().unwrap().len(), 1);

        handle.cancel();
        assert!(set.is_empty());
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(updates.lock().unwrap().len(), 1);
        assert_eq!(wallet.count("eth_getTransactionReceipt"), 1);
        assert_eq!(
            handle.outcome().await,
            MonitorOutcome::Cancelled(CancelReason::Requested)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_update_callback() {
        let wallet = MockWallet::new(1);
        let (monitor, set) = monitor(&wallet, 60);
        let tx_hash = TxHash::repeat_byte(9);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let inner = set.clone();
        let handle = monitor
            .watch(tx_hash, 12, move |_| {
                let active = inner.active().len();
                let cancelled = inner.cancel(tx_hash, CancelReason::Requested);
                sink.lock().unwrap().push((active, cancelled, inner.len()));
            })
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(30), handle.outcome())
            .await
            .unwrap();
        assert_eq!(outcome, MonitorOutcome::Cancelled(CancelReason::Requested));
        assert_eq!(*seen.lock().unwrap(), vec![(1, true, 0)]);
        assert_eq!(wallet.count("eth_getTransactionReceipt"), 1);
        assert!(set.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_and_duplicates() {
        let wallet = MockWallet::new(1);
        let (monitor, set) = monitor(&wallet, 60);

        let first = monitor.watch(TxHash::repeat_byte(7), 12, |_| {}).unwrap();
        let second = monitor.watch(TxHash::repeat_byte(8), 12, |_| {}).unwrap();
        assert_eq!(
            monitor.watch(TxHash::repeat_byte(7), 12, |_| {}).err(),
            Some(MonitorError::AlreadyMonitoring(TxHash::repeat_byte(7)))
        );
        assert_eq!(set.active().len(), 2);

        assert_eq!(set.cancel_all(CancelReason::ChainChanged), 2);
        assert_eq!(
            first.outcome().await,
            MonitorOutcome::Cancelled(CancelReason::ChainChanged)
        );
        assert_eq!(
            second.outcome().await,
            MonitorOutcome::Cancelled(CancelReason::ChainChanged)
        );
    }
}
