//! Live tracking of attached serial devices.
//!
//! Device availability changes underneath the user at any time, so a single
//! watcher thread owns the port table and applies attach/detach events from a
//! bounded channel in the order they arrive. Everybody else reads cloned
//! [`PortSnapshot`]s.
//!
//! ```text
//!  PollingBoardEvents ──┐
//!                       ├── SyncSender<PortEvent> ──> PortWatcher::watch ──> on_change
//!  UI port selection ───┘                                   │
//!                                                           └──> ReadyState::port_selected
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, trace};

use crate::device::{self, DetectedPort};
use crate::readiness::ReadyState;

/// Capacity of the event channel between sources and the watcher.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Default interval between port scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A change in the set of attached devices, or a user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// A device appeared.
    Attached(DetectedPort),
    /// The device at this address disappeared.
    Detached(String),
    /// The user picked this address as the flash target.
    Selected(String),
}

/// Ports currently attached and the flash target among them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSnapshot {
    /// Attached ports by address.
    pub ports: BTreeMap<String, DetectedPort>,
    /// Address of the current port, always a key of `ports`.
    pub current: Option<String>,
}

impl PortSnapshot {
    /// The current port's metadata.
    pub fn current_port(&self) -> Option<&DetectedPort> {
        self.current
            .as_ref()
            .and_then(|addr| self.ports.get(addr))
    }

    /// Attached addresses in sorted order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.ports
            .keys()
            .map(String::as_str)
    }

    /// Apply one event. Returns whether anything changed.
    pub fn apply(&mut self, event: &PortEvent) -> bool {
        match event {
            PortEvent::Attached(port) => {
                let previous = self
                    .ports
                    .insert(port.name.clone(), port.clone());
                let changed = previous.as_ref() != Some(port)
                    || self.current.as_deref() != Some(port.name.as_str());
                self.current = Some(port.name.clone());
                changed
            },
            PortEvent::Detached(addr) => {
                if self
                    .ports
                    .remove(addr)
                    .is_none()
                {
                    return false;
                }
                if self.current.as_deref() == Some(addr.as_str()) {
                    self.current = self
                        .ports
                        .keys()
                        .next()
                        .cloned();
                }
                true
            },
            PortEvent::Selected(addr) => {
                if !self.ports.contains_key(addr) || self.current.as_deref() == Some(addr.as_str()) {
                    return false;
                }
                self.current = Some(addr.clone());
                true
            },
        }
    }
}

/// Read access to the watcher's port table.
#[derive(Debug, Clone, Default)]
pub struct PortsHandle {
    table: Arc<Mutex<PortSnapshot>>,
}

impl PortsHandle {
    /// Copy of the current table.
    pub fn snapshot(&self) -> PortSnapshot {
        self.lock().clone()
    }

    /// Address of the current port.
    pub fn current(&self) -> Option<String> {
        self.lock()
            .current
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, PortSnapshot> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of the port table.
#[derive(Debug)]
pub struct PortWatcher {
    handle: PortsHandle,
    ready: Arc<ReadyState>,
}

impl PortWatcher {
    /// Create a watcher that publishes port selection into `ready`.
    pub fn new(ready: Arc<ReadyState>) -> Self {
        ready.set_port_selected(false);
        Self {
            handle: PortsHandle::default(),
            ready,
        }
    }

    /// Reader handle, cheap to clone.
    pub fn handle(&self) -> PortsHandle {
        self.handle.clone()
    }

    /// Apply a single event and publish the resulting selection.
    pub fn apply(&self, event: &PortEvent) -> PortSnapshot {
        let snapshot = {
            let mut table = self.handle.lock();
            if table.apply(event) {
                trace!("Applied {event:?}");
            }
            table.clone()
        };
        self.ready
            .set_port_selected(snapshot.current.is_some());
        snapshot
    }

    /// Consume events until every sender is dropped.
    ///
    /// `on_change` runs after each event with the updated table; the
    /// PortSelected flag is published right after it.
    pub fn watch<F>(&self, events: &Receiver<PortEvent>, mut on_change: F)
    where
        F: FnMut(&PortSnapshot),
    {
        for event in events {
            match &event {
                PortEvent::Attached(port) => info!("Port attached: {}", port.name),
                PortEvent::Detached(addr) => info!("Port detached: {addr}"),
                PortEvent::Selected(addr) => debug!("Port selected: {addr}"),
            }

            let snapshot = {
                let mut table = self.handle.lock();
                table.apply(&event);
                table.clone()
            };
            on_change(&snapshot);
            self.ready
                .set_port_selected(snapshot.current.is_some());
        }
        debug!("Port event source closed");
    }
}

/// Diff two scans into attach/detach events.
///
/// Detaches come first so a device that re-enumerates under the same name
/// in one interval is still reported as fresh.
pub fn diff_scans(previous: &BTreeSet<String>, current: &[DetectedPort]) -> Vec<PortEvent> {
    let present: BTreeSet<&str> = current
        .iter()
        .map(|p| p.name.as_str())
        .collect();

    let mut events: Vec<PortEvent> = previous
        .iter()
        .filter(|addr| !present.contains(addr.as_str()))
        .map(|addr| PortEvent::Detached(addr.clone()))
        .collect();

    events.extend(
        current
            .iter()
            .filter(|p| !previous.contains(&p.name))
            .cloned()
            .map(PortEvent::Attached),
    );
    events
}

/// One scan of the ports attached right now, as attach events.
pub fn scan_events() -> Vec<PortEvent> {
    diff_scans(&BTreeSet::new(), &device::detect_ports())
}

/// Attach/detach source backed by periodic serial port enumeration.
#[derive(Debug, Clone)]
pub struct PollingBoardEvents {
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Default for PollingBoardEvents {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl PollingBoardEvents {
    /// Poll every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the polling loop when set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Scan until stopped or until the receiver goes away.
    ///
    /// The first scan reports every present port as attached.
    pub fn run(&self, events: &SyncSender<PortEvent>) {
        let mut known = BTreeSet::new();

        while !self.stop.load(Ordering::Relaxed) {
            let scan = device::detect_ports();
            for event in diff_scans(&known, &scan) {
                if events.send(event).is_err() {
                    debug!("Port watcher gone, stopping scan");
                    return;
                }
            }
            known = scan
                .into_iter()
                .map(|p| p.name)
                .collect();
            thread::sleep(self.interval);
        }
    }

    /// Spawn [`run`](Self::run) on its own thread.
    pub fn spawn(self, events: SyncSender<PortEvent>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run(&events))
    }
}

/// Forward a user selection without blocking the caller.
///
/// Returns false when the watcher is gone or its queue is full.
pub fn request_selection(events: &SyncSender<PortEvent>, address: &str) -> bool {
    match events.try_send(PortEvent::Selected(address.to_string())) {
        Ok(()) => true,
        Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn attach(addr: &str) -> PortEvent {
        PortEvent::Attached(DetectedPort::bare(addr))
    }

    fn detach(addr: &str) -> PortEvent {
        PortEvent::Detached(addr.to_string())
    }

    fn check_invariant(snapshot: &PortSnapshot) {
        if let Some(current) = &snapshot.current {
            assert!(snapshot.ports.contains_key(current), "{current} not tracked");
        }
    }

    #[test]
    fn test_attach_selects_newest_port() {
        let mut table = PortSnapshot::default();
        table.apply(&attach("COM3"));
        table.apply(&attach("COM5"));

        assert_eq!(table.current.as_deref(), Some("COM5"));
        assert_eq!(table.addresses().collect::<Vec<_>>(), vec!["COM3", "COM5"]);
    }

    #[test]
    fn test_duplicate_attach_is_idempotent() {
        let mut table = PortSnapshot::default();
        assert!(table.apply(&attach("COM3")));
        assert!(!table.apply(&attach("COM3")));
        assert_eq!(table.ports.len(), 1);
    }

    #[test]
    fn test_detach_unknown_port_is_noop() {
        let mut table = PortSnapshot::default();
        table.apply(&attach("COM3"));
        assert!(!table.apply(&detach("COM9")));
        assert_eq!(table.current.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_detach_non_current_keeps_selection() {
        let mut table = PortSnapshot::default();
        table.apply(&attach("COM3"));
        table.apply(&attach("COM4"));
        table.apply(&detach("COM3"));
        assert_eq!(table.current.as_deref(), Some("COM4"));
    }

    #[test]
    fn test_detach_current_picks_smallest_remaining() {
        let mut table = PortSnapshot::default();
        table.apply(&attach("COM7"));
        table.apply(&attach("COM4"));
        table.apply(&attach("COM9"));
        table.apply(&detach("COM9"));
        assert_eq!(table.current.as_deref(), Some("COM4"));

        table.apply(&detach("COM4"));
        assert_eq!(table.current.as_deref(), Some("COM7"));

        table.apply(&detach("COM7"));
        assert!(table.current.is_none());
        assert!(table.ports.is_empty());
    }

    #[test]
    fn test_select_requires_tracked_port() {
        let mut table = PortSnapshot::default();
        table.apply(&attach("COM3"));
        table.apply(&attach("COM4"));

        assert!(table.apply(&PortEvent::Selected("COM3".into())));
        assert_eq!(table.current.as_deref(), Some("COM3"));

        assert!(!table.apply(&PortEvent::Selected("COM8".into())));
        assert_eq!(table.current.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_replay_matches_attached_set() {
        // Deterministic pseudo-random event sequences over a small address pool.
        let pool = ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2", "/dev/ttyACM0"];
        let mut seed: u32 = 0x2545_F491;

        for _ in 0..50 {
            let mut table = PortSnapshot::default();
            let mut attached = BTreeSet::new();

            for _ in 0..40 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let addr = pool[(seed % 4) as usize];
                let before = table.current.clone();

                if seed & 0x100 == 0 {
                    table.apply(&attach(addr));
                    attached.insert(addr.to_string());
                    assert_eq!(table.current.as_deref(), Some(addr));
                } else {
                    table.apply(&detach(addr));
                    attached.remove(addr);
                    if before.as_deref() != Some(addr) {
                        assert_eq!(table.current, before, "non-current detach moved selection");
                    } else if !attached.is_empty() {
                        assert!(table.current.is_some());
                    }
                }

                check_invariant(&table);
                assert_eq!(
                    table.ports.keys().cloned().collect::<BTreeSet<_>>(),
                    attached
                );
                assert_eq!(table.current.is_some(), !attached.is_empty());
            }
        }
    }

    #[test]
    fn test_watch_applies_events_in_order_and_publishes_selection() {
        let ready = Arc::new(ReadyState::default());
        let watcher = PortWatcher::new(Arc::clone(&ready));
        let handle = watcher.handle();
        let (tx, rx) = sync_channel(EVENT_QUEUE_DEPTH);

        tx.send(attach("COM3")).unwrap();
        tx.send(attach("COM4")).unwrap();
        tx.send(detach("COM4")).unwrap();
        tx.send(detach("COM3")).unwrap();
        drop(tx);

        let mut seen = Vec::new();
        watcher.watch(&rx, |snapshot| seen.push(snapshot.current.clone()));

        assert_eq!(
            seen,
            vec![
                Some("COM3".to_string()),
                Some("COM4".to_string()),
                Some("COM3".to_string()),
                None
            ]
        );
        assert!(handle.snapshot().ports.is_empty());
        assert!(!ready.snapshot().port_selected);
    }

    #[test]
    fn test_watcher_apply_sets_port_selected() {
        let ready = Arc::new(ReadyState::default());
        let watcher = PortWatcher::new(Arc::clone(&ready));

        watcher.apply(&attach("/dev/ttyUSB0"));
        assert!(ready.snapshot().port_selected);
        assert_eq!(watcher.handle().current().as_deref(), Some("/dev/ttyUSB0"));

        watcher.apply(&detach("/dev/ttyUSB0"));
        assert!(!ready.snapshot().port_selected);
    }

    #[test]
    fn test_diff_scans() {
        let previous: BTreeSet<String> = ["COM1", "COM2"].iter().map(ToString::to_string).collect();
        let current = vec![DetectedPort::bare("COM2"), DetectedPort::bare("COM3")];

        assert_eq!(
            diff_scans(&previous, &current),
            vec![detach("COM1"), attach("COM3")]
        );
        assert!(diff_scans(&BTreeSet::new(), &[]).is_empty());
    }

    #[test]
    fn test_scan_events_only_attaches() {
        let events = scan_events();
        assert!(
            events
                .iter()
                .all(|event| matches!(event, PortEvent::Attached(_)))
        );

        let mut snapshot = PortSnapshot::default();
        for event in &events {
            snapshot.apply(event);
        }
        assert_eq!(snapshot.ports.len(), events.len());
    }

    #[test]
    fn test_request_selection_reports_closed_watcher() {
        let (tx, rx) = sync_channel(1);
        assert!(request_selection(&tx, "COM3"));
        assert!(!request_selection(&tx, "COM4"));
        drop(rx);
        assert!(!request_selection(&tx, "COM5"));
    }

    #[test]
    fn test_polling_stops_when_receiver_dropped() {
        let (tx, rx) = sync_channel(EVENT_QUEUE_DEPTH);
        let poller = PollingBoardEvents::new(Duration::from_millis(5));
        let stop = poller.stop_flag();
        let worker = poller.spawn(tx);
        drop(rx);
        stop.store(true, Ordering::Relaxed);
        worker.join().unwrap();
    }
}
