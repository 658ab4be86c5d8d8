//! Bluetooth pairing orchestration.
//!
//! Two entry points share one session state machine:
//!
//! - **USB-assisted**: a control frame sent over the serial connection puts
//!   the radio into pairing/advertising mode, the PIN arrives over the same
//!   serial stream (or is typed in manually when the firmware never echoes
//!   one), the now-advertising radio is discovered over BLE and Classic in
//!   parallel, and bonding is initiated over the transport the radio was
//!   found on.
//! - **Direct**: bonding is initiated against an already-known address, with
//!   a bounded wait for the platform to start the handshake and a BLE
//!   reconnect-scan fallback when it never does.
//!
//! At most one session is active at a time; starting a new one cancels and
//! fully tears down the previous session first. Every exit path, including
//! cancellation, releases the serial connection and any scan handles before
//! the terminal phase is published.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rnodekit_types::{BondState, TransportType};

use crate::error::Error;
use crate::kiss::{BT_CTRL_PAIR, bt_ctrl_frame};
use crate::serial::SerialBridge;
use crate::transport::{BluetoothApi, BondStream, ScanFilter, ScanStream};

/// Per-phase timeouts for a pairing session.
///
/// The defaults are tuned against shipping RNode firmware; board revisions
/// vary, so embedders can override any of them.
#[derive(Debug, Clone)]
pub struct PairingTimeouts {
    /// How long to wait for the radio to echo a PIN over serial before
    /// falling back to manual entry.
    pub pin_wait: Duration,
    /// Bound on manual PIN entry. `None` leaves the session waiting at the
    /// user's pace.
    pub manual_pin: Option<Duration>,
    /// Window for the parallel BLE + Classic discovery of the
    /// now-advertising radio.
    pub discovery_window: Duration,
    /// Direct path: how long to wait for the bond state to leave `None`.
    pub pairing_start: Duration,
    /// How long to wait for a terminal bond state once bonding started.
    pub bonding: Duration,
    /// Direct path: window for the BLE reconnect-scan fallback.
    pub reconnect_scan: Duration,
}

impl Default for PairingTimeouts {
    fn default() -> Self {
        Self {
            pin_wait: Duration::from_secs(3),
            manual_pin: None,
            discovery_window: Duration::from_secs(20),
            pairing_start: Duration::from_secs(5),
            bonding: Duration::from_secs(60),
            reconnect_scan: Duration::from_secs(10),
        }
    }
}

/// Observable phase of the active pairing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingPhase {
    /// No session active.
    Idle,
    /// Opening the serial port and writing the pairing-mode control frame.
    SendingControlFrame,
    /// Waiting for the radio to echo its PIN over serial.
    AwaitingPin,
    /// No PIN arrived over serial; waiting for the user to type one.
    ManualPinEntry,
    /// PIN known; waiting for the discovery race to produce the target.
    DiscoveringTarget,
    /// Bonding initiated; waiting for a terminal bond state.
    Bonding,
    /// Session finished.
    Resolved(PairingOutcome),
}

/// Terminal result of a pairing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The target reached the bonded state.
    Success,
    /// The session failed for a specific reason.
    Failure(PairingFailure),
}

/// Why a pairing session failed. Specific enough for user-facing messaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingFailure {
    /// The radio never entered pairing mode or was never discovered.
    NoResponse,
    /// The bond state fell back from bonding, meaning the PIN was wrong or
    /// the request was rejected on the remote side.
    PinRejected,
    /// A bounded phase elapsed without resolution.
    Timeout,
    /// A serial or platform I/O error.
    Io(String),
    /// The session was cancelled or superseded.
    Cancelled,
    /// The platform refused a required permission.
    PermissionDenied,
}

/// The discovered-but-unbonded radio a session will bond with.
///
/// Cached as soon as the discovery race produces it, independent of PIN
/// arrival, and consumed once the PIN is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundTarget {
    /// Bluetooth address to bond with.
    pub address: String,
    /// Device name, if advertised.
    pub name: Option<String>,
    /// Transport the target was discovered on.
    pub transport: TransportType,
}

struct ActiveSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    pin_entry: mpsc::Sender<String>,
}

/// Drives pairing sessions over the platform Bluetooth and serial bridges.
pub struct PairingOrchestrator<B, S> {
    bluetooth: Arc<B>,
    serial: Arc<S>,
    timeouts: PairingTimeouts,
    phase_tx: watch::Sender<PairingPhase>,
    session: Mutex<Option<ActiveSession>>,
}

impl<B, S> PairingOrchestrator<B, S>
where
    B: BluetoothApi + 'static,
    S: SerialBridge + 'static,
{
    /// Create an orchestrator with the default timeouts.
    pub fn new(bluetooth: Arc<B>, serial: Arc<S>) -> Self {
        Self::with_timeouts(bluetooth, serial, PairingTimeouts::default())
    }

    /// Create an orchestrator with custom timeouts.
    pub fn with_timeouts(bluetooth: Arc<B>, serial: Arc<S>, timeouts: PairingTimeouts) -> Self {
        let (phase_tx, _) = watch::channel(PairingPhase::Idle);
        Self {
            bluetooth,
            serial,
            timeouts,
            phase_tx,
            session: Mutex::new(None),
        }
    }

    /// Current phase of the active (or last) session.
    #[must_use]
    pub fn phase(&self) -> PairingPhase {
        self.phase_tx.borrow().clone()
    }

    /// Subscribe to phase transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PairingPhase> {
        self.phase_tx.subscribe()
    }

    /// Start a USB-assisted pairing session against the radio on `port`.
    ///
    /// Any active session is cancelled and fully torn down first.
    pub async fn start_usb_assisted(&self, port: &str) {
        let mut guard = self.session.lock().await;
        teardown_session(&mut guard).await;

        let cancel = CancellationToken::new();
        let (pin_entry, pin_entry_rx) = mpsc::channel(1);
        let handle = tokio::spawn(drive_usb_assisted(
            Arc::clone(&self.bluetooth),
            Arc::clone(&self.serial),
            self.timeouts.clone(),
            self.phase_tx.clone(),
            cancel.clone(),
            pin_entry_rx,
            port.to_string(),
        ));
        *guard = Some(ActiveSession {
            cancel,
            handle,
            pin_entry,
        });
    }

    /// Start a direct pairing session against a known address.
    ///
    /// Any active session is cancelled and fully torn down first. The PIN,
    /// when known up front, is bound to the address before bonding.
    pub async fn start_direct(
        &self,
        address: &str,
        name: Option<&str>,
        transport: TransportType,
        pin: Option<&str>,
    ) {
        let mut guard = self.session.lock().await;
        teardown_session(&mut guard).await;

        let target = FoundTarget {
            address: address.to_string(),
            name: name.map(str::to_string),
            transport,
        };
        let cancel = CancellationToken::new();
        // Direct sessions take no manual PIN; the dropped receiver makes
        // submit_pin report false.
        let (pin_entry, _unused) = mpsc::channel(1);
        let handle = tokio::spawn(drive_direct(
            Arc::clone(&self.bluetooth),
            self.timeouts.clone(),
            self.phase_tx.clone(),
            cancel.clone(),
            target,
            pin.map(str::to_string),
        ));
        *guard = Some(ActiveSession {
            cancel,
            handle,
            pin_entry,
        });
    }

    /// Deliver a manually entered PIN to the active session. Returns false
    /// when no session is waiting for one.
    pub async fn submit_pin(&self, pin: &str) -> bool {
        let guard = self.session.lock().await;
        match guard.as_ref() {
            Some(session) => session.pin_entry.send(pin.to_string()).await.is_ok(),
            None => false,
        }
    }

    /// Cancel the active session and wait for its teardown to finish.
    pub async fn cancel(&self) {
        let mut guard = self.session.lock().await;
        teardown_session(&mut guard).await;
    }

    /// Wait for the current session to reach a terminal outcome.
    pub async fn wait_for_outcome(&self) -> PairingOutcome {
        let mut rx = self.phase_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let PairingPhase::Resolved(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return PairingOutcome::Failure(PairingFailure::Cancelled);
            }
        }
    }
}

async fn teardown_session(slot: &mut Option<ActiveSession>) {
    if let Some(session) = slot.take() {
        session.cancel.cancel();
        if session.handle.await.is_err() {
            warn!("Pairing task panicked during teardown");
        }
    }
}

fn set_phase(phase_tx: &watch::Sender<PairingPhase>, phase: PairingPhase) {
    debug!("Pairing phase: {phase:?}");
    phase_tx.send_replace(phase);
}

fn failure_from(error: Error) -> PairingFailure {
    match error {
        Error::PermissionDenied { .. } => PairingFailure::PermissionDenied,
        Error::Timeout { .. } => PairingFailure::Timeout,
        Error::PinRejected => PairingFailure::PinRejected,
        Error::Cancelled => PairingFailure::Cancelled,
        Error::DeviceNotFound { .. } => PairingFailure::NoResponse,
        other => PairingFailure::Io(other.to_string()),
    }
}

/// Initiate bonding, preferring explicit transport selection and falling
/// back to the platform default when the backend does not support it.
pub async fn initiate_bond<B: BluetoothApi + ?Sized>(
    bluetooth: &B,
    address: &str,
    transport: TransportType,
) -> crate::error::Result<BondStream> {
    if transport != TransportType::Unknown {
        match bluetooth.bond_with_transport(address, transport).await {
            Ok(stream) => return Ok(stream),
            Err(Error::NotSupported { .. }) => {
                debug!("Transport-selected bonding unavailable, using platform default");
            }
            Err(error) => return Err(error),
        }
    }
    bluetooth.bond(address).await
}

async fn drive_usb_assisted<B, S>(
    bluetooth: Arc<B>,
    serial: Arc<S>,
    timeouts: PairingTimeouts,
    phase_tx: watch::Sender<PairingPhase>,
    cancel: CancellationToken,
    pin_entry: mpsc::Receiver<String>,
    port: String,
) where
    B: BluetoothApi + 'static,
    S: SerialBridge + 'static,
{
    set_phase(&phase_tx, PairingPhase::SendingControlFrame);

    // Subscribe before the frame goes out so an immediate echo is not lost.
    let pin_rx = serial.take_pin_receiver();

    if let Err(error) = serial.connect(&port).await {
        let failure = failure_from(error);
        set_phase(&phase_tx, PairingPhase::Resolved(PairingOutcome::Failure(failure)));
        return;
    }

    let frame = bt_ctrl_frame(BT_CTRL_PAIR);
    match serial.write(&frame).await {
        Ok(written) if written == frame.len() => {}
        Ok(written) => {
            serial.disconnect().await;
            let error = Error::ShortWrite {
                expected: frame.len(),
                written,
            };
            set_phase(
                &phase_tx,
                PairingPhase::Resolved(PairingOutcome::Failure(failure_from(error))),
            );
            return;
        }
        Err(error) => {
            serial.disconnect().await;
            set_phase(
                &phase_tx,
                PairingPhase::Resolved(PairingOutcome::Failure(failure_from(error))),
            );
            return;
        }
    }

    // Pairing-mode advertising windows are short, so the discovery race
    // starts now instead of after the PIN is known.
    let (found_tx, found_rx) = watch::channel(None::<FoundTarget>);
    let discovery_cancel = cancel.child_token();
    let discovery = tokio::spawn(discover_target(
        Arc::clone(&bluetooth),
        discovery_cancel.clone(),
        found_tx,
        timeouts.discovery_window,
    ));
    let discovery_deadline = Instant::now() + timeouts.discovery_window;

    let outcome = usb_phases(
        bluetooth.as_ref(),
        &timeouts,
        &phase_tx,
        &cancel,
        pin_rx,
        pin_entry,
        found_rx,
        discovery_deadline,
    )
    .await;

    // Full teardown on every exit: scans released, serial released, only
    // then the terminal phase.
    discovery_cancel.cancel();
    if discovery.await.is_err() {
        warn!("Discovery task panicked");
    }
    serial.disconnect().await;
    set_phase(&phase_tx, PairingPhase::Resolved(outcome));
}

#[allow(clippy::too_many_arguments)]
async fn usb_phases<B: BluetoothApi>(
    bluetooth: &B,
    timeouts: &PairingTimeouts,
    phase_tx: &watch::Sender<PairingPhase>,
    cancel: &CancellationToken,
    pin_rx: oneshot::Receiver<String>,
    mut pin_entry: mpsc::Receiver<String>,
    mut found_rx: watch::Receiver<Option<FoundTarget>>,
    discovery_deadline: Instant,
) -> PairingOutcome {
    set_phase(phase_tx, PairingPhase::AwaitingPin);
    let received = tokio::select! {
        _ = cancel.cancelled() => return PairingOutcome::Failure(PairingFailure::Cancelled),
        echoed = pin_rx => echoed.ok(),
        _ = sleep(timeouts.pin_wait) => None,
    };

    let pin = match received {
        Some(pin) => {
            info!("PIN received over serial");
            pin
        }
        None => {
            // Some firmware never echoes the PIN over serial; the radio
            // shows it on its display instead and the user types it in.
            set_phase(phase_tx, PairingPhase::ManualPinEntry);
            let entered = match timeouts.manual_pin {
                Some(limit) => tokio::select! {
                    _ = cancel.cancelled() => return PairingOutcome::Failure(PairingFailure::Cancelled),
                    entry = pin_entry.recv() => entry,
                    _ = sleep(limit) => return PairingOutcome::Failure(PairingFailure::Timeout),
                },
                None => tokio::select! {
                    _ = cancel.cancelled() => return PairingOutcome::Failure(PairingFailure::Cancelled),
                    entry = pin_entry.recv() => entry,
                },
            };
            match entered {
                Some(pin) => pin,
                None => return PairingOutcome::Failure(PairingFailure::Cancelled),
            }
        }
    };

    set_phase(phase_tx, PairingPhase::DiscoveringTarget);
    let cached = found_rx.borrow().clone();
    let target = match cached {
        // Found while the PIN was pending; no second discovery pass.
        Some(target) => target,
        None => tokio::select! {
            _ = cancel.cancelled() => return PairingOutcome::Failure(PairingFailure::Cancelled),
            waited = timeout_at(discovery_deadline, found_rx.wait_for(|t| t.is_some())) => {
                match waited {
                    Ok(Ok(found)) => match (*found).clone() {
                        Some(target) => target,
                        None => return PairingOutcome::Failure(PairingFailure::NoResponse),
                    },
                    // Window elapsed or the discovery task ended empty.
                    _ => return PairingOutcome::Failure(PairingFailure::NoResponse),
                }
            }
        },
    };
    info!(
        "Pairing target found: {} over {}",
        target.address,
        target.transport.as_str()
    );

    // The PIN binds to this address only, so a second radio in range
    // cannot consume it.
    if let Err(error) = bluetooth.set_pin(&target.address, &pin).await {
        return PairingOutcome::Failure(failure_from(error));
    }

    set_phase(phase_tx, PairingPhase::Bonding);
    let mut bond = match initiate_bond(bluetooth, &target.address, target.transport).await {
        Ok(stream) => stream,
        Err(error) => return PairingOutcome::Failure(failure_from(error)),
    };
    await_bond_resolution(&mut bond, timeouts.bonding, cancel, false).await
}

/// Race BLE and Classic discovery for the first unbonded matching radio.
/// The winner's transport is recorded on the target; both scans are stopped
/// on every exit path.
async fn discover_target<B: BluetoothApi>(
    bluetooth: Arc<B>,
    cancel: CancellationToken,
    found_tx: watch::Sender<Option<FoundTarget>>,
    window: Duration,
) {
    let filter = ScanFilter::rnode();
    let mut ble = match bluetooth.start_ble_scan(filter.clone()).await {
        Ok(stream) => Some(stream),
        Err(error) => {
            warn!("BLE discovery unavailable during pairing: {error}");
            None
        }
    };
    let mut classic = match bluetooth.start_classic_discovery().await {
        Ok(stream) => Some(stream),
        Err(error) => {
            warn!("Classic discovery unavailable during pairing: {error}");
            None
        }
    };
    let ble_open = ble.is_some();
    let classic_open = classic.is_some();

    if ble_open || classic_open {
        let deadline = sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = cancel.cancelled() => break,
                hit = next_hit(&mut ble) => {
                    if !hit.bonded && filter.name_matches(hit.name.as_deref()) {
                        let _ = found_tx.send(Some(FoundTarget {
                            address: hit.address,
                            name: hit.name,
                            transport: TransportType::Ble,
                        }));
                        break;
                    }
                }
                hit = next_hit(&mut classic) => {
                    if !hit.bonded && filter.name_matches(hit.name.as_deref()) {
                        let _ = found_tx.send(Some(FoundTarget {
                            address: hit.address,
                            name: hit.name,
                            transport: TransportType::Classic,
                        }));
                        break;
                    }
                }
            }
        }
    }

    if ble_open {
        bluetooth.stop_ble_scan().await;
    }
    if classic_open {
        bluetooth.cancel_classic_discovery().await;
    }
}

/// Next hit from an optional stream; pends forever when the stream is
/// absent or exhausted so the sibling select branches keep running.
async fn next_hit(stream: &mut Option<ScanStream>) -> crate::transport::ScanHit {
    match stream {
        Some(active) => match active.next().await {
            Some(hit) => hit,
            None => {
                *stream = None;
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}

async fn drive_direct<B: BluetoothApi + 'static>(
    bluetooth: Arc<B>,
    timeouts: PairingTimeouts,
    phase_tx: watch::Sender<PairingPhase>,
    cancel: CancellationToken,
    target: FoundTarget,
    pin: Option<String>,
) {
    let outcome = direct_phases(
        bluetooth.as_ref(),
        &timeouts,
        &phase_tx,
        &cancel,
        &target,
        pin.as_deref(),
    )
    .await;
    set_phase(&phase_tx, PairingPhase::Resolved(outcome));
}

async fn direct_phases<B: BluetoothApi>(
    bluetooth: &B,
    timeouts: &PairingTimeouts,
    phase_tx: &watch::Sender<PairingPhase>,
    cancel: &CancellationToken,
    target: &FoundTarget,
    pin: Option<&str>,
) -> PairingOutcome {
    if let Some(pin) = pin {
        if let Err(error) = bluetooth.set_pin(&target.address, pin).await {
            return PairingOutcome::Failure(failure_from(error));
        }
    }

    set_phase(phase_tx, PairingPhase::Bonding);
    let mut bond = match initiate_bond(bluetooth, &target.address, target.transport).await {
        Ok(stream) => stream,
        Err(error) => return PairingOutcome::Failure(failure_from(error)),
    };

    // Phase 1: bounded wait for the platform to leave the unbonded state,
    // confirming the target actually entered pairing mode.
    match wait_for_start(&mut bond, timeouts.pairing_start, cancel).await {
        StartOutcome::Reached(BondState::Bonded) => return PairingOutcome::Success,
        StartOutcome::Reached(_) => {}
        StartOutcome::Cancelled => return PairingOutcome::Failure(PairingFailure::Cancelled),
        StartOutcome::Silent => {
            if target.transport != TransportType::Ble {
                return PairingOutcome::Failure(PairingFailure::NoResponse);
            }
            // BLE radios drop advertising briefly after a cold boot; a
            // reconnect-scan by name gives them one more chance.
            debug!("Bond state never left none, running reconnect scan");
            if !reconnect_scan(bluetooth, target, timeouts.reconnect_scan, cancel).await {
                return PairingOutcome::Failure(PairingFailure::NoResponse);
            }
            bond = match initiate_bond(bluetooth, &target.address, target.transport).await {
                Ok(stream) => stream,
                Err(error) => return PairingOutcome::Failure(failure_from(error)),
            };
            match wait_for_start(&mut bond, timeouts.pairing_start, cancel).await {
                StartOutcome::Reached(BondState::Bonded) => return PairingOutcome::Success,
                StartOutcome::Reached(_) => {}
                StartOutcome::Cancelled => {
                    return PairingOutcome::Failure(PairingFailure::Cancelled);
                }
                StartOutcome::Silent => {
                    return PairingOutcome::Failure(PairingFailure::NoResponse);
                }
            }
        }
    }

    // Phase 2: bounded wait for a terminal bond state. Bonding was already
    // observed, so a fall back to none counts as a rejection.
    await_bond_resolution(&mut bond, timeouts.bonding, cancel, true).await
}

enum StartOutcome {
    Reached(BondState),
    Silent,
    Cancelled,
}

async fn wait_for_start(
    bond: &mut BondStream,
    limit: Duration,
    cancel: &CancellationToken,
) -> StartOutcome {
    let deadline = sleep(limit);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return StartOutcome::Cancelled,
            _ = &mut deadline => return StartOutcome::Silent,
            state = bond.next() => match state {
                Some(BondState::None) => {}
                Some(state) => return StartOutcome::Reached(state),
                None => return StartOutcome::Silent,
            },
        }
    }
}

async fn await_bond_resolution(
    bond: &mut BondStream,
    limit: Duration,
    cancel: &CancellationToken,
    mut saw_bonding: bool,
) -> PairingOutcome {
    let deadline = sleep(limit);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PairingOutcome::Failure(PairingFailure::Cancelled),
            _ = &mut deadline => return PairingOutcome::Failure(PairingFailure::Timeout),
            state = bond.next() => match state {
                Some(BondState::Bonded) => return PairingOutcome::Success,
                Some(BondState::Bonding) => saw_bonding = true,
                Some(BondState::None) if saw_bonding => {
                    return PairingOutcome::Failure(PairingFailure::PinRejected);
                }
                Some(BondState::None) => {}
                None => return PairingOutcome::Failure(PairingFailure::Timeout),
            },
        }
    }
}

async fn reconnect_scan<B: BluetoothApi>(
    bluetooth: &B,
    target: &FoundTarget,
    window: Duration,
    cancel: &CancellationToken,
) -> bool {
    let mut stream = match bluetooth.start_ble_scan(ScanFilter::rnode()).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!("Reconnect scan unavailable: {error}");
            return false;
        }
    };

    let deadline = sleep(window);
    tokio::pin!(deadline);
    let mut found = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut deadline => break,
            hit = stream.next() => match hit {
                Some(hit) => {
                    let name_match = target.name.is_some() && hit.name == target.name;
                    if hit.address == target.address || name_match {
                        found = true;
                        break;
                    }
                }
                None => break,
            },
        }
    }
    bluetooth.stop_ble_scan().await;
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBluetooth, MockSerial};
    use crate::transport::ScanHit;

    const PORT: &str = "/dev/ttyACM0";
    const TARGET: &str = "AA:BB:CC:DD:EE:FF";

    fn orchestrator(
        bt: Arc<MockBluetooth>,
        serial: Arc<MockSerial>,
    ) -> PairingOrchestrator<MockBluetooth, MockSerial> {
        PairingOrchestrator::new(bt, serial)
    }

    fn advertising(address: &str) -> ScanHit {
        ScanHit {
            address: address.to_string(),
            name: Some("RNode 5A3F".to_string()),
            rssi: Some(-55),
            bonded: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_usb_assisted_success_with_serial_pin() {
        let bt = Arc::new(MockBluetooth::new());
        bt.add_ble_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::Bonded]);
        let serial = Arc::new(MockSerial::new());
        serial.set_auto_pin("123456");

        let orch = orchestrator(bt.clone(), serial.clone());
        orch.start_usb_assisted(PORT).await;
        assert_eq!(orch.wait_for_outcome().await, PairingOutcome::Success);

        // PIN bound to the target address, not applied globally.
        assert_eq!(bt.pin_for(TARGET).as_deref(), Some("123456"));
        // The pairing-mode frame went out over serial.
        assert!(serial.writes().contains(&bt_ctrl_frame(BT_CTRL_PAIR).to_vec()));
        // Full teardown: serial released, no scan handles leaked.
        assert!(!serial.is_connected());
        assert_eq!(serial.connection_log(), vec!["connect", "disconnect"]);
        assert_eq!(bt.open_scan_count(), 0);
        // Transport-aware bonding unsupported, so the fallback was used.
        assert_eq!(bt.bond_initiations(), vec![(TARGET.to_string(), None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_selected_bonding_preferred_when_available() {
        let bt = Arc::new(MockBluetooth::new());
        bt.set_transport_aware_bonding(true);
        bt.add_classic_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::Bonded]);
        let serial = Arc::new(MockSerial::new());
        serial.set_auto_pin("123456");

        let orch = orchestrator(bt.clone(), serial);
        orch.start_usb_assisted(PORT).await;
        assert_eq!(orch.wait_for_outcome().await, PairingOutcome::Success);

        assert_eq!(
            bt.bond_initiations(),
            vec![(TARGET.to_string(), Some(TransportType::Classic))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_timeout_degrades_to_manual_entry_and_reuses_target() {
        let bt = Arc::new(MockBluetooth::new());
        bt.add_ble_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::Bonded]);
        let serial = Arc::new(MockSerial::new());

        let orch = orchestrator(bt.clone(), serial);
        orch.start_usb_assisted(PORT).await;

        let mut phases = orch.subscribe();
        phases
            .wait_for(|p| *p == PairingPhase::ManualPinEntry)
            .await
            .unwrap();
        assert!(orch.submit_pin("654321").await);
        assert_eq!(orch.wait_for_outcome().await, PairingOutcome::Success);

        assert_eq!(bt.pin_for(TARGET).as_deref(), Some("654321"));
        // The target found during the PIN wait was reused; exactly one
        // discovery pass ran.
        let starts = bt
            .scan_log()
            .iter()
            .filter(|&&e| e == "ble_start")
            .count();
        assert_eq!(starts, 1);
        assert_eq!(bt.open_scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_entry_bounded_when_configured() {
        let bt = Arc::new(MockBluetooth::new());
        bt.add_ble_hit(advertising(TARGET));
        let serial = Arc::new(MockSerial::new());
        let timeouts = PairingTimeouts {
            manual_pin: Some(Duration::from_secs(60)),
            ..PairingTimeouts::default()
        };

        let orch = PairingOrchestrator::with_timeouts(bt, serial.clone(), timeouts);
        orch.start_usb_assisted(PORT).await;

        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::Timeout)
        );
        assert!(!serial.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_rejected_when_bonding_falls_back_to_none() {
        let bt = Arc::new(MockBluetooth::new());
        bt.add_ble_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::None]);
        let serial = Arc::new(MockSerial::new());
        serial.set_auto_pin("123456");

        let orch = orchestrator(bt, serial);
        orch.start_usb_assisted(PORT).await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::PinRejected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bonding_timeout() {
        let bt = Arc::new(MockBluetooth::new());
        bt.add_ble_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![BondState::Bonding]);
        let serial = Arc::new(MockSerial::new());
        serial.set_auto_pin("123456");

        let orch = orchestrator(bt, serial);
        orch.start_usb_assisted(PORT).await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_response_when_radio_never_advertises() {
        let bt = Arc::new(MockBluetooth::new());
        let serial = Arc::new(MockSerial::new());
        serial.set_auto_pin("123456");

        let orch = orchestrator(bt.clone(), serial.clone());
        orch.start_usb_assisted(PORT).await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::NoResponse)
        );
        assert_eq!(bt.open_scan_count(), 0);
        assert!(!serial.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_write_is_a_hard_failure() {
        let bt = Arc::new(MockBluetooth::new());
        let serial = Arc::new(MockSerial::new());
        serial.set_short_write(true);

        let orch = orchestrator(bt.clone(), serial.clone());
        orch.start_usb_assisted(PORT).await;
        assert!(matches!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::Io(_))
        ));
        // The session failed before discovery started.
        assert!(bt.scan_log().is_empty());
        assert!(!serial.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_serial_connect_failure() {
        let bt = Arc::new(MockBluetooth::new());
        let serial = Arc::new(MockSerial::new());
        serial.fail_connect(true);

        let orch = orchestrator(bt, serial);
        orch.start_usb_assisted(PORT).await;
        assert!(matches!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::Io(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starting_a_second_session_tears_down_the_first() {
        let bt = Arc::new(MockBluetooth::new());
        bt.add_ble_hit(advertising(TARGET));
        let serial = Arc::new(MockSerial::new());

        let orch = orchestrator(bt.clone(), serial.clone());
        orch.start_usb_assisted(PORT).await;
        let mut phases = orch.subscribe();
        phases
            .wait_for(|p| *p == PairingPhase::ManualPinEntry)
            .await
            .unwrap();

        // Overlapping sessions are forbidden; this cancels the first and
        // awaits its teardown, so the serial port is free to reopen.
        orch.start_usb_assisted(PORT).await;
        orch.cancel().await;
        assert_eq!(
            orch.phase(),
            PairingPhase::Resolved(PairingOutcome::Failure(PairingFailure::Cancelled))
        );

        assert_eq!(
            serial.connection_log(),
            vec!["connect", "disconnect", "connect", "disconnect"]
        );
        assert_eq!(bt.open_scan_count(), 0);
        assert!(!serial.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_releases_everything() {
        let bt = Arc::new(MockBluetooth::new());
        let serial = Arc::new(MockSerial::new());

        let orch = orchestrator(bt.clone(), serial.clone());
        orch.start_usb_assisted(PORT).await;
        let mut phases = orch.subscribe();
        phases
            .wait_for(|p| *p == PairingPhase::AwaitingPin)
            .await
            .unwrap();

        orch.cancel().await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::Cancelled)
        );
        assert_eq!(bt.open_scan_count(), 0);
        assert!(!serial.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_pin_without_session() {
        let bt = Arc::new(MockBluetooth::new());
        let serial = Arc::new(MockSerial::new());
        let orch = orchestrator(bt, serial);
        assert!(!orch.submit_pin("123456").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_pairing_success() {
        let bt = Arc::new(MockBluetooth::new());
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::Bonded]);

        let orch = orchestrator(bt.clone(), Arc::new(MockSerial::new()));
        orch.start_direct(TARGET, Some("RNode 5A3F"), TransportType::Ble, Some("123456"))
            .await;
        assert_eq!(orch.wait_for_outcome().await, PairingOutcome::Success);
        assert_eq!(bt.pin_for(TARGET).as_deref(), Some("123456"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_ble_reconnect_fallback_after_silence() {
        let bt = Arc::new(MockBluetooth::new());
        // First attempt: the platform never starts the handshake.
        bt.script_bond(TARGET, vec![]);
        // The radio is advertising again, so the retry succeeds.
        bt.add_ble_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::Bonded]);

        let orch = orchestrator(bt.clone(), Arc::new(MockSerial::new()));
        orch.start_direct(TARGET, Some("RNode 5A3F"), TransportType::Ble, None)
            .await;
        assert_eq!(orch.wait_for_outcome().await, PairingOutcome::Success);

        assert_eq!(bt.bond_initiations().len(), 2);
        assert_eq!(bt.open_scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_classic_has_no_reconnect_fallback() {
        let bt = Arc::new(MockBluetooth::new());
        bt.script_bond(TARGET, vec![]);

        let orch = orchestrator(bt.clone(), Arc::new(MockSerial::new()));
        orch.start_direct(TARGET, None, TransportType::Classic, Some("123456"))
            .await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::NoResponse)
        );
        assert_eq!(bt.bond_initiations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_reconnect_fallback_gives_up_when_still_silent() {
        let bt = Arc::new(MockBluetooth::new());
        bt.script_bond(TARGET, vec![]);
        bt.add_ble_hit(advertising(TARGET));
        bt.script_bond(TARGET, vec![]);

        let orch = orchestrator(bt.clone(), Arc::new(MockSerial::new()));
        orch.start_direct(TARGET, Some("RNode 5A3F"), TransportType::Ble, None)
            .await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::NoResponse)
        );
        assert_eq!(bt.open_scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_phase_two_timeout() {
        let bt = Arc::new(MockBluetooth::new());
        bt.script_bond(TARGET, vec![BondState::Bonding]);

        let orch = orchestrator(bt, Arc::new(MockSerial::new()));
        orch.start_direct(TARGET, None, TransportType::Ble, Some("123456"))
            .await;
        assert_eq!(
            orch.wait_for_outcome().await,
            PairingOutcome::Failure(PairingFailure::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_transport_uses_platform_default_bonding() {
        let bt = Arc::new(MockBluetooth::new());
        bt.set_transport_aware_bonding(true);
        bt.script_bond(TARGET, vec![BondState::Bonding, BondState::Bonded]);

        let orch = orchestrator(bt.clone(), Arc::new(MockSerial::new()));
        orch.start_direct(TARGET, None, TransportType::Unknown, Some("123456"))
            .await;
        assert_eq!(orch.wait_for_outcome().await, PairingOutcome::Success);
        assert_eq!(bt.bond_initiations(), vec![(TARGET.to_string(), None)]);
    }
}
