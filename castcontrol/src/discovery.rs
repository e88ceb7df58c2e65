//! SSDP discovery engine.
//!
//! Owns the multicast socket, the listener thread, the description fetch
//! pool and the liveness sweeper. Other components only ever see cloned
//! snapshots of the device map and events on the broadcast bus.
//!
//! Engine states: `INACTIVE → LISTENING ⇄ SEARCHING → INACTIVE`.
//! Re-entering SEARCHING does not touch the socket; INACTIVE tears
//! everything down.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, info, trace, warn};
use url::Url;

use castupnp::description::DeviceDescription;
use castupnp::ssdp::{SEARCH_TARGETS, SsdpEvent, SsdpSocket, extract_udn_from_usn};

use crate::config::{CastConfig, USER_AGENT};
use crate::errors::CastError;
use crate::events::DeviceEventBus;
use crate::http_client::HttpClient;
use crate::lru::ProcessedLocations;
use crate::model::{Device, DeviceEvent, DeviceId, RemoteDevice};

/// Socket read timeout; bounds how long shutdown can take.
const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Spacing between the M-SEARCH targets of one search round.
const MSEARCH_SPACING: Duration = Duration::from_millis(100);

/// MX value advertised in M-SEARCH.
const MSEARCH_MX: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Inactive,
    Listening,
    Searching,
}

struct DeviceEntry {
    remote: RemoteDevice,
    last_seen: Instant,
    /// Discovery order; selection heuristics prefer earlier devices.
    seq: u64,
}

struct FetchJob {
    location: String,
    usn: String,
    address: String,
}

struct EngineInner {
    config: CastConfig,
    http: Arc<HttpClient>,
    socket: SsdpSocket,
    running: AtomicBool,
    state: Mutex<EngineState>,
    devices: RwLock<HashMap<DeviceId, DeviceEntry>>,
    usn_index: Mutex<HashMap<String, DeviceId>>,
    processed: Mutex<ProcessedLocations>,
    inflight: Mutex<HashSet<String>>,
    bus: DeviceEventBus,
    fetch_tx: Mutex<Option<Sender<FetchJob>>>,
    sweeper_tx: Mutex<Option<Sender<()>>>,
    seq: AtomicU64,
}

pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

impl DiscoveryEngine {
    /// Open the socket and start the listener, fetch pool and sweeper.
    pub fn start(config: CastConfig, http: Arc<HttpClient>) -> Result<Self, CastError> {
        let group: Ipv4Addr = config.multicast_address.parse().map_err(|_| {
            CastError::invalid_argument(format!(
                "invalid multicast address '{}'",
                config.multicast_address
            ))
        })?;

        let socket = SsdpSocket::open(
            group,
            config.multicast_port,
            config.multicast_ttl,
            RECV_TIMEOUT,
            USER_AGENT,
        )?;

        let (fetch_tx, fetch_rx) = bounded::<FetchJob>(64);
        let (sweeper_tx, sweeper_rx) = unbounded::<()>();

        let inner = Arc::new(EngineInner {
            processed: Mutex::new(ProcessedLocations::new(config.max_processed_locations)),
            config,
            http,
            socket,
            running: AtomicBool::new(true),
            state: Mutex::new(EngineState::Listening),
            devices: RwLock::new(HashMap::new()),
            usn_index: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashSet::new()),
            bus: DeviceEventBus::new(),
            fetch_tx: Mutex::new(Some(fetch_tx)),
            sweeper_tx: Mutex::new(Some(sweeper_tx)),
            seq: AtomicU64::new(0),
        });

        spawn_listener(Arc::clone(&inner));
        for worker in 0..inner.config.description_workers.max(1) {
            spawn_fetch_worker(Arc::clone(&inner), fetch_rx.clone(), worker);
        }
        spawn_sweeper(Arc::clone(&inner), sweeper_rx);

        info!("Discovery engine listening");
        Ok(Self { inner })
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.lock().unwrap()
    }

    /// Begin (or restart) an active search round.
    ///
    /// Idempotent: a running engine resets its dedup LRU and re-issues
    /// the M-SEARCH targets. Send failures are logged, not propagated;
    /// passive NOTIFY reception keeps working without them.
    pub fn start_search(&self) -> Result<(), CastError> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(CastError::Released);
        }

        *self.inner.state.lock().unwrap() = EngineState::Searching;
        self.inner.processed.lock().unwrap().clear();

        for st in SEARCH_TARGETS {
            if let Err(e) = self.inner.socket.send_msearch(st, MSEARCH_MX) {
                warn!("M-SEARCH for {} failed: {}", st, e);
            }
            thread::sleep(MSEARCH_SPACING);
        }

        Ok(())
    }

    /// Called by the facade when a search window closes.
    pub fn search_ended(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == EngineState::Searching {
            *state = EngineState::Listening;
        }
    }

    /// Long-lived event stream (`Added` / `Removed`).
    pub fn subscribe(&self) -> Receiver<DeviceEvent> {
        self.inner.bus.subscribe()
    }

    /// Known devices in discovery order.
    pub fn snapshot(&self) -> Vec<Device> {
        let devices = self.inner.devices.read().unwrap();
        let mut entries: Vec<(u64, Device)> = devices
            .values()
            .map(|e| (e.seq, e.remote.device.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, d)| d).collect()
    }

    /// Full record for one device, if known.
    pub fn remote_device(&self, id: &DeviceId) -> Option<RemoteDevice> {
        self.inner
            .devices
            .read()
            .unwrap()
            .get(id)
            .map(|e| e.remote.clone())
    }

    /// Activity touch: control traffic proves the device is alive even
    /// when announcements are sparse.
    pub fn touch(&self, id: &DeviceId) {
        if let Some(entry) = self.inner.devices.write().unwrap().get_mut(id) {
            entry.last_seen = Instant::now();
        }
    }

    /// Tear the engine down: stop threads, leave the group, clear state.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        *self.inner.state.lock().unwrap() = EngineState::Inactive;

        // Closing the channels wakes the fetch pool and the sweeper.
        self.inner.fetch_tx.lock().unwrap().take();
        self.inner.sweeper_tx.lock().unwrap().take();

        self.inner.socket.leave_group();
        self.inner.devices.write().unwrap().clear();
        self.inner.usn_index.lock().unwrap().clear();
        self.inner.processed.lock().unwrap().clear();
        self.inner.inflight.lock().unwrap().clear();
        info!("Discovery engine stopped");
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_listener(inner: Arc<EngineInner>) {
    thread::Builder::new()
        .name("ssdp-listener".into())
        .spawn(move || {
            debug!("SSDP listener started");
            while inner.running.load(Ordering::SeqCst) {
                match inner.socket.recv_event() {
                    Ok(Some(event)) => handle_event(&inner, event),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("SSDP receive error: {}", e);
                        thread::sleep(Duration::from_millis(500));
                    }
                }
            }
            debug!("SSDP listener stopped");
        })
        .expect("failed to spawn ssdp-listener thread");
}

fn spawn_fetch_worker(inner: Arc<EngineInner>, rx: Receiver<FetchJob>, worker: usize) {
    thread::Builder::new()
        .name(format!("description-fetch-{worker}"))
        .spawn(move || {
            for job in rx.iter() {
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                process_fetch(&inner, job);
            }
            trace!("description fetch worker {} stopped", worker);
        })
        .expect("failed to spawn description fetch thread");
}

fn spawn_sweeper(inner: Arc<EngineInner>, rx: Receiver<()>) {
    thread::Builder::new()
        .name("liveness-sweeper".into())
        .spawn(move || {
            loop {
                match rx.recv_timeout(inner.config.sweep_interval()) {
                    Err(RecvTimeoutError::Timeout) => sweep(&inner),
                    // Channel closed: engine shut down.
                    _ => break,
                }
            }
            trace!("liveness sweeper stopped");
        })
        .expect("failed to spawn liveness sweeper thread");
}

fn handle_event(inner: &Arc<EngineInner>, event: SsdpEvent) {
    match event {
        SsdpEvent::Alive {
            usn,
            location,
            from,
            ..
        }
        | SsdpEvent::SearchResponse {
            usn,
            location,
            from,
            ..
        } => {
            handle_presence(inner, location, usn, from.ip().to_string());
        }
        SsdpEvent::ByeBye { usn, .. } => {
            handle_byebye(inner, &usn);
        }
    }
}

fn handle_presence(inner: &Arc<EngineInner>, location: String, usn: String, address: String) {
    let id = DeviceId(location.clone());

    // Every announce refreshes liveness, fetch or not.
    if let Some(entry) = inner.devices.write().unwrap().get_mut(&id) {
        entry.last_seen = Instant::now();
    }

    let should_fetch = inner
        .processed
        .lock()
        .unwrap()
        .should_process(&location, inner.config.reannounce_window());
    if !should_fetch {
        return;
    }

    // Single-flight per location: later announces join the running fetch.
    if !inner.inflight.lock().unwrap().insert(location.clone()) {
        trace!("description fetch for {} already in flight", location);
        return;
    }

    let job = FetchJob {
        location: location.clone(),
        usn,
        address,
    };

    let sent = match inner.fetch_tx.lock().unwrap().as_ref() {
        Some(tx) => tx.try_send(job).is_ok(),
        None => false,
    };
    if !sent {
        // Queue full or engine stopping; drop our claim so a later
        // announce can retry.
        warn!("description fetch queue rejected {}", location);
        inner.inflight.lock().unwrap().remove(&location);
        inner.processed.lock().unwrap().forget(&location);
    }
}

fn handle_byebye(inner: &Arc<EngineInner>, usn: &str) {
    let Some(udn) = extract_udn_from_usn(usn) else {
        return;
    };

    let id = { inner.usn_index.lock().unwrap().remove(&udn) };
    if let Some(id) = id {
        let removed = inner.devices.write().unwrap().remove(&id);
        if let Some(entry) = removed {
            inner.processed.lock().unwrap().forget(&entry.remote.location);
            info!("Device left (byebye): {} [{}]", entry.remote.device.name, id);
            inner.bus.broadcast(DeviceEvent::Removed(id));
        }
    }
}

fn process_fetch(inner: &Arc<EngineInner>, job: FetchJob) {
    let outcome = fetch_description(inner, &job);

    match outcome {
        FetchOutcome::Device(remote) => insert_device(inner, remote),
        FetchOutcome::Fallback => {
            debug!("Recording fallback device for {}", job.location);
            insert_device(
                inner,
                RemoteDevice::fallback(&job.location, &job.usn, &job.address),
            );
        }
        FetchOutcome::Transient => {
            // Leave the location unprocessed so the next announce retries.
            inner.processed.lock().unwrap().forget(&job.location);
        }
    }

    inner.inflight.lock().unwrap().remove(&job.location);
}

enum FetchOutcome {
    Device(RemoteDevice),
    Fallback,
    Transient,
}

fn fetch_description(inner: &Arc<EngineInner>, job: &FetchJob) -> FetchOutcome {
    // A location that is not a valid HTTP URL will never fetch; record
    // the presence and move on.
    if Url::parse(&job.location).is_err() {
        debug!("Unparseable LOCATION '{}'", job.location);
        return FetchOutcome::Fallback;
    }

    match inner.http.get(&job.location, true) {
        Ok(response) => match DeviceDescription::parse(response.body.as_bytes()) {
            Ok(desc) => FetchOutcome::Device(RemoteDevice::from_description(
                &job.location,
                &job.usn,
                &job.address,
                &desc,
            )),
            Err(e) => {
                debug!("Malformed description at {}: {}", job.location, e);
                FetchOutcome::Fallback
            }
        },
        Err(e) if e.is_transient() => {
            debug!("Transient fetch failure for {}: {}", job.location, e);
            FetchOutcome::Transient
        }
        Err(e) => {
            debug!("Structural fetch failure for {}: {}", job.location, e);
            FetchOutcome::Fallback
        }
    }
}

fn insert_device(inner: &Arc<EngineInner>, remote: RemoteDevice) {
    let id = remote.device.id.clone();

    if let Some(udn) = extract_udn_from_usn(&remote.usn) {
        inner.usn_index.lock().unwrap().insert(udn, id.clone());
    }

    let added = {
        let mut devices = inner.devices.write().unwrap();
        match devices.get_mut(&id) {
            Some(entry) => {
                // Known device: refresh the record, no event.
                entry.remote = remote;
                entry.last_seen = Instant::now();
                None
            }
            None => {
                let seq = inner.seq.fetch_add(1, Ordering::SeqCst);
                let device = remote.device.clone();
                devices.insert(
                    id.clone(),
                    DeviceEntry {
                        remote,
                        last_seen: Instant::now(),
                        seq,
                    },
                );
                Some(device)
            }
        }
    };

    if let Some(device) = added {
        info!("Device discovered: {} [{}]", device.name, device.id);
        inner.bus.broadcast(DeviceEvent::Added(device));
    }
}

fn sweep(inner: &Arc<EngineInner>) {
    let liveness = inner.config.device_liveness();
    let now = Instant::now();

    let expired: Vec<(DeviceId, RemoteDevice)> = {
        let devices = inner.devices.read().unwrap();
        devices
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > liveness)
            .map(|(id, entry)| (id.clone(), entry.remote.clone()))
            .collect()
    };

    for (id, remote) in expired {
        {
            let mut devices = inner.devices.write().unwrap();
            // Re-check under the write lock: an announce may have
            // refreshed the entry since the snapshot.
            match devices.get(&id) {
                Some(entry) if now.duration_since(entry.last_seen) > liveness => {
                    devices.remove(&id);
                }
                _ => continue,
            }
        }
        if let Some(udn) = extract_udn_from_usn(&remote.usn) {
            inner.usn_index.lock().unwrap().remove(&udn);
        }
        // Forget the location so a re-announce triggers a fresh fetch
        // and a new Added event.
        inner.processed.lock().unwrap().forget(&remote.location);
        info!("Device timed out: {} [{}]", remote.device.name, id);
        inner.bus.broadcast(DeviceEvent::Removed(id));
    }
}
