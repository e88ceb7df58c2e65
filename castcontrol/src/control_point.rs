//! The facade every application talks to.
//!
//! A `ControlPoint` owns the discovery engine and the per-device media
//! controllers. No operation blocks the caller beyond enqueueing work:
//! searches and casts run on background threads and report through
//! callbacks. `get_state()` is the one synchronous call and only reads
//! the cached snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::config::CastConfig;
use crate::discovery::DiscoveryEngine;
use crate::errors::CastError;
use crate::http_client::HttpClient;
use crate::media_controller::MediaController;
use crate::model::{Device, DeviceEvent, DeviceId, MediaState, PlaybackState, RemoteDevice};
use crate::soap_client::SoapTransport;

/// Search window used when `cast_to_device` has to rediscover its target.
const REDISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Control commands dispatched to the current device.
///
/// The value shapes of the wire protocol are encoded in the variants:
/// volume is an integer (clamped to 0..=100 on send), mute a flag, seek a
/// millisecond position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Play,
    Pause,
    Stop,
    Seek(u64),
    SetVolume(u16),
    SetMute(bool),
}

enum InnerState {
    Uninitialized,
    Active(Arc<Runtime>),
    Released,
}

struct Runtime {
    config: CastConfig,
    http: Arc<HttpClient>,
    engine: DiscoveryEngine,
    controllers: Mutex<HashMap<DeviceId, Arc<MediaController>>>,
    media_state: Mutex<MediaState>,
}

pub struct ControlPoint {
    config: CastConfig,
    inner: Mutex<InnerState>,
}

impl Default for ControlPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPoint {
    pub fn new() -> Self {
        Self::with_config(CastConfig::default())
    }

    pub fn with_config(config: CastConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(InnerState::Uninitialized),
        }
    }

    /// Bring the control point up: open the multicast socket and start
    /// the discovery threads. Safe to call repeatedly; also re-arms an
    /// instance after `release()`.
    pub fn init(&self) -> Result<(), CastError> {
        let mut guard = self.inner.lock().unwrap();
        if let InnerState::Active(_) = &*guard {
            debug!("init(): already active");
            return Ok(());
        }

        let http = Arc::new(HttpClient::new(&self.config));
        let engine = DiscoveryEngine::start(self.config.clone(), Arc::clone(&http))?;

        *guard = InnerState::Active(Arc::new(Runtime {
            config: self.config.clone(),
            http,
            engine,
            controllers: Mutex::new(HashMap::new()),
            media_state: Mutex::new(MediaState::default()),
        }));
        info!("Control point initialized");
        Ok(())
    }

    /// Tear everything down. Any facade call except `init()` afterwards
    /// fails with `Released` and performs no network I/O.
    pub fn release(&self) {
        let mut guard = self.inner.lock().unwrap();
        if let InnerState::Active(rt) = std::mem::replace(&mut *guard, InnerState::Released) {
            rt.shutdown();
            info!("Control point released");
        }
    }

    /// Start a search and deliver newly observed devices through
    /// `on_devices` as they appear, at most once per device within this
    /// search window. At the deadline, if nothing was delivered and
    /// devices are known from before, one final callback carries the
    /// full set.
    pub fn search<F>(&self, timeout: Duration, on_devices: F) -> Result<(), CastError>
    where
        F: Fn(Vec<Device>) + Send + 'static,
    {
        let rt = self.runtime()?;

        thread::spawn(move || {
            let rx = rt.engine.subscribe();
            if let Err(e) = rt.engine.start_search() {
                warn!("search: could not start: {}", e);
                return;
            }

            let deadline = Instant::now() + timeout;
            let mut seen: std::collections::HashSet<DeviceId> = std::collections::HashSet::new();
            let mut fired = false;

            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                match rx.recv_timeout(deadline - now) {
                    Ok(DeviceEvent::Added(device)) => {
                        if seen.insert(device.id.clone()) {
                            fired = true;
                            on_devices(vec![device]);
                        }
                    }
                    Ok(DeviceEvent::Removed(_)) => {}
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            rt.engine.search_ended();

            if !fired {
                let known = rt.engine.snapshot();
                if !known.is_empty() {
                    on_devices(known);
                }
            }
        });

        Ok(())
    }

    /// Bounded search (configured `search_timeout_ms`), then cast to the
    /// best candidate: a TV if one showed up, else the first device in
    /// discovery order. `on_result` carries the chosen device.
    pub fn cast<F>(&self, url: &str, title: &str, on_result: F) -> Result<(), CastError>
    where
        F: FnOnce(Result<Device, CastError>) + Send + 'static,
    {
        let rt = self.runtime()?;
        validate_media_url(url)?;
        let url = url.to_string();
        let title = title.to_string();
        let timeout = rt.config.search_timeout();

        thread::spawn(move || {
            // A TV is the top preference; once one appears no better
            // candidate can, so the search window ends early.
            let known = run_bounded_search(&rt, timeout, |d| d.is_tv);
            let candidate = pick_device(&known).cloned();

            match candidate {
                Some(device) => {
                    let result = rt.cast_to_known(&device.id, &url, &title);
                    on_result(result.map(|_| device));
                }
                None => on_result(Err(CastError::device("no renderers discovered"))),
            }
        });

        Ok(())
    }

    /// Let the application choose: if devices are already known the
    /// selector runs immediately on that list, otherwise after a bounded
    /// search. A `None` from the selector means no cast happens.
    pub fn cast_to<S>(&self, url: &str, title: &str, selector: S) -> Result<(), CastError>
    where
        S: FnOnce(Vec<Device>) -> Option<Device> + Send + 'static,
    {
        let rt = self.runtime()?;
        validate_media_url(url)?;
        let url = url.to_string();
        let title = title.to_string();
        let timeout = rt.config.search_timeout();

        thread::spawn(move || {
            let known = rt.engine.snapshot();
            let candidates = if known.is_empty() {
                run_bounded_search(&rt, timeout, |_| false)
            } else {
                known
            };

            match selector(candidates) {
                Some(device) => {
                    if let Err(e) = rt.cast_to_known(&device.id, &url, &title) {
                        warn!("cast_to {} failed: {}", device.name, e);
                    }
                }
                None => debug!("cast_to: selector declined, no cast"),
            }
        });

        Ok(())
    }

    /// Cast to a specific device. An unknown id triggers a short
    /// rediscovery search before giving up.
    pub fn cast_to_device<F>(
        &self,
        device: &Device,
        url: &str,
        title: &str,
        on_result: F,
    ) -> Result<(), CastError>
    where
        F: FnOnce(Result<(), CastError>) + Send + 'static,
    {
        let rt = self.runtime()?;
        validate_media_url(url)?;
        let id = device.id.clone();
        let name = device.name.clone();
        let url = url.to_string();
        let title = title.to_string();

        thread::spawn(move || {
            let known = match rt.engine.remote_device(&id) {
                Some(remote) => Some(remote),
                None => {
                    debug!("cast_to_device: {} unknown, rediscovering", name);
                    rediscover(&rt, &id, REDISCOVERY_TIMEOUT)
                }
            };

            match known {
                Some(_) => on_result(rt.cast_to_known(&id, &url, &title)),
                None => on_result(Err(CastError::device(format!(
                    "device {name} [{id}] is not present on the network"
                )))),
            }
        });

        Ok(())
    }

    /// Dispatch a control command to the current device.
    pub fn control<F>(&self, action: ControlAction, on_result: F) -> Result<(), CastError>
    where
        F: FnOnce(Result<(), CastError>) + Send + 'static,
    {
        let rt = self.runtime()?;
        thread::spawn(move || {
            on_result(rt.do_control(action));
        });
        Ok(())
    }

    /// Cached media state. Never fails and never touches the network:
    /// before `init()` and after `release()` it is the default snapshot.
    pub fn get_state(&self) -> MediaState {
        match self.runtime() {
            Ok(rt) => rt.media_state.lock().unwrap().clone(),
            Err(_) => MediaState::default(),
        }
    }

    /// Known devices in discovery order.
    pub fn devices(&self) -> Result<Vec<Device>, CastError> {
        Ok(self.runtime()?.engine.snapshot())
    }

    /// Long-lived discovery event stream, independent of search windows.
    pub fn subscribe_events(&self) -> Result<Receiver<DeviceEvent>, CastError> {
        Ok(self.runtime()?.engine.subscribe())
    }

    // --- explicit state queries -------------------------------------
    //
    // These hit the device synchronously on the calling thread and fold
    // the answer into the snapshot. Applications wanting them off their
    // UI thread wrap them the same way they would any blocking call.

    /// GetPositionInfo on the current device; updates the snapshot.
    pub fn query_position(&self) -> Result<(u64, u64), CastError> {
        let rt = self.runtime()?;
        let device = rt.current_device()?;
        let controller = rt.controller_for_id(&device.id)?;
        let (position_ms, duration_ms) = controller.get_position()?;
        {
            let mut state = rt.media_state.lock().unwrap();
            state.position_ms = position_ms;
            state.duration_ms = duration_ms;
        }
        rt.engine.touch(&device.id);
        Ok((position_ms, duration_ms))
    }

    /// GetVolume on the current device; updates the snapshot.
    pub fn query_volume(&self) -> Result<u16, CastError> {
        let rt = self.runtime()?;
        let device = rt.current_device()?;
        let controller = rt.controller_for_id(&device.id)?;
        let volume = controller.get_volume()?;
        rt.media_state.lock().unwrap().volume = Some(volume);
        rt.engine.touch(&device.id);
        Ok(volume)
    }

    /// GetMute on the current device; updates the snapshot.
    pub fn query_mute(&self) -> Result<bool, CastError> {
        let rt = self.runtime()?;
        let device = rt.current_device()?;
        let controller = rt.controller_for_id(&device.id)?;
        let muted = controller.get_mute()?;
        rt.media_state.lock().unwrap().is_muted = Some(muted);
        rt.engine.touch(&device.id);
        Ok(muted)
    }

    /// GetTransportInfo on the current device; updates the snapshot.
    pub fn query_transport_state(&self) -> Result<PlaybackState, CastError> {
        let rt = self.runtime()?;
        let device = rt.current_device()?;
        let controller = rt.controller_for_id(&device.id)?;
        let playback = controller.get_transport_info()?;
        rt.media_state.lock().unwrap().playback_state = playback;
        rt.engine.touch(&device.id);
        Ok(playback)
    }

    fn runtime(&self) -> Result<Arc<Runtime>, CastError> {
        match &*self.inner.lock().unwrap() {
            InnerState::Uninitialized => Err(CastError::NotInitialized),
            InnerState::Released => Err(CastError::Released),
            InnerState::Active(rt) => Ok(Arc::clone(rt)),
        }
    }
}

impl Drop for ControlPoint {
    fn drop(&mut self) {
        self.release();
    }
}

impl Runtime {
    fn shutdown(&self) {
        let controllers: Vec<_> = self.controllers.lock().unwrap().drain().collect();
        for (_, controller) in controllers {
            controller.release();
        }
        self.engine.shutdown();
        self.http.clear_cache();
        self.media_state.lock().unwrap().disconnect();
    }

    fn current_device(&self) -> Result<Device, CastError> {
        self.media_state
            .lock()
            .unwrap()
            .current_device
            .clone()
            .ok_or_else(|| CastError::device("no active device; cast to one first"))
    }

    /// Controller cache with single-flight insertion.
    fn controller_for(&self, remote: &RemoteDevice) -> Arc<MediaController> {
        let mut controllers = self.controllers.lock().unwrap();
        controllers
            .entry(remote.device.id.clone())
            .or_insert_with(|| {
                let transport: Arc<dyn SoapTransport> = Arc::clone(&self.http) as Arc<dyn SoapTransport>;
                Arc::new(MediaController::new(remote.clone(), transport, &self.config))
            })
            .clone()
    }

    fn controller_for_id(&self, id: &DeviceId) -> Result<Arc<MediaController>, CastError> {
        if let Some(controller) = self.controllers.lock().unwrap().get(id) {
            return Ok(Arc::clone(controller));
        }
        let remote = self
            .engine
            .remote_device(id)
            .ok_or_else(|| CastError::device(format!("device [{id}] is no longer known")))?;
        Ok(self.controller_for(&remote))
    }

    /// Cast to a device the engine knows. Updates the media snapshot on
    /// both success and failure.
    fn cast_to_known(&self, id: &DeviceId, url: &str, title: &str) -> Result<(), CastError> {
        let remote = self
            .engine
            .remote_device(id)
            .ok_or_else(|| CastError::device(format!("device [{id}] is no longer known")))?;

        if !remote.is_castable() {
            return Err(CastError::device(format!(
                "{} exposes no AVTransport service",
                remote.device.name
            )));
        }

        let controller = self.controller_for(&remote);
        {
            let mut state = self.media_state.lock().unwrap();
            state.connect(remote.device.clone());
            state.playback_state = PlaybackState::Buffering;
            state.position_ms = 0;
            state.duration_ms = 0;
        }

        let result = controller.play_media(url, title, 0);

        let mut state = self.media_state.lock().unwrap();
        match &result {
            Ok(()) => {
                state.playback_state = PlaybackState::Playing;
                drop(state);
                self.engine.touch(id);
                info!("Casting {} to {}", url, remote.device.name);
            }
            Err(e) => {
                warn!("Cast to {} failed: {}", remote.device.name, e);
                state.disconnect();
            }
        }
        result
    }

    fn do_control(&self, action: ControlAction) -> Result<(), CastError> {
        let device = self.current_device()?;
        let controller = self.controller_for_id(&device.id)?;

        match action {
            ControlAction::Play => {
                controller.play()?;
                self.media_state.lock().unwrap().playback_state = PlaybackState::Playing;
            }
            ControlAction::Pause => {
                controller.pause()?;
                self.media_state.lock().unwrap().playback_state = PlaybackState::Paused;
            }
            ControlAction::Stop => {
                controller.stop()?;
                let mut state = self.media_state.lock().unwrap();
                state.playback_state = PlaybackState::Stopped;
                state.position_ms = 0;
            }
            ControlAction::Seek(position_ms) => {
                controller.seek(position_ms)?;
                self.media_state.lock().unwrap().position_ms = position_ms;
            }
            ControlAction::SetVolume(volume) => {
                let sent = controller.set_volume(volume)?;
                self.media_state.lock().unwrap().volume = Some(sent);
            }
            ControlAction::SetMute(mute) => {
                controller.set_mute(mute)?;
                self.media_state.lock().unwrap().is_muted = Some(mute);
            }
        }

        self.engine.touch(&device.id);
        Ok(())
    }
}

/// Selection heuristic: prefer a TV, then discovery order.
fn pick_device(devices: &[Device]) -> Option<&Device> {
    devices.iter().find(|d| d.is_tv).or_else(|| devices.first())
}

fn validate_media_url(url: &str) -> Result<(), CastError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(CastError::invalid_argument(format!(
            "media URL must be http(s), got '{url}'"
        )))
    }
}

/// Issue a search round and wait out `timeout`, returning the devices
/// known at the end. `stop_early` short-circuits the window when a
/// device makes further waiting pointless.
fn run_bounded_search(
    rt: &Arc<Runtime>,
    timeout: Duration,
    stop_early: impl Fn(&Device) -> bool,
) -> Vec<Device> {
    let rx = rt.engine.subscribe();
    if let Err(e) = rt.engine.start_search() {
        warn!("bounded search could not start: {}", e);
        return rt.engine.snapshot();
    }

    if !rt.engine.snapshot().iter().any(&stop_early) {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match rx.recv_timeout(deadline - now) {
                Ok(DeviceEvent::Added(device)) if stop_early(&device) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    rt.engine.search_ended();
    rt.engine.snapshot()
}

/// Wait for a specific device id to (re)appear.
fn rediscover(rt: &Arc<Runtime>, id: &DeviceId, timeout: Duration) -> Option<RemoteDevice> {
    let rx = rt.engine.subscribe();
    if rt.engine.start_search().is_err() {
        return rt.engine.remote_device(id);
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(remote) = rt.engine.remote_device(id) {
            rt.engine.search_ended();
            return Some(remote);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        if rx.recv_timeout(deadline - now).is_err() {
            break;
        }
    }

    rt.engine.search_ended();
    rt.engine.remote_device(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    fn device(id: &str, name: &str, is_tv: bool) -> Device {
        Device {
            id: DeviceId(id.to_string()),
            name: name.to_string(),
            address: "192.168.1.20".into(),
            is_tv,
        }
    }

    /// Off-standard multicast port: keeps tests away from live SSDP
    /// traffic and from each other.
    fn test_control_point(port: u16) -> ControlPoint {
        ControlPoint::with_config(CastConfig {
            multicast_port: port,
            ..CastConfig::default()
        })
    }

    #[test]
    fn pick_prefers_tv_then_first() {
        let speaker = device("http://h/a.xml", "Speaker", false);
        let tv = device("http://h/b.xml", "TV", true);

        let devices = vec![speaker.clone(), tv.clone()];
        assert_eq!(pick_device(&devices).unwrap().id, tv.id);

        let devices = vec![speaker.clone()];
        assert_eq!(pick_device(&devices).unwrap().id, speaker.id);

        assert!(pick_device(&[]).is_none());
    }

    #[test]
    fn url_validation() {
        assert!(validate_media_url("http://host/a.mp4").is_ok());
        assert!(validate_media_url("https://host/a.mp4").is_ok());
        assert!(matches!(
            validate_media_url("file:///tmp/a.mp4"),
            Err(CastError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_media_url(""),
            Err(CastError::InvalidArgument(_))
        ));
    }

    #[test]
    fn calls_before_init_fail_with_not_initialized() {
        let cp = ControlPoint::new();
        assert!(matches!(
            cp.control(ControlAction::Play, |_| {}),
            Err(CastError::NotInitialized)
        ));
        assert!(matches!(cp.devices(), Err(CastError::NotInitialized)));
        assert!(matches!(
            cp.query_volume(),
            Err(CastError::NotInitialized)
        ));
        // get_state never fails
        let state = cp.get_state();
        assert!(!state.is_connected);
    }

    #[test]
    fn calls_after_release_fail_with_released() {
        let cp = ControlPoint::new();
        cp.release();
        assert!(matches!(
            cp.cast("http://h/a.mp4", "", |_| {}),
            Err(CastError::Released)
        ));
        assert!(matches!(cp.devices(), Err(CastError::Released)));
        assert_eq!(cp.get_state().playback_state, PlaybackState::Idle);
    }

    #[test]
    fn init_is_idempotent_and_release_tears_down() {
        let cp = test_control_point(19001);
        cp.init().expect("first init");
        cp.init().expect("second init");
        assert!(cp.devices().unwrap().is_empty());

        cp.release();
        assert!(matches!(cp.devices(), Err(CastError::Released)));

        // init() re-arms a released control point
        cp.init().expect("re-init after release");
        assert!(cp.devices().unwrap().is_empty());
        cp.release();
    }

    #[test]
    fn search_with_no_devices_ends_without_callback() {
        let cp = test_control_point(19002);
        cp.init().expect("init");

        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_cb = Arc::clone(&fired);
        let (done_tx, done_rx) = mpsc::channel();

        cp.search(Duration::from_millis(50), move |_| {
            fired_in_cb.store(true, Ordering::SeqCst);
        })
        .expect("search");

        // the search thread signals nothing; just wait out the window
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            let _ = done_tx.send(());
        });
        done_rx.recv().unwrap();

        assert!(!fired.load(Ordering::SeqCst));
        cp.release();
    }

    #[test]
    fn control_without_device_is_a_device_error() {
        let cp = test_control_point(19003);
        cp.init().expect("init");

        let (tx, rx) = mpsc::channel();
        cp.control(ControlAction::Play, move |result| {
            let _ = tx.send(result);
        })
        .expect("control enqueues");

        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(result, Err(CastError::Device(_))));
        cp.release();
    }
}
