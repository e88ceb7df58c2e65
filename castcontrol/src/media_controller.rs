//! Per-device media controller.
//!
//! One instance per device id, created lazily on first cast and cached
//! by the facade. Holds a copy of the device descriptor and no sockets:
//! every action is a short-lived SOAP POST through the shared transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use castupnp::soap::parse_upnp_fault;
use castupnp::time::{format_hhmmss_millis, parse_hms_to_millis};

use crate::config::CastConfig;
use crate::errors::CastError;
use crate::model::{PlaybackState, RemoteDevice};
use crate::soap_client::{
    SoapCallResult, SoapTransport, handle_action_response, invoke_upnp_action, required_response_text,
    response_element, response_text,
};

/// AVTransport instances are virtually always single; instance 0 is the
/// whole device.
const INSTANCE_ID: &str = "0";
const CHANNEL_MASTER: &str = "Master";
const PLAY_SPEED: &str = "1";

/// Grace period between SetAVTransportURI and Play.
const PLAY_DELAY: Duration = Duration::from_millis(250);
/// Grace period before the initial Seek of a positioned cast.
const SEEK_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct Endpoint {
    control_url: String,
    service_type: String,
}

pub struct MediaController {
    device: RemoteDevice,
    transport: Arc<dyn SoapTransport>,
    avtransport: Option<Endpoint>,
    rendering_control: Option<Endpoint>,
    max_attempts: u32,
    backoff_step: Duration,
    closed: AtomicBool,
}

impl MediaController {
    pub fn new(
        device: RemoteDevice,
        transport: Arc<dyn SoapTransport>,
        config: &CastConfig,
    ) -> Self {
        let avtransport = device.avtransport_service().map(|s| Endpoint {
            control_url: s.control_url.clone(),
            service_type: s.service_type.clone(),
        });
        let rendering_control = device.rendering_control_service().map(|s| Endpoint {
            control_url: s.control_url.clone(),
            service_type: s.service_type.clone(),
        });

        Self {
            device,
            transport,
            avtransport,
            rendering_control,
            max_attempts: config.soap_max_retries.max(1),
            backoff_step: config.soap_backoff_step(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &RemoteDevice {
        &self.device
    }

    /// Mark the controller closed; operations fail fast afterwards and
    /// a running retry loop gives up at its next attempt.
    pub fn release(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    // --- AVTransport ---

    /// SetAVTransportURI, then Play after a short grace period, then an
    /// optional Seek. Each step runs only after the previous one
    /// succeeded; each step retries independently.
    pub fn play_media(&self, url: &str, title: &str, start_ms: u64) -> Result<(), CastError> {
        let metadata = castdidl::metadata_for(url, title)
            .map_err(|e| CastError::invalid_argument(format!("cannot build metadata: {e}")))?;

        self.set_av_transport_uri(url, &metadata)?;
        thread::sleep(PLAY_DELAY);
        self.play()?;

        if start_ms > 0 {
            thread::sleep(SEEK_DELAY);
            self.seek(start_ms)?;
        }
        Ok(())
    }

    /// AVTransport:1 — SetAVTransportURI
    ///
    /// `metadata` is a DIDL-Lite document; it travels as CDATA.
    pub fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> Result<(), CastError> {
        let endpoint = self.avtransport()?;
        let call = self.invoke(
            endpoint,
            "SetAVTransportURI",
            &[("InstanceID", INSTANCE_ID), ("CurrentURI", uri)],
            &[("CurrentURIMetaData", metadata)],
        )?;
        handle_action_response("SetAVTransportURI", &call)
    }

    /// AVTransport:1 — Play
    pub fn play(&self) -> Result<(), CastError> {
        let endpoint = self.avtransport()?;
        let call = self.invoke(
            endpoint,
            "Play",
            &[("InstanceID", INSTANCE_ID), ("Speed", PLAY_SPEED)],
            &[],
        )?;
        handle_action_response("Play", &call)
    }

    /// AVTransport:1 — Pause
    pub fn pause(&self) -> Result<(), CastError> {
        let endpoint = self.avtransport()?;
        let call = self.invoke(endpoint, "Pause", &[("InstanceID", INSTANCE_ID)], &[])?;
        handle_action_response("Pause", &call)
    }

    /// AVTransport:1 — Stop
    pub fn stop(&self) -> Result<(), CastError> {
        let endpoint = self.avtransport()?;
        let call = self.invoke(endpoint, "Stop", &[("InstanceID", INSTANCE_ID)], &[])?;
        handle_action_response("Stop", &call)
    }

    /// AVTransport:1 — Seek (REL_TIME)
    pub fn seek(&self, position_ms: u64) -> Result<(), CastError> {
        let endpoint = self.avtransport()?;
        let target = format_hhmmss_millis(position_ms);
        let call = self.invoke(
            endpoint,
            "Seek",
            &[
                ("InstanceID", INSTANCE_ID),
                ("Unit", "REL_TIME"),
                ("Target", target.as_str()),
            ],
            &[],
        )?;
        handle_action_response("Seek", &call)
    }

    /// AVTransport:1 — GetPositionInfo → (position_ms, duration_ms)
    ///
    /// `NOT_IMPLEMENTED` and empty values read as 0.
    pub fn get_position(&self) -> Result<(u64, u64), CastError> {
        let endpoint = self.avtransport()?;
        let call = self.invoke(endpoint, "GetPositionInfo", &[("InstanceID", INSTANCE_ID)], &[])?;
        let response = response_element("GetPositionInfo", &call)?;

        let rel_time = response_text(response, "RelTime");
        let duration = response_text(response, "TrackDuration");

        let position_ms = parse_hms_to_millis(&rel_time)
            .ok_or_else(|| CastError::malformed(format!("invalid RelTime value: {rel_time}")))?;
        let duration_ms = parse_hms_to_millis(&duration).ok_or_else(|| {
            CastError::malformed(format!("invalid TrackDuration value: {duration}"))
        })?;

        Ok((position_ms, duration_ms))
    }

    /// AVTransport:1 — GetTransportInfo → advisory playback state
    pub fn get_transport_info(&self) -> Result<PlaybackState, CastError> {
        let endpoint = self.avtransport()?;
        let call = self.invoke(endpoint, "GetTransportInfo", &[("InstanceID", INSTANCE_ID)], &[])?;
        let response = response_element("GetTransportInfo", &call)?;
        let state = required_response_text(response, "CurrentTransportState")?;
        Ok(PlaybackState::from_transport_state(&state))
    }

    // --- RenderingControl ---

    /// RenderingControl:1 — SetVolume (Master); values clamp to 0..=100.
    pub fn set_volume(&self, volume: u16) -> Result<u16, CastError> {
        let endpoint = self.rendering_control()?;
        let clamped = volume.min(100);
        let volume_str = clamped.to_string();
        let call = self.invoke(
            endpoint,
            "SetVolume",
            &[
                ("InstanceID", INSTANCE_ID),
                ("Channel", CHANNEL_MASTER),
                ("DesiredVolume", volume_str.as_str()),
            ],
            &[],
        )?;
        handle_action_response("SetVolume", &call)?;
        Ok(clamped)
    }

    /// RenderingControl:1 — GetVolume
    pub fn get_volume(&self) -> Result<u16, CastError> {
        let endpoint = self.rendering_control()?;
        let call = self.invoke(
            endpoint,
            "GetVolume",
            &[("InstanceID", INSTANCE_ID), ("Channel", CHANNEL_MASTER)],
            &[],
        )?;
        let response = response_element("GetVolume", &call)?;
        let text = required_response_text(response, "CurrentVolume")?;
        let volume = text
            .parse::<u16>()
            .map_err(|_| CastError::malformed(format!("invalid CurrentVolume value: {text}")))?;
        Ok(volume.min(100))
    }

    /// RenderingControl:1 — SetMute (Master)
    pub fn set_mute(&self, mute: bool) -> Result<(), CastError> {
        let endpoint = self.rendering_control()?;
        let mute_str = if mute { "1" } else { "0" };
        let call = self.invoke(
            endpoint,
            "SetMute",
            &[
                ("InstanceID", INSTANCE_ID),
                ("Channel", CHANNEL_MASTER),
                ("DesiredMute", mute_str),
            ],
            &[],
        )?;
        handle_action_response("SetMute", &call)
    }

    /// RenderingControl:1 — GetMute; accepts `0|1|true|false`.
    pub fn get_mute(&self) -> Result<bool, CastError> {
        let endpoint = self.rendering_control()?;
        let call = self.invoke(
            endpoint,
            "GetMute",
            &[("InstanceID", INSTANCE_ID), ("Channel", CHANNEL_MASTER)],
            &[],
        )?;
        let response = response_element("GetMute", &call)?;
        let text = required_response_text(response, "CurrentMute")?;
        match text.to_ascii_lowercase().as_str() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            _ => Err(CastError::malformed(format!(
                "invalid CurrentMute value: {text}"
            ))),
        }
    }

    // --- internals ---

    fn avtransport(&self) -> Result<&Endpoint, CastError> {
        self.avtransport.as_ref().ok_or_else(|| {
            CastError::device(format!(
                "{} exposes no AVTransport service",
                self.device.device.name
            ))
        })
    }

    fn rendering_control(&self) -> Result<&Endpoint, CastError> {
        self.rendering_control.as_ref().ok_or_else(|| {
            CastError::device(format!(
                "{} exposes no RenderingControl service",
                self.device.device.name
            ))
        })
    }

    /// Run one SOAP action with the retry policy: up to `max_attempts`
    /// attempts, linear backoff (step × attempt), retrying only
    /// transport-class failures (timeouts, resets, 5xx). 4xx replies and
    /// UPnP faults are terminal.
    fn invoke(
        &self,
        endpoint: &Endpoint,
        action: &str,
        args: &[(&str, &str)],
        cdata_args: &[(&str, &str)],
    ) -> Result<SoapCallResult, CastError> {
        let mut attempt = 0u32;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(CastError::Released);
            }
            attempt += 1;

            let result = invoke_upnp_action(
                self.transport.as_ref(),
                &endpoint.control_url,
                &endpoint.service_type,
                action,
                args,
                cdata_args,
            );

            // Renderers deliver SOAP Faults over HTTP 500; a fault is a
            // deterministic answer, not a transport failure, so it is
            // terminal no matter the status.
            let retryable = match &result {
                Ok(call) => {
                    call.status >= 500
                        && call
                            .envelope
                            .as_ref()
                            .and_then(parse_upnp_fault)
                            .is_none()
                }
                Err(e) => e.is_transient(),
            };

            if retryable && attempt < self.max_attempts {
                let delay = self.backoff_step * attempt;
                warn!(
                    "{} to {} failed (attempt {}/{}), retrying in {:?}",
                    action, self.device.device.name, attempt, self.max_attempts, delay
                );
                thread::sleep(delay);
                continue;
            }

            if attempt > 1 {
                debug!("{} finished after {} attempts", action, attempt);
            }
            return result;
        }
    }
}
