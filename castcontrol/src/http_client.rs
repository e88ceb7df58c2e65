//! Short-lived HTTP requests with an optional in-memory response cache
//! for device descriptions.
//!
//! Retry is deliberately absent at this layer; it belongs to the media
//! controller, which knows which failures are worth retrying.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use ureq::Agent;

use crate::config::{CastConfig, USER_AGENT};
use crate::errors::CastError;
use crate::soap_client::{SoapHttpReply, SoapTransport};

/// Content types worth caching: everything a description endpoint may
/// legitimately answer with.
const CACHEABLE_TYPES: [&str; 4] = ["text/xml", "application/xml", "text/html", "text/plain"];

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

struct CacheEntry {
    response: HttpResponse,
    inserted_at: Instant,
}

pub struct HttpClient {
    agent: Agent,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
}

impl HttpClient {
    pub fn new(config: &CastConfig) -> Self {
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(Duration::from_millis(config.http_connect_timeout_ms)))
            .timeout_recv_response(Some(Duration::from_millis(config.http_read_timeout_ms)))
            .timeout_recv_body(Some(Duration::from_millis(config.http_read_timeout_ms)))
            .user_agent(USER_AGENT)
            .build();

        Self {
            agent: agent_config.into(),
            cache: Mutex::new(HashMap::new()),
            cache_ttl: Duration::from_millis(config.description_cache_ttl_ms),
        }
    }

    /// GET `url`. Any status other than 200 is an error.
    ///
    /// With `use_cache`, a fresh cached response is returned without
    /// touching the network, and a new response is cached when its
    /// content type allows it.
    pub fn get(&self, url: &str, use_cache: bool) -> Result<HttpResponse, CastError> {
        if use_cache {
            if let Some(hit) = self.cached(url) {
                trace!("HTTP cache hit for {}", url);
                return Ok(hit);
            }
        }

        debug!("GET {}", url);
        let mut response = self
            .agent
            .get(url)
            .header("Connection", "close")
            .call()
            .map_err(CastError::network)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(CastError::network)?;

        if status != 200 {
            return Err(CastError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        let response = HttpResponse {
            status,
            content_type,
            body,
        };

        if use_cache && is_cacheable(&response.content_type) {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(
                url.to_string(),
                CacheEntry {
                    response: response.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }

        Ok(response)
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    fn cached(&self, url: &str) -> Option<HttpResponse> {
        let mut cache = self.cache.lock().unwrap();
        match cache.get(url) {
            Some(entry) if entry.inserted_at.elapsed() < self.cache_ttl => {
                Some(entry.response.clone())
            }
            Some(_) => {
                cache.remove(url);
                None
            }
            None => None,
        }
    }
}

impl SoapTransport for HttpClient {
    fn post(&self, url: &str, soap_action: &str, body: &str) -> Result<SoapHttpReply, CastError> {
        debug!("POST {} (SOAPAction: {})", url, soap_action);
        let mut response = self
            .agent
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", soap_action)
            .header("Connection", "close")
            .send(body)
            .map_err(CastError::network)?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(CastError::network)?;

        Ok(SoapHttpReply { status, body })
    }
}

fn is_cacheable(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    CACHEABLE_TYPES.contains(&essence.as_str())
}
