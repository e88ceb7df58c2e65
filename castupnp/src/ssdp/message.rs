//! HTTPU message parsing for the control-point side of SSDP.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::trace;

use super::DEFAULT_MAX_AGE;

/// Événements SSDP intéressants pour un control point
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

impl SsdpEvent {
    /// The description URL carried by the message, when it has one.
    pub fn location(&self) -> Option<&str> {
        match self {
            SsdpEvent::Alive { location, .. } | SsdpEvent::SearchResponse { location, .. } => {
                Some(location)
            }
            SsdpEvent::ByeBye { .. } => None,
        }
    }

    pub fn usn(&self) -> &str {
        match self {
            SsdpEvent::Alive { usn, .. }
            | SsdpEvent::ByeBye { usn, .. }
            | SsdpEvent::SearchResponse { usn, .. } => usn,
        }
    }
}

/// Parse a raw HTTPU datagram into an [`SsdpEvent`].
///
/// Returns `None` for anything a control point must ignore: M-SEARCH from
/// other control points, unknown start lines, NOTIFY with an unknown NTS,
/// and messages missing LOCATION or USN.
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    let result = if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        handle_search_response(&headers, from)
    } else if upper.starts_with("M-SEARCH ") {
        // Another control point querying the network; we are not a device.
        None
    } else {
        trace!("Unknown SSDP message type from {}: {}", from, first_line);
        None
    };

    if result.is_none() {
        trace!("SSDP message from {} could not be parsed:\n{}", from, data);
    }

    result
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    // Critical headers: NTS, NT, USN (required by UPnP spec)
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    if nts == "ssdp:alive" {
        // LOCATION is required for alive notifications
        let location = match headers.get("LOCATION") {
            Some(loc) => loc.to_string(),
            None => {
                trace!(
                    "NOTIFY ssdp:alive from {} missing LOCATION header, ignoring",
                    from
                );
                return None;
            }
        };

        let server = headers
            .get("SERVER")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let max_age = parse_max_age(headers.get("CACHE-CONTROL"));

        Some(SsdpEvent::Alive {
            usn,
            nt,
            location,
            server,
            max_age,
            from,
        })
    } else if nts == "ssdp:byebye" {
        Some(SsdpEvent::ByeBye { usn, nt, from })
    } else {
        trace!("Unknown NTS value from {}: {}", from, nts);
        None
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    // Critical headers: USN, LOCATION (required by UPnP spec)
    let usn = match headers.get("USN") {
        Some(u) => u.to_string(),
        None => {
            trace!("Search response from {} missing USN header, ignoring", from);
            return None;
        }
    };
    let location = match headers.get("LOCATION") {
        Some(loc) => loc.to_string(),
        None => {
            trace!(
                "Search response from {} missing LOCATION header, ignoring",
                from
            );
            return None;
        }
    };
    let st = headers.get("ST").cloned().unwrap_or_default();

    let server = headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let max_age = parse_max_age(headers.get("CACHE-CONTROL"));

    Some(SsdpEvent::SearchResponse {
        usn,
        st,
        location,
        server,
        max_age,
        from,
    })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // Empty line marks end of headers
        if line.is_empty() {
            break;
        }

        // Split on first ':' only (values may contain ':')
        if let Some(colon_pos) = line.find(':') {
            let (name, value_with_colon) = line.split_at(colon_pos);
            let value = &value_with_colon[1..];

            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();

            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            } else {
                trace!("Skipping malformed header: '{}'", line);
            }
        } else {
            trace!("Skipping line without colon: '{}'", line);
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!(
            "Could not parse max-age from CACHE-CONTROL: '{}', using default {}",
            v, DEFAULT_MAX_AGE
        );
    }
    DEFAULT_MAX_AGE
}
