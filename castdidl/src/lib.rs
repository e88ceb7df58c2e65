//! # castdidl - DIDL-Lite metadata
//!
//! Model and helpers for the DIDL-Lite documents a control point hands to
//! `SetAVTransportURI` as `CurrentURIMetaData`, plus MIME guessing from
//! URL extensions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DIDL_NS: &str = "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";
pub const UPNP_NS: &str = "urn:schemas-upnp-org:metadata-1-0/upnp/";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

pub const CLASS_VIDEO: &str = "object.item.videoItem";
pub const CLASS_AUDIO: &str = "object.item.audioItem.musicTrack";

/// HLS playlists carry their own MIME and are rendered as video.
pub const MIME_HLS: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Error)]
pub enum DidlError {
    #[error("DIDL-Lite parse error: {0}")]
    Parse(#[from] quick_xml::de::DeError),

    #[error("DIDL-Lite serialization error: {0}")]
    Serialize(#[from] quick_xml::se::SeError),
}

// ============= Structures DIDL-Lite =============

/// Racine d'un document DIDL-Lite
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "DIDL-Lite")]
pub struct DidlLite {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,

    #[serde(rename = "@xmlns:upnp", skip_serializing_if = "Option::is_none")]
    pub xmlns_upnp: Option<String>,

    #[serde(rename = "@xmlns:dc", skip_serializing_if = "Option::is_none")]
    pub xmlns_dc: Option<String>,

    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

impl Default for DidlLite {
    fn default() -> Self {
        Self {
            xmlns: DIDL_NS.to_string(),
            xmlns_upnp: Some(UPNP_NS.to_string()),
            xmlns_dc: Some(DC_NS.to_string()),
            items: Vec::new(),
        }
    }
}

/// Item représentant un objet média
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@parentID")]
    pub parent_id: String,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(rename = "dc:title", alias = "title")]
    pub title: String,

    #[serde(rename = "upnp:class", alias = "class")]
    pub class: String,

    #[serde(rename = "res", default)]
    pub resources: Vec<Resource>,
}

/// Ressource média
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "@protocolInfo")]
    pub protocol_info: String,

    #[serde(rename = "$text")]
    pub url: String,
}

impl DidlLite {
    pub fn parse(input: &str) -> Result<Self, DidlError> {
        Ok(quick_xml::de::from_str(input)?)
    }

    pub fn to_xml(&self) -> Result<String, DidlError> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

// ============= Synthèse pour SetAVTransportURI =============

/// Guess a MIME type from the URL's extension.
///
/// Unknown or missing extensions fall back to `video/mp4`: renderers cope
/// better with a video default than with no metadata at all.
pub fn guess_mime(url: &str) -> &'static str {
    // strip query string and fragment before looking at the extension
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "ts" => "video/mp2t",
        "m3u8" => MIME_HLS,
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/x-wav",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        _ => "video/mp4",
    }
}

/// DIDL `upnp:class` for a MIME type: video and HLS map to the video
/// item class, everything else is treated as a music track.
pub fn upnp_class_for_mime(mime: &str) -> &'static str {
    if mime.starts_with("video/") || mime == MIME_HLS {
        CLASS_VIDEO
    } else {
        CLASS_AUDIO
    }
}

/// Build the single-item DIDL-Lite document for `CurrentURIMetaData`.
///
/// The returned string is the bare document; the SOAP layer embeds it in
/// a CDATA section.
pub fn metadata_for(url: &str, title: &str) -> Result<String, DidlError> {
    let mime = guess_mime(url);
    let title = if title.trim().is_empty() {
        "Media"
    } else {
        title.trim()
    };

    let didl = DidlLite {
        items: vec![Item {
            id: "0".to_string(),
            parent_id: "-1".to_string(),
            restricted: Some("1".to_string()),
            title: title.to_string(),
            class: upnp_class_for_mime(mime).to_string(),
            resources: vec![Resource {
                protocol_info: format!("http-get:*:{mime}:*"),
                url: url.to_string(),
            }],
        }],
        ..DidlLite::default()
    };

    didl.to_xml()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("http://h/movie.mp4"), "video/mp4");
        assert_eq!(guess_mime("http://h/movie.MKV"), "video/x-matroska");
        assert_eq!(guess_mime("http://h/live.m3u8?token=1"), MIME_HLS);
        assert_eq!(guess_mime("http://h/song.mp3"), "audio/mpeg");
        assert_eq!(guess_mime("http://h/stream"), "video/mp4");
        assert_eq!(guess_mime("http://h/file.unknown"), "video/mp4");
    }

    #[test]
    fn test_upnp_class() {
        assert_eq!(upnp_class_for_mime("video/mp4"), CLASS_VIDEO);
        assert_eq!(upnp_class_for_mime(MIME_HLS), CLASS_VIDEO);
        assert_eq!(upnp_class_for_mime("audio/mpeg"), CLASS_AUDIO);
    }

    #[test]
    fn metadata_contains_item_and_resource() {
        let xml = metadata_for("http://host/movie.mp4", "Film").unwrap();
        assert!(xml.starts_with("<DIDL-Lite"));
        assert!(xml.contains(DIDL_NS));
        assert!(xml.contains("<dc:title>Film</dc:title>"));
        assert!(xml.contains("object.item.videoItem"));
        assert!(xml.contains("http-get:*:video/mp4:*"));
        assert!(xml.contains("http://host/movie.mp4"));
    }

    #[test]
    fn metadata_audio_class_for_mp3() {
        let xml = metadata_for("http://host/song.mp3", "Song").unwrap();
        assert!(xml.contains(CLASS_AUDIO));
    }

    #[test]
    fn metadata_default_title() {
        let xml = metadata_for("http://host/movie.mp4", "  ").unwrap();
        assert!(xml.contains("<dc:title>Media</dc:title>"));
    }

    #[test]
    fn metadata_round_trips_through_parser() {
        let xml = metadata_for("http://host/movie.mp4", "Film").unwrap();
        let parsed = DidlLite::parse(&xml).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Film");
        assert_eq!(parsed.items[0].class, CLASS_VIDEO);
        assert_eq!(parsed.items[0].resources[0].url, "http://host/movie.mp4");
    }
}
