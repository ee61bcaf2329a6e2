// src/models/binary.rs
use std::fmt;
use std::sync::Arc;

/// Handle to a generated (or uploaded) binary payload.
///
/// Inline payloads are carried in memory and shared cheaply between aggregate
/// snapshots. Remote payloads are only a URI and must be fetched at export
/// time, which may fail if the service has expired them.
#[derive(Clone, PartialEq, Eq)]
pub enum BinaryRef {
    Inline { mime_type: String, data: Arc<[u8]> },
    Remote { mime_type: String, uri: String },
}

impl BinaryRef {
    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        BinaryRef::Inline {
            mime_type: mime_type.into(),
            data: Arc::from(data),
        }
    }

    pub fn remote(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        BinaryRef::Remote {
            mime_type: mime_type.into(),
            uri: uri.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            BinaryRef::Inline { mime_type, .. } | BinaryRef::Remote { mime_type, .. } => mime_type,
        }
    }

    /// File extension used when the payload is written into a bundle.
    pub fn extension(&self) -> &'static str {
        extension_for_mime(self.mime_type())
    }

    pub fn is_image(&self) -> bool {
        self.mime_type().starts_with("image/")
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    // Parameters such as "audio/L16;rate=24000" are irrelevant for naming.
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// Detect the image type of raw upload bytes from their signature.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

// Inline payloads can be megabytes; never dump them into logs.
impl fmt::Debug for BinaryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryRef::Inline { mime_type, data } => f
                .debug_struct("Inline")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
            BinaryRef::Remote { mime_type, uri } => f
                .debug_struct("Remote")
                .field("mime_type", mime_type)
                .field("uri", uri)
                .finish(),
        }
    }
}
