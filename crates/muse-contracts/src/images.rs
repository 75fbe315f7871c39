use serde::{Deserialize, Serialize};

/// One reference image as the generation service consumes it: raw bytes
/// already base64-encoded, plus the MIME type they were encoded from.
///
/// Owned by the caller and passed by reference into requests; the engine
/// never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub payload: String,
    pub mime_type: String,
}

impl ImageReference {
    pub fn new(payload: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Data-URI preview string retained as provenance on result records.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::ImageReference;

    #[test]
    fn data_uri_embeds_mime_and_payload() {
        let image = ImageReference::new("aGVsbG8=", "image/png");
        assert_eq!(image.data_uri(), "data:image/png;base64,aGVsbG8=");
    }
}
