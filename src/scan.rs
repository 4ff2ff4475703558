//! Code decoding capability.
//!
//! Turning a camera frame into a string is the platform's job. The engine
//! only ever compares the decoded text.

/// Decodes a scannable code from a captured frame.
pub trait CodeDecoder: Send + Sync {
    /// Returns the code's text, or `None` if the frame holds no readable code.
    fn decode(&self, frame: &[u8]) -> Option<String>;
}

/// Treats the frame as the code's UTF-8 text.
///
/// For platforms that decode upstream and hand over the payload, and for
/// entering a code by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextDecoder;

impl CodeDecoder for PlainTextDecoder {
    fn decode(&self, frame: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(frame).ok()?.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}
