//! Error taxonomy for the protection core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtectionError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid input: {0}")]
    Input(String),

    #[error("access log I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtectionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Rejects byte input that is not valid UTF-8 text.
    pub fn from_utf8(bytes: Vec<u8>) -> std::result::Result<String, Self> {
        String::from_utf8(bytes)
            .map_err(|e| Self::Input(format!("input is not UTF-8 text: {}", e.utf8_error())))
    }
}

pub type Result<T> = std::result::Result<T, ProtectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_utf8_accepts_text() {
        let text = ProtectionError::from_utf8(b"John Smith".to_vec()).unwrap();
        assert_eq!(text, "John Smith");
    }

    #[test]
    fn test_from_utf8_rejects_binary() {
        let err = ProtectionError::from_utf8(vec![0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ProtectionError::Input(_)));
    }

    #[test]
    fn test_configuration_message() {
        let err = ProtectionError::configuration("bad pattern");
        assert_eq!(err.to_string(), "configuration error: bad pattern");
    }
}
