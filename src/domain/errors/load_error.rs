//! Image loading error types.

use thiserror::Error;

/// Image loading error variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("decode failure: {message}")]
    Decode { message: String },

    #[error("out of memory while decoding: {message}")]
    OutOfMemory { message: String },

    #[error("invalid target size {width}x{height}: both dimensions must be non-zero")]
    InvalidTarget { width: u32, height: u32 },

    #[error("load cancelled")]
    Cancelled,

    #[error("image loader setup failed: {message}")]
    Setup { message: String },
}

impl LoadError {
    /// Creates transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates out of memory error.
    #[must_use]
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: message.into(),
        }
    }

    /// Creates setup error.
    #[must_use]
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Returns whether the cache should be evicted and the decode retried.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(LoadError::out_of_memory("x").is_out_of_memory());
        assert!(!LoadError::decode("x").is_out_of_memory());
    }

    #[test]
    fn test_display() {
        let err = LoadError::InvalidTarget {
            width: 0,
            height: 600,
        };
        assert_eq!(
            err.to_string(),
            "invalid target size 0x600: both dimensions must be non-zero"
        );
    }
}
