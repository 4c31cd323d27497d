//! Error types for the Prism framework
//!
//! This module defines the error taxonomy shared by the framework core and
//! the GPU backends: fatal initialization failures, per-call resource
//! creation failures, fatal runtime device errors, and the one recoverable
//! condition (swapchain staleness).

use std::fmt;

/// Result type for Prism framework operations
pub type PrismResult<T> = Result<T, PrismError>;

/// Prism framework errors
#[derive(Debug, Clone)]
pub enum PrismError {
    /// No physical device satisfied the backend's requirements
    NoSuitableDevice,

    /// Initialization failed (instance, surface, device, swapchain, validation layers)
    InitializationFailed(String),

    /// A resource factory call failed (bad format/usage combination, driver refusal)
    ResourceCreationFailed(String),

    /// Out of GPU memory
    OutOfMemory,

    /// A queue submission was rejected (typically device loss); fatal
    SubmissionError(String),

    /// The swapchain no longer matches the surface; recreate and retry the frame
    SwapchainOutOfDate,

    /// Invalid resource handle or descriptor
    InvalidResource(String),

    /// Backend-specific error that fits no other category
    BackendError(String),
}

impl fmt::Display for PrismError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrismError::NoSuitableDevice => write!(f, "No suitable GPU device found"),
            PrismError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            PrismError::ResourceCreationFailed(msg) => write!(f, "Resource creation failed: {}", msg),
            PrismError::OutOfMemory => write!(f, "Out of GPU memory"),
            PrismError::SubmissionError(msg) => write!(f, "Queue submission failed: {}", msg),
            PrismError::SwapchainOutOfDate => write!(f, "Swapchain is out of date"),
            PrismError::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            PrismError::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for PrismError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
