//! Unit tests for error.rs
//!
//! Tests all PrismError variants and their implementations
//! (Display, Debug, Clone, std::error::Error).

use crate::error::{PrismError, PrismResult};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_no_suitable_device_display() {
    let err = PrismError::NoSuitableDevice;
    assert_eq!(format!("{}", err), "No suitable GPU device found");
}

#[test]
fn test_initialization_failed_display() {
    let err = PrismError::InitializationFailed("surface creation failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Initialization failed"));
    assert!(display.contains("surface creation failed"));
}

#[test]
fn test_resource_creation_failed_display() {
    let err = PrismError::ResourceCreationFailed("unsupported format".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Resource creation failed"));
    assert!(display.contains("unsupported format"));
}

#[test]
fn test_out_of_memory_display() {
    let err = PrismError::OutOfMemory;
    assert_eq!(format!("{}", err), "Out of GPU memory");
}

#[test]
fn test_submission_error_display() {
    let err = PrismError::SubmissionError("DEVICE_LOST".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Queue submission failed"));
    assert!(display.contains("DEVICE_LOST"));
}

#[test]
fn test_swapchain_out_of_date_display() {
    let err = PrismError::SwapchainOutOfDate;
    assert_eq!(format!("{}", err), "Swapchain is out of date");
}

#[test]
fn test_invalid_resource_display() {
    let err = PrismError::InvalidResource("stale buffer handle".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid resource"));
    assert!(display.contains("stale buffer handle"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = PrismError::NoSuitableDevice;
    // Verify PrismError implements std::error::Error trait
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug() {
    assert!(format!("{:?}", PrismError::NoSuitableDevice).contains("NoSuitableDevice"));
    assert!(format!("{:?}", PrismError::OutOfMemory).contains("OutOfMemory"));
    assert!(format!("{:?}", PrismError::SwapchainOutOfDate).contains("SwapchainOutOfDate"));
    assert!(
        format!("{:?}", PrismError::SubmissionError("x".to_string())).contains("SubmissionError")
    );
}

#[test]
fn test_error_clone() {
    let err1 = PrismError::SubmissionError("lost".to_string());
    let err2 = err1.clone();
    assert_eq!(format!("{}", err1), format!("{}", err2));

    let err3 = PrismError::SwapchainOutOfDate;
    let err4 = err3.clone();
    assert_eq!(format!("{}", err3), format!("{}", err4));
}

// ============================================================================
// RESULT TYPE TESTS
// ============================================================================

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> PrismResult<u32> {
        Err(PrismError::NoSuitableDevice)
    }

    fn outer() -> PrismResult<u32> {
        inner()?;
        Ok(42)
    }

    let result = outer();
    assert!(result.is_err());
}

#[test]
fn test_error_message_content() {
    let err = PrismError::ResourceCreationFailed("image 4096x4096 D32_SFLOAT".to_string());
    assert!(format!("{}", err).contains("4096x4096"));
}
