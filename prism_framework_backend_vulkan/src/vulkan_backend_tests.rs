use super::{BackendSettings, FrameSlots};
use crate::vulkan_arena::MAX_FRAMES_IN_FLIGHT;

// ============================================================================
// Frame slot round-robin
// ============================================================================

#[test]
fn test_frame_slots_start_at_zero() {
    let slots = FrameSlots::new();
    assert_eq!(slots.current(), 0);
}

#[test]
fn test_frame_slots_cycle_round_robin() {
    let mut slots = FrameSlots::new();
    // Two full cycles in strict order
    for _ in 0..2 {
        for expected in 1..MAX_FRAMES_IN_FLIGHT {
            assert_eq!(slots.advance(), expected);
        }
        assert_eq!(slots.advance(), 0);
    }
}

#[test]
fn test_frame_slots_stay_in_range() {
    // The slot index never depends on how many swap images exist; it only
    // cycles through the fixed in-flight window.
    let mut slots = FrameSlots::new();
    for _ in 0..100 {
        assert!(slots.advance() < MAX_FRAMES_IN_FLIGHT);
    }
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn test_default_settings() {
    let settings = BackendSettings::default();
    assert!(settings.vsync);
    assert!(settings.srgb_swapchain);
    assert!(!settings.enable_validation);
    assert!(!settings.require_ray_tracing);
    assert!(settings.device_extensions.is_empty());
}
