use super::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format};
use ash::vk;

fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR { format, color_space }
}

// ============================================================================
// Surface format negotiation
// ============================================================================

#[test]
fn test_prefers_srgb_format_when_requested() {
    let available = [
        fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ];

    let chosen = choose_surface_format(&available, true);
    assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
}

#[test]
fn test_prefers_unorm_format_when_srgb_disabled() {
    let available = [
        fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ];

    let chosen = choose_surface_format(&available, false);
    assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
}

#[test]
fn test_falls_back_to_first_available_format() {
    let available = [
        fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ];

    let chosen = choose_surface_format(&available, true);
    assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
}

#[test]
fn test_format_choice_is_deterministic() {
    let available = [
        fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ];

    let first = choose_surface_format(&available, true);
    let second = choose_surface_format(&available, true);
    assert_eq!(first.format, second.format);
    assert_eq!(first.color_space, second.color_space);
}

// ============================================================================
// Present mode negotiation
// ============================================================================

#[test]
fn test_vsync_always_picks_fifo() {
    let available = [
        vk::PresentModeKHR::MAILBOX,
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::FIFO,
    ];
    assert_eq!(choose_present_mode(&available, true), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_no_vsync_prefers_mailbox() {
    let available = [
        vk::PresentModeKHR::FIFO,
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::MAILBOX,
    ];
    assert_eq!(choose_present_mode(&available, false), vk::PresentModeKHR::MAILBOX);
}

#[test]
fn test_no_vsync_falls_back_to_immediate_then_fifo() {
    let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
    assert_eq!(choose_present_mode(&available, false), vk::PresentModeKHR::IMMEDIATE);

    let fifo_only = [vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&fifo_only, false), vk::PresentModeKHR::FIFO);
}

// ============================================================================
// Extent negotiation
// ============================================================================

fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32), min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
        max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
        min_image_count: min_images,
        max_image_count: max_images,
        ..Default::default()
    }
}

#[test]
fn test_extent_uses_surface_fixed_size() {
    let capabilities = caps((800, 600), (1, 1), (4096, 4096), 2, 8);
    let extent = choose_extent(&capabilities, vk::Extent2D { width: 1920, height: 1080 });
    assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
}

#[test]
fn test_extent_clamps_framebuffer_when_any_size_allowed() {
    // current_extent == u32::MAX means the surface takes whatever we pick
    let capabilities = caps((u32::MAX, u32::MAX), (640, 480), (1280, 720), 2, 8);

    let extent = choose_extent(&capabilities, vk::Extent2D { width: 1920, height: 1080 });
    assert_eq!(extent, vk::Extent2D { width: 1280, height: 720 });

    let extent = choose_extent(&capabilities, vk::Extent2D { width: 320, height: 200 });
    assert_eq!(extent, vk::Extent2D { width: 640, height: 480 });
}

// ============================================================================
// Image count negotiation
// ============================================================================

#[test]
fn test_image_count_is_min_plus_one() {
    let capabilities = caps((800, 600), (1, 1), (4096, 4096), 2, 8);
    assert_eq!(choose_image_count(&capabilities), 3);
}

#[test]
fn test_image_count_clamped_to_max() {
    let capabilities = caps((800, 600), (1, 1), (4096, 4096), 3, 3);
    assert_eq!(choose_image_count(&capabilities), 3);
}

#[test]
fn test_image_count_unbounded_when_max_is_zero() {
    let capabilities = caps((800, 600), (1, 1), (4096, 4096), 4, 0);
    assert_eq!(choose_image_count(&capabilities), 5);
}
