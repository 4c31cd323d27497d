//! Integration tests for the Vulkan backend
//!
//! These tests exercise the backend against a real device and are marked
//! with #[ignore].
//!
//! Run with: cargo test --test vulkan_backend_tests -- --ignored --test-threads 1

use ash::vk;
use prism_framework::PrismError;
use prism_framework_backend_vulkan::{
    Backend, BackendSettings, BatchUploader, BufferDesc, MemoryLocation, MAX_FRAMES_IN_FLIGHT,
};
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Helper to create a hidden test window for surface creation
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Prism Backend Test")
        .with_inner_size(winit::dpi::LogicalSize::new(800, 600))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

// ============================================================================
// DEVICE SELECTION TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_backend_creation_selects_usable_graphics_queue() {
    let (window, _event_loop) = create_test_window();
    let backend = Backend::create(&window, BackendSettings::default()).unwrap();

    // Selection must never accept a device without a usable graphics queue
    assert!(backend.queue_infos().graphics_queue_quality >= 1);
    assert!(backend.swap_image_count() >= 2);
    assert_ne!(backend.swap_chain_extent().width, 0);
    assert_ne!(backend.swap_chain_depth_format(), vk::Format::UNDEFINED);
}

#[test]
#[ignore] // Requires GPU
fn test_ray_tracing_requirement_fails_cleanly_without_support() {
    let (window, _event_loop) = create_test_window();

    let settings = BackendSettings {
        require_ray_tracing: true,
        ..Default::default()
    };

    match Backend::create(&window, settings) {
        Ok(backend) => {
            // Hardware supports it: the loaders and properties must be live
            assert!(backend.ray_tracing_enabled());
            assert!(backend.acceleration_structure_properties().is_some());
        }
        Err(e) => {
            // No partial context, and the error names the real cause
            assert!(matches!(e, PrismError::NoSuitableDevice));
        }
    }
}

// ============================================================================
// FRAME LOOP TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_frame_slot_round_robin_over_frames() {
    let (window, _event_loop) = create_test_window();
    let mut backend = Backend::create(&window, BackendSettings::default()).unwrap();
    let worker = backend.register_worker();

    let acquire_sem = backend.create_semaphore().unwrap();
    let render_sem = backend.create_semaphore().unwrap();

    for frame in 0..(MAX_FRAMES_IN_FLIGHT as u32 * 3) {
        assert_eq!(backend.current_frame_idx(), frame % MAX_FRAMES_IN_FLIGHT as u32);

        backend.acquire_next_swap_chain_image(acquire_sem).unwrap();

        let cmd = backend.allocate_graphics_command_buffer(worker, true).unwrap();
        unsafe { backend.device().end_command_buffer(cmd).unwrap() };

        backend
            .submit_graphics(
                &[cmd],
                &[acquire_sem],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[render_sem],
            )
            .unwrap();
        backend.present(&[render_sem]).unwrap();
    }

    backend.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_recreate_swapchain_is_deterministic() {
    let (window, _event_loop) = create_test_window();
    let mut backend = Backend::create(&window, BackendSettings::default()).unwrap();

    backend.recreate_swapchain(true).unwrap();
    let format_a = backend.swap_chain_image_format();
    let extent_a = backend.swap_chain_extent();
    let count_a = backend.swap_image_count();

    backend.recreate_swapchain(true).unwrap();
    assert_eq!(backend.swap_chain_image_format(), format_a);
    assert_eq!(backend.swap_chain_extent(), extent_a);
    assert_eq!(backend.swap_image_count(), count_a);
}

// ============================================================================
// UPLOAD TESTS
// ============================================================================

#[derive(Clone, Copy, PartialEq, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

#[test]
#[ignore] // Requires GPU
fn test_batch_upload_round_trip() {
    let (window, _event_loop) = create_test_window();
    let mut backend = Backend::create(&window, BackendSettings::default()).unwrap();
    let worker = backend.register_worker();

    // Typed vertex data, uploaded as bytes into a host-visible destination
    // so the result can be read back directly
    let vertices: Vec<Vertex> = (0..400)
        .map(|i| Vertex {
            position: [i as f32, i as f32 * 2.0, i as f32 * 3.0],
            uv: [i as f32 * 0.25, i as f32 * 0.5],
        })
        .collect();
    let payload: Vec<u8> = bytemuck::cast_slice(&vertices).to_vec();
    let dst = backend
        .create_buffer(
            &BufferDesc {
                usage: vk::BufferUsageFlags::TRANSFER_DST,
                size: payload.len() as u64,
                location: MemoryLocation::GpuToCpu,
                name: "readback",
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let mut uploader = BatchUploader::begin(&backend, worker).unwrap();
    uploader
        .upload_buffer_data(&backend, dst, &payload, 0)
        .unwrap();
    uploader.submit(&backend).unwrap();

    let readback = unsafe {
        let ptr = backend.buffer(dst).unwrap().mapped_ptr().unwrap();
        std::slice::from_raw_parts(ptr, payload.len()).to_vec()
    };
    assert_eq!(readback, payload);
}

#[test]
#[ignore] // Requires GPU
fn test_batch_upload_overflows_into_additional_staging_buffers() {
    let (window, _event_loop) = create_test_window();
    let mut backend = Backend::create(&window, BackendSettings::default()).unwrap();
    let worker = backend.register_worker();

    // Three uploads of 12 MiB each overflow the 16 MiB staging chunk twice;
    // every byte must still land at its destination offset.
    const CHUNK: usize = 12 * 1024 * 1024;
    let payload: Vec<u8> = (0..CHUNK * 3).map(|i| (i % 241) as u8).collect();

    let dst = backend
        .create_buffer(
            &BufferDesc {
                usage: vk::BufferUsageFlags::TRANSFER_DST,
                size: payload.len() as u64,
                location: MemoryLocation::GpuToCpu,
                name: "readback_large",
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let mut uploader = BatchUploader::begin(&backend, worker).unwrap();
    for (i, chunk) in payload.chunks(CHUNK).enumerate() {
        uploader
            .upload_buffer_data(&backend, dst, chunk, (i * CHUNK) as u64)
            .unwrap();
    }
    uploader.submit(&backend).unwrap();

    let readback = unsafe {
        let ptr = backend.buffer(dst).unwrap().mapped_ptr().unwrap();
        std::slice::from_raw_parts(ptr, payload.len()).to_vec()
    };
    assert_eq!(readback, payload);
}

// ============================================================================
// DELETION QUEUE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_queued_deletion_invalidates_handle_immediately() {
    let (window, _event_loop) = create_test_window();
    let mut backend = Backend::create(&window, BackendSettings::default()).unwrap();

    let buffer = backend
        .create_buffer(
            &BufferDesc {
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                size: 256,
                location: MemoryLocation::CpuToGpu,
                name: "doomed",
                ..Default::default()
            },
            None,
        )
        .unwrap();

    assert!(backend.buffer(buffer).is_some());
    backend.queue_object_deletion(buffer);
    // The arena no longer owns it; physical destruction happens after the
    // in-flight window has elapsed
    assert!(backend.buffer(buffer).is_none());

    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        backend.process_deletion_queue();
    }
}

// ============================================================================
// WORKER POOL TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_workers_get_disjoint_command_pools() {
    let (window, _event_loop) = create_test_window();
    let backend = Backend::create(&window, BackendSettings::default()).unwrap();

    let worker_a = backend.register_worker();
    let worker_b = backend.register_worker();

    let pool_a = backend.graphics_command_pool(worker_a).unwrap();
    let pool_b = backend.graphics_command_pool(worker_b).unwrap();
    assert_ne!(pool_a, pool_b);

    // Repeated lookups return the cached pool
    assert_eq!(backend.graphics_command_pool(worker_a).unwrap(), pool_a);

    // Pools are per (worker, role)
    let transfer_a = backend.transfer_command_pool(worker_a).unwrap();
    assert_ne!(transfer_a, pool_a);
}
