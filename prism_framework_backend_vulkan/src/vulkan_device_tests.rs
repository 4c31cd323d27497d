use super::{find_queue_assignments, role_quality};
use ash::vk;

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

// ============================================================================
// Role quality scoring
// ============================================================================

#[test]
fn test_dedicated_family_scores_three() {
    assert_eq!(role_quality(vk::QueueFlags::TRANSFER, vk::QueueFlags::TRANSFER), 3);
    assert_eq!(role_quality(vk::QueueFlags::COMPUTE, vk::QueueFlags::COMPUTE), 3);
}

#[test]
fn test_shared_family_scores_two() {
    let flags = vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
    assert_eq!(role_quality(flags, vk::QueueFlags::COMPUTE), 2);
    assert_eq!(role_quality(flags, vk::QueueFlags::TRANSFER), 2);
}

#[test]
fn test_do_everything_family_scores_one() {
    let flags = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
    assert_eq!(role_quality(flags, vk::QueueFlags::GRAPHICS), 1);
    assert_eq!(role_quality(flags, vk::QueueFlags::COMPUTE), 1);
    assert_eq!(role_quality(flags, vk::QueueFlags::TRANSFER), 1);
}

#[test]
fn test_absent_role_scores_zero() {
    assert_eq!(role_quality(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS), 0);
    assert_eq!(role_quality(vk::QueueFlags::empty(), vk::QueueFlags::TRANSFER), 0);
}

#[test]
fn test_sparse_binding_does_not_affect_score() {
    // Only graphics/compute/transfer compete; other bits are irrelevant
    let flags = vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING;
    assert_eq!(role_quality(flags, vk::QueueFlags::TRANSFER), 3);
}

// ============================================================================
// Queue assignment
// ============================================================================

#[test]
fn test_typical_desktop_gpu_layout() {
    // Family 0: graphics+compute+transfer, 1: dedicated transfer, 2: compute+transfer
    let families = [
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
    ];
    let present = [true, false, false];

    let infos = find_queue_assignments(&families, &present).unwrap();

    assert_eq!(infos.graphics_queue_index, 0);
    assert_eq!(infos.graphics_queue_quality, 1);
    assert_eq!(infos.compute_queue_index, Some(2));
    assert_eq!(infos.compute_queue_quality, 2);
    assert_eq!(infos.transfer_queue_index, Some(1));
    assert_eq!(infos.transfer_queue_quality, 3);
    assert_eq!(infos.presentation_queue_index, 0);
    assert!(infos.asynchronous_compute());
    assert!(infos.dedicated_transfer());
}

#[test]
fn test_single_family_device() {
    let families = [family(
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
    )];
    let present = [true];

    let infos = find_queue_assignments(&families, &present).unwrap();

    assert_eq!(infos.graphics_queue_quality, 1);
    assert_eq!(infos.compute_queue_index, Some(0));
    assert_eq!(infos.transfer_queue_index, Some(0));
    assert!(!infos.asynchronous_compute());
    assert!(!infos.dedicated_transfer());
    assert_eq!(infos.unique_family_indices(), vec![0]);
}

#[test]
fn test_no_graphics_family_rejected() {
    // A compute-only device never yields an assignment
    let families = [
        family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::TRANSFER),
    ];
    let present = [true, true];

    assert!(find_queue_assignments(&families, &present).is_none());
}

#[test]
fn test_no_present_family_rejected() {
    let families = [family(
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
    )];
    let present = [false];

    assert!(find_queue_assignments(&families, &present).is_none());
}

#[test]
fn test_presentation_falls_back_to_non_graphics_family() {
    let families = [
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::TRANSFER),
    ];
    // Graphics family cannot present, transfer family can (odd, but legal)
    let present = [false, true];

    let infos = find_queue_assignments(&families, &present).unwrap();
    assert_eq!(infos.graphics_queue_index, 0);
    assert_eq!(infos.presentation_queue_index, 1);
}

#[test]
fn test_zero_count_families_skipped() {
    let mut empty = family(vk::QueueFlags::GRAPHICS);
    empty.queue_count = 0;
    let families = [
        empty,
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
    ];
    let present = [true, true];

    let infos = find_queue_assignments(&families, &present).unwrap();
    assert_eq!(infos.graphics_queue_index, 1);
}

#[test]
fn test_unique_family_indices_deduplicated() {
    let families = [
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::TRANSFER),
    ];
    let present = [true, false];

    let infos = find_queue_assignments(&families, &present).unwrap();
    // Graphics, compute and present share family 0; transfer is family 1
    assert_eq!(infos.unique_family_indices(), vec![0, 1]);
}
