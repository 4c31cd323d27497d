use super::aligned_size;

// ============================================================================
// Alignment arithmetic
// ============================================================================

#[test]
fn test_aligned_size_already_aligned() {
    assert_eq!(aligned_size(256, 256), 256);
    assert_eq!(aligned_size(0, 64), 0);
}

#[test]
fn test_aligned_size_rounds_up() {
    assert_eq!(aligned_size(1, 256), 256);
    assert_eq!(aligned_size(255, 256), 256);
    assert_eq!(aligned_size(257, 256), 512);
}

#[test]
fn test_aligned_size_small_alignment() {
    assert_eq!(aligned_size(13, 4), 16);
    assert_eq!(aligned_size(16, 4), 16);
    assert_eq!(aligned_size(17, 4), 20);
}
