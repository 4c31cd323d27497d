use super::{DeletionQueue, MAX_FRAMES_IN_FLIGHT};
use std::cell::RefCell;
use std::rc::Rc;

/// Records the process-call number at which each object was destroyed
struct Tracker {
    destroyed: Rc<RefCell<Vec<(u32, u32)>>>, // (object id, frame of destruction)
    frame: Rc<RefCell<u32>>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            destroyed: Rc::new(RefCell::new(Vec::new())),
            frame: Rc::new(RefCell::new(0)),
        }
    }

    fn process(&self, queue: &mut DeletionQueue<u32>) {
        *self.frame.borrow_mut() += 1;
        let frame = *self.frame.borrow();
        let destroyed = Rc::clone(&self.destroyed);
        queue.process(|id| destroyed.borrow_mut().push((*id, frame)));
    }
}

// ============================================================================
// Countdown policy tests
// ============================================================================

#[test]
fn test_nothing_destroyed_before_countdown_expires() {
    let mut queue = DeletionQueue::new();
    let tracker = Tracker::new();

    queue.queue(1u32);
    queue.queue(2u32);

    for _ in 0..MAX_FRAMES_IN_FLIGHT - 1 {
        tracker.process(&mut queue);
        assert!(tracker.destroyed.borrow().is_empty());
    }
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_all_destroyed_after_exactly_max_frames() {
    let mut queue = DeletionQueue::new();
    let tracker = Tracker::new();

    for id in 0..5u32 {
        queue.queue(id);
    }

    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        tracker.process(&mut queue);
    }

    let destroyed = tracker.destroyed.borrow();
    assert_eq!(destroyed.len(), 5);
    // FIFO order preserved
    let ids: Vec<u32> = destroyed.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    // All on the final frame, none earlier
    assert!(destroyed.iter().all(|(_, f)| *f == MAX_FRAMES_IN_FLIGHT as u32));
    drop(destroyed);
    assert!(queue.is_empty());
}

#[test]
fn test_one_object_per_frame_staggered_destruction() {
    // One object queued each frame for three frames: after the third process
    // call the first object is gone while the second and third remain.
    let mut queue = DeletionQueue::new();
    let tracker = Tracker::new();

    queue.queue(10u32);
    tracker.process(&mut queue); // frame 1
    queue.queue(20u32);
    tracker.process(&mut queue); // frame 2
    queue.queue(30u32);
    tracker.process(&mut queue); // frame 3

    {
        let destroyed = tracker.destroyed.borrow();
        assert_eq!(destroyed.as_slice(), &[(10, 3)]);
    }
    assert_eq!(queue.len(), 2);

    tracker.process(&mut queue); // frame 4 -> 20 matures
    tracker.process(&mut queue); // frame 5 -> 30 matures

    let destroyed = tracker.destroyed.borrow();
    assert_eq!(destroyed.as_slice(), &[(10, 3), (20, 4), (30, 5)]);
}

#[test]
fn test_drain_destroys_everything_immediately() {
    let mut queue = DeletionQueue::new();
    queue.queue(1u32);
    queue.process(|_| panic!("nothing should mature on the first frame"));
    queue.queue(2u32);

    let mut drained = Vec::new();
    queue.drain(|id| drained.push(*id));

    assert_eq!(drained, vec![1, 2]);
    assert!(queue.is_empty());
}

#[test]
fn test_empty_queue_process_is_noop() {
    let mut queue: DeletionQueue<u32> = DeletionQueue::new();
    queue.process(|_| panic!("no entries to destroy"));
    assert!(queue.is_empty());
}
