use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use framepace_rs::{Error, Fence, FrameRing, FrameSync, ManualFence, SlotState, WaitOutcome};

type TestSync = FrameSync<Arc<ManualFence>, Vec<u64>>;

fn frame_sync(frame_count: usize) -> (Arc<ManualFence>, TestSync) {
    let fence = Arc::new(ManualFence::new(0));
    let ring = FrameRing::from_fn(frame_count, |_| Vec::new()).unwrap();
    (fence.clone(), FrameSync::new(fence, ring))
}

/// Completes `value` from another thread after `delay`, raising `done` right before
fn complete_later(
    fence: &Arc<ManualFence>,
    value: u64,
    delay: Duration,
) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let fence = fence.clone();
        let done = done.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            done.store(true, Ordering::SeqCst);
            fence.complete(value);
        })
    };
    (done, handle)
}

#[test]
fn watermarks_strictly_increase_per_slot() {
    for frame_count in 1..=4 {
        let (fence, mut sync) = frame_sync(frame_count);
        let mut last_watermarks = vec![0; frame_count];

        for tick in 0..25 {
            // Every third tick records nothing and never submits
            if tick % 3 != 2 {
                let index = sync.current_index();
                let watermark = sync.submit_frame().unwrap();
                assert!(watermark > last_watermarks[index]);
                assert_eq!(sync.watermark(index), Some(watermark));
                last_watermarks[index] = watermark;
            }

            fence.complete_all();
            sync.advance_frame().unwrap();
        }
    }
}

#[test]
fn slots_are_never_written_while_in_flight() {
    let (fence, mut sync) = frame_sync(3);
    let gpu_running = Arc::new(AtomicBool::new(true));

    // Stand-in for the GPU timeline, slowly catching up with whatever was signaled
    let gpu = {
        let fence = fence.clone();
        let gpu_running = gpu_running.clone();
        thread::spawn(move || {
            while gpu_running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
                let next = fence.completed_value() + 1;
                if next <= fence.last_signaled() {
                    fence.complete(next);
                }
            }
        })
    };

    for frame in 0..30 {
        let index = sync.current_index();
        let watermark = sync.watermark(index).unwrap();
        assert!(fence.completed_value() >= watermark);

        sync.current_mut().unwrap().push(frame);
        sync.submit_frame().unwrap();
        sync.advance_frame().unwrap();
    }

    assert!(sync.blocking_waits() > 0);
    sync.flush_all().unwrap();
    gpu_running.store(false, Ordering::SeqCst);
    gpu.join().unwrap();

    let written: usize = sync.ring().iter().map(|slot| slot.resources.len()).sum();
    assert_eq!(written, 30);
}

#[test]
fn second_flush_changes_nothing() {
    let (fence, mut sync) = frame_sync(2);
    sync.submit_frame().unwrap();
    sync.advance_frame().unwrap();
    sync.submit_frame().unwrap();

    // The first flush signals 3 on top of the two submissions
    let (_done, gpu) = complete_later(&fence, 3, Duration::from_millis(10));
    sync.flush_all().unwrap();
    gpu.join().unwrap();
    let counter = sync.counter();
    assert_eq!(counter, 3);
    let watermarks: Vec<_> = (0..2).map(|index| sync.watermark(index)).collect();

    sync.flush_all().unwrap();
    assert_eq!(sync.counter(), counter);
    assert_eq!(fence.last_signaled(), counter);
    assert_eq!(
        (0..2).map(|index| sync.watermark(index)).collect::<Vec<_>>(),
        watermarks
    );
}

#[test]
fn flush_covers_work_queued_after_the_last_submission() {
    let (fence, mut sync) = frame_sync(2);
    assert_eq!(sync.submit_frame().unwrap(), 1);
    fence.complete(1);

    // e.g. a present queued behind the frame's commands
    sync.note_enqueued();

    let (done, gpu) = complete_later(&fence, 2, Duration::from_millis(30));
    sync.flush_all().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(fence.last_signaled(), 2);
    assert!(fence.completed_value() >= 2);
    assert_eq!(sync.watermark(0), Some(1));
    gpu.join().unwrap();
}

#[test]
fn cursor_returns_to_first_slot() {
    let (_fence, mut sync) = frame_sync(3);
    for expected in [1, 2, 0] {
        sync.advance_frame().unwrap();
        assert_eq!(sync.current_index(), expected);
    }
}

#[test]
fn reused_slot_blocks_until_gpu_catches_up() {
    let (fence, mut sync) = frame_sync(2);

    assert_eq!(sync.submit_frame().unwrap(), 1);
    assert_eq!(sync.watermark(0), Some(1));

    sync.advance_frame().unwrap();
    assert_eq!(sync.current_index(), 1);
    assert_eq!(sync.blocking_waits(), 0);

    assert_eq!(sync.submit_frame().unwrap(), 2);
    assert_eq!(sync.watermark(1), Some(2));

    let (done, gpu) = complete_later(&fence, 1, Duration::from_millis(50));
    sync.advance_frame().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(sync.current_index(), 0);
    assert!(fence.completed_value() >= 1);
    assert_eq!(sync.blocking_waits(), 1);
    gpu.join().unwrap();
}

#[test]
fn bounded_wait_reports_timeout_then_recovers() {
    let (fence, mut sync) = frame_sync(1);
    sync.submit_frame().unwrap();

    let outcome = sync
        .advance_frame_timeout(Some(Duration::from_millis(10)))
        .unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert_eq!(sync.current_slot().state, SlotState::Submitted);
    assert!(matches!(sync.current_mut(), Err(Error::SlotInFlight { .. })));

    let (_done, gpu) = complete_later(&fence, 1, Duration::from_millis(10));
    assert_eq!(sync.wait_current(None).unwrap(), WaitOutcome::Reached);
    assert_eq!(sync.current_slot().state, SlotState::Recording);
    gpu.join().unwrap();
}

#[test]
fn flush_on_resize_waits_for_every_slot() {
    let (fence, mut sync) = frame_sync(2);

    // slot 0: 1, 3, 5 and slot 1: 2, 4, with the GPU two values behind at the end
    for value in 1..=5 {
        assert_eq!(sync.submit_frame().unwrap(), value);
        if value < 5 {
            fence.complete(value.saturating_sub(1));
            sync.advance_frame().unwrap();
        }
    }
    fence.complete(3);
    assert_eq!(sync.current_index(), 0);
    assert_eq!(sync.watermark(0), Some(5));
    assert_eq!(sync.watermark(1), Some(4));

    let reached_five = Arc::new(AtomicBool::new(false));
    let gpu = {
        let fence = fence.clone();
        let reached_five = reached_five.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            fence.complete(4);
            thread::sleep(Duration::from_millis(20));
            reached_five.store(true, Ordering::SeqCst);
            fence.complete(5);
            // The flush's own signal
            thread::sleep(Duration::from_millis(10));
            fence.complete(6);
        })
    };

    sync.flush_all().unwrap();
    assert!(reached_five.load(Ordering::SeqCst));
    assert_eq!(fence.completed_value(), 6);
    assert!(
        sync.ring()
            .iter()
            .all(|slot| slot.state == SlotState::Idle)
    );
    gpu.join().unwrap();
}
