use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nexus_pages::queue::{Coordinator, FnJob};

/// Scenario 6 (spec §8): five jobs enqueued on the same queue execute in
/// strict submission order, one at a time, and `highWaterMark` /
/// `jobsRemaining` track the run correctly.
#[test]
fn five_jobs_execute_in_order_on_a_single_queue() {
    let coordinator = Coordinator::new();
    coordinator.register_queue("q");

    let order = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let overlap_detected = Arc::new(AtomicUsize::new(0));

    for i in 0..5 {
        let order = order.clone();
        let running = running.clone();
        let overlap_detected = overlap_detected.clone();
        coordinator
            .enqueue(
                "q",
                Box::new(FnJob::new(format!("j{i}"), move || {
                    if running.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlap_detected.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                    order.lock().unwrap().push(i);
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();
    }

    for _ in 0..400 {
        if coordinator.queue_stats("q").unwrap().jobs_remaining == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let stats = coordinator.queue_stats("q").unwrap();
    assert_eq!(stats.high_water_mark, 5);
    assert_eq!(stats.jobs_remaining, 0);
    assert!(!stats.is_active);
    assert_eq!(overlap_detected.load(Ordering::SeqCst), 0);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

/// Two independently-registered queues run their workers concurrently;
/// neither blocks on the other's backlog.
#[test]
fn independent_queues_do_not_block_each_other() {
    let coordinator = Coordinator::new();
    coordinator.register_queue("slow");
    coordinator.register_queue("fast");

    coordinator
        .enqueue(
            "slow",
            Box::new(FnJob::new("slow-job", || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })),
        )
        .unwrap();

    let fast_done = Arc::new(AtomicUsize::new(0));
    let flag = fast_done.clone();
    coordinator
        .enqueue(
            "fast",
            Box::new(FnJob::new("fast-job", move || {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        )
        .unwrap();

    for _ in 0..50 {
        if coordinator.queue_stats("fast").unwrap().jobs_remaining == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(fast_done.load(Ordering::SeqCst), 1);
    assert!(coordinator.queue_stats("slow").unwrap().is_active);
}
