//! Integration tests for concurrent producers and readers on the in-process bus.
//!
//! Tests:
//! - Readers never observe a torn value while a producer overwrites
//! - Best-effort helpers report failures without panicking

use bus::{BusError, FrameBus, MemoryBus, clear, fetch, publish};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[test]
fn readers_see_whole_values_only() {
    let bus = Arc::new(MemoryBus::new());
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let bus = Arc::clone(&bus);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..2_000u32 {
                let byte = (i % 251) as u8;
                bus.set("cam_processed_frame", vec![byte; 4096]).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let bus = Arc::clone(&bus);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    if let Some(frame) = bus.get("cam_processed_frame").unwrap() {
                        assert_eq!(frame.len(), 4096);
                        let first = frame[0];
                        assert!(frame.iter().all(|b| *b == first), "torn frame observed");
                    }
                }
            })
        })
        .collect();

    producer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

struct BrokenBus;

impl FrameBus for BrokenBus {
    fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), BusError> {
        Err(BusError::Unavailable("down".into()))
    }

    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BusError> {
        Err(BusError::Unavailable("down".into()))
    }

    fn delete(&self, _key: &str) -> Result<(), BusError> {
        Err(BusError::Unavailable("down".into()))
    }
}

#[test]
fn best_effort_helpers_swallow_failures() {
    let bus = BrokenBus;
    assert!(!publish(&bus, "vehicle_in", vec![1]));
    assert!(!clear(&bus, "vehicle_in"));
    assert_eq!(fetch(&bus, "vehicle_in"), None);
}
