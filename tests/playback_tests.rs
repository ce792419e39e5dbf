// Integration tests for gapless playback scheduling

use anyhow::Result;
use std::sync::{Arc, Mutex};
use voice_session::audio::{OutputDevice, PlaybackScheduler, UnitId};

#[derive(Default)]
struct Timeline {
    clock: f64,
    scheduled: Vec<(UnitId, f64)>,
    stopped: Vec<UnitId>,
    closes: usize,
}

struct ClockDevice(Arc<Mutex<Timeline>>);

impl OutputDevice for ClockDevice {
    fn now(&self) -> f64 {
        self.0.lock().unwrap().clock
    }

    fn schedule(&mut self, id: UnitId, start_at: f64, _samples: Vec<f32>) -> Result<()> {
        self.0.lock().unwrap().scheduled.push((id, start_at));
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) -> Result<()> {
        self.0.lock().unwrap().stopped.push(id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.0.lock().unwrap().closes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "clock device"
    }
}

fn scheduler() -> (PlaybackScheduler, Arc<Mutex<Timeline>>) {
    let timeline = Arc::new(Mutex::new(Timeline::default()));
    let scheduler = PlaybackScheduler::new(Box::new(ClockDevice(Arc::clone(&timeline))), 24000);
    (scheduler, timeline)
}

#[test]
fn test_units_never_overlap() {
    let (mut scheduler, timeline) = scheduler();
    let mut previous_end = 0.0;

    // Irregular payload sizes arriving while the clock advances
    for i in 0..50usize {
        timeline.lock().unwrap().clock = i as f64 * 0.03;
        let samples = vec![0.0; 480 + (i * 137) % 2000];

        let unit = scheduler.enqueue_samples(samples).unwrap();
        assert!(unit.start_at >= previous_end - 1e-12);
        assert!(unit.start_at >= i as f64 * 0.03);
        previous_end = unit.end();
    }

    assert_eq!(scheduler.active_units().len(), 50);
    assert!((scheduler.cursor() - previous_end).abs() < 1e-12);
}

#[test]
fn test_late_payload_starts_now() {
    let (mut scheduler, timeline) = scheduler();

    let first = scheduler.enqueue_samples(vec![0.0; 2400]).unwrap();
    assert_eq!(first.start_at, 0.0);

    // The queue drained long ago
    timeline.lock().unwrap().clock = 5.0;
    let second = scheduler.enqueue_samples(vec![0.0; 2400]).unwrap();
    assert_eq!(second.start_at, 5.0);
}

#[test]
fn test_interrupt_stops_all_and_resets_cursor() {
    let (mut scheduler, timeline) = scheduler();
    for _ in 0..4 {
        scheduler.enqueue_samples(vec![0.0; 24000]).unwrap();
    }
    assert!(scheduler.is_speaking());

    timeline.lock().unwrap().clock = 1.5;
    assert_eq!(scheduler.interrupt(), 4);

    assert!(!scheduler.is_speaking());
    assert_eq!(scheduler.cursor(), 0.0);
    assert_eq!(timeline.lock().unwrap().stopped, vec![0, 1, 2, 3]);

    let next = scheduler.enqueue_samples(vec![0.0; 2400]).unwrap();
    assert_eq!(next.start_at, 1.5);
}

#[test]
fn test_interrupt_when_idle() {
    let (mut scheduler, timeline) = scheduler();
    assert_eq!(scheduler.interrupt(), 0);
    assert!(timeline.lock().unwrap().stopped.is_empty());
}

#[test]
fn test_finished_unit_is_forgotten_once() {
    let (mut scheduler, _) = scheduler();
    let unit = scheduler.enqueue_samples(vec![0.0; 100]).unwrap();

    assert!(scheduler.on_unit_finished(unit.id));
    assert!(!scheduler.on_unit_finished(unit.id));
    assert!(!scheduler.is_speaking());
}

#[test]
fn test_completion_after_interrupt_is_ignored() {
    let (mut scheduler, _) = scheduler();
    let unit = scheduler.enqueue_samples(vec![0.0; 100]).unwrap();
    scheduler.interrupt();

    assert!(!scheduler.on_unit_finished(unit.id));
}

#[test]
fn test_bad_payload_leaves_cursor() {
    let (mut scheduler, _) = scheduler();
    scheduler.enqueue_samples(vec![0.0; 2400]).unwrap();
    let cursor = scheduler.cursor();

    assert!(scheduler.enqueue("%%%").is_err());
    assert_eq!(scheduler.cursor(), cursor);
}

#[test]
fn test_close_is_idempotent() {
    let (mut scheduler, timeline) = scheduler();
    scheduler.enqueue_samples(vec![0.0; 2400]).unwrap();

    scheduler.close();
    scheduler.close();

    assert_eq!(timeline.lock().unwrap().closes, 1);
    assert!(scheduler.enqueue_samples(vec![0.0; 10]).is_err());
}
