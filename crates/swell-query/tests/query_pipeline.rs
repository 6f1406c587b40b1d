//! End-to-end query pipeline tests.
//!
//! Spectrum → reset → schedule → solve → callback, on a real worker pool and
//! on the cooperative step runner.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use swell_query::{
    BoundsTask, DISPLACEMENT_CHANNELS, DisplacementBounds, InterpolatedGrid, MAX_GRIDS,
    OverlaySample, OverlaySource, QueryDescriptor, QueryError, QueryMode, QueryTask,
    SnapshotSync, SpectrumSnapshot,
};
use swell_scheduler::{QueueKind, Scheduler, SchedulerConfig, TaskRef};

/// Two grids: a long swell with horizontal motion and a flat chop layer.
fn spectrum(amplitude: f32) -> SpectrumSnapshot {
    let size = 32;
    let mut swell = InterpolatedGrid::new(size, size, DISPLACEMENT_CHANNELS)
        .unwrap()
        .with_half_pixel_offset(true);
    for y in 0..size {
        for x in 0..size {
            let phase = (x as f32 + 0.5) / size as f32 * std::f32::consts::TAU;
            swell.set(x, y, 0, amplitude * phase.sin());
            swell.set(x, y, 1, amplitude * phase.cos());
        }
    }
    let mut chop = InterpolatedGrid::new(size, size, DISPLACEMENT_CHANNELS)
        .unwrap()
        .with_half_pixel_offset(true);
    chop.fill(0.0);

    SpectrumSnapshot::new(vec![swell, chop], [64.0, 8.0, 0.0, 0.0]).unwrap()
}

fn grid_of_queries(count: usize) -> Vec<QueryDescriptor> {
    (0..count)
        .map(|i| QueryDescriptor::new(i as f32 * 1.7, (i % 5) as f32).with_tag(i as u64))
        .collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(1));
    }
}

type Delivered = Arc<Mutex<Option<(thread::ThreadId, Vec<QueryDescriptor>)>>>;

fn delivery() -> (Delivered, impl FnMut(&mut [QueryDescriptor]) + Send + 'static) {
    let delivered: Delivered = Arc::default();
    let sink = Arc::clone(&delivered);
    (delivered, move |descriptors: &mut [QueryDescriptor]| {
        let mut slot = sink.lock().unwrap();
        assert!(slot.is_none(), "callback fired twice");
        *slot = Some((thread::current().id(), descriptors.to_vec()));
    })
}

/// A threaded batch solves on a worker and calls back on the driving thread
/// with every result converged and offset by the ocean level.
#[test]
fn test_threaded_batch_on_worker_pool() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        worker_threads: 2,
        ..Default::default()
    })
    .unwrap();
    let (delivered, callback) = delivery();
    let task = Arc::new(QueryTask::threaded(grid_of_queries(64), callback));
    assert_eq!(task.reset(&spectrum(1.5), 10.0), SnapshotSync::Reallocated);
    let task_ref: TaskRef = task.clone();

    scheduler.add(task_ref.clone());
    wait_until(|| {
        scheduler.update().unwrap();
        delivered.lock().unwrap().is_some()
    });

    let (thread_id, results) = delivered.lock().unwrap().take().unwrap();
    assert_eq!(thread_id, thread::current().id());
    assert_eq!(results.len(), 64);
    for (i, descriptor) in results.iter().enumerate() {
        assert_eq!(descriptor.tag, i as u64);
        let result = descriptor.result;
        assert!(result.iterations >= 1);
        assert!(result.error <= 1e-4, "query {i} residual {}", result.error);
        assert!((result.height - 10.0).abs() <= 1.5 + 1e-4);
    }
    assert_eq!(scheduler.queue_of(&task_ref), None);
}

/// The cooperative variant produces the same numbers as the threaded one.
#[test]
fn test_cooperative_matches_threaded() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        disable_multithreading: true,
        ..Default::default()
    })
    .unwrap();
    let source = spectrum(1.0);

    let (threaded_out, threaded_cb) = delivery();
    let threaded = Arc::new(QueryTask::threaded(grid_of_queries(20), threaded_cb));
    threaded.reset(&source, 0.0);

    let (coop_out, coop_cb) = delivery();
    let cooperative = Arc::new(QueryTask::cooperative(grid_of_queries(20), 3, None, coop_cb));
    cooperative.reset(&source, 0.0);
    let cooperative_ref: TaskRef = cooperative.clone();

    scheduler.add(threaded.clone());
    scheduler.add(cooperative_ref.clone());
    scheduler.update().unwrap();
    assert!(threaded_out.lock().unwrap().is_some());
    assert_eq!(scheduler.queue_of(&cooperative_ref), Some(QueueKind::Running));

    let mut steps = 0;
    while scheduler.queue_of(&cooperative_ref) == Some(QueueKind::Running) {
        scheduler.advance_cooperative();
        steps += 1;
    }
    // ceil(20 / 3) steps, the last one reporting completion.
    assert_eq!(steps, 7);
    scheduler.update().unwrap();

    let (_, expected) = threaded_out.lock().unwrap().take().unwrap();
    let (_, actual) = coop_out.lock().unwrap().take().unwrap();
    assert_eq!(expected, actual);
}

/// Overlay clipping only reaches cooperative batches.
#[test]
fn test_overlay_marks_clipped_region() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        disable_multithreading: true,
        ..Default::default()
    })
    .unwrap();
    let overlay: Arc<dyn OverlaySource> = Arc::new(|x: f32, z: f32| OverlaySample {
        height: 0.0,
        clip: if x < 5.0 && z < 5.0 { 1.0 } else { 0.0 },
    });
    let (delivered, callback) = delivery();
    let queries = vec![
        QueryDescriptor::new(1.0, 1.0),
        QueryDescriptor::new(9.0, 1.0),
        QueryDescriptor::new(1.0, 1.0).with_mode(QueryMode::Displacement),
    ];
    let task = Arc::new(QueryTask::cooperative(queries, 16, Some(overlay), callback));
    task.reset(&spectrum(1.0), 0.0);

    scheduler.add(task.clone());
    scheduler.update().unwrap();
    scheduler.advance_cooperative();
    scheduler.update().unwrap();

    let (_, results) = delivered.lock().unwrap().take().unwrap();
    let clipped: Vec<bool> = results.iter().map(|d| d.result.is_clipped).collect();
    assert_eq!(clipped, vec![true, false, true]);
    assert_eq!(results[2].result.iterations, 0);
}

/// A bounds scan on the worker pool reports a bound that contains every
/// solved height.
#[test]
fn test_bounds_contain_query_heights() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        worker_threads: 2,
        ..Default::default()
    })
    .unwrap();
    let source = spectrum(2.0);

    let reported: Arc<Mutex<Option<DisplacementBounds>>> = Arc::default();
    let sink = Arc::clone(&reported);
    let bounds_task = Arc::new(BoundsTask::new(move |bounds| {
        *sink.lock().unwrap() = Some(bounds);
    }));
    bounds_task.reset(&source);

    let (delivered, callback) = delivery();
    let query_task = Arc::new(QueryTask::threaded(grid_of_queries(40), callback));
    query_task.reset(&source, 0.0);

    scheduler.add(bounds_task.clone());
    scheduler.add(query_task.clone());
    wait_until(|| {
        scheduler.update().unwrap();
        reported.lock().unwrap().is_some() && delivered.lock().unwrap().is_some()
    });

    let bounds = reported.lock().unwrap().unwrap();
    assert!(bounds.max_horizontal > 0.0);
    let (_, results) = delivered.lock().unwrap().take().unwrap();
    for descriptor in results {
        let height = descriptor.result.height;
        assert!(height >= bounds.min_height - 1e-4 && height <= bounds.max_height + 1e-4);
    }
}

/// Rescheduling with fresh grids of the same layout overwrites in place.
#[test]
fn test_reset_tracks_regenerated_spectrum() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        disable_multithreading: true,
        ..Default::default()
    })
    .unwrap();
    let heights = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heights);
    let task = Arc::new(QueryTask::threaded(
        vec![QueryDescriptor::new(0.0, 0.0).with_grids([true, false, false, false])],
        move |descriptors: &mut [QueryDescriptor]| {
            sink.lock().unwrap().push(descriptors[0].result.height);
        },
    ));

    let mut source = spectrum(1.0);
    for tick in 0..3 {
        for grid in source.grids_mut() {
            for value in grid.data_mut().chunks_mut(DISPLACEMENT_CHANNELS) {
                value[1] = tick as f32;
            }
        }
        let sync = task.reset(&source, 0.0);
        assert_eq!(
            sync,
            if tick == 0 {
                SnapshotSync::Reallocated
            } else {
                SnapshotSync::Overwritten
            }
        );
        scheduler.add(task.clone());
        scheduler.update().unwrap();
    }

    assert_eq!(*heights.lock().unwrap(), vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_mismatched_grid_buffer_is_rejected() {
    let err = InterpolatedGrid::from_data(4, 4, DISPLACEMENT_CHANNELS, vec![0.0; 47]).unwrap_err();
    assert!(matches!(err, QueryError::GridSizeMismatch { expected: 48, actual: 47 }));
    assert!(SpectrumSnapshot::new(Vec::new(), [1.0; MAX_GRIDS]).is_err());
}
