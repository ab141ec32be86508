mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use common::{blob_frame, noise_frame, roll, MemoryStore};
use plexalign_core::align::BoundaryPolicy;
use plexalign_core::canvas::Canvas;
use plexalign_core::error::{RegistrationError, Result};
use plexalign_core::frame::{Frame, FrameId, RoundId, Shift, SourceRaster};
use plexalign_core::io::{RasterInfo, RasterSink, RasterSource};
use plexalign_core::pipeline::memory::estimate_peak_bytes;
use plexalign_core::pipeline::{
    register_set, register_set_reported, AnchorPolicy, ProgressReporter, RegistrationConfig,
    RegistrationStage, RoundState,
};
use plexalign_core::report::DisplacementStatus;

/// Two rounds of DAPI + CD3 + CD8; round "2" is round "1" rolled by `(-dy, -dx)`.
fn two_round_store(h: usize, w: usize, dy: i64, dx: i64) -> MemoryStore {
    let mut store = MemoryStore::default();
    for (i, marker) in ["DAPI", "CD3", "CD8"].iter().enumerate() {
        let content = noise_frame(h, w, 10 + i as u64);
        store.insert("2", marker, roll(&content, -dy, -dx));
        store.insert("1", marker, content);
    }
    store
}

fn registered_shift(states: &std::collections::BTreeMap<RoundId, RoundState>, id: &str) -> Shift {
    match &states[&RoundId::new(id)] {
        RoundState::Registered(r) => r.shift,
        other => panic!("round {} not registered: {:?}", id, other),
    }
}

fn assert_scenario_a(h: usize, w: usize) {
    let store = two_round_store(h, w, 37, -12);
    let set = store.set("DAPI");
    let outcome = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();

    assert_eq!(outcome.anchor, RoundId::new("1"));
    assert_eq!(outcome.states[&RoundId::new("1")], RoundState::Anchored);
    let shift = registered_shift(&outcome.states, "2");
    assert_abs_diff_eq!(shift.dy, 37.0, epsilon = 0.5);
    assert_abs_diff_eq!(shift.dx, -12.0, epsilon = 0.5);

    // Markers take the reference's shift and land exactly on round 1
    for marker in ["DAPI", "CD3", "CD8"] {
        let anchored = store.output("1", marker).unwrap();
        let shifted = store.output("2", marker).unwrap();
        assert_eq!(shifted.data, anchored.data, "marker {}", marker);
    }
    assert_eq!(outcome.frames_written, 6);
    assert!(outcome.frame_failures.is_empty());
}

#[test]
fn test_scenario_a_scaled() {
    assert_scenario_a(500, 400);
}

#[test]
#[ignore = "full-size frames, slow"]
fn test_scenario_a_full_size() {
    assert_scenario_a(5000, 4000);
}

#[test]
fn test_scenario_b_canvas_and_output_shapes() {
    let mut store = MemoryStore::default();
    store.insert("1", "DAPI", noise_frame(40, 40, 1));
    store.insert("2", "DAPI", noise_frame(42, 39, 2));
    store.insert("3", "DAPI", noise_frame(39, 41, 3));
    store.insert("3", "CD45", noise_frame(39, 41, 4));

    let set = store.set("DAPI");
    let outcome = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();

    assert_eq!(outcome.canvas, Canvas::new(42, 41));
    assert_eq!(store.output_count(), 4);
    for frame in store.outputs.lock().unwrap().values() {
        assert_eq!(frame.data.dim(), (42, 41));
    }
}

#[test]
fn test_anchor_frames_pass_through_padded() {
    let mut store = MemoryStore::default();
    let anchor = noise_frame(30, 20, 1);
    store.insert("1", "DAPI", anchor.clone());
    store.insert("2", "DAPI", noise_frame(32, 24, 2));

    let set = store.set("DAPI");
    register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();

    let out = store.output("1", "DAPI").unwrap();
    assert_eq!(out.data.dim(), (32, 24));
    assert_eq!(out.data.slice(ndarray::s![..30, ..20]), anchor);
    assert!(out.data.slice(ndarray::s![30.., ..]).iter().all(|&v| v == 0.0));
    assert!(out.data.slice(ndarray::s![.., 20..]).iter().all(|&v| v == 0.0));
}

#[test]
fn test_rounds_sort_naturally_for_anchor_choice() {
    let mut store = MemoryStore::default();
    for (round, seed) in [("10", 1), ("2", 2), ("9", 3)] {
        store.insert(round, "DAPI", noise_frame(16, 16, seed));
    }
    let set = store.set("DAPI");

    let first = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();
    assert_eq!(first.anchor, RoundId::new("2"));

    let config = RegistrationConfig {
        anchor: AnchorPolicy::Last,
        ..Default::default()
    };
    let last = register_set(&set, &store, &store, &config).unwrap();
    assert_eq!(last.anchor, RoundId::new("10"));
}

#[test]
fn test_explicit_anchor_round() {
    let store = two_round_store(64, 64, 5, 3);
    let set = store.set("DAPI");
    let config = RegistrationConfig {
        anchor: AnchorPolicy::Round(RoundId::new("2")),
        ..Default::default()
    };
    let outcome = register_set(&set, &store, &store, &config).unwrap();
    let shift = registered_shift(&outcome.states, "1");
    assert_abs_diff_eq!(shift.dy, -5.0);
    assert_abs_diff_eq!(shift.dx, -3.0);

    let written = store.output_count();
    let missing = RegistrationConfig {
        anchor: AnchorPolicy::Round(RoundId::new("7")),
        ..Default::default()
    };
    let err = register_set(&set, &store, &store, &missing).unwrap_err();
    assert!(matches!(err, RegistrationError::AnchorNotFound(_)));
    assert_eq!(store.output_count(), written);
}

#[test]
fn test_decimated_run_recovers_full_resolution_shift() {
    // 510 x 402 with threshold 200 gives factor 3; the shift is a multiple of 3
    let store = two_round_store(510, 402, 36, -12);
    let set = store.set("DAPI");
    let config = RegistrationConfig {
        downsample_threshold: 200,
        ..Default::default()
    };
    let outcome = register_set(&set, &store, &store, &config).unwrap();

    assert_eq!(outcome.decimation_factor, 3);
    let shift = registered_shift(&outcome.states, "2");
    assert_abs_diff_eq!(shift.dy, 36.0, epsilon = 1e-6);
    assert_abs_diff_eq!(shift.dx, -12.0, epsilon = 1e-6);
    assert_eq!(
        store.output("2", "CD8").unwrap().data,
        store.output("1", "CD8").unwrap().data
    );
}

#[test]
fn test_decimated_run_refines_shifts_off_the_coarse_grid() {
    // None of these shifts is a multiple of the factor 3
    let fixed = blob_frame(510, 402, 21);
    let marker = noise_frame(510, 402, 22);
    let mut store = MemoryStore::default();
    store.insert("1", "DAPI", fixed.clone());
    store.insert("1", "CD3", marker.clone());
    let shifts = [("2", 37, -13), ("3", 20, 7), ("4", -31, 16)];
    for (round, dy, dx) in shifts {
        store.insert(round, "DAPI", roll(&fixed, -dy, -dx));
        store.insert(round, "CD3", roll(&marker, -dy, -dx));
    }

    let set = store.set("DAPI");
    let config = RegistrationConfig {
        downsample_threshold: 200,
        ..Default::default()
    };
    let outcome = register_set(&set, &store, &store, &config).unwrap();
    assert_eq!(outcome.decimation_factor, 3);

    let anchored = store.output("1", "CD3").unwrap();
    for (round, dy, dx) in shifts {
        let shift = registered_shift(&outcome.states, round);
        assert_abs_diff_eq!(shift.dy, dy as f64, epsilon = 1e-6);
        assert_abs_diff_eq!(shift.dx, dx as f64, epsilon = 1e-6);
        assert_eq!(store.output(round, "CD3").unwrap().data, anchored.data, "round {}", round);
    }
}

#[test]
fn test_factor_one_matches_undecimated_estimate() {
    let store = two_round_store(96, 64, -9, 14);
    let set = store.set("DAPI");
    let outcome = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();
    assert_eq!(outcome.decimation_factor, 1);

    let fixed = noise_frame(96, 64, 10);
    let moving = roll(&fixed, 9, -14);
    let direct = plexalign_core::align::estimate_translation(&fixed, &moving, 1).unwrap();
    assert_eq!(registered_shift(&outcome.states, "2"), direct.shift);
}

#[test]
fn test_fill_policy_zeroes_vacated_band() {
    let store = two_round_store(48, 48, 4, 0);
    let set = store.set("DAPI");
    let config = RegistrationConfig {
        boundary: BoundaryPolicy::Fill,
        ..Default::default()
    };
    register_set(&set, &store, &store, &config).unwrap();

    let out = store.output("2", "CD3").unwrap();
    assert_eq!(out.data.dim(), (48, 48));
    assert!(out.data.slice(ndarray::s![..4, ..]).iter().all(|&v| v == 0.0));
    let anchored = store.output("1", "CD3").unwrap();
    assert_eq!(
        out.data.slice(ndarray::s![4.., ..]),
        anchored.data.slice(ndarray::s![4.., ..])
    );
}

#[test]
fn test_uniform_reference_degrades_to_zero_shift() {
    let mut store = MemoryStore::default();
    store.insert("1", "DAPI", noise_frame(32, 32, 1));
    store.insert("2", "DAPI", noise_frame(32, 32, 2));
    store.insert("3", "DAPI", Array2::from_elem((32, 32), 0.25));
    store.insert("3", "CD3", noise_frame(32, 32, 3));

    let set = store.set("DAPI");
    let outcome = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();

    match &outcome.states[&RoundId::new("3")] {
        RoundState::Registered(r) => {
            assert!(r.low_confidence);
            assert_eq!(r.shift, Shift::zero());
        }
        other => panic!("unexpected state {:?}", other),
    }
    let entry = outcome.report.get(&RoundId::new("3")).unwrap();
    assert_eq!(entry.status, DisplacementStatus::LowSignal);
    assert_eq!(entry.error, Some(1.0));
    assert_eq!(
        store.output("3", "CD3").unwrap().data,
        noise_frame(32, 32, 3)
    );
}

#[test]
fn test_failed_round_does_not_abort_siblings() {
    let mut store = MemoryStore::default();
    for round in ["1", "2", "3"] {
        store.insert(round, "DAPI", noise_frame(32, 32, 1));
        store.insert(round, "CD20", noise_frame(32, 32, 2));
    }
    store.unreadable.insert(FrameId::new("3", "DAPI"));
    store.unreadable.insert(FrameId::new("2", "CD20"));

    let set = store.set("DAPI");
    let outcome = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();

    assert!(matches!(outcome.states[&RoundId::new("3")], RoundState::Failed(_)));
    assert!(matches!(outcome.states[&RoundId::new("2")], RoundState::Registered(_)));
    assert!(outcome.states.values().all(RoundState::is_terminal));

    // Failed rounds rank first, without an error value
    let first = &outcome.report.entries()[0];
    assert_eq!(first.round, RoundId::new("3"));
    assert_eq!(first.error, None);

    let failed: Vec<String> = outcome
        .frame_failures
        .iter()
        .map(|f| f.frame.to_string())
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&"3.DAPI".to_string()));
    assert!(failed.contains(&"2.CD20".to_string()));
    assert!(store.output("2", "DAPI").is_some());
    // A failed round has no shift, so none of its frames are written
    assert!(store.output("3", "DAPI").is_none());
    assert!(store.output("3", "CD20").is_none());
    assert_eq!(outcome.frames_written, 3);
}

#[test]
fn test_unreadable_anchor_reference_aborts() {
    let mut store = two_round_store(32, 32, 1, 1);
    store.unreadable.insert(FrameId::new("1", "DAPI"));
    let set = store.set("DAPI");
    let err = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap_err();
    assert!(matches!(err, RegistrationError::Io(_)));
}

#[test]
fn test_memory_budget_refuses_before_writing() {
    let store = two_round_store(64, 64, 1, 1);
    let set = store.set("DAPI");
    let err = register_set_reported(
        &set,
        &store,
        &store,
        &RegistrationConfig::default(),
        Some(1024),
        Arc::new(CountingReporter::default()),
    )
    .unwrap_err();
    assert!(matches!(err, RegistrationError::OutOfMemoryBudget { .. }));
    assert_eq!(store.output_count(), 0);
}

#[test]
fn test_single_round_is_padded_only() {
    let mut store = MemoryStore::default();
    store.insert("1", "DAPI", noise_frame(20, 20, 1));
    store.insert("1", "CD4", noise_frame(18, 22, 2));
    let set = store.set("DAPI");
    let outcome = register_set(&set, &store, &store, &RegistrationConfig::default()).unwrap();
    assert!(outcome.report.is_empty());
    assert_eq!(store.output("1", "CD4").unwrap().data.dim(), (20, 22));
}

#[derive(Default)]
struct CountingReporter {
    stages: Mutex<Vec<RegistrationStage>>,
    advances: AtomicUsize,
    finished: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn begin_stage(&self, stage: RegistrationStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn advance(&self, _items_done: usize) {
        self.advances.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_stage(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_progress_reporter_sees_every_stage() {
    let mut store = MemoryStore::default();
    for round in ["1", "2", "3", "4"] {
        store.insert(round, "DAPI", noise_frame(24, 24, round.len() as u64));
        store.insert(round, "CD8", noise_frame(24, 24, 9));
    }
    let set = store.set("DAPI");
    let reporter = Arc::new(CountingReporter::default());
    register_set_reported(
        &set,
        &store,
        &store,
        &RegistrationConfig::default(),
        None,
        reporter.clone(),
    )
    .unwrap();

    assert_eq!(
        *reporter.stages.lock().unwrap(),
        vec![
            RegistrationStage::Scanning,
            RegistrationStage::Anchoring,
            RegistrationStage::Registering,
            RegistrationStage::Reporting,
        ]
    );
    assert_eq!(reporter.finished.load(Ordering::Relaxed), 4);
    // 8 shape scans, 2 anchor frames, 3 moving rounds
    assert_eq!(reporter.advances.load(Ordering::Relaxed), 13);
}

/// Counts rounds holding frames at once. A round enters when its reference
/// is read and leaves when its marker is written.
struct InFlightStore {
    inner: MemoryStore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RasterSource for InFlightStore {
    fn info(&self, id: &FrameId) -> Result<RasterInfo> {
        self.inner.info(id)
    }

    fn read(&self, id: &FrameId) -> Result<SourceRaster> {
        if id.marker == "DAPI" {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
        }
        self.inner.read(id)
    }
}

impl RasterSink for InFlightStore {
    fn write(&self, id: &FrameId, frame: &Frame) -> Result<()> {
        self.inner.write(id, frame)?;
        if id.marker == "CD3" {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn test_rounds_in_flight_never_exceed_memory_plan() {
    let mut inner = MemoryStore::default();
    for round in 1..=9u64 {
        inner.insert(&round.to_string(), "DAPI", noise_frame(64, 64, round));
        inner.insert(&round.to_string(), "CD3", noise_frame(64, 64, 100 + round));
    }
    let set = inner.set("DAPI");
    let store = InFlightStore {
        inner,
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    };

    // Room for exactly two rounds at once
    let gray16 = RasterInfo {
        height: 64,
        width: 64,
        channels: 1,
        bit_depth: 16,
    };
    let available = estimate_peak_bytes(Canvas::new(64, 64), 1, 2, gray16.decode_bytes_per_pixel());
    let config = RegistrationConfig {
        memory_fraction: 1.0,
        ..Default::default()
    };

    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let outcome = pool
        .install(|| {
            register_set_reported(
                &set,
                &store,
                &store,
                &config,
                Some(available),
                Arc::new(CountingReporter::default()),
            )
        })
        .unwrap();

    assert_eq!(outcome.frames_written, 18);
    assert_eq!(outcome.report.len(), 8);
    let peak = store.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak rounds in flight = {}", peak);
    assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
}
