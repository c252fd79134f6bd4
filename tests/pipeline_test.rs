use std::fs;
use std::path::Path;
use std::sync::Arc;

use trackbench::benchmark::{BenchmarkOptions, UnitOutcome};
use trackbench::catalog::ResolutionFallbackPolicy;
use trackbench::detection::PublicDetectionsFactory;
use trackbench::executor::ExecutorOptions;
use trackbench::record::MalformedRecordPolicy;
use trackbench::stitcher::TrackerAliases;
use trackbench::tracker::{ByteTrackConfig, Rect};
use trackbench::{
    BenchError, Benchmark, Detection, DetectionSource, DetectorFactory, Frame, ManifestBuilder,
    MultiObjectTracker, Result, Sequence, SequenceCatalog, SequenceExecutor, Stitcher, TrackedBox,
    TrackerFactory, TrackerSpec,
};

/// Writes `root/<name>/img1/000001.jpg..` and optionally `seqinfo.ini`.
fn add_sequence(root: &Path, name: &str, size: (u32, u32), frames: u64, seqinfo: bool) {
    let seq = root.join(name);
    fs::create_dir_all(seq.join("img1")).unwrap();
    for index in 1..=frames {
        image::RgbImage::new(size.0, size.1)
            .save(seq.join("img1").join(format!("{index:06}.jpg")))
            .unwrap();
    }
    if seqinfo {
        fs::write(
            seq.join("seqinfo.ini"),
            format!(
                "[Sequence]\nname={name}\nimDir=img1\nframeRate=20\nseqLength={frames}\nimWidth={}\nimHeight={}\nimExt=.jpg\n",
                size.0, size.1
            ),
        )
        .unwrap();
    }
}

/// Emits one fixed box with a fixed id on every frame.
struct FixedTracker {
    bbox: Rect,
    track_id: u64,
}

impl MultiObjectTracker for FixedTracker {
    fn update(&mut self, _detections: &[Detection], _frame: &Frame) -> Result<Vec<TrackedBox>> {
        Ok(vec![TrackedBox {
            bbox: self.bbox,
            track_id: self.track_id,
        }])
    }
}

struct FixedFactory {
    bbox: Rect,
    track_id: u64,
}

impl TrackerFactory for FixedFactory {
    fn name(&self) -> &str {
        "bytetrack"
    }

    fn create(&self) -> Result<Box<dyn MultiObjectTracker + Send>> {
        Ok(Box::new(FixedTracker {
            bbox: self.bbox,
            track_id: self.track_id,
        }))
    }
}

struct NoDetections;

impl DetectionSource for NoDetections {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

struct NoDetector;

impl DetectorFactory for NoDetector {
    fn open(&self, _sequence: &Sequence) -> Result<Box<dyn DetectionSource + Send>> {
        Ok(Box::new(NoDetections))
    }
}

fn benchmark(
    catalog: &SequenceCatalog,
    runs: &Path,
    trackers: Vec<Arc<dyn TrackerFactory>>,
    detectors: Arc<dyn DetectorFactory>,
) -> Benchmark {
    Benchmark::new(
        catalog.sequences().unwrap(),
        trackers,
        detectors,
        SequenceExecutor::new(runs, ExecutorOptions::default()),
        BenchmarkOptions::default(),
    )
}

#[test]
fn test_box_round_trips_through_labels_into_canonical_rows() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    add_sequence(&dataset, "seq", (1000, 500), 1, true);
    let catalog = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::Strict).unwrap();

    let runs = work.path().join("runs");
    let factory = FixedFactory {
        bbox: Rect::new(100.0, 50.0, 200.0, 100.0),
        track_id: 7,
    };
    let report = benchmark(
        &catalog,
        &runs,
        vec![Arc::new(factory) as Arc<dyn TrackerFactory>],
        Arc::new(NoDetector),
    )
    .run()
    .unwrap();
    assert_eq!(report.completed().count(), 1);

    let label = runs.join("bytetrack/seq/labels/000001.txt");
    assert_eq!(
        fs::read_to_string(label).unwrap(),
        "0 0.200000 0.200000 0.200000 0.200000 7\n"
    );

    let results = work.path().join("tracker_results");
    let stitched = Stitcher::default().stitch(&runs, &catalog, &results).unwrap();
    assert_eq!(stitched.trackers, ["ByteTrack"]);
    assert_eq!(stitched.rows, 1);
    assert_eq!(
        fs::read_to_string(results.join("ByteTrack/data/seq.txt")).unwrap(),
        "1,7,100.00,50.00,200.00,100.00,1,-1,-1,-1\n"
    );
}

#[test]
fn test_stitch_skips_non_numeric_label_files() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    add_sequence(&dataset, "seq", (1000, 500), 0, true);
    let catalog = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::Strict).unwrap();

    let labels = work.path().join("runs/bytetrack/seq/labels");
    fs::create_dir_all(&labels).unwrap();
    fs::write(labels.join("000002.txt"), "0 0.5 0.5 0.1 0.1 4\n").unwrap();
    fs::write(labels.join("abc.txt"), "0 0.5 0.5 0.1 0.1 9\n").unwrap();
    fs::write(labels.join("000001.txt"), "0 0.5 0.5 0.1 0.1 4\nnot a record\n").unwrap();

    let results = work.path().join("results");
    let report = Stitcher::default()
        .stitch(&work.path().join("runs"), &catalog, &results)
        .unwrap();
    assert_eq!(report.skipped_files, 1);
    assert_eq!(report.skipped_lines, 1);
    assert_eq!(
        fs::read_to_string(results.join("ByteTrack/data/seq.txt")).unwrap(),
        "1,4,450.00,225.00,100.00,50.00,1,-1,-1,-1\n\
         2,4,450.00,225.00,100.00,50.00,1,-1,-1,-1\n"
    );

    let strict = Stitcher::new(TrackerAliases::default(), MalformedRecordPolicy::Fail);
    let err = strict
        .stitch(&work.path().join("runs"), &catalog, &results)
        .unwrap_err();
    assert!(matches!(err, BenchError::MalformedRecord { line: 2, .. }));
    // a failed stitch leaves the previous output in place
    assert!(results.join("ByteTrack/data/seq.txt").is_file());
}

#[test]
fn test_output_moved_aside_by_an_interrupted_stitch_is_restored() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    add_sequence(&dataset, "seq", (1000, 500), 0, true);
    let catalog = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::Strict).unwrap();

    let runs = work.path().join("runs");
    let labels = runs.join("bytetrack/seq/labels");
    fs::create_dir_all(&labels).unwrap();
    fs::write(labels.join("000001.txt"), "0 0.5 0.5 0.1 0.1 4\n").unwrap();

    let results = work.path().join("results");
    Stitcher::default().stitch(&runs, &catalog, &results).unwrap();
    let published = fs::read(results.join("ByteTrack/data/seq.txt")).unwrap();

    // killed after moving the old output aside, before the new one landed
    let aside = results.with_file_name(".results.previous");
    fs::rename(&results, &aside).unwrap();
    fs::write(labels.join("000002.txt"), "garbage\n").unwrap();

    let strict = Stitcher::new(TrackerAliases::default(), MalformedRecordPolicy::Fail);
    let err = strict.stitch(&runs, &catalog, &results).unwrap_err();
    assert!(matches!(err, BenchError::MalformedRecord { line: 1, .. }));
    assert_eq!(fs::read(results.join("ByteTrack/data/seq.txt")).unwrap(), published);
    assert!(!aside.exists());
    assert!(!results.with_file_name(".results.staging").exists());
}

#[test]
fn test_missing_seqinfo_uses_fallback_resolution() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    add_sequence(&dataset, "noinfo", (64, 32), 0, false);

    let labels = work.path().join("runs/strongsort/noinfo/labels");
    fs::create_dir_all(&labels).unwrap();
    fs::write(labels.join("000001.txt"), "0 0.5 0.5 0.1 0.1 3\n").unwrap();

    let lenient = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::default()).unwrap();
    let results = work.path().join("results");
    Stitcher::default()
        .stitch(&work.path().join("runs"), &lenient, &results)
        .unwrap();
    assert_eq!(
        fs::read_to_string(results.join("StrongSORT/data/noinfo.txt")).unwrap(),
        "1,3,864.00,486.00,192.00,108.00,1,-1,-1,-1\n"
    );

    let strict = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::Strict).unwrap();
    let err = Stitcher::default()
        .stitch(&work.path().join("runs"), &strict, &results)
        .unwrap_err();
    assert!(matches!(err, BenchError::Metadata { .. }));
}

#[test]
fn test_restitch_is_byte_identical() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    add_sequence(&dataset, "a", (640, 480), 3, true);
    add_sequence(&dataset, "b", (640, 480), 2, true);
    let catalog = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::Strict).unwrap();

    let runs = work.path().join("runs");
    let factory = FixedFactory {
        bbox: Rect::new(12.5, 20.25, 33.0, 71.0),
        track_id: 2,
    };
    benchmark(
        &catalog,
        &runs,
        vec![Arc::new(factory) as Arc<dyn TrackerFactory>],
        Arc::new(NoDetector),
    )
    .run()
    .unwrap();

    let results = work.path().join("results");
    let read_all = || {
        ["a", "b"]
            .map(|seq| fs::read(results.join(format!("ByteTrack/data/{seq}.txt"))).unwrap())
    };
    Stitcher::default().stitch(&runs, &catalog, &results).unwrap();
    let first = read_all();
    // stale output from an earlier run must not survive
    fs::write(results.join("ByteTrack/data/stale.txt"), "x").unwrap();
    Stitcher::default().stitch(&runs, &catalog, &results).unwrap();
    assert_eq!(read_all(), first);
    assert!(!results.join("ByteTrack/data/stale.txt").exists());
}

#[test]
fn test_identities_do_not_leak_between_sequences() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    for name in ["seq1", "seq2"] {
        add_sequence(&dataset, name, (200, 200), 3, true);
        let det = dataset.join(name).join("det");
        fs::create_dir_all(&det).unwrap();
        fs::write(
            det.join("det.txt"),
            "1,-1,10,10,50,80,0.9,-1,-1,-1\n\
             2,-1,12,10,50,80,0.9,-1,-1,-1\n\
             3,-1,14,10,50,80,0.9,-1,-1,-1\n",
        )
        .unwrap();
    }
    let catalog = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::Strict).unwrap();

    let runs = work.path().join("runs");
    let spec = TrackerSpec::bytetrack("bytetrack", ByteTrackConfig::default());
    let report = benchmark(
        &catalog,
        &runs,
        vec![Arc::new(spec) as Arc<dyn TrackerFactory>],
        Arc::new(PublicDetectionsFactory::default()),
    )
    .run()
    .unwrap();
    assert!(
        report
            .units
            .iter()
            .all(|u| matches!(u.outcome, UnitOutcome::Completed(_)))
    );

    for seq in ["seq1", "seq2"] {
        for frame in 1..=3 {
            let line = fs::read_to_string(runs.join(format!("bytetrack/{seq}/labels/{frame:06}.txt"))).unwrap();
            assert_eq!(line.lines().count(), 1, "{seq} frame {frame}");
            assert!(line.trim_end().ends_with(" 1"), "{seq} frame {frame}: {line}");
        }
    }
    assert!(runs.join("summary.csv").is_file());
}

#[test]
fn test_manifest_lists_every_dataset_sequence() {
    let work = tempfile::tempdir().unwrap();
    let dataset = work.path().join("dataset");
    for name in ["dancetrack0019", "dancetrack0004", "dancetrack0010"] {
        add_sequence(&dataset, name, (32, 32), 0, false);
    }
    let catalog = SequenceCatalog::open(&dataset, ResolutionFallbackPolicy::default()).unwrap();

    let results = work.path().join("tracker_results");
    let path = ManifestBuilder::new("DanceTrack", "val")
        .build(&catalog)
        .unwrap()
        .write(&results)
        .unwrap();
    assert_eq!(path, results.join("seqmaps/dancetrack-val.txt"));
    let lines: Vec<String> = fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        lines,
        ["name", "dancetrack0004", "dancetrack0010", "dancetrack0019"]
    );
}
