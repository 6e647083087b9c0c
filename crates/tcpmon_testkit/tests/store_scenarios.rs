//! End-to-end scenarios for the data store: writer, rotation, recovery,
//! retention, reading, export and packaging.

use proptest::prelude::*;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tcpmon_codec::{JsonLines, LineProtocol, Metric};
use tcpmon_core::{
    CoreError, ExportOptions, FileFilter, FileNo, FileSet, FileNaming, FileState, Reclaimer,
    StoreConfig, WriteFailurePolicy, FORMAT_VERSION,
};
use tcpmon_storage::{Filesystem, InMemoryFilesystem};
use tcpmon_testkit::prelude::*;

fn names(fixture: &MemoryStore) -> Vec<String> {
    fixture.file_names()
}

fn data_path(name: &str) -> std::path::PathBuf {
    Path::new(MEMORY_DIR).join(name)
}

#[test]
fn ten_records_three_per_file() {
    let fixture = MemoryStore::with_max_entries(3);
    for i in 0..10 {
        fixture.put(&padded_payload(i, 1024)).unwrap();
    }

    assert_eq!(
        names(&fixture),
        vec![
            "tcpmon-dataf-1.zst",
            "tcpmon-dataf-2.zst",
            "tcpmon-dataf-3.zst",
            "tcpmon-dataf-4",
        ]
    );
    assert_eq!(fixture.reader().count().unwrap(), 10);

    let stats = fixture.stats();
    assert_eq!(stats.rotations, 3);
    assert_eq!(stats.seals, 3);
    assert_eq!(stats.records_written, 10);
    assert_eq!(stats.active_records, 1);
}

#[test]
fn latest_sequence_counts_raw_and_sealed() {
    let fs = InMemoryFilesystem::new();
    fs.write_file(&data_path("tcpmon-dataf-1"), &raw_file_bytes(&[b"abc"]));
    fs.write_file(&data_path("tcpmon-dataf-1.zst"), b"interrupted seal");

    let files = FileSet::new(Arc::new(fs.clone()), MEMORY_DIR, FileNaming::default());
    assert_eq!(files.latest_file_no().unwrap(), FileNo::new(1));

    let fixture = MemoryStore::open_on(fs, |config| config);
    assert_eq!(
        fixture.active_path().unwrap(),
        data_path("tcpmon-dataf-2")
    );
    // The raw file won: the partial seal was replaced
    assert_eq!(names(&fixture), vec!["tcpmon-dataf-1.zst", "tcpmon-dataf-2"]);

    let mut payloads = Vec::new();
    fixture
        .reader()
        .iterate(|_, payload| {
            payloads.push(payload.to_vec());
            Ok(true)
        })
        .unwrap();
    assert_eq!(payloads, vec![b"abc".to_vec()]);
}

#[test]
fn unknown_format_version_is_rejected() {
    let fs = InMemoryFilesystem::new();
    let mut data = 0x1234u16.to_le_bytes().to_vec();
    data.extend_from_slice(&3u32.to_le_bytes());
    data.extend_from_slice(b"xyz");
    assert_ne!(0x1234, FORMAT_VERSION);
    fs.write_file(&data_path("tcpmon-dataf-7"), &data);

    let reader = tcpmon_core::Reader::open(Arc::new(fs), MEMORY_DIR).unwrap();
    let err = reader.count().unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
}

#[test]
fn payloads_read_back_in_write_order() {
    let fixture = MemoryStore::with_max_entries(3);
    let written: Vec<Vec<u8>> = (0..10).map(|i| padded_payload(i, 64 + i)).collect();
    for payload in &written {
        fixture.put(payload).unwrap();
    }

    let mut seen = Vec::new();
    let mut file_nos = Vec::new();
    let visited = fixture
        .reader()
        .iterate(|file_no, payload| {
            seen.push(payload.to_vec());
            file_nos.push(file_no.as_u32());
            Ok(true)
        })
        .unwrap();

    assert_eq!(visited, 10);
    assert_eq!(seen, written);
    assert_eq!(file_nos, vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4]);
}

#[test]
fn iterate_stops_when_visitor_says_so() {
    let fixture = MemoryStore::with_max_entries(2);
    write_metrics(&fixture, 0..6);

    let mut seen = 0;
    let visited = fixture
        .reader()
        .iterate(|_, _| {
            seen += 1;
            Ok(seen < 3)
        })
        .unwrap();
    assert_eq!(visited, 3);
}

#[test]
fn sealed_total_stays_within_budget() {
    let budget = 200;
    let fixture = MemoryStore::with_config(|config| {
        config.max_entries_per_file(1).max_total_size(budget)
    });

    for i in 0..50 {
        fixture.put(&padded_payload(i, 1024)).unwrap();
        let (total, _) = fixture.total_sealed_size().unwrap();
        assert!(total <= budget, "sealed total {total} over budget after put {i}");
    }

    assert!(fixture.stats().reclaimed_files > 0);
    assert_eq!(
        fixture.active_path().unwrap(),
        data_path("tcpmon-dataf-51")
    );
}

#[test]
fn sequence_numbers_never_reused() {
    let fixture = MemoryStore::with_config(|config| {
        config.max_entries_per_file(1).max_total_size(1)
    });
    write_metrics(&fixture, 0..3);

    // Every sealed file was reclaimed; only the empty active file is left
    assert_eq!(names(&fixture), vec!["tcpmon-dataf-4"]);

    let fixture = fixture.reopen(|config| config.max_entries_per_file(1).max_total_size(1));
    assert_eq!(
        fixture.active_path().unwrap(),
        data_path("tcpmon-dataf-5")
    );
    assert_eq!(names(&fixture), vec!["tcpmon-dataf-5"]);

    write_metrics(&fixture, 10..12);
    assert_eq!(
        fixture.active_path().unwrap(),
        data_path("tcpmon-dataf-7")
    );
}

#[test]
fn reopen_seals_what_close_left_raw() {
    let fixture = MemoryStore::with_max_entries(100);
    write_metrics(&fixture, 0..5);
    let fixture = fixture.reopen(|config| config.max_entries_per_file(100));

    assert_eq!(names(&fixture), vec!["tcpmon-dataf-1.zst", "tcpmon-dataf-2"]);
    assert_eq!(fixture.reader().count().unwrap(), 5);
}

#[test]
fn target_outside_range_writes_nothing() {
    let fixture = MemoryStore::with_max_entries(100);
    write_metrics(&fixture, 100..110);

    let mut sink = Vec::new();
    let options = ExportOptions::new().target(ts(50)).hostname("h");
    let err = fixture
        .reader()
        .export(&mut sink, &LineProtocol, &options)
        .unwrap_err();

    assert!(matches!(err, CoreError::TimePointNotIncluded { .. }));
    assert!(sink.is_empty());
}

#[test]
fn target_inside_range_exports_file() {
    let fixture = MemoryStore::with_max_entries(5);
    write_metrics(&fixture, 100..110);

    let mut sink = Vec::new();
    let options = ExportOptions::new().target(ts(106)).hostname("h").workers(3);
    let shards = fixture
        .reader()
        .export(&mut sink, &LineProtocol, &options)
        .unwrap();

    // Only the second file ([105, 109]) includes the target
    assert_eq!(shards.len(), 1);
    assert_eq!(shards[0].entry.file_no, FileNo::new(2));
    assert_eq!(shards[0].summary.records, 5);

    let text = String::from_utf8(sink).unwrap();
    assert_eq!(text.lines().count(), 5);
    assert!(text.lines().all(|line| line.starts_with("nic,host=h,interface=eth0 ")));
}

#[test]
fn export_without_target_covers_every_record() {
    let fixture = MemoryStore::with_max_entries(4);
    write_metrics(&fixture, 0..10);

    let mut sink = Vec::new();
    let options = ExportOptions::new().hostname("edge-1").workers(4);
    let shards = fixture
        .reader()
        .export(&mut sink, &JsonLines, &options)
        .unwrap();

    assert_eq!(shards.iter().map(|s| s.summary.records).sum::<u64>(), 10);
    let mut seconds: Vec<i64> = String::from_utf8(sink)
        .unwrap()
        .lines()
        .map(|line| {
            assert!(line.contains("\"host\":\"edge-1\""));
            let start = line.find("\"rx_bytes\":").unwrap() + "\"rx_bytes\":".len();
            line[start..]
                .split(|c: char| !c.is_ascii_digit())
                .next()
                .unwrap()
                .parse()
                .unwrap()
        })
        .collect();
    seconds.sort_unstable();
    assert_eq!(seconds, (0..10).collect::<Vec<_>>());
}

#[test]
fn show_only_reports_bounds_without_output() {
    let fixture = MemoryStore::with_max_entries(100);
    write_metrics(&fixture, 20..30);

    let mut sink = Vec::new();
    let options = ExportOptions::new().show_only(true);
    let shards = fixture
        .reader()
        .export(&mut sink, &LineProtocol, &options)
        .unwrap();

    assert!(sink.is_empty());
    assert_eq!(shards.len(), 1);
    assert_eq!(shards[0].summary.start, Some(ts(20)));
    assert_eq!(shards[0].summary.end, Some(ts(29)));
    assert!(shards[0].summary.shown_only);
}

#[test]
fn torn_write_is_cut_from_sealed_file() {
    let faulty = Arc::new(FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new())));
    let fs: Arc<dyn Filesystem> = faulty.clone();
    let store = tcpmon_core::Store::open(StoreConfig::new(MEMORY_DIR).filesystem(Arc::clone(&fs)))
        .unwrap();

    store.put(b"first").unwrap();
    faulty.fail_writes_after(3);
    assert!(store.put(b"second").is_err());
    faulty.reset();

    // The torn file is sealed without its partial frame
    store.put(b"third").unwrap();
    assert!(store.is_open());
    assert_eq!(store.stats().write_failures, 1);

    let reader = tcpmon_core::Reader::open(fs, MEMORY_DIR).unwrap();
    let mut payloads = Vec::new();
    reader
        .iterate(|file_no, payload| {
            payloads.push((file_no.as_u32(), payload.to_vec()));
            Ok(true)
        })
        .unwrap();
    assert_eq!(
        payloads,
        vec![(1, b"first".to_vec()), (2, b"third".to_vec())]
    );
}

#[test]
fn halt_policy_stops_writes() {
    let faulty = Arc::new(FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new())));
    let store = tcpmon_core::Store::open(
        StoreConfig::new(MEMORY_DIR)
            .filesystem(faulty.clone())
            .write_failure_policy(WriteFailurePolicy::Halt),
    )
    .unwrap();

    store.put(b"ok").unwrap();
    faulty.fail_writes_after(0);
    assert!(store.put(b"lost").is_err());
    faulty.reset();

    assert!(!store.is_open());
    assert!(matches!(
        store.put(b"after").unwrap_err(),
        CoreError::StoreHalted { .. }
    ));
    assert!(store.rotate().is_err());
    assert_eq!(store.stats().write_failures, 1);
}

#[test]
fn reclaim_skips_files_it_cannot_delete() {
    let faulty = Arc::new(FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new())));
    let store = tcpmon_core::Store::open(
        StoreConfig::new(MEMORY_DIR)
            .filesystem(faulty.clone())
            .max_entries_per_file(1),
    )
    .unwrap();
    for i in 0..4 {
        store.put(&padded_payload(i, 256)).unwrap();
    }

    let files = store.files().clone();
    let stuck = files.sealed_path(FileNo::new(2));
    faulty.protect(stuck.clone());

    let stats = Reclaimer::new(files.clone(), 0).reclaim().unwrap();
    assert_eq!(stats.failed, vec![stuck.clone()]);
    assert_eq!(
        stats.deleted,
        vec![
            files.sealed_path(FileNo::new(1)),
            files.sealed_path(FileNo::new(3)),
            files.sealed_path(FileNo::new(4)),
        ]
    );

    let (total, sealed) = files_total(&files);
    assert_eq!(sealed, vec![stuck]);
    assert_eq!(total, stats.total_after);
}

fn files_total(files: &FileSet) -> (u64, Vec<std::path::PathBuf>) {
    let sealed = files.sorted_files(FileFilter::Sealed).unwrap();
    let total = sealed
        .iter()
        .map(|entry| files.fs().stat(&entry.path).unwrap().size)
        .sum();
    (total, sealed.into_iter().map(|entry| entry.path).collect())
}

#[test]
fn concurrent_writers_lose_nothing() {
    let fixture = Arc::new(MemoryStore::with_max_entries(7));
    std::thread::scope(|scope| {
        for t in 0..4i64 {
            let fixture = Arc::clone(&fixture);
            scope.spawn(move || write_metrics(&fixture, (t * 100)..(t * 100 + 25)));
        }
    });

    assert_eq!(fixture.reader().count().unwrap(), 100);
    let report = fixture.reader().verify().unwrap();
    assert!(report.iter().all(|file| file.is_ok()));
}

#[test]
fn second_writer_is_locked_out() {
    let fixture = MemoryStore::new();
    let err = tcpmon_core::Store::open(memory_config(&fixture.fs, &fixture.dir)).unwrap_err();
    assert!(matches!(err, CoreError::Locked { .. }));
}

#[test]
fn disk_store_end_to_end() {
    let fixture = DiskStore::with_config(|config| config.max_entries_per_file(2));
    write_metrics(&fixture, 0..5);
    fixture.rotate().unwrap();

    let reader = fixture.reader();
    assert_eq!(reader.count().unwrap(), 5);
    let states: Vec<FileState> = reader.files().unwrap().iter().map(|e| e.state).collect();
    assert_eq!(
        states,
        vec![
            FileState::Sealed,
            FileState::Sealed,
            FileState::Sealed,
            FileState::Raw,
        ]
    );

    let mut sink = Vec::new();
    reader
        .export(&mut sink, &JsonLines, &ExportOptions::new().hostname("disk"))
        .unwrap();
    assert_eq!(String::from_utf8(sink).unwrap().lines().count(), 5);

    let mut archive = Vec::new();
    let stats = reader.package(&mut archive).unwrap();
    assert_eq!(stats.files, 4);

    let mut names = Vec::new();
    let mut tar = tar::Archive::new(archive.as_slice());
    for entry in tar.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().display().to_string();
        let on_disk = std::fs::read(fixture.path().join(&name)).unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, on_disk, "archived {name} differs");
        names.push(name);
    }
    assert_eq!(
        names,
        vec![
            "tcpmon-dataf-1.zst",
            "tcpmon-dataf-2.zst",
            "tcpmon-dataf-3.zst",
            "tcpmon-dataf-4",
        ]
    );
}

#[test]
fn decoded_metrics_match_what_was_written() {
    let fixture = MemoryStore::with_max_entries(3);
    write_metrics(&fixture, 40..48);

    let mut decoded = Vec::new();
    fixture
        .reader()
        .iterate(|_, payload| {
            decoded.push(Metric::decode(payload)?);
            Ok(true)
        })
        .unwrap();
    let expected: Vec<Metric> = (40..48).map(sample_metric).collect();
    assert_eq!(decoded, expected);
}

fn faulty_store(faulty: &Arc<FaultyFilesystem>, max_entries: u32) -> tcpmon_core::Store {
    tcpmon_core::Store::open(
        StoreConfig::new(MEMORY_DIR)
            .filesystem(faulty.clone())
            .max_entries_per_file(max_entries),
    )
    .unwrap()
}

fn records_by_file(reader: &tcpmon_core::Reader) -> Vec<(u32, Vec<u8>)> {
    let mut records = Vec::new();
    reader
        .iterate(|file_no, payload| {
            records.push((file_no.as_u32(), payload.to_vec()));
            Ok(true)
        })
        .unwrap();
    records
}

#[test]
fn failed_rotation_after_write_keeps_the_record_once() {
    let faulty = Arc::new(FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new())));
    let store = faulty_store(&faulty, 2);
    store.put(b"a").unwrap();

    faulty.set_fail_creates(true);
    store.put(b"b").unwrap();
    assert_eq!(store.reader().count().unwrap(), 2);

    // the full file must rotate before anything else is written to it
    assert!(store.put(b"c").is_err());
    assert_eq!(store.reader().count().unwrap(), 2);

    faulty.reset();
    store.put(b"c").unwrap();
    assert_eq!(
        records_by_file(&store.reader()),
        vec![
            (1, b"a".to_vec()),
            (1, b"b".to_vec()),
            (2, b"c".to_vec()),
        ]
    );
    assert_eq!(store.stats().rotations, 1);
    assert_eq!(store.stats().records_written, 3);
}

#[test]
fn failed_seal_leaves_raw_file_for_recovery() {
    let inner = InMemoryFilesystem::new();
    let faulty = Arc::new(FaultyFilesystem::new(Arc::new(inner.clone())));
    let store = faulty_store(&faulty, 1000);
    store.put(b"a").unwrap();
    store.put(b"b").unwrap();

    faulty.set_fail_removes(true);
    assert!(store.rotate().is_err());
    assert!(store.is_open());
    store.put(b"c").unwrap();
    faulty.reset();

    let mut listed = inner.list(Path::new(MEMORY_DIR)).unwrap();
    listed.sort();
    assert_eq!(
        listed,
        vec!["tcpmon-dataf-1", "tcpmon-dataf-1.zst", "tcpmon-dataf-2"]
    );
    assert_eq!(store.reader().count().unwrap(), 3);
    drop(store);

    let store = faulty_store(&faulty, 1000);
    let mut listed = inner.list(Path::new(MEMORY_DIR)).unwrap();
    listed.sort();
    assert_eq!(
        listed,
        vec!["tcpmon-dataf-1.zst", "tcpmon-dataf-2.zst", "tcpmon-dataf-3"]
    );
    assert_eq!(
        records_by_file(&store.reader()),
        vec![
            (1, b"a".to_vec()),
            (1, b"b".to_vec()),
            (2, b"c".to_vec()),
        ]
    );
}

#[test]
fn failed_create_on_rotate_keeps_active_file() {
    let faulty = Arc::new(FaultyFilesystem::new(Arc::new(InMemoryFilesystem::new())));
    let store = faulty_store(&faulty, 1000);
    store.put(b"a").unwrap();

    faulty.set_fail_creates(true);
    assert!(store.rotate().is_err());
    assert_eq!(store.active_path(), Some(data_path("tcpmon-dataf-1")));
    store.put(b"b").unwrap();

    faulty.reset();
    assert_eq!(store.rotate().unwrap(), data_path("tcpmon-dataf-1.zst"));
    assert_eq!(store.active_path(), Some(data_path("tcpmon-dataf-2")));
    assert_eq!(store.reader().count().unwrap(), 2);
}

proptest! {
    #[test]
    fn payloads_come_back_in_write_order(batch in payload_batch_strategy(40)) {
        let fixture = MemoryStore::with_max_entries(3);
        for payload in &batch {
            fixture.put(payload).unwrap();
        }

        let read: Vec<Vec<u8>> = records_by_file(&fixture.reader())
            .into_iter()
            .map(|(_, payload)| payload)
            .collect();
        prop_assert_eq!(read, batch);
    }

    #[test]
    fn single_payload_survives_rotation(payload in payload_strategy()) {
        let fixture = MemoryStore::with_max_entries(1);
        fixture.put(&payload).unwrap();
        fixture.put(&payload).unwrap();

        let records = records_by_file(&fixture.reader());
        prop_assert_eq!(records, vec![(1, payload.clone()), (2, payload)]);
    }
}
