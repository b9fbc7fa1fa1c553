//! Benchmarks for advertisement ingestion and a full wake cycle.
//!
//! `ingest` isolates classification and decoding; `wake_cycle` drives
//! scheduler, scanner, reconciler and routing against an in-memory store.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use datagator::app::{Collaborators, Options, Scanner, run_cycle};
use datagator::output::console::ConsoleSink;
use datagator::peripherals::HostPeripherals;
use datagator::reconciler::NoNetworkTime;
use datagator::store::keys;
use datagator::{
    AdvertisementFrame, AdvertisementIngestor, Backend, KeyValueStore, LogRouter, MacAddress,
    MemoryStore, ScanError, ServiceUuid, TaskKind, ingest,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
const GATOR_MAC: MacAddress = MacAddress([0x24, 0x0A, 0xC4, 0x00, 0x00, 0x01]);

fn minew_ht_frame() -> AdvertisementFrame {
    let mut payload = vec![0xA1, 0x01, 0x64, 0x17, 0x80, 0x2E, 0x40];
    let mut mac = TEST_MAC.0;
    mac.reverse();
    payload.extend_from_slice(&mac);
    AdvertisementFrame::service_data(TEST_MAC, ServiceUuid::from_u16(0xFFE1), payload)
}

fn kkm_frame() -> AdvertisementFrame {
    let payload = vec![
        0x21, 0x00, 0x0F, 0x0B, 0xB8, 0x17, 0x2D, 0x33, 0x05, 0x00, 0x10, 0xFF, 0xF0, 0x03, 0xE8,
    ];
    AdvertisementFrame::service_data(TEST_MAC, ServiceUuid::from_u16(0xFEAA), payload)
        .with_name("KBPro_0A1B2C")
}

fn unknown_frame() -> AdvertisementFrame {
    AdvertisementFrame::manufacturer_data(TEST_MAC, 0x004C, vec![0x02, 0x15, 0x00, 0x01])
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements(1));

    for (name, frame) in [
        ("minew_ht", minew_ht_frame()),
        ("kkm_sensor", kkm_frame()),
        ("unrecognized", unknown_frame()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, frame| {
            b.iter(|| black_box(ingest(black_box(frame), GATOR_MAC)))
        });
    }

    group.finish();
}

fn bench_throttled_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("throttled_ingest");
    let frames: Vec<AdvertisementFrame> = (0..100).map(|_| minew_ht_frame()).collect();

    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("100_same_mac", |b| {
        b.iter(|| {
            let mut ingestor =
                AdvertisementIngestor::new(GATOR_MAC, Some(Duration::from_secs(3600)));
            let emitted = frames
                .iter()
                .filter_map(|frame| ingestor.ingest(frame))
                .count();
            black_box(emitted)
        })
    });

    group.finish();
}

struct FakeScanner {
    frames: Vec<AdvertisementFrame>,
}

impl Scanner for FakeScanner {
    fn start_scan(
        &self,
        _backend: Backend,
        _window: Duration,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<AdvertisementFrame>, ScanError>> + Send + '_>,
    > {
        let frames = self.frames.clone();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(frames.len().max(1));
            for frame in frames {
                let _ = tx.send(frame).await;
            }
            Ok(rx)
        })
    }
}

/// Store positioned so that every task is due on the next boot.
fn store_with_all_due() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.put_int(keys::RESET_COUNT, 60).unwrap();
    for kind in TaskKind::PRIORITY {
        store.put_int(kind.store_key(), 1).unwrap();
    }
    store
}

fn bench_wake_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("wake_cycle");
    let rt = Runtime::new().unwrap();
    let options = Options {
        backend: Backend::Disabled,
        ..Options::default()
    };

    for batch_size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                let scanner = FakeScanner {
                    frames: (0..size).map(|_| minew_ht_frame()).collect(),
                };

                b.iter(|| {
                    let mut store = store_with_all_due();
                    let mut clock = NoNetworkTime;
                    let mut peripherals = HostPeripherals::default();
                    let mut router = LogRouter::new()
                        .with_sink(ConsoleSink::new(Vec::<u8>::with_capacity(128 * size)));
                    let mut io = Collaborators {
                        scanner: &scanner,
                        clock: &mut clock,
                        peripherals: &mut peripherals,
                        router: &mut router,
                    };

                    let report = rt
                        .block_on(run_cycle(&options, &mut store, &mut io))
                        .unwrap();
                    black_box(report)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ingest,
    bench_throttled_ingest,
    bench_wake_cycle
);
criterion_main!(benches);
