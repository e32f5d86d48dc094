use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use crash_collab::definitions::camera::CAMERA_CHANGE;
use crash_collab::definitions::done::owner_release;
use crash_collab::definitions::geometry::GEOMETRY_CHANGE;
use crash_collab::{ChangeLedger, ChangeReceiver, CrashDoc, RelayMessage};
use crash_core::{CPoint, Camera, Change, ChangeAction, GeometryPayload, PayloadPacket};

fn preview(owner: &str) -> Change {
    let payload = GeometryPayload::new("box")
        .with_attribute("Layer", "Walls")
        .encode()
        .unwrap();
    Change::new(
        owner,
        ChangeAction::ADD | ChangeAction::TEMPORARY,
        GEOMETRY_CHANGE,
        Some(payload),
    )
}

fn batch(n: usize) -> Vec<Change> {
    (0..n)
        .map(|i| preview(if i % 2 == 0 { "Anna" } else { "Jack" }))
        .collect()
}

fn bench_change_encode(c: &mut Criterion) {
    let changes = batch(100);

    c.bench_function("change_batch_encode_100", |b| {
        b.iter(|| black_box(Change::encode_batch(black_box(&changes)).unwrap()))
    });
}

fn bench_change_decode(c: &mut Criterion) {
    let encoded = Change::encode_batch(&batch(100)).unwrap();

    c.bench_function("change_batch_decode_100", |b| {
        b.iter(|| black_box(Change::decode_batch(black_box(&encoded)).unwrap()))
    });
}

fn bench_packet_parse(c: &mut Criterion) {
    let packet = PayloadPacket::new("geometry")
        .with_update("Name", "North wall")
        .encode()
        .unwrap();

    c.bench_function("packet_parse", |b| {
        b.iter(|| black_box(PayloadPacket::parse(black_box(&packet))))
    });
    c.bench_function("packet_parse_raw", |b| {
        b.iter(|| black_box(PayloadPacket::parse(black_box("not a packet"))))
    });
}

fn bench_relay_envelope(c: &mut Criterion) {
    let message = RelayMessage::Changes(batch(10));
    let encoded = message.encode().unwrap();

    c.bench_function("relay_envelope_encode_10", |b| {
        b.iter(|| black_box(message.encode().unwrap()))
    });
    c.bench_function("relay_envelope_decode_10", |b| {
        b.iter(|| black_box(RelayMessage::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_receive_and_drain(c: &mut Criterion) {
    let changes = batch(1_000);

    c.bench_function("receive_drain_1000_previews", |b| {
        b.iter_batched(
            || CrashDoc::in_memory("bench.3dm", "Bob").unwrap(),
            |mut doc| {
                let receiver = ChangeReceiver::new(doc.registry().clone(), doc.idle_sender());
                receiver.receive_all(&changes).unwrap();
                black_box(doc.drain_idle());
                doc
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_owner_release(c: &mut Criterion) {
    let changes = batch(500);
    let release = owner_release("jack");

    c.bench_function("owner_release_250_of_500", |b| {
        b.iter_batched(
            || {
                let mut doc = CrashDoc::in_memory("bench.3dm", "Bob").unwrap();
                for change in &changes {
                    doc.apply_now(change).unwrap();
                }
                doc
            },
            |mut doc| {
                doc.apply_now(black_box(&release)).unwrap();
                doc
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_ledger(c: &mut Criterion) {
    let mut changes = batch(1_000);
    let camera = Camera::new(CPoint::new(10.0, 10.0, 10.0), CPoint::ORIGIN)
        .encode()
        .unwrap();
    for _ in 0..100 {
        changes.push(Change::new("Anna", ChangeAction::ADD, CAMERA_CHANGE, Some(camera.clone())));
    }
    changes.push(owner_release("Anna"));

    c.bench_function("ledger_apply_1101", |b| {
        b.iter(|| {
            let mut ledger = ChangeLedger::new();
            ledger.apply_all(black_box(&changes));
            black_box(ledger.len())
        })
    });
}

criterion_group!(
    benches,
    bench_change_encode,
    bench_change_decode,
    bench_packet_parse,
    bench_relay_envelope,
    bench_receive_and_drain,
    bench_owner_release,
    bench_ledger,
);
criterion_main!(benches);
