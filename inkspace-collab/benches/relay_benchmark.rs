use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use uuid::Uuid;

use inkspace_collab::{PresenceRecord, RelayMessage, Room};
use inkspace_core::Delta;

fn record(i: usize) -> PresenceRecord {
    PresenceRecord {
        actor_id: format!("peer{i}@x"),
        display_label: format!("Peer {i}"),
        avatar_ref: None,
        session_ref: Uuid::new_v4(),
    }
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame Codec");
    group.throughput(Throughput::Elements(1));

    let delta_json = Delta::new()
        .retain(120)
        .insert("collaboratively typed sentence")
        .to_json()
        .unwrap();
    let msg = RelayMessage::edit(Uuid::new_v4(), Uuid::new_v4(), delta_json.into_bytes());

    group.bench_function("encode_edit", |b| {
        b.iter(|| {
            let bytes = black_box(&msg).encode().unwrap();
            black_box(bytes);
        })
    });

    let encoded = msg.encode().unwrap();
    group.bench_function("decode_edit", |b| {
        b.iter(|| {
            let frame = RelayMessage::decode(black_box(&encoded)).unwrap();
            black_box(frame);
        })
    });

    group.finish();
}

fn bench_room_fanout(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("Room Fan-out");
    group.throughput(Throughput::Elements(1));

    // 100 members, receivers kept alive so publishes have somewhere to go.
    let room = Room::new(2048);
    let receivers: Vec<_> = runtime.block_on(async {
        let mut receivers = Vec::new();
        for i in 0..100 {
            receivers.push(room.add_session(record(i)).await);
        }
        receivers
    });

    let frame = Arc::new(
        RelayMessage::edit(Uuid::new_v4(), Uuid::new_v4(), vec![0u8; 64])
            .encode()
            .unwrap(),
    );

    group.bench_function("publish_100_members", |b| {
        b.iter(|| {
            let delivered = room.publish_raw(black_box(frame.clone()));
            black_box(delivered);
        })
    });

    drop(receivers);
    group.finish();
}

criterion_group!(benches, bench_frame_codec, bench_room_fanout);
criterion_main!(benches);
