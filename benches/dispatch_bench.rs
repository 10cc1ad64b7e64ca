/*Measures the dispatch-side hot path: encoding a control change, cycling
the packet builder, filling a full 512-byte batch, and handing bytes to a
gateway. Together these bound the per-message cost after the staleness
filter. */
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use midi_dispatch::{
    ControlMessage, DispatchConfig, DispatchMonitor, DispatchWorker, EventQueue, NullGateway,
    PacketBuilder, TransmitGateway, encode_control_change,
};
use std::{
    hint::black_box,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

fn bench_encode(c: &mut Criterion) {
    let message = ControlMessage::new(7, 64);

    c.bench_function("encode_control_change", |b| {
        b.iter(|| black_box(encode_control_change(black_box(0), &message)));
    });
}

fn bench_builder_cycle(c: &mut Criterion) {
    let message = ControlMessage::new(7, 64);
    let entry = encode_control_change(0, &message);
    let mut builder = PacketBuilder::default();

    // One entry in, one transmission's worth of reset: the per-message cycle.
    c.bench_function("builder_append_reset", |b| {
        b.iter(|| {
            let _ = builder.append(black_box(&entry));
            black_box(builder.batch().len());
            builder.reset();
        });
    });
}

fn bench_builder_full_batch(c: &mut Criterion) {
    let message = ControlMessage::new(7, 64);
    let entry = encode_control_change(0, &message);
    // 170 three-byte entries fill 510 of 512 bytes.
    let entries = 170;

    c.bench_function("builder_fill_512", |b| {
        b.iter_batched(
            PacketBuilder::default,
            |mut builder| {
                for _ in 0..entries {
                    let _ = builder.append(&entry);
                }
                black_box(builder.batch().entries());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_gateway_transmit(c: &mut Criterion) {
    let message = ControlMessage::new(7, 64);
    let entry = encode_control_change(0, &message);
    let mut builder = PacketBuilder::default();
    let _ = builder.append(&entry);

    let mut gateway = NullGateway::new();
    let _ = gateway.open();

    c.bench_function("null_gateway_transmit", |b| {
        b.iter(|| {
            let _ = gateway.transmit(black_box(builder.batch()));
        });
    });
}

fn bench_dispatch_batch(c: &mut Criterion) {
    let mut gateway = NullGateway::new();
    let _ = gateway.open();

    // Loose threshold so batches aged by the harness setup are not filtered.
    let config = DispatchConfig {
        staleness_threshold: Duration::from_secs(1),
        ..DispatchConfig::default()
    };
    let mut worker = DispatchWorker::new(
        Arc::new(EventQueue::new()),
        Arc::new(AtomicBool::new(false)),
        Box::new(gateway),
        Arc::new(DispatchMonitor::new()),
        &config,
    );

    // Filter + encode + transmit for one claimed backlog of 16 messages.
    c.bench_function("dispatch_batch_16", |b| {
        b.iter_batched(
            || {
                (0..16u8)
                    .map(|i| ControlMessage::new(i, 64))
                    .collect::<Vec<_>>()
            },
            |batch| worker.dispatch_batch(batch),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_builder_cycle,
    bench_builder_full_batch,
    bench_gateway_transmit,
    bench_dispatch_batch,
);
criterion_main!(benches);
