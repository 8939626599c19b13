use criterion::{criterion_group, criterion_main, Criterion};
use sluice_core::device::{
    BufferDescriptor, BufferUsage, VertexFormat, VertexLayout, VertexSemantic,
};
use sluice_core::LoaderConfig;
use sluice_infra::HeadlessDevice;
use sluice_streamer::packing::{encode_octahedral, select_packing};
use sluice_streamer::{BufferLoadDesc, ResourceLoader, StagingAllocator};
use std::hint::black_box;
use std::sync::Arc;

fn bench_staging(c: &mut Criterion) {
    let device = HeadlessDevice::default();
    let mut staging = StagingAllocator::new(&device, 8 << 20, 256, 0).expect("ring");

    let mut group = c.benchmark_group("Staging");

    // 64 KiB requests fill the ring 128 times per reset.
    group.bench_function("Ring allocation (64 KiB)", |b| {
        b.iter(|| {
            if !staging.fits(64 << 10, 512) {
                staging.reset(&device);
            }
            black_box(staging.allocate(&device, 64 << 10, 512).expect("fits"));
        });
    });

    group.bench_function("Spill + reset (16 MiB)", |b| {
        b.iter(|| {
            black_box(staging.allocate(&device, 16 << 20, 512).expect("temporary"));
            staging.reset(&device);
        });
    });

    group.finish();
}

fn bench_buffer_update(c: &mut Criterion) {
    let device = HeadlessDevice::default();
    let loader = ResourceLoader::new(
        Arc::new(device),
        LoaderConfig {
            single_threaded: true,
            ..LoaderConfig::default()
        },
    )
    .expect("loader");
    let (buffer, _) = loader
        .add_buffer(BufferLoadDesc {
            desc: BufferDescriptor {
                size: 64 << 10,
                usage: BufferUsage::VERTEX,
                ..Default::default()
            },
            data: None,
            force_reset: true,
        })
        .expect("buffer");
    while loader.pump() {}

    let payload = vec![0xA5u8; 64 << 10];
    let mut group = c.benchmark_group("Buffer update");

    group.bench_function("Scoped update (64 KiB)", |b| {
        b.iter(|| {
            let update = loader.begin_buffer_update(buffer, 0, None).expect("update");
            update.write(0, &payload).expect("write");
            let token = loader.end_buffer_update(update).expect("enqueue");
            while !loader.is_token_completed(&token) {
                loader.pump();
            }
            black_box(token);
        });
    });

    group.finish();
}

fn bench_packing(c: &mut Criterion) {
    let normals: Vec<[f32; 3]> = (0..4096)
        .map(|i| {
            let a = i as f32 * 0.01;
            [a.cos(), a.sin(), 0.5]
        })
        .collect();
    let layout = VertexLayout::default()
        .with(VertexSemantic::Position, VertexFormat::Float32x3, 0)
        .with(VertexSemantic::Normal, VertexFormat::Unorm16x2, 0);
    let packing = select_packing(VertexFormat::Float32x3, VertexFormat::Unorm16x2).expect("octahedral");
    let stride = layout.binding_stride(0) as usize;

    let mut group = c.benchmark_group("Vertex packing");

    group.bench_function("Octahedral encode", |b| {
        b.iter(|| {
            for n in &normals {
                black_box(encode_octahedral(*n));
            }
        });
    });

    group.bench_function("Interleave normals", |b| {
        let mut out = vec![0u8; normals.len() * stride];
        b.iter(|| {
            for (n, vertex) in normals.iter().zip(out.chunks_mut(stride)) {
                packing.apply(bytemuck::bytes_of(n), &mut vertex[12..]);
            }
            black_box(&out);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_staging, bench_buffer_update, bench_packing);
criterion_main!(benches);
