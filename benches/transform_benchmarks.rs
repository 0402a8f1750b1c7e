use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use e621_noapi::{
    query::TagQuery, CropStrategy, ImageTransformer, OutputFormat, Record, SourceReference,
    TransformSpec,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};

fn transformer(strategy: CropStrategy, format: OutputFormat) -> ImageTransformer {
    ImageTransformer::new(TransformSpec {
        target_size: (512, 512),
        crop_strategy: strategy,
        output_format: format,
        ..TransformSpec::default()
    })
    .expect("valid transform spec")
}

fn source_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    }))
}

fn bench_plan_windows(c: &mut Criterion) {
    let t = transformer(
        CropStrategy::MultiResolution {
            scales: vec![1.0, 0.9, 0.75, 0.5, 0.25],
        },
        OutputFormat::Png,
    );
    c.bench_function("plan_windows_5_scales", |b| {
        b.iter(|| t.plan_windows(black_box(4096), black_box(2731)));
    });
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    group.sample_size(10);

    for (width, height) in [(800, 600), (2048, 1536)] {
        let image = source_image(width, height);
        for (name, strategy) in [
            ("center", CropStrategy::Center),
            ("multi", CropStrategy::multi_resolution()),
        ] {
            let t = transformer(strategy, OutputFormat::Png);
            group.bench_with_input(
                BenchmarkId::new(name, format!("{width}x{height}")),
                &image,
                |b, image| b.iter(|| t.transform(image.clone())),
            );
        }
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_and_encode");
    group.sample_size(10);
    let image = source_image(1024, 768);

    for format in [OutputFormat::Png, OutputFormat::Jpeg] {
        let t = transformer(CropStrategy::Center, format);
        group.bench_function(format.to_string(), |b| {
            b.iter(|| {
                t.process(image.clone(), Path::new("bench.png"))
                    .expect("transform succeeds")
            });
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let query = TagQuery::parse("wolf ~solo ~duo -comic rating:s score:>=10").expect("valid query");
    let record = Record {
        id: "1".to_string(),
        tags: ["wolf", "solo", "blue_eyes", "forest", "standing"]
            .iter()
            .map(|tag| (*tag).to_string())
            .collect(),
        source: SourceReference::Path(PathBuf::from("1.png")),
        metadata: e621_noapi::types::RecordMetadata::default(),
    };

    c.bench_function("query_parse", |b| {
        b.iter(|| TagQuery::parse(black_box("wolf ~solo ~duo -comic rating:s score:>=10")));
    });
    c.bench_function("query_match", |b| b.iter(|| query.matches(black_box(&record))));
}

criterion_group!(benches, bench_plan_windows, bench_transform, bench_encode, bench_query);
criterion_main!(benches);
