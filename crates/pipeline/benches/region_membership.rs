use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pipeline::region::{Point, Region};

fn polygon(vertices: usize) -> Region {
    let points = (0..vertices)
        .map(|i| {
            let angle = i as f32 / vertices as f32 * std::f32::consts::TAU;
            Point::new(640.0 + 300.0 * angle.cos(), 360.0 + 200.0 * angle.sin())
        })
        .collect();
    Region::from_points(points).expect("valid polygon")
}

fn benchmark_membership(c: &mut Criterion) {
    let centroids: Vec<Point> = (0..64)
        .map(|i| Point::new((i * 20) as f32, ((i * 37) % 720) as f32))
        .collect();

    let mut group = c.benchmark_group("region_membership");
    group.throughput(Throughput::Elements(centroids.len() as u64));
    for vertices in [4, 16, 64] {
        let region = polygon(vertices);
        group.bench_with_input(BenchmarkId::from_parameter(vertices), &region, |b, region| {
            b.iter(|| {
                centroids
                    .iter()
                    .filter(|p| region.contains(black_box(**p)))
                    .count()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_membership);
criterion_main!(benches);
