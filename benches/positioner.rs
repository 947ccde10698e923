use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use xdgsmith::protocol::{ConstraintAdjustment, Edges};
use xdgsmith::shell::xdg::{Positioner, PositionerState};
use xdgsmith::utils::{Logical, Rectangle, Size};

const EDGES: [Edges; 9] = [
    Edges::empty(),
    Edges::TOP,
    Edges::BOTTOM,
    Edges::LEFT,
    Edges::RIGHT,
    Edges::TOP.union(Edges::LEFT),
    Edges::BOTTOM.union(Edges::LEFT),
    Edges::TOP.union(Edges::RIGHT),
    Edges::BOTTOM.union(Edges::RIGHT),
];

fn random_positioners(output: Size<i32, Logical>, count: usize) -> Vec<Positioner> {
    let mut rand = rand::thread_rng();
    (0..count)
        .filter_map(|_| {
            let anchor_rect = Rectangle::from_loc_and_size(
                (rand.gen_range(-50..output.w), rand.gen_range(-50..output.h)),
                (rand.gen_range(0..200), rand.gen_range(0..50)),
            );
            PositionerState {
                rect_size: Some((rand.gen_range(1..400), rand.gen_range(1..600)).into()),
                anchor_rect: Some(anchor_rect),
                anchor_edges: EDGES[rand.gen_range(0..EDGES.len())],
                gravity: EDGES[rand.gen_range(0..EDGES.len())],
                constraint_adjustment: ConstraintAdjustment::from_bits_truncate(rand.gen_range(0..64)),
                offset: (rand.gen_range(-10..10), rand.gen_range(-10..10)).into(),
                ..Default::default()
            }
            .validate()
            .ok()
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let output: Size<i32, Logical> = Size::from((1920, 1080));
    let bounds = Rectangle::from_size(output);
    let positioners = random_positioners(output, 1024);

    c.bench_function("positioner_geometry", |b| {
        b.iter(|| {
            positioners
                .iter()
                .fold(0i64, |acc, positioner| acc + positioner.geometry().loc.x as i64)
        });
    });

    c.bench_function("positioner_solve", |b| {
        b.iter(|| {
            positioners
                .iter()
                .fold(0i64, |acc, positioner| acc + positioner.solve(bounds).size.w as i64)
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
