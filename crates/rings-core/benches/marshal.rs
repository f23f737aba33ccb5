use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rings_core::{copy_values, Direction, Engine, Rings, StdEngine};
use rings_engine::{State, StateOptions, Value};

fn open() -> State {
    StdEngine.open(&StateOptions::default()).unwrap()
}

/// Copy the single value produced by `source` from one state to another.
fn bench_copy(c: &mut Criterion, group_name: &str, cases: &[(&str, &str)]) {
    let mut group = c.benchmark_group(group_name);
    for (name, source) in cases {
        let src = open();
        let dst = open();
        let value = src.exec(source).unwrap().remove(0);
        src.push(value).unwrap();

        group.bench_with_input(BenchmarkId::new(*name, "copy"), &(), |b, _| {
            b.iter(|| {
                copy_values(
                    &dst,
                    &src,
                    black_box(0..1),
                    Direction::Arguments { function: "dostring" },
                    30,
                )
                .unwrap();
                dst.truncate_stack(0);
            });
        });
    }
    group.finish();
}

fn bench_tables(c: &mut Criterion) {
    bench_copy(
        c,
        "tables",
        &[
            ("flat_100", "local t = {} for i = 1, 100 do t[i] = i end return t"),
            (
                "records_100",
                "local t = {} for i = 1, 100 do t[i] = {id = i, name = 'n' .. i} end return t",
            ),
            ("nested_30", "local t = {} for i = 1, 29 do t = {t} end return t"),
        ],
    );
}

fn bench_sharing(c: &mut Criterion) {
    bench_copy(
        c,
        "sharing",
        &[
            (
                "shared_leaf",
                "local leaf = {1, 2, 3} local t = {} for i = 1, 100 do t[i] = leaf end return t",
            ),
            (
                "cycle_ring",
                "local first = {} local cur = first for i = 1, 20 do cur.next = {} cur = cur.next end cur.next = first return first",
            ),
        ],
    );
}

fn bench_dostring(c: &mut Criterion) {
    let rings = Rings::new().unwrap();
    let ring = rings.create(None).unwrap();

    c.bench_function("dostring_cached", |b| {
        b.iter(|| {
            ring.dostring(black_box("return ... + 1"), vec![Value::Number(1.0)])
                .unwrap()
        });
    });

    c.bench_function("dostring_reverse", |b| {
        b.iter(|| {
            ring.dostring(black_box("return remotedostring('return 1')"), Vec::new())
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_tables, bench_sharing, bench_dostring);
criterion_main!(benches);
