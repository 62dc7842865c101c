use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tandem_engine::{to_host, Context, HostType, Layer, PrimitiveKind, Priority};
use tandem_sdk::{ArrayObject, ForeignObject, GuestValue};

fn bench_primitives(c: &mut Criterion) {
    let context = Context::builder("memory").build();
    let mut group = c.benchmark_group("primitives");

    let int = HostType::primitive(PrimitiveKind::Int);
    let exact = GuestValue::from(3.0f64);
    group.bench_function("double_to_int", |b| {
        b.iter(|| to_host(&context, black_box(&exact), &int, Priority::Strict).unwrap());
    });

    let lossy = GuestValue::from(3.5f64);
    group.bench_function("double_to_int_rejected", |b| {
        b.iter(|| to_host(&context, black_box(&lossy), &int, Priority::Strict).is_err());
    });

    let number = GuestValue::from(42);
    group.bench_function("int_to_string_coerce", |b| {
        b.iter(|| to_host(&context, black_box(&number), &HostType::string(), Priority::Coerce).unwrap());
    });

    group.finish();
}

fn bench_list_view(c: &mut Criterion) {
    let context = Context::builder("memory").build();
    let mut group = c.benchmark_group("list_view");

    for size in [16usize, 256, 4096] {
        let elements = (0..size).map(|i| GuestValue::from(i as i32)).collect();
        let guest = GuestValue::object(ArrayObject::new(elements));
        let target = HostType::list_of(HostType::boxed(PrimitiveKind::Long));
        let view = to_host(&context, &guest, &target, Priority::HostProxy).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("iterate", size), &view, |b, view| {
            b.iter(|| {
                let list = view.as_list().unwrap();
                list.iter().filter_map(Result::ok).count()
            });
        });
    }

    group.finish();
}

fn bench_cross_context(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_context");

    for claimed in [false, true] {
        let layer = Layer::new();
        if claimed {
            layer.claim();
        }
        let a = Context::builder("memory").layer(layer.clone()).build();
        let b = Context::builder("memory").layer(layer).build();
        let guest = GuestValue::object(ArrayObject::new(vec![GuestValue::from(1)]));
        let wrapped = b.migrate_value(guest, &a);
        let label = if claimed { "claimed" } else { "unclaimed" };

        group.bench_function(BenchmarkId::new("read_element", label), |bench| {
            bench.iter(|| {
                let object = wrapped.as_object().unwrap();
                object.read_array_element(black_box(0)).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_primitives, bench_list_view, bench_cross_context);
criterion_main!(benches);
