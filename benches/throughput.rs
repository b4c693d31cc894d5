use std::{cell::RefCell, rc::Rc};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use transbuf::{
    archive::{Archive, Archived},
    config::BufferConfig,
    core::buffer::TransactionBuffer,
    object::{ElementOps, ScriptArray, Transactable},
    types::{ArrayHandle, ArrayOp, Name, ObjectRef},
};

#[derive(Default)]
struct Prop {
    transform: [f64; 16],
    tag: Name,
    label: String,
    samples: Vec<f32>,
}

impl Transactable for Prop {
    fn serialize(&mut self, ar: &mut dyn Archive) {
        self.transform.archive(ar);
        self.tag.archive(ar);
        self.label.archive(ar);
    }

    fn array_mut(&mut self, handle: ArrayHandle) -> Option<&mut dyn ScriptArray> {
        match handle {
            ArrayHandle(0) => Some(&mut self.samples),
            _ => None,
        }
    }
}

fn props(n: usize) -> Vec<(Rc<RefCell<Prop>>, ObjectRef)> {
    (0..n)
        .map(|i| {
            let rc = Rc::new(RefCell::new(Prop {
                tag: Name::new(format!("prop_{i}")),
                label: format!("Prop {i}"),
                ..Prop::default()
            }));
            let obj = ObjectRef::from(&rc);
            (rc, obj)
        })
        .collect()
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_transaction");
    for n in [1usize, 16, 256] {
        let objects = props(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut buffer = TransactionBuffer::default();
                for step in 0..100 {
                    buffer.begin("Bench", "Move");
                    for (rc, obj) in &objects {
                        buffer.save_object(obj);
                        rc.borrow_mut().transform[12] = f64::from(step);
                    }
                    buffer.end();
                }
            });
        });
    }
    group.finish();
}

fn bench_undo_redo(c: &mut Criterion) {
    let objects = props(64);
    let mut buffer = TransactionBuffer::new(BufferConfig {
        max_memory_bytes: usize::MAX,
        ..BufferConfig::default()
    });
    for step in 0..50 {
        buffer.begin("Bench", "Move");
        for (rc, obj) in &objects {
            buffer.save_object(obj);
            rc.borrow_mut().transform[13] = f64::from(step);
        }
        buffer.end();
    }

    c.bench_function("undo_redo_50x64", |b| {
        b.iter(|| {
            while buffer.undo() {}
            while buffer.redo() {}
        });
    });
}

fn bench_array_ranges(c: &mut Criterion) {
    c.bench_function("array_insert_undo_10k", |b| {
        b.iter(|| {
            let objects = props(1);
            let (rc, obj) = &objects[0];
            let mut buffer = TransactionBuffer::default();
            buffer.begin("Bench", "Fill");
            for i in 0..10_000u16 {
                let len = rc.borrow().samples.len();
                buffer.save_array(obj, ArrayHandle(0), len, 1, ArrayOp::Insert, ElementOps::of::<f32>());
                rc.borrow_mut().samples.push(f32::from(i));
            }
            buffer.end();
            buffer.undo();
        });
    });
}

criterion_group!(benches, bench_record, bench_undo_redo, bench_array_ranges);
criterion_main!(benches);
