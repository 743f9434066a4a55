use criterion::{black_box, criterion_group, criterion_main, Criterion};
use engine_adapter::Position;

const KIWIPETE_MOVES: &[&str] = &[
    "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6", "e1g1", "f8e7",
];

fn reset_with_moves_bench(c: &mut Criterion) {
    c.bench_function("reset_with_moves startpos 10 plies", |b| {
        let moves: Vec<String> = KIWIPETE_MOVES.iter().map(|m| m.to_string()).collect();
        b.iter(|| {
            let mut pos = Position::startpos();
            let start = *pos.start();
            pos.reset_with_moves(start, black_box(&moves)).unwrap();
        });
    });
}

fn is_legal_uci_bench(c: &mut Criterion) {
    c.bench_function("is_legal_uci after 10 plies", |b| {
        let mut pos = Position::startpos();
        let start = *pos.start();
        let moves: Vec<String> = KIWIPETE_MOVES.iter().map(|m| m.to_string()).collect();
        pos.reset_with_moves(start, &moves).unwrap();
        b.iter(|| black_box(pos.is_legal_uci("d2d4")));
    });
}

criterion_group!(position_benches, reset_with_moves_bench, is_legal_uci_bench);
criterion_main!(position_benches);
