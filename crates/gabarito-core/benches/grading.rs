use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gabarito_core::clock::FixedClock;
use gabarito_core::generator::PermutationGenerator;
use gabarito_core::grading::{ExplicitKey, GradeRequest, GradingEngine, KeyCandidates};
use gabarito_core::index::{Position, VariantIndex};
use gabarito_core::model::{Difficulty, Exam, Letter, Question};
use gabarito_core::variant::VariantSet;
use uuid::Uuid;

fn make_exam(n: u64) -> Exam {
    let questions = (1..=n)
        .map(|id| Question {
            id,
            subject: format!("subject-{}", id % 4),
            topic: format!("topic-{}", id % 9),
            difficulty: match id % 3 {
                0 => Difficulty::Easy,
                1 => Difficulty::Medium,
                _ => Difficulty::Hard,
            },
            correct: Letter::ALL[(id % 5) as usize],
        })
        .collect();
    Exam::new(1, "bench", 10, questions)
}

fn make_answers(n: u32) -> BTreeMap<Position, String> {
    (1..=n)
        .filter_map(|p| Position::new(p).ok())
        .map(|p| (p, Letter::ALL[(p.get() % 5) as usize].to_string()))
        .collect()
}

fn bench_grade(c: &mut Criterion) {
    let mut group = c.benchmark_group("grade");
    let engine = GradingEngine::new(Arc::new(FixedClock::new(DateTime::<Utc>::UNIX_EPOCH)));
    let exam = make_exam(45);
    let answers = make_answers(45);

    let set = VariantSet {
        id: Uuid::nil(),
        exam_id: exam.id,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        created_by: None,
        question_count: exam.question_count(),
        permutations: PermutationGenerator::seeded(1).generate(&exam.questions, 5),
        notes: String::new(),
    };
    let variant = VariantIndex::new(3, 5).unwrap_or(VariantIndex::FIRST);

    group.bench_function("canonical/45", |b| {
        b.iter(|| {
            engine.grade(black_box(GradeRequest {
                exam: &exam,
                learner_id: 1,
                keys: KeyCandidates::default(),
                variant: VariantIndex::FIRST,
                answers: &answers,
            }))
        })
    });

    group.bench_function("explicit/45", |b| {
        b.iter(|| {
            engine.grade(black_box(GradeRequest {
                exam: &exam,
                learner_id: 1,
                keys: KeyCandidates {
                    explicit: Some(ExplicitKey::Loaded(&set)),
                    official: None,
                },
                variant,
                answers: &answers,
            }))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_grade);
criterion_main!(benches);
