use criterion::{black_box, criterion_group, criterion_main, Criterion};
use daily_record_core::{build_anchors, labels_equivalent, normalize_label, SubjectAttempts};
use time::{OffsetDateTime, UtcOffset};

const LABELS: [&str; 6] = [
    "Aries",
    "gemini-cancer cusp",
    "  SAGITTARIUS \u{2014} capricorn  ",
    "Pisces\u{2013}Aries Cusp",
    "leo - virgo",
    "",
];

const STORED_SUBJECTS: [&str; 12] = [
    "Aries",
    "Taurus",
    "Gemini",
    "Cancer",
    "Leo",
    "Virgo",
    "Libra",
    "Scorpio",
    "Gemini\u{2013}Cancer Cusp",
    "Sagittarius-Capricorn",
    "Pisces\u{2013}Aries Cusp",
    "Leo\u{2013}Virgo Cusp",
];

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_label_mixed", |b| {
        b.iter(|| {
            for label in LABELS {
                black_box(normalize_label(black_box(label)));
            }
        });
    });
}

fn bench_attempt_matching(c: &mut Criterion) {
    c.bench_function("attempts_against_day_rows", |b| {
        b.iter(|| {
            let mut matches = 0_usize;
            for label in LABELS {
                let attempts = SubjectAttempts::build(label, true);
                for attempt in &attempts {
                    matches += STORED_SUBJECTS
                        .iter()
                        .filter(|stored| labels_equivalent(attempt, stored))
                        .count();
                }
            }
            black_box(matches)
        });
    });
}

fn bench_anchors(c: &mut Criterion) {
    let now = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(1_792_000_000);
    let zone = UtcOffset::from_hms(10, 0, 0).unwrap_or(UtcOffset::UTC);
    c.bench_function("build_anchors", |b| {
        b.iter(|| black_box(build_anchors(black_box(now), zone, UtcOffset::UTC, None)));
    });
}

criterion_group!(benches, bench_normalize, bench_attempt_matching, bench_anchors);
criterion_main!(benches);
