use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use markup_guardian::patterns::library;
use markup_guardian::{scanner, MarkupValidator};
use std::hint::black_box;

const CLEAN_PAGE: &str = include_str!("../tests/fixtures/large.html");

/// Inputs that stress backtracking-prone shapes: long runs of `<`, spaces
/// before `=`, unterminated quotes and deep inline nesting
fn pathological_inputs() -> Vec<(&'static str, String)> {
    vec![
        ("less_signs", "<".repeat(20_000)),
        ("spaced_equals", format!("<a{}>", " =".repeat(10_000))),
        ("unterminated_quote", format!("<a href=\"{}", "x ".repeat(10_000))),
        ("deep_nesting", format!("{}<div></div>{}", "<span>".repeat(2_000), "</span>".repeat(2_000))),
        ("stray_closes", format!("{}{}", "<span>".repeat(50_000), "</b>".repeat(50_000))),
        ("unclosed_paragraph", format!("<p>{}", "<div>x".repeat(50_000))),
        ("long_line", "a".repeat(100_000)),
        ("blank_lines", "\n \n".repeat(10_000)),
    ]
}

fn bench_matchers(c: &mut Criterion) {
    let mut group = c.benchmark_group("matchers");
    group.sample_size(10);

    let matchers = [
        library::space_before_equals(),
        library::space_after_less_sign(),
        library::wrong_quote_in_attribute(),
        library::two_line_breaks_in_a_row(),
    ];

    for (name, input) in pathological_inputs() {
        for matcher in &matchers {
            group.bench_with_input(BenchmarkId::new(matcher.name(), name), &input, |b, input| {
                b.iter(|| black_box(matcher.test(black_box(input))));
            });
        }
    }

    group.finish();
}

fn bench_scanners(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanners");
    group.sample_size(10);

    for (name, input) in pathological_inputs() {
        group.bench_with_input(BenchmarkId::new("block_inside_inline", name), &input, |b, input| {
            b.iter(|| black_box(scanner::block_inside_inline(black_box(input))));
        });
        group.bench_with_input(BenchmarkId::new("wrong_spaces", name), &input, |b, input| {
            b.iter(|| black_box(scanner::wrong_spaces_checker(black_box(input))));
        });
    }

    group.finish();
}

fn bench_full_rulebook(c: &mut Criterion) {
    let mut group = c.benchmark_group("rulebook");
    group.sample_size(10);

    let Ok(validator) = MarkupValidator::new() else {
        return;
    };
    let big_page = CLEAN_PAGE.repeat(50);

    group.bench_function("clean_page", |b| {
        b.iter(|| black_box(validator.validate_document("index.html", black_box(CLEAN_PAGE))));
    });
    group.bench_function("clean_page_x50", |b| {
        b.iter(|| black_box(validator.validate_document("index.html", black_box(&big_page))));
    });

    group.finish();
}

criterion_group!(benches, bench_matchers, bench_scanners, bench_full_rulebook);
criterion_main!(benches);
