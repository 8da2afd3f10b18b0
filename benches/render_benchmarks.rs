//! Benchmarks for pgrel's query pipeline.
//!
//! Benchmarks cover:
//! - Building queries with the DSL
//! - Rendering (AST → SQL text)
//! - String escaping
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pgrel::ast::{self, compile, Dialect, Expression, Query};
use pgrel::schema::{Entity, EntityTypeBuilder, SchemaRegistry, ValueType};

struct User;
struct Article;

impl Entity for User {
    fn describe(t: &mut EntityTypeBuilder<Self>) {
        t.property("id", "id", ValueType::PrimaryKey);
        t.property("email", "email", ValueType::Text);
        t.has_many::<Article>("articles", "author_id");
    }
}

impl Entity for Article {
    fn describe(t: &mut EntityTypeBuilder<Self>) {
        t.property("id", "id", ValueType::PrimaryKey);
        t.property("title", "title", ValueType::Text);
        t.property("created_at", "created_at", ValueType::Timestamp);
        t.belongs_to::<User>("author", "author_id");
    }
}

// ---------------------------------------------------------------------------
// Query inputs organized by complexity
// ---------------------------------------------------------------------------

fn registry() -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    registry.register::<User>().unwrap();
    registry.register::<Article>().unwrap();
    registry
}

fn simple_projection() -> Query {
    ast::projection("articles")
}

fn filtered(registry: &SchemaRegistry) -> Query {
    let article = registry.lookup::<Article>().unwrap();
    registry.from::<Article>().unwrap().filter(
        (ast::column(&article, "title").unwrap().like("%hej%").unwrap()
            & ast::column(&article, "created_at")
                .unwrap()
                .lt(ast::sql("localtime()"))
                .unwrap())
            | ast::column(&article, "author").unwrap().eq(5).unwrap(),
    )
}

fn joined(registry: &SchemaRegistry) -> Query {
    let article = registry.lookup::<Article>().unwrap();
    filtered(registry)
        .left_join_association(registry, "author")
        .unwrap()
        .order(ast::column(&article, "created_at").unwrap())
        .reverse_order()
        .unwrap()
}

/// `depth` OR-ed equality tests on one column.
fn wide_predicate(depth: usize) -> Query {
    let predicate = (0..depth)
        .map(|i| {
            ast::raw_column("articles", "title")
                .eq(format!("title {}", i))
                .unwrap()
        })
        .reduce(|acc, e| acc | e)
        .unwrap_or_else(|| ast::sql("true"));
    ast::projection("articles").filter(predicate)
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("building");
    let registry = registry();

    group.bench_function("filtered", |b| {
        b.iter(|| filtered(black_box(&registry)));
    });
    group.bench_function("joined", |b| {
        b.iter(|| joined(black_box(&registry)));
    });

    group.finish();
}

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");
    let registry = registry();
    let dialect = Dialect::postgres();

    let cases = [
        ("simple_projection", simple_projection()),
        ("filtered", filtered(&registry)),
        ("joined", joined(&registry)),
        ("wide_predicate_16", wide_predicate(16)),
        ("wide_predicate_256", wide_predicate(256)),
    ];

    for (name, query) in &cases {
        group.bench_with_input(BenchmarkId::new("compile", name), query, |b, query| {
            b.iter(|| compile(black_box(query), &dialect).unwrap());
        });
    }

    group.finish();
}

fn bench_escaping(c: &mut Criterion) {
    let mut group = c.benchmark_group("escaping");

    let plain = "a perfectly ordinary article title".repeat(8);
    let quoted = r"it's a \ backslash and 'quotes'".repeat(8);

    for (name, dialect) in [
        ("standard", Dialect::postgres()),
        ("legacy", Dialect::legacy_escapes()),
    ] {
        group.bench_function(BenchmarkId::new("plain", name), |b| {
            b.iter(|| dialect.escape_string(black_box(&plain)).unwrap());
        });
        group.bench_function(BenchmarkId::new("quoted", name), |b| {
            b.iter(|| dialect.escape_string(black_box(&quoted)).unwrap());
        });
    }

    let literal: Expression = ast::raw_column("articles", "title").eq(quoted.as_str()).unwrap();
    group.bench_function("text_comparison", |b| {
        b.iter(|| ast::compile_expression(black_box(&literal), &Dialect::postgres()).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_building, bench_compilation, bench_escaping);
criterion_main!(benches);
