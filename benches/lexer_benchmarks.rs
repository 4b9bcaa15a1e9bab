use cfg_config::{LexerConfig, Parser, TokenKind, Tokenizer};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Generate CFG documents of various sizes
fn generate_cfg_content(size_category: &str) -> String {
    match size_category {
        "small" => {
            // ~1KB of CFG content
            r#"# Application settings
name: 'test-app'
version: '1.0.0'
description: "A test application"
author: 'Test Author'
license: 'MIT'
dependencies: {
    serde: '1.0'
    regex: '1.0'
    chrono: '0.4'
}
features: ['json', 'yaml', 'toml']
debug: true
port: 8000 + 80
timeout: 30.0
max_connections: 1_000
home: `$HOME|/tmp`
"#
            .to_string()
        }
        "medium" => {
            // ~10KB of CFG content
            let mut content = String::new();
            for i in 0..100 {
                content.push_str(&format!(
                    r#"
service_{i}: {{
    name: 'service-{i}'
    port: {port}
    enabled: {enabled}
    config: {{
        timeout: {timeout}
        retries: ${{defaults.retries}} + {retries}
        endpoints: ['/health', '/metrics', '/status']
    }}
    metadata: {{version: '1.{minor}.0', owner: "Service Team {team}"}}
}}
"#,
                    i = i,
                    port = 8000 + i,
                    enabled = i % 2 == 0,
                    timeout = 10 + (i % 20),
                    retries = i % 5,
                    minor = i % 10,
                    team = i % 5,
                ));
            }
            content
        }
        "large" => {
            // ~100KB of CFG content
            let mut content = String::new();
            for i in 0..1000 {
                content.push_str(&format!(
                    "item_{i}: {{id: {i}, name: 'item-{i}', active: {active}, weight: {weight}.5, tags: ['tag-{t}', 'type-{ty}'], mask: 0x{i:x} | 0b101}}\n",
                    i = i,
                    active = i % 3 != 0,
                    weight = i % 100,
                    t = i % 10,
                    ty = i % 7,
                ));
            }
            content
        }
        _ => "test: true".to_string(),
    }
}

fn count_tokens(source: &str) -> usize {
    let mut tokenizer = Tokenizer::new(source);
    let mut token_count = 0;
    while let Ok(token) = tokenizer.next_token() {
        token_count += 1;
        if token.kind == TokenKind::Eof {
            break;
        }
        black_box(&token);
    }
    token_count
}

/// Benchmark tokenizing whole documents
fn bench_lexer_tokenization(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_tokenization");

    for size in ["small", "medium", "large"] {
        let content = generate_cfg_content(size);
        group.throughput(Throughput::Bytes(content.len() as u64));

        group.bench_with_input(BenchmarkId::new("next_token", size), &content, |b, content| {
            b.iter(|| count_tokens(black_box(content)));
        });

        group.bench_with_input(BenchmarkId::new("iterator", size), &content, |b, content| {
            b.iter(|| Tokenizer::new(black_box(content)).count());
        });

        group.bench_with_input(BenchmarkId::new("parse", size), &content, |b, content| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(content)).expect("valid document");
                parser.container().expect("valid document")
            });
        });
    }

    group.finish();
}

/// Benchmark string literal scanning
fn bench_string_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_parsing");

    let long_string = format!("'very long string {}'", "x".repeat(1000));
    let long_triple = format!("'''{}'''", "line\n".repeat(200));
    let strings = vec![
        "'simple string'",
        r#""string with \"escapes\" and \n newlines""#,
        r#""unicode AB\U0001F600""#,
        "`${interpolated} ${values}`",
        &long_string,
        &long_triple,
    ];

    for (i, string_content) in strings.iter().enumerate() {
        group.throughput(Throughput::Bytes(string_content.len() as u64));
        group.bench_with_input(BenchmarkId::new("string", i), string_content, |b, content| {
            b.iter(|| Tokenizer::new(black_box(content)).next_token());
        });
    }

    group.bench_function("length_limited", |b| {
        let config = LexerConfig::default().with_max_string_length(64);
        b.iter(|| Tokenizer::with_config(black_box(&long_string), config.clone()).next_token());
    });

    group.finish();
}

/// Benchmark number literal scanning
fn bench_number_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("number_parsing");

    let numbers = vec![
        "42", "-123", "3.14159", "1.23e-4", "0x1a2b3c", "0o777", "0b1010", "1_000_000", "2.5j",
        "1e10",
    ];

    for (i, number_str) in numbers.iter().enumerate() {
        group.bench_with_input(BenchmarkId::new("number", i), number_str, |b, content| {
            b.iter(|| Tokenizer::new(black_box(content)).next_token());
        });
    }

    group.finish();
}

/// Benchmark comment and whitespace skipping
fn bench_comment_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("comment_parsing");

    let comment_content = (0..200)
        .map(|i| format!("# comment line {}\nkey_{}: 'value' # trailing\n\n", i, i))
        .collect::<String>();

    group.throughput(Throughput::Bytes(comment_content.len() as u64));
    group.bench_function("commented_document", |b| {
        b.iter(|| count_tokens(black_box(&comment_content)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lexer_tokenization,
    bench_string_parsing,
    bench_number_parsing,
    bench_comment_parsing
);
criterion_main!(benches);
