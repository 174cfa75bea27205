//! Tokenizer benchmarks for wordwire-text.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use wordwire_text::{replace_token_at, tokens};

fn article(words: usize) -> String {
    let mut out = String::from(":::summary\n**Founded:** 1999\n:::\n# Title\n");
    for i in 0..words {
        out.push_str("word");
        out.push_str(&i.to_string());
        out.push(' ');
    }
    out
}

fn bench_tokenize(c: &mut Criterion) {
    let text = article(2_000);

    let mut group = c.benchmark_group("tokenize");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("2k_words", |b| {
        b.iter(|| tokens(black_box(&text)).count())
    });
    group.finish();
}

fn bench_replace(c: &mut Criterion) {
    let text = article(2_000);

    c.bench_function("replace_mid_document", |b| {
        b.iter(|| replace_token_at(black_box(&text), 1_000, "replacement"))
    });
}

criterion_group!(benches, bench_tokenize, bench_replace);
criterion_main!(benches);
