use criterion::{black_box, criterion_group, criterion_main, Criterion};
use phrase_tree::patterns::{Atom, Delimited};
use phrase_tree::PhraseGraph;

fn parse_nested_benchmark(c: &mut Criterion) {
    let mut graph = PhraseGraph::new();
    let root = graph.root();
    let bracket = graph.add("bracket", Delimited::new(r"\(", r"\)").unwrap());
    let string = graph.add("string", Delimited::new("'", "'").unwrap());
    let word = graph.add("word", Atom::new(r"\w+").unwrap());
    graph.link_self(bracket);
    graph.link_all(bracket, [string, word]);
    graph.link_all(root, [bracket, string, word]);

    let rows: Vec<String> = (0..500)
        .map(|n| format!("row{} (alpha (beta 'gamma') delta) tail\n", n))
        .collect();

    c.bench_function("parse_nested_regions", |b| {
        b.iter(|| {
            let tree = graph.parse(black_box(&rows).iter().map(String::as_str));
            black_box(tree);
        });
    });
}

criterion_group!(benches, parse_nested_benchmark);
criterion_main!(benches);
