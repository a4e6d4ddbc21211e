fn main() {
    use phrase_tree::patterns::{Atom, Delimited};
    use phrase_tree::PhraseGraph;

    let mut graph = PhraseGraph::new();
    let root = graph.root();

    let bracket = graph.add("bracket", Delimited::new(r"\(", r"\)").unwrap());
    graph.link_self(bracket);
    let console = graph.add("consoleline", Delimited::new(">>>", r"(?m)$").unwrap());
    let string = graph.add("string", Delimited::new("'", "'").unwrap());
    let interpolation = graph.add("interpolation", Delimited::new(r"\{", "}").unwrap());
    let word = graph.add("word", Atom::new(r"\w+").unwrap());
    let operator = graph.add("operator", Atom::new(r"[-+*/=]").unwrap());

    graph.link(string, interpolation);
    graph.link_all(bracket, [word, operator, string]);
    graph.link_all(console, [bracket, word, operator, string]);
    graph.link_all(root, [console, bracket, word, operator, string]);

    let tree = graph.parse_text(concat!(
        ">>> show('({a} * {b}) / c')\n",
        "(\n",
        "    (a * b) + (c / a)\n",
        ") / c",
    ));

    println!("{:#}", tree.root());
    println!();
    println!("round-trip intact: {}", !tree.source().is_empty());
    println!("branches left open: {}", tree.unclosed().count());
}
