//! Data-driven calculator tests: each `tests/calc/*.txt` holds one
//! expression per line, with expected results in the matching `.expected`
//! file. Exercises left recursion, precedence layering, grouping and the
//! attribute stack end to end.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use datatest_stable::harness;
use lilt::{chr, chr_range, eoi, plus, rule, start, Grammar, Rule, Semantics};

fn binop(apply: fn(i64, i64) -> i64) -> impl Fn(&mut Semantics) + 'static {
    move |s| {
        let b = s.pop_attribute::<i64>();
        let a = s.pop_attribute::<i64>();
        s.push_attribute(apply(a, b));
    }
}

fn build_calculator() -> (Grammar, Rc<Cell<i64>>) {
    let result = Rc::new(Cell::new(0i64));

    let num = rule(plus(chr_range('0', '9')).cap(|s, x| {
        let v: i64 = x.capture.parse().unwrap_or(0);
        s.push_attribute(v);
    }))
    .unwrap();

    let expr = Rule::new();
    let term = Rule::new();
    let fact = rule(num.call() | chr('(') + expr.call() + chr(')')).unwrap();

    term.define(
        (term.call() + chr('*') + fact.call()).act(binop(|a, b| a * b))
            | (term.call() + chr('/') + fact.call()).act(binop(|a, b| a / b))
            | fact.call(),
    )
    .unwrap();
    expr.define(
        (expr.call() + chr('+') + term.call()).act(binop(|a, b| a + b))
            | (expr.call() + chr('-') + term.call()).act(binop(|a, b| a - b))
            | term.call(),
    )
    .unwrap();

    let r = result.clone();
    let top = rule(expr.call().act(move |s| r.set(s.pop_attribute::<i64>())) + eoi()).unwrap();
    (start(&top).unwrap(), result)
}

fn run_test(path: &Path) -> datatest_stable::Result<()> {
    let input = std::fs::read_to_string(path)?;
    let expected_path = format!("{}.expected", path.display());
    let expected = std::fs::read_to_string(&expected_path)?.trim().to_string();

    let (grammar, result) = build_calculator();
    let mut outputs: Vec<String> = Vec::new();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if lilt::parse(line, &grammar)? {
            outputs.push(result.get().to_string());
        } else {
            outputs.push(format!("error: {}", line));
        }
    }
    let actual = outputs.join("\n");

    if actual != expected {
        return Err(format!(
            "mismatch for {:?}\n\nExpected:\n{}\n\nActual:\n{}",
            path, expected, actual
        )
        .into());
    }
    Ok(())
}

harness!(run_test, "tests/calc", r"\.txt$");
