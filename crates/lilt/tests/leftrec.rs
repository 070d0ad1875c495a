//! Left recursion: direct, indirect, associativity and precedence.

use std::cell::Cell;
use std::rc::Rc;

use lilt::{chr, chr_range, eoi, lit, parse, plus, rule, start, Rule, Semantics};

#[test]
fn direct_left_recursion() {
    let e = Rule::new();
    e.define(e.call() + lit("+") + lit("a") | lit("a")).unwrap();
    let s = rule(e.call() + eoi()).unwrap();
    let g = start(&s).unwrap();

    assert!(parse("a", &g).unwrap());
    assert!(parse("a+a", &g).unwrap());
    assert!(parse("a+a+a", &g).unwrap());
    assert!(!parse("a+", &g).unwrap());
    assert!(!parse("", &g).unwrap());
    assert!(!parse("+a", &g).unwrap());
}

#[test]
fn left_recursive_start_rule() {
    let e = Rule::new();
    e.define(e.call() + lit("x") | lit("x")).unwrap();
    let g = start(&e).unwrap();
    assert!(parse("x", &g).unwrap());
    assert!(parse("xxx", &g).unwrap());
    assert!(!parse("", &g).unwrap());
}

#[test]
fn indirect_left_recursion() {
    // A <- B 'x' | 'a' ; B <- A 'y'
    let a = Rule::new();
    let b = Rule::new();
    b.define(a.call() + chr('y')).unwrap();
    a.define(b.call() + chr('x') | chr('a')).unwrap();
    let s = rule(a.call() + eoi()).unwrap();
    let g = start(&s).unwrap();

    assert!(parse("a", &g).unwrap());
    assert!(parse("ayx", &g).unwrap());
    assert!(parse("ayxyx", &g).unwrap());
    assert!(!parse("ay", &g).unwrap());
    assert!(!parse("yx", &g).unwrap());
}

fn number() -> lilt::Expr {
    plus(chr_range('0', '9')).cap(|s: &mut Semantics, x: &lilt::SyntaxView| {
        let v: i64 = x.capture.parse().unwrap_or(0);
        s.push_attribute(v);
    })
}

#[test]
fn left_recursion_is_left_associative() {
    let result = Rc::new(Cell::new(0i64));
    let num = rule(number()).unwrap();
    let expr = Rule::new();
    expr.define(
        (expr.call() + chr('-') + num.call()).act(|s| {
            let b = s.pop_attribute::<i64>();
            let a = s.pop_attribute::<i64>();
            s.push_attribute(a - b);
        }) | num.call(),
    )
    .unwrap();
    let r = result.clone();
    let s = rule(expr.call().act(move |s| r.set(s.pop_attribute::<i64>())) + eoi()).unwrap();
    let g = start(&s).unwrap();

    assert!(parse("1-2-3", &g).unwrap());
    assert_eq!(result.get(), (1 - 2) - 3);

    assert!(parse("10", &g).unwrap());
    assert_eq!(result.get(), 10);
}

#[test]
fn grow_replays_responses_of_the_best_answer() {
    // every grown step queues one action; only the committed ones apply
    let count = Rc::new(Cell::new(0usize));
    let c = count.clone();
    let e = Rule::new();
    e.define((e.call() + lit("+a")).act(move |_| c.set(c.get() + 1)) | lit("a")).unwrap();
    let s = rule(e.call() + eoi()).unwrap();
    let g = start(&s).unwrap();

    assert!(parse("a+a+a", &g).unwrap());
    assert_eq!(count.get(), 2);

    count.set(0);
    assert!(parse("a", &g).unwrap());
    assert_eq!(count.get(), 0);
}

#[test]
fn precedence_annotated_callsites() {
    let e = Rule::new();
    e.define(e.prec(2) + chr('*') + chr('a') | chr('a')).unwrap();
    let s = rule(e.call() + eoi()).unwrap();
    let g = start(&s).unwrap();

    assert!(parse("a", &g).unwrap());
    assert!(parse("a*a", &g).unwrap());
    assert!(parse("a*a*a", &g).unwrap());
    assert!(!parse("a*", &g).unwrap());
}
