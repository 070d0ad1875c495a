//! Matching behavior: primitives, string expressions, ordered choice,
//! repetition and failure reporting.

use indoc::indoc;
use lilt::unicode::{Ctype, GcFlags, Props, Script};
use lilt::{
    any, chr, chr_range, class, eoi, eol, eps, gc, lit, parse, peek, plus, prop, rule, script,
    space, star, start, Error, Grammar, Parser,
};

#[test]
fn literal_then_eoi() {
    let s = rule(lit("a") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("a", &g).unwrap());

    let mut p = Parser::new(&g);
    p.enqueue("ab");
    assert!(!p.parse().unwrap());
    assert_eq!(p.max_input_position().column, 2);
    assert_eq!(p.max_input_position().line, 1);
}

#[test]
fn plus_repetition() {
    let s = rule(plus(lit("a")) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(!parse("", &g).unwrap());
    assert!(parse("a", &g).unwrap());
    assert!(parse("aaaa", &g).unwrap());
    assert!(!parse("aaab", &g).unwrap());
}

#[test]
fn ordered_choice_commits_to_first_match() {
    let s = rule((lit("ab") | lit("a")) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("a", &g).unwrap());
    assert!(parse("ab", &g).unwrap());

    // first branch wins even when the second would have consumed more
    let s = rule((lit("a") | lit("ab")) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("a", &g).unwrap());
    assert!(!parse("ab", &g).unwrap());
}

#[test]
fn epsilon_is_a_right_identity() {
    let plain = start(&rule(lit("ab")).unwrap()).unwrap();
    let padded = start(&rule(lit("ab") + eps()).unwrap()).unwrap();
    for input in ["", "a", "ab", "abc"] {
        assert_eq!(parse(input, &plain).unwrap(), parse(input, &padded).unwrap(), "input {:?}", input);
    }
}

#[test]
fn lookahead_consumes_nothing() {
    // !!e behaves as positive lookahead
    let s = rule(!!lit("ab") + lit("abc") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("abc", &g).unwrap());
    assert!(!parse("xbc", &g).unwrap());

    let s = rule(peek(lit("ab")) + lit("abc") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("abc", &g).unwrap());
    assert!(!parse("xbc", &g).unwrap());
}

#[test]
fn negative_lookahead() {
    // a sequence of anything but ';', then ';'
    let s = rule(plus(!chr(';') + any()) + chr(';') + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("abc;", &g).unwrap());
    assert!(!parse(";", &g).unwrap());
    assert!(!parse("abc", &g).unwrap());
}

#[test]
fn char_ranges() {
    let s = rule(plus(chr_range('0', '9')) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("0419", &g).unwrap());
    assert!(!parse("04x9", &g).unwrap());
    assert!(!parse("", &g).unwrap());
}

#[test]
fn string_expression_dot() {
    let s = rule(lit("a.c") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("abc", &g).unwrap());
    assert!(parse("azc", &g).unwrap());
    assert!(!parse("ac", &g).unwrap());
}

#[test]
fn string_expression_brackets() {
    let s = rule(lit("[a-c]x") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("ax", &g).unwrap());
    assert!(parse("cx", &g).unwrap());
    assert!(!parse("dx", &g).unwrap());

    let s = rule(lit("[^0-9]") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("a", &g).unwrap());
    assert!(!parse("5", &g).unwrap());

    let s = rule(lit("[[:digit:]]") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("7", &g).unwrap());
    assert!(!parse("x", &g).unwrap());

    // ranges and classes mix as alternatives
    let s = rule(plus(lit("[x-z[:digit:]]")) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("x9z", &g).unwrap());
    assert!(!parse("a", &g).unwrap());
}

#[test]
fn string_expression_multiple_ranges_merge() {
    let s = rule(plus(lit("[a-fc-kz]")) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("akz", &g).unwrap());
    assert!(!parse("m", &g).unwrap());
}

#[test]
fn bad_string_expressions_fail_at_rule_construction() {
    assert_eq!(rule(lit("[abc")).unwrap_err(), Error::BadStringExpression);
    assert_eq!(rule(lit("[[:bogus:]]")).unwrap_err(), Error::BadCharacterClass);
}

#[test]
fn character_classes() {
    let s = rule(plus(class(Ctype::ALPHA)) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("héllo", &g).unwrap());
    assert!(!parse("h3", &g).unwrap());

    let s = rule(gc(GcFlags::NUMBER) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("7", &g).unwrap());
    assert!(!parse("x", &g).unwrap());

    let s = rule(prop(Props::WHITE_SPACE) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse(" ", &g).unwrap());
    assert!(!parse("x", &g).unwrap());

    let s = rule(plus(script(Script::Greek)) + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("λμ", &g).unwrap());
    assert!(!parse("ab", &g).unwrap());
}

#[test]
fn eol_matches_all_line_endings_and_counts_lines() {
    let s = rule(lit("a") + eol() + lit("b") + eoi()).unwrap();
    let g = start(&s).unwrap();
    for input in ["a\nb", "a\r\nb", "a\rb"] {
        let mut p = Parser::new(&g);
        p.enqueue(input);
        assert!(p.parse().unwrap(), "input {:?}", input);
        assert_eq!(p.input_position().line, 2);
    }
    assert!(!parse("ab", &g).unwrap());
}

#[test]
fn space_matches_blanks_tabs_and_newlines() {
    let s = rule(star(space()) + lit("x") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("x", &g).unwrap());
    assert!(parse("  \t x", &g).unwrap());
    let mut p = Parser::new(&g);
    p.enqueue(" \n x");
    assert!(p.parse().unwrap());
    assert_eq!(p.input_position().line, 2);
}

#[test]
fn multiline_input_counts_lines() {
    let line = rule(star(!eol() + any()) + eol()).unwrap();
    let s = rule(plus(line.call()) + eoi()).unwrap();
    let g = start(&s).unwrap();
    let mut p = Parser::new(&g);
    p.enqueue(indoc! {"
        alpha
        beta
        gamma
    "});
    assert!(p.parse().unwrap());
    assert_eq!(p.input_position().line, 4);
    assert_eq!(p.input_position().column, 1);
}

#[test]
fn empty_grammar_is_rejected_at_parse_time() {
    let g = Grammar::default();
    assert_eq!(parse("x", &g), Err(Error::BadGrammar));
}

#[test]
fn unicode_input_advances_by_runes() {
    let s = rule(lit("héllo") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("héllo", &g).unwrap());
    assert!(!parse("hello", &g).unwrap());

    // '.' spans one full rune
    let s = rule(lit("h.llo") + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("héllo", &g).unwrap());
    assert!(parse("hxllo", &g).unwrap());
}

#[test]
fn grammars_can_be_called_from_other_grammars() {
    let word = rule(plus(class(Ctype::ALPHA))).unwrap();
    let inner = start(&word).unwrap();
    let s = rule(inner.call() + chr('!') + eoi()).unwrap();
    let g = start(&s).unwrap();
    assert!(parse("hey!", &g).unwrap());
    assert!(!parse("!", &g).unwrap());
}

#[test]
fn disassembly_renders_every_instruction() {
    let s = rule(plus(lit("ab") | chr_range('0', '9')) + eoi()).unwrap();
    let g = start(&s).unwrap();
    let mut out = Vec::new();
    g.disassemble(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("call"));
    assert!(text.contains("accept_final"));
    assert!(text.contains("choice"));
    assert!(!text.contains("???"));
}
