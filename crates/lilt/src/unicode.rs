//! Character classification consumed by the `match_class` instruction.
//!
//! This is the collaborator surface of a real Unicode character database,
//! reduced to what the VM queries: POSIX-style ctype bits, a coarse general
//! category, a few binary properties and a script guess. Classification is
//! derived from `std` char queries rather than UCD tables; non-ASCII
//! punctuation and the long tail of scripts classify as `Other`/`Unknown`.

use bitflags::bitflags;

bitflags! {
    /// POSIX-style character classes, usable as `[:name:]` in string
    /// expressions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctype: u16 {
        const ALPHA  = 1 << 0;
        const DIGIT  = 1 << 1;
        const XDIGIT = 1 << 2;
        const SPACE  = 1 << 3;
        const BLANK  = 1 << 4;
        const CNTRL  = 1 << 5;
        const PUNCT  = 1 << 6;
        const UPPER  = 1 << 7;
        const LOWER  = 1 << 8;
        const GRAPH  = 1 << 9;
        const PRINT  = 1 << 10;
        const WORD   = 1 << 11;
    }
}

bitflags! {
    /// Binary character properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Props: u32 {
        const WHITE_SPACE = 1 << 0;
        const ALPHABETIC  = 1 << 1;
        const UPPERCASE   = 1 << 2;
        const LOWERCASE   = 1 << 3;
        const NUMERIC     = 1 << 4;
        const ASCII       = 1 << 5;
    }
}

bitflags! {
    /// Coarse general categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcFlags: u32 {
        const LETTER      = 1 << 0;
        const NUMBER      = 1 << 1;
        const PUNCTUATION = 1 << 2;
        const SEPARATOR   = 1 << 3;
        const CONTROL     = 1 << 4;
        const OTHER       = 1 << 5;
    }
}

/// Script guess for a rune, by block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Script {
    Unknown = 0,
    Common = 1,
    Latin = 2,
    Greek = 3,
    Cyrillic = 4,
    Hebrew = 5,
    Arabic = 6,
    Han = 7,
    Hiragana = 8,
    Katakana = 9,
    Hangul = 10,
}

impl Script {
    pub(crate) fn from_raw(raw: u16) -> Script {
        match raw {
            1 => Script::Common,
            2 => Script::Latin,
            3 => Script::Greek,
            4 => Script::Cyrillic,
            5 => Script::Hebrew,
            6 => Script::Arabic,
            7 => Script::Han,
            8 => Script::Hiragana,
            9 => Script::Katakana,
            10 => Script::Hangul,
            _ => Script::Unknown,
        }
    }
}

/// Classification record for one rune.
#[derive(Debug, Clone, Copy)]
pub struct CharRecord {
    ctype: Ctype,
    props: Props,
    gc: GcFlags,
    script: Script,
}

impl CharRecord {
    /// True if the rune is in any of the given ctype classes.
    #[inline]
    pub fn is(&self, classes: Ctype) -> bool {
        self.ctype.intersects(classes)
    }

    #[inline]
    pub fn any_prop(&self, props: Props) -> bool {
        self.props.intersects(props)
    }

    #[inline]
    pub fn any_gc(&self, gc: GcFlags) -> bool {
        self.gc.intersects(gc)
    }

    #[inline]
    pub fn script(&self) -> Script {
        self.script
    }
}

/// Classify one rune.
pub fn query(c: char) -> CharRecord {
    let alpha = c.is_alphabetic();
    let digit = c.is_ascii_digit();
    let space = c.is_whitespace();
    let cntrl = c.is_control();
    let punct = c.is_ascii_punctuation();
    let graph = !space && !cntrl;

    let mut ctype = Ctype::empty();
    ctype.set(Ctype::ALPHA, alpha);
    ctype.set(Ctype::DIGIT, digit);
    ctype.set(Ctype::XDIGIT, c.is_ascii_hexdigit());
    ctype.set(Ctype::SPACE, space);
    ctype.set(Ctype::BLANK, c == ' ' || c == '\t');
    ctype.set(Ctype::CNTRL, cntrl);
    ctype.set(Ctype::PUNCT, punct);
    ctype.set(Ctype::UPPER, c.is_uppercase());
    ctype.set(Ctype::LOWER, c.is_lowercase());
    ctype.set(Ctype::GRAPH, graph);
    ctype.set(Ctype::PRINT, graph || c == ' ');
    ctype.set(Ctype::WORD, alpha || digit || c == '_');

    let mut props = Props::empty();
    props.set(Props::WHITE_SPACE, space);
    props.set(Props::ALPHABETIC, alpha);
    props.set(Props::UPPERCASE, c.is_uppercase());
    props.set(Props::LOWERCASE, c.is_lowercase());
    props.set(Props::NUMERIC, c.is_numeric());
    props.set(Props::ASCII, c.is_ascii());

    let gc = if cntrl {
        GcFlags::CONTROL
    } else if alpha {
        GcFlags::LETTER
    } else if c.is_numeric() {
        GcFlags::NUMBER
    } else if punct {
        GcFlags::PUNCTUATION
    } else if space {
        GcFlags::SEPARATOR
    } else {
        GcFlags::OTHER
    };

    CharRecord { ctype, props, gc, script: script_of(c) }
}

fn script_of(c: char) -> Script {
    match c as u32 {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Script::Latin,
        0x0370..=0x03FF | 0x1F00..=0x1FFF => Script::Greek,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x3040..=0x309F => Script::Hiragana,
        0x30A0..=0x30FF => Script::Katakana,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF => Script::Han,
        0xAC00..=0xD7AF | 0x1100..=0x11FF => Script::Hangul,
        _ => {
            if c.is_ascii() && !c.is_ascii_alphabetic() {
                Script::Common
            } else {
                Script::Unknown
            }
        }
    }
}

/// Parse a `[:name:]` class name into ctype bits.
pub fn stoctype(name: &str) -> Option<Ctype> {
    match name {
        "alpha" => Some(Ctype::ALPHA),
        "alnum" => Some(Ctype::ALPHA | Ctype::DIGIT),
        "blank" => Some(Ctype::BLANK),
        "cntrl" => Some(Ctype::CNTRL),
        "digit" => Some(Ctype::DIGIT),
        "graph" => Some(Ctype::GRAPH),
        "lower" => Some(Ctype::LOWER),
        "print" => Some(Ctype::PRINT),
        "punct" => Some(Ctype::PUNCT),
        "space" => Some(Ctype::SPACE),
        "upper" => Some(Ctype::UPPER),
        "word" => Some(Ctype::WORD),
        "xdigit" => Some(Ctype::XDIGIT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_classes() {
        assert!(query('a').is(Ctype::ALPHA | Ctype::LOWER));
        assert!(query('7').is(Ctype::DIGIT));
        assert!(query('f').is(Ctype::XDIGIT));
        assert!(!query('g').is(Ctype::XDIGIT));
        assert!(query(' ').is(Ctype::SPACE | Ctype::BLANK));
        assert!(query('_').is(Ctype::WORD));
        assert!(!query('_').is(Ctype::ALPHA));
    }

    #[test]
    fn general_categories() {
        assert!(query('x').any_gc(GcFlags::LETTER));
        assert!(query('3').any_gc(GcFlags::NUMBER));
        assert!(query(',').any_gc(GcFlags::PUNCTUATION));
        assert!(query('\n').any_gc(GcFlags::CONTROL));
    }

    #[test]
    fn scripts() {
        assert_eq!(query('a').script(), Script::Latin);
        assert_eq!(query('λ').script(), Script::Greek);
        assert_eq!(query('ж').script(), Script::Cyrillic);
        assert_eq!(query('本').script(), Script::Han);
        assert_eq!(Script::from_raw(Script::Greek as u16), Script::Greek);
    }

    #[test]
    fn class_names() {
        assert_eq!(stoctype("digit"), Some(Ctype::DIGIT));
        assert_eq!(stoctype("alnum"), Some(Ctype::ALPHA | Ctype::DIGIT));
        assert_eq!(stoctype("bogus"), None);
    }
}
