use std::collections::HashMap;

use super::cursor::Cursor;

/// Chars that already mean something after a jump key (counts, `%`, motions)
const RESERVED: &str = "0123456789%.,btecm";

/// Single-char bookmarks into the current buffer
#[derive(Debug, Clone, Default)]
pub struct JumpMarks {
    marks: HashMap<char, Cursor>,
}

impl JumpMarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `ch` can name a mark
    pub fn accepts(ch: char) -> bool {
        !RESERVED.contains(ch) && !ch.is_whitespace() && !ch.is_control() && !is_symbol(ch)
    }

    /// Bind `ch` to `at`, replacing any earlier binding. Returns false for
    /// chars that cannot name a mark.
    pub fn register(&mut self, ch: char, at: Cursor) -> bool {
        if !Self::accepts(ch) {
            return false;
        }
        self.marks.insert(ch, at);
        true
    }

    pub fn get(&self, ch: char) -> Option<Cursor> {
        self.marks.get(&ch).copied()
    }

    pub fn contains(&self, ch: char) -> bool {
        self.marks.contains_key(&ch)
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// Math, currency, modifier and other symbols. ASCII has exactly these;
/// beyond ASCII anything that is not a letter, digit or punctuation counts.
fn is_symbol(ch: char) -> bool {
    if ch.is_ascii() {
        return matches!(ch, '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~');
    }
    !ch.is_alphanumeric() && !is_unicode_punctuation(ch)
}

fn is_unicode_punctuation(ch: char) -> bool {
    matches!(
        ch,
        '\u{2010}'..='\u{2027}'
            | '\u{2030}'..='\u{205E}'
            | '\u{3001}'..='\u{3003}'
            | '¡'
            | '§'
            | '«'
            | '¶'
            | '·'
            | '»'
            | '¿'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut marks = JumpMarks::new();
        assert!(marks.register('a', Cursor::new(4, 2)));
        assert!(marks.contains('a'));
        assert_eq!(marks.get('a'), Some(Cursor::new(4, 2)));

        assert!(marks.register('a', Cursor::new(9, 0)));
        assert_eq!(marks.get('a'), Some(Cursor::new(9, 0)));
        assert_eq!(marks.len(), 1);
    }

    #[test]
    fn test_reserved_and_symbol_chars_are_refused() {
        let mut marks = JumpMarks::new();
        for ch in "0123456789%.,btecm".chars() {
            assert!(!marks.register(ch, Cursor::new(0, 0)), "{:?}", ch);
        }
        for ch in ['+', '$', '~', '€', '→', ' ', '\t'] {
            assert!(!marks.register(ch, Cursor::new(0, 0)), "{:?}", ch);
        }
        assert!(marks.is_empty());

        for ch in ['x', 'Z', 'ø', '!', '?'] {
            assert!(marks.register(ch, Cursor::new(0, 0)), "{:?}", ch);
        }
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut marks = JumpMarks::new();
        marks.register('x', Cursor::new(1, 1));
        marks.register('y', Cursor::new(2, 2));
        marks.clear();
        assert!(!marks.contains('x'));
        assert_eq!(marks.get('y'), None);
    }
}
