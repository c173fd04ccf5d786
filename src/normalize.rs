//! Canonical form used for win-condition comparison.
//!
//! The output is only ever compared for equality. It is never shown to the
//! player and never stored.

const FULLWIDTH_DIGITS: [char; 10] = ['０', '１', '２', '３', '４', '５', '６', '７', '８', '９'];

// ァ..ン maps onto ぁ..ん with a fixed shift.
const KATAKANA_START: char = '\u{30A1}';
const KATAKANA_END: char = '\u{30F3}';
const KATAKANA_TO_HIRAGANA: u32 = 0x60;

const HIRAGANA_START: char = '\u{3041}';
const HIRAGANA_END: char = '\u{3093}';

/// Folds `text` into the comparison alphabet: lowercase ASCII letters, ASCII
/// digits, hiragana and `-`.
///
/// Steps run in order: lowercase, full-width digits to ASCII, katakana to
/// hiragana, whitespace removal (including U+3000), then removal of anything
/// outside the alphabet.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(fold_digit)
        .map(fold_katakana)
        .filter(|c| !c.is_whitespace())
        .filter(|&c| is_retained(c))
        .collect()
}

/// True when `guess` and `secret` share the same canonical form.
pub fn matches_secret(guess: &str, secret: &str) -> bool {
    normalize(guess) == normalize(secret)
}

fn fold_digit(c: char) -> char {
    FULLWIDTH_DIGITS
        .iter()
        .position(|&d| d == c)
        .map(|idx| char::from(b'0' + idx as u8))
        .unwrap_or(c)
}

fn fold_katakana(c: char) -> char {
    if (KATAKANA_START..=KATAKANA_END).contains(&c) {
        char::from_u32(c as u32 - KATAKANA_TO_HIRAGANA).unwrap_or(c)
    } else {
        c
    }
}

fn is_retained(c: char) -> bool {
    (HIRAGANA_START..=HIRAGANA_END).contains(&c)
        || c.is_ascii_lowercase()
        || c.is_ascii_digit()
        || c == '-'
}
