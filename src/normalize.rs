//! Emoji normalization: fold presentation variants onto one canonical id.

/// Canonical emoji identifier (variant selectors removed).
pub type EmojiId = String;

/// VARIATION SELECTOR-16, requests emoji presentation.
pub const VS16: char = '\u{FE0F}';
/// COMBINING ENCLOSING KEYCAP.
pub const KEYCAP: char = '\u{20E3}';

/// Map a raw emoji grapheme cluster to its canonical id.
///
/// Only two shapes are rewritten:
/// - `base VS16` becomes `base`
/// - `base VS16 KEYCAP` becomes `base KEYCAP`
///
/// Everything else (ZWJ sequences, skin tones, flags, already-canonical ids) is
/// returned unchanged, which makes the function idempotent.
pub fn normalize(raw: &str) -> EmojiId {
    let mut chars = raw.chars();
    match (chars.next(), chars.next(), chars.next(), chars.next()) {
        (Some(base), Some(VS16), None, _) => base.to_string(),
        (Some(base), Some(VS16), Some(KEYCAP), None) => {
            let mut id = String::with_capacity(base.len_utf8() + KEYCAP.len_utf8());
            id.push(base);
            id.push(KEYCAP);
            id
        }
        _ => raw.to_string(),
    }
}
