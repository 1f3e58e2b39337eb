//! RFC 1459 case folding.
//!
//! The characters `[]\~` are the uppercase forms of `{}|^`, so nicks
//! and channel names must be folded with this mapping rather than plain
//! ASCII lowercasing before being used as table keys.

/// Fold a nick or channel name to its canonical (lowercase) form.
pub fn to_canonical(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            other => other,
        })
        .collect()
}
