//! Validation of wire identifiers: nicks, usernames, channel names.

/// Characters permitted in a nick besides letters, digits, and '-'.
const NICK_SPECIALS: &str = "[]\\`_^{|}";

fn is_nick_start(c: char) -> bool {
    c.is_ascii_alphabetic() || NICK_SPECIALS.contains(c)
}

fn is_nick_rest(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || NICK_SPECIALS.contains(c)
}

/// Check a nick against RFC 2812 rules with a configurable length cap.
pub fn is_valid_nick(max_len: usize, nick: &str) -> bool {
    if nick.is_empty() || nick.len() > max_len {
        return false;
    }
    let mut chars = nick.chars();
    match chars.next() {
        Some(c) if is_nick_start(c) => {}
        _ => return false,
    }
    chars.all(is_nick_rest)
}

/// Check a username (the USER command's first parameter).
pub fn is_valid_user(max_len: usize, user: &str) -> bool {
    if user.is_empty() || user.len() > max_len {
        return false;
    }
    user.chars()
        .all(|c| c.is_ascii_graphic() && c != '@' && c != '!' && c != ':')
}

/// Check a channel name. Only '#' channels are supported.
pub fn is_valid_channel(name: &str) -> bool {
    if name.len() < 2 || name.len() > 50 || !name.starts_with('#') {
        return false;
    }
    name[1..]
        .chars()
        .all(|c| !matches!(c, ' ' | ',' | '\u{7}' | '\0' | '\r' | '\n' | ':'))
}

/// Check a realname (the USER command's trailing parameter). Spaces are
/// fine; control characters are not.
pub fn is_valid_realname(name: &str) -> bool {
    name.len() <= 160 && name.chars().all(|c| !c.is_control())
}
