//! Slug normalization.
//!
//! [`slugify`] is a pure function: the same input always yields the same
//! slug. Both the slug matcher and the duplicate counter call it, so they
//! always agree on the key they look up.
//!
//! Rules, applied per character after lowercasing:
//! - Latin-1 accented letters fold to their ASCII base (`é` → `e`, `ß` → `ss`).
//! - Other alphanumerics (any script) are kept.
//! - Whitespace, `-`, `_`, `.`, `/` and `+` act as word separators.
//! - Remaining punctuation is dropped.
//!
//! Runs of separators collapse into a single `-`, with none at either end.

/// Convert a title or filename stem into slug form.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        if let Some(folded) = fold_latin1(ch) {
            push_word(&mut out, folded, &mut pending_sep);
        } else if ch.is_alphanumeric() {
            let mut buf = [0u8; 4];
            push_word(&mut out, ch.encode_utf8(&mut buf), &mut pending_sep);
        } else if ch.is_whitespace() || matches!(ch, '-' | '_' | '.' | '/' | '+') {
            pending_sep = true;
        }
    }

    out
}

fn push_word(out: &mut String, s: &str, pending_sep: &mut bool) {
    if *pending_sep && !out.is_empty() {
        out.push('-');
    }
    *pending_sep = false;
    out.push_str(s);
}

fn fold_latin1(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ð' => "d",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'þ' => "th",
        'ß' => "ss",
        'œ' => "oe",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_title() {
        assert_eq!(slugify("Chapter 1: The Beginning"), "chapter-1-the-beginning");
    }

    #[test]
    fn separators_collapse_and_trim() {
        assert_eq!(slugify("  --Hello__World.. "), "hello-world");
    }

    #[test]
    fn punctuation_is_dropped_not_separated() {
        assert_eq!(slugify("Don't Panic!"), "dont-panic");
    }

    #[test]
    fn accents_fold() {
        assert_eq!(slugify("Crème Brûlée"), "creme-brulee");
        assert_eq!(slugify("Straße"), "strasse");
    }

    #[test]
    fn non_latin_scripts_are_kept() {
        assert_eq!(slugify("第一章 开始"), "第一章-开始");
    }

    #[test]
    fn idempotent_on_slugs() {
        for s in ["chapter-1", "a-b-c", "第一章-开始", "x"] {
            assert_eq!(slugify(s), s);
            assert_eq!(slugify(&slugify(s)), slugify(s));
        }
    }

    #[test]
    fn empty_and_symbol_only() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }
}
