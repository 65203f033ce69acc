// src/services/glyphs.rs

//! Fixed glyph-to-meaning table.
//!
//! Cell text on the source site mixes vulgar fractions, typographic spaces and
//! dashes, and footnote markers into values. [`decode`] turns a raw cell line
//! into clean text plus any detached notes; characters outside the table that
//! are not letters, digits, or ordinary punctuation are passed through and
//! reported so the caller can record a decode miss.

use crate::models::NoteMarker;

/// Meaning of a special glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Glyph {
    /// Vulgar fraction: numeric value and ASCII form
    Fraction(f64, &'static str),
    /// Any kind of space
    Space,
    /// Replaced by plain text
    Text(&'static str),
    /// Footnote marker, removed from the value and kept as a note
    Note(NoteMarker, &'static str),
    /// Everything after it is a note on the value before it
    Separator,
}

/// Look up a character in the glyph table.
pub fn lookup(c: char) -> Option<Glyph> {
    let glyph = match c {
        '½' => Glyph::Fraction(0.5, "1/2"),
        '¼' => Glyph::Fraction(0.25, "1/4"),
        '¾' => Glyph::Fraction(0.75, "3/4"),
        '⅓' => Glyph::Fraction(1.0 / 3.0, "1/3"),
        '⅔' => Glyph::Fraction(2.0 / 3.0, "2/3"),
        '⅛' => Glyph::Fraction(0.125, "1/8"),
        '⅜' => Glyph::Fraction(0.375, "3/8"),
        '⅝' => Glyph::Fraction(0.625, "5/8"),
        '⅞' => Glyph::Fraction(0.875, "7/8"),
        '\u{a0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' | '\u{200a}' | '\u{202f}' => Glyph::Space,
        '\u{200b}' | '\u{feff}' | '\u{ad}' => Glyph::Text(""),
        '–' | '—' | '‐' | '‑' | '−' => Glyph::Text("-"),
        '†' => Glyph::Note(NoteMarker::Dagger, "See notes"),
        '‡' => Glyph::Note(NoteMarker::DoubleDagger, "See notes"),
        '§' => Glyph::Note(NoteMarker::Section, "See notes"),
        '*' => Glyph::Note(NoteMarker::Asterisk, "Marked with an asterisk"),
        '≈' => Glyph::Note(NoteMarker::Approximate, "Approximate"),
        '✖' => Glyph::Separator,
        _ => return None,
    };
    Some(glyph)
}

/// Punctuation and symbols that are ordinary text.
fn is_plain(c: char) -> bool {
    c.is_ascii()
        || c.is_alphanumeric()
        || c.is_whitespace()
        || matches!(
            c,
            '‘' | '’' | '“' | '”' | '…' | '·' | '£' | '°' | '′' | '″' | '×' | '→' | '€'
        )
}

/// A decoded cell line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub notes: Vec<(NoteMarker, String)>,
    /// Characters not covered by the table
    pub unknown: Vec<char>,
    /// Sum of fraction glyphs met
    pub fraction: Option<f64>,
}

impl Decoded {
    fn add_note(&mut self, marker: NoteMarker, text: impl Into<String>) {
        let text = text.into();
        if !self.notes.iter().any(|(m, t)| *m == marker && *t == text) {
            self.notes.push((marker, text));
        }
    }
}

/// Decode one line of cell text.
pub fn decode(raw: &str) -> Decoded {
    let mut decoded = Decoded::default();
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match lookup(c) {
            Some(Glyph::Fraction(value, ascii)) => {
                if text.ends_with(|p: char| p.is_ascii_digit()) {
                    text.push(' ');
                }
                text.push_str(ascii);
                *decoded.fraction.get_or_insert(0.0) += value;
            }
            Some(Glyph::Space) => text.push(' '),
            Some(Glyph::Text(s)) => text.push_str(s),
            Some(Glyph::Note(marker, meaning)) => decoded.add_note(marker, meaning),
            Some(Glyph::Separator) => {
                let rest: String = chars.by_ref().collect();
                let rest = decode(&rest);
                let note = rest.text.trim();
                if !note.is_empty() {
                    decoded.add_note(NoteMarker::Cross, note);
                }
                decoded.unknown.extend(rest.unknown);
                break;
            }
            None => {
                if !is_plain(c) && !decoded.unknown.contains(&c) {
                    decoded.unknown.push(c);
                }
                text.push(c);
            }
        }
    }

    decoded.text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    decoded
}

/// Split a trailing `[...]` group off a value.
///
/// Returns the value without the group and the bracketed text. A value that
/// is entirely bracketed is left alone.
pub fn split_bracket_note(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim_end();
    if !trimmed.ends_with(']') {
        return (text.to_string(), None);
    }
    let Some(open) = trimmed.rfind('[') else {
        return (text.to_string(), None);
    };
    let value = trimmed[..open].trim_end();
    if value.is_empty() {
        return (text.to_string(), None);
    }
    let note = trimmed[open + 1..trimmed.len() - 1].trim();
    if note.is_empty() {
        return (value.to_string(), None);
    }
    (value.to_string(), Some(note.to_string()))
}

/// Split a trailing qualifier off a route-like value.
///
/// Handles `, including ...` clauses and a trailing `[...]` or `(...)` group.
/// A parenthesised group after ` - (` is part of the value.
pub fn split_trailing_note(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    if let Some((value, rest)) = trimmed.split_once(", including ") {
        let note = format!("including {}", rest.trim());
        return (value.trim_end().to_string(), Some(note));
    }

    let open = match trimmed.chars().last() {
        Some(']') => '[',
        Some(')') if !trimmed.contains(" - (") => '(',
        _ => return (trimmed.to_string(), None),
    };
    let Some(start) = trimmed.rfind(open) else {
        return (trimmed.to_string(), None);
    };
    let value = trimmed[..start].trim_end();
    if value.is_empty() {
        return (trimmed.to_string(), None);
    }
    let note = trimmed[start + 1..trimmed.len() - 1]
        .trim_matches(|c: char| c.is_whitespace() || c == '\'');
    if note.is_empty() {
        return (value.to_string(), None);
    }
    (value.to_string(), Some(note.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_become_ascii_after_digits() {
        let d = decode("11½");
        assert_eq!(d.text, "11 1/2");
        assert_eq!(d.fraction, Some(0.5));
        assert!(d.unknown.is_empty());

        assert_eq!(decode("¾ mile").text, "3/4 mile");
    }

    #[test]
    fn spaces_and_dashes_are_normalized() {
        let d = decode("0.00\u{a0}–\u{2009}18.29");
        assert_eq!(d.text, "0.00 - 18.29");
    }

    #[test]
    fn footnote_markers_become_notes() {
        let d = decode("87654*");
        assert_eq!(d.text, "87654");
        assert_eq!(
            d.notes,
            vec![(NoteMarker::Asterisk, "Marked with an asterisk".to_string())]
        );

        let d = decode("≈ 12.34†");
        assert_eq!(d.text, "12.34");
        assert_eq!(d.notes.len(), 2);
    }

    #[test]
    fn cross_separates_code_and_note() {
        let d = decode("ABC ✖ Closed 1965");
        assert_eq!(d.text, "ABC");
        assert_eq!(d.notes, vec![(NoteMarker::Cross, "Closed 1965".to_string())]);
    }

    #[test]
    fn unknown_glyphs_pass_through() {
        let d = decode("Line ■ One");
        assert_eq!(d.text, "Line ■ One");
        assert_eq!(d.unknown, vec!['■']);
    }

    #[test]
    fn accented_letters_and_quotes_are_plain() {
        let d = decode("Llanfair’s Crèche");
        assert!(d.unknown.is_empty());
    }

    #[test]
    fn bracket_note_is_split_off() {
        assert_eq!(
            split_bracket_note("Heathrow Junction [temporary]"),
            ("Heathrow Junction".to_string(), Some("temporary".to_string()))
        );
        assert_eq!(
            split_bracket_note("[closed]"),
            ("[closed]".to_string(), None)
        );
        assert_eq!(split_bracket_note("Plain"), ("Plain".to_string(), None));
    }

    #[test]
    fn trailing_qualifier_is_split_off() {
        assert_eq!(
            split_trailing_note("Bristol - Exeter (via Weston)"),
            ("Bristol - Exeter".to_string(), Some("via Weston".to_string()))
        );
        assert_eq!(
            split_trailing_note("Euston - Glasgow [West Coast]"),
            ("Euston - Glasgow".to_string(), Some("West Coast".to_string()))
        );
        assert_eq!(
            split_trailing_note("King's Cross - Moorgate, including Moorgate - Farringdon"),
            (
                "King's Cross - Moorgate".to_string(),
                Some("including Moorgate - Farringdon".to_string())
            )
        );
        assert_eq!(
            split_trailing_note("Paddington - (Reading)"),
            ("Paddington - (Reading)".to_string(), None)
        );
        assert_eq!(split_trailing_note("Plain"), ("Plain".to_string(), None));
    }
}
