// src/services/normalizer.rs

//! Record normalizer.
//!
//! Converts a [`RawTableGrid`] into uniform [`NormalizedRecord`]s driven by a
//! column specification:
//!
//! - header alignment by label, so page column order does not matter
//! - glyph decoding and footnote extraction into [`NoteAnnotation`]s
//! - stacked lines in repeatable columns fanned out into sub-records, with
//!   shorter stacks padded by nulls
//! - typed conversion to text, float, or date
//!
//! Anything that cannot be interpreted becomes a null plus a [`DecodeMiss`];
//! normalization itself never fails.

use crate::error::Result;
use crate::models::{
    ColumnSpec, ColumnType, DecodeMiss, LINE_BREAK, MissKind, NormalizedRecord, NoteAnnotation,
    NoteMarker, RawTableGrid, Value,
};
use crate::services::dates::DateParser;
use crate::services::glyphs;

/// Output of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub misses: Vec<DecodeMiss>,
}

impl Normalized {
    /// Every note attached to the records, in record order.
    pub fn notes(&self) -> Vec<NoteAnnotation> {
        self.records
            .iter()
            .flat_map(|r| r.notes.iter().cloned())
            .collect()
    }

    /// Split into records and their notes.
    pub fn into_parts(self) -> (Vec<NormalizedRecord>, Vec<NoteAnnotation>) {
        let notes = self.notes();
        (self.records, notes)
    }
}

/// A converted cell line.
struct Converted {
    value: Value,
    notes: Vec<NoteAnnotation>,
    /// Text bound for the column's note column
    qualifier: Option<String>,
}

/// Normalizes grids into typed records.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    dates: DateParser,
}

impl RecordNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dates: DateParser::new()?,
        })
    }

    /// The date rule used for date columns.
    pub fn dates(&self) -> &DateParser {
        &self.dates
    }

    /// Normalize a grid into records with exactly the columns of `columns`.
    pub fn normalize(&self, grid: &RawTableGrid, columns: &[ColumnSpec]) -> Normalized {
        let mut out = Normalized::default();
        let positions = align_columns(&grid.header, columns, &mut out.misses);

        for (row_index, row) in grid.rows.iter().enumerate() {
            // Per column: converted lines plus the cell's own notes and links
            let mut converted: Vec<(Vec<Converted>, Vec<NoteAnnotation>, &[String])> =
                Vec::with_capacity(columns.len());

            for (spec, position) in columns.iter().zip(&positions) {
                let Some(cell) = position.and_then(|i| row.get(i)) else {
                    converted.push((Vec::new(), Vec::new(), Default::default()));
                    continue;
                };

                let lines: Vec<String> = if spec.repeatable {
                    stacked_lines(&cell.text)
                } else {
                    vec![cell.text.replace(LINE_BREAK, " ")]
                };
                let values = lines
                    .iter()
                    .map(|line| self.convert(line, spec, row_index, &mut out.misses))
                    .collect();
                let cell_notes = cell
                    .superscripts
                    .iter()
                    .map(|s| NoteAnnotation::new(&spec.name, NoteMarker::Superscript, s))
                    .collect();
                converted.push((values, cell_notes, cell.links.as_slice()));
            }

            let fan_out = columns
                .iter()
                .zip(&converted)
                .filter(|(spec, _)| spec.repeatable)
                .map(|(_, (values, _, _))| values.len())
                .max()
                .unwrap_or(1)
                .max(1);

            for sub in 0..fan_out {
                let mut record = NormalizedRecord::default();
                for (spec, (values, cell_notes, links)) in columns.iter().zip(&converted) {
                    let (line, link) = if spec.repeatable {
                        (values.get(sub), links.get(sub).or(links.first()))
                    } else {
                        (values.first(), links.first())
                    };
                    if let Some(link) = link {
                        record.links.insert(spec.name.clone(), link.clone());
                    }
                    match line {
                        Some(c) => {
                            record.set(spec.name.clone(), c.value.clone());
                            record.notes.extend(c.notes.iter().cloned());
                        }
                        None => record.set(spec.name.clone(), Value::Null),
                    }
                    if let Some(note_column) = &spec.note_column {
                        let qualifier = line
                            .and_then(|c| c.qualifier.clone())
                            .map_or(Value::Null, Value::Text);
                        record.set(note_column.clone(), qualifier);
                    }
                    record.notes.extend(cell_notes.iter().cloned());
                }
                out.records.push(record);
            }
        }

        if !out.misses.is_empty() {
            log::warn!(
                "{} decode misses while normalizing {} rows",
                out.misses.len(),
                grid.rows.len()
            );
        }
        out
    }

    fn convert(
        &self,
        line: &str,
        spec: &ColumnSpec,
        row: usize,
        misses: &mut Vec<DecodeMiss>,
    ) -> Converted {
        let decoded = glyphs::decode(line);
        if !decoded.unknown.is_empty() {
            record_miss(misses, MissKind::Glyph, spec, row, line);
        }

        let mut notes: Vec<NoteAnnotation> = decoded
            .notes
            .iter()
            .map(|(marker, text)| NoteAnnotation::new(&spec.name, *marker, text))
            .collect();
        let mut text = decoded.text;
        let mut qualifier = None;

        if text.is_empty() {
            return Converted {
                value: Value::Null,
                notes,
                qualifier,
            };
        }

        let value = match spec.kind {
            ColumnType::Text => {
                if spec.note_column.is_some() {
                    let (value, note) = glyphs::split_trailing_note(&text);
                    qualifier = note;
                    text = value;
                } else if spec.notes {
                    let (value, note) = glyphs::split_bracket_note(&text);
                    if let Some(note) = note {
                        notes.push(NoteAnnotation::new(&spec.name, NoteMarker::Bracket, note));
                    }
                    text = value;
                }
                Value::Text(text)
            }
            ColumnType::Float => {
                if let Some(stripped) = text.strip_suffix('?') {
                    notes.push(NoteAnnotation::new(
                        &spec.name,
                        NoteMarker::Approximate,
                        "Approximate",
                    ));
                    text = stripped.trim_end().to_string();
                }
                match parse_number(&text) {
                    Some(f) => Value::Float(f),
                    None => {
                        record_miss(misses, MissKind::Number, spec, row, line);
                        Value::Null
                    }
                }
            }
            ColumnType::Date => match self.dates.parse(line) {
                Some(d) => Value::Date(d),
                None => {
                    record_miss(misses, MissKind::Date, spec, row, line);
                    Value::Null
                }
            },
        };

        Converted {
            value,
            notes,
            qualifier,
        }
    }
}

/// Stacked lines of a repeatable cell.
///
/// Blank lines at either end are layout and are dropped; interior blanks stay
/// so later lines keep their position.
fn stacked_lines(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.split(LINE_BREAK).collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].iter().map(|l| l.to_string()).collect()
}

fn record_miss(
    misses: &mut Vec<DecodeMiss>,
    kind: MissKind,
    spec: &ColumnSpec,
    row: usize,
    text: &str,
) {
    let miss = DecodeMiss {
        kind,
        column: spec.name.clone(),
        row,
        text: text.to_string(),
    };
    log::debug!("Decode miss: {}", miss);
    misses.push(miss);
}

/// Canonical form of a header label for matching.
fn label_key(label: &str) -> String {
    glyphs::decode(label)
        .text
        .trim_end_matches([':', '.'])
        .to_lowercase()
}

/// Map each column spec to a grid column, taking duplicated headers in order.
fn align_columns(
    header: &[String],
    columns: &[ColumnSpec],
    misses: &mut Vec<DecodeMiss>,
) -> Vec<Option<usize>> {
    let keys: Vec<String> = header.iter().map(|h| label_key(h)).collect();
    let mut used = vec![false; header.len()];

    columns
        .iter()
        .map(|spec| {
            let wanted = label_key(spec.header_label());
            let position = keys
                .iter()
                .enumerate()
                .position(|(i, key)| !used[i] && *key == wanted);
            match position {
                Some(i) => {
                    used[i] = true;
                    Some(i)
                }
                None => {
                    log::warn!("Column '{}' not found in table header", spec.name);
                    misses.push(DecodeMiss {
                        kind: MissKind::Column,
                        column: spec.name.clone(),
                        row: 0,
                        text: spec.header_label().to_string(),
                    });
                    None
                }
            }
        })
        .collect()
}

/// Parse `11.5`, `11 1/2`, `1/2`, or `-3 1/4` into a finite float.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    let value = match parts.as_slice() {
        [single] if single.contains('/') => parse_fraction(single)?,
        [single] => single.parse::<f64>().ok()?,
        [whole, fraction] => {
            let whole: f64 = whole.parse().ok()?;
            if whole.fract() != 0.0 {
                return None;
            }
            let fraction = parse_fraction(fraction)?;
            if whole.is_sign_negative() {
                whole - fraction
            } else {
                whole + fraction
            }
        }
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn parse_fraction(text: &str) -> Option<f64> {
    let (num, den) = text.split_once('/')?;
    let num: u32 = num.parse().ok()?;
    let den: u32 = den.parse().ok()?;
    (den != 0).then(|| f64::from(num) / f64::from(den))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::services::tokenizer::tokenize_html;

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::new().unwrap()
    }

    #[test]
    fn rowspan_cell_is_shared_by_following_records() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Name</th><th>Former</th></tr>
                <tr><td>One</td><td>Plain</td></tr>
                <tr><td>Two</td><td rowspan="2">Formerly X</td></tr>
                <tr><td>Three</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![
            ColumnSpec::text("Name").repeatable(),
            ColumnSpec::text("Former").repeatable(),
        ];
        let (records, _) = normalizer().normalize(&grid, &columns).into_parts();

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].text("Former"), Some("Formerly X"));
        assert_eq!(records[2].text("Former"), Some("Formerly X"));
        assert_eq!(records[2].text("Name"), Some("Three"));
    }

    #[test]
    fn vulgar_fraction_becomes_float() {
        let grid =
            tokenize_html("<table><tr><th>Length</th></tr><tr><td>11½</td></tr></table>").unwrap();
        let out = normalizer().normalize(&grid, &[ColumnSpec::float("Length")]);
        assert_eq!(out.records[0].get("Length"), Some(&Value::Float(11.5)));
        assert!(out.misses.is_empty());
    }

    #[test]
    fn date_cells_parse_or_become_null() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Opened</th></tr>
                <tr><td>9 January 2021</td></tr>
                <tr><td>not available</td></tr>
            </table>"#,
        )
        .unwrap();
        let out = normalizer().normalize(&grid, &[ColumnSpec::date("Opened")]);

        assert_eq!(
            out.records[0].get("Opened"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2021, 1, 9).unwrap()))
        );
        assert_eq!(out.records[1].get("Opened"), Some(&Value::Null));
        assert_eq!(out.misses.len(), 1);
        assert_eq!(out.misses[0].kind, MissKind::Date);
        assert_eq!(out.misses[0].row, 1);
    }

    #[test]
    fn stacked_operators_fan_out_with_null_padding() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Station</th><th>ELR</th><th>Operator</th></tr>
                <tr><td>Abbey Wood</td><td>NKL<br>XRS</td><td>Elizabeth line<br>Southeastern<br>Network SouthEast</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![
            ColumnSpec::text("Station"),
            ColumnSpec::text("ELR").repeatable(),
            ColumnSpec::text("Operator").repeatable(),
        ];
        let out = normalizer().normalize(&grid, &columns);

        assert_eq!(out.records.len(), 3);
        assert!(out.records.iter().all(|r| r.text("Station") == Some("Abbey Wood")));
        assert_eq!(out.records[1].text("ELR"), Some("XRS"));
        assert_eq!(out.records[2].get("ELR"), Some(&Value::Null));
        assert_eq!(out.records[2].text("Operator"), Some("Network SouthEast"));
    }

    #[test]
    fn trailing_line_break_adds_no_sub_record() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Station</th><th>Operator</th></tr>
                <tr><td>Abbey Wood</td><td>Southeastern<br></td></tr>
                <tr><td>Acton Main Line</td><td><br>Elizabeth line</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![
            ColumnSpec::text("Station"),
            ColumnSpec::text("Operator").repeatable(),
        ];
        let out = normalizer().normalize(&grid, &columns);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].text("Operator"), Some("Southeastern"));
        assert_eq!(out.records[1].text("Operator"), Some("Elizabeth line"));
    }

    #[test]
    fn interior_blank_line_stays_positional() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>ELR</th><th>Mileage</th></tr>
                <tr><td>NKL<br>XRS</td><td><br>12.34</td></tr>
                <tr><td>AAA<br><br>CCC</td><td>1.00<br>2.00<br>3.00</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![
            ColumnSpec::text("ELR").repeatable(),
            ColumnSpec::text("Mileage").repeatable(),
        ];
        let out = normalizer().normalize(&grid, &columns);

        assert_eq!(out.records.len(), 5);
        assert_eq!(out.records[0].text("Mileage"), Some("12.34"));
        assert_eq!(out.records[1].get("Mileage"), Some(&Value::Null));
        assert_eq!(out.records[3].get("ELR"), Some(&Value::Null));
        assert_eq!(out.records[3].text("Mileage"), Some("2.00"));
        assert_eq!(out.records[4].text("ELR"), Some("CCC"));
    }

    #[test]
    fn route_qualifier_moves_to_note_column() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Line name</th><th>Route</th></tr>
                <tr><td>Berks and Hants</td><td>Reading - Taunton (via Westbury)</td></tr>
                <tr><td>Chiltern Main Line</td><td>Marylebone - Birmingham</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![
            ColumnSpec::text("Line name"),
            ColumnSpec::text("Route").with_note_column("Route_note"),
        ];
        let out = normalizer().normalize(&grid, &columns);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].text("Route"), Some("Reading - Taunton"));
        assert_eq!(out.records[0].text("Route_note"), Some("via Westbury"));
        assert_eq!(out.records[1].get("Route_note"), Some(&Value::Null));
        assert_eq!(out.records[1].values.len(), 3);
    }

    #[test]
    fn non_repeatable_line_breaks_become_spaces() {
        let grid = tokenize_html(
            "<table><tr><th>Line name</th></tr><tr><td>Ashchurch<br>and Evesham</td></tr></table>",
        )
        .unwrap();
        let out = normalizer().normalize(&grid, &[ColumnSpec::text("Line name")]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].text("Line name"), Some("Ashchurch and Evesham"));
    }

    #[test]
    fn notes_are_detached_from_values() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Location</th><th>STANOX</th></tr>
                <tr><td>Heathrow Junction <em>temporary</em><sup>2</sup></td><td>87654*</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![ColumnSpec::text("Location"), ColumnSpec::text("STANOX")];
        let out = normalizer().normalize(&grid, &columns);
        let record = &out.records[0];

        assert_eq!(record.text("Location"), Some("Heathrow Junction"));
        assert_eq!(record.text("STANOX"), Some("87654"));
        let markers: Vec<NoteMarker> = record.notes.iter().map(|n| n.marker).collect();
        assert!(markers.contains(&NoteMarker::Bracket));
        assert!(markers.contains(&NoteMarker::Superscript));
        assert!(markers.contains(&NoteMarker::Asterisk));
        assert_eq!(out.notes().len(), 3);
    }

    #[test]
    fn columns_align_by_header_not_position() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>Degrees Latitude</th><th>Station</th><th>Degrees Longitude</th></tr>
                <tr><td>51.491</td><td>Abbey Wood</td><td>0.121</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![
            ColumnSpec::text("Station"),
            ColumnSpec::float("Longitude").from_header("Degrees Longitude"),
            ColumnSpec::float("Latitude").from_header("degrees latitude"),
            ColumnSpec::text("Owner"),
        ];
        let out = normalizer().normalize(&grid, &columns);
        let record = &out.records[0];

        assert_eq!(record.get("Longitude"), Some(&Value::Float(0.121)));
        assert_eq!(record.get("Latitude"), Some(&Value::Float(51.491)));
        assert_eq!(record.get("Owner"), Some(&Value::Null));
        assert_eq!(record.values.len(), 4);
        assert_eq!(out.misses.len(), 1);
        assert_eq!(out.misses[0].kind, MissKind::Column);
    }

    #[test]
    fn cell_links_are_kept_per_column() {
        let grid = tokenize_html(
            r#"<table>
                <tr><th>ELR</th><th>Line name</th></tr>
                <tr><td><a href="_mileages/a/aav.shtm">AAV</a></td><td>Ashchurch and Evesham</td></tr>
            </table>"#,
        )
        .unwrap();
        let columns = vec![ColumnSpec::text("ELR"), ColumnSpec::text("Line name")];
        let out = normalizer().normalize(&grid, &columns);
        assert_eq!(
            out.records[0].links.get("ELR").map(String::as_str),
            Some("_mileages/a/aav.shtm")
        );
        assert!(!out.records[0].links.contains_key("Line name"));
    }

    #[test]
    fn unknown_glyph_is_kept_and_reported() {
        let grid =
            tokenize_html("<table><tr><th>Name</th></tr><tr><td>Odd ■ name</td></tr></table>")
                .unwrap();
        let out = normalizer().normalize(&grid, &[ColumnSpec::text("Name")]);
        assert_eq!(out.records[0].text("Name"), Some("Odd ■ name"));
        assert_eq!(out.misses[0].kind, MissKind::Glyph);
    }

    #[test]
    fn approximate_float_gets_a_note() {
        let grid =
            tokenize_html("<table><tr><th>Miles</th></tr><tr><td>12.5?</td></tr></table>").unwrap();
        let out = normalizer().normalize(&grid, &[ColumnSpec::float("Miles")]);
        assert_eq!(out.records[0].get("Miles"), Some(&Value::Float(12.5)));
        assert_eq!(out.records[0].notes[0].marker, NoteMarker::Approximate);
    }

    #[test]
    fn parse_number_forms() {
        assert_eq!(parse_number("11 1/2"), Some(11.5));
        assert_eq!(parse_number("3/4"), Some(0.75));
        assert_eq!(parse_number("-2 1/4"), Some(-2.25));
        assert_eq!(parse_number("1,760"), Some(1760.0));
        assert_eq!(parse_number("1.5 1/2"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("1/0"), None);
        assert_eq!(parse_number("twelve"), None);
    }
}
