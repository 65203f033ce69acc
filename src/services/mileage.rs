// src/services/mileage.rs

//! Mileage file parser.
//!
//! A mileage file page lists the nodes of one ELR in a `<pre>` block, one per
//! line: a `miles.chains` distance, a tab, and the node text. Lines without a
//! distance are measure headings (e.g. "Current measure"), free-text notes, or
//! nodes whose distance is unknown.

use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{
    ConnectionMileages, Measure, MileChain, MileageEntry, MileageFile, NodeConnection,
    ViaConnection,
};
use crate::services::dates::DateParser;
use crate::services::page::Page;
use crate::utils::normalize_whitespace;

const NOT_FOUND_HEADINGS: [&str; 2] = ["\"404\" error: page not found", "404 error: page not found"];
const MEASURE_KINDS: [&str; 10] = [
    "Current",
    "Later",
    "Earlier",
    "One",
    "Original",
    "Former",
    "Alternative",
    "Usual",
    "New",
    "Old",
];
const MEASURE_NOUNS: [&str; 3] = ["measure", "route", "diversion"];
/// Heading text longer than this is a note rather than a measure name
const MAX_HEADING_LEN: usize = 25;

/// One classified line of the listing.
#[derive(Debug, PartialEq)]
enum Line {
    Entry { mileage: String, node: String },
    Heading(String),
    Note(String),
}

/// Parses mileage file pages.
#[derive(Debug, Clone)]
pub struct MileageParser {
    measure_word: Regex,
    elr_node: Regex,
    elr_pair: Regex,
    leading_number: Regex,
}

impl MileageParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            measure_word: Regex::new(r"\b[Mm]easure\b")?,
            elr_node: Regex::new(r"^([A-Z]{3}\d?)(?:\s+\(([^)]*)\))?(?:\s+\[.*\])?$")?,
            elr_pair: Regex::new(r"^[A-Z]{3}\d?(?: \(\d+\.\d+\))? ?/ ?[A-Z]{3}\d?")?,
            leading_number: Regex::new(r"\d+\.\d+")?,
        })
    }

    /// Parse a fetched mileage file page.
    ///
    /// A "404" heading on the page means the ELR has no mileage file and is
    /// reported as [`AppError::NotFound`].
    pub fn parse_page(
        &self,
        elr: &str,
        url: &str,
        html: &str,
        dates: &DateParser,
    ) -> Result<MileageFile> {
        let page = Page::parse(html, url)?;
        let heading = page.first_text("h3")?.unwrap_or_default();
        let sub_heading = page.first_text("h4")?;

        if NOT_FOUND_HEADINGS.contains(&heading.trim())
            || sub_heading
                .as_deref()
                .is_some_and(|h| NOT_FOUND_HEADINGS.contains(&h.trim()))
        {
            return Err(AppError::not_found(format!("mileage file {elr}")));
        }

        let listing = page
            .first_text("pre")?
            .ok_or_else(|| AppError::malformed(format!("mileage file {elr} has no listing")))?;
        let (measures, notes) = self.parse_listing(&listing);

        Ok(MileageFile {
            elr: elr.to_string(),
            line: tab_title(&heading),
            sub_line: sub_heading.map(|h| tab_title(&h)).filter(|h| !h.is_empty()),
            measures,
            notes,
            source: url.to_string(),
            last_updated: page.last_updated(dates),
        })
    }

    /// Split a `<pre>` listing into measures and free-text notes.
    pub fn parse_listing(&self, listing: &str) -> (Vec<Measure>, Option<String>) {
        let lines: Vec<Line> = listing
            .lines()
            .map(|l| l.replace('\u{a0}', " "))
            .filter(|l| !l.trim().is_empty())
            .map(|l| self.classify(&l))
            .collect();

        let notes: Vec<String> = lines
            .iter()
            .filter_map(|l| match l {
                Line::Note(text) => Some(text.clone()),
                _ => None,
            })
            .collect();
        let in_km = notes.iter().any(|n| n.contains("Distances in km"));

        let mut measures: Vec<Measure> = Vec::new();
        let mut current = Measure {
            name: None,
            entries: Vec::new(),
        };
        for line in lines {
            match line {
                Line::Heading(name) => {
                    let previous = std::mem::replace(
                        &mut current,
                        Measure {
                            name: Some(name),
                            entries: Vec::new(),
                        },
                    );
                    if !previous.entries.is_empty() {
                        measures.push(previous);
                    }
                }
                Line::Entry { mileage, node } => {
                    current.entries.push(self.entry(&mileage, &node, in_km));
                }
                Line::Note(_) => {}
            }
        }
        if !current.entries.is_empty() || current.name.is_some() {
            measures.push(current);
        }
        name_leading_measure(&mut measures);

        let notes = notes.join(" ").trim().to_string();
        (measures, (!notes.is_empty()).then_some(notes))
    }

    fn classify(&self, raw: &str) -> Line {
        let trimmed = raw.trim();
        let Some((mileage, text)) = trimmed.split_once('\t') else {
            if trimmed.contains("Note that") {
                return Line::Note(with_full_stop(trimmed));
            }
            return self.classify_text(&normalize_whitespace(trimmed));
        };
        let mileage = mileage.trim();
        let text = normalize_whitespace(&text.replace('\t', " "));
        if mileage.is_empty() {
            return self.classify_text(&text);
        }
        Line::Entry {
            mileage: mileage.to_string(),
            node: text,
        }
    }

    /// Classify a line that carries no distance.
    fn classify_text(&self, text: &str) -> Line {
        let is_named_measure = MEASURE_KINDS.iter().any(|kind| {
            MEASURE_NOUNS
                .iter()
                .any(|noun| text.contains(&format!("{kind} {noun}")))
        });
        if is_named_measure {
            return Line::Heading(text.to_string());
        }
        if text.contains("Revised distances are thus:") {
            return Line::Heading("Current measure".to_string());
        }
        if text.contains("Later (post-preservation measure)") {
            return Line::Heading("Later measure (post-preservation measure)".to_string());
        }
        if text.contains("Distances in km")
            || text.contains("measured from accurate mapping systems")
            || text.chars().count() >= MAX_HEADING_LEN
        {
            return Line::Note(text.to_string());
        }
        if self.measure_word.is_match(text) {
            return Line::Heading(text.to_string());
        }
        Line::Entry {
            mileage: String::new(),
            node: text.to_string(),
        }
    }

    fn entry(&self, mileage: &str, node: &str, in_km: bool) -> MileageEntry {
        let (mile_chain, mileage_note) = self.parse_mileage(mileage, in_km);
        let (node, connections) = self.parse_node(node);
        MileageEntry {
            mile_chain,
            mileage_note,
            node,
            connections,
        }
    }

    /// Read a distance cell into `miles.chains` and an explanatory note.
    pub fn parse_mileage(&self, raw: &str, in_km: bool) -> (Option<MileChain>, Option<String>) {
        let m = raw.trim();
        if m.is_empty() {
            return (None, None);
        }

        if m.contains("km") || in_km {
            return self.parse_km(m);
        }

        let (text, note) = if m.starts_with('(') && m.ends_with(')') {
            (
                self.first_number(m),
                Some("Not on this route but given for reference".to_string()),
            )
        } else if m.starts_with(['≈', '~']) || m.ends_with('?') {
            (
                m.trim_start_matches(['≈', '~']).trim_end_matches('?').trim().to_string(),
                Some("Approximate".to_string()),
            )
        } else if let Some((first, second)) = m.split_once('/') {
            (
                first.trim().to_string(),
                Some(format!("{} (Alternative)", second.trim())),
            )
        } else if m.contains(" + ") || m.contains("private portion") {
            let number = self.first_number(m);
            let rest = normalize_whitespace(&m.replacen(&number, "", 1));
            (number, (!rest.is_empty()).then_some(rest))
        } else if m.contains('†') {
            (
                m.replace('†', "").trim().to_string(),
                Some("(See 'Notes')".to_string()),
            )
        } else {
            (m.replace([' ', ','], "."), None)
        };

        match text.parse::<MileChain>() {
            Ok(mile_chain) => (Some(mile_chain), note),
            Err(_) => {
                log::debug!("Unreadable mileage '{}'", raw);
                (None, note.or_else(|| Some(m.to_string())))
            }
        }
    }

    /// Kilometre distances, possibly paired with a `miles.chains` one.
    fn parse_km(&self, m: &str) -> (Option<MileChain>, Option<String>) {
        let approximate = m.starts_with(['≈', '~']);
        let note = if approximate {
            format!("{m} (Approximate)")
        } else {
            m.to_string()
        };

        // "9.15/14.629km": the miles part wins
        if m.contains("km") {
            let miles = m
                .split('/')
                .map(str::trim)
                .find(|part| !part.contains("km") && !part.is_empty());
            if let Some(Ok(mile_chain)) = miles.map(str::parse::<MileChain>) {
                return (Some(mile_chain), Some(note));
            }
        }

        let km = self
            .first_number(m)
            .parse::<f64>()
            .ok()
            .and_then(MileChain::from_km);
        (km, Some(note))
    }

    fn first_number(&self, text: &str) -> String {
        self.leading_number
            .find(text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    /// Split a node into its name and the lines it connects with.
    pub fn parse_node(&self, text: &str) -> (String, Vec<NodeConnection>) {
        let Some((name, rest)) = text.split_once(" with ") else {
            return (text.to_string(), Vec::new());
        };
        if !rest.starts_with(|c: char| c.is_ascii_uppercase()) {
            return (text.to_string(), Vec::new());
        }
        let rest = rest.trim_end_matches(['*', ' ']);

        let mut parts: Vec<String> = if self.elr_pair.is_match(rest) {
            rest.split('/').map(|p| p.trim().to_string()).collect()
        } else {
            vec![rest.to_string()]
        };
        parts = parts
            .iter()
            .map(|p| p.replace("later ", "").trim_end_matches(',').to_string())
            .flat_map(|p| {
                p.split(" and ")
                    .flat_map(|q| q.split(", "))
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();

        let connections = parts.into_iter().map(|p| self.connection(p)).collect();
        (name.trim().to_string(), connections)
    }

    fn connection(&self, text: String) -> NodeConnection {
        let Some(caps) = self.elr_node.captures(&text) else {
            return NodeConnection {
                text,
                elr: None,
                mile_chain: None,
            };
        };
        let elr = caps.get(1).map(|m| m.as_str().to_string());
        let mile_chain = caps.get(2).and_then(|m| {
            let inner = m.as_str().trim();
            match inner.strip_suffix("km") {
                Some(km) => km.trim().parse::<f64>().ok().and_then(MileChain::from_km),
                None => inner.parse().ok(),
            }
        });
        NodeConnection {
            text,
            elr,
            mile_chain,
        }
    }
}

/// Where `start` meets `end`, read from their mileage files.
///
/// The junction is the first node on the start ELR's preferred measure that
/// mentions the end ELR. The end distance comes from the connection text,
/// else from the end file's node that mentions the start ELR, else it is
/// taken to equal the start distance.
pub fn find_connection(start: &MileageFile, end: &MileageFile) -> Option<(MileChain, MileChain)> {
    let measure = start.preferred_measure()?;
    let entry = measure.entries.iter().find(|e| e.mentions(&end.elr))?;
    let start_exit = entry.mile_chain?;

    let from_link = entry
        .connections
        .iter()
        .find(|c| c.elr.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(&end.elr)))
        .and_then(|c| c.mile_chain);
    let from_end_file = || {
        end.preferred_measure()?
            .entries
            .iter()
            .find(|e| e.mentions(&start.elr))?
            .mile_chain
    };

    let end_entry = from_link.or_else(from_end_file).unwrap_or(start_exit);
    Some((start_exit, end_entry))
}

/// Direct connection between two mileage files, if any.
pub fn direct_connection(start: &MileageFile, end: &MileageFile) -> Option<ConnectionMileages> {
    let (start_exit, end_entry) = find_connection(start, end)?;
    Some(ConnectionMileages {
        start_elr: start.elr.clone(),
        end_elr: end.elr.clone(),
        start_exit,
        via: None,
        end_entry,
    })
}

/// Where `start` meets `end`, directly or through one connected ELR.
///
/// `load` supplies mileage files by ELR. A via ELR whose file cannot be
/// loaded is skipped; failing to load `start` or `end` is an error.
pub fn connect<F>(start: &str, end: &str, mut load: F) -> Result<Option<ConnectionMileages>>
where
    F: FnMut(&str) -> Result<MileageFile>,
{
    let start_file = load(start)?;
    let end_file = load(end)?;
    if let Some(direct) = direct_connection(&start_file, &end_file) {
        return Ok(Some(direct));
    }

    for via in start_file.connected_elrs() {
        if via.eq_ignore_ascii_case(end) {
            continue;
        }
        let via_file = match load(&via) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("Skipping via {}: {}", via, e);
                continue;
            }
        };
        let (Some((start_exit, entry)), Some((exit, end_entry))) = (
            find_connection(&start_file, &via_file),
            find_connection(&via_file, &end_file),
        ) else {
            continue;
        };
        return Ok(Some(ConnectionMileages {
            start_elr: start_file.elr.clone(),
            end_elr: end_file.elr.clone(),
            start_exit,
            via: Some(ViaConnection {
                elr: via_file.elr,
                entry,
                exit,
            }),
            end_entry,
        }));
    }
    Ok(None)
}

/// Headings put the ELR and the title in tab-separated fields.
fn tab_title(heading: &str) -> String {
    let mut fields = heading.split('\t');
    let first = fields.next().unwrap_or_default();
    normalize_whitespace(fields.next().unwrap_or(first))
}

fn with_full_stop(text: &str) -> String {
    if text.ends_with(|c: char| c.is_ascii_alphabetic()) {
        format!("{text}.")
    } else {
        text.to_string()
    }
}

/// Name an unnamed leading measure after its named counterpart.
fn name_leading_measure(measures: &mut [Measure]) {
    let [first, second] = measures else {
        return;
    };
    if first.name.is_some() {
        return;
    }
    let Some(kind) = second
        .name
        .as_deref()
        .and_then(|n| n.split_whitespace().next())
    else {
        return;
    };
    let counterpart = match kind {
        "Earlier" => "Later",
        "Later" => "Earlier",
        "Alternative" | "Alternate" => "One",
        "One" => "Alternative",
        "Original" => "Current",
        "Current" => "Original",
        "Former" | "Old" => "Current",
        "New" => "Old",
        _ => return,
    };
    first.name = Some(format!("{counterpart} measure"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> MileageParser {
        MileageParser::new().unwrap()
    }

    fn file(elr: &str, listing: &str) -> MileageFile {
        let (measures, notes) = parser().parse_listing(listing);
        MileageFile {
            elr: elr.into(),
            line: String::new(),
            sub_line: None,
            measures,
            notes,
            source: String::new(),
            last_updated: None,
        }
    }

    const PAGE: &str = "<html><body>
        <h3>AAV\tAshchurch and Evesham</h3>
        <h4>AAV\tEvesham branch</h4>
        <pre>
0.00\tAshchurch Junction with BGL (94.16)
1.73\tAshchurch Depot
\tNote that the line is closed
11.42\tEvesham with OWW
        </pre>
        <p class=\"update\">Last updated: 2 May 2020</p>
        </body></html>";

    #[test]
    fn parses_page_heading_listing_and_notes() {
        let dates = DateParser::new().unwrap();
        let file = parser()
            .parse_page("AAV", "http://example.org/aav.shtm", PAGE, &dates)
            .unwrap();

        assert_eq!(file.line, "Ashchurch and Evesham");
        assert_eq!(file.sub_line.as_deref(), Some("Evesham branch"));
        assert_eq!(file.notes.as_deref(), Some("Note that the line is closed."));
        assert_eq!(file.measures.len(), 1);
        assert_eq!(file.measures[0].name, None);

        let entries = &file.measures[0].entries;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].node, "Ashchurch Junction");
        assert_eq!(entries[0].connections[0].elr.as_deref(), Some("BGL"));
        assert_eq!(
            entries[0].connections[0].mile_chain,
            Some(MileChain::new(94, 16))
        );
        assert_eq!(entries[1].mile_chain, Some(MileChain::new(1, 73)));
        assert!(entries[1].connections.is_empty());
        assert_eq!(file.last_updated, chrono::NaiveDate::from_ymd_opt(2020, 5, 2));
    }

    #[test]
    fn missing_page_is_not_found() {
        let dates = DateParser::new().unwrap();
        let html = "<html><body><h3>\"404\" error: page not found</h3></body></html>";
        let err = parser()
            .parse_page("ZZZ", "http://example.org/zzz.shtm", html, &dates)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn page_without_listing_is_malformed() {
        let dates = DateParser::new().unwrap();
        let html = "<html><body><h3>ABC\tSomewhere</h3></body></html>";
        let err = parser()
            .parse_page("ABC", "http://example.org/abc.shtm", html, &dates)
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedTable { .. }));
    }

    #[test]
    fn measure_headings_split_the_listing() {
        let file = file(
            "MOR",
            "0.00\tMorlais Junction with SWA (215.18)\n\
             3.21\tEnd with SDI2 (2.79)\n\
             \tLater measure\n\
             0.00\tMorlais Junction with SWA (215.26)\n\
             3.29\tEnd with SDI2 (2.79)\n",
        );
        let names: Vec<Option<&str>> = file.measures.iter().map(|m| m.name.as_deref()).collect();
        assert_eq!(names, vec![Some("Earlier measure"), Some("Later measure")]);
        assert_eq!(file.measures[1].entries[1].mile_chain, Some(MileChain::new(3, 29)));
        assert_eq!(
            file.preferred_measure().and_then(|m| m.name.as_deref()),
            Some("Later measure")
        );
    }

    #[test]
    fn mileage_forms_and_notes() {
        let p = parser();
        assert_eq!(p.parse_mileage("8.69", false), (Some(MileChain::new(8, 69)), None));
        assert_eq!(
            p.parse_mileage("(8.67)", false),
            (
                Some(MileChain::new(8, 67)),
                Some("Not on this route but given for reference".into())
            )
        );
        assert_eq!(
            p.parse_mileage("≈3.05", false),
            (Some(MileChain::new(3, 5)), Some("Approximate".into()))
        );
        assert_eq!(
            p.parse_mileage("10.12/ 10.15", false),
            (Some(MileChain::new(10, 12)), Some("10.15 (Alternative)".into()))
        );
        assert_eq!(
            p.parse_mileage("1.23†", false),
            (Some(MileChain::new(1, 23)), Some("(See 'Notes')".into()))
        );
        assert_eq!(p.parse_mileage("2 45", false), (Some(MileChain::new(2, 45)), None));
        assert_eq!(p.parse_mileage("", false), (None, None));
        assert_eq!(p.parse_mileage("unknown", false), (None, Some("unknown".into())));
    }

    #[test]
    fn kilometre_distances_convert() {
        let p = parser();
        assert_eq!(
            p.parse_mileage("14.629km", false),
            (Some(MileChain::new(9, 7)), Some("14.629km".into()))
        );
        let (mile_chain, _) = p.parse_mileage("9.15/14.629km", false);
        assert_eq!(mile_chain, Some(MileChain::new(9, 15)));

        let file = file("XRC2", "\tDistances in km\n14.629\tPudding Mill Lane\n");
        let entry = &file.measures[0].entries[0];
        assert_eq!(entry.mile_chain, Some(MileChain::new(9, 7)));
        assert!(file.notes.unwrap().contains("Distances in km"));
    }

    #[test]
    fn node_connections_are_split() {
        let p = parser();
        let (name, connections) = p.parse_node("Doncaster with ECM5 (156.07) and DOL1");
        assert_eq!(name, "Doncaster");
        let elrs: Vec<Option<&str>> = connections.iter().map(|c| c.elr.as_deref()).collect();
        assert_eq!(elrs, vec![Some("ECM5"), Some("DOL1")]);
        assert_eq!(connections[0].mile_chain, Some(MileChain::new(156, 7)));

        let (_, connections) = p.parse_node("Shields Junction with PAG (1.20)/GSW (0.75)");
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[1].elr.as_deref(), Some("GSW"));

        let (_, connections) = p.parse_node("Wembley with Freightliner terminal");
        assert_eq!(connections[0].elr, None);

        let (name, connections) = p.parse_node("Crossing with gates");
        assert_eq!(name, "Crossing with gates");
        assert!(connections.is_empty());
    }

    #[test]
    fn connection_uses_link_distance_then_end_file() {
        let start = file("AAV", "0.00\tAshchurch with BGL (94.16)\n11.42\tEvesham with OWW\n");
        let bgl = file("BGL", "94.16\tAshchurch\n");
        let oww = file("OWW", "40.10\tEvesham with AAV (11.42)\n");

        assert_eq!(
            find_connection(&start, &bgl),
            Some((MileChain::new(0, 0), MileChain::new(94, 16)))
        );
        assert_eq!(
            find_connection(&start, &oww),
            Some((MileChain::new(11, 42), MileChain::new(40, 10)))
        );

        let other = file("XYZ", "1.00\tNowhere\n");
        assert_eq!(find_connection(&start, &other), None);
        assert_eq!(start.connected_elrs(), vec!["BGL", "OWW"]);
    }

    #[test]
    fn connects_through_one_intermediate_elr() {
        let files = [
            file("AAV", "0.00\tAshchurch with BGL (94.16)\n"),
            file("BGL", "90.00\tCheltenham with GLM\n94.16\tAshchurch with AAV\n"),
            file("GLM", "3.10\tCheltenham with BGL (90.00)\n"),
        ];
        let load = |elr: &str| {
            files
                .iter()
                .find(|f| f.elr == elr)
                .cloned()
                .ok_or_else(|| AppError::not_found(elr))
        };

        let conn = connect("AAV", "GLM", load).unwrap().unwrap();
        assert_eq!(conn.start_exit, MileChain::new(0, 0));
        let via = conn.via.unwrap();
        assert_eq!(via.elr, "BGL");
        assert_eq!(via.entry, MileChain::new(94, 16));
        assert_eq!(via.exit, MileChain::new(90, 0));
        assert_eq!(conn.end_entry, MileChain::new(3, 10));

        let direct = connect("AAV", "BGL", load).unwrap().unwrap();
        assert!(direct.via.is_none());

        assert!(connect("AAV", "ZZZ", load).is_err());
    }
}
