// src/services/page.rs

//! Page-region extraction.
//!
//! A fetched category page carries more than its tables: a "last updated"
//! paragraph, optional free-text notes, and (on index pages) links to the
//! per-initial pages. This module isolates those regions.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use url::Url;

use crate::error::Result;
use crate::models::Initial;
use crate::services::dates::DateParser;
use crate::utils::{normalize_whitespace, parse_selector, resolve_url};

const UPDATE_SELECTOR: &str = "p.update";
/// Containers holding the index of initial pages, in order of preference
const CATALOGUE_CONTAINERS: [&str; 2] = ["div.fixed", "h1"];

/// Headings that group the links of an index page
const LINK_HEADINGS: [&str; 3] = ["h2", "h3", "h4"];

/// A link on an index page with the heading it sits under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadedLink {
    pub heading: Option<String>,
    pub text: String,
    pub url: String,
}

/// A parsed HTML page and the URL it came from.
pub struct Page {
    document: Html,
    url: Url,
}

impl Page {
    pub fn parse(html: &str, url: &str) -> Result<Self> {
        Ok(Self {
            document: Html::parse_document(html),
            url: Url::parse(url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Text of the first element matching `selector`.
    pub fn first_text(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .document
            .select(&selector)
            .next()
            .map(|el| el.text().collect()))
    }

    /// Top-level tables matching `selector`, in document order.
    pub fn tables(&self, selector: &str) -> Result<Vec<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .document
            .select(&selector)
            .filter(|table| !is_nested_table(*table))
            .collect())
    }

    /// "Last updated" date of the page.
    ///
    /// Reads `p.update` first, then any text mentioning "last update".
    pub fn last_updated(&self, dates: &DateParser) -> Option<NaiveDate> {
        if let Ok(selector) = parse_selector(UPDATE_SELECTOR) {
            for el in self.document.select(&selector) {
                let text: String = el.text().collect();
                if let Some(date) = dates.parse(&text) {
                    return Some(date);
                }
            }
        }

        let chunks: Vec<&str> = self.document.root_element().text().collect();
        for (i, chunk) in chunks.iter().enumerate() {
            if !chunk.to_lowercase().contains("last update") {
                continue;
            }
            let window = chunks[i..chunks.len().min(i + 3)].concat();
            if let Some(date) = dates.parse(&window) {
                return Some(date);
            }
        }
        None
    }

    /// Text of every element matching `selector`.
    pub fn notes(&self, selector: &str) -> Result<Vec<String>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .document
            .select(&selector)
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect())
    }

    /// Links whose text is a single letter, keyed by that initial.
    ///
    /// Only the index container is read: `div.fixed`, else the first `h1`.
    pub fn catalogue(&self) -> Result<BTreeMap<Initial, String>> {
        let links = parse_selector("a[href]")?;
        let mut catalogue = BTreeMap::new();

        let mut container = None;
        for css in CATALOGUE_CONTAINERS {
            let selector = parse_selector(css)?;
            if let Some(el) = self.document.select(&selector).next() {
                container = Some(el);
                break;
            }
        }
        let Some(container) = container else {
            log::debug!("No catalogue container on {}", self.url);
            return Ok(catalogue);
        };

        for link in container.select(&links) {
            let text = normalize_whitespace(&link.text().collect::<String>());
            let Ok(initial) = text.parse::<Initial>() else {
                continue;
            };
            if let Some(href) = link.value().attr("href") {
                catalogue
                    .entry(initial)
                    .or_insert_with(|| resolve_url(&self.url, href));
            }
        }
        Ok(catalogue)
    }

    /// Links matching `selector` in document order, each with the nearest
    /// heading above it.
    pub fn headed_links(&self, selector: &str) -> Result<Vec<HeadedLink>> {
        let selector = parse_selector(selector)?;
        let mut heading = None;
        let mut links = Vec::new();

        for el in self.document.root_element().descendants().filter_map(ElementRef::wrap) {
            if LINK_HEADINGS.contains(&el.value().name()) {
                let text = normalize_whitespace(&el.text().collect::<String>());
                heading = (!text.is_empty()).then_some(text);
                continue;
            }
            if !selector.matches(&el) {
                continue;
            }
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            links.push(HeadedLink {
                heading: heading.clone(),
                text: normalize_whitespace(&el.text().collect::<String>()),
                url: resolve_url(&self.url, href),
            });
        }
        Ok(links)
    }

    /// Resolve a link found on this page.
    pub fn resolve(&self, href: &str) -> String {
        resolve_url(&self.url, href)
    }
}

fn is_nested_table(table: ElementRef<'_>) -> bool {
    table
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().name() == "table")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <h1>ELRs beginning with A</h1>
        <p class="update">Last updated: 9 January 2021</p>
        <table>
            <tr><th>ELR</th><th>Line name</th></tr>
            <tr><td><a href="_mileages/a/aav.shtm">AAV</a></td><td><table><tr><td>x</td></tr></table></td></tr>
        </table>
        <p class="note">Codes marked * are pseudo codes.</p>
        <table><tr><th>Second</th></tr><tr><td>y</td></tr></table>
    </body></html>"#;

    #[test]
    fn links_carry_their_heading() {
        let html = r#"<html><body>
            <a href="/index.shtm">Home</a>
            <h3>London</h3>
            <ul><li><a href="london1.shtm">Thames bridges</a></li></ul>
            <h3>Scotland</h3>
            <ul><li><a href="forth.shtm">Forth  Bridge</a></li><li>No link</li></ul>
        </body></html>"#;
        let page = Page::parse(html, "http://www.railwaycodes.org.uk/bridges/bridges0.shtm").unwrap();
        let links = page.headed_links("ul li a").unwrap();

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].heading.as_deref(), Some("London"));
        assert_eq!(links[0].url, "http://www.railwaycodes.org.uk/bridges/london1.shtm");
        assert_eq!(links[1].heading.as_deref(), Some("Scotland"));
        assert_eq!(links[1].text, "Forth Bridge");
    }

    #[test]
    fn finds_top_level_tables_only() {
        let page = Page::parse(PAGE, "http://www.railwaycodes.org.uk/elrs/elra.shtm").unwrap();
        assert_eq!(page.tables("table").unwrap().len(), 2);
    }

    #[test]
    fn reads_update_paragraph() {
        let page = Page::parse(PAGE, "http://www.railwaycodes.org.uk/elrs/elra.shtm").unwrap();
        let dates = DateParser::new().unwrap();
        assert_eq!(page.last_updated(&dates), NaiveDate::from_ymd_opt(2021, 1, 9));
    }

    #[test]
    fn falls_back_to_last_update_phrase() {
        let html = "<html><body><div>Last update:<b>3 March 2022</b></div></body></html>";
        let page = Page::parse(html, "http://example.org/").unwrap();
        let dates = DateParser::new().unwrap();
        assert_eq!(page.last_updated(&dates), NaiveDate::from_ymd_opt(2022, 3, 3));
    }

    #[test]
    fn missing_update_is_none() {
        let page = Page::parse("<html><body><p>Hi</p></body></html>", "http://example.org/")
            .unwrap();
        let dates = DateParser::new().unwrap();
        assert_eq!(page.last_updated(&dates), None);
    }

    #[test]
    fn collects_notes() {
        let page = Page::parse(PAGE, "http://www.railwaycodes.org.uk/elrs/elra.shtm").unwrap();
        assert_eq!(
            page.notes("p.note").unwrap(),
            vec!["Codes marked * are pseudo codes."]
        );
    }

    #[test]
    fn catalogue_maps_letters_to_urls() {
        let html = r#"<html><body>
            <div class="fixed">
                <a href="elra.shtm">A</a> <a href="elrb.shtm">B</a>
                <a href="/index.shtm">Home</a> <a href="elrz.shtm"> z </a>
            </div>
        </body></html>"#;
        let page = Page::parse(html, "http://www.railwaycodes.org.uk/elrs/elr0.shtm").unwrap();
        let catalogue = page.catalogue().unwrap();
        assert_eq!(catalogue.len(), 3);
        assert_eq!(
            catalogue.get(&Initial::new('A').unwrap()).map(String::as_str),
            Some("http://www.railwaycodes.org.uk/elrs/elra.shtm")
        );
        assert!(catalogue.contains_key(&Initial::new('Z').unwrap()));
    }

    #[test]
    fn catalogue_ignores_links_outside_the_index() {
        let html = r#"<html><body>
            <div class="fixed"><a href="elra.shtm">A</a> <a href="elrb.shtm">B</a></div>
            <p>See also <a href="/misc/x.shtm">X</a></p>
        </body></html>"#;
        let page = Page::parse(html, "http://www.railwaycodes.org.uk/elrs/elr0.shtm").unwrap();
        let catalogue = page.catalogue().unwrap();
        assert_eq!(catalogue.len(), 2);
        assert!(!catalogue.contains_key(&Initial::new('X').unwrap()));
    }

    #[test]
    fn catalogue_falls_back_to_heading() {
        let html = r#"<html><body>
            <h1>Stations <a href="stationa.shtm">A</a> <a href="stationb.shtm">B</a></h1>
            <a href="/misc/c.shtm">C</a>
        </body></html>"#;
        let page = Page::parse(html, "http://www.railwaycodes.org.uk/stations/station0.shtm")
            .unwrap();
        let catalogue = page.catalogue().unwrap();
        let letters: Vec<char> = catalogue.keys().map(|i| i.as_char()).collect();
        assert_eq!(letters, vec!['A', 'B']);
    }

    #[test]
    fn catalogue_without_index_is_empty() {
        let html = r#"<html><body><a href="elra.shtm">A</a></body></html>"#;
        let page = Page::parse(html, "http://www.railwaycodes.org.uk/elrs/elr0.shtm").unwrap();
        assert!(page.catalogue().unwrap().is_empty());
    }
}
