// src/services/dates.rs

//! Date parsing rule shared by date columns and page "last updated" regions.

use chrono::NaiveDate;
use regex::Regex;

use crate::error::Result;
use crate::services::glyphs;

/// Parses the date formats found on the source site.
///
/// Accepted: `12 March 2021`, `12th March 2021`, `March 12, 2021`,
/// `2021-03-12`, `2021-mar-12`, and `12/03/2021` (day first). Month names
/// are matched on their first three letters, so abbreviations and common
/// misspellings still resolve. The date may be embedded in longer text.
#[derive(Debug, Clone)]
pub struct DateParser {
    iso: Regex,
    iso_named: Regex,
    day_month_year: Regex,
    month_day_year: Regex,
    numeric: Regex,
    ordinal: Regex,
}

impl DateParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            iso: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b")?,
            iso_named: Regex::new(r"\b(\d{4})-([A-Za-z]{3,})-(\d{1,2})\b")?,
            day_month_year: Regex::new(r"\b(\d{1,2})\s+([A-Za-z]{3,})\.?\s+(\d{4})\b")?,
            month_day_year: Regex::new(r"\b([A-Za-z]{3,})\.?\s+(\d{1,2})\s+(\d{4})\b")?,
            numeric: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b")?,
            ordinal: Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b")?,
        })
    }

    /// Parse a date out of free text.
    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        let cleaned = glyphs::decode(text).text.replace(',', " ");
        let cleaned = self.ordinal.replace_all(&cleaned, "$1");

        if let Some(caps) = self.iso.captures(&cleaned) {
            return ymd(&caps[1], &caps[2], &caps[3]);
        }
        if let Some(caps) = self.iso_named.captures(&cleaned) {
            if let Some(month) = month_number(&caps[2]) {
                return ymd_month(&caps[1], month, &caps[3]);
            }
        }
        if let Some(caps) = self.day_month_year.captures(&cleaned) {
            if let Some(month) = month_number(&caps[2]) {
                return ymd_month(&caps[3], month, &caps[1]);
            }
        }
        if let Some(caps) = self.month_day_year.captures(&cleaned) {
            if let Some(month) = month_number(&caps[1]) {
                return ymd_month(&caps[3], month, &caps[2]);
            }
        }
        if let Some(caps) = self.numeric.captures(&cleaned) {
            return ymd(&caps[3], &caps[2], &caps[1]);
        }
        None
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    ymd_month(year, month.parse().ok()?, day)
}

fn ymd_month(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = name.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}
