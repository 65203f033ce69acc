// src/models/category.rs

//! Declarative category definitions.
//!
//! Every code category on the source site is described by data: where its pages
//! live, which columns its tables carry, and how its response triad is keyed.
//! A single resolver drives all of them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Placeholder for the lower-case initial in URL templates.
pub const INITIAL_LOWER: &str = "{initial}";
/// Placeholder for the upper-case initial in URL templates.
pub const INITIAL_UPPER: &str = "{INITIAL}";
/// Column naming the section a record was collected from.
pub const SECTION_COLUMN: &str = "Section";
/// Columns of a link index: heading, link text, and target.
pub const LINK_COLUMNS: [&str; 3] = [SECTION_COLUMN, "Description", "URL"];

/// A single upper-case ASCII letter used to paginate a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Initial(char);

impl Initial {
    /// Validate and upper-case a letter.
    pub fn new(letter: char) -> Result<Self> {
        if letter.is_ascii_alphabetic() {
            Ok(Self(letter.to_ascii_uppercase()))
        } else {
            Err(AppError::validation(format!(
                "'{letter}' is not a valid initial letter"
            )))
        }
    }

    /// All 26 initials in order.
    pub fn all() -> impl Iterator<Item = Initial> {
        ('A'..='Z').map(Initial)
    }

    pub fn as_char(self) -> char {
        self.0
    }

    pub fn lower(self) -> char {
        self.0.to_ascii_lowercase()
    }
}

impl FromStr for Initial {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => Err(AppError::validation(format!(
                "'{s}' is not a single initial letter"
            ))),
        }
    }
}

impl TryFrom<String> for Initial {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Initial> for String {
    fn from(initial: Initial) -> Self {
        initial.0.to_string()
    }
}

impl fmt::Display for Initial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a request covers: one initial page or the whole category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Initial(Initial),
    All,
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "*" => Ok(Self::All),
            t if t.eq_ignore_ascii_case("all") => Ok(Self::All),
            t => Ok(Self::Initial(t.parse()?)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial(initial) => write!(f, "{initial}"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Expected type of a normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
    Float,
    Date,
}

/// One output column of a category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Canonical column name in normalized records
    pub name: String,

    /// Header label on the source page (defaults to `name`)
    #[serde(default)]
    pub header: Option<String>,

    #[serde(default)]
    pub kind: ColumnType,

    /// Split stacked lines of a cell into separate records
    #[serde(default)]
    pub repeatable: bool,

    /// Move trailing `[...]` text into a note
    #[serde(default = "default_true")]
    pub notes: bool,

    /// Sibling column receiving a trailing `(...)` or `[...]` qualifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_column: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnSpec {
    /// A plain text column.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: None,
            kind: ColumnType::Text,
            repeatable: false,
            notes: true,
            note_column: None,
        }
    }

    /// A float column.
    pub fn float(name: impl Into<String>) -> Self {
        Self {
            kind: ColumnType::Float,
            ..Self::text(name)
        }
    }

    /// A date column.
    pub fn date(name: impl Into<String>) -> Self {
        Self {
            kind: ColumnType::Date,
            ..Self::text(name)
        }
    }

    /// Mark the column as repeatable.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Read the column from a differently named source header.
    pub fn from_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Split trailing qualifiers into their own column.
    pub fn with_note_column(mut self, name: impl Into<String>) -> Self {
        self.note_column = Some(name.into());
        self
    }

    /// Header label used to locate the column in a grid.
    pub fn header_label(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.name)
    }
}

/// How a category's pages are organised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layout {
    /// One page per initial letter.
    Paginated {
        /// Page path with `{initial}` or `{INITIAL}`, relative to the source base URL
        url_template: String,

        /// Initials known to have no page
        #[serde(default)]
        excluded_initials: Vec<Initial>,

        /// Index page listing the initial pages
        #[serde(default)]
        catalogue_path: Option<String>,
    },

    /// A single page covering the whole category.
    SinglePage { path: String },

    /// A fixed set of named pages collected together, e.g. one per region.
    Sections { sections: Vec<Section> },

    /// A page of links grouped under headings instead of a table.
    LinkIndex {
        path: String,

        /// Selector for the links to list
        #[serde(default = "defaults::link_selector")]
        link_selector: String,
    },
}

/// One named page of a [`Layout::Sections`] category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub path: String,
}

impl Section {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A complete, data-driven category definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    /// Stable identifier, also the snapshot directory name
    pub id: String,

    /// Human-readable category name
    pub name: String,

    pub layout: Layout,

    pub columns: Vec<ColumnSpec>,

    /// Key of the data entry in the response triad
    pub data_key: String,

    #[serde(default = "defaults::notes_key")]
    pub notes_key: String,

    #[serde(default = "defaults::date_key")]
    pub date_key: String,

    /// Selector isolating data tables on a page
    #[serde(default = "defaults::table_selector")]
    pub table_selector: String,

    /// Selector for free-text additional notes on a page
    #[serde(default)]
    pub notes_selector: Option<String>,
}

impl CategorySpec {
    /// Initials to visit for an "all" collection, in order.
    pub fn initials(&self) -> Vec<Initial> {
        match &self.layout {
            Layout::Paginated {
                excluded_initials, ..
            } => Initial::all()
                .filter(|i| !excluded_initials.contains(i))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Reject an initial for categories not organised by initial.
    pub fn check_scope(&self, scope: Scope) -> Result<()> {
        match (&self.layout, scope) {
            (Layout::Paginated { .. }, _) | (_, Scope::All) => Ok(()),
            (_, Scope::Initial(initial)) => Err(AppError::validation(format!(
                "category '{}' is not organised by initial (requested '{initial}')",
                self.id
            ))),
        }
    }

    /// Page path for a scope, relative to the source base URL.
    pub fn page_path(&self, scope: Scope) -> Result<String> {
        self.check_scope(scope)?;
        match (&self.layout, scope) {
            (Layout::Paginated { url_template, .. }, Scope::Initial(initial)) => Ok(url_template
                .replace(INITIAL_LOWER, &initial.lower().to_string())
                .replace(INITIAL_UPPER, &initial.as_char().to_string())),
            (Layout::SinglePage { path }, _) | (Layout::LinkIndex { path, .. }, _) => {
                Ok(path.clone())
            }
            _ => Err(AppError::validation(format!(
                "category '{}' has no single page covering it",
                self.id
            ))),
        }
    }

    /// Output column names in order, note columns right after their source.
    ///
    /// Sectioned categories lead with the section name. Link indexes always
    /// carry [`LINK_COLUMNS`].
    pub fn column_names(&self) -> Vec<String> {
        let declared = self
            .columns
            .iter()
            .flat_map(|c| std::iter::once(c.name.clone()).chain(c.note_column.clone()));
        match &self.layout {
            Layout::LinkIndex { .. } => LINK_COLUMNS.iter().map(|c| c.to_string()).collect(),
            Layout::Sections { .. } => std::iter::once(SECTION_COLUMN.to_string())
                .chain(declared)
                .collect(),
            _ => declared.collect(),
        }
    }

    /// Find a built-in or configured category by id.
    pub fn find<'a>(categories: &'a [CategorySpec], id: &str) -> Result<&'a CategorySpec> {
        categories
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| AppError::validation(format!("unknown category '{id}'")))
    }

    /// Categories known to the source site.
    pub fn builtin() -> Vec<CategorySpec> {
        defaults::categories()
    }
}

mod defaults {
    use super::{CategorySpec, ColumnSpec, Layout, Section};

    pub fn notes_key() -> String {
        "Notes".into()
    }
    pub fn date_key() -> String {
        "Last updated date".into()
    }
    pub fn table_selector() -> String {
        "table".into()
    }
    pub fn link_selector() -> String {
        "a".into()
    }

    /// Line of Route prefixes; NW and NZ share a page.
    const LOR_PREFIXES: [(&str, &str); 10] = [
        ("CY", "cy"),
        ("EA", "ea"),
        ("GW", "gw"),
        ("LN", "ln"),
        ("MD", "md"),
        ("NW/NZ", "nw"),
        ("SC", "sc"),
        ("SO", "so"),
        ("SW", "sw"),
        ("XR", "xr"),
    ];

    fn category(
        id: &str,
        name: &str,
        layout: Layout,
        columns: Vec<ColumnSpec>,
        data_key: &str,
    ) -> CategorySpec {
        CategorySpec {
            id: id.into(),
            name: name.into(),
            layout,
            columns,
            data_key: data_key.into(),
            notes_key: notes_key(),
            date_key: date_key(),
            table_selector: table_selector(),
            notes_selector: None,
        }
    }

    fn single(path: &str) -> Layout {
        Layout::SinglePage { path: path.into() }
    }

    fn numbered(label: &str, template: &str, pages: u32) -> Layout {
        Layout::Sections {
            sections: (1..=pages)
                .map(|n| {
                    let path = template.replace("{n}", &n.to_string());
                    Section::new(format!("{label} {n}"), path)
                })
                .collect(),
        }
    }

    /// Categories beyond the location and line tables.
    fn assets() -> Vec<CategorySpec> {
        let code_and_name =
            |code: &str, name: &str| vec![ColumnSpec::text(code), ColumnSpec::text(name)];
        vec![
            category(
                "lor-codes",
                "Line of Route (LOR/PRIDE) codes",
                Layout::Sections {
                    sections: LOR_PREFIXES
                        .iter()
                        .map(|(prefix, page)| {
                            Section::new(*prefix, format!("pride/pride{page}.shtm"))
                        })
                        .collect(),
                },
                vec![
                    ColumnSpec::text("Code"),
                    ColumnSpec::text("Route").with_note_column("Route_note"),
                ],
                "LOR codes",
            ),
            category(
                "electrification",
                "OLE section codes",
                single("electrification/mast_prefix1.shtm"),
                vec![
                    ColumnSpec::text("Code"),
                    ColumnSpec::text("Line").with_note_column("Line_note"),
                    ColumnSpec::text("ELR").repeatable(),
                ],
                "National network",
            ),
            category(
                "independent-lines-electrification",
                "OLE section codes on independent lines",
                single("electrification/mast_prefix2.shtm"),
                code_and_name("Code", "Line"),
                "Independent lines",
            ),
            category(
                "neutral-sections",
                "Neutral sections",
                single("electrification/neutral.shtm"),
                vec![
                    ColumnSpec::text("ELR"),
                    ColumnSpec::text("Mileage"),
                    ColumnSpec::text("Location"),
                ],
                "National network neutral sections",
            ),
            category(
                "energy-tariff-zones",
                "Railway traction energy tariff zones",
                single("electrification/tariff.shtm"),
                code_and_name("Code", "Area"),
                "National network energy tariff zones",
            ),
            category(
                "track-diagrams",
                "Railway track diagrams",
                Layout::LinkIndex {
                    path: "line/diagrams0.shtm".into(),
                    link_selector: "a[target=\"_blank\"]".into(),
                },
                Vec::new(),
                "Track diagrams",
            ),
            category(
                "tunnels",
                "Railway tunnel lengths",
                numbered("Page", "tunnels/tunnels{n}.shtm", 4),
                vec![
                    ColumnSpec::text("Name"),
                    ColumnSpec::text("Other names").from_header("Other names, remarks"),
                    ColumnSpec::text("Length"),
                    ColumnSpec::text("ELR"),
                    ColumnSpec::text("Mileage"),
                    ColumnSpec::text("Between").from_header("Between..."),
                ],
                "Tunnels",
            ),
            category(
                "viaducts",
                "Railway viaducts",
                numbered("Page", "viaducts/viaducts{n}.shtm", 6),
                vec![
                    ColumnSpec::text("Name"),
                    ColumnSpec::text("Other names").from_header("Other names, remarks"),
                    ColumnSpec::text("ELR"),
                    ColumnSpec::text("Mileage"),
                    ColumnSpec::text("Spans"),
                    ColumnSpec::text("Length"),
                ],
                "Viaducts",
            ),
            category(
                "bridges",
                "Railway bridges",
                Layout::LinkIndex {
                    path: "bridges/bridges0.shtm".into(),
                    link_selector: "ul li a".into(),
                },
                Vec::new(),
                "Bridges",
            ),
            CategorySpec {
                notes_selector: Some("p.note".into()),
                ..category(
                    "signal-boxes",
                    "Signal box prefix codes",
                    Layout::Paginated {
                        url_template: "signal/signal_boxes{initial}.shtm".into(),
                        excluded_initials: Vec::new(),
                        catalogue_path: Some("signal/signal_boxes0.shtm".into()),
                    },
                    vec![
                        ColumnSpec::text("Code"),
                        ColumnSpec::text("Signal Box"),
                        ColumnSpec::text("ELR").repeatable(),
                        ColumnSpec::text("Mileage").repeatable(),
                        ColumnSpec::text("Opened"),
                        ColumnSpec::text("Closed"),
                        ColumnSpec::text("Control to"),
                    ],
                    "Signal boxes",
                )
            },
            category(
                "depots",
                "Two character TOPS depot codes",
                single("depots/depots1.shtm"),
                code_and_name("Code", "Depot name"),
                "Two character TOPS codes",
            ),
            category(
                "habds-and-wilds",
                "HABDs and WILDs",
                single("misc/habdwild.shtm"),
                vec![
                    ColumnSpec::text("ELR"),
                    ColumnSpec::text("Mileage"),
                    ColumnSpec::text("Tracks"),
                    ColumnSpec::text("Datum"),
                    ColumnSpec::text("Notes"),
                ],
                "HABDs and WILDs",
            ),
            category(
                "water-troughs",
                "Water troughs",
                single("misc/troughs.shtm"),
                vec![
                    ColumnSpec::text("ELR"),
                    ColumnSpec::text("Trough Name"),
                    ColumnSpec::text("Mileage"),
                    ColumnSpec::float("Length"),
                ],
                "Water troughs",
            ),
            category(
                "telegraph-codes",
                "Telegraphic codes",
                single("misc/telegraph.shtm"),
                code_and_name("Code", "Description"),
                "Telegraphic codes",
            ),
            category(
                "buzzer-codes",
                "Buzzer codes",
                single("misc/buzzer.shtm"),
                code_and_name("Code", "Meaning"),
                "Buzzer codes",
            ),
        ]
    }

    pub fn categories() -> Vec<CategorySpec> {
        vec![
            CategorySpec {
                id: "elrs".into(),
                name: "ELRs and mileages".into(),
                layout: Layout::Paginated {
                    url_template: "elrs/elr{initial}.shtm".into(),
                    excluded_initials: Vec::new(),
                    catalogue_path: Some("elrs/elr0.shtm".into()),
                },
                columns: vec![
                    ColumnSpec::text("ELR"),
                    ColumnSpec::text("Line name"),
                    ColumnSpec::text("Mileages"),
                    ColumnSpec::text("Datum"),
                    ColumnSpec::text("Notes"),
                ],
                data_key: "ELRs and mileages".into(),
                notes_key: notes_key(),
                date_key: date_key(),
                table_selector: table_selector(),
                notes_selector: None,
            },
            CategorySpec {
                id: "location-codes".into(),
                name: "CRS, NLC, TIPLOC and STANOX codes".into(),
                layout: Layout::Paginated {
                    url_template: "crs/CRS{initial}.shtm".into(),
                    excluded_initials: Vec::new(),
                    catalogue_path: Some("crs/crs0.shtm".into()),
                },
                columns: vec![
                    ColumnSpec::text("Location").repeatable(),
                    ColumnSpec::text("CRS").repeatable(),
                    ColumnSpec::text("NLC").repeatable(),
                    ColumnSpec::text("TIPLOC").repeatable(),
                    ColumnSpec::text("STANME").repeatable(),
                    ColumnSpec::text("STANOX").repeatable(),
                ],
                data_key: "LocationID".into(),
                notes_key: "Additional notes".into(),
                date_key: date_key(),
                table_selector: table_selector(),
                notes_selector: Some("p.note".into()),
            },
            CategorySpec {
                id: "stations".into(),
                name: "Railway station data".into(),
                layout: Layout::Paginated {
                    url_template: "stations/station{initial}.shtm".into(),
                    excluded_initials: Vec::new(),
                    catalogue_path: Some("stations/station0.shtm".into()),
                },
                columns: vec![
                    ColumnSpec::text("Station"),
                    ColumnSpec::text("ELR").repeatable(),
                    ColumnSpec::text("Mileage").repeatable(),
                    ColumnSpec::text("Status"),
                    ColumnSpec::float("Longitude").from_header("Degrees Longitude"),
                    ColumnSpec::float("Latitude").from_header("Degrees Latitude"),
                    ColumnSpec::text("Grid Reference"),
                    ColumnSpec::text("CRS"),
                    ColumnSpec::text("Owner").repeatable(),
                    ColumnSpec::text("Operator").repeatable(),
                ],
                data_key: "Mileages, operators and grid coordinates".into(),
                notes_key: notes_key(),
                date_key: date_key(),
                table_selector: table_selector(),
                notes_selector: None,
            },
            CategorySpec {
                id: "line-names".into(),
                name: "Railway line names".into(),
                layout: Layout::SinglePage {
                    path: "line/line_names.shtm".into(),
                },
                columns: vec![
                    ColumnSpec::text("Line name"),
                    ColumnSpec::text("Route").with_note_column("Route_note"),
                ],
                data_key: "Line names".into(),
                notes_key: notes_key(),
                date_key: date_key(),
                table_selector: table_selector(),
                notes_selector: None,
            },
        ]
        .into_iter()
        .chain(assets())
        .collect()
    }
}
