use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// One text cell as handed over by the fetch layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub text: String,
    #[serde(default)]
    pub heading: bool, // bold / <th>-style markup in the source page
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            heading: false,
        }
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            heading: true,
        }
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Cell::new(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    pub cells: Vec<Cell>,
}

impl RawRow {
    /// Builds a row of plain (non-heading) cells.
    pub fn plain<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Cell::new).collect(),
        }
    }

    /// Builds a row where every cell carries heading markup.
    pub fn headings<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Cell::heading).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_heading(&self) -> bool {
        self.cells.iter().any(|c| c.heading)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.cells.iter().map(|c| c.text.as_str()).collect()
    }
}

/// A table (or page section) as extracted by the fetch layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub header: Option<Vec<String>>,
    #[serde(default)]
    pub group_label: Option<String>, // e.g. software name from the first bold cell
    #[serde(default)]
    pub rows: Vec<RawRow>,
}

/// Semantic meaning of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Version,
    ReleaseDate,
    EolDate,
    Title,
    Authors,
    PublishedDate,
    Link,
    Product,
    Model,
    Description,
    Replacement,
    Cost,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Version => "version",
            Role::ReleaseDate => "release_date",
            Role::EolDate => "eol_date",
            Role::Title => "title",
            Role::Authors => "authors",
            Role::PublishedDate => "published_date",
            Role::Link => "link",
            Role::Product => "product",
            Role::Model => "model",
            Role::Description => "description",
            Role::Replacement => "replacement",
            Role::Cost => "cost",
        }
    }

    /// Values of date roles go through the date normalizer.
    pub fn is_date(&self) -> bool {
        matches!(self, Role::ReleaseDate | Role::EolDate | Role::PublishedDate)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed role universe of one deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    #[default]
    SoftwareEol,
    HardwareEol,
    Papers,
    Products,
}

impl Domain {
    /// Roles in export column order.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Domain::SoftwareEol => &[Role::Version, Role::ReleaseDate, Role::EolDate],
            Domain::HardwareEol => &[Role::Product, Role::EolDate, Role::Link, Role::Replacement],
            Domain::Papers => &[Role::Title, Role::Authors, Role::PublishedDate, Role::Link],
            Domain::Products => &[
                Role::Product,
                Role::Model,
                Role::Description,
                Role::Link,
                Role::Cost,
            ],
        }
    }
}

/// Normalized output unit. Immutable once assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub group: String,
    pub source: String,
    pub values: Vec<(Role, String)>,
}

impl CanonicalRecord {
    pub fn get(&self, role: Role) -> Option<&str> {
        self.values
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, v)| v.as_str())
    }

    /// Export row: group, source, then one value per role (empty when absent).
    pub fn to_row(&self, roles: &[Role]) -> Vec<String> {
        let mut row = Vec::with_capacity(roles.len() + 2);
        row.push(self.group.clone());
        row.push(self.source.clone());
        for role in roles {
            row.push(self.get(*role).unwrap_or_default().to_string());
        }
        row
    }

    /// Group label plus every role value; the source id is not part of it.
    pub fn natural_key(&self) -> (String, Vec<(Role, String)>) {
        (self.group.clone(), self.values.clone())
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry("group", &self.group)?;
        map.serialize_entry("source", &self.source)?;
        for (role, value) in &self.values {
            map.serialize_entry(role.as_str(), value)?;
        }
        map.end()
    }
}
