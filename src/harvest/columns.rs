//! Column role resolution.
//!
//! Header labels on scraped pages are not stable: columns get reordered,
//! renamed ("Release Date" vs "Released"), or dropped entirely. The resolver
//! walks an explicit, ordered table of `(pattern, role)` rules instead of
//! trusting positions.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Domain, Role};

// ============================================================================
// Rules
// ============================================================================

/// One `(pattern, role)` entry. Patterns are matched against the lower-cased,
/// trimmed header text.
#[derive(Debug, Clone)]
pub struct RoleRule {
    pattern: Regex,
    role: Role,
}

impl RoleRule {
    pub fn new(pattern: &str, role: Role) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            role,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn matches(&self, label: &str) -> bool {
        self.pattern.is_match(label)
    }
}

/// Built-in rule table for `domain`.
pub fn default_rules(domain: Domain) -> Vec<RoleRule> {
    let table: &[(&str, Role)] = match domain {
        Domain::SoftwareEol => &[
            (r"version", Role::Version),
            (r"release", Role::ReleaseDate),
            (r"end[\s-]*of[\s-]*life|eol", Role::EolDate),
        ],
        Domain::HardwareEol => &[
            (r"replacement|successor", Role::Replacement),
            (r"end[\s-]*of[\s-]*life|eol", Role::EolDate),
            (r"resource|bulletin|link|url", Role::Link),
            (r"product|model|name", Role::Product),
        ],
        Domain::Papers => &[
            (r"title", Role::Title),
            (r"author", Role::Authors),
            (r"published|submitted|date|year", Role::PublishedDate),
            (r"link|url|href|pdf", Role::Link),
        ],
        Domain::Products => &[
            (r"price|cost", Role::Cost),
            (r"model|sku|code|part", Role::Model),
            (r"description|details", Role::Description),
            (r"link|url", Role::Link),
            (r"product|name|title", Role::Product),
        ],
    };

    table
        .iter()
        .map(|(pattern, role)| RoleRule::new(pattern, *role).expect("valid built-in role pattern"))
        .collect()
}

/// What to do when several header cells match the same role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderConflict {
    /// Later columns override earlier ones.
    #[default]
    LastWins,
    /// The leftmost matching column is kept.
    FirstWins,
}

// ============================================================================
// Role map
// ============================================================================

/// Role → column index for one table or header band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRoleMap {
    entries: Vec<(Role, Option<usize>)>,
}

impl ColumnRoleMap {
    /// A map where every role in `roles` is unresolved.
    pub fn unresolved(roles: &[Role]) -> Self {
        Self {
            entries: roles.iter().map(|r| (*r, None)).collect(),
        }
    }

    /// Builds a map from explicit assignments; roles not listed stay unresolved.
    pub fn from_indices(roles: &[Role], indices: &[(Role, usize)]) -> Self {
        let mut map = Self::unresolved(roles);
        for (role, idx) in indices {
            map.set(*role, *idx);
        }
        map
    }

    pub fn get(&self, role: Role) -> Option<usize> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .and_then(|(_, idx)| *idx)
    }

    /// Assigns `role` to `index`. Roles outside the map are ignored.
    pub fn set(&mut self, role: Role, index: usize) {
        if let Some(entry) = self.entries.iter_mut().find(|(r, _)| *r == role) {
            entry.1 = Some(index);
        }
    }

    pub fn entries(&self) -> &[(Role, Option<usize>)] {
        &self.entries
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.iter().filter(|(_, idx)| idx.is_some()).count()
    }

    pub fn is_unresolved(&self) -> bool {
        self.resolved_count() == 0
    }

    /// Highest resolved column index, if any role is resolved.
    pub fn max_index(&self) -> Option<usize> {
        self.entries.iter().filter_map(|(_, idx)| *idx).max()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Assigns column indices to roles from a header row.
#[derive(Debug, Clone)]
pub struct ColumnRoleResolver {
    roles: Vec<Role>,
    rules: Vec<RoleRule>,
    conflict: HeaderConflict,
}

impl ColumnRoleResolver {
    /// Resolver with the built-in rules of `domain` and last-match-wins.
    pub fn for_domain(domain: Domain) -> Self {
        Self {
            roles: domain.roles().to_vec(),
            rules: default_rules(domain),
            conflict: HeaderConflict::default(),
        }
    }

    /// Replaces the rule table. Order is significant: the first rule matching
    /// a header cell decides that cell's role.
    pub fn with_rules(mut self, rules: Vec<RoleRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_conflict(mut self, conflict: HeaderConflict) -> Self {
        self.conflict = conflict;
        self
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Empty map over this resolver's roles.
    pub fn unresolved(&self) -> ColumnRoleMap {
        ColumnRoleMap::unresolved(&self.roles)
    }

    /// Resolves `header` into a role map. Never fails; a header matching no
    /// rule yields an all-unresolved map.
    pub fn resolve<S: AsRef<str>>(&self, header: &[S]) -> ColumnRoleMap {
        let mut map = self.unresolved();

        for (idx, cell) in header.iter().enumerate() {
            let label = cell.as_ref().trim().to_lowercase();
            if label.is_empty() {
                continue;
            }

            let Some(rule) = self.rules.iter().find(|rule| rule.matches(&label)) else {
                continue;
            };

            let role = rule.role();
            if self.conflict == HeaderConflict::FirstWins && map.get(role).is_some() {
                continue;
            }
            map.set(role, idx);
        }

        map
    }
}

// ============================================================================
// Tests
// ============================================================================
