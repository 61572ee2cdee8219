//! Fundamental domain types for diagram scoring.
//!
//! A diagram decomposes into three component categories (actors, use cases,
//! relationships). Component identity within a [`ComponentSet`] is the
//! normalized name plus category; duplicate declarations fold into aliases.

use serde::{Deserialize, Serialize};

/// Diagram-type tags accepted at the pipeline boundary.
///
/// Only `UseCase` diagrams are scorable; `Class` and `Sequence` are
/// recognized by auto-detection so the caller gets a precise validation
/// error instead of nonsense scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    UseCase,
    Class,
    Sequence,
}

impl DiagramType {
    /// Stable wire tag for this diagram type.
    pub fn tag(&self) -> &'static str {
        match self {
            DiagramType::UseCase => "use_case",
            DiagramType::Class => "class",
            DiagramType::Sequence => "sequence",
        }
    }

    /// Whether the scoring pipeline supports this diagram type.
    pub fn is_scorable(&self) -> bool {
        matches!(self, DiagramType::UseCase)
    }
}

/// The three component categories of a use-case diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    Actor,
    UseCase,
    Relationship,
}

impl ComponentCategory {
    pub fn tag(&self) -> &'static str {
        match self {
            ComponentCategory::Actor => "actor",
            ComponentCategory::UseCase => "use_case",
            ComponentCategory::Relationship => "relationship",
        }
    }

    /// All categories in scoring order.
    pub const ALL: [ComponentCategory; 3] = [
        ComponentCategory::Actor,
        ComponentCategory::UseCase,
        ComponentCategory::Relationship,
    ];
}

impl std::fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Relationship kinds recognized in use-case diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    #[default]
    Association,
    Include,
    Extend,
    Generalization,
}

impl RelationKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RelationKind::Association => "association",
            RelationKind::Include => "include",
            RelationKind::Extend => "extend",
            RelationKind::Generalization => "generalization",
        }
    }

    /// Parse a kind from free-form text (model output or arrow labels).
    /// Unrecognized kinds fall back to plain association.
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.contains("include") {
            RelationKind::Include
        } else if lower.contains("extend") {
            RelationKind::Extend
        } else if lower.contains("general") || lower.contains("inherit") {
            RelationKind::Generalization
        } else {
            RelationKind::Association
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// An actor: an entity outside the system that interacts with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            aliases: Vec::new(),
        }
    }
}

/// A use case: a unit of system functionality offered to actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl UseCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            aliases: Vec::new(),
        }
    }
}

/// A directed relationship between two named components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub kind: RelationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Relationship {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            label: None,
        }
    }

    /// Identity key for a relationship: folded endpoints plus kind.
    pub fn key(&self) -> String {
        format!(
            "{}->{}:{}",
            normalize_name(&self.source),
            normalize_name(&self.target),
            self.kind
        )
    }
}

/// A diagram component of any category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum DiagramComponent {
    Actor(Actor),
    UseCase(UseCase),
    Relationship(Relationship),
}

impl DiagramComponent {
    pub fn category(&self) -> ComponentCategory {
        match self {
            DiagramComponent::Actor(_) => ComponentCategory::Actor,
            DiagramComponent::UseCase(_) => ComponentCategory::UseCase,
            DiagramComponent::Relationship(_) => ComponentCategory::Relationship,
        }
    }

    /// Display name; for relationships this is the identity key.
    pub fn name(&self) -> String {
        match self {
            DiagramComponent::Actor(a) => a.name.clone(),
            DiagramComponent::UseCase(u) => u.name.clone(),
            DiagramComponent::Relationship(r) => r.key(),
        }
    }
}

/// Fold a component name for identity comparison: lowercase, collapse
/// whitespace runs, strip punctuation.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if ch.is_whitespace() || ch.is_ascii_punctuation() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// A named collection of components extracted from one source, one
/// collection per category.
///
/// Invariant: within one category, no two entries share a normalized name.
/// Re-inserting an existing name folds the duplicate into the original's
/// aliases instead of creating a second entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSet {
    /// Side label, e.g. "student diagram" or "reference".
    pub name: String,
    pub actors: Vec<Actor>,
    pub use_cases: Vec<UseCase>,
    pub relationships: Vec<Relationship>,
}

impl ComponentSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Insert an actor, folding duplicates by normalized name.
    pub fn push_actor(&mut self, actor: Actor) {
        let key = normalize_name(&actor.name);
        if key.is_empty() {
            return;
        }
        if let Some(existing) = self
            .actors
            .iter_mut()
            .find(|a| normalize_name(&a.name) == key)
        {
            if actor.name != existing.name && !existing.aliases.contains(&actor.name) {
                existing.aliases.push(actor.name);
            }
            return;
        }
        self.actors.push(actor);
    }

    /// Insert a use case, folding duplicates by normalized name.
    pub fn push_use_case(&mut self, use_case: UseCase) {
        let key = normalize_name(&use_case.name);
        if key.is_empty() {
            return;
        }
        if let Some(existing) = self
            .use_cases
            .iter_mut()
            .find(|u| normalize_name(&u.name) == key)
        {
            if use_case.name != existing.name && !existing.aliases.contains(&use_case.name) {
                existing.aliases.push(use_case.name);
            }
            return;
        }
        self.use_cases.push(use_case);
    }

    /// Insert a relationship, ignoring exact duplicates by identity key.
    pub fn push_relationship(&mut self, relationship: Relationship) {
        if normalize_name(&relationship.source).is_empty()
            || normalize_name(&relationship.target).is_empty()
        {
            return;
        }
        let key = relationship.key();
        if self.relationships.iter().any(|r| r.key() == key) {
            return;
        }
        self.relationships.push(relationship);
    }

    /// Total component count across all categories.
    pub fn len(&self) -> usize {
        self.actors.len() + self.use_cases.len() + self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-category counts in scoring order (actors, use cases, relationships).
    pub fn category_counts(&self) -> [usize; 3] {
        [
            self.actors.len(),
            self.use_cases.len(),
            self.relationships.len(),
        ]
    }
}
