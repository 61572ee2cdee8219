//! Code-based parser for use-case diagram source.
//!
//! Extracts actors, use cases, and relationships from PlantUML-style source
//! text without a model call. The pipeline uses it for input validation,
//! diagram-type detection, and the normalizer's semantics-preserved guard;
//! it is deliberately tolerant of sloppy student syntax.

use crate::types::{
    Actor, ComponentSet, DiagramType, Relationship, RelationKind, UseCase,
};
use regex::Regex;
use std::collections::HashMap;

/// Parser for use-case diagram source text.
pub struct UseCaseParser {
    actor_decl: Regex,
    actor_colon: Regex,
    usecase_decl: Regex,
    usecase_paren: Regex,
    relationship: Regex,
    stereotype: Regex,
}

impl Default for UseCaseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl UseCaseParser {
    pub fn new() -> Self {
        Self {
            // actor Name | actor "Some Name" | actor "Some Name" as A1 | actor Name as A1
            actor_decl: Regex::new(
                r#"(?i)^\s*actor\s+(?:"([^"]+)"|(\S+))(?:\s+as\s+(\w+))?\s*$"#,
            )
            .unwrap(),
            // :Actor Name: [as A1]
            actor_colon: Regex::new(r#"^\s*:([^:]+):(?:\s+as\s+(\w+))?\s*$"#).unwrap(),
            // usecase Name | usecase "Some Name" as UC1
            usecase_decl: Regex::new(
                r#"(?i)^\s*usecase\s+(?:"([^"]+)"|\(([^)]+)\)|(\S+))(?:\s+as\s+(\w+))?\s*$"#,
            )
            .unwrap(),
            // (Use Case Name) [as UC1]
            usecase_paren: Regex::new(r#"^\s*\(([^)]+)\)(?:\s+as\s+(\w+))?\s*$"#).unwrap(),
            // A --> B : label, A ..> B : <<include>>, A --|> B, A -- B
            relationship: Regex::new(
                r#"^\s*(.+?)\s*(-+\|>|\.+\|>|<\|-+|-+>|\.+>|<-+|<\.+|-{2,})\s*(.+?)(?:\s*:\s*(.+))?\s*$"#,
            )
            .unwrap(),
            stereotype: Regex::new(r"<<\s*(\w+)\s*>>").unwrap(),
        }
    }

    /// Parse diagram source into a component set labeled `name`.
    pub fn parse(&self, source: &str, name: &str) -> ComponentSet {
        let mut set = ComponentSet::new(name);
        // alias -> display name, so relationships can reference declarations
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut deferred_relationships: Vec<(String, String, String, Option<String>)> = Vec::new();

        for line in Self::clean_source(source).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = self.actor_decl.captures(line) {
                let display = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| Self::strip_name(m.as_str()))
                    .unwrap_or_default();
                if !display.is_empty() {
                    if let Some(alias) = caps.get(3) {
                        aliases.insert(alias.as_str().to_string(), display.clone());
                    }
                    set.push_actor(Actor::new(display));
                }
                continue;
            }

            if let Some(caps) = self.actor_colon.captures(line) {
                let display = Self::strip_name(&caps[1]);
                if !display.is_empty() {
                    if let Some(alias) = caps.get(2) {
                        aliases.insert(alias.as_str().to_string(), display.clone());
                    }
                    set.push_actor(Actor::new(display));
                }
                continue;
            }

            if let Some(caps) = self.usecase_decl.captures(line) {
                let display = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| Self::strip_name(m.as_str()))
                    .unwrap_or_default();
                if !display.is_empty() {
                    if let Some(alias) = caps.get(4) {
                        aliases.insert(alias.as_str().to_string(), display.clone());
                    }
                    set.push_use_case(UseCase::new(display));
                }
                continue;
            }

            if let Some(caps) = self.usecase_paren.captures(line) {
                let display = Self::strip_name(&caps[1]);
                if !display.is_empty() {
                    if let Some(alias) = caps.get(2) {
                        aliases.insert(alias.as_str().to_string(), display.clone());
                    }
                    set.push_use_case(UseCase::new(display));
                }
                continue;
            }

            if let Some(caps) = self.relationship.captures(line) {
                let lhs = Self::strip_name(&caps[1]);
                let arrow = caps[2].to_string();
                let rhs = Self::strip_name(&caps[3]);
                let label = caps.get(4).map(|m| m.as_str().trim().to_string());
                if !lhs.is_empty() && !rhs.is_empty() {
                    // Endpoints may be declared later in the source.
                    deferred_relationships.push((lhs, arrow, rhs, label));
                }
                continue;
            }
        }

        for (lhs, arrow, rhs, label) in deferred_relationships {
            let lhs = Self::resolve(&aliases, lhs);
            let rhs = Self::resolve(&aliases, rhs);
            let kind = self.relation_kind(&arrow, label.as_deref());

            // Left-pointing arrows reverse source and target.
            let (source, target) = if arrow.starts_with('<') {
                (rhs, lhs)
            } else {
                (lhs, rhs)
            };

            // Endpoints referenced only in relationships still count as
            // components: bare single-token names on the actor side of an
            // association are commonly undeclared actors.
            let mut rel = Relationship::new(source, target, kind);
            rel.label = label;
            set.push_relationship(rel);
        }

        set
    }

    /// Detect the diagram type from source keywords.
    pub fn detect_diagram_type(source: &str) -> DiagramType {
        let cleaned = Self::clean_source(source).to_lowercase();
        for line in cleaned.lines() {
            let line = line.trim_start();
            if line.starts_with("class ") || line.starts_with("interface ") {
                return DiagramType::Class;
            }
            if line.starts_with("participant ") || line.starts_with("autonumber") {
                return DiagramType::Sequence;
            }
        }
        DiagramType::UseCase
    }

    /// Strip comments and `@startuml`/`@enduml` markers.
    fn clean_source(source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        for line in source.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('\'')
                || trimmed.to_lowercase().starts_with("@startuml")
                || trimmed.to_lowercase().starts_with("@enduml")
            {
                continue;
            }
            // Trailing comment
            let line = match line.find('\'') {
                Some(idx) => &line[..idx],
                None => line,
            };
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Strip quotes, parens, and colon markers from a referenced name.
    fn strip_name(raw: &str) -> String {
        raw.trim()
            .trim_matches(|c| matches!(c, '"' | '\'' | '(' | ')' | ':' | '[' | ']'))
            .trim()
            .to_string()
    }

    fn resolve(aliases: &HashMap<String, String>, name: String) -> String {
        aliases.get(&name).cloned().unwrap_or(name)
    }

    fn relation_kind(&self, arrow: &str, label: Option<&str>) -> RelationKind {
        if let Some(label) = label {
            if let Some(caps) = self.stereotype.captures(label) {
                return RelationKind::parse(&caps[1]);
            }
            let parsed = RelationKind::parse(label);
            if parsed != RelationKind::Association {
                return parsed;
            }
        }
        if arrow.contains("|>") || arrow.contains("<|") {
            RelationKind::Generalization
        } else {
            RelationKind::Association
        }
    }
}
