//! Bundled persona registry: parses the roster file and wires the dispatcher.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::types::{Persona, PersonaDefinition, PersonaKind};
use crate::error::{Error, Result};
use crate::model::SharedModel;

const BUNDLED_ROSTER: &str = include_str!("../../config/personas.toml");

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    persona: Vec<PersonaDefinition>,
}

/// Validated persona definitions, one per kind.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    definitions: Vec<PersonaDefinition>,
}

impl PersonaRegistry {
    /// Registry over the roster compiled into the binary.
    pub fn bundled() -> Result<Self> {
        Self::parse(BUNDLED_ROSTER)
    }

    /// Parse and validate a roster: every kind exactly once, no blank fields.
    pub fn parse(content: &str) -> Result<Self> {
        let roster: RosterFile = toml::from_str(content).map_err(|e| Error::PersonaInvalid {
            message: e.message().to_string(),
        })?;

        let mut seen = HashSet::new();
        for def in &roster.persona {
            if !seen.insert(def.kind) {
                return Err(Error::PersonaInvalid {
                    message: format!("persona '{}' is defined twice", def.kind.slug()),
                });
            }
            if def.name.trim().is_empty() || def.instructions.trim().is_empty() {
                return Err(Error::PersonaInvalid {
                    message: format!("persona '{}' needs a name and instructions", def.kind.slug()),
                });
            }
        }
        if let Some(missing) = PersonaKind::all().iter().find(|k| !seen.contains(k)) {
            return Err(Error::PersonaInvalid {
                message: format!("persona '{}' is missing", missing.slug()),
            });
        }

        Ok(Self {
            definitions: roster.persona,
        })
    }

    pub fn definition(&self, kind: PersonaKind) -> Option<&PersonaDefinition> {
        self.definitions.iter().find(|d| d.kind == kind)
    }

    /// Instantiate the roster on one model and return the dispatcher.
    ///
    /// The dispatcher's delegates follow `PersonaKind::leaves()` order.
    pub fn build(&self, model: SharedModel) -> Result<Arc<Persona>> {
        let mut delegates = Vec::with_capacity(PersonaKind::leaves().len());
        for kind in PersonaKind::leaves() {
            let def = self.require(*kind)?;
            delegates.push(Arc::new(Persona::new(def.clone(), model.clone(), Vec::new())));
        }

        let dispatcher = Persona::new(
            self.require(PersonaKind::Dispatcher)?.clone(),
            model,
            delegates,
        );
        debug!(
            dispatcher = %dispatcher.name,
            delegates = dispatcher.handoffs.len(),
            "Persona roster built"
        );
        Ok(Arc::new(dispatcher))
    }

    fn require(&self, kind: PersonaKind) -> Result<&PersonaDefinition> {
        self.definition(kind).ok_or_else(|| Error::PersonaInvalid {
            message: format!("persona '{}' is missing", kind.slug()),
        })
    }

    /// List every persona with what it handles.
    pub fn list_available(&self) -> Vec<PersonaListing> {
        PersonaKind::all()
            .iter()
            .filter_map(|kind| self.definition(*kind))
            .map(|def| PersonaListing {
                kind: def.kind,
                name: def.name.clone(),
                description: def.handoff_description.clone(),
                tool: (!def.kind.is_dispatcher()).then(|| def.kind.handoff_tool_name()),
            })
            .collect()
    }
}

/// Summary of a persona for `supreme-chat personas`.
#[derive(Debug, Clone)]
pub struct PersonaListing {
    pub kind: PersonaKind,
    pub name: String,
    pub description: String,
    /// Handoff tool name; `None` for the dispatcher
    pub tool: Option<String>,
}
