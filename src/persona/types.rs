//! Core types for the persona system.
//!
//! A persona is a named instruction set bound to the shared model. Five
//! specialists answer questions; the dispatcher only routes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{SharedModel, ToolSpec};

// ─────────────────────────────────────────────────────────────────
// Persona Kind
// ─────────────────────────────────────────────────────────────────

/// The six personas of the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersonaKind {
    /// General knowledge, science and philosophy.
    KnowledgeMaster,
    /// Writing, debugging and explaining code.
    CodeGenius,
    /// Health, medicine and biology.
    MedicalAi,
    /// History and politics.
    HistoryPolitics,
    /// World events, weather and news.
    GlobalAi,
    /// Routes each request to one of the above.
    #[serde(rename = "supreme-ai")]
    Dispatcher,
}

impl PersonaKind {
    /// Slug used in the roster file and CLI output.
    pub fn slug(&self) -> &'static str {
        match self {
            PersonaKind::KnowledgeMaster => "knowledge-master",
            PersonaKind::CodeGenius => "code-genius",
            PersonaKind::MedicalAi => "medical-ai",
            PersonaKind::HistoryPolitics => "history-politics",
            PersonaKind::GlobalAi => "global-ai",
            PersonaKind::Dispatcher => "supreme-ai",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            PersonaKind::KnowledgeMaster => "Knowledge Master",
            PersonaKind::CodeGenius => "Code Genius",
            PersonaKind::MedicalAi => "Medical AI",
            PersonaKind::HistoryPolitics => "History & Politics Expert",
            PersonaKind::GlobalAi => "Global AI",
            PersonaKind::Dispatcher => "Supreme AI",
        }
    }

    /// The specialists, in delegate order.
    pub fn leaves() -> &'static [PersonaKind] {
        &[
            PersonaKind::KnowledgeMaster,
            PersonaKind::CodeGenius,
            PersonaKind::MedicalAi,
            PersonaKind::HistoryPolitics,
            PersonaKind::GlobalAi,
        ]
    }

    /// Dispatcher first, then the specialists.
    pub fn all() -> &'static [PersonaKind] {
        &[
            PersonaKind::Dispatcher,
            PersonaKind::KnowledgeMaster,
            PersonaKind::CodeGenius,
            PersonaKind::MedicalAi,
            PersonaKind::HistoryPolitics,
            PersonaKind::GlobalAi,
        ]
    }

    pub fn is_dispatcher(&self) -> bool {
        matches!(self, PersonaKind::Dispatcher)
    }

    /// Function tool the dispatcher calls to hand off to this persona.
    pub fn handoff_tool_name(&self) -> String {
        format!("transfer_to_{}", self.slug().replace('-', "_"))
    }
}

impl fmt::Display for PersonaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for PersonaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");
        PersonaKind::all()
            .iter()
            .copied()
            .find(|kind| kind.slug() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = PersonaKind::all().iter().map(|k| k.slug()).collect();
                format!("Unknown persona '{}'. Valid: {}", s, valid.join(", "))
            })
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona Definition (loaded from TOML)
// ─────────────────────────────────────────────────────────────────

/// One `[[persona]]` entry of the roster file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaDefinition {
    pub kind: PersonaKind,

    /// Display name; also the author shown on replies
    pub name: String,

    /// What the dispatcher reads when choosing a delegate
    #[serde(default)]
    pub handoff_description: String,

    /// System prompt for this persona
    pub instructions: String,
}

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// A persona ready to run. Immutable once built and shared by all sessions.
pub struct Persona {
    pub kind: PersonaKind,
    pub name: String,
    pub handoff_description: String,
    pub instructions: String,
    pub model: SharedModel,
    /// Delegates this persona may hand off to (empty for specialists)
    pub handoffs: Vec<Arc<Persona>>,
}

impl Persona {
    pub fn new(definition: PersonaDefinition, model: SharedModel, handoffs: Vec<Arc<Persona>>) -> Self {
        Self {
            kind: definition.kind,
            name: definition.name,
            handoff_description: definition.handoff_description,
            instructions: definition.instructions,
            model,
            handoffs,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.handoffs.is_empty()
    }

    /// Handoff tools offered to the model when this persona runs
    pub fn handoff_tools(&self) -> Vec<ToolSpec> {
        self.handoffs
            .iter()
            .map(|delegate| ToolSpec {
                name: delegate.kind.handoff_tool_name(),
                description: format!(
                    "Handoff to the {} agent to handle the request. {}",
                    delegate.name, delegate.handoff_description
                ),
            })
            .collect()
    }

    /// Resolve a tool call name to one of this persona's delegates
    pub fn delegate_for_tool(&self, tool: &str) -> Option<&Arc<Persona>> {
        self.handoffs
            .iter()
            .find(|delegate| delegate.kind.handoff_tool_name() == tool)
    }
}

impl fmt::Debug for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persona")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("model", &self.model.model_id())
            .field(
                "handoffs",
                &self.handoffs.iter().map(|h| h.kind).collect::<Vec<_>>(),
            )
            .finish()
    }
}
