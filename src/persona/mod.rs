//! Persona system: the bundled roster of specialists and their dispatcher.
//!
//! Personas are read from `config/personas.toml` at build time, bound to the
//! shared model once at startup, and never change afterwards.

pub mod registry;
pub mod types;

pub use registry::{PersonaListing, PersonaRegistry};
pub use types::{Persona, PersonaDefinition, PersonaKind};
