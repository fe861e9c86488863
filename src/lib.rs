//! LexAI contract audit engine.
//!
//! Ingests contract text, obtains AI-generated risk findings, masks personal
//! identifiers for LGPD compliance, overlays risk highlights onto the
//! rendered document and keeps a document-scoped assistant conversation.

pub mod config;
pub mod error;
pub mod legal;
pub mod llm;
pub mod settings;

pub use config::Config;
pub use legal::desk::{AuditDesk, DeskOptions};
pub use settings::Settings;
