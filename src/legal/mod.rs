pub mod analysis;
pub mod audit;
pub mod chat;
pub mod desk;
pub mod document;
pub mod overlay;
pub mod redaction;
pub mod risk;
pub mod session;
