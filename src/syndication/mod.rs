pub mod catalog;
pub mod checker;
pub mod probe;

pub use catalog::{CatalogEntry, SyndicationCatalog};
pub use checker::{HttpPresenceChecker, PresenceCheck};
pub use probe::SyndicationProber;
