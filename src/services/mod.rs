pub mod journal_service;
pub mod saga;

pub use journal_service::JournalService;
pub use saga::{pending_compensation, Compensation, SagaState};
