//! Domain model — jobs, contacts, drafts, and approval sessions.

pub mod approval;
pub mod contact;
pub mod draft;
pub mod job;

pub use approval::{ApprovalOutcome, ApprovalSession, Decision, ThreadId};
pub use contact::{
    ConnectionDegree, Contact, ContactRole, ContactSource, ContactStatus, NewContact,
};
pub use draft::{CertificationSignal, MessageChannel, MessageDraft};
pub use job::{Job, JobStatus};
