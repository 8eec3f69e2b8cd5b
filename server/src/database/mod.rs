/// Collaborators the HTTP layer talks to: credential lookup, admin-editable
/// resources and the contact-form sink.
pub mod contact;
pub mod credentials;
pub mod resources;

pub use contact::{ContactSink, TracingContactSink};
pub use credentials::{
    CredentialStore, InMemoryCredentialStore, SqliteCredentialStore, StoredCredential,
};
pub use resources::{InMemoryResourceStore, ResourceStore};
