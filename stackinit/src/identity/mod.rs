//! Identity domain: API client, credential store, key material and the
//! credential bootstrap.

mod bootstrap;
mod client;
mod credentials;
mod endpoint;
mod keys;

pub use bootstrap::{
    AdminCredentials, BootstrapReport, BootstrapState, CredentialBootstrap, PrincipalOutcome,
    PrincipalRequest, PrincipalState, credential_name, generate_secret,
};
pub use client::{
    IdentityApi, IssuedCredential, KeystoneClient, NewUser, PasswordAuth, Resource, Session,
};
pub use credentials::{ApplicationCredential, CredentialStore};
pub use endpoint::TransientIdentity;
pub use keys::{KeyRepository, KeySource, ensure_key_repository, generate_key};
