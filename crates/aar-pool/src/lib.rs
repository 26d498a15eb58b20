//! Credential pool, ban registry and per-model routing.
//!
//! The pool owns all mutable credential bookkeeping. Secrets themselves are
//! immutable after startup; only ban state, failure counters and recency
//! change at runtime.

pub mod bindings;
pub mod credential;

pub use bindings::{ModelBinding, ModelCapabilities, ModelTable, Provider};
pub use credential::{
    ApiKeyCredential, BanReason, Credential, CredentialId, CredentialPool, CredentialState,
    PickError, PoolSnapshot, ServiceAccountCredential,
};
