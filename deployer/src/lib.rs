//! Deploy and invoke chaincode on a permissioned ledger network.
//!
//! The centerpiece of this crate is the chaincode [lifecycle] orchestrator. Given a connected
//! [session::Session], it installs a chaincode version on every peer of an organization, activates
//! that version on a channel (trying `upgrade` first and falling back to `instantiate` when the
//! channel has never run the chaincode), and submits the collected endorsements for ordering.
//!
//! Around the orchestrator sit the collaborators it needs:
//!
//! - [wallet]: named signing identities (filesystem or in-memory).
//! - [authority]: certificate authority enrollment/registration and the bootstrap workflows that
//!   populate a [wallet].
//! - [profile]: network topology (organizations, peers, certificate authorities).
//! - [config]: explicit run configuration and chaincode descriptor resolution.
//! - [invoke]: single-call transaction submission against a deployed contract.
//! - [simulated]: a deterministic in-memory network implementing every collaborator trait.
//! - [rehearsal]: configuration checks and dry runs against the [simulated] network.
//!
//! # Status
//!
//! `chaincode-deployer` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

pub mod authority;
pub mod config;
pub mod invoke;
pub mod lifecycle;
pub mod profile;
pub mod rehearsal;
pub mod session;
pub mod simulated;
pub mod wallet;
