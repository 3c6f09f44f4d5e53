//! Authenticated sessions with a permissioned ledger network.
//!
//! A [Gateway] turns an [Identity] into a connected [Session]. A [Session] is bound to that one
//! identity for its whole life (reconnecting as someone else requires a new [Session]) and must
//! be released with [Session::disconnect] on every exit path.
//!
//! Within a session, a [Channel] exposes the lifecycle calls (install, upgrade/instantiate
//! proposals, ordering) and a [Contract] exposes application transactions. Every call that
//! fans out to multiple peers returns one [ProposalResult] per targeted peer; how the underlying
//! transport parallelizes that fan-out is not observable here.

use crate::wallet::Identity;
use bytes::Bytes;
use commonware_utils::hex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, future::Future, path::PathBuf};
use thiserror::Error;

/// Status returned by the ordering service when a transaction was accepted.
pub const SUCCESS: &str = "SUCCESS";

/// Length of the random nonce mixed into every [TransactionId].
pub const NONCE_LENGTH: usize = 24;

/// Errors that can occur when interacting with a [Session].
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("no peers found for organization: {0}")]
    Discovery(String),
    #[error("channel unavailable: {0}: {1}")]
    Channel(String, String),
    #[error("contract not found: {1} on channel {0}")]
    ContractNotFound(String, String),
    #[error("transport failed: {0}")]
    Transport(String),
}

/// Runtime a chaincode is written for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Golang,
    Node,
    Java,
    Car,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Golang => "golang",
            Self::Node => "node",
            Self::Java => "java",
            Self::Car => "car",
        };
        f.write_str(name)
    }
}

/// Everything needed to install and activate one version of a chaincode.
///
/// The `version` is the correlation key across install, upgrade, and instantiate, so a
/// [Chaincode] is only ever constructed with its version already resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chaincode {
    pub id: String,
    pub version: String,
    pub path: PathBuf,
    pub language: Language,

    /// Arguments passed to the `upgrade` or `instantiate` function.
    pub args: Vec<String>,
}

/// A peer that can endorse proposals.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerTarget {
    pub name: String,
    pub url: String,
}

impl fmt::Display for PeerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// An error reported by a single peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerError {
    pub code: String,
    pub message: String,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A peer's signed response to a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endorsement {
    pub peer: String,
    pub payload: Bytes,
}

/// Outcome of a proposal at one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Endorsed(Endorsement),
    Rejected(PeerError),
}

/// The response of the peer at index `peer` of the request's targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposalResult {
    pub peer: usize,
    pub response: Response,
}

impl ProposalResult {
    /// Creates a successful result.
    pub fn endorsed(peer: usize, endorsement: Endorsement) -> Self {
        Self {
            peer,
            response: Response::Endorsed(endorsement),
        }
    }

    /// Creates a failed result.
    pub fn rejected(peer: usize, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            peer,
            response: Response::Rejected(PeerError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Returns whether the peer endorsed the proposal.
    pub fn is_success(&self) -> bool {
        matches!(self.response, Response::Endorsed(_))
    }
}

/// Unique identifier of a proposal (and of the transaction that commits it).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId {
    id: String,
    nonce: [u8; NONCE_LENGTH],
}

impl TransactionId {
    /// Generates a new id for a proposal signed by `creator`.
    ///
    /// The id is `hex(sha256(nonce || certificate))`.
    pub fn generate<R: RngCore>(rng: &mut R, creator: &Identity) -> Self {
        let mut nonce = [0u8; NONCE_LENGTH];
        rng.fill_bytes(&mut nonce);
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(creator.certificate.as_bytes());
        Self {
            id: hex(&hasher.finalize()),
            nonce,
        }
    }

    /// Returns the hex-encoded id.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Returns the nonce the id was derived from.
    pub fn nonce(&self) -> &[u8; NONCE_LENGTH] {
        &self.nonce
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Request to install a chaincode on a set of peers.
#[derive(Clone, Debug)]
pub struct InstallRequest {
    pub targets: Vec<PeerTarget>,
    pub chaincode: Chaincode,
    pub channels: Vec<String>,
}

/// Request to endorse the activation of a chaincode version on a channel.
#[derive(Clone, Debug)]
pub struct ProposalRequest {
    pub targets: Vec<PeerTarget>,
    pub chaincode: Chaincode,

    /// Function invoked on activation (`upgrade` or `instantiate`).
    pub function: String,
    pub tx_id: TransactionId,
}

/// Opaque proposal context returned alongside proposal results and required to order them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub tx_id: TransactionId,
    pub function: String,
    pub payload: Bytes,
}

/// Endorsements submitted for ordering.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub proposal: Proposal,
    pub endorsements: Vec<Endorsement>,
}

/// Whether an application transaction succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

/// Result of an application transaction, as returned by the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub status: Status,
    pub response: Bytes,
}

/// Establishes [Session]s with the network.
pub trait Gateway: Send + Sync {
    /// The [Session] produced by this gateway.
    type Session: Session;

    /// Connects to the network as `identity`.
    fn connect(
        &self,
        identity: Identity,
    ) -> impl Future<Output = Result<Self::Session, Error>> + Send;
}

/// A live, authenticated connection bound to one [Identity].
pub trait Session: Send {
    /// The [Channel] handle type.
    type Channel: Channel;

    /// The [Contract] handle type.
    type Contract: Contract;

    /// Returns the identity this session is authenticated as.
    fn identity(&self) -> &Identity;

    /// Returns the peers of the organization identified by `msp_id`, in discovery order.
    ///
    /// Fails with [Error::Discovery] if the organization has no peers.
    fn peers_for_org(&self, msp_id: &str) -> Result<Vec<PeerTarget>, Error>;

    /// Returns a handle to `channel`.
    fn channel(
        &mut self,
        channel: &str,
    ) -> impl Future<Output = Result<Self::Channel, Error>> + Send;

    /// Returns a handle to the contract `id` deployed on `channel`.
    fn contract(
        &mut self,
        channel: &str,
        id: &str,
    ) -> impl Future<Output = Result<Self::Contract, Error>> + Send;

    /// Releases the connection.
    fn disconnect(self) -> impl Future<Output = ()> + Send;
}

/// Lifecycle operations on one channel.
pub trait Channel: Send {
    /// Returns the channel name.
    fn name(&self) -> &str;

    /// Installs a chaincode on every target, returning one result per target.
    fn install(
        &mut self,
        request: InstallRequest,
    ) -> impl Future<Output = Result<Vec<ProposalResult>, Error>> + Send;

    /// Proposes upgrading the channel to the requested chaincode version.
    fn send_upgrade_proposal(
        &mut self,
        request: ProposalRequest,
    ) -> impl Future<Output = Result<(Vec<ProposalResult>, Proposal), Error>> + Send;

    /// Proposes the first activation of the requested chaincode version on the channel.
    fn send_instantiate_proposal(
        &mut self,
        request: ProposalRequest,
    ) -> impl Future<Output = Result<(Vec<ProposalResult>, Proposal), Error>> + Send;

    /// Submits endorsements for ordering, returning the ordering status.
    fn send_transaction(
        &mut self,
        transaction: Transaction,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

/// Application transactions against a deployed chaincode.
pub trait Contract: Send {
    /// Submits a transaction that is endorsed, ordered, and committed.
    fn submit(
        &mut self,
        function: &str,
        args: &[String],
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;

    /// Evaluates a transaction on a single peer without ordering it.
    fn evaluate(
        &mut self,
        function: &str,
        args: &[String],
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use rand::{rngs::StdRng, SeedableRng};

    fn creator(certificate: &str) -> Identity {
        Identity {
            name: "user1".to_string(),
            msp_id: "Org1MSP".to_string(),
            certificate: certificate.to_string(),
            private_key: "key".to_string(),
        }
    }

    #[test_traced]
    fn test_transaction_id_matches_nonce_and_creator() {
        let mut rng = StdRng::seed_from_u64(0);
        let identity = creator("certificate");
        let tx_id = TransactionId::generate(&mut rng, &identity);

        let mut hasher = Sha256::new();
        hasher.update(tx_id.nonce());
        hasher.update(b"certificate");
        assert_eq!(tx_id.as_str(), hex(&hasher.finalize()));
        assert_eq!(tx_id.as_str().len(), 64);
        assert_eq!(tx_id.to_string(), tx_id.as_str());
    }

    #[test_traced]
    fn test_transaction_ids_are_unique() {
        let mut rng = StdRng::seed_from_u64(0);
        let identity = creator("certificate");
        let first = TransactionId::generate(&mut rng, &identity);
        let second = TransactionId::generate(&mut rng, &identity);
        assert_ne!(first, second);

        // The same nonce under a different creator yields a different id
        let mut rng = StdRng::seed_from_u64(0);
        let other = TransactionId::generate(&mut rng, &creator("other"));
        assert_eq!(first.nonce(), other.nonce());
        assert_ne!(first.as_str(), other.as_str());
    }

    #[test_traced]
    fn test_language_serialization() {
        assert_eq!(serde_json::to_string(&Language::Node).unwrap(), "\"node\"");
        assert_eq!(
            serde_json::from_str::<Language>("\"golang\"").unwrap(),
            Language::Golang
        );
        assert!(serde_json::from_str::<Language>("\"python\"").is_err());
        assert_eq!(Language::Java.to_string(), "java");
    }

    #[test_traced]
    fn test_proposal_result_constructors() {
        let endorsed = ProposalResult::endorsed(
            0,
            Endorsement {
                peer: "peer0".to_string(),
                payload: Bytes::from_static(b"signed"),
            },
        );
        assert!(endorsed.is_success());

        let rejected = ProposalResult::rejected(1, "CODE", "message");
        assert!(!rejected.is_success());
        assert_eq!(
            rejected.response,
            Response::Rejected(PeerError {
                code: "CODE".to_string(),
                message: "message".to_string(),
            })
        );
    }
}
