//! Drive a chaincode through install, activation, and commit.
//!
//! An [Orchestrator] runs one deployment attempt against an open [Session]:
//!
//! 1. Install the chaincode on every peer of the target organization. Peers that already hold
//!    this exact id and version are absorbed as [Install::AlreadyInstalled].
//! 2. Propose an `upgrade`. If any peer rejects it, retain the rejection and propose an
//!    `instantiate` with the same arguments. If that is rejected as well, fail with both sets of
//!    failures ([Error::Deploy]).
//! 3. Submit the endorsements of whichever proposal succeeded for ordering and require the
//!    canonical success status.
//!
//! Phases run strictly in order and every phase is all-or-nothing: a single failing peer fails
//! the phase. Nothing is retried. [deploy] wraps an attempt with session acquisition and release.

use crate::{
    session::{
        Chaincode, Endorsement, Gateway, PeerTarget, ProposalResult, Session, Transaction,
        TransactionId, SUCCESS,
    },
    wallet::Store,
};
use attempt::{Attempt, State, Upgrade};
use rand::RngCore;
use std::{collections::HashSet, fmt};
use tracing::{debug, info, warn};

mod attempt;
mod error;

pub use error::{Error, PeerFailure, PhaseFailure};

/// Function invoked when activating a new version over a running one.
pub const UPGRADE: &str = "upgrade";

/// Function invoked when activating a chaincode for the first time on a channel.
pub const INSTANTIATE: &str = "instantiate";

/// Install error code reported by a peer that already holds the requested id and version.
pub const ALREADY_INSTALLED: &str = "ALREADY_INSTALLED";

/// Error code recorded for a targeted peer that returned no result.
pub const NO_RESPONSE: &str = "NO_RESPONSE";

/// Phase of a deployment attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Install,
    Upgrade,
    Instantiate,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Instantiate => "instantiate",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Path through which a chaincode version was activated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activation {
    Upgrade,
    Instantiate,
}

impl Activation {
    /// Returns the function name sent in the proposal.
    pub fn function(&self) -> &'static str {
        match self {
            Self::Upgrade => UPGRADE,
            Self::Instantiate => INSTANTIATE,
        }
    }

    /// Returns the phase that sends this proposal.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Upgrade => Phase::Upgrade,
            Self::Instantiate => Phase::Instantiate,
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function())
    }
}

/// Channel and organization a deployment targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub channel: String,

    /// MSP id of the organization whose peers install and endorse.
    pub organization: String,
}

/// Install outcome at one peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Install {
    Installed,
    AlreadyInstalled,
}

/// A committed deployment.
#[derive(Clone, Debug)]
pub struct Deployment {
    pub chaincode: String,
    pub version: String,
    pub channel: String,

    /// Install outcome per peer, in peer order.
    pub installs: Vec<(PeerTarget, Install)>,

    /// Proposal whose endorsements were committed.
    pub activation: Activation,
    pub tx_id: String,

    /// Results of the committed proposal (every one endorsed).
    pub results: Vec<ProposalResult>,
    pub endorsements: Vec<Endorsement>,

    /// Status returned by the ordering service.
    pub status: String,

    /// Results collected by every phase that ran, including a rejected upgrade.
    pub history: Vec<(Phase, Vec<ProposalResult>)>,
}

impl Deployment {
    /// Returns whether the ordering service accepted the activation.
    pub fn is_committed(&self) -> bool {
        self.status == SUCCESS
    }
}

/// Drop repeated peers while preserving discovery order.
fn distinct(peers: Vec<PeerTarget>) -> Vec<PeerTarget> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(peers.len());
    for peer in peers {
        if !seen.insert(peer.name.clone()) {
            warn!(peer = peer.name.as_str(), "skipping duplicate peer");
            continue;
        }
        unique.push(peer);
    }
    unique
}

/// Runs deployment attempts.
pub struct Orchestrator<R: RngCore + Send> {
    rng: R,
}

impl<R: RngCore + Send> Orchestrator<R> {
    /// Creates an orchestrator drawing transaction nonces from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Installs, activates, and commits `chaincode` on the peers of `target.organization`.
    ///
    /// The caller owns `session` and remains responsible for disconnecting it.
    pub async fn deploy_chaincode<S: Session>(
        &mut self,
        session: &mut S,
        target: &Target,
        chaincode: &Chaincode,
    ) -> Result<Deployment, Error> {
        if chaincode.version.trim().is_empty() {
            return Err(Error::VersionMissing(chaincode.id.clone()));
        }

        // Resolve peers and channel
        let peers = distinct(session.peers_for_org(&target.organization)?);
        if peers.is_empty() {
            return Err(crate::session::Error::Discovery(target.organization.clone()).into());
        }
        let mut channel = session.channel(&target.channel).await?;
        info!(
            chaincode = chaincode.id.as_str(),
            version = chaincode.version.as_str(),
            channel = target.channel.as_str(),
            organization = target.organization.as_str(),
            peers = peers.len(),
            "deploying chaincode"
        );
        let mut attempt = Attempt::new(chaincode, peers);

        // Install
        let installs = attempt.install(&mut channel).await?;

        // Upgrade, falling back to instantiate
        let tx_id = TransactionId::generate(&mut self.rng, session.identity());
        let endorsed = match attempt.upgrade(&mut channel, tx_id).await? {
            Upgrade::Endorsed(endorsed) => endorsed,
            Upgrade::Rejected(failure) => {
                let tx_id = TransactionId::generate(&mut self.rng, session.identity());
                attempt.instantiate(&mut channel, tx_id, failure).await?
            }
        };

        // Commit
        let activation = endorsed.activation;
        let tx_id = endorsed.proposal.tx_id.to_string();
        let transaction = Transaction {
            proposal: endorsed.proposal,
            endorsements: endorsed.endorsements.clone(),
        };
        let status = attempt
            .commit(&mut channel, activation, transaction, endorsed.history)
            .await?;
        debug_assert_eq!(attempt.state(), State::Done);
        info!(
            chaincode = chaincode.id.as_str(),
            version = chaincode.version.as_str(),
            %activation,
            tx_id = tx_id.as_str(),
            "deployed chaincode"
        );
        Ok(Deployment {
            chaincode: chaincode.id.clone(),
            version: chaincode.version.clone(),
            channel: target.channel.clone(),
            installs,
            activation,
            tx_id,
            results: endorsed.results,
            endorsements: endorsed.endorsements,
            status,
            history: attempt.into_records(),
        })
    }
}

/// Deploys `chaincode` as the wallet identity `identity`.
///
/// The session opened for the attempt is disconnected exactly once, whatever the outcome.
pub async fn deploy<W: Store, G: Gateway, R: RngCore + Send>(
    wallet: &W,
    gateway: &G,
    rng: R,
    identity: &str,
    target: &Target,
    chaincode: &Chaincode,
) -> Result<Deployment, Error> {
    if !wallet.exists(identity)? {
        return Err(Error::IdentityMissing(identity.to_string()));
    }
    let identity = wallet.get(identity)?;
    debug!(
        name = identity.name.as_str(),
        msp_id = identity.msp_id.as_str(),
        "connecting"
    );
    let mut session = gateway.connect(identity).await?;
    let result = Orchestrator::new(rng)
        .deploy_chaincode(&mut session, target, chaincode)
        .await;
    session.disconnect().await;
    debug!("disconnected");
    result
}
