use super::{Activation, Phase};
use crate::{
    session::{self, PeerError, PeerTarget},
    wallet,
};
use std::fmt;
use thiserror::Error;

/// A peer that failed a phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerFailure {
    pub peer: PeerTarget,
    pub code: String,
    pub message: String,
}

impl PeerFailure {
    pub(super) fn new(peer: &PeerTarget, error: PeerError) -> Self {
        Self {
            peer: peer.clone(),
            code: error.code,
            message: error.message,
        }
    }
}

impl fmt::Display for PeerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}: {})", self.peer.name, self.code, self.message)
    }
}

/// Every peer that failed one phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub failures: Vec<PeerFailure>,
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.phase)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

fn join(details: &[PhaseFailure]) -> String {
    details
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur during a deployment attempt.
///
/// No error is retried internally. Re-running an attempt that failed before [Phase::Commit] is
/// safe (install absorbs already-installed peers). After a [Error::Commit] (or a transport
/// failure while committing) the transaction may already have been ordered, so the ledger must
/// be inspected before retrying (see [Error::requires_ledger_inspection]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("wallet error: {0}")]
    Wallet(#[from] wallet::Error),
    #[error("identity not found in wallet: {0}")]
    IdentityMissing(String),
    #[error("chaincode version missing: {0}")]
    VersionMissing(String),
    #[error("session error: {0}")]
    Session(#[from] session::Error),
    #[error("install failed: {0}")]
    Install(PhaseFailure),
    #[error("deploy failed: {}", join(.0))]
    Deploy(Vec<PhaseFailure>),
    #[error("commit failed after {activation} ({tx_id}): status {status}, inspect ledger before retrying")]
    Commit {
        activation: Activation,
        tx_id: String,
        status: String,
        history: Vec<PhaseFailure>,
    },
    #[error("transport failed during {phase}: {source}")]
    Transport {
        phase: Phase,
        source: session::Error,
        history: Vec<PhaseFailure>,
    },
}

impl Error {
    /// Returns the furthest phase the attempt reached, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Wallet(_)
            | Self::IdentityMissing(_)
            | Self::VersionMissing(_)
            | Self::Session(_) => None,
            Self::Install(_) => Some(Phase::Install),
            Self::Deploy(_) => Some(Phase::Instantiate),
            Self::Commit { .. } => Some(Phase::Commit),
            Self::Transport { phase, .. } => Some(*phase),
        }
    }

    /// Returns every peer-level failure collected before the attempt stopped.
    pub fn details(&self) -> &[PhaseFailure] {
        match self {
            Self::Install(failure) => std::slice::from_ref(failure),
            Self::Deploy(details) => details,
            Self::Commit { history, .. } | Self::Transport { history, .. } => history,
            _ => &[],
        }
    }

    /// Returns whether the transaction may have been ordered despite the failure.
    pub fn requires_ledger_inspection(&self) -> bool {
        matches!(
            self,
            Self::Commit { .. }
                | Self::Transport {
                    phase: Phase::Commit,
                    ..
                }
        )
    }
}
