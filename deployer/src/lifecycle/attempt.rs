use super::{
    Activation, Error, Install, PeerFailure, Phase, PhaseFailure, ALREADY_INSTALLED, NO_RESPONSE,
};
use crate::session::{
    self, Chaincode, Channel, Endorsement, InstallRequest, PeerError, PeerTarget, Proposal,
    ProposalRequest, ProposalResult, Response, Transaction, TransactionId, SUCCESS,
};
use tracing::{debug, error, info, warn};

/// Position of an [Attempt] in the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Installing,
    Deploying,
    Committing,
    Done,
    Failed(Phase),
}

/// Endorsements collected by a single successful activation proposal.
pub(super) struct Endorsed {
    pub activation: Activation,
    pub proposal: Proposal,
    pub results: Vec<ProposalResult>,
    pub endorsements: Vec<Endorsement>,

    /// Failures of the proposals rejected before this one.
    pub history: Vec<PhaseFailure>,
}

/// Outcome of the upgrade proposal.
///
/// A rejection carries the upgrade failures forward so they can be reported alongside the
/// instantiate failures if the fallback fails too.
pub(super) enum Upgrade {
    Endorsed(Endorsed),
    Rejected(PhaseFailure),
}

/// Align `results` with `peers`, treating a peer without a result as having failed.
fn collate<'a>(
    peers: &[PeerTarget],
    results: &'a [ProposalResult],
) -> Vec<Result<&'a Endorsement, PeerError>> {
    let mut slots: Vec<Option<&Response>> = vec![None; peers.len()];
    for result in results {
        let Some(slot) = slots.get_mut(result.peer) else {
            warn!(peer = result.peer, "ignoring result for unknown peer");
            continue;
        };
        if slot.is_some() {
            warn!(peer = result.peer, "ignoring duplicate result");
            continue;
        }
        *slot = Some(&result.response);
    }
    slots
        .into_iter()
        .map(|slot| match slot {
            Some(Response::Endorsed(endorsement)) => Ok(endorsement),
            Some(Response::Rejected(error)) => Err(error.clone()),
            None => Err(PeerError {
                code: NO_RESPONSE.to_string(),
                message: "peer returned no result".to_string(),
            }),
        })
        .collect()
}

/// Returns every endorsement if all peers endorsed, otherwise every failure.
fn unanimous(
    peers: &[PeerTarget],
    results: &[ProposalResult],
) -> Result<Vec<Endorsement>, Vec<PeerFailure>> {
    let mut endorsements = Vec::with_capacity(peers.len());
    let mut failures = Vec::new();
    for (peer, outcome) in peers.iter().zip(collate(peers, results)) {
        match outcome {
            Ok(endorsement) => endorsements.push(endorsement.clone()),
            Err(error) => failures.push(PeerFailure::new(peer, error)),
        }
    }
    if failures.is_empty() {
        Ok(endorsements)
    } else {
        Err(failures)
    }
}

/// Transient record of one deployment attempt.
///
/// Nothing is persisted: a restarted process always begins a new attempt at install.
pub(super) struct Attempt<'a> {
    chaincode: &'a Chaincode,
    peers: Vec<PeerTarget>,
    state: State,
    records: Vec<(Phase, Vec<ProposalResult>)>,
}

impl<'a> Attempt<'a> {
    pub fn new(chaincode: &'a Chaincode, peers: Vec<PeerTarget>) -> Self {
        Self {
            chaincode,
            peers,
            state: State::Installing,
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Consumes the attempt, returning the results collected by each phase.
    pub fn into_records(self) -> Vec<(Phase, Vec<ProposalResult>)> {
        self.records
    }

    fn advance(&mut self, next: State) {
        debug!(from = ?self.state, to = ?next, "attempt transitioned");
        self.state = next;
    }

    fn abort(&mut self, phase: Phase, source: session::Error, history: Vec<PhaseFailure>) -> Error {
        error!(%phase, error = %source, "transport failed");
        self.advance(State::Failed(phase));
        Error::Transport {
            phase,
            source,
            history,
        }
    }

    /// Installs the chaincode on every peer.
    ///
    /// A peer that already has this exact id and version counts as installed. Any other
    /// failure fails the whole phase.
    pub async fn install<C: Channel>(
        &mut self,
        channel: &mut C,
    ) -> Result<Vec<(PeerTarget, Install)>, Error> {
        info!(
            chaincode = self.chaincode.id.as_str(),
            version = self.chaincode.version.as_str(),
            peers = self.peers.len(),
            "installing chaincode"
        );
        let request = InstallRequest {
            targets: self.peers.clone(),
            chaincode: self.chaincode.clone(),
            channels: vec![channel.name().to_string()],
        };
        let results = match channel.install(request).await {
            Ok(results) => results,
            Err(source) => return Err(self.abort(Phase::Install, source, Vec::new())),
        };

        // Absorb peers that already have this version
        let mut installs = Vec::with_capacity(self.peers.len());
        let mut failures = Vec::new();
        for (peer, outcome) in self.peers.iter().zip(collate(&self.peers, &results)) {
            match outcome {
                Ok(_) => {
                    debug!(peer = peer.name.as_str(), "installed chaincode");
                    installs.push((peer.clone(), Install::Installed));
                }
                Err(error) if error.code == ALREADY_INSTALLED => {
                    warn!(peer = peer.name.as_str(), "chaincode already installed");
                    installs.push((peer.clone(), Install::AlreadyInstalled));
                }
                Err(error) => failures.push(PeerFailure::new(peer, error)),
            }
        }
        self.records.push((Phase::Install, results));
        if !failures.is_empty() {
            let failure = PhaseFailure {
                phase: Phase::Install,
                failures,
            };
            error!(%failure, "install failed");
            self.advance(State::Failed(Phase::Install));
            return Err(Error::Install(failure));
        }
        self.advance(State::Deploying);
        Ok(installs)
    }

    fn proposal(&self, activation: Activation, tx_id: TransactionId) -> ProposalRequest {
        ProposalRequest {
            targets: self.peers.clone(),
            chaincode: self.chaincode.clone(),
            function: activation.function().to_string(),
            tx_id,
        }
    }

    /// Proposes upgrading the channel to this version.
    pub async fn upgrade<C: Channel>(
        &mut self,
        channel: &mut C,
        tx_id: TransactionId,
    ) -> Result<Upgrade, Error> {
        info!(tx_id = %tx_id, "sending upgrade proposal");
        let request = self.proposal(Activation::Upgrade, tx_id);
        let (results, proposal) = match channel.send_upgrade_proposal(request).await {
            Ok(response) => response,
            Err(source) => return Err(self.abort(Phase::Upgrade, source, Vec::new())),
        };
        let outcome = unanimous(&self.peers, &results);
        self.records.push((Phase::Upgrade, results.clone()));
        match outcome {
            Ok(endorsements) => Ok(Upgrade::Endorsed(Endorsed {
                activation: Activation::Upgrade,
                proposal,
                results,
                endorsements,
                history: Vec::new(),
            })),
            Err(failures) => {
                let failure = PhaseFailure {
                    phase: Phase::Upgrade,
                    failures,
                };
                warn!(%failure, "upgrade failed, trying to instantiate");
                Ok(Upgrade::Rejected(failure))
            }
        }
    }

    /// Proposes the first activation of this version after `upgrade` was rejected.
    pub async fn instantiate<C: Channel>(
        &mut self,
        channel: &mut C,
        tx_id: TransactionId,
        upgrade: PhaseFailure,
    ) -> Result<Endorsed, Error> {
        info!(tx_id = %tx_id, "sending instantiate proposal");
        let request = self.proposal(Activation::Instantiate, tx_id);
        let (results, proposal) = match channel.send_instantiate_proposal(request).await {
            Ok(response) => response,
            Err(source) => return Err(self.abort(Phase::Instantiate, source, vec![upgrade])),
        };
        let outcome = unanimous(&self.peers, &results);
        self.records.push((Phase::Instantiate, results.clone()));
        match outcome {
            Ok(endorsements) => Ok(Endorsed {
                activation: Activation::Instantiate,
                proposal,
                results,
                endorsements,
                history: vec![upgrade],
            }),
            Err(failures) => {
                let instantiate = PhaseFailure {
                    phase: Phase::Instantiate,
                    failures,
                };
                error!(%upgrade, %instantiate, "instantiate failed as well");
                self.advance(State::Failed(Phase::Instantiate));
                Err(Error::Deploy(vec![upgrade, instantiate]))
            }
        }
    }

    /// Submits the endorsements of one activation for ordering.
    ///
    /// `history` holds the failures of earlier rejected proposals and is reported with any
    /// commit failure.
    pub async fn commit<C: Channel>(
        &mut self,
        channel: &mut C,
        activation: Activation,
        transaction: Transaction,
        history: Vec<PhaseFailure>,
    ) -> Result<String, Error> {
        self.advance(State::Committing);
        let tx_id = transaction.proposal.tx_id.to_string();
        info!(
            tx_id = tx_id.as_str(),
            %activation,
            endorsements = transaction.endorsements.len(),
            "sending transaction"
        );
        let status = match channel.send_transaction(transaction).await {
            Ok(status) => status,
            Err(source) => return Err(self.abort(Phase::Commit, source, history)),
        };
        if status != SUCCESS {
            error!(tx_id = tx_id.as_str(), status = status.as_str(), "transaction failed");
            self.advance(State::Failed(Phase::Commit));
            return Err(Error::Commit {
                activation,
                tx_id,
                status,
                history,
            });
        }
        self.advance(State::Done);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use commonware_macros::test_traced;

    fn peers(n: usize) -> Vec<PeerTarget> {
        (0..n)
            .map(|i| PeerTarget {
                name: format!("peer{i}"),
                url: format!("grpcs://localhost:{}", 7051 + i * 1000),
            })
            .collect()
    }

    fn endorsed(peer: usize) -> ProposalResult {
        ProposalResult::endorsed(
            peer,
            Endorsement {
                peer: format!("peer{peer}"),
                payload: Bytes::from(vec![peer as u8]),
            },
        )
    }

    #[test_traced]
    fn test_unanimous_requires_every_peer() {
        let peers = peers(2);
        let endorsements = unanimous(&peers, &[endorsed(0), endorsed(1)]).unwrap();
        assert_eq!(endorsements.len(), 2);

        // One success and one failure fails the phase
        let failures = unanimous(
            &peers,
            &[endorsed(0), ProposalResult::rejected(1, "CODE", "nope")],
        )
        .unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].peer.name, "peer1");
        assert_eq!(failures[0].code, "CODE");
    }

    #[test_traced]
    fn test_missing_result_is_a_failure() {
        let peers = peers(3);
        let failures = unanimous(&peers, &[endorsed(0), endorsed(2)]).unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].peer.name, "peer1");
        assert_eq!(failures[0].code, NO_RESPONSE);
    }

    #[test_traced]
    fn test_results_are_aligned_by_peer_index() {
        let peers = peers(2);

        // Out of order results are matched to their peer
        let endorsements = unanimous(&peers, &[endorsed(1), endorsed(0)]).unwrap();
        assert_eq!(endorsements[0].peer, "peer0");
        assert_eq!(endorsements[1].peer, "peer1");

        // Unknown and duplicate results are ignored (the first result for a peer wins)
        let failures = unanimous(
            &peers,
            &[
                endorsed(0),
                ProposalResult::rejected(1, "FIRST", "first"),
                endorsed(1),
                endorsed(7),
            ],
        )
        .unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].code, "FIRST");
    }

    #[test_traced]
    fn test_empty_result_set_fails_every_peer() {
        let peers = peers(2);
        let failures = unanimous(&peers, &[]).unwrap_err();
        assert_eq!(failures.len(), 2);
    }
}
