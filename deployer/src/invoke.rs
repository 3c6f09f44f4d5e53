//! Submit application transactions against a deployed contract.
//!
//! The first argument names the contract function; the remaining arguments are forwarded to it in
//! order. Receipts are returned exactly as the network produced them and failures of the call
//! itself are surfaced as [Error::Invocation] with the original message.

use crate::{
    session::{self, Contract, Gateway, Receipt, Session, Status},
    wallet::{self, Store},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur when invoking a contract.
#[derive(Debug, Error)]
pub enum Error {
    #[error("wallet error: {0}")]
    Wallet(#[from] wallet::Error),
    #[error("identity not found in wallet: {0}")]
    IdentityMissing(String),
    #[error("session error: {0}")]
    Session(#[from] session::Error),
    #[error("no function provided")]
    MissingFunction,
    #[error("invocation failed: {0}")]
    Invocation(#[source] session::Error),
}

/// Whether an invocation is ordered or only evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Submit,
    Evaluate,
}

async fn call<S: Session>(
    session: &mut S,
    mode: Mode,
    channel: &str,
    contract: &str,
    args: &[String],
) -> Result<Receipt, Error> {
    let Some((function, args)) = args.split_first() else {
        return Err(Error::MissingFunction);
    };
    let mut handle = session.contract(channel, contract).await?;
    debug!(
        channel,
        contract,
        function = function.as_str(),
        args = args.len(),
        ?mode,
        "invoking contract"
    );
    let receipt = match mode {
        Mode::Submit => handle.submit(function, args).await,
        Mode::Evaluate => handle.evaluate(function, args).await,
    }
    .map_err(Error::Invocation)?;
    match receipt.status {
        Status::Success => info!(contract, function = function.as_str(), "transaction succeeded"),
        Status::Failure => warn!(contract, function = function.as_str(), "transaction failed"),
    }
    Ok(receipt)
}

/// Submits `args` to `contract` on `channel` and waits for the transaction to commit.
pub async fn submit<S: Session>(
    session: &mut S,
    channel: &str,
    contract: &str,
    args: &[String],
) -> Result<Receipt, Error> {
    call(session, Mode::Submit, channel, contract, args).await
}

/// Evaluates `args` against `contract` on `channel` without ordering a transaction.
pub async fn evaluate<S: Session>(
    session: &mut S,
    channel: &str,
    contract: &str,
    args: &[String],
) -> Result<Receipt, Error> {
    call(session, Mode::Evaluate, channel, contract, args).await
}

/// Opens a session as the wallet identity `identity`, invokes `contract`, and disconnects.
///
/// The session is disconnected exactly once, whatever the outcome.
pub async fn invoke<W: Store, G: Gateway>(
    wallet: &W,
    gateway: &G,
    identity: &str,
    mode: Mode,
    channel: &str,
    contract: &str,
    args: &[String],
) -> Result<Receipt, Error> {
    if !wallet.exists(identity)? {
        return Err(Error::IdentityMissing(identity.to_string()));
    }
    let identity = wallet.get(identity)?;
    let mut session = gateway.connect(identity).await?;
    let result = call(&mut session, mode, channel, contract, args).await;
    session.disconnect().await;
    result
}
