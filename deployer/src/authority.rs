//! Bootstrap identities against a certificate authority.
//!
//! [enroll_admin] and [register_user] populate a [Store] with the identities later used to open
//! sessions. Both are idempotent: when the target identity is already stored, they return
//! [Bootstrap::Existing] without contacting the certificate authority.

use crate::wallet::{self, Identity, Store};
use std::future::Future;
use thiserror::Error;
use tracing::info;

/// Errors that can occur when bootstrapping identities.
#[derive(Debug, Error)]
pub enum Error {
    #[error("wallet error: {0}")]
    Wallet(#[from] wallet::Error),
    #[error("registrar not found in wallet: {0}")]
    RegistrarMissing(String),
    #[error("certificate authority rejected request: {0}")]
    Rejected(String),
    #[error("certificate authority unavailable: {0}")]
    Unavailable(String),
}

/// Credentials issued by a certificate authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enrollment {
    pub certificate: String,
    pub private_key: String,
}

/// Request to register a new principal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub enrollment_id: String,
    pub affiliation: String,
    pub role: String,
}

/// An administrator principal pre-registered with the certificate authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admin {
    pub name: String,
    pub secret: String,
    pub msp_id: String,
}

/// Outcome of a bootstrap workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bootstrap {
    /// A new identity was enrolled and stored.
    Created(Identity),

    /// An identity was already stored under the requested name.
    Existing,
}

/// A certificate authority client.
pub trait Authority: Send + Sync {
    /// Exchanges an enrollment id and secret for credentials.
    fn enroll(
        &self,
        enrollment_id: &str,
        secret: &str,
    ) -> impl Future<Output = Result<Enrollment, Error>> + Send;

    /// Registers a new principal on behalf of `registrar`, returning its enrollment secret.
    fn register(
        &self,
        registration: &Registration,
        registrar: &Identity,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

/// Enrolls the administrator and stores its identity.
pub async fn enroll_admin<S: Store, A: Authority>(
    store: &mut S,
    authority: &A,
    admin: &Admin,
) -> Result<Bootstrap, Error> {
    if store.exists(&admin.name)? {
        info!(name = admin.name.as_str(), "identity already exists");
        return Ok(Bootstrap::Existing);
    }

    // Enroll
    info!(name = admin.name.as_str(), "enrolling administrator");
    let enrollment = authority.enroll(&admin.name, &admin.secret).await?;

    // Store
    let identity = Identity {
        name: admin.name.clone(),
        msp_id: admin.msp_id.clone(),
        certificate: enrollment.certificate,
        private_key: enrollment.private_key,
    };
    store.put(&admin.name, &identity)?;
    info!(name = admin.name.as_str(), msp_id = admin.msp_id.as_str(), "stored identity");
    Ok(Bootstrap::Created(identity))
}

/// Registers and enrolls a new principal using the stored `registrar` identity.
pub async fn register_user<S: Store, A: Authority>(
    store: &mut S,
    authority: &A,
    registrar: &str,
    registration: &Registration,
    msp_id: &str,
) -> Result<Bootstrap, Error> {
    let name = registration.enrollment_id.as_str();
    if store.exists(name)? {
        info!(name, "identity already exists");
        return Ok(Bootstrap::Existing);
    }
    if !store.exists(registrar)? {
        return Err(Error::RegistrarMissing(registrar.to_string()));
    }
    let registrar = store.get(registrar)?;

    // Register
    info!(
        name,
        registrar = registrar.name.as_str(),
        affiliation = registration.affiliation.as_str(),
        role = registration.role.as_str(),
        "registering user"
    );
    let secret = authority.register(registration, &registrar).await?;

    // Enroll
    info!(name, "enrolling user");
    let enrollment = authority.enroll(name, &secret).await?;

    // Store
    let identity = Identity {
        name: name.to_string(),
        msp_id: msp_id.to_string(),
        certificate: enrollment.certificate,
        private_key: enrollment.private_key,
    };
    store.put(name, &identity)?;
    info!(name, msp_id, "stored identity");
    Ok(Bootstrap::Created(identity))
}
