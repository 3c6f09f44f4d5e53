//! Network topology from a connection profile.
//!
//! A profile lists organizations (keyed by name, each with an MSP id), the peers and certificate
//! authorities they own, and the endpoints of those peers and authorities. Profiles are read
//! from JSON or YAML depending on the file extension.

use crate::session::PeerTarget;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    path::Path,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur when loading or resolving a [Profile].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported profile format: {0}")]
    UnsupportedFormat(String),
    #[error("organization not found: {0}")]
    UnknownOrganization(String),
    #[error("peer {1} of organization {0} has no endpoint")]
    UnknownPeer(String, String),
    #[error("no peers found for organization: {0}")]
    NoPeers(String),
    #[error("no certificate authority found for organization: {0}")]
    NoAuthority(String),
    #[error("certificate authority {1} of organization {0} has no endpoint")]
    UnknownAuthority(String, String),
}

/// An organization and the names of the resources it owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub mspid: String,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub certificate_authorities: Vec<String>,
}

/// Endpoint of a peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub url: String,
}

/// Endpoint of a certificate authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthority {
    pub url: String,
    #[serde(default)]
    pub ca_name: Option<String>,
}

/// A connection profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub organizations: BTreeMap<String, Organization>,
    #[serde(default)]
    pub peers: BTreeMap<String, Peer>,
    #[serde(default)]
    pub certificate_authorities: BTreeMap<String, CertificateAuthority>,
}

impl Profile {
    /// Loads a profile from a `.json`, `.yaml`, or `.yml` file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let file = File::open(path)?;
        let profile: Self = match extension.as_str() {
            "json" => serde_json::from_reader(file)?,
            "yaml" | "yml" => serde_yaml::from_reader(file)?,
            _ => return Err(Error::UnsupportedFormat(path.display().to_string())),
        };
        debug!(
            path = ?path,
            organizations = profile.organizations.len(),
            peers = profile.peers.len(),
            "loaded connection profile"
        );
        Ok(profile)
    }

    /// Returns the organization whose MSP id is `msp_id`.
    pub fn organization(&self, msp_id: &str) -> Result<&Organization, Error> {
        self.organizations
            .values()
            .find(|organization| organization.mspid == msp_id)
            .ok_or_else(|| Error::UnknownOrganization(msp_id.to_string()))
    }

    /// Returns the peers of the organization `msp_id`, in profile order and without duplicates.
    pub fn peers_for_org(&self, msp_id: &str) -> Result<Vec<PeerTarget>, Error> {
        let organization = self.organization(msp_id)?;
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(organization.peers.len());
        for name in &organization.peers {
            if !seen.insert(name) {
                warn!(msp_id, peer = name.as_str(), "skipping duplicate peer");
                continue;
            }
            let peer = self
                .peers
                .get(name)
                .ok_or_else(|| Error::UnknownPeer(msp_id.to_string(), name.clone()))?;
            targets.push(PeerTarget {
                name: name.clone(),
                url: peer.url.clone(),
            });
        }
        if targets.is_empty() {
            return Err(Error::NoPeers(msp_id.to_string()));
        }
        Ok(targets)
    }

    /// Returns the name and endpoint of the first certificate authority listed for `msp_id`.
    pub fn authority_for_org(&self, msp_id: &str) -> Result<(&str, &CertificateAuthority), Error> {
        let organization = self.organization(msp_id)?;
        let name = organization
            .certificate_authorities
            .first()
            .ok_or_else(|| Error::NoAuthority(msp_id.to_string()))?;
        let authority = self
            .certificate_authorities
            .get(name)
            .ok_or_else(|| Error::UnknownAuthority(msp_id.to_string(), name.clone()))?;
        Ok((name.as_str(), authority))
    }
}
