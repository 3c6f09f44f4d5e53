//! Check a [Config] and rehearse it against a [simulated] network.
//!
//! [plan] resolves everything a deployment needs (chaincode version, peers, certificate
//! authority, whether the configured wallet already holds the identity) without contacting
//! anything or creating the wallet. [rehearse] then runs the whole workflow (identity
//! bootstrap, deployment, optional invocation) against a [simulated::Network] built from the
//! connection profile, using an in-memory wallet so no credentials are written.

use crate::{
    authority::{self, enroll_admin, register_user, Bootstrap},
    config::{self, Config},
    invoke::{self, Mode},
    lifecycle::{self, Deployment},
    profile::{self, Profile},
    session::{Chaincode, PeerTarget, Receipt},
    simulated,
    wallet::{self, FileSystem, Memory, Store},
};
use rand::RngCore;
use thiserror::Error;
use tracing::info;

/// Errors that can occur when planning or rehearsing a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::Error),
    #[error("profile error: {0}")]
    Profile(#[from] profile::Error),
    #[error("wallet error: {0}")]
    Wallet(#[from] wallet::Error),
    #[error("enrollment section missing")]
    EnrollmentMissing,
    #[error("authority error: {0}")]
    Authority(#[from] authority::Error),
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] lifecycle::Error),
    #[error("invoke error: {0}")]
    Invoke(#[from] invoke::Error),
}

/// Everything a run resolves before contacting the network.
#[derive(Clone, Debug)]
pub struct Plan {
    pub chaincode: Chaincode,
    pub peers: Vec<PeerTarget>,

    /// Name and endpoint of the certificate authority of the organization.
    pub authority: (String, String),
    pub profile: Profile,

    /// Whether the configured wallet already holds the configured identity.
    pub enrolled: bool,
}

/// Outcome of a rehearsal.
#[derive(Clone, Debug)]
pub struct Rehearsal {
    pub deployment: Deployment,
    pub receipt: Option<Receipt>,
}

/// Resolves the chaincode, peers, and certificate authority `config` refers to.
pub fn plan(config: &Config) -> Result<Plan, Error> {
    let chaincode = config.chaincode()?;
    let profile = Profile::load(&config.profile)?;
    let peers = profile.peers_for_org(&config.organization)?;
    let authority = {
        let (name, authority) = profile.authority_for_org(&config.organization)?;
        (name.to_string(), authority.url.clone())
    };
    let enrolled = if config.wallet.is_dir() {
        FileSystem::open(&config.wallet)?.exists(&config.identity)?
    } else {
        false
    };
    info!(
        chaincode = chaincode.id.as_str(),
        version = chaincode.version.as_str(),
        peers = peers.len(),
        authority = authority.0.as_str(),
        enrolled,
        "planned run"
    );
    Ok(Plan {
        chaincode,
        peers,
        authority,
        profile,
        enrolled,
    })
}

/// Bootstraps identities, deploys, and (if configured) invokes against a simulated network.
pub async fn rehearse<R: RngCore + Send>(config: &Config, rng: R) -> Result<Rehearsal, Error> {
    let plan = plan(config)?;
    let enrollment = config.enrollment.as_ref().ok_or(Error::EnrollmentMissing)?;
    let network = simulated::Network::from_profile(&plan.profile, [config.channel.as_str()]);
    let ca = simulated::Authority::new([(enrollment.admin.as_str(), enrollment.secret.as_str())]);

    // Bootstrap identities
    let mut wallet = Memory::default();
    if let Some(admin) = config.admin() {
        if let Bootstrap::Created(identity) = enroll_admin(&mut wallet, &ca, &admin).await? {
            info!(name = identity.name.as_str(), "enrolled administrator");
        }
    }
    if let Some(registration) = config.registration() {
        let outcome = register_user(
            &mut wallet,
            &ca,
            &enrollment.admin,
            &registration,
            &config.organization,
        )
        .await?;
        if let Bootstrap::Created(identity) = outcome {
            info!(name = identity.name.as_str(), "registered user");
        }
    }

    // Deploy
    let deployment = lifecycle::deploy(
        &wallet,
        &network,
        rng,
        &config.identity,
        &config.target(),
        &plan.chaincode,
    )
    .await?;

    // Invoke
    let receipt = match &config.invoke {
        Some(section) => Some(
            invoke::invoke(
                &wallet,
                &network,
                &config.identity,
                Mode::Submit,
                &config.channel,
                &section.contract,
                &section.args,
            )
            .await?,
        ),
        None => None,
    };
    Ok(Rehearsal {
        deployment,
        receipt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lifecycle::Activation, session::Status, wallet::Identity};
    use commonware_macros::{test_async, test_traced};
    use rand::{rngs::StdRng, SeedableRng};
    use std::{fs, path::PathBuf};

    const PROFILE: &str = r#"{
        "name": "first-network-org1",
        "organizations": {
            "Org1": {
                "mspid": "Org1MSP",
                "peers": ["peer0.org1.example.com", "peer1.org1.example.com"],
                "certificateAuthorities": ["ca.org1.example.com"]
            }
        },
        "peers": {
            "peer0.org1.example.com": { "url": "grpcs://localhost:7051" },
            "peer1.org1.example.com": { "url": "grpcs://localhost:8051" }
        },
        "certificateAuthorities": {
            "ca.org1.example.com": { "url": "https://localhost:7054", "caName": "ca-org1" }
        }
    }"#;

    struct TestDirectory(PathBuf);

    impl TestDirectory {
        fn new(test: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "chaincode_deployer_rehearsal_{test}_{}",
                std::process::id()
            ));
            if path.exists() {
                fs::remove_dir_all(&path).unwrap();
            }
            fs::create_dir_all(path.join("chaincode")).unwrap();
            fs::write(path.join("connection.json"), PROFILE).unwrap();
            fs::write(
                path.join("chaincode").join(config::MANIFEST),
                r#"{ "name": "mycc", "version": "1.2.0" }"#,
            )
            .unwrap();
            Self(path)
        }

        fn config(&self) -> Config {
            let yaml = format!(
                r#"
wallet: {wallet}
profile: {profile}
channel: mychannel
organization: Org1MSP
identity: user1
chaincode:
  id: mycc
  path: {chaincode}
  language: node
  args: ["a", "100", "b", "200"]
enrollment:
  admin: admin
  secret: adminpw
  user:
    name: user1
    affiliation: org1.department1
    role: client
invoke:
  contract: mycc
  args: ["move", "a", "b", "10"]
"#,
                wallet = self.0.join("wallet").display(),
                profile = self.0.join("connection.json").display(),
                chaincode = self.0.join("chaincode").display(),
            );
            serde_yaml::from_str(&yaml).unwrap()
        }
    }

    impl Drop for TestDirectory {
        fn drop(&mut self) {
            fs::remove_dir_all(&self.0).ok();
        }
    }

    #[test_traced]
    fn test_plan_resolves_version_and_peers() {
        let directory = TestDirectory::new("plan");
        let plan = plan(&directory.config()).unwrap();
        assert_eq!(plan.chaincode.version, "1.2.0");
        assert_eq!(plan.peers.len(), 2);
        assert_eq!(
            plan.authority,
            (
                "ca.org1.example.com".to_string(),
                "https://localhost:7054".to_string()
            )
        );

        // Planning never creates the wallet
        assert!(!plan.enrolled);
        assert!(!directory.0.join("wallet").exists());
    }

    #[test_traced]
    fn test_plan_reads_configured_wallet() {
        let directory = TestDirectory::new("wallet");
        let mut config = directory.config();
        let mut wallet = FileSystem::open(&config.wallet).unwrap();
        assert!(!plan(&config).unwrap().enrolled);

        wallet
            .put(
                "user1",
                &Identity {
                    name: "user1".to_string(),
                    msp_id: "Org1MSP".to_string(),
                    certificate: "certificate for user1".to_string(),
                    private_key: "key for user1".to_string(),
                },
            )
            .unwrap();
        assert!(plan(&config).unwrap().enrolled);

        config.identity = "../user1".to_string();
        assert!(matches!(
            plan(&config),
            Err(Error::Wallet(wallet::Error::InvalidName(_)))
        ));
    }

    #[test_async]
    async fn test_rehearse_full_workflow() {
        let directory = TestDirectory::new("full");
        let config = directory.config();
        let rehearsal = rehearse(&config, StdRng::seed_from_u64(0)).await.unwrap();
        assert_eq!(rehearsal.deployment.activation, Activation::Instantiate);
        assert_eq!(rehearsal.deployment.version, "1.2.0");
        assert_eq!(rehearsal.receipt.unwrap().status, Status::Success);

        // Nothing is written to the configured wallet
        assert!(!config.wallet.exists());
    }

    #[test_async]
    async fn test_rehearse_requires_bootstrapped_identity() {
        let directory = TestDirectory::new("identity");
        let mut config = directory.config();
        config.identity = "auditor".to_string();
        let result = rehearse(&config, StdRng::seed_from_u64(0)).await;
        assert!(matches!(
            result,
            Err(Error::Lifecycle(lifecycle::Error::IdentityMissing(name))) if name == "auditor"
        ));

        config.enrollment = None;
        let result = rehearse(&config, StdRng::seed_from_u64(0)).await;
        assert!(matches!(result, Err(Error::EnrollmentMissing)));
    }
}
