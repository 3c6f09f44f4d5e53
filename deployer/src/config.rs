//! Run configuration.
//!
//! A [Config] is loaded from YAML and passed explicitly to every entry point:
//!
//! ```yaml
//! wallet: ./wallet
//! profile: connection-org1.json
//! channel: mychannel
//! organization: Org1MSP
//! identity: user1
//! chaincode:
//!   id: mycc
//!   path: ./chaincode
//!   language: node
//!   args: ["c", "d", "1000", "2000"]
//! enrollment:
//!   admin: admin
//!   secret: adminpw
//!   user:
//!     name: user1
//!     affiliation: org1.department1
//!     role: client
//! invoke:
//!   contract: mycc
//!   args: ["move", "c", "d", "10"]
//! ```
//!
//! When `chaincode.version` is omitted, it is read from the `version` field of the chaincode's
//! `package.json`.

use crate::{
    authority::{Admin, Registration},
    lifecycle::Target,
    session::{Chaincode, Language},
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// Name of the package manifest a chaincode version is read from.
pub const MANIFEST: &str = "package.json";

/// Errors that can occur when loading a [Config] or resolving a [Chaincode].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("manifest invalid: {0:?}: {1}")]
    Manifest(PathBuf, serde_json::Error),
    #[error("manifest missing: {0:?}")]
    ManifestMissing(PathBuf),
    #[error("chaincode version missing: {0}")]
    VersionMissing(String),
    #[error("field must not be empty: {0}")]
    EmptyField(&'static str),
}

/// Chaincode section of a [Config].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeConfig {
    pub id: String,
    pub path: PathBuf,
    pub language: Language,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A principal to register during bootstrap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub affiliation: String,
    pub role: String,
}

/// Enrollment section of a [Config].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    pub admin: String,
    pub secret: String,
    #[serde(default)]
    pub user: Option<UserConfig>,
}

/// Invocation section of a [Config].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeConfig {
    pub contract: String,
    pub args: Vec<String>,
}

/// Configuration of a deployment or invocation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory of the [crate::wallet::FileSystem] holding `identity`.
    pub wallet: PathBuf,
    pub profile: PathBuf,
    pub channel: String,
    pub organization: String,
    pub identity: String,
    pub chaincode: ChaincodeConfig,
    #[serde(default)]
    pub enrollment: Option<EnrollmentConfig>,
    #[serde(default)]
    pub invoke: Option<InvokeConfig>,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    version: Option<String>,
}

/// Reads the chaincode version from the manifest in `directory`.
pub fn manifest_version(directory: &Path) -> Result<String, Error> {
    let path = directory.join(MANIFEST);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ManifestMissing(path));
        }
        Err(err) => return Err(err.into()),
    };
    let manifest: Manifest =
        serde_json::from_reader(file).map_err(|err| Error::Manifest(path.clone(), err))?;
    match manifest.version {
        Some(version) if !version.trim().is_empty() => Ok(version),
        _ => Err(Error::VersionMissing(path.display().to_string())),
    }
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config: Self = {
            let config_file = File::open(path)?;
            serde_yaml::from_reader(config_file)?
        };
        config.validate()?;
        info!(
            channel = config.channel.as_str(),
            organization = config.organization.as_str(),
            identity = config.identity.as_str(),
            chaincode = config.chaincode.id.as_str(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Ensures every required field is populated.
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("channel", &self.channel),
            ("organization", &self.organization),
            ("identity", &self.identity),
            ("chaincode.id", &self.chaincode.id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::EmptyField(field));
            }
        }
        if let Some(invoke) = &self.invoke {
            if invoke.contract.trim().is_empty() {
                return Err(Error::EmptyField("invoke.contract"));
            }
        }
        Ok(())
    }

    /// Returns the channel and organization a deployment targets.
    pub fn target(&self) -> Target {
        Target {
            channel: self.channel.clone(),
            organization: self.organization.clone(),
        }
    }

    /// Resolves the chaincode descriptor, reading the version from the manifest if not set.
    pub fn chaincode(&self) -> Result<Chaincode, Error> {
        let section = &self.chaincode;
        let version = match &section.version {
            Some(version) if !version.trim().is_empty() => version.clone(),
            Some(_) => return Err(Error::VersionMissing(section.id.clone())),
            None => {
                let version = manifest_version(&section.path)?;
                info!(
                    chaincode = section.id.as_str(),
                    version = version.as_str(),
                    "chaincode version detected"
                );
                version
            }
        };
        Ok(Chaincode {
            id: section.id.clone(),
            version,
            path: section.path.clone(),
            language: section.language,
            args: section.args.clone(),
        })
    }

    /// Returns the administrator to enroll, if configured.
    pub fn admin(&self) -> Option<Admin> {
        self.enrollment.as_ref().map(|enrollment| Admin {
            name: enrollment.admin.clone(),
            secret: enrollment.secret.clone(),
            msp_id: self.organization.clone(),
        })
    }

    /// Returns the user to register, if configured.
    pub fn registration(&self) -> Option<Registration> {
        self.enrollment
            .as_ref()
            .and_then(|enrollment| enrollment.user.as_ref())
            .map(|user| Registration {
                enrollment_id: user.name.clone(),
                affiliation: user.affiliation.clone(),
                role: user.role.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use std::fs;

    const CONFIG: &str = r#"
wallet: ./wallet
profile: connection-org1.json
channel: mychannel
organization: Org1MSP
identity: user1
chaincode:
  id: mycc
  path: ./chaincode
  language: node
  args: ["c", "d", "1000", "2000"]
enrollment:
  admin: admin
  secret: adminpw
  user:
    name: user1
    affiliation: org1.department1
    role: client
invoke:
  contract: mycc
  args: ["move", "c", "d", "10"]
"#;

    struct TestDirectory(PathBuf);

    impl TestDirectory {
        fn new(test: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "chaincode_deployer_config_{test}_{}",
                std::process::id()
            ));
            if path.exists() {
                fs::remove_dir_all(&path).unwrap();
            }
            fs::create_dir_all(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for TestDirectory {
        fn drop(&mut self) {
            fs::remove_dir_all(&self.0).ok();
        }
    }

    fn config() -> Config {
        serde_yaml::from_str(CONFIG).unwrap()
    }

    #[test_traced]
    fn test_load_config() {
        let directory = TestDirectory::new("load");
        let path = directory.0.join("deploy.yaml");
        fs::write(&path, CONFIG).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, self::config());
        assert_eq!(
            config.target(),
            Target {
                channel: "mychannel".to_string(),
                organization: "Org1MSP".to_string(),
            }
        );
        assert_eq!(
            config.admin(),
            Some(Admin {
                name: "admin".to_string(),
                secret: "adminpw".to_string(),
                msp_id: "Org1MSP".to_string(),
            })
        );
        assert_eq!(
            config.registration().map(|registration| registration.affiliation),
            Some("org1.department1".to_string())
        );
        assert_eq!(config.invoke.unwrap().args.len(), 4);
    }

    #[test_traced]
    fn test_load_rejects_empty_fields() {
        let directory = TestDirectory::new("empty");
        let path = directory.0.join("deploy.yaml");
        fs::write(&path, CONFIG.replace("channel: mychannel", "channel: \"\"")).unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(Error::EmptyField("channel"))
        ));
    }

    #[test_traced]
    fn test_version_from_manifest() {
        let directory = TestDirectory::new("manifest");
        fs::write(
            directory.0.join(MANIFEST),
            r#"{ "name": "mycc", "version": "1.0.0", "main": "index.js" }"#,
        )
        .unwrap();

        let mut config = config();
        config.chaincode.path = directory.0.clone();
        let chaincode = config.chaincode().unwrap();
        assert_eq!(chaincode.id, "mycc");
        assert_eq!(chaincode.version, "1.0.0");
        assert_eq!(chaincode.language, Language::Node);
        assert_eq!(chaincode.args, vec!["c", "d", "1000", "2000"]);
    }

    #[test_traced]
    fn test_explicit_version_skips_manifest() {
        let mut config = config();
        config.chaincode.path = PathBuf::from("/nonexistent/chaincode");
        config.chaincode.version = Some("2.1.0".to_string());
        assert_eq!(config.chaincode().unwrap().version, "2.1.0");

        config.chaincode.version = Some(" ".to_string());
        assert!(matches!(
            config.chaincode(),
            Err(Error::VersionMissing(id)) if id == "mycc"
        ));
    }

    #[test_traced]
    fn test_manifest_failures() {
        let directory = TestDirectory::new("manifest_failures");
        assert!(matches!(
            manifest_version(&directory.0),
            Err(Error::ManifestMissing(_))
        ));

        fs::write(directory.0.join(MANIFEST), r#"{ "name": "mycc" }"#).unwrap();
        assert!(matches!(
            manifest_version(&directory.0),
            Err(Error::VersionMissing(_))
        ));

        fs::write(directory.0.join(MANIFEST), "not json").unwrap();
        assert!(matches!(
            manifest_version(&directory.0),
            Err(Error::Manifest(_, _))
        ));
    }
}
