use crate::config::TopologyConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::Path;

/// Load and validate a topology configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<TopologyConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: TopologyConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    config.validate()?;
    log_summary(&config);

    Ok(config)
}

/// Parse and validate a topology configuration held in memory
pub fn parse_config(yaml: &str) -> Result<TopologyConfig> {
    let config: TopologyConfig = serde_yaml::from_str(yaml).wrap_err("Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

fn log_summary(config: &TopologyConfig) {
    info!(
        "Topology '{}': {} region(s), peering {:?}, {} remote access link(s)",
        config.general.name,
        config.regions.len(),
        config.peering.topology,
        config.remote_access.len()
    );
    if !config.regions.iter().any(|region| region.primary) {
        warn!("No region is marked primary, every probe host will sit in a private subnet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_topology_config() {
        let yaml = r#"
general:
  name: capstone
  account_id: "123456789012"
regions:
  - name: us-east-1
    address_block: 172.16.0.0/16
    primary: true
  - name: eu-west-1
    address_block: 172.17.0.0/16
remote_access:
  - region: us-east-1
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.account_id.as_deref(), Some("123456789012"));
        assert_eq!(config.remote_access[0].routed_cidr, "10.0.0.0/8");
        assert_eq!(config.remote_access[0].customer_asn, 65000);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/topology.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to open configuration"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let yaml = r#"
regions:
  - name: us-east-1
    address_block: 172.16.0.0/16
peering:
  topology: explicit
  links:
    - { requester: us-east-1, accepter: eu-west-1 }
"#;
        assert!(parse_config(yaml).is_err());
        assert!(parse_config("regions: [").is_err());
    }
}
