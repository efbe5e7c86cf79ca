use serde::Deserialize;
use statrelay_common::types::{RepositoryConfig, TargetConfig};
use std::collections::HashMap;

/// Agent configuration file: one repository, any number of targets.
///
/// ```toml
/// [repository]
/// dsn = "host=repo dbname=statmon user=statrelay"
///
/// [servers.alpha]
/// dsn = "host=alpha dbname=postgres user=statrelay"
/// srvid = 1
/// frequency = 300
/// ```
#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub servers: HashMap<String, TargetConfig>,
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let config: AgentConfig = toml::from_str(
            r#"
            [repository]
            dsn = "host=repo dbname=statmon"

            [servers.alpha]
            dsn = "host=alpha dbname=postgres"
            srvid = 1

            [servers.beta]
            dsn = "host=beta dbname=postgres"
            srvid = 2
            frequency = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers["alpha"].frequency, 300);
        assert_eq!(config.servers["beta"].frequency, 60);
        assert_eq!(config.servers["beta"].srvid, 2);
    }

    #[test]
    fn repository_section_is_required() {
        let res: Result<AgentConfig, _> = toml::from_str(
            r#"
            [servers.alpha]
            dsn = "host=alpha"
            srvid = 1
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn servers_default_to_empty() {
        let config: AgentConfig = toml::from_str(
            r#"
            [repository]
            dsn = "host=repo"
            "#,
        )
        .unwrap();
        assert!(config.servers.is_empty());
    }
}
