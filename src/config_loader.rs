use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Load and parse a provisioning plan from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    info!(
        "Plan declares {} nodes, {} deployments, {} releases",
        config.nodes.len(),
        config.deployments.len(),
        config.releases.len()
    );

    config.validate()?;

    Ok(config)
}

/// Write `report` as pretty JSON to `path`, or to stdout when `path` is None
pub fn write_report<T: Serialize>(report: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).wrap_err("Failed to serialize report")?;
    match path {
        Some(path) => {
            std::fs::write(path, json)
                .wrap_err_with(|| format!("Failed to write report '{}'", path.display()))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let yaml = r#"
general:
  seed: 1
nodes:
  - id: 1
    blocks:
      - ip: "10.0.0.0/30"
        ports: ["25565"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].blocks[0].ports, vec!["25565".to_string()]);
    }

    #[test]
    fn test_load_config_rejects_invalid_plan() {
        let yaml = "nodes:\n  - id: 1\n    blocks:\n      - ip: \"10.0.0.0/30\"\n        ports: [\"22\"]\n";

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("Invalid block configuration"));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Path::new("/nonexistent/plan.yaml")).is_err());
    }

    #[test]
    fn test_write_report_to_file() {
        let temp_file = NamedTempFile::new().unwrap();
        write_report(&vec![1, 2, 3], Some(temp_file.path())).unwrap();

        let written: Vec<u32> = serde_json::from_str(&std::fs::read_to_string(temp_file.path()).unwrap()).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
    }
}
