use std::path::Path;

use anyhow::{Context, bail};

use tidescale_core::TideConfig;
use tidescale_core::config::ControllerKind;

pub fn check(path: &Path, format: &str) -> anyhow::Result<()> {
    let config = TideConfig::from_file(path)?
        .resolve()
        .with_context(|| format!("invalid config {}", path.display()))?;

    match format {
        "json" => {
            let workloads: Vec<_> = config
                .workloads
                .iter()
                .map(|spec| {
                    serde_json::json!({
                        "workload": spec.workload.id(),
                        "min_replicas": spec.params.min_replicas,
                        "max_replicas": spec.params.max_replicas,
                        "cpu_threshold": spec.params.cpu_threshold,
                        "memory_threshold": spec.params.memory_threshold,
                        "step": spec.params.step,
                        "poll_interval_secs": spec.params.poll_interval.as_secs_f64(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&workloads)?);
        }
        _ => {
            let controller = match config.controller.kind {
                ControllerKind::Kubernetes => config.controller.api_server.as_str(),
                ControllerKind::Memory => "in-memory (dry run)",
            };
            println!("✓ {} is valid", path.display());
            println!("  listen:     {}", config.listen);
            println!("  metrics:    {}", config.metrics.endpoint);
            println!("  controller: {controller}");
            for spec in &config.workloads {
                let p = &spec.params;
                println!(
                    "  {}: replicas {}..={}, cpu > {:.2}, memory > {:.2}, step {}, every {:?}",
                    spec.workload,
                    p.min_replicas,
                    p.max_replicas,
                    p.cpu_threshold,
                    p.memory_threshold,
                    p.step,
                    p.poll_interval
                );
            }
        }
    }

    Ok(())
}

pub fn init(path: &Path, namespace: &str, name: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let config = TideConfig::scaffold(namespace, name);
    std::fs::write(path, config.to_toml_string()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("✓ Generated {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_a_config_that_checks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidescale.toml");

        init(&path, "shop", "web", false).unwrap();
        check(&path, "text").unwrap();
        check(&path, "json").unwrap();

        let resolved = TideConfig::from_file(&path).unwrap().resolve().unwrap();
        assert_eq!(resolved.workloads[0].workload.id(), "shop/web");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidescale.toml");
        std::fs::write(&path, "# hand edited\n").unwrap();

        assert!(init(&path, "default", "api", false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hand edited\n");

        init(&path, "default", "api", true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[[workloads]]"));
    }

    #[test]
    fn check_rejects_invalid_workload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidescale.toml");
        std::fs::write(
            &path,
            "[[workloads]]\nname = \"api\"\nmin_replicas = 5\nmax_replicas = 2\n",
        )
        .unwrap();

        let err = check(&path, "text").unwrap_err();
        assert!(format!("{err:#}").contains("default/api"));
    }
}
