//! Supervised process table.

use std::path::PathBuf;

use crate::gateway::GatewayGlue;
use crate::runtime::BootConfig;
use crate::services::ServiceCatalog;
use crate::util::resolve_program;

pub const GATEWAY_PROCESS: &str = "gateway";

/// One process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }
}

/// The gateway first, then every service process in catalog order.
pub fn launch_plan(
    config: &BootConfig,
    catalog: &ServiceCatalog,
    glue: Option<&GatewayGlue>,
) -> Vec<LaunchSpec> {
    let mut plan = Vec::new();
    if let Some(glue) = glue {
        let (program, args) = glue.command(config);
        plan.push(LaunchSpec::new(GATEWAY_PROCESS, program, args));
    }

    for service in catalog.iter() {
        let Some(config_path) = service.config_path() else {
            continue;
        };
        for binary in service.profile.processes {
            plan.push(LaunchSpec::new(
                *binary,
                resolve_program(&config.venv_dir, binary),
                vec!["--config-file".into(), config_path.display().to_string()],
            ));
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::runtime::BootOptions;

    #[test]
    fn test_fixed_order() {
        let config = BootConfig::new(BootOptions::default(), &Environment::default()).unwrap();
        let catalog = ServiceCatalog::new(&config);
        let glue = GatewayGlue::prepare(catalog.iter(), &config.venv_dir).unwrap();

        let plan = launch_plan(&config, &catalog, Some(&glue));
        let names: Vec<&str> = plan.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "gateway",
                "glance-api",
                "cinder-api",
                "neutron-server",
                "ironic-api",
                "nova-api",
                "nova-conductor",
                "nova-scheduler",
                "nova-compute",
            ]
        );

        let conductor = &plan[6];
        assert_eq!(conductor.program, PathBuf::from("nova-conductor"));
        assert_eq!(conductor.args, vec!["--config-file", "/etc/nova/nova.conf"]);
        glue.cleanup();
    }

    #[test]
    fn test_without_gateway() {
        let config = BootConfig::new(BootOptions::default(), &Environment::default()).unwrap();
        let catalog = ServiceCatalog::new(&config);
        let plan = launch_plan(&config, &catalog, None);
        assert_eq!(plan[0].name, "glance-api");
        assert_eq!(plan.len(), 8);
    }
}
