//! Daemon configuration: command-line flags, each also read from the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use fleetscale_autoscale::ScalingPolicy;
use fleetscale_fleet::AwsFleetConfig;
use fleetscale_rollout::RefreshConfig;
use fleetscale_state::NomadConfig;

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Decide and log everything, but never change the fleet.
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info,fleetscale=debug")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    #[arg(long, env = "NOMAD_ADDR", default_value = "http://127.0.0.1:4646")]
    pub nomad_addr: String,

    #[arg(long, env = "NOMAD_TOKEN")]
    pub nomad_token: Option<String>,

    #[arg(long, env = "NOMAD_AUTH_USERNAME")]
    pub nomad_auth_username: Option<String>,

    #[arg(long, env = "NOMAD_AUTH_PASSWORD")]
    pub nomad_auth_password: Option<String>,

    /// Datacenter whose nodes are scaled.
    #[arg(long, env = "NOMAD_DATACENTER", default_value = "dc1")]
    pub datacenter: String,

    #[arg(long, env = "SCALE_UP_CPU_UTIL", default_value_t = 0.9)]
    pub scale_up_cpu_util: f64,

    #[arg(long, env = "SCALE_UP_MEM_UTIL", default_value_t = 0.9)]
    pub scale_up_mem_util: f64,

    #[arg(long, env = "SCALE_DOWN_CPU_UTIL", default_value_t = 0.9)]
    pub scale_down_cpu_util: f64,

    #[arg(long, env = "SCALE_DOWN_MEM_UTIL", default_value_t = 0.9)]
    pub scale_down_mem_util: f64,

    /// Maximum nodes removed per iteration.
    #[arg(long, env = "SCALE_DOWN_STEP", default_value_t = 1)]
    pub scale_down_step: usize,

    #[arg(long, env = "CPU_SHARES_PER_CORE", default_value_t = 2000)]
    pub cpu_shares_per_core: u64,

    /// JSON instance-type catalog.
    #[arg(long, env = "INSTANCE_CATALOG", default_value = "ec2instances.json")]
    pub instance_catalog: PathBuf,

    /// Pin the AWS region instead of resolving it from the environment,
    /// profile or instance metadata.
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Name marker of groups created by the autoscaler.
    #[arg(long, env = "MANAGED_GROUP_PREFIX", default_value = "nm-auto-")]
    pub managed_group_prefix: String,

    /// Existing group new groups are cloned from.
    #[arg(long, env = "TEMPLATE_GROUP")]
    pub template_group: String,

    /// Prefix to strip from node names to get instance ids.
    #[arg(long, env = "NODE_NAME_PREFIX", default_value = "")]
    pub node_name_prefix: String,

    #[arg(long, env = "STATE_CACHE_TTL_SECS", default_value_t = 10)]
    pub state_cache_ttl_secs: u64,
}

impl DaemonArgs {
    pub fn scaling_policy(&self) -> ScalingPolicy {
        ScalingPolicy {
            datacenter: self.datacenter.clone(),
            scale_up_cpu_util: self.scale_up_cpu_util,
            scale_up_mem_util: self.scale_up_mem_util,
            scale_down_cpu_util: self.scale_down_cpu_util,
            scale_down_mem_util: self.scale_down_mem_util,
            scale_down_step: self.scale_down_step,
            dry_run: self.dry_run,
            cpu_shares_per_core: self.cpu_shares_per_core,
            ..Default::default()
        }
    }

    pub fn nomad_config(&self) -> NomadConfig {
        let basic_auth = match (&self.nomad_auth_username, &self.nomad_auth_password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        NomadConfig {
            address: self.nomad_addr.clone(),
            token: self.nomad_token.clone(),
            basic_auth,
        }
    }

    pub fn aws_config(&self) -> AwsFleetConfig {
        AwsFleetConfig {
            region: self.aws_region.clone(),
            template_group: self.template_group.clone(),
            managed_prefix: self.managed_group_prefix.clone(),
            node_name_prefix: self.node_name_prefix.clone(),
            ..Default::default()
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            dry_run: self.dry_run,
            ..Default::default()
        }
    }

    pub fn state_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.state_cache_ttl_secs)
    }
}
