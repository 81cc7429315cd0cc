//! Fleet backend for EC2 Auto Scaling, built on the AWS SDK.
//!
//! Region and credentials come from the SDK's default provider chain
//! (environment, shared profile, instance metadata) unless a region is
//! pinned in [`AwsFleetConfig`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_autoscaling::config::Region;
use aws_sdk_autoscaling::error::DisplayErrorContext;
use aws_sdk_autoscaling::types::{
    AutoScalingGroup, LaunchTemplate, LaunchTemplateOverrides, LaunchTemplateSpecification,
    MixedInstancesPolicy, Tag,
};
use aws_sdk_ec2::client::Waiters;
use tracing::{debug, info, warn};

use crate::error::{FleetError, FleetResult};
use crate::group::{GroupMember, ManagedGroup};
use crate::provider::FleetProvider;

const GROUP_NAME_TAG: &str = "aws:autoscaling:groupName";
const LAUNCH_VERSION_TAG: &str = "aws:ec2launchtemplate:version";

/// Settings for [`AwsFleet`].
#[derive(Debug, Clone)]
pub struct AwsFleetConfig {
    /// Pinned region. `None` resolves it through the default chain.
    pub region: Option<String>,
    /// Existing group whose launch template, subnets and tags new groups copy.
    pub template_group: String,
    /// Name marker of groups owned by the autoscaler.
    pub managed_prefix: String,
    /// Prefix the scheduler adds to instance ids to form node names.
    pub node_name_prefix: String,
    /// Upper bound on waiting for a terminated instance to go away.
    pub termination_timeout: Duration,
}

impl Default for AwsFleetConfig {
    fn default() -> Self {
        Self {
            region: None,
            template_group: String::new(),
            managed_prefix: "nm-auto-".to_string(),
            node_name_prefix: String::new(),
            termination_timeout: Duration::from_secs(600),
        }
    }
}

/// Normalizes SDK getters, which return a bare value for required members
/// and an `Option` for the rest.
fn opt<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

fn sdk_error(operation: &str, err: impl std::error::Error) -> FleetError {
    FleetError::api(operation, DisplayErrorContext(err))
}

/// Clamp a capacity into the SDK's integer range.
fn capacity(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Reported sizes; missing or negative reads as zero.
fn size(value: Option<i32>) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

// ── SDK shapes, reduced to what the autoscaler reads ───────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GroupRecord {
    name: String,
    desired_capacity: u32,
    max_size: u32,
    /// Mixed-instances groups carry the template inside the policy.
    launch_template: Option<String>,
    vpc_zone_identifier: Option<String>,
    tags: Vec<(String, String)>,
    instance_ids: Vec<String>,
}

impl From<&AutoScalingGroup> for GroupRecord {
    fn from(g: &AutoScalingGroup) -> Self {
        let mixed = g
            .mixed_instances_policy()
            .and_then(|p| p.launch_template())
            .and_then(|t| t.launch_template_specification())
            .and_then(|s| s.launch_template_name());
        let direct = g.launch_template().and_then(|s| s.launch_template_name());

        Self {
            name: opt::<&str>(g.auto_scaling_group_name()).unwrap_or_default().to_string(),
            desired_capacity: size(opt(g.desired_capacity())),
            max_size: size(opt(g.max_size())),
            launch_template: mixed.or(direct).map(str::to_string),
            vpc_zone_identifier: opt::<&str>(g.vpc_zone_identifier()).map(str::to_string),
            tags: g
                .tags()
                .iter()
                .filter_map(|t| {
                    let key = opt::<&str>(t.key())?;
                    let value = opt::<&str>(t.value()).unwrap_or_default();
                    Some((key.to_string(), value.to_string()))
                })
                .collect(),
            instance_ids: g
                .instances()
                .iter()
                .filter_map(|i| opt::<&str>(i.instance_id()))
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InstanceRecord {
    instance_id: String,
    tags: BTreeMap<String, String>,
}

impl From<&aws_sdk_ec2::types::Instance> for InstanceRecord {
    fn from(i: &aws_sdk_ec2::types::Instance) -> Self {
        Self {
            instance_id: i.instance_id().unwrap_or_default().to_string(),
            tags: i
                .tags()
                .iter()
                .filter_map(|t| {
                    let key = t.key()?.to_string();
                    Some((key, t.value().unwrap_or_default().to_string()))
                })
                .collect(),
        }
    }
}

/// A new managed group, cloned from the template group.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CreateGroupRequest {
    name: String,
    instance_type: String,
    launch_template: String,
    vpc_zone_identifier: Option<String>,
    tags: Vec<(String, String)>,
}

impl CreateGroupRequest {
    const MIN_SIZE: i32 = 0;
    const MAX_SIZE: i32 = 2;
    const DESIRED_CAPACITY: i32 = 1;
    const TEMPLATE_VERSION: &'static str = "$Latest";

    fn from_template(template: &GroupRecord, name: &str, instance_type: &str) -> FleetResult<Self> {
        let launch_template = template
            .launch_template
            .clone()
            .ok_or_else(|| {
                FleetError::NotFound(format!("launch template of group {}", template.name))
            })?;

        Ok(Self {
            name: name.to_string(),
            instance_type: instance_type.to_string(),
            launch_template,
            vpc_zone_identifier: template.vpc_zone_identifier.clone(),
            tags: template.tags.clone(),
        })
    }

    fn mixed_instances_policy(&self) -> MixedInstancesPolicy {
        let spec = LaunchTemplateSpecification::builder()
            .launch_template_name(&self.launch_template)
            .version(Self::TEMPLATE_VERSION)
            .build();
        let overrides = LaunchTemplateOverrides::builder()
            .instance_type(&self.instance_type)
            .build();

        MixedInstancesPolicy::builder()
            .launch_template(
                LaunchTemplate::builder()
                    .launch_template_specification(spec)
                    .overrides(overrides)
                    .build(),
            )
            .build()
    }

    fn sdk_tags(&self) -> FleetResult<Vec<Tag>> {
        self.tags
            .iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .propagate_at_launch(true)
                    .build()
                    .map_err(|e| sdk_error("CreateAutoScalingGroup", e))
            })
            .collect()
    }
}

/// Build the managed group view from a group and its members' tags.
fn to_managed_group(
    group: &GroupRecord,
    versions: &BTreeMap<String, Option<String>>,
) -> ManagedGroup {
    ManagedGroup {
        name: group.name.clone(),
        desired_capacity: group.desired_capacity,
        max_capacity: group.max_size,
        launch_template: group.launch_template.clone().unwrap_or_default(),
        members: group
            .instance_ids
            .iter()
            .map(|id| GroupMember {
                instance_id: id.clone(),
                launch_version: versions.get(id).cloned().flatten(),
            })
            .collect(),
    }
}

fn newest_version(versions: impl IntoIterator<Item = i64>) -> Option<String> {
    versions.into_iter().max().map(|v| v.to_string())
}

/// Scheduler node name → EC2 instance id.
fn instance_id_for(node_name_prefix: &str, node_id: &str) -> String {
    node_id.strip_prefix(node_name_prefix).unwrap_or(node_id).to_string()
}

/// EC2 Auto Scaling fleet reached through the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsFleet {
    config: AwsFleetConfig,
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
}

impl AwsFleet {
    /// Resolve region and credentials, then build the SDK clients.
    pub async fn connect(config: AwsFleetConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk = loader.load().await;

        info!(
            region = ?sdk.region(),
            template_group = %config.template_group,
            managed_prefix = %config.managed_prefix,
            "aws fleet provider ready"
        );
        Self::from_sdk_config(&sdk, config)
    }

    pub fn from_sdk_config(sdk: &SdkConfig, config: AwsFleetConfig) -> Self {
        Self {
            autoscaling: aws_sdk_autoscaling::Client::new(sdk),
            ec2: aws_sdk_ec2::Client::new(sdk),
            config,
        }
    }

    pub fn instance_id_for(&self, node_id: &str) -> String {
        instance_id_for(&self.config.node_name_prefix, node_id)
    }

    async fn describe_groups(&self, names: Option<Vec<String>>) -> FleetResult<Vec<GroupRecord>> {
        let mut groups = Vec::new();
        let mut next_token = None;
        loop {
            let out = self
                .autoscaling
                .describe_auto_scaling_groups()
                .set_auto_scaling_group_names(names.clone())
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeAutoScalingGroups", e))?;

            groups.extend(out.auto_scaling_groups().iter().map(GroupRecord::from));
            match out.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(groups)
    }

    async fn describe_instances(&self, ids: Vec<String>) -> FleetResult<Vec<InstanceRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut instances = Vec::new();
        let mut next_token = None;
        loop {
            let out = self
                .ec2
                .describe_instances()
                .set_instance_ids(Some(ids.clone()))
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeInstances", e))?;

            instances.extend(
                out.reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .map(InstanceRecord::from),
            );
            match out.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(instances)
    }

    async fn terminate_instance(&self, instance_id: &str) -> FleetResult<()> {
        self.autoscaling
            .terminate_instance_in_auto_scaling_group()
            .instance_id(instance_id)
            .should_decrement_desired_capacity(true)
            .send()
            .await
            .map_err(|e| sdk_error("TerminateInstanceInAutoScalingGroup", e))?;
        info!(instance = %instance_id, "terminating instance");

        self.ec2
            .wait_until_instance_terminated()
            .instance_ids(instance_id)
            .wait(self.config.termination_timeout)
            .await
            .map_err(|e| sdk_error("WaitUntilInstanceTerminated", e))?;
        info!(instance = %instance_id, "instance terminated");
        Ok(())
    }
}

#[async_trait]
impl FleetProvider for AwsFleet {
    async fn create_group(&self, name: &str, instance_type: &str) -> FleetResult<()> {
        let template = self
            .describe_groups(Some(vec![self.config.template_group.clone()]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                FleetError::NotFound(format!("template group {}", self.config.template_group))
            })?;

        let request = CreateGroupRequest::from_template(&template, name, instance_type)?;
        self.autoscaling
            .create_auto_scaling_group()
            .auto_scaling_group_name(&request.name)
            .min_size(CreateGroupRequest::MIN_SIZE)
            .max_size(CreateGroupRequest::MAX_SIZE)
            .desired_capacity(CreateGroupRequest::DESIRED_CAPACITY)
            .set_vpc_zone_identifier(request.vpc_zone_identifier.clone())
            .set_tags(Some(request.sdk_tags()?))
            .mixed_instances_policy(request.mixed_instances_policy())
            .send()
            .await
            .map_err(|e| sdk_error("CreateAutoScalingGroup", e))?;

        info!(
            group = %name,
            %instance_type,
            launch_template = %request.launch_template,
            "managed group created"
        );
        Ok(())
    }

    async fn delete_group_or_terminate(&self, node_id: &str) -> FleetResult<()> {
        let instance_id = self.instance_id_for(node_id);
        let instance = self
            .describe_instances(vec![instance_id.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FleetError::NotFound(format!("instance {instance_id}")))?;

        let Some(group) = instance.tags.get(GROUP_NAME_TAG) else {
            return Err(FleetError::NotFound(format!(
                "auto scaling group of instance {instance_id}"
            )));
        };

        if group.starts_with(&self.config.managed_prefix) {
            info!(instance = %instance_id, %group, "deleting managed group");
            self.autoscaling
                .delete_auto_scaling_group()
                .auto_scaling_group_name(group)
                .force_delete(true)
                .send()
                .await
                .map_err(|e| sdk_error("DeleteAutoScalingGroup", e))?;
            info!(%group, "managed group deleted");
            Ok(())
        } else {
            info!(
                instance = %instance_id,
                %group,
                "group is not managed, terminating instance only"
            );
            self.terminate_instance(&instance_id).await
        }
    }

    async fn list_managed_groups(&self) -> FleetResult<Vec<ManagedGroup>> {
        let groups: Vec<GroupRecord> = self
            .describe_groups(None)
            .await?
            .into_iter()
            .filter(|g| g.name.contains(&self.config.managed_prefix))
            .collect();
        debug!(managed = groups.len(), "listed managed groups");

        let ids: Vec<String> = groups.iter().flat_map(|g| g.instance_ids.iter().cloned()).collect();
        let versions: BTreeMap<String, Option<String>> = self
            .describe_instances(ids)
            .await?
            .into_iter()
            .map(|i| {
                let version = i.tags.get(LAUNCH_VERSION_TAG).cloned();
                if version.is_none() {
                    warn!(instance = %i.instance_id, "instance has no launch template version tag");
                }
                (i.instance_id, version)
            })
            .collect();

        Ok(groups.iter().map(|g| to_managed_group(g, &versions)).collect())
    }

    async fn latest_launch_version(&self, group: &ManagedGroup) -> FleetResult<String> {
        let mut numbers = Vec::new();
        let mut next_token = None;
        loop {
            let out = self
                .ec2
                .describe_launch_template_versions()
                .launch_template_name(&group.launch_template)
                .set_next_token(next_token)
                .send()
                .await
                .map_err(|e| sdk_error("DescribeLaunchTemplateVersions", e))?;

            let versions = out.launch_template_versions();
            numbers.extend(versions.iter().filter_map(|v| v.version_number()));
            match out.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        newest_version(numbers).ok_or_else(|| {
            FleetError::NotFound(format!("versions of launch template {}", group.launch_template))
        })
    }

    async fn set_desired_capacity(&self, group: &str, desired: u32) -> FleetResult<()> {
        self.autoscaling
            .set_desired_capacity()
            .auto_scaling_group_name(group)
            .desired_capacity(capacity(desired))
            .send()
            .await
            .map_err(|e| sdk_error("SetDesiredCapacity", e))?;
        debug!(%group, desired, "desired capacity set");
        Ok(())
    }

    async fn set_max_capacity(&self, group: &str, max: u32) -> FleetResult<()> {
        self.autoscaling
            .update_auto_scaling_group()
            .auto_scaling_group_name(group)
            .max_size(capacity(max))
            .send()
            .await
            .map_err(|e| sdk_error("UpdateAutoScalingGroup", e))?;
        debug!(%group, max, "max capacity set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_group() -> GroupRecord {
        GroupRecord {
            name: "nomad-workers".to_string(),
            desired_capacity: 3,
            max_size: 6,
            launch_template: Some("nomad-client".to_string()),
            vpc_zone_identifier: Some("subnet-a,subnet-b".to_string()),
            tags: vec![("team".to_string(), "infra".to_string())],
            instance_ids: vec!["i-0aa".to_string()],
        }
    }

    #[test]
    fn create_request_clones_template_group() {
        let template = template_group();
        let req =
            CreateGroupRequest::from_template(&template, "nm-auto-deadbeef", "c5.xlarge").unwrap();

        assert_eq!(req.name, "nm-auto-deadbeef");
        assert_eq!(req.instance_type, "c5.xlarge");
        assert_eq!(req.launch_template, "nomad-client");
        assert_eq!(req.vpc_zone_identifier.as_deref(), Some("subnet-a,subnet-b"));
        assert_eq!(req.tags, vec![("team".to_string(), "infra".to_string())]);
    }

    #[test]
    fn create_request_sizes_one_instance_with_room_for_a_surge() {
        assert_eq!(CreateGroupRequest::MIN_SIZE, 0);
        assert_eq!(CreateGroupRequest::DESIRED_CAPACITY, 1);
        assert_eq!(CreateGroupRequest::MAX_SIZE, 2);
        assert_eq!(CreateGroupRequest::TEMPLATE_VERSION, "$Latest");
    }

    #[test]
    fn mixed_policy_overrides_instance_type() {
        let req =
            CreateGroupRequest::from_template(&template_group(), "nm-auto-x", "m5.large").unwrap();
        let policy = req.mixed_instances_policy();
        let lt = policy.launch_template().unwrap();

        let spec = lt.launch_template_specification().unwrap();
        assert_eq!(spec.launch_template_name(), Some("nomad-client"));
        assert_eq!(spec.version(), Some("$Latest"));
        assert_eq!(lt.overrides()[0].instance_type(), Some("m5.large"));
    }

    #[test]
    fn create_request_needs_a_launch_template() {
        let mut template = template_group();
        template.launch_template = None;
        assert!(matches!(
            CreateGroupRequest::from_template(&template, "nm-auto-x", "t3.micro"),
            Err(FleetError::NotFound(_))
        ));
    }

    #[test]
    fn managed_group_carries_member_versions() {
        let group = GroupRecord {
            name: "nm-auto-1a2b3c4d".to_string(),
            desired_capacity: 1,
            max_size: 2,
            launch_template: Some("nomad-client".to_string()),
            instance_ids: vec!["i-0bb".to_string(), "i-0cc".to_string()],
            ..Default::default()
        };
        let mut versions = BTreeMap::new();
        versions.insert("i-0bb".to_string(), Some("4".to_string()));
        versions.insert("i-0cc".to_string(), None);

        let g = to_managed_group(&group, &versions);
        assert_eq!(g.name, "nm-auto-1a2b3c4d");
        assert_eq!(g.max_capacity, 2);
        assert_eq!(g.launch_template, "nomad-client");
        assert_eq!(g.members[0].launch_version.as_deref(), Some("4"));
        assert_eq!(g.members[1].launch_version, None);
        assert!(g.is_stale("4"));
    }

    #[test]
    fn newest_version_is_the_highest_number() {
        assert_eq!(newest_version([1, 7, 3]), Some("7".to_string()));
        assert_eq!(newest_version(Vec::new()), None);
    }

    #[test]
    fn capacities_clamp_into_sdk_range() {
        assert_eq!(capacity(3), 3);
        assert_eq!(capacity(u32::MAX), i32::MAX);
        assert_eq!(size(Some(4)), 4);
        assert_eq!(size(Some(-1)), 0);
        assert_eq!(size(None), 0);
    }

    #[test]
    fn node_name_maps_to_instance_id() {
        assert_eq!(instance_id_for("", "i-0abc123"), "i-0abc123");
        assert_eq!(instance_id_for("n-", "n-i-0abc123"), "i-0abc123");
        assert_eq!(instance_id_for("n-", "i-0abc123"), "i-0abc123");
    }

    #[test]
    fn default_config_defers_region_to_the_sdk() {
        let cfg = AwsFleetConfig::default();
        assert!(cfg.region.is_none());
        assert_eq!(cfg.managed_prefix, "nm-auto-");
        assert_eq!(cfg.termination_timeout, Duration::from_secs(600));
    }
}
