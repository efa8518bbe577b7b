// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory management plane.
//!
//! Backs the operator's simulation mode and the test-suite. Each reconfigure
//! is validated in full and then applied atomically; tasks complete after a
//! configurable number of polls. Like the real plane, rule names are not
//! required to be unique.

use super::types::*;
use super::{ManagementPlane, PlaneError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
pub struct SimulatedPlane {
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    objects: Vec<InventoryObject>,
    configs: HashMap<String, ClusterConfigInfo>,
    tasks: HashMap<String, SimTask>,
    next_id: u64,
    next_rule_key: i32,
    polls_to_complete: u32,
    reject_next: Option<String>,
    fail_next: Option<String>,
    hold_tasks: bool,
    reconfigure_calls: usize,
    last_spec: Option<ClusterConfigSpec>,
}

struct SimTask {
    remaining_polls: u32,
    outcome: TaskInfo,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn register(&mut self, kind: ObjectKind, id: String, name: &str, path: String, dc: Option<&str>) -> ManagedObjectRef {
        let reference = ManagedObjectRef::new(kind, id);
        self.objects.push(InventoryObject {
            reference: reference.clone(),
            name: name.to_string(),
            path,
            datacenter: dc.map(str::to_string),
        });
        reference
    }
}

impl SimulatedPlane {
    pub fn new() -> Self {
        let plane = Self::default();
        plane.state().next_rule_key = 1;
        plane
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_datacenter(&self, name: &str) -> ManagedObjectRef {
        let mut state = self.state();
        let id = format!("datacenter-{}", state.next_id());
        state.register(ObjectKind::Datacenter, id, name, format!("/{}", name), None)
    }

    pub fn add_cluster(&self, datacenter: &str, name: &str) -> ManagedObjectRef {
        let mut state = self.state();
        let id = format!("domain-c{}", state.next_id());
        let path = format!("/{}/host/{}", datacenter, name);
        let reference = state.register(ObjectKind::ClusterComputeResource, id, name, path, Some(datacenter));
        state
            .configs
            .insert(reference.value.clone(), ClusterConfigInfo::default());
        reference
    }

    pub fn add_datastore_cluster(&self, datacenter: &str, name: &str) -> ManagedObjectRef {
        let mut state = self.state();
        let id = format!("group-p{}", state.next_id());
        let path = format!("/{}/datastore/{}", datacenter, name);
        let reference = state.register(ObjectKind::StoragePod, id, name, path, Some(datacenter));
        state.configs.insert(
            reference.value.clone(),
            ClusterConfigInfo {
                storage_drs: Some(StorageDrsConfigInfo::default()),
                ..Default::default()
            },
        );
        reference
    }

    pub fn add_vm(&self, datacenter: &str, name: &str) -> ManagedObjectRef {
        let mut state = self.state();
        let id = format!("vm-{}", state.next_id());
        let path = format!("/{}/vm/{}", datacenter, name);
        state.register(ObjectKind::VirtualMachine, id, name, path, Some(datacenter))
    }

    pub fn add_host(&self, datacenter: &str, cluster: &str, name: &str) -> ManagedObjectRef {
        let mut state = self.state();
        let id = format!("host-{}", state.next_id());
        let path = format!("/{}/host/{}/{}", datacenter, cluster, name);
        state.register(ObjectKind::HostSystem, id, name, path, Some(datacenter))
    }

    /// Remove an object from the inventory, along with its configuration
    /// and any DRS overrides keyed on it.
    pub fn remove_object(&self, reference: &ManagedObjectRef) {
        let mut state = self.state();
        state.objects.retain(|o| &o.reference != reference);
        state.configs.remove(&reference.value);
        for config in state.configs.values_mut() {
            config.drs_vm_config.retain(|o| &o.key != reference);
        }
    }

    /// Key handed to the next rule added by a reconfigure.
    pub fn set_next_rule_key(&self, key: i32) {
        self.state().next_rule_key = key;
    }

    /// Number of `Running` polls a task reports before its outcome.
    pub fn set_task_polls(&self, polls: u32) {
        self.state().polls_to_complete = polls;
    }

    pub fn reject_next_reconfigure(&self, message: &str) {
        self.state().reject_next = Some(message.to_string());
    }

    pub fn fail_next_task(&self, message: &str) {
        self.state().fail_next = Some(message.to_string());
    }

    /// Keep every task running until released.
    pub fn hold_tasks(&self, hold: bool) {
        self.state().hold_tasks = hold;
    }

    /// Mutate a cluster's configuration directly, bypassing validation.
    pub fn edit_config(&self, cluster: &ManagedObjectRef, edit: impl FnOnce(&mut ClusterConfigInfo)) {
        if let Some(config) = self.state().configs.get_mut(&cluster.value) {
            edit(config);
        }
    }

    pub fn config(&self, cluster: &ManagedObjectRef) -> Option<ClusterConfigInfo> {
        self.state().configs.get(&cluster.value).cloned()
    }

    pub fn reconfigure_calls(&self) -> usize {
        self.state().reconfigure_calls
    }

    pub fn last_spec(&self) -> Option<ClusterConfigSpec> {
        self.state().last_spec.clone()
    }

    /// Tasks submitted but not yet reported as finished.
    pub fn pending_tasks(&self) -> usize {
        self.state().tasks.len()
    }
}

fn path_matches(object: &InventoryObject, query: &PathQuery) -> bool {
    if object.reference.kind != query.kind {
        return false;
    }
    if query.path.starts_with('/') {
        return object.path == query.path;
    }
    match (&query.datacenter, query.kind.inventory_folder()) {
        (Some(dc), Some(folder)) => object.path == format!("/{}/{}/{}", dc, folder, query.path),
        (Some(dc), None) => object.path == format!("/{}", dc),
        (None, _) => object.path.ends_with(&format!("/{}", query.path)),
    }
}

fn check_refs(objects: &[InventoryObject], refs: &[ManagedObjectRef], kind: ObjectKind) -> Result<(), PlaneError> {
    for reference in refs {
        if reference.kind != kind || !objects.iter().any(|o| &o.reference == reference) {
            return Err(PlaneError::InvalidArgument(format!(
                "managed object {} is not a valid {}",
                reference, kind
            )));
        }
    }
    Ok(())
}

fn check_detail(objects: &[InventoryObject], config: &ClusterConfigInfo, detail: &RuleDetail) -> Result<(), PlaneError> {
    match detail {
        RuleDetail::Affinity { vms } | RuleDetail::AntiAffinity { vms } => {
            check_refs(objects, vms, ObjectKind::VirtualMachine)
        }
        RuleDetail::VmHost {
            vm_group_name,
            affine_host_group_name,
            anti_affine_host_group_name,
        } => {
            let host_group = match (affine_host_group_name, anti_affine_host_group_name) {
                (Some(name), None) | (None, Some(name)) => name,
                _ => {
                    return Err(PlaneError::InvalidArgument(
                        "vm-host rule needs exactly one host group".to_string(),
                    ))
                }
            };
            let has_vm_group = config
                .groups
                .iter()
                .any(|g| matches!(g, GroupInfo::Vm { name, .. } if name == vm_group_name));
            let has_host_group = config
                .groups
                .iter()
                .any(|g| matches!(g, GroupInfo::Host { name, .. } if name == host_group));
            if !has_vm_group || !has_host_group {
                return Err(PlaneError::InvalidArgument(format!(
                    "groups {} / {} not found in cluster",
                    vm_group_name, host_group
                )));
            }
            Ok(())
        }
        RuleDetail::Unknown => Err(PlaneError::InvalidArgument(
            "unsupported rule type".to_string(),
        )),
    }
}

fn same_variant(a: &RuleDetail, b: &RuleDetail) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn apply_group_entry(objects: &[InventoryObject], config: &mut ClusterConfigInfo, entry: &GroupSpecEntry) -> Result<(), PlaneError> {
    match entry.operation {
        ArrayUpdateOperation::Remove => {
            let name = entry
                .remove_key
                .as_deref()
                .ok_or_else(|| PlaneError::InvalidArgument("group removal without key".to_string()))?;
            let in_use = config.rules.iter().any(|r| match &r.detail {
                Some(RuleDetail::VmHost {
                    vm_group_name,
                    affine_host_group_name,
                    anti_affine_host_group_name,
                }) => {
                    vm_group_name == name
                        || affine_host_group_name.as_deref() == Some(name)
                        || anti_affine_host_group_name.as_deref() == Some(name)
                }
                _ => false,
            });
            if in_use {
                return Err(PlaneError::InvalidArgument(format!(
                    "group {} is referenced by a rule",
                    name
                )));
            }
            let before = config.groups.len();
            config.groups.retain(|g| g.name() != name);
            if config.groups.len() == before {
                return Err(PlaneError::NotFound(format!("group {}", name)));
            }
            Ok(())
        }
        operation => {
            let info = entry
                .info
                .as_ref()
                .ok_or_else(|| PlaneError::InvalidArgument("group spec without info".to_string()))?;
            match info {
                GroupInfo::Vm { vms, .. } => check_refs(objects, vms, ObjectKind::VirtualMachine)?,
                GroupInfo::Host { hosts, .. } => check_refs(objects, hosts, ObjectKind::HostSystem)?,
            }
            let existing = config.groups.iter().position(|g| g.name() == info.name());
            match (operation, existing) {
                (ArrayUpdateOperation::Add, Some(_)) => {
                    Err(PlaneError::DuplicateName(info.name().to_string()))
                }
                (ArrayUpdateOperation::Add, None) => {
                    config.groups.push(info.clone());
                    Ok(())
                }
                (_, None) => Err(PlaneError::NotFound(format!("group {}", info.name()))),
                (_, Some(index)) => {
                    let current = &mut config.groups[index];
                    if std::mem::discriminant(current) != std::mem::discriminant(info) {
                        return Err(PlaneError::InvalidArgument(format!(
                            "group {} changes type",
                            info.name()
                        )));
                    }
                    *current = info.clone();
                    Ok(())
                }
            }
        }
    }
}

fn apply_rule_entry(
    objects: &[InventoryObject],
    config: &mut ClusterConfigInfo,
    entry: &RuleSpecEntry,
    next_key: &mut i32,
) -> Result<(), PlaneError> {
    match entry.operation {
        ArrayUpdateOperation::Add => {
            let info = entry
                .info
                .as_ref()
                .ok_or_else(|| PlaneError::InvalidArgument("rule spec without info".to_string()))?;
            let name = info
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| PlaneError::InvalidArgument("rule name is required".to_string()))?;
            let detail = info
                .detail
                .clone()
                .ok_or_else(|| PlaneError::InvalidArgument("rule type is required".to_string()))?;
            check_detail(objects, config, &detail)?;
            let key = *next_key;
            *next_key += 1;
            config.rules.push(RuleInfo {
                key: Some(key),
                name: Some(name),
                enabled: Some(info.enabled.unwrap_or(true)),
                mandatory: Some(info.mandatory.unwrap_or(false)),
                status: Some("green".to_string()),
                detail: Some(detail),
            });
            Ok(())
        }
        ArrayUpdateOperation::Edit => {
            let info = entry
                .info
                .as_ref()
                .ok_or_else(|| PlaneError::InvalidArgument("rule spec without info".to_string()))?;
            let key = info
                .key
                .ok_or_else(|| PlaneError::InvalidArgument("rule edit without key".to_string()))?;
            if let Some(detail) = &info.detail {
                check_detail(objects, config, detail)?;
            }
            let rule = config
                .rules
                .iter_mut()
                .find(|r| r.key == Some(key))
                .ok_or_else(|| PlaneError::NotFound(format!("rule key {}", key)))?;
            if let Some(detail) = &info.detail {
                if let Some(current) = &rule.detail {
                    if !same_variant(current, detail) {
                        return Err(PlaneError::InvalidArgument(format!(
                            "rule {} changes type",
                            key
                        )));
                    }
                }
                rule.detail = Some(detail.clone());
            }
            if let Some(name) = &info.name {
                rule.name = Some(name.clone());
            }
            if let Some(enabled) = info.enabled {
                rule.enabled = Some(enabled);
            }
            if let Some(mandatory) = info.mandatory {
                rule.mandatory = Some(mandatory);
            }
            Ok(())
        }
        ArrayUpdateOperation::Remove => {
            let key = entry
                .remove_key
                .ok_or_else(|| PlaneError::InvalidArgument("rule removal without key".to_string()))?;
            let before = config.rules.len();
            config.rules.retain(|r| r.key != Some(key));
            if config.rules.len() == before {
                return Err(PlaneError::NotFound(format!("rule key {}", key)));
            }
            Ok(())
        }
    }
}

fn apply_vm_override_entry(
    objects: &[InventoryObject],
    config: &mut ClusterConfigInfo,
    entry: &DrsVmConfigSpecEntry,
) -> Result<(), PlaneError> {
    if entry.operation == ArrayUpdateOperation::Remove {
        let vm = entry
            .remove_key
            .as_ref()
            .ok_or_else(|| PlaneError::InvalidArgument("override removal without key".to_string()))?;
        let before = config.drs_vm_config.len();
        config.drs_vm_config.retain(|o| &o.key != vm);
        if config.drs_vm_config.len() == before {
            return Err(PlaneError::NotFound(format!("DRS override for {}", vm)));
        }
        return Ok(());
    }

    let info = entry
        .info
        .as_ref()
        .ok_or_else(|| PlaneError::InvalidArgument("override spec without info".to_string()))?;
    check_refs(objects, std::slice::from_ref(&info.key), ObjectKind::VirtualMachine)?;
    let existing = config.drs_vm_config.iter_mut().find(|o| o.key == info.key);
    match (entry.operation, existing) {
        (ArrayUpdateOperation::Add, Some(current)) => {
            *current = info.clone();
            Ok(())
        }
        (_, Some(current)) => {
            merge(&mut current.enabled, &info.enabled);
            merge(&mut current.behavior, &info.behavior);
            Ok(())
        }
        (ArrayUpdateOperation::Add, None) => {
            config.drs_vm_config.push(info.clone());
            Ok(())
        }
        (_, None) => Err(PlaneError::NotFound(format!("DRS override for {}", info.key))),
    }
}

fn merge<T: Clone>(current: &mut Option<T>, update: &Option<T>) {
    if let Some(value) = update {
        *current = Some(value.clone());
    }
}

fn apply_spec(
    objects: &[InventoryObject],
    config: &mut ClusterConfigInfo,
    spec: &ClusterConfigSpec,
    next_key: &mut i32,
) -> Result<(), PlaneError> {
    for entry in &spec.group_spec {
        apply_group_entry(objects, config, entry)?;
    }
    for entry in &spec.rules_spec {
        apply_rule_entry(objects, config, entry, next_key)?;
    }
    for entry in &spec.drs_vm_config_spec {
        apply_vm_override_entry(objects, config, entry)?;
    }
    if let Some(drs) = &spec.drs_config {
        let current = &mut config.drs;
        merge(&mut current.enabled, &drs.enabled);
        merge(&mut current.default_vm_behavior, &drs.default_vm_behavior);
        merge(&mut current.vmotion_rate, &drs.vmotion_rate);
        merge(
            &mut current.enable_vm_behavior_overrides,
            &drs.enable_vm_behavior_overrides,
        );
    }
    if let Some(das) = &spec.das_config {
        merge(&mut config.das.enabled, &das.enabled);
        merge(&mut config.das.host_monitoring, &das.host_monitoring);
    }
    if let Some(sdrs) = &spec.storage_drs_config {
        let current = config.storage_drs.as_mut().ok_or_else(|| {
            PlaneError::InvalidArgument("storage DRS is not available on this object".to_string())
        })?;
        merge(&mut current.enabled, &sdrs.enabled);
        merge(&mut current.default_vm_behavior, &sdrs.default_vm_behavior);
        merge(
            &mut current.space_utilization_threshold,
            &sdrs.space_utilization_threshold,
        );
        merge(&mut current.io_latency_threshold, &sdrs.io_latency_threshold);
        merge(
            &mut current.io_load_balance_enabled,
            &sdrs.io_load_balance_enabled,
        );
    }
    Ok(())
}

#[async_trait]
impl ManagementPlane for SimulatedPlane {
    async fn find_by_id(&self, kind: ObjectKind, id: &str) -> Result<Option<InventoryObject>, PlaneError> {
        Ok(self
            .state()
            .objects
            .iter()
            .find(|o| o.reference.kind == kind && o.reference.value == id)
            .cloned())
    }

    async fn find_by_path(&self, query: &PathQuery) -> Result<Vec<InventoryObject>, PlaneError> {
        Ok(self
            .state()
            .objects
            .iter()
            .filter(|o| path_matches(o, query))
            .cloned()
            .collect())
    }

    async fn get_cluster_config(&self, cluster: &ManagedObjectRef) -> Result<ClusterConfigInfo, PlaneError> {
        self.state()
            .configs
            .get(&cluster.value)
            .cloned()
            .ok_or_else(|| PlaneError::NotFound(cluster.to_string()))
    }

    async fn reconfigure(&self, cluster: &ManagedObjectRef, spec: &ClusterConfigSpec) -> Result<TaskHandle, PlaneError> {
        let mut state = self.state();
        state.reconfigure_calls += 1;
        state.last_spec = Some(spec.clone());

        if let Some(message) = state.reject_next.take() {
            return Err(PlaneError::InvalidArgument(message));
        }

        let mut next = state
            .configs
            .get(&cluster.value)
            .cloned()
            .ok_or_else(|| PlaneError::NotFound(cluster.to_string()))?;
        let mut next_key = state.next_rule_key;
        apply_spec(&state.objects, &mut next, spec, &mut next_key)?;

        let outcome = match state.fail_next.take() {
            Some(message) => TaskInfo::failed(message),
            None => {
                state.configs.insert(cluster.value.clone(), next);
                state.next_rule_key = next_key;
                TaskInfo::success()
            }
        };

        let task = TaskHandle(format!("task-{}", state.next_id()));
        let remaining_polls = state.polls_to_complete;
        state.tasks.insert(
            task.0.clone(),
            SimTask {
                remaining_polls,
                outcome,
            },
        );
        debug!("Simulated reconfigure of {} accepted as {}", cluster, task);
        Ok(task)
    }

    async fn task_info(&self, task: &TaskHandle) -> Result<TaskInfo, PlaneError> {
        let mut state = self.state();
        let hold = state.hold_tasks;
        let sim = state
            .tasks
            .get_mut(&task.0)
            .ok_or_else(|| PlaneError::NotFound(task.to_string()))?;
        if hold {
            return Ok(TaskInfo::running());
        }
        if sim.remaining_polls > 0 {
            sim.remaining_polls -= 1;
            return Ok(TaskInfo::running());
        }
        // Finished tasks are reported once and then forgotten.
        let finished = state.tasks.remove(&task.0);
        Ok(finished.map(|t| t.outcome).unwrap_or_else(TaskInfo::success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_spec(name: &str, vms: Vec<ManagedObjectRef>) -> ClusterConfigSpec {
        ClusterConfigSpec {
            rules_spec: vec![RuleSpecEntry {
                operation: ArrayUpdateOperation::Add,
                remove_key: None,
                info: Some(RuleInfo {
                    name: Some(name.to_string()),
                    detail: Some(RuleDetail::AntiAffinity { vms }),
                    ..Default::default()
                }),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_relative_path_without_datacenter_matches_everywhere() {
        let plane = SimulatedPlane::new();
        plane.add_cluster("dc1", "prod");
        plane.add_cluster("dc2", "prod");

        let found = plane
            .find_by_path(&PathQuery {
                datacenter: None,
                path: "prod".to_string(),
                kind: ObjectKind::ClusterComputeResource,
            })
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_rule_names_are_accepted() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "a");

        plane.reconfigure(&cluster, &add_spec("spread", vec![vm.clone()])).await.unwrap();
        plane.reconfigure(&cluster, &add_spec("spread", vec![vm])).await.unwrap();

        let config = plane.config(&cluster).unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_ne!(config.rules[0].key, config.rules[1].key);
    }

    #[tokio::test]
    async fn test_invalid_entry_leaves_config_untouched() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "a");
        let mut spec = add_spec("spread", vec![vm]);
        spec.rules_spec.push(RuleSpecEntry {
            operation: ArrayUpdateOperation::Remove,
            remove_key: Some(99),
            info: None,
        });

        let result = plane.reconfigure(&cluster, &spec).await;

        assert!(matches!(result, Err(PlaneError::NotFound(_))));
        assert!(plane.config(&cluster).unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_does_not_apply() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "a");
        plane.fail_next_task("insufficient resources");

        let task = plane.reconfigure(&cluster, &add_spec("spread", vec![vm])).await.unwrap();
        let info = plane.task_info(&task).await.unwrap();

        assert_eq!(info.state, TaskState::Error);
        assert!(plane.config(&cluster).unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_task_reports_running_until_polls_exhausted() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        plane.set_task_polls(2);

        let task = plane
            .reconfigure(&cluster, &ClusterConfigSpec::default())
            .await
            .unwrap();

        assert_eq!(plane.task_info(&task).await.unwrap().state, TaskState::Running);
        assert_eq!(plane.task_info(&task).await.unwrap().state, TaskState::Running);
        assert_eq!(plane.task_info(&task).await.unwrap().state, TaskState::Success);
    }

    #[tokio::test]
    async fn test_finished_tasks_are_evicted() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");

        for _ in 0..3 {
            let task = plane
                .reconfigure(&cluster, &ClusterConfigSpec::default())
                .await
                .unwrap();
            assert_eq!(plane.task_info(&task).await.unwrap().state, TaskState::Success);
            assert!(matches!(plane.task_info(&task).await, Err(PlaneError::NotFound(_))));
        }

        assert_eq!(plane.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn test_held_tasks_are_kept_until_finished() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        plane.hold_tasks(true);

        let task = plane
            .reconfigure(&cluster, &ClusterConfigSpec::default())
            .await
            .unwrap();
        assert_eq!(plane.task_info(&task).await.unwrap().state, TaskState::Running);
        assert_eq!(plane.pending_tasks(), 1);

        plane.hold_tasks(false);
        assert_eq!(plane.task_info(&task).await.unwrap().state, TaskState::Success);
        assert_eq!(plane.pending_tasks(), 0);
    }

    fn override_spec(operation: ArrayUpdateOperation, vm: &ManagedObjectRef, behavior: &str) -> ClusterConfigSpec {
        ClusterConfigSpec {
            drs_vm_config_spec: vec![DrsVmConfigSpecEntry {
                operation,
                remove_key: None,
                info: Some(DrsVmConfigInfo {
                    key: vm.clone(),
                    enabled: Some(true),
                    behavior: Some(behavior.to_string()),
                }),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_vm_override_add_replaces_existing_entry() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "db-1");

        plane
            .reconfigure(&cluster, &override_spec(ArrayUpdateOperation::Add, &vm, "manual"))
            .await
            .unwrap();
        plane
            .reconfigure(&cluster, &override_spec(ArrayUpdateOperation::Add, &vm, "fullyAutomated"))
            .await
            .unwrap();

        let overrides = plane.config(&cluster).unwrap().drs_vm_config;
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].behavior.as_deref(), Some("fullyAutomated"));
    }

    #[tokio::test]
    async fn test_vm_override_edit_and_remove_require_an_entry() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "db-1");

        let edit = plane
            .reconfigure(&cluster, &override_spec(ArrayUpdateOperation::Edit, &vm, "manual"))
            .await;
        let remove = plane
            .reconfigure(
                &cluster,
                &ClusterConfigSpec {
                    drs_vm_config_spec: vec![DrsVmConfigSpecEntry {
                        operation: ArrayUpdateOperation::Remove,
                        remove_key: Some(vm.clone()),
                        info: None,
                    }],
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(edit, Err(PlaneError::NotFound(_))));
        assert!(matches!(remove, Err(PlaneError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_removing_a_vm_drops_its_override() {
        let plane = SimulatedPlane::new();
        let cluster = plane.add_cluster("dc1", "prod");
        let vm = plane.add_vm("dc1", "db-1");
        plane
            .reconfigure(&cluster, &override_spec(ArrayUpdateOperation::Add, &vm, "manual"))
            .await
            .unwrap();

        plane.remove_object(&vm);

        assert!(plane.config(&cluster).unwrap().drs_vm_config.is_empty());
    }
}
