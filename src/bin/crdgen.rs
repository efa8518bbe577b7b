// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::CustomResourceExt;

use clusterkeeper::types::resources::{
    ComputeClusterConfig, ComputeClusterGroup, ComputeClusterRule, ComputeClusterVmOverride,
};

/// Print the CustomResourceDefinitions as a multi-document YAML stream.
fn main() -> Result<()> {
    let crds = [
        ComputeClusterRule::crd(),
        ComputeClusterGroup::crd(),
        ComputeClusterVmOverride::crd(),
        ComputeClusterConfig::crd(),
    ];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
