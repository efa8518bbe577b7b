// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clusterkeeper::config::Config;
use clusterkeeper::engine::Engine;
use clusterkeeper::kubernetes::wait_for_crds;
use clusterkeeper::reconcilers::{ConfigReconciler, GroupReconciler, RuleReconciler, VmOverrideReconciler};
use clusterkeeper::vsphere::{GatewayClient, ManagementPlane, SimulatedPlane};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting clusterkeeper operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: default_datacenter={:?}, simulation_mode={}",
        config.default_datacenter, config.simulation_mode
    );

    let plane: Arc<dyn ManagementPlane> = match &config.management_plane_url {
        Some(url) if !config.simulation_mode => Arc::new(
            GatewayClient::new(
                url.clone(),
                config.management_plane_token.clone(),
                config.request_timeout,
            )
            .context("Failed to create management plane client")?,
        ),
        _ => {
            warn!("Running against the in-memory simulated management plane");
            Arc::new(SimulatedPlane::new())
        }
    };

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for clusterkeeper CRDs to become available...");
    wait_for_crds(&client).await?;

    let shutdown = CancellationToken::new();
    let engine = Arc::new(Engine::from_config(plane, &config, shutdown.clone()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, stopping reconcilers");
            }
            shutdown.cancel();
        });
    }

    let rule_reconciler = RuleReconciler::new(client.clone(), engine.clone(), config.default_datacenter.clone());
    let group_reconciler = GroupReconciler::new(client.clone(), engine.clone(), config.default_datacenter.clone());
    let override_reconciler =
        VmOverrideReconciler::new(client.clone(), engine.clone(), config.default_datacenter.clone());
    let config_reconciler = ConfigReconciler::new(client, engine, config.default_datacenter.clone());

    info!("Starting reconcilers...");

    tokio::try_join!(
        rule_reconciler.run(shutdown.clone()),
        group_reconciler.run(shutdown.clone()),
        override_reconciler.run(shutdown.clone()),
        config_reconciler.run(shutdown.clone())
    )?;

    info!("All reconcilers stopped");
    Ok(())
}
