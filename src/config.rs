// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{gateway, task};
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the management-plane gateway, unused in simulation mode
    pub management_plane_url: Option<Url>,
    pub management_plane_token: Option<String>,
    /// Timeout applied to each gateway HTTP request
    pub request_timeout: Duration,
    /// Datacenter used to scope relative cluster paths when a resource
    /// does not name one
    pub default_datacenter: Option<String>,
    pub task_timeout: Duration,
    pub task_poll_interval: Duration,
    pub task_poll_max_interval: Duration,
    pub serialize_cluster_writes: bool,
    /// Run against an in-memory management plane instead of a gateway
    pub simulation_mode: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let simulation_mode = parse_or(&lookup, "SIMULATION_MODE", false)?;

        let management_plane_url = match lookup("MANAGEMENT_PLANE_URL") {
            Some(raw) => Some(
                Url::parse(&raw)
                    .with_context(|| format!("MANAGEMENT_PLANE_URL is not a valid URL: {}", raw))?,
            ),
            None if simulation_mode => None,
            None => bail!("MANAGEMENT_PLANE_URL environment variable not set"),
        };

        let task_poll_interval =
            Duration::from_millis(parse_or(&lookup, "TASK_POLL_INTERVAL_MS", task::POLL_INTERVAL_MS)?);
        let task_poll_max_interval = Duration::from_millis(parse_or(
            &lookup,
            "TASK_POLL_MAX_INTERVAL_MS",
            task::POLL_MAX_INTERVAL_MS,
        )?);
        if task_poll_interval.is_zero() || task_poll_max_interval < task_poll_interval {
            bail!(
                "TASK_POLL_INTERVAL_MS must be positive and not exceed TASK_POLL_MAX_INTERVAL_MS"
            );
        }

        let task_timeout_secs = parse_or(&lookup, "TASK_TIMEOUT_SECS", task::TIMEOUT_SECS)?;
        if task_timeout_secs == 0 || task_timeout_secs > task::MAX_TIMEOUT_SECS {
            bail!(
                "TASK_TIMEOUT_SECS must be between 1 and {}, got {}",
                task::MAX_TIMEOUT_SECS,
                task_timeout_secs
            );
        }

        let request_timeout_secs = parse_or(
            &lookup,
            "GATEWAY_REQUEST_TIMEOUT_SECS",
            gateway::REQUEST_TIMEOUT_SECS,
        )?;
        if request_timeout_secs == 0 || request_timeout_secs > task::MAX_TIMEOUT_SECS {
            bail!(
                "GATEWAY_REQUEST_TIMEOUT_SECS must be between 1 and {}, got {}",
                task::MAX_TIMEOUT_SECS,
                request_timeout_secs
            );
        }

        Ok(Config {
            management_plane_url,
            management_plane_token: lookup("MANAGEMENT_PLANE_TOKEN").filter(|t| !t.is_empty()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            default_datacenter: lookup("DEFAULT_DATACENTER").filter(|d| !d.is_empty()),
            task_timeout: Duration::from_secs(task_timeout_secs),
            task_poll_interval,
            task_poll_max_interval,
            serialize_cluster_writes: parse_or(&lookup, "SERIALIZE_CLUSTER_WRITES", true)?,
            simulation_mode,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}
