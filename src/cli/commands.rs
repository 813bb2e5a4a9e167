//! CLI command implementations
//!
//! `run` boots an in-process cluster from the config file, then serves one
//! JSON request per stdin line until EOF:
//!
//! ```text
//! {"op":"alter","schema":"name: string @index(exact) ."}
//! {"op":"mutate","set_nquads":"_:a <name> \"Alice\" ."}
//! {"op":"set_mode","mode":"strict"}
//! {"op":"schema","shard":2,"replica":1}
//! {"op":"metrics"}
//! ```
//!
//! `shard` and `replica` pick the node that receives the request; the
//! default is the leader of the lowest shard. A failed request produces an
//! error response and the loop carries on.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cluster::Cluster;
use crate::config::ClusterConfig;
use crate::errors::{GateError, GateResult};
use crate::mode::ClusterMode;
use crate::node::{schema_text, Mutation, Node, Operation};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{error_envelope, ok_envelope, read_requests, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::CheckConfig { config } => check_config(&config),
        Command::Run { config } => serve(&config),
    }
}

/// Load and validate a config file, then print what it resolves to.
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = ClusterConfig::load(config_path)?;
    let mode = config.startup_mode()?;
    write_response(json!({
        "valid": true,
        "mode": mode,
        "shards": config.shards,
        "propose_timeout_ms": config.propose_timeout_ms,
        "route_timeout_ms": config.route_timeout_ms,
        "route_attempts": config.route_attempts,
    }))
}

/// Boot the cluster and enter the serving loop.
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = ClusterConfig::load(config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::runtime_failed(e.to_string()))?;

    let cluster = runtime.block_on(Cluster::start(config))?;

    for line in read_requests() {
        // A broken stdin ends the loop; a bad request does not.
        let line = line?;
        let response = runtime.block_on(handle_line(&cluster, &line));
        super::io::write_line(&response)?;
    }

    cluster.shutdown();
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Alter {
        #[serde(default)]
        schema: String,
        #[serde(default)]
        drop_all: bool,
        #[serde(default)]
        shard: Option<u32>,
        #[serde(default)]
        replica: Option<usize>,
    },
    Mutate {
        #[serde(default)]
        set_nquads: String,
        #[serde(default)]
        del_nquads: String,
        #[serde(default)]
        request_id: Option<Uuid>,
        #[serde(default)]
        shard: Option<u32>,
        #[serde(default)]
        replica: Option<usize>,
    },
    SetMode {
        mode: String,
        #[serde(default)]
        shard: Option<u32>,
        #[serde(default)]
        replica: Option<usize>,
    },
    Schema {
        #[serde(default)]
        shard: Option<u32>,
        #[serde(default)]
        replica: Option<usize>,
    },
    Metrics,
}


/// Handle one request line and build its response envelope.
pub async fn handle_line(cluster: &Cluster, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return error_envelope("INVALID_REQUEST", &e.to_string()),
    };
    match dispatch(cluster, request).await {
        Ok(data) => ok_envelope(data),
        Err(err) => error_envelope(err.code(), &err.to_string()),
    }
}

async fn dispatch(cluster: &Cluster, request: Request) -> GateResult<Value> {
    match request {
        Request::Alter {
            schema,
            drop_all,
            shard,
            replica,
        } => {
            let node = pick(cluster, shard, replica)?;
            let response = node.alter(&Operation { schema, drop_all }).await?;
            Ok(to_value(&response))
        }
        Request::Mutate {
            set_nquads,
            del_nquads,
            request_id,
            shard,
            replica,
        } => {
            let node = pick(cluster, shard, replica)?;
            let mutation = Mutation {
                set_nquads,
                del_nquads,
                request_id,
            };
            let response = node.mutate(&mutation).await?;
            Ok(to_value(&response))
        }
        Request::SetMode {
            mode,
            shard,
            replica,
        } => {
            let mode: ClusterMode = mode.parse().map_err(GateError::InvalidRequest)?;
            let node = pick(cluster, shard, replica)?;
            let applied = node.set_mode(mode).await?;
            Ok(json!({ "mode": applied }))
        }
        Request::Schema { shard, replica } => {
            let node = pick(cluster, shard, replica)?;
            let snapshot = node.read_committed().await?;
            let entries: Vec<_> = snapshot.registry.iter().cloned().collect();
            Ok(json!({
                "mode": snapshot.mode,
                "applied_index": snapshot.applied_index.value(),
                "schema": schema_text(&snapshot.registry),
                "entries": entries,
            }))
        }
        Request::Metrics => Ok(to_value(&cluster.metrics())),
    }
}

fn pick(cluster: &Cluster, shard: Option<u32>, replica: Option<usize>) -> GateResult<Arc<Node>> {
    let shard = match shard {
        Some(shard) => shard,
        None => cluster
            .shard_ids()
            .first()
            .map(|id| id.value())
            .ok_or_else(|| GateError::invalid_request("cluster has no shards"))?,
    };
    let replica = replica.unwrap_or(0);
    cluster.node(shard, replica).ok_or_else(|| {
        GateError::invalid_request(format!("no replica {} in shard {}", replica, shard))
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cluster(mode: ClusterMode) -> Cluster {
        let config = ClusterConfig::default()
            .with_shards(2, 2)
            .with_mode(mode);
        Cluster::start(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_alter_then_schema() {
        let cluster = cluster(ClusterMode::Strict).await;

        let altered = handle_line(
            &cluster,
            r#"{"op":"alter","schema":"name: string @index(exact) ."}"#,
        )
        .await;
        assert_eq!(altered["status"], "ok", "{}", altered);
        assert_eq!(altered["data"]["entries"][0]["name"], "name");

        let schema = handle_line(&cluster, r#"{"op":"schema","shard":2,"replica":1}"#).await;
        assert_eq!(schema["status"], "ok");
        assert_eq!(schema["data"]["mode"], "strict");
        assert_eq!(schema["data"]["entries"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_strict_rejects_unknown_predicate() {
        let cluster = cluster(ClusterMode::Strict).await;
        let response = handle_line(
            &cluster,
            r#"{"op":"mutate","set_nquads":"_:a <age> \"30\" ."}"#,
        )
        .await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["code"], "UNKNOWN_ATTRIBUTE");
    }

    #[tokio::test]
    async fn test_set_mode_reopens_disallowed_cluster() {
        let cluster = cluster(ClusterMode::Disallow).await;

        let rejected = handle_line(&cluster, r#"{"op":"alter","schema":"name: string ."}"#).await;
        assert_eq!(rejected["code"], "MODE_REJECTION");
        assert_eq!(rejected["message"], "no mutations allowed");

        let reopened = handle_line(&cluster, r#"{"op":"set_mode","mode":"allow"}"#).await;
        assert_eq!(reopened["data"]["mode"], "allow");

        let written = handle_line(
            &cluster,
            r#"{"op":"mutate","set_nquads":"_:a <name> \"Alice\" ."}"#,
        )
        .await;
        assert_eq!(written["status"], "ok", "{}", written);
        assert_eq!(written["data"]["implicitly_defined"][0], "name");
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let cluster = cluster(ClusterMode::Unrestricted).await;

        let unknown_op = handle_line(&cluster, r#"{"op":"compact"}"#).await;
        assert_eq!(unknown_op["code"], "INVALID_REQUEST");

        let not_json = handle_line(&cluster, "alter everything").await;
        assert_eq!(not_json["code"], "INVALID_REQUEST");

        let bad_mode = handle_line(&cluster, r#"{"op":"set_mode","mode":"sometimes"}"#).await;
        assert_eq!(bad_mode["code"], "INVALID_REQUEST");

        let no_node = handle_line(&cluster, r#"{"op":"schema","shard":9}"#).await;
        assert_eq!(no_node["code"], "INVALID_REQUEST");
    }
}
