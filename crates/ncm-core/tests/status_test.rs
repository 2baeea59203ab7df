// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status reporting over applied network intents.

mod common;

use common::*;
use ncm_core::appcontext::StatusValue;
use ncm_core::resourcestatus::RsyncStatus;
use ncm_core::status::{OutputFormat, QueryType, StatusQuery};
use serde_json::json;

fn rsync_query(output: OutputFormat) -> StatusQuery {
    StatusQuery::new(QueryType::Rsync, output)
}

#[tokio::test]
async fn test_status_before_rsync_writes() {
    let ctx = TestContext::new().await;
    ctx.add_network("net1").await;
    ctx.add_provider_net("pnet1").await;
    ctx.apply().await;

    let result = ctx
        .runtime
        .scheduler_client()
        .network_intents_status(PROVIDER, CLUSTER, &rsync_query(OutputFormat::All))
        .await
        .unwrap();

    assert_eq!(result.name, CLUSTER);
    assert_eq!(result.status, StatusValue::Instantiating);
    assert!(result.rsync_status.is_empty());
    assert!(result.cluster_status.is_empty());

    let cluster = &result.apps[0].clusters[0];
    assert_eq!(cluster.cluster_provider, PROVIDER);
    assert_eq!(cluster.cluster, CLUSTER);
    assert_eq!(cluster.resources.len(), 2);
    assert!(cluster.resources.iter().all(|r| r.rsync_status.is_none()));

    let pnet = cluster
        .resources
        .iter()
        .find(|r| r.name == "pnet1")
        .unwrap();
    assert_eq!(pnet.gvk.group, "k8s.plugin.opnfv.org");
    assert_eq!(pnet.gvk.version, "v1alpha1");
    assert_eq!(pnet.gvk.kind, "ProviderNetwork");
}

#[tokio::test]
async fn test_one_malformed_status_of_three() {
    let ctx = TestContext::new().await;
    for name in ["net1", "net2", "net3"] {
        ctx.add_network(name).await;
    }
    let id = ctx.apply().await;

    ctx.write_resource_status(&id, "net1+Network", json!({"Status": "Applied"}))
        .await;
    ctx.write_resource_status(&id, "net2+Network", json!({"Status": 17}))
        .await;
    ctx.write_resource_status(&id, "net3+Network", json!({"Status": "Retrying"}))
        .await;

    let result = ctx
        .runtime
        .scheduler_client()
        .network_intents_status(PROVIDER, CLUSTER, &rsync_query(OutputFormat::All))
        .await
        .unwrap();

    assert_eq!(result.rsync_status.len(), 2);
    assert_eq!(result.rsync_status["Applied"], 1);
    assert_eq!(result.rsync_status["Retrying"], 1);

    let mut names: Vec<&str> = result.apps[0].clusters[0]
        .resources
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    names.sort();
    assert_eq!(names, vec!["net1", "net3"]);
}

#[tokio::test]
async fn test_summary_and_detail_output() {
    let ctx = TestContext::new().await;
    ctx.add_network("net1").await;
    let id = ctx.apply().await;
    ctx.write_resource_status(&id, "net1+Network", json!({"Status": "Applied"}))
        .await;
    let scheduler = ctx.runtime.scheduler_client();

    let summary = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &rsync_query(OutputFormat::Summary))
        .await
        .unwrap();
    assert!(summary.apps.is_empty());
    assert_eq!(summary.rsync_status["Applied"], 1);

    let detail = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &rsync_query(OutputFormat::Detail))
        .await
        .unwrap();
    let resource = &detail.apps[0].clusters[0].resources[0];
    assert_eq!(resource.rsync_status, Some(RsyncStatus::Applied));
    let body = resource.detail.as_ref().unwrap();
    assert_eq!(body["spec"]["cniType"], "ovn4nfv");
    assert_eq!(body["spec"]["ipv4Subnets"][0]["name"], "subnet1");

    let json = serde_json::to_value(&detail).unwrap();
    assert_eq!(json["rsync-status"]["Applied"], 1);
    assert_eq!(json["apps"][0]["clusters"][0]["cluster-provider"], PROVIDER);
    assert_eq!(
        json["apps"][0]["clusters"][0]["resources"][0]["GVK"]["Kind"],
        "Network"
    );
}

#[tokio::test]
async fn test_resource_filter_drops_empty_clusters() {
    let ctx = TestContext::new().await;
    ctx.add_network("net1").await;
    ctx.add_network("net2").await;
    ctx.apply().await;
    let scheduler = ctx.runtime.scheduler_client();

    let query = rsync_query(OutputFormat::All).with_resources(vec!["net2".to_string()]);
    let result = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &query)
        .await
        .unwrap();
    let resources = &result.apps[0].clusters[0].resources;
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].name, "net2");

    let query = rsync_query(OutputFormat::All).with_resources(vec!["nope".to_string()]);
    let result = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &query)
        .await
        .unwrap();
    assert!(result.apps.is_empty());

    let query = rsync_query(OutputFormat::All).with_clusters(vec!["provA+other".to_string()]);
    let result = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &query)
        .await
        .unwrap();
    assert!(result.apps.is_empty());
}

#[tokio::test]
async fn test_cluster_mode_reads_monitor_snapshot() {
    let ctx = TestContext::new().await;
    ctx.add_network("net1").await;
    let id = ctx.apply().await;
    let query = StatusQuery::new(QueryType::Cluster, OutputFormat::All);
    let scheduler = ctx.runtime.scheduler_client();

    // Nothing mirrored yet.
    let result = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &query)
        .await
        .unwrap();
    assert!(result.apps.is_empty());
    assert!(result.cluster_status.is_empty());

    let bundle = json!({
        "ready": true,
        "resourceCount": 2,
        "podStatuses": [
            {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "ovn-controller-1"}}
        ],
        "daemonSetStatuses": [
            {"apiVersion": "apps/v1", "kind": "DaemonSet", "metadata": {"name": "nfn-agent"}}
        ],
        "serviceStatuses": null
    });
    // The monitor stores the snapshot as a JSON-encoded string.
    ctx.write_cluster_status(&id, json!(bundle.to_string())).await;

    let result = scheduler
        .network_intents_status(PROVIDER, CLUSTER, &query)
        .await
        .unwrap();
    assert_eq!(result.cluster_status["Present"], 2);
    assert!(result.rsync_status.is_empty());

    let resources = &result.apps[0].clusters[0].resources;
    let daemon_set = resources.iter().find(|r| r.name == "nfn-agent").unwrap();
    assert_eq!(daemon_set.gvk.group, "apps");
    assert_eq!(daemon_set.cluster_status.as_deref(), Some("Present"));
}

#[tokio::test]
async fn test_status_of_named_instance() {
    let ctx = TestContext::new().await;
    ctx.add_network("net1").await;
    let first = ctx.apply().await;
    ctx.terminate().await;
    let second = ctx.apply().await;
    let scheduler = ctx.runtime.scheduler_client();

    let result = scheduler
        .network_intents_status(
            PROVIDER,
            CLUSTER,
            &rsync_query(OutputFormat::Summary).with_instance(second),
        )
        .await
        .unwrap();
    assert_eq!(result.state.actions.len(), 4);

    // Terminated contexts are deleted and can no longer be reported on.
    let err = scheduler
        .network_intents_status(
            PROVIDER,
            CLUSTER,
            &rsync_query(OutputFormat::Summary).with_instance(first),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_context_survives_reload() {
    let ctx = TestContext::new().await;
    ctx.add_network("net1").await;
    let id = ctx.apply().await;

    let first = ctx.load(&id).await;
    let second = ctx.load(&id).await;
    assert_eq!(
        first.get_composite_app_handle().await.unwrap(),
        second.get_composite_app_handle().await.unwrap()
    );

    let handle = second
        .get_resource_handle(APP, CONTEXT_CLUSTER, "net1+Network")
        .await
        .unwrap();
    first
        .update_resource_value(&handle, "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n")
        .await
        .unwrap();

    let result = ctx
        .runtime
        .scheduler_client()
        .network_intents_status(PROVIDER, CLUSTER, &rsync_query(OutputFormat::All))
        .await
        .unwrap();
    let resource = &result.apps[0].clusters[0].resources[0];
    assert_eq!(resource.name, "cm");
    assert_eq!(resource.gvk.kind, "ConfigMap");
}
