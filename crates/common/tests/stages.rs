//! Integration tests for staged scaling

mod common;

use std::time::Duration;

use ::common::cluster::{setup_cluster, Cluster, NodeState, StartMode};
use ::common::config::{BeeConfig, Config, NodeGroupProfile};
use ::common::deadline::{bounded, Interrupted};
use ::common::stage::{Actions, GroupTemplate, Stage, StageError, StageExecutor, Update};
use ::common::testkit::{MemoryNetwork, PlatformEvent};

fn stage(group: &str, add: usize, start: usize, stop: usize, delete: usize) -> Stage {
    Stage {
        updates: vec![Update {
            node_group: group.to_string(),
            actions: Actions {
                add_count: add,
                start_count: start,
                stop_count: stop,
                delete_count: delete,
            },
        }],
    }
}

fn membership(cluster: &Cluster) -> Vec<(String, NodeState)> {
    cluster
        .node_groups()
        .iter()
        .flat_map(|g| g.nodes())
        .map(|n| (n.name().to_string(), n.state()))
        .collect()
}

#[tokio::test]
async fn test_mixed_actions_on_running_group() {
    let net = MemoryNetwork::new();
    let (cluster, drone) = common::running_group(&net, "drone", 5).await;

    StageExecutor::new(cluster)
        .run(&[stage("drone", 4, 1, 3, 1)])
        .await
        .unwrap();

    // drone-5..8 added, drone-5 started, drone-0..2 stopped, drone-3 deleted
    let stopped = drone.nodes_in_state(NodeState::Stopped);
    assert_eq!(drone.len() - stopped.len(), 5 + 4 - 3 - 1);
    assert_eq!(
        drone.nodes_sorted(),
        vec!["drone-0", "drone-1", "drone-2", "drone-4", "drone-5", "drone-6", "drone-7", "drone-8"]
    );
    assert_eq!(stopped, vec!["drone-0", "drone-1", "drone-2"]);
    assert_eq!(drone.nodes_in_state(NodeState::Running), vec!["drone-4", "drone-5"]);
    assert_eq!(
        drone.nodes_in_state(NodeState::Registered),
        vec!["drone-6", "drone-7", "drone-8"]
    );
    assert!(!net.exists("drone-3"));
    assert!(net.exists("drone-0"));
    assert!(!net.exists("drone-6"));
}

#[tokio::test]
async fn test_categories_run_in_order() {
    let net = MemoryNetwork::new();
    let (cluster, drone) = common::running_group(&net, "drone", 1).await;
    let baseline = net.events().len();

    StageExecutor::new(cluster)
        .apply(0, &stage("drone", 2, 2, 1, 1))
        .await
        .unwrap();

    let events = net.events()[baseline..].to_vec();
    let position = |event: PlatformEvent| events.iter().position(|e| *e == event).unwrap();
    let created = [
        position(PlatformEvent::Create("drone-1".into())),
        position(PlatformEvent::Create("drone-2".into())),
    ];
    let stopped = position(PlatformEvent::Stop("drone-0".into()));
    // drone-0 is stopped, so the delete falls on drone-1, which is stopped first
    let stopped_for_delete = position(PlatformEvent::Stop("drone-1".into()));
    let deleted = position(PlatformEvent::Delete("drone-1".into()));
    assert!(created.iter().all(|c| *c < stopped));
    assert!(stopped < stopped_for_delete);
    assert!(stopped_for_delete < deleted);
    assert_eq!(events.len(), 5);

    assert_eq!(drone.nodes_sorted(), vec!["drone-0", "drone-2"]);
    assert_eq!(drone.nodes_in_state(NodeState::Running), vec!["drone-2"]);
    assert_eq!(drone.nodes_in_state(NodeState::Stopped), vec!["drone-0"]);
}

#[tokio::test]
async fn test_stages_compose_sequentially() {
    let stages = [
        stage("drone", 3, 3, 0, 0),
        stage("drone", 0, 0, 2, 0),
        stage("drone", 1, 1, 0, 2),
    ];

    let together_net = MemoryNetwork::new();
    let (together, _) = common::running_group(&together_net, "drone", 2).await;
    StageExecutor::new(together.clone())
        .run(&stages)
        .await
        .unwrap();

    let apart_net = MemoryNetwork::new();
    let (apart, _) = common::running_group(&apart_net, "drone", 2).await;
    for (index, stage) in stages.iter().enumerate() {
        StageExecutor::new(apart.clone())
            .apply(index, stage)
            .await
            .unwrap();
    }

    assert_eq!(membership(&together), membership(&apart));
    assert_eq!(
        together_net.creation_order().len(),
        apart_net.creation_order().len()
    );
    // the last stage restarts drone-0, then deletes it and drone-2
    let drone = together.node_group("drone").unwrap();
    assert_eq!(drone.nodes_sorted(), vec!["drone-1", "drone-3", "drone-4", "drone-5"]);
    assert_eq!(drone.nodes_in_state(NodeState::Stopped), vec!["drone-1"]);
    assert_eq!(drone.nodes_in_state(NodeState::Registered), vec!["drone-5"]);
}

#[tokio::test]
async fn test_stages_on_attached_cluster() {
    let config = Config::parse(common::CLUSTER).unwrap();
    let net = MemoryNetwork::new();
    for node in ["bee-0", "bee-1", "drone-0", "drone-1", "drone-2"] {
        net.boot(node);
    }
    let cluster = setup_cluster(&config, net.cluster_options("test"), StartMode::Attach)
        .await
        .unwrap();

    StageExecutor::from_config(cluster.clone(), &config)
        .unwrap()
        .run(&[stage("drone", 1, 1, 1, 1)])
        .await
        .unwrap();

    // only the added node is provisioned; attached ones are stopped and deleted in place
    assert_eq!(net.creation_order(), vec!["drone-3"]);
    let drone = cluster.node_group("drone").unwrap();
    assert_eq!(drone.nodes_in_state(NodeState::Stopped), vec!["drone-0"]);
    assert_eq!(drone.nodes_in_state(NodeState::Running), vec!["drone-2", "drone-3"]);
    assert!(!net.is_up("drone-0"));
    assert!(!net.exists("drone-1"));
}

#[tokio::test]
async fn test_updates_span_groups() {
    let net = MemoryNetwork::new();
    let (cluster, drone) = common::running_group(&net, "drone", 2).await;

    let executor = StageExecutor::new(cluster.clone()).with_template(
        "light",
        GroupTemplate {
            profile: NodeGroupProfile::default(),
            bee_config: BeeConfig {
                bootnodes: "/dns4/bee-0/tcp/1634".into(),
                ..Default::default()
            },
        },
    );
    let mut both = stage("drone", 0, 0, 1, 0);
    both.updates.extend(stage("light", 2, 2, 0, 0).updates);
    executor.apply(0, &both).await.unwrap();

    let light = cluster.node_group("light").unwrap();
    assert_eq!(light.nodes_in_state(NodeState::Running), vec!["light-0", "light-1"]);
    assert_eq!(
        net.spec_of("light-0").unwrap().config.bootnodes,
        "/dns4/bee-0/tcp/1634"
    );
    assert_eq!(drone.nodes_in_state(NodeState::Stopped), vec!["drone-0"]);
}

#[tokio::test]
async fn test_unknown_group_without_template() {
    let net = MemoryNetwork::new();
    let (cluster, _) = common::running_group(&net, "drone", 1).await;

    let err = StageExecutor::new(cluster)
        .apply(3, &stage("light", 1, 0, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Cluster { stage: 3, .. }));
}

#[tokio::test]
async fn test_not_enough_nodes() {
    let net = MemoryNetwork::new();
    let (cluster, drone) = common::running_group(&net, "drone", 1).await;

    let err = StageExecutor::new(cluster)
        .apply(0, &stage("drone", 0, 0, 2, 0))
        .await
        .unwrap_err();
    match err {
        StageError::NotEnoughNodes {
            requested,
            eligible,
            ..
        } => {
            assert_eq!(requested, 2);
            assert_eq!(eligible, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(drone.node("drone-0").unwrap().is_running());
}

#[tokio::test]
async fn test_failed_start_fails_the_stage() {
    let net = MemoryNetwork::new();
    net.fail_create("drone-2");
    let (cluster, drone) = common::running_group(&net, "drone", 1).await;

    let err = StageExecutor::new(cluster)
        .run(&[stage("drone", 2, 2, 0, 0), stage("drone", 0, 0, 1, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, StageError::Group { stage: 0, .. }));

    // the sibling start still completed, the second stage never ran
    assert!(drone.node("drone-1").unwrap().is_running());
    assert!(drone.node("drone-0").unwrap().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_stage_is_reported() {
    let net = MemoryNetwork::new();
    net.slow_api("drone-1", Duration::from_secs(60));
    let (cluster, _) = common::running_group(&net, "drone", 1).await;
    let executor = StageExecutor::new(cluster);

    let err = bounded(
        None,
        tokio::time::sleep(Duration::from_secs(1)),
        executor.run(&[stage("drone", 1, 1, 0, 0)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StageError::Interrupted(Interrupted::Cancelled)));
}
