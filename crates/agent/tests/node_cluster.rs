use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bigfs_agent::{start_node, RunningNode};
use bigfs_client::{ClientError, DirectoryClient, NodeClient};
use bigfs_directory::{DirectoryServer, NodeRegistry};
use bigfs_types::{ClusterConfig, FaultKind, FileEntry, NodeId};
use futures::future::join_all;
use tempfile::TempDir;

struct Cluster {
    config: ClusterConfig,
    directory: DirectoryClient,
    _storage: TempDir,
}

/// A port that was free a moment ago, used as the directory's node base port.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("reserve free port")
}

async fn start_cluster() -> Cluster {
    let storage = TempDir::new().expect("create storage dir");
    let base_port = free_port();

    let mut config = ClusterConfig {
        node_base_port: base_port,
        storage_dir: storage.path().join("node_storage"),
        chunk_size: 1024,
        heartbeat_interval_secs: 1,
        eviction_threshold_secs: 3,
        connect_timeout_secs: 2,
        io_timeout_secs: 2,
        ..ClusterConfig::default()
    };

    let registry = Arc::new(NodeRegistry::new(base_port, config.eviction_threshold()));
    let server = DirectoryServer::bind(
        "127.0.0.1:0",
        registry,
        config.max_frame_len,
        config.io_timeout(),
    )
    .await
    .expect("bind directory listener");
    let addr: SocketAddr = server.local_addr().expect("listener addr lookup");
    server.spawn();

    config.directory_port = addr.port();
    let directory = DirectoryClient::from_cluster(&config);
    Cluster {
        config,
        directory,
        _storage: storage,
    }
}

async fn start(cluster: &Cluster) -> (RunningNode, NodeClient) {
    let node = start_node(&cluster.config).await.expect("start node");
    let client = cluster.directory.node(node.node_id).await.expect("resolve node");
    (node, client)
}

fn remote_kind(err: ClientError) -> FaultKind {
    match err {
        ClientError::Remote(fault) => fault.kind,
        other => panic!("expected a remote fault, got {other:?}"),
    }
}

#[tokio::test]
async fn registration_and_file_scenario() {
    let cluster = start_cluster().await;
    let base = cluster.config.node_base_port;

    let (node_a, client) = start(&cluster).await;
    assert_eq!(node_a.node_id, NodeId(1));
    assert_eq!(node_a.addr.port(), base);

    let b = cluster.directory.register("127.0.0.1").await.unwrap();
    assert_eq!(b.node_id, NodeId(2));
    assert_eq!(b.port, base + 1);

    client.create("/a/b.txt", false, Some("hi")).await.unwrap();
    assert_eq!(
        client.list("/a").await.unwrap(),
        vec![FileEntry::file("b.txt", 2)]
    );
    client.remove("/a").await.unwrap();
    assert_eq!(
        remote_kind(client.list("/a").await.unwrap_err()),
        FaultKind::NotFound
    );

    node_a.shutdown();
}

#[tokio::test]
async fn push_then_fetch_returns_same_bytes() {
    let cluster = start_cluster().await;
    let (node, client) = start(&cluster).await;

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 256) as u8).collect();
    client.push("uploads/blob.bin", &payload).await.unwrap();

    assert_eq!(client.fetch("uploads/blob.bin").await.unwrap(), payload);
    assert_eq!(
        client.list("uploads").await.unwrap(),
        vec![FileEntry::file("blob.bin", 100_000)]
    );

    client.push("empty.bin", &[]).await.unwrap();
    assert!(client.fetch("empty.bin").await.unwrap().is_empty());

    node.shutdown();
}

#[tokio::test]
async fn copy_read_and_directory_errors() {
    let cluster = start_cluster().await;
    let (node, client) = start(&cluster).await;

    client.create("docs", true, None).await.unwrap();
    client.create("docs/a.txt", false, Some("alpha")).await.unwrap();
    client.copy("docs/a.txt", "backup/a.txt").await.unwrap();
    assert_eq!(client.read("backup/a.txt").await.unwrap(), b"alpha");

    assert_eq!(
        remote_kind(client.read("docs").await.unwrap_err()),
        FaultKind::IsADirectory
    );
    assert_eq!(
        remote_kind(client.list("docs/a.txt").await.unwrap_err()),
        FaultKind::NotADirectory
    );
    assert_eq!(
        remote_kind(client.copy("missing.txt", "x.txt").await.unwrap_err()),
        FaultKind::NotFound
    );

    node.shutdown();
}

#[tokio::test]
async fn escaping_paths_are_rejected() {
    let cluster = start_cluster().await;
    let (node, client) = start(&cluster).await;

    for path in ["../../etc/passwd", "/../outside", "a/../../b"] {
        assert_eq!(
            remote_kind(client.list(path).await.unwrap_err()),
            FaultKind::Validation,
            "path {path}"
        );
    }
    assert_eq!(
        remote_kind(client.push("../escape.bin", b"data").await.unwrap_err()),
        FaultKind::Validation
    );
    assert!(!node.storage_root.parent().unwrap().join("escape.bin").exists());

    node.shutdown();
}

#[tokio::test]
async fn oversized_push_is_refused() {
    let mut cluster = start_cluster().await;
    cluster.config.max_file_size = 64;
    let (node, _) = start(&cluster).await;

    // A client with a larger limit than the node, so the node does the refusing.
    let mut generous = bigfs_client::ConnectionConfig::from_cluster(&cluster.config);
    generous.transfer.max_size = 1024;
    let client = NodeClient::new(node.addr.to_string(), generous);

    assert_eq!(
        remote_kind(client.push("big.bin", &[7u8; 65]).await.unwrap_err()),
        FaultKind::TooLarge
    );
    assert!(!node.storage_root.join("big.bin").exists());

    node.shutdown();
}

#[tokio::test]
async fn concurrent_pushes_to_distinct_files() {
    let cluster = start_cluster().await;
    let (node, client) = start(&cluster).await;

    let results = join_all((0..8u8).map(|i| {
        let client = client.clone();
        async move {
            let data = vec![i; 5000 + usize::from(i)];
            client.push(&format!("f{i}.bin"), &data).await
        }
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));

    let listing = client.list("/").await.unwrap();
    assert_eq!(listing.len(), 8);
    for i in 0..8u8 {
        assert_eq!(
            client.fetch(&format!("f{i}.bin")).await.unwrap(),
            vec![i; 5000 + usize::from(i)]
        );
    }

    node.shutdown();
}

#[tokio::test]
async fn heartbeats_keep_node_listed() {
    let cluster = start_cluster().await;
    let (node, _) = start(&cluster).await;
    let ghost = cluster.directory.register("10.0.0.9").await.unwrap();

    tokio::time::sleep(Duration::from_millis(4500)).await;

    let nodes = cluster.directory.list_nodes().await.unwrap();
    assert!(nodes.contains_key(&node.node_id));
    assert!(!nodes.contains_key(&ghost.node_id));

    node.shutdown();
}
