use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bigfs_directory::{DirectoryServer, NodeRegistry};
use bigfs_network::{read_frame, write_frame, DirectoryReply, DirectoryRequest};
use bigfs_types::{FaultKind, NodeId};
use futures::future::join_all;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_FRAME: usize = 64 * 1024;
const IDLE: Duration = Duration::from_secs(5);

async fn start_directory(base_port: u16, threshold: Duration) -> (SocketAddr, Arc<NodeRegistry>) {
    start_directory_with_idle(base_port, threshold, IDLE).await
}

async fn start_directory_with_idle(
    base_port: u16,
    threshold: Duration,
    idle: Duration,
) -> (SocketAddr, Arc<NodeRegistry>) {
    let registry = Arc::new(NodeRegistry::new(base_port, threshold));
    let server = DirectoryServer::bind("127.0.0.1:0", registry.clone(), MAX_FRAME, idle)
        .await
        .expect("bind directory listener");
    let addr = server.local_addr().expect("listener addr lookup");
    server.spawn();
    (addr, registry)
}

async fn request(addr: SocketAddr, request: DirectoryRequest) -> DirectoryReply {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    write_frame(&mut stream, &request).await.expect("send request");
    read_frame(&mut stream, MAX_FRAME).await.expect("read reply")
}

#[tokio::test]
async fn concurrent_registrations_get_distinct_ids_and_ports() {
    let (addr, registry) = start_directory(7000, Duration::from_secs(60)).await;

    let replies = join_all((0..32).map(|i| {
        request(
            addr,
            DirectoryRequest::Register {
                host: format!("host-{i}"),
            },
        )
    }))
    .await;

    let mut ids = HashSet::new();
    let mut ports = HashSet::new();
    for reply in replies {
        match reply {
            DirectoryReply::Registered { node_id, port } => {
                ids.insert(node_id);
                ports.insert(port);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }
    assert_eq!(ids.len(), 32);
    assert_eq!(ports.len(), 32);
    assert!(ports.iter().all(|port| (7000..7032).contains(port)));
    assert_eq!(registry.len(), 32);
}

#[tokio::test]
async fn several_requests_share_one_connection() {
    let (addr, _registry) = start_directory(5001, Duration::from_secs(60)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    for expected in [NodeId(1), NodeId(2)] {
        write_frame(
            &mut stream,
            &DirectoryRequest::Register {
                host: "127.0.0.1".into(),
            },
        )
        .await
        .unwrap();
        match read_frame::<_, DirectoryReply>(&mut stream, MAX_FRAME).await.unwrap() {
            DirectoryReply::Registered { node_id, .. } => assert_eq!(node_id, expected),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    write_frame(&mut stream, &DirectoryRequest::Heartbeat { node_id: NodeId(1) })
        .await
        .unwrap();
    let ack: DirectoryReply = read_frame(&mut stream, MAX_FRAME).await.unwrap();
    assert_eq!(ack, DirectoryReply::Ack);

    write_frame(&mut stream, &DirectoryRequest::ListNodes).await.unwrap();
    match read_frame::<_, DirectoryReply>(&mut stream, MAX_FRAME).await.unwrap() {
        DirectoryReply::Nodes { nodes } => {
            let ids: Vec<_> = nodes.iter().map(|record| record.id).collect();
            assert_eq!(ids, vec![NodeId(1), NodeId(2)]);
            assert!(nodes.iter().all(|record| record.port >= 5001));
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn stale_nodes_disappear_from_listing() {
    let (addr, _registry) = start_directory(5001, Duration::from_millis(200)).await;

    let stale = request(addr, DirectoryRequest::Register { host: "a".into() }).await;
    let fresh = request(addr, DirectoryRequest::Register { host: "b".into() }).await;
    let (stale_id, fresh_id) = match (stale, fresh) {
        (
            DirectoryReply::Registered { node_id: a, .. },
            DirectoryReply::Registered { node_id: b, .. },
        ) => (a, b),
        other => panic!("unexpected replies {other:?}"),
    };

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        request(addr, DirectoryRequest::Heartbeat { node_id: fresh_id }).await;
    }

    match request(addr, DirectoryRequest::ListNodes).await {
        DirectoryReply::Nodes { nodes } => {
            let ids: Vec<_> = nodes.iter().map(|record| record.id).collect();
            assert!(!ids.contains(&stale_id));
            assert!(ids.contains(&fresh_id));
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_request_gets_validation_fault() {
    let (addr, _registry) = start_directory(5001, Duration::from_secs(60)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let body = br#"{"operation":"evict_everyone"}"#;
    stream
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(body).await.unwrap();

    match read_frame::<_, DirectoryReply>(&mut stream, MAX_FRAME).await.unwrap() {
        DirectoryReply::Error { fault } => assert_eq!(fault.kind, FaultKind::Validation),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn silent_connection_is_closed() {
    let (addr, _registry) =
        start_directory_with_idle(5001, Duration::from_secs(60), Duration::from_millis(100)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close the idle connection");
    assert_eq!(read.unwrap(), 0);

    // The listener keeps serving new connections.
    match request(addr, DirectoryRequest::ListNodes).await {
        DirectoryReply::Nodes { nodes } => assert!(nodes.is_empty()),
        other => panic!("unexpected reply {other:?}"),
    }
}
