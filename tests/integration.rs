//! Multi-replica scenarios over real loopback TCP.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use basic_paxos::{
    AcceptAction, BasicPaxos, Client, Config, FollowerStrategy, PaxosContext, PrepareAction,
    ProposalId, Quorum, SendError, Server,
};
use bytes::Bytes;
use parking_lot::Mutex;

const HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Initialize tracing for tests. Call at the start of each test.
/// Uses RUST_LOG env var for filtering (defaults to "debug" for this crate).
fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("basic_paxos=debug")),
        )
        .with_test_writer()
        .finish();

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

fn test_config() -> Config {
    Config {
        heartbeat_interval: Duration::from_millis(100),
        request_timeout: Duration::from_secs(1),
        retry_backoff: Duration::from_millis(50),
        strategy_factory: None,
    }
}

/// Wider heartbeat period for fault-injection tests, so liveness flips made
/// by a failing round stay observable between ticks.
fn slow_heartbeat_config() -> Config {
    Config {
        heartbeat_interval: Duration::from_millis(500),
        ..test_config()
    }
}

/// Reserve distinct loopback ports by briefly binding them. Sorted, so the
/// last entry is the endpoint that wins elections.
fn free_ports<const N: usize>() -> [u16; N] {
    let listeners: Vec<_> = (0..N)
        .map(|_| std::net::TcpListener::bind((HOST, 0)).unwrap())
        .collect();
    let mut ports = [0; N];
    for (port, listener) in ports.iter_mut().zip(&listeners) {
        *port = listener.local_addr().unwrap().port();
    }
    ports.sort_unstable();
    ports
}

async fn start_cluster(ports: &[u16], configs: Vec<Config>) -> Vec<Server> {
    let mut servers = Vec::new();
    for (port, config) in ports.iter().zip(configs) {
        let server = Server::with_config(HOST, *port, |_workload| b"bar".to_vec(), config);
        for member in ports {
            server.add((HOST, *member));
        }
        servers.push(server);
    }
    for server in &mut servers {
        server.start().await.unwrap();
    }
    servers
}

async fn ready_client(ports: &[u16], config: Config) -> Client {
    let client = Client::new(config);
    for port in ports {
        client.add((HOST, *port));
    }
    client.start();
    tokio::time::timeout(Duration::from_secs(15), client.wait_until_quorum_ready())
        .await
        .expect("quorum should become ready");
    client
}

/// Fault-injecting follower: closes the connection whenever it receives a
/// prepare, behaving normally otherwise.
struct CloseOnPrepare {
    prepares_seen: Arc<AtomicUsize>,
}

impl FollowerStrategy for CloseOnPrepare {
    fn on_prepare(
        &mut self,
        _quorum: &Quorum,
        _context: &mut PaxosContext,
        _proposal: ProposalId,
    ) -> PrepareAction {
        self.prepares_seen.fetch_add(1, Ordering::SeqCst);
        PrepareAction::Close
    }

    fn on_accept(
        &mut self,
        quorum: &Quorum,
        context: &mut PaxosContext,
        proposal: ProposalId,
        workload: Bytes,
    ) -> AcceptAction {
        BasicPaxos.on_accept(quorum, context, proposal, workload)
    }
}

fn close_on_prepare(config: Config, prepares_seen: Arc<AtomicUsize>) -> Config {
    Config {
        strategy_factory: Some(Arc::new(move || {
            Box::new(CloseOnPrepare {
                prepares_seen: prepares_seen.clone(),
            })
        })),
        ..config
    }
}

#[tokio::test]
async fn test_happy_path() {
    let _guard = init_tracing();
    let ports = free_ports::<3>();
    let _servers = start_cluster(&ports, vec![test_config(); 3]).await;
    let client = ready_client(&ports, test_config()).await;

    let response = client.send("foo", 0).await.unwrap();
    assert_eq!(&response[..], b"bar");

    // An unchanged world keeps the quorum stable: later sends still commit.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let response = client.send("foo", 0).await.unwrap();
    assert_eq!(&response[..], b"bar");
}

#[tokio::test]
async fn test_follower_dies_mid_prepare() {
    let _guard = init_tracing();
    let ports = free_ports::<3>();
    let prepares_seen = Arc::new(AtomicUsize::new(0));

    // The lowest endpoint never wins an election, so the bad apple is a
    // follower.
    let configs = vec![
        close_on_prepare(slow_heartbeat_config(), prepares_seen.clone()),
        slow_heartbeat_config(),
        slow_heartbeat_config(),
    ];
    let _servers = start_cluster(&ports, configs).await;
    let client = ready_client(&ports, slow_heartbeat_config()).await;

    // The round reaches the bad apple, which slams the connection.
    assert_eq!(client.send("foo", 0).await, Err(SendError::RequestError));
    assert!(prepares_seen.load(Ordering::SeqCst) >= 1);

    // The failed round marked the follower suspect; the next round excludes
    // it and commits on the remaining majority. Retries cover the case where
    // a heartbeat revives the follower in between.
    let response = client.send("foo", 5).await.unwrap();
    assert_eq!(&response[..], b"bar");
}

#[tokio::test]
async fn test_leader_dies_mid_prepare() {
    let _guard = init_tracing();
    let ports = free_ports::<3>();
    let prepares_seen = Arc::new(AtomicUsize::new(0));

    // The highest endpoint wins the election, so the bad apple is the leader
    // itself: its own prepare (it prepares to itself) kills each round.
    let configs = vec![
        slow_heartbeat_config(),
        slow_heartbeat_config(),
        close_on_prepare(slow_heartbeat_config(), prepares_seen.clone()),
    ];
    let mut servers = start_cluster(&ports, configs).await;
    let client = ready_client(&ports, slow_heartbeat_config()).await;

    assert_eq!(client.send("foo", 0).await, Err(SendError::RequestError));

    // The quorum still believes in the broken leader; nothing can commit.
    assert!(client.send("foo", 0).await.is_err());

    // Stop the broken leader; the survivors elect the next-highest endpoint
    // and requests flow again.
    servers[2].stop().await;
    tokio::time::timeout(Duration::from_secs(15), client.wait_until_quorum_ready())
        .await
        .expect("survivors should recover");

    let response = client.send("foo", 3).await.unwrap();
    assert_eq!(&response[..], b"bar");
}

#[tokio::test]
async fn test_majority_lost() {
    let _guard = init_tracing();
    let ports = free_ports::<3>();
    let mut servers = start_cluster(&ports, vec![test_config(); 3]).await;
    let client = ready_client(&ports, test_config()).await;

    servers[1].stop().await;
    servers[2].stop().await;

    // Whether the client notices before or during the send, the terminal
    // outcome is not_ready — never a silent hang.
    let outcome = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            match client.send("foo", 1).await {
                Err(SendError::NotReady) => break,
                Err(SendError::RequestError) => continue,
                Ok(response) => panic!("commit without a majority: {response:?}"),
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "send kept succeeding without a majority");
}

#[tokio::test]
async fn test_retries_exhausted_single_error() {
    let _guard = init_tracing();
    let ports = free_ports::<3>();
    let prepares_seen = Arc::new(AtomicUsize::new(0));

    // Every follower kills rounds, so no retry can ever help.
    let configs = vec![
        close_on_prepare(slow_heartbeat_config(), prepares_seen.clone()),
        close_on_prepare(slow_heartbeat_config(), prepares_seen.clone()),
        close_on_prepare(slow_heartbeat_config(), prepares_seen.clone()),
    ];
    let _servers = start_cluster(&ports, configs).await;
    let client = ready_client(&ports, slow_heartbeat_config()).await;

    // One induced failure with zero retries: the future completes exactly
    // once, with request_error.
    assert_eq!(client.send("foo", 0).await, Err(SendError::RequestError));
    assert!(prepares_seen.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_concurrent_clients_single_order() {
    let _guard = init_tracing();
    let ports = free_ports::<3>();

    // Per-server commit logs, appended by the host callback.
    let logs: [Arc<Mutex<Vec<Bytes>>>; 3] = std::array::from_fn(|_| Arc::new(Mutex::new(Vec::new())));
    let mut servers = Vec::new();
    for (port, log) in ports.iter().zip(&logs) {
        let log = log.clone();
        let server = Server::with_config(
            HOST,
            *port,
            move |workload: &[u8]| {
                log.lock().push(Bytes::copy_from_slice(workload));
                b"ok".to_vec()
            },
            test_config(),
        );
        for member in &ports {
            server.add((HOST, *member));
        }
        servers.push(server);
    }
    for server in &mut servers {
        server.start().await.unwrap();
    }

    let client_a = Arc::new(ready_client(&ports, test_config()).await);
    let client_b = Arc::new(ready_client(&ports, test_config()).await);

    let send_all = |client: Arc<Client>, tag: &'static str| {
        tokio::spawn(async move {
            for i in 0..20 {
                let workload = format!("{tag}-{i}");
                client.send(workload, 5).await.unwrap();
            }
        })
    };
    let (a, b) = tokio::join!(send_all(client_a, "a"), send_all(client_b, "b"));
    a.unwrap();
    b.unwrap();

    let reference = logs[0].lock().clone();
    assert_eq!(reference.len(), 40);
    for log in &logs[1..] {
        assert_eq!(*log.lock(), reference);
    }
}
