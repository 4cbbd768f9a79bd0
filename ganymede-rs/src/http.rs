//! Provides the HTTP transport which connects the nodes of a cluster.
//!
//! Each node runs an [HttpPool]. It has two jobs:
//!
//! * It serves the values of the local groups to other nodes. A value is requested via
//!   **GET <base_path><group>/<key>** (both segments URL-encoded) and delivered as
//!   **application/octet-stream**. Requesting **GET <base_path>** itself yields a plain text
//!   table which outlines the state of all groups.
//! * It acts as [PeerPicker] for the local groups. All members of the cluster are placed on a
//!   [HashRing] so that every node agrees on the owner of a key. If the owner is another node, an
//!   [HttpGetter] pointing to it is handed out. A key owned by the local node yields **None** so
//!   that the group loads it on its own.
//!
//! The pool is configured via the **peers** section of the config:
//! ```yaml
//! server:
//!     host: 0.0.0.0
//!     port: 8001
//! peers:
//!     self: http://10.0.0.1:8001
//!     base_path: /_ganymede/
//!     replicas: 50
//!     timeout: 5000
//!     members:
//!         - http://10.0.0.1:8001
//!         - http://10.0.0.2:8001
//! ```
//! **timeout** is given in milliseconds and bounds each request sent to a peer. A peer which
//! doesn't answer in time is treated like a failed one, so the group loads the value locally.
//!
//! Once the config changes, a new ring is built and swapped in atomically. If the bind address
//! changes, the server socket is re-created. Just like the config, the server tries to bind its
//! socket every 500ms until it succeeds, so that a new instance of a node can take over the port
//! of an old one which is shutting down.
//!
//! # Example
//!
//! ```no_run
//! use ganymede::builder::Builder;
//! use ganymede::group::{FnGetter, Groups};
//! use ganymede::http::HttpPool;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     let scores = platform.require::<Groups>().new_group(
//!         "scores",
//!         64 * 1024 * 1024,
//!         Arc::new(FnGetter::new(|key| Ok(key.as_bytes().to_vec()))),
//!     );
//!     let pool = platform.require::<HttpPool>();
//!     scores.register_peers(pool.clone());
//!
//!     pool.event_loop().await;
//! }
//! ```
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use crate::config::{ChangeNotifier, Config};
use crate::group::Groups;
use crate::peers::{FetchRequest, FetchResponse, PeerGetter, PeerPicker};
use crate::platform::Platform;
use crate::ring::{HashRing, DEFAULT_REPLICAS};
use crate::spawn;

/// Specifies the URL prefix of the peer protocol used if nothing else is configured.
pub const DEFAULT_BASE_PATH: &str = "/_ganymede/";

const DEFAULT_HOST: &str = "0.0.0.0";

const DEFAULT_PORT: u16 = 8001;

const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies how long to wait for the response of a peer if nothing else is configured.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Contains the settings which control how peers are contacted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolOptions {
    /// Contains the URL prefix under which the values are served (e.g. **/_ganymede/**).
    pub base_path: String,

    /// Contains the number of virtual nodes per peer.
    pub replicas: usize,

    /// Contains the maximal duration of a request sent to a peer.
    pub timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: DEFAULT_REPLICAS,
            timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}

/// Contains a consistent snapshot of the cluster as seen by this node.
struct Topology {
    self_url: String,
    options: PoolOptions,
    members: Vec<String>,
    ring: HashRing,
    getters: HashMap<String, Arc<dyn PeerGetter>>,
}

impl Topology {
    fn new(
        self_url: String,
        options: PoolOptions,
        members: Vec<String>,
        client: &Client<HttpConnector>,
    ) -> Self {
        let mut ring = HashRing::new(options.replicas);
        ring.add(&members);

        let mut getters = HashMap::new();
        for member in members.iter().filter(|member| **member != self_url) {
            let getter: Arc<dyn PeerGetter> = Arc::new(HttpGetter::with_client(
                format!("{}{}", member, options.base_path),
                client.clone(),
                options.timeout,
            ));
            let _ = getters.insert(member.clone(), getter);
        }

        Topology {
            self_url,
            options,
            members,
            ring,
            getters,
        }
    }
}

/// Serves the local groups to other nodes and locates the owner of a key.
pub struct HttpPool {
    platform: Arc<Platform>,
    client: Client<HttpConnector>,
    topology: ArcSwap<Topology>,
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}/", trimmed)
    }
}

impl HttpPool {
    /// Creates a new pool for the node reachable via **self_url** (e.g. http://10.0.0.1:8001).
    ///
    /// The pool starts without any peers, see [set_peers](HttpPool::set_peers).
    pub fn new(platform: &Arc<Platform>, self_url: &str, options: PoolOptions) -> Self {
        let options = PoolOptions {
            base_path: normalize_base_path(&options.base_path),
            ..options
        };
        let client = Client::new();
        let topology = Topology::new(normalize_url(self_url), options, Vec::new(), &client);

        HttpPool {
            platform: platform.clone(),
            client,
            topology: ArcSwap::new(Arc::new(topology)),
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
        }
    }

    /// Replaces the set of known peers.
    ///
    /// Each peer is given as base URL (e.g. http://10.0.0.2:8001). The list should contain the URL
    /// of this node as well, as otherwise it will never consider itself the owner of a key.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let current = self.topology.load();
        self.reconfigure(
            current.self_url.clone(),
            current.options.clone(),
            peers.into_iter().map(|peer| normalize_url(peer.as_ref())).collect(),
        );
    }

    fn reconfigure(&self, self_url: String, options: PoolOptions, members: Vec<String>) {
        log::info!(
            "Using {} peers ({} virtual nodes each) for {}...",
            members.len(),
            options.replicas,
            self_url
        );
        if !members.is_empty() && !members.contains(&self_url) {
            log::warn!(
                "{} is not listed as a member of the cluster. \
                 Keys owned by an alias of this node will be fetched via HTTP from itself. \
                 Consider specifying peers.self.",
                self_url
            );
        }
        self.topology.store(Arc::new(Topology::new(
            self_url,
            options,
            members,
            &self.client,
        )));
    }

    /// Returns the base URL of this node.
    pub fn self_url(&self) -> String {
        self.topology.load().self_url.clone()
    }

    /// Returns the URL prefix under which values are served.
    pub fn base_path(&self) -> String {
        self.topology.load().options.base_path.clone()
    }

    /// Returns the base URLs of all members of the cluster.
    pub fn peers(&self) -> Vec<String> {
        self.topology.load().members.clone()
    }

    /// Re-reads the **peers** section of the config and rebuilds the ring.
    fn apply_config(&self) {
        if let Some(config) = self.platform.find::<Config>() {
            let handle = config.current();

            let self_url = handle
                .query("peers.self")
                .as_str()
                .map(normalize_url)
                .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port()));
            let options = PoolOptions {
                base_path: normalize_base_path(
                    handle
                        .query("peers.base_path")
                        .as_str()
                        .unwrap_or(DEFAULT_BASE_PATH),
                ),
                replicas: handle
                    .query("peers.replicas")
                    .as_i64()
                    .filter(|replicas| *replicas > 0)
                    .map(|replicas| replicas as usize)
                    .unwrap_or(DEFAULT_REPLICAS),
                timeout: handle
                    .query("peers.timeout")
                    .as_i64()
                    .filter(|millis| *millis > 0)
                    .map(|millis| Duration::from_millis(millis as u64))
                    .unwrap_or(DEFAULT_PEER_TIMEOUT),
            };
            let members = handle
                .query("peers.members")
                .as_vec()
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|member| member.as_str())
                        .map(normalize_url)
                        .collect()
                })
                .unwrap_or_default();

            self.reconfigure(self_url, options, members);
        }
    }

    fn port(&self) -> i64 {
        self.platform
            .find::<Config>()
            .and_then(|config| {
                config
                    .current()
                    .query("server.port")
                    .as_i64()
                    .filter(|port| port > &0 && port <= &(u16::MAX as i64))
            })
            .unwrap_or(DEFAULT_PORT as i64)
    }

    fn address(&self) -> String {
        let host = self
            .platform
            .find::<Config>()
            .and_then(|config| {
                config
                    .current()
                    .query("server.host")
                    .as_str()
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| DEFAULT_HOST.to_owned());

        format!("{}:{}", host, self.port())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the event loop in a separate task.
    pub fn fork(pool: &Arc<HttpPool>) {
        let cloned_pool = pool.clone();
        spawn!(async move {
            cloned_pool.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is open.
    pub async fn fork_and_await(pool: &Arc<HttpPool>) {
        HttpPool::fork(pool);

        while pool.current_address.lock().unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Opens the server socket and serves incoming requests until the platform is terminated.
    pub async fn event_loop(self: &Arc<Self>) {
        let mut address = String::new();
        let mut last_bind_error_reported = Instant::now();

        while self.platform.is_running() {
            // If the sever is started for the first time or if it has been restarted due to a
            // config change, we need to reload the address...
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            match TcpListener::bind(&address).await {
                Ok(listener) => {
                    log::info!("Opened peer endpoint on {}...", &address);
                    *self.current_address.lock().unwrap() = Some(address.clone());
                    if let Err(error) = self.server_loop(listener).await {
                        log::error!("The peer endpoint on {} failed: {:#}", &address, error);
                        tokio::time::sleep(CONNECT_WAIT_TIMEOUT).await;
                    }
                    log::info!("Closed peer endpoint on {}.", &address);
                }
                Err(_) => {
                    // We only log this every once in a while (every 5s), as we retry every 500ms.
                    if Instant::now()
                        .duration_since(last_bind_error_reported)
                        .as_secs()
                        > 5
                    {
                        log::error!(
                            "Cannot open peer endpoint: {}. Retrying every 500ms...",
                            &address
                        );
                        last_bind_error_reported = Instant::now();
                    }
                    tokio::time::sleep(CONNECT_WAIT_TIMEOUT).await;
                }
            }
        }
    }

    async fn server_loop(self: &Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        let incoming = AddrIncoming::from_listener(listener)
            .context("Failed to accept connections on the server socket.")?;

        let pool = self.clone();
        let make_service = make_service_fn(move |_connection| {
            let pool = pool.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let pool = pool.clone();
                    async move { Ok::<_, Infallible>(pool.handle(request).await) }
                }))
            }
        });

        hyper::Server::builder(incoming)
            .serve(make_service)
            .with_graceful_shutdown(self.await_restart())
            .await
            .context("Failed to serve peer requests.")
    }

    /// Completes once the platform is terminated or once the bind address has changed.
    async fn await_restart(&self) {
        let mut notifier: Option<ChangeNotifier> = self
            .platform
            .find::<Config>()
            .map(|config| config.notifier());

        while self.platform.is_running() {
            // We use a timeout here so that platform.is_running() is checked every once in a
            // while...
            let event = match notifier.as_mut() {
                Some(receiver) => tokio::time::timeout(CONNECT_WAIT_TIMEOUT, receiver.recv())
                    .await
                    .ok(),
                None => {
                    tokio::time::sleep(CONNECT_WAIT_TIMEOUT).await;
                    None
                }
            };

            match event {
                Some(Err(RecvError::Closed)) => notifier = None,
                Some(_) => {
                    let new_address = self.address();
                    let changed = self
                        .current_address
                        .lock()
                        .unwrap()
                        .as_ref()
                        .map(|current_address| current_address != &new_address)
                        .unwrap_or(false);
                    if changed {
                        log::info!("Peer endpoint address has changed. Restarting...");

                        // Force the event_loop to re-evaluate the expected address...
                        self.running.store(false, Ordering::Release);
                        return;
                    }
                }
                None => (),
            }
        }
    }

    async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let base_path = self.base_path();
        let path = request.uri().path();

        let rest = match path.strip_prefix(base_path.as_str()) {
            Some(rest) => rest,
            None => {
                return text_response(
                    StatusCode::BAD_REQUEST,
                    format!("Unexpected path: {}", path),
                )
            }
        };

        let groups = match self.platform.find::<Groups>() {
            Some(groups) => groups,
            None => {
                return text_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "No groups are available.".to_owned(),
                )
            }
        };

        if rest.is_empty() {
            return text_response(StatusCode::OK, self.report(&groups));
        }

        let (group_name, key) = match parse_group_and_key(rest) {
            Some(group_and_key) => group_and_key,
            None => {
                return text_response(StatusCode::BAD_REQUEST, format!("Bad request: {}", path))
            }
        };

        let group = match groups.get_group(&group_name) {
            Some(group) => group,
            None => {
                return text_response(
                    StatusCode::NOT_FOUND,
                    format!("No such group: {}", group_name),
                )
            }
        };

        log::debug!("Serving {}/{} for a peer...", group_name, key);
        group.stats().record_server_request();

        match group.get(&key).await {
            Ok(value) => {
                let mut response = Response::new(Body::from(value.bytes()));
                let _ = response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
            Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        }
    }

    fn report(&self, groups: &Groups) -> String {
        let topology = self.topology.load();
        let mut result = String::new();

        result += format!("Node:  {}\n", topology.self_url).as_str();
        result += format!("Peers: {}\n\n", topology.members.join(", ")).as_str();
        result += groups.report().as_str();

        result
    }
}

fn parse_group_and_key(path: &str) -> Option<(String, String)> {
    let (group, key) = path.split_once('/')?;
    let group = urlencoding::decode(group).ok()?;
    let key = urlencoding::decode(key).ok()?;

    Some((group.into_owned(), key.into_owned()))
}

fn text_response(status: StatusCode, text: String) -> Response<Body> {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = status;
    let _ = response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

    response
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let topology = self.topology.load();
        let owner = topology.ring.get(key)?;
        if owner == topology.self_url {
            return None;
        }

        log::debug!("Picked {} as owner of {}", owner, key);
        topology.getters.get(owner).cloned()
    }
}

/// Fetches values from a remote [HttpPool].
pub struct HttpGetter {
    base_url: String,
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl HttpGetter {
    /// Creates a getter for the pool serving under **base_url** (e.g. http://10.0.0.2:8001/_ganymede/).
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpGetter::with_client(base_url, Client::new(), DEFAULT_PEER_TIMEOUT)
    }

    fn with_client(
        base_url: impl Into<String>,
        client: Client<HttpConnector>,
        timeout: Duration,
    ) -> Self {
        HttpGetter {
            base_url: base_url.into(),
            client,
            timeout,
        }
    }

    /// Specifies how long to wait for a response before giving up (5s by default).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self, url: &str) -> anyhow::Result<(StatusCode, Bytes)> {
        let uri = url
            .parse::<Uri>()
            .with_context(|| format!("Invalid peer url: {}", url))?;

        let response = self
            .client
            .get(uri)
            .await
            .with_context(|| format!("Failed to query {}", url))?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .with_context(|| format!("Failed to read the response of {}", url))?;

        Ok((status, body))
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, request: &FetchRequest) -> anyhow::Result<FetchResponse> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(&request.group),
            urlencoding::encode(&request.key)
        );
        let (status, body) = tokio::time::timeout(self.timeout, self.fetch(&url))
            .await
            .map_err(|_| {
                anyhow::anyhow!("{} didn't respond within {}ms", url, self.timeout.as_millis())
            })??;

        if status != StatusCode::OK {
            return Err(anyhow::anyhow!(
                "{} returned {}: {}",
                url,
                status,
                String::from_utf8_lossy(&body)
            ));
        }

        Ok(FetchResponse { value: body })
    }
}

/// Creates an [HttpPool] based on the current config and registers it in the platform.
///
/// The pool follows all changes of the config. Note that this doesn't start the event loop of
/// the pool, see [event_loop](HttpPool::event_loop) or [fork](HttpPool::fork).
pub fn install(platform: &Arc<Platform>) -> Arc<HttpPool> {
    let pool = Arc::new(HttpPool::new(
        platform,
        &format!("http://127.0.0.1:{}", DEFAULT_PORT),
        PoolOptions::default(),
    ));
    pool.apply_config();
    platform.register::<HttpPool>(pool.clone());

    if let Some(config) = platform.find::<Config>() {
        let mut notifier = config.notifier();
        let platform = platform.clone();
        let pool = pool.clone();
        spawn!(async move {
            while platform.is_running() {
                match notifier.recv().await {
                    Ok(_) | Err(RecvError::Lagged(_)) => pool.apply_config(),
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }

    pool
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::group::{FnGetter, Getter, Group, Groups};
    use crate::http::{install, HttpGetter, HttpPool, PoolOptions};
    use crate::peers::{FetchRequest, PeerGetter, PeerPicker};
    use crate::platform::Platform;
    use crate::testing::test_async;
    use hyper::{Body, Client, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;

    fn scores_getter(node: &str) -> Arc<dyn Getter> {
        let node = node.to_owned();
        Arc::new(FnGetter::new(move |key: &str| {
            if key == "fail" {
                Err(anyhow::anyhow!("{} cannot load {}", node, key))
            } else {
                Ok(format!("{}:{}", node, key).into_bytes())
            }
        }))
    }

    async fn body_text(response: hyper::Response<Body>) -> String {
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8_lossy(&body).to_string()
    }

    #[test]
    fn peers_are_picked_consistently_but_never_self() {
        let platform = Platform::new();
        let pool = HttpPool::new(&platform, "http://10.0.0.1:8001/", PoolOptions::default());

        // Without any peers, every key is owned locally...
        assert!(pool.pick_peer("Tom").is_none());

        pool.set_peers(["http://10.0.0.1:8001", "http://10.0.0.2:8001"]);
        assert_eq!(pool.peers().len(), 2);

        let mut remote_keys = 0;
        for i in 0..100 {
            let key = format!("key-{}", i);
            let owner = pool.topology.load().ring.get(&key).unwrap().to_owned();
            let peer = pool.pick_peer(&key);
            if owner == "http://10.0.0.1:8001" {
                assert!(peer.is_none());
            } else {
                assert!(peer.is_some());
                remote_keys += 1;
            }
        }
        assert!(remote_keys > 0 && remote_keys < 100);

        // A cluster which only consists of this node never picks a peer...
        pool.set_peers(["http://10.0.0.1:8001"]);
        for i in 0..100 {
            assert!(pool.pick_peer(&format!("key-{}", i)).is_none());
        }
    }

    #[test]
    fn requests_are_routed_to_groups() {
        test_async(async {
            let platform = Platform::new();
            let groups = Groups::install(&platform);
            let _ = groups.new_group("scores", 1024, scores_getter("local"));
            let pool = HttpPool::new(&platform, "http://127.0.0.1:8001", PoolOptions::default());

            let get = |uri: &str| Request::get(uri).body(Body::empty()).unwrap();

            let response = pool.handle(get("/_ganymede/scores/Tom")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[hyper::header::CONTENT_TYPE],
                "application/octet-stream"
            );
            assert_eq!(body_text(response).await, "local:Tom");

            // Segments are URL-decoded...
            let response = pool.handle(get("/_ganymede/scores/Tom%20%2F%20Jerry")).await;
            assert_eq!(body_text(response).await, "local:Tom / Jerry");

            let response = pool.handle(get("/_ganymede/unknown/Tom")).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let response = pool.handle(get("/_ganymede/scores")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = pool.handle(get("/other/scores/Tom")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = pool.handle(get("/_ganymede/scores/fail")).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body_text(response).await, "local cannot load fail");

            let response = pool.handle(get("/_ganymede/")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_text(response).await.contains("scores"));

            let scores = groups.get_group("scores").unwrap();
            assert_eq!(scores.stats().server_requests(), 3);
        });
    }

    async fn start_node(name: &str, port: u16) -> (Arc<Platform>, Arc<HttpPool>, Arc<Group>) {
        let platform = Platform::new();
        let config = Arc::new(Config::new("unused.yml"));
        config
            .load_from_string(
                format!(
                    "
server:
    host: 127.0.0.1
    port: {}
peers:
    self: http://127.0.0.1:{}
    members:
        - http://127.0.0.1:1503
        - http://127.0.0.1:1504
",
                    port, port
                )
                .as_str(),
                None,
            )
            .unwrap();
        platform.register::<Config>(config);

        let groups = Groups::install(&platform);
        let scores = groups.new_group("scores", 1024, scores_getter(name));
        let pool = install(&platform);
        scores.register_peers(pool.clone());
        HttpPool::fork_and_await(&pool).await;

        (platform, pool, scores)
    }

    #[test]
    fn values_are_fetched_from_their_owner() {
        // We want exclusive access to the ports 1503 and 1504...
        log::info!("Acquiring shared resources...");
        let _guard = crate::testing::SHARED_TEST_RESOURCES.lock().unwrap();
        log::info!("Successfully acquired shared resources.");

        test_async(async {
            let (platform_a, pool_a, scores_a) = start_node("a", 1503).await;
            let (platform_b, _pool_b, scores_b) = start_node("b", 1504).await;

            let mut keys_owned_by_b = 0;
            for i in 0..20 {
                let key = format!("key-{}", i);
                let value = scores_a.get(&key).await.unwrap().to_text();
                if pool_a.pick_peer(&key).is_some() {
                    assert_eq!(value, format!("b:{}", key));
                    keys_owned_by_b += 1;
                } else {
                    assert_eq!(value, format!("a:{}", key));
                }
            }

            assert_eq!(scores_a.stats().peer_loads(), keys_owned_by_b);
            assert_eq!(scores_a.stats().peer_errors(), 0);
            assert_eq!(scores_b.stats().server_requests(), keys_owned_by_b);
            assert_eq!(scores_b.cache_stats().entries, keys_owned_by_b);
            assert_eq!(scores_a.cache_stats().entries, 20 - keys_owned_by_b);

            // Failures are reported with their status and message...
            let getter = HttpGetter::new("http://127.0.0.1:1504/_ganymede/");
            let error = getter
                .get(&FetchRequest {
                    group: "scores".to_owned(),
                    key: "fail".to_owned(),
                })
                .await
                .unwrap_err()
                .to_string();
            assert!(error.contains("500"));
            assert!(error.contains("b cannot load fail"));

            // The statistics page can be fetched by any HTTP client...
            let response = Client::new()
                .get("http://127.0.0.1:1504/_ganymede/".parse().unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_text(response).await.contains("http://127.0.0.1:1503"));

            platform_a.terminate();
            platform_b.terminate();
        });
    }

    #[test]
    fn a_node_listed_under_an_alias_falls_back_to_local_loads() {
        // We want exclusive access to the port 1503...
        log::info!("Acquiring shared resources...");
        let _guard = crate::testing::SHARED_TEST_RESOURCES.lock().unwrap();
        log::info!("Successfully acquired shared resources.");

        test_async(async {
            let platform = Platform::new();
            let config = Arc::new(Config::new("unused.yml"));
            config
                .load_from_string(
                    "
server:
    host: 127.0.0.1
    port: 1503
peers:
    timeout: 200
    members:
        - http://localhost:1503
",
                    None,
                )
                .unwrap();
            platform.register::<Config>(config);

            let groups = Groups::install(&platform);
            let scores = groups.new_group("scores", 1024, scores_getter("a"));
            let pool = install(&platform);
            scores.register_peers(pool.clone());
            HttpPool::fork_and_await(&pool).await;

            // This node doesn't recognize itself, so it asks "localhost" for the value, which
            // ends up waiting for its own load...
            assert_eq!(pool.self_url(), "http://127.0.0.1:1503");
            assert!(pool.pick_peer("Tom").is_some());

            let value = tokio::time::timeout(Duration::from_secs(5), scores.get("Tom"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(value.to_text(), "a:Tom");
            assert_eq!(scores.stats().peer_errors(), 1);
            assert_eq!(scores.stats().local_loads(), 1);
            assert_eq!(scores.cache_stats().entries, 1);

            platform.terminate();
        });
    }

    #[test]
    fn stalled_peers_are_reported_as_errors() {
        test_async(async {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap();

            // Accept connections but never answer...
            let _server = tokio::spawn(async move {
                let mut connections = Vec::new();
                while let Ok((stream, _)) = listener.accept().await {
                    connections.push(stream);
                }
            });

            let getter = HttpGetter::new(format!("http://{}/_ganymede/", address))
                .with_timeout(Duration::from_millis(100));
            let error = getter
                .get(&FetchRequest {
                    group: "scores".to_owned(),
                    key: "Tom".to_owned(),
                })
                .await
                .unwrap_err()
                .to_string();
            assert!(error.contains("didn't respond within 100ms"));
        });
    }

}
