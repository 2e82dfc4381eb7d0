//! Shared test infrastructure for resolver integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use docker_dns::authority::DockerDnsHandler;
use docker_dns::error::InventoryError;
use docker_dns::inventory::{ContainerRuntime, EventStream, RuntimeEvent};
use docker_dns::state::{ContainerRegistry, Snapshot};

// --- Constants ---

pub const LOOKUP_TIMEOUT: Duration = Duration::from_millis(200);

pub fn client_src() -> SocketAddr {
    "10.0.0.1:12345".parse().unwrap()
}

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, then parsed back with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
    sends: Arc<AtomicUsize>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
            sends: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of responses written through this handler.
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(info)
    }
}

// --- ScriptedRuntime ---

/// In-memory container runtime driven by the test.
///
/// The listing and per-container addresses are set directly; lifecycle events
/// are pushed through the [`EventFeed`] returned by [`ScriptedRuntime::new`].
/// Like the daemon, the first subscription replays earlier events newer than
/// its `since` argument.
pub struct ScriptedRuntime {
    names: Mutex<Result<Snapshot, InventoryError>>,
    addresses: Mutex<HashMap<String, Result<Ipv4Addr, InventoryError>>>,
    events: Mutex<Option<UnboundedReceiver<RuntimeEvent>>>,
    history: Arc<Mutex<Vec<(SystemTime, RuntimeEvent)>>>,
    since: Mutex<Vec<SystemTime>>,
    lists: AtomicUsize,
    inspects: AtomicUsize,
}

/// Sending half of a [`ScriptedRuntime`]'s event stream.
#[derive(Clone)]
pub struct EventFeed {
    tx: UnboundedSender<RuntimeEvent>,
    history: Arc<Mutex<Vec<(SystemTime, RuntimeEvent)>>>,
}

impl EventFeed {
    pub fn send(&self, kind: &str, action: &str, actor: &str) {
        self.tx
            .unbounded_send(RuntimeEvent::new(kind, action, Some(actor)))
            .expect("event stream receiver dropped");
    }

    /// Record an event that happened before anyone subscribed. Only a
    /// subscription whose `since` is not later than now will see it.
    pub fn send_before_subscribe(&self, kind: &str, action: &str, actor: &str) {
        self.history
            .lock()
            .unwrap()
            .push((SystemTime::now(), RuntimeEvent::new(kind, action, Some(actor))));
    }

    /// End the event stream.
    pub fn close(&self) {
        self.tx.close_channel();
    }
}

impl ScriptedRuntime {
    pub fn new() -> (Arc<Self>, EventFeed) {
        let (tx, rx) = unbounded();
        let history = Arc::new(Mutex::new(Vec::new()));
        let runtime = Arc::new(Self {
            names: Mutex::new(Ok(Snapshot::new())),
            addresses: Mutex::new(HashMap::new()),
            events: Mutex::new(Some(rx)),
            history: history.clone(),
            since: Mutex::new(Vec::new()),
            lists: AtomicUsize::new(0),
            inspects: AtomicUsize::new(0),
        });
        (runtime, EventFeed { tx, history })
    }

    /// Set the running containers as (short name, id) pairs.
    pub fn set_running(&self, containers: &[(&str, &str)]) {
        let names = containers
            .iter()
            .map(|(name, id)| (name.to_string(), id.to_string()))
            .collect();
        *self.names.lock().unwrap() = Ok(names);
    }

    /// Make listing fail with `err`.
    pub fn fail_listing(&self, err: InventoryError) {
        *self.names.lock().unwrap() = Err(err);
    }

    pub fn set_address(&self, id: &str, ip: Ipv4Addr) {
        self.addresses
            .lock()
            .unwrap()
            .insert(id.to_string(), Ok(ip));
    }

    pub fn fail_inspect(&self, id: &str, err: InventoryError) {
        self.addresses
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(err));
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn inspect_calls(&self) -> usize {
        self.inspects.load(Ordering::SeqCst)
    }

    /// The `since` argument of every subscription opened so far.
    pub fn subscriptions(&self) -> Vec<SystemTime> {
        self.since.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn list_names(&self) -> Result<Snapshot, InventoryError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().clone()
    }

    async fn inspect_address(&self, id: &str) -> Result<Ipv4Addr, InventoryError> {
        self.inspects.fetch_add(1, Ordering::SeqCst);
        self.addresses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Err(InventoryError::ContainerNotFound(id.to_string())))
    }

    fn events(&self, since: SystemTime) -> EventStream {
        self.since.lock().unwrap().push(since);
        let Some(rx) = self.events.lock().unwrap().take() else {
            return futures::stream::empty().boxed();
        };
        let replayed: Vec<_> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|(at, _)| *at >= since)
            .map(|(_, event)| Ok(event.clone()))
            .collect();
        futures::stream::iter(replayed).chain(rx.map(Ok)).boxed()
    }
}

// --- Handler construction ---

/// Build a handler over a registry holding `containers`.
pub fn build_handler(
    containers: &[(&str, &str)],
    runtime: Arc<ScriptedRuntime>,
) -> DockerDnsHandler {
    let names: Snapshot = containers
        .iter()
        .map(|(name, id)| (name.to_string(), id.to_string()))
        .collect();
    DockerDnsHandler::new(
        ContainerRegistry::with_snapshot(names),
        runtime,
        LOOKUP_TIMEOUT,
    )
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(
    name: &str,
    record_type: RecordType,
    class: DNSClass,
    edns: bool,
    id: u16,
) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(class);
    msg.add_query(query);
    if edns {
        let mut opt = Edns::new();
        opt.set_max_payload(1232);
        msg.set_edns(opt);
    }
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` for an A query in class IN.
pub fn build_request(name: &str, id: u16) -> Request {
    let bytes = build_query_bytes(name, RecordType::A, DNSClass::IN, false, id);
    Request::new(parse_message_request(&bytes), client_src(), Protocol::Udp)
}

// --- Response helpers ---

/// Send `request` through the handler and return the parsed response.
pub async fn execute_request(handler: &DockerDnsHandler, request: Request) -> Message {
    let response = TestResponseHandler::new();
    handler.handle_request(&request, response.clone()).await;
    assert_eq!(response.sends(), 1, "expected exactly one response");
    response.into_message()
}

/// Execute an A query through the handler and return the parsed response.
pub async fn execute_query(handler: &DockerDnsHandler, name: &str, id: u16) -> Message {
    execute_request(handler, build_request(name, id)).await
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert the response is the negative shape: authoritative NXDOMAIN, no
/// answers or additionals, one SOA for `name` in the authority section.
pub fn assert_negative_response(msg: &Message, name: &str) {
    assert_response_code(msg, ResponseCode::NXDomain);
    assert!(msg.header().authoritative(), "response must be authoritative");
    assert!(msg.answers().is_empty(), "unexpected answers: {:?}", msg.answers());
    assert!(msg.additionals().is_empty());

    let authority = msg.name_servers();
    assert_eq!(authority.len(), 1, "expected one SOA, got {:?}", authority);
    let soa_record = &authority[0];
    let zone = Name::from_ascii(name).unwrap();
    assert_eq!(soa_record.name(), &zone);
    assert_eq!(soa_record.ttl(), 60);

    let RData::SOA(soa) = soa_record.data() else {
        panic!("expected SOA in authority, got {:?}", soa_record.data());
    };
    assert_eq!(soa.mname(), &zone.prepend_label("ns1").unwrap());
    assert_eq!(soa.rname(), &zone.prepend_label("postmaster").unwrap());
    assert_eq!(soa.serial(), 1_524_370_381);
}

/// Poll `condition` until it holds, failing after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met before deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
