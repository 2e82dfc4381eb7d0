//! Authoritative responder for container names.
//!
//! Every query is answered from the registry: the first label of the queried
//! name is the container's short name. A hit with a live IPv4 address gets one
//! A record; anything else gets NXDOMAIN with a synthetic SOA for the queried
//! name in the authority section. All responses are authoritative.

use async_trait::async_trait;
use hickory_proto::op::{Edns, Header, ResponseCode};
use hickory_proto::rr::rdata::{A, SOA};
use hickory_proto::rr::{DNSClass, Name, RData, Record};
use hickory_proto::ProtoError;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::PLUGIN_NAME;
use crate::inventory::{with_deadline, ContainerRuntime};
use crate::metrics::{self, QueryResult, Timer};
use crate::state::ContainerRegistry;

/// Serial carried by every synthetic SOA. Fixed, not derived from registry state.
pub const SOA_SERIAL: u32 = 1_524_370_381;
/// TTL of the synthetic SOA record.
pub const SOA_TTL: u32 = 60;
const SOA_REFRESH: i32 = 14400;
const SOA_RETRY: i32 = 3600;
const SOA_EXPIRE: i32 = 604_800;
const SOA_MINIMUM: u32 = 60;

/// TTL on positive answers; clients should not cache container addresses.
pub const ANSWER_TTL: u32 = 0;

/// Smallest EDNS payload size advertised back to clients.
const MIN_EDNS_PAYLOAD: u16 = 512;

/// Short name a query resolves against: the first label of `name`.
pub fn short_name(name: &Name) -> Option<String> {
    name.iter()
        .next()
        .map(|label| String::from_utf8_lossy(label).into_owned())
}

/// Build the synthetic SOA for `zone`:
/// `<zone> 60 IN SOA ns1.<zone> postmaster.<zone> 1524370381 14400 3600 604800 60`.
pub fn synthetic_soa(zone: &Name) -> Result<Record, ProtoError> {
    let soa = SOA::new(
        zone.prepend_label("ns1")?,
        zone.prepend_label("postmaster")?,
        SOA_SERIAL,
        SOA_REFRESH,
        SOA_RETRY,
        SOA_EXPIRE,
        SOA_MINIMUM,
    );
    let mut record = Record::from_rdata(zone.clone(), SOA_TTL, RData::SOA(soa));
    record.set_dns_class(DNSClass::IN);
    Ok(record)
}

/// Build the A answer for a resolved container.
pub fn address_record(name: Name, class: DNSClass, ip: Ipv4Addr) -> Record {
    let mut record = Record::from_rdata(name, ANSWER_TTL, RData::A(A(ip)));
    record.set_dns_class(class);
    record
}

/// EDNS options for the response, sized from the request's advertised payload.
fn response_edns(request: &Request) -> Option<Edns> {
    let req_edns = request.edns()?;
    let mut edns = Edns::new();
    edns.set_version(0);
    edns.set_max_payload(req_edns.max_payload().max(MIN_EDNS_PAYLOAD));
    Some(edns)
}

/// DNS request handler resolving container names.
#[derive(Clone)]
pub struct DockerDnsHandler {
    registry: ContainerRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    lookup_timeout: Duration,
}

impl DockerDnsHandler {
    /// Create a handler over `registry`, resolving addresses through `runtime`.
    pub fn new(
        registry: ContainerRegistry,
        runtime: Arc<dyn ContainerRuntime>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            runtime,
            lookup_timeout,
        }
    }

    /// Name the handler is registered under.
    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// Resolve a short name to the container's current address.
    pub async fn resolve(&self, short_name: &str) -> Result<Ipv4Addr, QueryResult> {
        let Some(id) = self.registry.lookup(short_name) else {
            debug!(name = short_name, "container not found");
            trace!(available = ?self.registry.snapshot(), "registry contents");
            return Err(QueryResult::NxDomain);
        };

        match with_deadline(self.lookup_timeout, self.runtime.inspect_address(&id)).await {
            Ok(ip) => Ok(ip),
            Err(e) if e.is_miss() => {
                debug!(name = short_name, id = %id, "container has no address: {}", e);
                Err(QueryResult::NoAddress)
            }
            Err(e) => {
                warn!(name = short_name, id = %id, "failed to inspect container: {}", e);
                Err(QueryResult::RuntimeError)
            }
        }
    }

    async fn send<R: ResponseHandler>(
        request: &Request,
        mut response_handle: R,
        header: Header,
        answers: &[Record],
        soa: &[Record],
    ) -> ResponseInfo {
        let mut builder = MessageResponseBuilder::from_message_request(request);
        if let Some(edns) = response_edns(request) {
            builder.edns(edns);
        }
        let response = builder.build(
            header,
            answers.iter(),
            std::iter::empty(),
            soa.iter(),
            std::iter::empty(),
        );

        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                warn!("failed to send DNS response: {}", e);
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

#[async_trait]
impl RequestHandler for DockerDnsHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);

        let Some(query) = request.queries().first() else {
            debug!(src = %request.src(), "request without a question");
            header.set_response_code(ResponseCode::FormErr);
            return Self::send(request, response_handle, header, &[], &[]).await;
        };

        let qname = Name::from(query.name().clone());
        trace!(name = %qname, rtype = ?query.query_type(), "DNS query");

        let resolved = match short_name(&qname) {
            Some(short) => self.resolve(&short).await,
            None => Err(QueryResult::NxDomain),
        };

        match resolved {
            Ok(ip) => {
                debug!(name = %qname, %ip, "A lookup: returning record");
                metrics::record_query(QueryResult::Success, timer.elapsed());
                let answer = address_record(qname, query.query_class(), ip);
                Self::send(request, response_handle, header, &[answer], &[]).await
            }
            Err(result) => {
                metrics::record_query(result, timer.elapsed());
                header.set_response_code(ResponseCode::NXDomain);
                let soa = match synthetic_soa(&qname) {
                    Ok(soa) => vec![soa],
                    Err(e) => {
                        warn!(name = %qname, "cannot build SOA for negative response: {}", e);
                        Vec::new()
                    }
                };
                Self::send(request, response_handle, header, &[], &soa).await
            }
        }
    }
}
