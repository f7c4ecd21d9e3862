//! Embedded DNS server (§4.7 step 6, §6 "DNS listener"). Bound to
//! `127.0.0.1:2053` over UDP and TCP, answering A/AAAA for container
//! hostnames from the network service's hosts table and NXDOMAIN for
//! anything else, behind a standard-query validator.
//!
//! No `hickory-server` dependency: its `Catalog`/`Authority` abstraction
//! is built for serving whole zones, which this listener never does (it
//! answers exactly one synthetic table). The wire format itself comes
//! straight from `hickory-proto`'s message types.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use vessel_shared::Result;

use crate::services::NetworkService;

const ANSWER_TTL: u32 = 60;
const MAX_UDP_MESSAGE: usize = 512;

pub struct DnsServer {
    network_service: Arc<NetworkService>,
    bind_addr: SocketAddr,
}

impl DnsServer {
    pub fn new(network_service: Arc<NetworkService>, bind_addr: SocketAddr) -> Self {
        Self {
            network_service,
            bind_addr,
        }
    }

    /// Runs the UDP and TCP listeners concurrently until either fails
    /// (§4.7 step 7: "on fatal error in either, logs the error and
    /// exits").
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let udp_socket = UdpSocket::bind(self.bind_addr).await?;
        let tcp_listener = TcpListener::bind(self.bind_addr).await?;

        let udp_server = Arc::clone(&self);
        let tcp_server = Arc::clone(&self);
        tokio::try_join!(
            tokio::spawn(async move { udp_server.run_udp(udp_socket).await }),
            tokio::spawn(async move { tcp_server.run_tcp(tcp_listener).await }),
        )
        .map_err(|e| vessel_shared::Error::internal(format!("dns server task panicked: {e}")))?
        .0?;
        Ok(())
    }

    async fn run_udp(&self, socket: UdpSocket) -> Result<()> {
        let mut buf = [0u8; MAX_UDP_MESSAGE];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            if let Some(response) = self.handle_query(&buf[..len]) {
                let _ = socket.send_to(&response, peer).await;
            }
        }
    }

    async fn run_tcp(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (mut stream, _peer) = listener.accept().await?;
            let this_network_service = Arc::clone(&self.network_service);
            tokio::spawn(async move {
                let server = DnsServer {
                    network_service: this_network_service,
                    bind_addr: "127.0.0.1:0".parse().expect("static addr"),
                };
                let _ = server.serve_tcp_connection(&mut stream).await;
            });
        }
    }

    async fn serve_tcp_connection(&self, stream: &mut tokio::net::TcpStream) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 2];
            if stream.read_exact(&mut len_buf).await.is_err() {
                return Ok(());
            }
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut message_buf = vec![0u8; len];
            stream.read_exact(&mut message_buf).await?;

            if let Some(response) = self.handle_query(&message_buf) {
                let response_len = (response.len() as u16).to_be_bytes();
                stream.write_all(&response_len).await?;
                stream.write_all(&response).await?;
            }
        }
    }

    /// Validates and answers a single DNS message. Returns `None` when the
    /// input cannot be parsed at all (malformed wire data is dropped
    /// rather than answered, matching UDP's connectionless semantics).
    fn handle_query(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let request = Message::from_bytes(bytes).ok()?;

        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(OpCode::Query);
        response.set_recursion_desired(request.recursion_desired());
        response.set_recursion_available(false);

        // Standard-query validator (§4.7): only plain `QUERY` opcode
        // messages carrying exactly the queries they declare are answered;
        // anything else is rejected as a format error.
        if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
            response.set_response_code(ResponseCode::FormErr);
            return response.to_bytes().ok();
        }

        let mut any_nxdomain = false;
        for query in request.queries() {
            response.add_query(query.clone());

            let name = query.name().to_utf8();
            let hostname = name.trim_end_matches('.');

            let record_type = query.query_type();
            if record_type != RecordType::A && record_type != RecordType::AAAA {
                continue;
            }

            match self.network_service.resolve_hostname(hostname) {
                Ok(Some(addresses)) => {
                    for address in addresses {
                        if let Some(record) = build_answer(query.name().clone(), record_type, &address) {
                            response.add_answer(record);
                        }
                    }
                }
                _ => any_nxdomain = true,
            }
        }

        if any_nxdomain && response.answers().is_empty() {
            response.set_response_code(ResponseCode::NXDomain);
        }

        response.to_bytes().ok()
    }
}

fn build_answer(name: hickory_proto::rr::Name, record_type: RecordType, address: &str) -> Option<Record> {
    let ip: IpAddr = address.parse().ok()?;
    let rdata = match (record_type, ip) {
        (RecordType::A, IpAddr::V4(v4)) => RData::A(A(v4)),
        (RecordType::AAAA, IpAddr::V6(v6)) => RData::AAAA(AAAA(v6)),
        _ => return None,
    };
    Some(Record::from_rdata(name, ANSWER_TTL, rdata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DnsHostStore, NetworkStore};
    use hickory_proto::op::Query;
    use hickory_proto::rr::Name;
    use std::str::FromStr;

    fn server() -> DnsServer {
        let db = Database::open_in_memory().unwrap();
        let network = NetworkService::new(NetworkStore::new(db.clone()), DnsHostStore::new(db)).unwrap();
        network.ensure_default().unwrap();
        network
            .register_attachment("default", "web.container.local", vec!["10.0.0.5".to_string()])
            .unwrap();
        DnsServer::new(network, "127.0.0.1:0".parse().unwrap())
    }

    fn query_message(name: &str, record_type: RecordType) -> Vec<u8> {
        let mut message = Message::new();
        message.set_id(42);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(Name::from_str(name).unwrap(), record_type));
        message.to_bytes().unwrap()
    }

    #[test]
    fn resolves_known_hostname() {
        let server = server();
        let request = query_message("web.container.local.", RecordType::A);
        let response_bytes = server.handle_query(&request).unwrap();
        let response = Message::from_bytes(&response_bytes).unwrap();
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.answers().len(), 1);
    }

    #[test]
    fn unknown_hostname_is_nxdomain() {
        let server = server();
        let request = query_message("ghost.container.local.", RecordType::A);
        let response_bytes = server.handle_query(&request).unwrap();
        let response = Message::from_bytes(&response_bytes).unwrap();
        assert_eq!(response.response_code(), ResponseCode::NXDomain);
    }

    #[test]
    fn non_query_opcode_is_rejected() {
        let server = server();
        let mut message = Message::new();
        message.set_id(1);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Status);
        let bytes = message.to_bytes().unwrap();
        let response = Message::from_bytes(&server.handle_query(&bytes).unwrap()).unwrap();
        assert_eq!(response.response_code(), ResponseCode::FormErr);
    }
}
