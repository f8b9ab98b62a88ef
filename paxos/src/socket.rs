//! # Summary
//!
//! This module abstracts over the UDP multicast groups connecting roles.
//!
//! Each process binds one receiving socket to its own role's group and one
//! sending socket on an ephemeral port. Group membership allows several
//! processes of the same role on one host, so the receiving socket is bound
//! with address and port reuse. Every datagram carries exactly one JSON
//! encoded `Message`.

use std::marker::PhantomData;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::Error;
use crate::message::Message;
use crate::network::{Network, Role};
use crate::state::Value;

/// Largest datagram accepted.
const BUFFER_SIZE: usize = 1 << 16;

/// Receiving end of a role group.
pub struct Rx<V> {
    socket: UdpSocket,
    buffer: Vec<u8>,
    _marker: PhantomData<V>,
}

/// Sending end, addressed by role.
pub struct Tx {
    socket: UdpSocket,
    network: Network,
}

impl<V: Value> Rx<V> {
    /// Joins `group` and listens on its port. Must be called within a tokio runtime.
    pub fn bind(group: SocketAddrV4) -> Result<Self, Error> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, group.port()));
        socket.bind(&local.into())?;
        if group.ip().is_multicast() {
            socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
        }
        socket.set_nonblocking(true)?;
        debug!("listening on {}", group);
        Ok(Rx {
            socket: UdpSocket::from_std(socket.into())?,
            buffer: vec![0; BUFFER_SIZE],
            _marker: PhantomData,
        })
    }

    /// Waits for the next datagram and decodes it.
    /// Malformed datagrams surface as `Error::Codec`.
    pub async fn recv(&mut self) -> Result<Message<V>, Error> {
        let (len, from) = self.socket.recv_from(&mut self.buffer).await?;
        trace!("received {} bytes from {}", len, from);
        Message::decode(&self.buffer[..len])
    }
}

impl Tx {
    /// Opens a sending socket whose multicast traffic also loops back to
    /// this host. Must be called within a tokio runtime.
    pub fn bind(network: Network) -> Result<Self, Error> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_multicast_loop_v4(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        socket.set_nonblocking(true)?;
        Ok(Tx {
            socket: UdpSocket::from_std(socket.into())?,
            network,
        })
    }

    pub async fn send<V: Value>(&self, role: Role, message: &Message<V>) -> Result<(), Error> {
        let group = self.network.group(role)?;
        let bytes = message.encode()?;
        trace!("sending {} bytes to {} at {}", bytes.len(), role, group);
        self.socket.send_to(&bytes, group).await?;
        Ok(())
    }
}
