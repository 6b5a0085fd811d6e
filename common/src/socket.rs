use socket2::{Domain, Socket, Type};
use std::net::{AddrParseError, SocketAddr};

pub const DEFAULT_BACKLOG: i32 = 128;

/// Opens a non-blocking listening socket with address and port reuse enabled,
/// so a re-executed process (or a re-bind after a listener fault) can take the
/// port over while the old socket is still draining.
pub fn listen_reuse_socket(addr: &SocketAddr, backlog: i32) -> Result<Socket, std::io::Error> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(backlog)?;
    Ok(socket)
}

pub fn parse_address(mut addr: String) -> Result<SocketAddr, AddrParseError> {
    if addr.starts_with(':') {
        addr.insert_str(0, "0.0.0.0");
    }

    addr.parse()
}
