use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;

pub mod interface;

// Several receivers may listen to the same group and port
fn new_listen_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    Ok(socket)
}

/// Without this Linux delivers datagrams for a joined group to every socket
/// bound to that group and port, whatever interface did the join.
#[cfg(target_os = "linux")]
fn disable_multicast_all(socket: &Socket) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let optval: libc::c_int = 0;
    // SAFETY: the fd is owned by `socket` and optval outlives the call
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_IP,
            libc::IP_MULTICAST_ALL,
            &optval as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn disable_multicast_all(_socket: &Socket) -> io::Result<()> {
    Ok(())
}

// Windows refuses a bind to a multicast address, so there the port is bound
// on all addresses and the join does the filtering.
#[cfg(windows)]
fn bind_address(group: &SocketAddrV4) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port())
}

#[cfg(not(windows))]
fn bind_address(group: &SocketAddrV4) -> SocketAddrV4 {
    *group
}

fn join_multicast(socket: &Socket, group: &SocketAddrV4, nic_addr: &Ipv4Addr) -> io::Result<()> {
    disable_multicast_all(socket)?;

    let bind_addr = bind_address(group);
    socket.bind(&SockAddr::from(bind_addr))?;
    socket.join_multicast_v4(group.ip(), nic_addr)?;

    log::trace!("Joined {} on nic {} bound to {}", group, nic_addr, bind_addr);
    Ok(())
}

/// Open a socket that receives the datagrams sent to multicast group `addr`
/// as they arrive on the interface that owns `nic_addr`.
///
/// Must be called from within a tokio runtime.
pub fn create_udp_multicast_listen(
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<UdpSocket> {
    let socket = new_listen_socket()?;
    join_multicast(&socket, addr, nic_addr)?;

    UdpSocket::from_std(socket.into())
}

/// A connected pair of loopback sockets. Anything sent on the first arrives on
/// the second, and the second only accepts datagrams from the first.
///
/// Both are returned as plain non-blocking std sockets so that the pair can be
/// created, and the sender used, outside of a tokio runtime.
pub fn create_wake_pair() -> io::Result<(std::net::UdpSocket, std::net::UdpSocket)> {
    let receiver = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    let sender = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;

    sender.connect(receiver.local_addr()?)?;
    receiver.connect(sender.local_addr()?)?;
    sender.set_nonblocking(true)?;
    receiver.set_nonblocking(true)?;

    log::trace!(
        "Wake pair {} -> {}",
        sender.local_addr()?,
        receiver.local_addr()?
    );
    Ok((sender, receiver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_pair_delivers_one_byte() {
        let (sender, receiver) = create_wake_pair().unwrap();

        assert_eq!(sender.send(b"!").unwrap(), 1);

        let mut buf = [0u8; 4];
        let mut received = None;
        for _ in 0..100 {
            match receiver.recv(&mut buf) {
                Ok(n) => {
                    received = Some(n);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(e) => panic!("recv failed: {}", e),
            }
        }
        assert_eq!(received, Some(1));
        assert_eq!(buf[0], b'!');
    }

    #[test]
    fn wake_pair_rejects_strangers() {
        let (_sender, receiver) = create_wake_pair().unwrap();
        let stranger = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();

        stranger.send_to(b"!", receiver.local_addr().unwrap()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut buf = [0u8; 4];
        let r = receiver.recv(&mut buf);
        assert!(matches!(r, Err(ref e) if e.kind() == io::ErrorKind::WouldBlock));
    }

    #[tokio::test]
    async fn multicast_listen_on_loopback() {
        // Some sandboxes have no multicast route at all; only check that a
        // failure is reported as an error instead of a panic.
        let addr = SocketAddrV4::new(Ipv4Addr::new(236, 6, 7, 9), 0);
        let _ = create_udp_multicast_listen(&addr, &Ipv4Addr::LOCALHOST);
    }
}
