use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Address used only to make the OS pick an outbound interface. No packet
/// is sent to it.
const PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// Best guess at the address other machines on the LAN can reach this host
/// at, for showing to players who want to join.
///
/// Falls back to loopback when the machine has no route out.
pub fn lan_address() -> IpAddr {
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn probe() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(PROBE)?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(std::io::ErrorKind::AddrNotAvailable.into());
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lan_address_is_never_unspecified() {
        assert!(!lan_address().is_unspecified());
    }
}
