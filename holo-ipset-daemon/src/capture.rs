//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::time::Duration;

use bytes::{Buf, Bytes};
use holo_ipset::packet::{NLMSG_HDR_SIZE, nlmsg_align};
use nix::sys::socket::{self, LinkAddr, SockaddrLike};
use socket2::{Domain, Protocol, Socket, Type};

use crate::capabilities;
use crate::error::IoError;

// Large enough for any netlink frame seen on an nlmon link.
const RECV_BUF_SIZE: usize = 65536;

// Raw packet socket receiving the frames mirrored to an nlmon link.
#[derive(Debug)]
pub struct CaptureSocket {
    socket: Socket,
    ifindex: u32,
    buf: Vec<u8>,
}

// ===== impl CaptureSocket =====

impl CaptureSocket {
    pub(crate) fn open(
        ifindex: u32,
        read_timeout: Duration,
    ) -> Result<CaptureSocket, IoError> {
        // Create raw socket.
        let protocol = (libc::ETH_P_ALL as u16).to_be();
        let socket = capabilities::raise(|| {
            let socket = Socket::new(
                Domain::PACKET,
                Type::RAW,
                Some(Protocol::from(i32::from(protocol))),
            )?;

            // Bind to the nlmon link.
            let sockaddr = link_addr(libc::ETH_P_ALL as u16, ifindex)?;
            socket::bind(socket.as_raw_fd(), &sockaddr)?;

            Ok::<_, std::io::Error>(socket)
        })
        .map_err(IoError::CaptureSocketError)?;
        socket
            .set_read_timeout(Some(read_timeout))
            .map_err(IoError::CaptureSocketError)?;

        Ok(CaptureSocket {
            socket,
            ifindex,
            buf: vec![0; RECV_BUF_SIZE],
        })
    }

    // Receives a batch of netlink messages.
    //
    // Waits up to the read timeout for the first frame, then collects the
    // frames already queued without blocking. At most `batch_size` frames
    // are read. An empty batch means the read timed out.
    pub(crate) fn recv_batch(
        &mut self,
        batch_size: usize,
    ) -> Result<Vec<Bytes>, IoError> {
        let mut batch = vec![];
        let mut draining = false;

        let mut result = Ok(());
        for _ in 0..batch_size {
            match self.recv_frame() {
                Ok(frame) => {
                    if let Some(frame) = frame {
                        split_frame(frame, &mut batch);
                    }
                    if !draining {
                        draining = true;
                        result = self.socket.set_nonblocking(true);
                        if result.is_err() {
                            break;
                        }
                    }
                }
                Err(error)
                    if matches!(
                        error.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut
                    ) =>
                {
                    break;
                }
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        if draining && let Err(error) = self.socket.set_nonblocking(false) {
            result = Err(error);
        }

        result.map(|_| batch).map_err(IoError::CaptureRecvError)
    }

    // Receives a single frame, filtering out frames that weren't captured
    // on the nlmon link.
    fn recv_frame(&mut self) -> std::io::Result<Option<Bytes>> {
        let (len, addr) = socket::recvfrom::<LinkAddr>(
            self.socket.as_raw_fd(),
            &mut self.buf,
        )?;
        match addr {
            Some(addr) if addr.ifindex() == self.ifindex as usize => {
                Ok(Some(Bytes::copy_from_slice(&self.buf[..len])))
            }
            _ => Ok(None),
        }
    }
}

// ===== helper functions =====

// Packet socket address of the given interface. The protocol is given in host
// byte order.
#[allow(unsafe_code)]
fn link_addr(protocol: u16, ifindex: u32) -> std::io::Result<LinkAddr> {
    let sll = libc::sockaddr_ll {
        sll_family: libc::AF_PACKET as u16,
        sll_protocol: protocol.to_be(),
        sll_ifindex: ifindex as i32,
        sll_hatype: 0,
        sll_pkttype: 0,
        sll_halen: 0,
        sll_addr: [0; 8],
    };
    let len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

    // SAFETY: `sll` is a fully initialized `sockaddr_ll` of the given length
    // with the AF_PACKET family set.
    unsafe {
        LinkAddr::from_raw(
            &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
            Some(len),
        )
    }
    .ok_or_else(|| std::io::Error::from(ErrorKind::InvalidInput))
}

// Splits a captured frame into the netlink messages it carries.
//
// A malformed remainder is kept as a message of its own so that it's
// accounted for by the pipeline.
fn split_frame(frame: Bytes, batch: &mut Vec<Bytes>) {
    let mut offset = 0;
    while frame.len() - offset >= NLMSG_HDR_SIZE {
        let length = (&frame[offset..]).get_u32_ne() as usize;
        if length < NLMSG_HDR_SIZE || length > frame.len() - offset {
            break;
        }
        batch.push(frame.slice(offset..offset + length));
        offset = (offset + nlmsg_align(length)).min(frame.len());
    }
    if offset < frame.len() {
        batch.push(frame.slice(offset..));
    }
}

// ===== unit tests =====
