// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded UDP receive loop.
//!
//! Reads one datagram at a time from an already-bound socket into a
//! reusable buffer of exactly `max_datagram_bytes`. On Linux the recv uses
//! `MSG_TRUNC`, which makes the kernel report the true packet length; a
//! datagram larger than the buffer is dropped and counted instead of being
//! silently clipped. Platforms without that reporting deliver oversized
//! datagrams truncated, and no detection is attempted.
//!
//! The loop borrows a file descriptor owned by the host: it never closes
//! it, and socket binding lives with the host as well.

use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::RawFd;

use serde::Serialize;

use crate::config::RecvConfig;
use crate::source_limiter::SourceKey;

/// One received datagram and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub source: SourceKey,
}

/// Result of a single receive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvOutcome {
    /// A datagram within the size cap was received.
    Ok(Datagram),
    /// The kernel reported a datagram larger than the cap; it was dropped.
    Truncated,
    /// No data available on a non-blocking socket.
    WouldBlock,
    /// Any other system error, with the OS error code.
    Error(i32),
}

/// Monotonic receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecvStats {
    pub received: u64,
    pub truncated: u64,
    pub errors: u64,
}

/// Receiver over a borrowed, already-bound UDP socket.
pub struct RecvLoop {
    fd: RawFd,
    config: RecvConfig,
    /// Reusable receive buffer, exactly `max_datagram_bytes` long.
    buffer: Vec<u8>,
    stats: RecvStats,
}

impl RecvLoop {
    /// Wraps an already-bound UDP socket. The fd stays owned by the caller
    /// and is not closed on drop.
    pub fn new(fd: RawFd, config: RecvConfig) -> Self {
        Self {
            fd,
            buffer: vec![0u8; config.max_datagram_bytes],
            config,
            stats: RecvStats::default(),
        }
    }

    /// Applies kernel socket options: the receive buffer hint, and (on
    /// Linux) path-MTU discovery so fragmented datagrams are refused.
    ///
    /// The MTU option is advisory; only the buffer sizing failure is fatal.
    pub fn configure_socket(&self) -> std::io::Result<()> {
        let bufsize = self.config.recv_buffer_bytes as libc::c_int;
        // SAFETY: fd is a live socket owned by the host; the option value
        // points at a local of the advertised length.
        let rc = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &bufsize as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }

        #[cfg(target_os = "linux")]
        {
            let pmtu = libc::IP_PMTUDISC_DO;
            // SAFETY: same as above.
            unsafe {
                libc::setsockopt(
                    self.fd,
                    libc::IPPROTO_IP,
                    libc::IP_MTU_DISCOVER,
                    &pmtu as *const libc::c_int as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                );
            }
        }

        Ok(())
    }

    /// Receives a single datagram.
    ///
    /// Blocks unless the socket is non-blocking, in which case an empty
    /// queue yields [`RecvOutcome::WouldBlock`].
    pub fn recv_one(&mut self) -> RecvOutcome {
        let mut src_addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

        // MSG_TRUNC (Linux) returns the real packet size even when it
        // exceeds the buffer, which is how oversized datagrams are caught.
        // SAFETY: buffer and sockaddr storage outlive the call and their
        // lengths are passed alongside.
        let n = unsafe {
            libc::recvfrom(
                self.fd,
                self.buffer.as_mut_ptr() as *mut libc::c_void,
                self.buffer.len(),
                libc::MSG_TRUNC,
                &mut src_addr as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut addr_len,
            )
        };

        if n < 0 {
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EIO);
            if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
                return RecvOutcome::WouldBlock;
            }
            self.stats.errors += 1;
            return RecvOutcome::Error(errno);
        }

        let n = n as usize;
        if n > self.buffer.len() {
            self.stats.truncated += 1;
            return RecvOutcome::Truncated;
        }

        let source = SourceKey::new(
            Ipv4Addr::from(u32::from_be(src_addr.sin_addr.s_addr)),
            u16::from_be(src_addr.sin_port),
        );

        self.stats.received += 1;
        RecvOutcome::Ok(Datagram {
            data: self.buffer[..n].to_vec(),
            source,
        })
    }

    pub fn stats(&self) -> RecvStats {
        self.stats
    }

    pub fn max_datagram_bytes(&self) -> usize {
        self.config.max_datagram_bytes
    }
}

impl std::fmt::Debug for RecvLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecvLoop")
            .field("fd", &self.fd)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
