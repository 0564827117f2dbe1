//! Receiving end of `RemoteTransport`
//!
//! Writes the received journal stream into a directory through a
//! `LocalDirectoryTransport`, so a follower's journal directory has the same
//! layout as the leader's and can be replayed with `JournalRecovery`.
//! Connections are served one at a time.

use crate::error::{JournalError, JournalResult};
use crate::transport::frame::{Reply, Request, read_frame, write_frame};
use crate::transport::{LocalDirectoryTransport, Transport, TransportState};
use crate::xml::{parse_timestamp, read_entry};
use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What one connection delivered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    pub files: usize,
    pub entries: u64,
    pub last_sequence: Option<u64>,
}

pub struct JournalReceiver {
    listener: TcpListener,
    directory: PathBuf,
}

impl JournalReceiver {
    pub fn bind(address: impl ToSocketAddrs, directory: impl Into<PathBuf>) -> JournalResult<Self> {
        let listener = TcpListener::bind(address)?;
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        info!(
            "journal receiver listening on {} into {}",
            listener.local_addr()?,
            directory.display()
        );
        Ok(Self {
            listener,
            directory,
        })
    }

    pub fn local_addr(&self) -> JournalResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Serve connections until the listener fails
    pub fn serve(&self) -> JournalResult<()> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            match self.handle(stream, peer) {
                Ok(stats) => info!(
                    "{}: connection finished, {} files, {} entries",
                    peer, stats.files, stats.entries
                ),
                Err(e) => error!("{}: connection failed: {}", peer, e),
            }
        }
    }

    /// Serve exactly one connection
    pub fn accept_one(&self) -> JournalResult<ReceiveStats> {
        let (stream, peer) = self.listener.accept()?;
        self.handle(stream, peer)
    }

    fn handle(&self, stream: TcpStream, peer: SocketAddr) -> JournalResult<ReceiveStats> {
        stream.set_nodelay(true)?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);
        let mut transport =
            LocalDirectoryTransport::new(format!("receiver:{peer}"), &self.directory)?;
        let mut stats = ReceiveStats::default();

        info!("{}: journal stream connected", peer);
        while let Some(request) = read_frame::<_, Request>(&mut reader)? {
            let done = request == Request::Shutdown;
            let reply = match apply(&mut transport, request, &mut stats) {
                Ok(()) => Reply::Ok,
                Err(e) => {
                    warn!("{}: rejecting request: {}", peer, e);
                    Reply::Error(e.to_string())
                }
            };
            write_frame(&mut writer, &reply)?;
            if done {
                return Ok(stats);
            }
        }

        if transport.state() == TransportState::Open {
            warn!(
                "{}: connection closed with a journal file still open; it stays incomplete",
                peer
            );
        }
        Ok(stats)
    }
}

fn apply(
    transport: &mut LocalDirectoryTransport,
    request: Request,
    stats: &mut ReceiveStats,
) -> JournalResult<()> {
    match request {
        Request::OpenFile {
            repository_hash,
            filename,
            timestamp,
        } => {
            let timestamp = parse_timestamp(&timestamp)?;
            transport.open_file(&repository_hash, &filename, timestamp)?;
            stats.files += 1;
        }
        Request::WriteEntry { sequence, xml } => {
            let entry = read_entry(&xml)?;
            if entry.sequence() != sequence {
                return Err(JournalError::malformed(format!(
                    "frame says entry {sequence}, XML says {}",
                    entry.sequence()
                )));
            }
            if let Some(last) = stats.last_sequence
                && sequence <= last
            {
                return Err(JournalError::OutOfOrder {
                    previous: last,
                    found: sequence,
                    file: PathBuf::new(),
                });
            }
            transport.write_entry(&entry)?;
            stats.entries += 1;
            stats.last_sequence = Some(sequence);
            debug!("received entry {}", sequence);
        }
        Request::CloseFile => transport.close_file()?,
        Request::Shutdown => transport.shutdown()?,
    }
    Ok(())
}
