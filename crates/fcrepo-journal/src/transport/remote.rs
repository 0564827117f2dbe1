//! Journal stream to a remote `JournalReceiver` over TCP
//!
//! Each request is one frame answered by one reply frame. A connection is
//! made on `open_file` and dropped after an I/O error, so the next
//! `open_file` reconnects.

use super::frame::{Reply, Request, read_frame, write_frame};
use super::{Transport, TransportState, require_state};
use crate::entry::JournalEntry;
use crate::error::{TransportError, TransportResult};
use crate::xml::{entry_to_xml, format_timestamp};
use chrono::{DateTime, Utc};
use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, info, warn};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

pub struct RemoteTransport {
    name: String,
    address: SocketAddr,
    timeout: Duration,
    state: TransportState,
    connection: Option<Connection>,
}

impl RemoteTransport {
    #[must_use]
    pub const fn new(name: String, address: SocketAddr, timeout: Duration) -> Self {
        Self {
            name,
            address,
            timeout,
            state: TransportState::Closed,
            connection: None,
        }
    }

    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    fn connect(&mut self) -> TransportResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        let io = |e| TransportError::io(&self.name, e);
        let stream = TcpStream::connect_timeout(&self.address, self.timeout).map_err(io)?;
        stream.set_read_timeout(Some(self.timeout)).map_err(io)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(io)?;
        stream.set_nodelay(true).map_err(io)?;
        let reader = BufReader::new(stream.try_clone().map_err(io)?);
        self.connection = Some(Connection {
            reader,
            writer: BufWriter::new(stream),
        });
        info!("{}: connected to {}", self.name, self.address);
        Ok(())
    }

    /// Send one request and wait for its reply
    fn call(&mut self, request: &Request) -> TransportResult<()> {
        let Some(conn) = self.connection.as_mut() else {
            return Err(TransportError::protocol(&self.name, "not connected"));
        };

        let result = write_frame(&mut conn.writer, request)
            .and_then(|()| read_frame::<_, Reply>(&mut conn.reader));
        match result {
            Ok(Some(Reply::Ok)) => Ok(()),
            Ok(Some(Reply::Error(detail))) => Err(TransportError::Rejected {
                name: self.name.clone(),
                detail,
            }),
            Ok(None) => {
                self.connection = None;
                Err(TransportError::protocol(
                    &self.name,
                    "receiver closed the connection",
                ))
            }
            Err(e) => {
                warn!("{}: dropping connection to {}: {}", self.name, self.address, e);
                self.connection = None;
                Err(TransportError::io(&self.name, e))
            }
        }
    }
}

impl Transport for RemoteTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn open_file(
        &mut self,
        repository_hash: &str,
        filename: &str,
        timestamp: DateTime<Utc>,
    ) -> TransportResult<()> {
        require_state(&self.name, "open file", self.state, TransportState::Closed)?;
        self.connect()?;
        self.call(&Request::OpenFile {
            repository_hash: repository_hash.to_string(),
            filename: filename.to_string(),
            timestamp: format_timestamp(timestamp),
        })?;
        debug!("{}: opened {} remotely", self.name, filename);
        self.state = TransportState::Open;
        Ok(())
    }

    fn write_entry(&mut self, entry: &JournalEntry) -> TransportResult<()> {
        require_state(&self.name, "write entry", self.state, TransportState::Open)?;
        let xml = entry_to_xml(entry).map_err(|e| TransportError::Encode {
            name: self.name.clone(),
            detail: e.to_string(),
        })?;
        self.call(&Request::WriteEntry {
            sequence: entry.sequence(),
            xml,
        })
    }

    fn close_file(&mut self) -> TransportResult<()> {
        require_state(&self.name, "close file", self.state, TransportState::Open)?;
        self.state = TransportState::Closed;
        self.call(&Request::CloseFile)
    }

    fn shutdown(&mut self) -> TransportResult<()> {
        match self.state {
            TransportState::Open => self.close_file()?,
            TransportState::Closed => {}
            TransportState::ShutDown => {
                return require_state(&self.name, "shutdown", self.state, TransportState::Closed);
            }
        }
        self.state = TransportState::ShutDown;
        if self.connection.is_some() {
            let result = self.call(&Request::Shutdown);
            self.connection = None;
            result?;
        }
        Ok(())
    }
}
