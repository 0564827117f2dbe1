//! fcrepo Journal - Management operation journaling and replication
//!
//! Every committed management call is recorded as a `JournalEntry` together
//! with the `Context` it ran under, and replicated to followers:
//! - Journal XML writer and reader, with an enciphered context password
//! - Transports (local directory, in-memory, TCP to a `JournalReceiver`)
//! - `MulticastJournalWriter`, fanning requests out to every transport
//! - `JournalCreator`, running calls through a delegate and journaling them
//! - `JournalRecovery`, replaying archived journal files in order

pub mod ack;
pub mod cipher;
pub mod context;
pub mod creator;
pub mod delegate;
pub mod entry;
pub mod error;
pub mod multicast;
pub mod receiver;
pub mod recovery;
pub mod transport;
pub mod xml;

// Re-exports
pub use ack::{Acknowledgment, AcknowledgmentLog};
pub use context::{AttributeMap, Context, JournalEntryContext, MultiValueMap};
pub use creator::JournalCreator;
pub use delegate::{ManagementDelegate, StorageDelegate};
pub use entry::{Argument, JournalEntry, ManagementMethod};
pub use error::{JournalError, JournalResult, TransportError, TransportResult};
pub use multicast::{JournalFileOptions, MulticastJournalWriter};
pub use receiver::{JournalReceiver, ReceiveStats};
pub use recovery::{JournalRecovery, ReplayStats, journal_files};
pub use transport::{
    LocalDirectoryTransport, MemoryTransport, RemoteTransport, Transport, TransportRequest,
    TransportState,
};
pub use xml::{JournalFileReader, JournalHeader};
