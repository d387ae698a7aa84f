//! Transaction batching: accumulating a client's object mutations into
//! ordered, replayable records and serializing them into one outbound batch.
//!
//! A batch is written by exactly one owning worker; the buffer types here
//! rely on that for the new-object flag flip and assert it in debug builds
//! rather than taking a lock.

mod batch;
mod buffer;
mod reader;
mod record;


pub use batch::ClientTransactionBatch;
pub use batch::TxnWriter;
pub use buffer::TransactionBuffer;
pub use reader::read_batch;
pub use reader::ParsedBatch;
pub use reader::ParsedChange;
pub use reader::ParsedTransaction;
pub use record::ManagedObject;
pub use record::TransactionRecord;
