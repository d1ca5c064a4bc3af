pub mod handshake;
pub mod replica_table;
pub mod snapshot;

pub use replica_table::ReplicaTable;
