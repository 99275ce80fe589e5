pub mod connection;

pub use connection::{Connection, ConnectionInfo, PacketSender};
