pub mod compression;
pub mod deserialise;
pub mod octets;
pub mod serialise;
pub mod types;
