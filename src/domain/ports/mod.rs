mod disk_store_port;
mod transport_port;

pub use disk_store_port::DiskStorePort;
pub use transport_port::TransportPort;

#[cfg(test)]
pub use transport_port::MockTransportPort;
