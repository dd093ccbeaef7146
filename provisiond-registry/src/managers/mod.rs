//! Built-in accounting-only managers.
//!
//! Grounded on the original daemon's map-based provisioner/decommissioner
//! split per workload type
//! (`examples/original_source/pkg/primitives/provisioner.go`): one
//! small struct per workload type, registered into a fixed map at
//! construction. Each manager here only computes the declared
//! capacity and reports success; real backends replace these.

mod disk;
mod gateway;
mod log_stream;
mod network;
mod object_store;
mod public_ip;
mod vm;

use crate::Manager;
use provisiond_types::WorkloadType;
use std::collections::HashMap;
use std::sync::Arc;

pub fn builtin_registry() -> crate::Registry {
    let mut managers: HashMap<WorkloadType, Arc<dyn Manager>> = HashMap::new();
    managers.insert(WorkloadType::PersistentDisk, Arc::new(disk::DiskManager));
    managers.insert(WorkloadType::ContentFs, Arc::new(disk::DiskManager));
    managers.insert(WorkloadType::OverlayNetwork, Arc::new(network::NetworkManager));
    managers.insert(WorkloadType::PublicIpv4, Arc::new(public_ip::PublicIpManager));
    managers.insert(WorkloadType::PublicIp, Arc::new(public_ip::PublicIpManager));
    managers.insert(WorkloadType::VirtualMachine, Arc::new(vm::VmManager));
    managers.insert(WorkloadType::ObjectStoreNamespace, Arc::new(object_store::ObjectStoreManager));
    managers.insert(WorkloadType::NamedGateway, Arc::new(gateway::GatewayManager));
    managers.insert(WorkloadType::FqdnGateway, Arc::new(gateway::GatewayManager));
    managers.insert(WorkloadType::LogStream, Arc::new(log_stream::LogStreamManager));
    crate::Registry::new(managers)
}
