//! Bulk OUT endpoint resolution

use common::{BulkOutTarget, EndpointDirection, InterfaceInfo};

/// Find where printer payloads go
///
/// Picks the first interface that has any bulk endpoint, then the first bulk
/// OUT endpoint inside that interface. Later interfaces are never consulted,
/// so a first bulk interface with only IN endpoints yields `None`.
pub fn resolve_bulk_out(interfaces: &[InterfaceInfo]) -> Option<BulkOutTarget> {
    let interface = interfaces
        .iter()
        .find(|interface| interface.endpoints.iter().any(|ep| ep.is_bulk()))?;

    interface
        .endpoints
        .iter()
        .find(|ep| ep.is_bulk() && ep.direction == EndpointDirection::Out)
        .map(|ep| BulkOutTarget {
            interface_number: interface.number,
            endpoint_address: ep.address,
        })
}
