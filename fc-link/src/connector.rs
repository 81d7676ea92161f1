use crate::{MavlinkLink, MspLink, ProtocolResult};

/// Opens protocol clients on one serial connection.
///
/// Only one client is alive at a time: the previous one is dropped (closing
/// the port) before the next is opened.
pub trait Connector {
    type Msp: MspLink;
    type Mavlink: MavlinkLink;

    /// Open the port and wrap it in an MSP client.
    fn open_msp(&mut self) -> ProtocolResult<Self::Msp>;

    /// Open the port and wrap it in a MAVLink client.
    fn open_mavlink(&mut self) -> ProtocolResult<Self::Mavlink>;
}
