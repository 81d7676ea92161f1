use fc_link::{MavlinkLink, MspLink};

use crate::{
    ArduPilotBoard, FirmwareInterface, FirmwareResult, FirmwareTarget, InavBoard, RawOffsetScale,
    SensorChannel,
};

/// A detected flight controller. The set of supported firmware families is
/// closed, so dispatch is a plain match rather than a trait object.
pub enum Board<M: MavlinkLink, P: MspLink> {
    ArduPilot(ArduPilotBoard<M>),
    Inav(InavBoard<P>),
}

impl<M: MavlinkLink, P: MspLink> std::fmt::Debug for Board<M, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Board::ArduPilot(_) => f.write_str("Board::ArduPilot(..)"),
            Board::Inav(_) => f.write_str("Board::Inav(..)"),
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $board:ident => $call:expr) => {
        match $self {
            Board::ArduPilot($board) => $call,
            Board::Inav($board) => $call,
        }
    };
}

impl<M: MavlinkLink, P: MspLink> FirmwareInterface for Board<M, P> {
    fn target(&self) -> FirmwareTarget {
        dispatch!(self, b => b.target())
    }

    fn is_channel_enabled(&mut self, channel: SensorChannel) -> FirmwareResult<bool> {
        dispatch!(self, b => b.is_channel_enabled(channel))
    }

    fn enable_channel(&mut self, channel: SensorChannel) -> FirmwareResult<()> {
        dispatch!(self, b => b.enable_channel(channel))
    }

    fn needs_reboot(&self) -> bool {
        dispatch!(self, b => b.needs_reboot())
    }

    fn reboot(&mut self) -> FirmwareResult<()> {
        dispatch!(self, b => b.reboot())
    }

    fn prepare_calibration(&mut self, channel: SensorChannel) -> FirmwareResult<()> {
        dispatch!(self, b => b.prepare_calibration(channel))
    }

    fn sample_raw(&mut self, channel: SensorChannel) -> FirmwareResult<f64> {
        dispatch!(self, b => b.sample_raw(channel))
    }

    fn offset_and_scale(&mut self, channel: SensorChannel) -> FirmwareResult<RawOffsetScale> {
        dispatch!(self, b => b.offset_and_scale(channel))
    }

    fn set_offset_and_scale(
        &mut self,
        channel: SensorChannel,
        values: RawOffsetScale,
    ) -> FirmwareResult<()> {
        dispatch!(self, b => b.set_offset_and_scale(channel, values))
    }

    fn measurement_scale(&self, channel: SensorChannel) -> f64 {
        dispatch!(self, b => b.measurement_scale(channel))
    }

    fn persist(&mut self) -> FirmwareResult<()> {
        dispatch!(self, b => b.persist())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_link::mock::{MockMavlink, MockMsp};
    use fc_link::variant;

    type MockBoard = Board<MockMavlink, MockMsp>;

    #[test]
    fn test_dispatch_target() {
        let ardu: MockBoard = Board::ArduPilot(ArduPilotBoard::new(MockMavlink::new()));
        let inav: MockBoard = Board::Inav(InavBoard::new(MockMsp::new(variant::INAV)));

        assert_eq!(ardu.target(), FirmwareTarget::ArduPilot);
        assert_eq!(inav.target(), FirmwareTarget::Inav);
    }

    #[test]
    fn test_dispatch_measurement_scale() {
        let ardu: MockBoard = Board::ArduPilot(ArduPilotBoard::new(MockMavlink::new()));
        let inav: MockBoard = Board::Inav(InavBoard::new(MockMsp::new(variant::INAV)));

        assert_eq!(ardu.measurement_scale(SensorChannel::Current), 100.0);
        assert_eq!(inav.measurement_scale(SensorChannel::Voltage), 1100.0);
    }
}
