//! Wire messages exchanged with the knitting-machine controller. Byte
//! layout is fixed by the controller firmware; this crate only
//! encodes/decodes it, with no notion of FSM state or line planning.

use thiserror::Error;

const REQ_INFO: u8 = 0x03;
const CNF_INFO: u8 = 0xC3;
const REQ_START: u8 = 0x01;
const CNF_START: u8 = 0xC1;
const REQ_LINE: u8 = 0x82;
const CNF_LINE: u8 = 0x42;
const IND_STATE: u8 = 0x84;
const CNF_TEST: u8 = 0xC4;

const FLAG_LAST_LINE: u8 = 1 << 0;
const FLAG_BLANK: u8 = 1 << 1;
const COLOR_SHIFT: u8 = 3;
const COLOR_MASK: u8 = 0b0011_1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown message id {0:#04x}")]
    UnknownMessageId(u8),
    #[error("message {id:#04x} truncated: expected at least {expected} bytes, got {got}")]
    Truncated { id: u8, expected: usize, got: usize },
}

/// Carriage type reported in `indState`. An unrecognized byte is kept as
/// `Unknown` rather than rejecting the whole message — `indState` also
/// carries hall-sensor data the progress sink wants regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarriageType {
    Knit,
    Lace,
    Garter,
    Unknown(u8),
}

impl CarriageType {
    fn from_byte(byte: u8) -> Self {
        match byte {
            1 => CarriageType::Knit,
            2 => CarriageType::Lace,
            3 => CarriageType::Garter,
            other => CarriageType::Unknown(other),
        }
    }
}

/// Messages the host sends to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    ReqInfo,
    ReqStart {
        knit_start_needle: u8,
        knit_stop_needle: u8,
        continuous_reporting: bool,
    },
    CnfLine {
        line_number: u8,
        frame: [u8; 25],
        last_line: bool,
        blank: bool,
        color: u8,
    },
}

impl HostMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            HostMessage::ReqInfo => vec![REQ_INFO],
            HostMessage::ReqStart {
                knit_start_needle,
                knit_stop_needle,
                continuous_reporting,
            } => vec![
                REQ_START,
                *knit_start_needle,
                *knit_stop_needle,
                *continuous_reporting as u8,
            ],
            HostMessage::CnfLine {
                line_number,
                frame,
                last_line,
                blank,
                color,
            } => {
                let mut out = Vec::with_capacity(1 + 1 + frame.len() + 1 + 1);
                out.push(CNF_LINE);
                out.push(*line_number);
                out.extend_from_slice(frame);
                let mut flags = 0u8;
                if *last_line {
                    flags |= FLAG_LAST_LINE;
                }
                if *blank {
                    flags |= FLAG_BLANK;
                }
                flags |= (*color << COLOR_SHIFT) & COLOR_MASK;
                out.push(flags);
                out.push(0x00); // CRC8 reserved for a future firmware revision
                out
            }
        }
    }
}

/// Messages the device sends to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    CnfInfo {
        api: u8,
        fw_major: u8,
        fw_minor: u8,
    },
    CnfStart {
        ok: bool,
    },
    ReqLine {
        line_number: u8,
    },
    IndState {
        ready: bool,
        hall_l: u16,
        hall_r: u16,
        carriage_type: CarriageType,
        carriage_pos: u8,
    },
    CnfTest {
        ok: bool,
    },
}

impl DeviceMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let id = *bytes.first().ok_or(ProtocolError::Empty)?;
        let payload = &bytes[1..];

        let require = |expected: usize| -> Result<(), ProtocolError> {
            if payload.len() < expected {
                Err(ProtocolError::Truncated {
                    id,
                    expected: expected + 1,
                    got: bytes.len(),
                })
            } else {
                Ok(())
            }
        };

        match id {
            CNF_INFO => {
                require(3)?;
                Ok(DeviceMessage::CnfInfo {
                    api: payload[0],
                    fw_major: payload[1],
                    fw_minor: payload[2],
                })
            }
            CNF_START => {
                require(1)?;
                Ok(DeviceMessage::CnfStart {
                    ok: payload[0] != 0,
                })
            }
            REQ_LINE => {
                require(1)?;
                Ok(DeviceMessage::ReqLine {
                    line_number: payload[0],
                })
            }
            IND_STATE => {
                require(7)?;
                Ok(DeviceMessage::IndState {
                    ready: payload[0] != 0,
                    hall_l: u16::from_be_bytes([payload[1], payload[2]]),
                    hall_r: u16::from_be_bytes([payload[3], payload[4]]),
                    carriage_type: CarriageType::from_byte(payload[5]),
                    carriage_pos: payload[6],
                })
            }
            CNF_TEST => {
                require(1)?;
                Ok(DeviceMessage::CnfTest {
                    ok: payload[0] != 0,
                })
            }
            other => Err(ProtocolError::UnknownMessageId(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_info_is_one_byte() {
        assert_eq!(HostMessage::ReqInfo.encode(), vec![REQ_INFO]);
    }

    #[test]
    fn req_start_encodes_continuous_reporting_as_one_byte() {
        let bytes = HostMessage::ReqStart {
            knit_start_needle: 10,
            knit_stop_needle: 190,
            continuous_reporting: true,
        }
        .encode();
        assert_eq!(bytes, vec![REQ_START, 10, 190, 1]);
    }

    #[test]
    fn cnf_line_packs_flags_and_reserves_crc8() {
        let frame = [0xAAu8; 25];
        let bytes = HostMessage::CnfLine {
            line_number: 42,
            frame,
            last_line: true,
            blank: false,
            color: 3,
        }
        .encode();
        assert_eq!(bytes.len(), 1 + 1 + 25 + 1 + 1);
        assert_eq!(bytes[0], CNF_LINE);
        assert_eq!(bytes[1], 42);
        assert_eq!(&bytes[2..27], &frame[..]);
        let flags = bytes[27];
        assert_eq!(flags & FLAG_LAST_LINE, FLAG_LAST_LINE);
        assert_eq!(flags & FLAG_BLANK, 0);
        assert_eq!((flags & COLOR_MASK) >> COLOR_SHIFT, 3);
        assert_eq!(bytes[28], 0x00);
    }

    #[test]
    fn cnf_info_parses_api_and_firmware_version() {
        let msg = DeviceMessage::parse(&[CNF_INFO, 5, 1, 2]).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::CnfInfo {
                api: 5,
                fw_major: 1,
                fw_minor: 2
            }
        );
    }

    #[test]
    fn ind_state_parses_big_endian_hall_sensors() {
        let msg = DeviceMessage::parse(&[IND_STATE, 1, 0x01, 0x02, 0x03, 0x04, 1, 77]).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::IndState {
                ready: true,
                hall_l: 0x0102,
                hall_r: 0x0304,
                carriage_type: CarriageType::Knit,
                carriage_pos: 77,
            }
        );
    }

    #[test]
    fn unknown_carriage_type_byte_is_kept_not_rejected() {
        let msg = DeviceMessage::parse(&[IND_STATE, 0, 0, 0, 0, 0, 9, 0]).unwrap();
        assert!(matches!(
            msg,
            DeviceMessage::IndState {
                carriage_type: CarriageType::Unknown(9),
                ..
            }
        ));
    }

    #[test]
    fn truncated_message_is_an_error_not_a_panic() {
        let err = DeviceMessage::parse(&[CNF_INFO, 5]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { id, .. } if id == CNF_INFO));
    }

    #[test]
    fn empty_buffer_is_an_error() {
        assert_eq!(DeviceMessage::parse(&[]).unwrap_err(), ProtocolError::Empty);
    }

    #[test]
    fn unknown_message_id_is_an_error() {
        assert_eq!(
            DeviceMessage::parse(&[0xFF]).unwrap_err(),
            ProtocolError::UnknownMessageId(0xFF)
        );
    }

    #[test]
    fn req_line_roundtrips_through_8bit_wraparound() {
        // reqLine(255) then reqLine(0) — the byte itself just wraps,
        // block accounting is the FSM's job, not the wire layer's.
        let first = DeviceMessage::parse(&[REQ_LINE, 255]).unwrap();
        let second = DeviceMessage::parse(&[REQ_LINE, 0]).unwrap();
        assert_eq!(first, DeviceMessage::ReqLine { line_number: 255 });
        assert_eq!(second, DeviceMessage::ReqLine { line_number: 0 });
    }

    #[test]
    fn wrong_api_is_parsed_not_rejected_at_wire_layer() {
        // The wire layer has no notion of "wrong" — api==4 decodes
        // cleanly, it's the FSM's job to reject it against the expected 5.
        let msg = DeviceMessage::parse(&[CNF_INFO, 4, 0, 9]).unwrap();
        assert_eq!(
            msg,
            DeviceMessage::CnfInfo {
                api: 4,
                fw_major: 0,
                fw_minor: 9
            }
        );
    }
}
