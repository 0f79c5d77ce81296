//! Data-carrier locking scripts
//!
//! Script format: `OP_FALSE OP_RETURN <push payload>`. The push uses the
//! smallest prefix that can express the payload length:
//!
//! | Length            | Prefix                     |
//! |-------------------|----------------------------|
//! | 0..=75            | `len` (1 byte)             |
//! | 76..=255          | `OP_PUSHDATA1 len:u8`      |
//! | 256..=65535       | `OP_PUSHDATA2 len:u16 LE`  |
//! | 65536..           | `OP_PUSHDATA4 len:u32 LE`  |

use crate::ScriptError;

pub const OP_FALSE: u8 = 0x00;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Largest length a direct push opcode can carry
pub const MAX_DIRECT_PUSH: usize = 0x4b;

/// Largest payload this protocol will embed in a single output
pub const MAX_DATA_CARRIER_PAYLOAD: usize = 1_000_000;

/// Length-class of a push operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushLength {
    Direct(u8),
    PushData1(u8),
    PushData2(u16),
    PushData4(u32),
}

impl PushLength {
    /// Minimal push form for `len` bytes.
    pub fn for_len(len: usize) -> Option<Self> {
        if len <= MAX_DIRECT_PUSH {
            Some(Self::Direct(len as u8))
        } else if let Ok(n) = u8::try_from(len) {
            Some(Self::PushData1(n))
        } else if let Ok(n) = u16::try_from(len) {
            Some(Self::PushData2(n))
        } else {
            u32::try_from(len).ok().map(Self::PushData4)
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            Self::Direct(n) | Self::PushData1(n) => n as usize,
            Self::PushData2(n) => n as usize,
            Self::PushData4(n) => n as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes taken by the opcode plus length field
    pub fn prefix_len(&self) -> usize {
        match self {
            Self::Direct(_) => 1,
            Self::PushData1(_) => 2,
            Self::PushData2(_) => 3,
            Self::PushData4(_) => 5,
        }
    }

    fn write_prefix(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Direct(n) => out.push(n),
            Self::PushData1(n) => {
                out.push(OP_PUSHDATA1);
                out.push(n);
            }
            Self::PushData2(n) => {
                out.push(OP_PUSHDATA2);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Self::PushData4(n) => {
                out.push(OP_PUSHDATA4);
                out.extend_from_slice(&n.to_le_bytes());
            }
        }
    }

    /// Read a push prefix from the start of `bytes`.
    fn read(bytes: &[u8]) -> Result<Self, ScriptError> {
        let (&opcode, rest) = bytes.split_first().ok_or(ScriptError::Truncated {
            needed: 1,
            available: 0,
        })?;

        let field = |width: usize| -> Result<&[u8], ScriptError> {
            rest.get(..width).ok_or(ScriptError::Truncated {
                needed: width,
                available: rest.len(),
            })
        };

        match opcode {
            n if n as usize <= MAX_DIRECT_PUSH => Ok(Self::Direct(n)),
            OP_PUSHDATA1 => Ok(Self::PushData1(field(1)?[0])),
            OP_PUSHDATA2 => {
                let b = field(2)?;
                Ok(Self::PushData2(u16::from_le_bytes([b[0], b[1]])))
            }
            OP_PUSHDATA4 => {
                let b = field(4)?;
                Ok(Self::PushData4(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            }
            other => Err(ScriptError::UnsupportedPushOpcode(other)),
        }
    }
}

/// Build `OP_FALSE OP_RETURN <push payload>`.
pub fn build_data_carrier_script(payload: &[u8]) -> Result<Vec<u8>, ScriptError> {
    if payload.len() > MAX_DATA_CARRIER_PAYLOAD {
        return Err(ScriptError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_DATA_CARRIER_PAYLOAD,
        });
    }
    let push = PushLength::for_len(payload.len()).ok_or(ScriptError::PayloadTooLarge {
        len: payload.len(),
        max: MAX_DATA_CARRIER_PAYLOAD,
    })?;

    let mut script = Vec::with_capacity(2 + push.prefix_len() + payload.len());
    script.push(OP_FALSE);
    script.push(OP_RETURN);
    push.write_prefix(&mut script);
    script.extend_from_slice(payload);
    Ok(script)
}

/// Recover the pushed payload from a data-carrier script.
///
/// Accepts `OP_FALSE OP_RETURN <push>` and bare `OP_RETURN <push>`. Exactly
/// the declared number of bytes is returned; anything after them is ignored.
pub fn decode_data_carrier_script(script: &[u8]) -> Result<&[u8], ScriptError> {
    let rest = script.strip_prefix(&[OP_FALSE]).unwrap_or(script);
    let rest = rest.strip_prefix(&[OP_RETURN]).ok_or(ScriptError::NotDataCarrier)?;

    let push = PushLength::read(rest)?;
    let body = &rest[push.prefix_len()..];
    body.get(..push.len()).ok_or(ScriptError::Truncated {
        needed: push.len(),
        available: body.len(),
    })
}

/// True when the script starts with the `OP_FALSE OP_RETURN` marker pair.
pub fn has_data_carrier_marker(script: &[u8]) -> bool {
    script.starts_with(&[OP_FALSE, OP_RETURN])
}
