//! ASCII line protocol: request parsing, reply encoding, and the optional
//! checksum envelope prefix.
//!
//! Commands are fixed width: `set <key> <val>`, `get <key>`, `del <key>`,
//! `quit`, each terminated by a newline. A request may carry a
//! `<u32-decimal>#` prefix computed by the sender; this deployment parses
//! and discards it (verification belongs to a different build variant's wire
//! format).

use thiserror::Error;

use crate::types::{Key, RetCode, Val, KEY_LEN, VAL_LEN};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command")]
    UnknownCommand,

    #[error("truncated command")]
    Truncated,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    Get { key: Key },
    Set { key: Key, val: Val },
    Del { key: Key },
    Quit,
}

/// Strip a `<digits>#` envelope prefix if present, returning the payload and
/// the parsed checksum. Anything that does not fully match the prefix
/// grammar is treated as payload.
pub fn strip_crc_prefix(packet: &[u8]) -> (&[u8], Option<u32>) {
    if packet.first().is_none_or(|b| !b.is_ascii_digit()) {
        return (packet, None);
    }
    let Some(hash) = packet.iter().position(|&b| b == b'#') else {
        return (packet, None);
    };
    let mut crc = 0u64;
    for &b in &packet[..hash] {
        if !b.is_ascii_digit() {
            return (packet, None);
        }
        crc = crc * 10 + (b - b'0') as u64;
        if crc > u32::MAX as u64 {
            return (packet, None);
        }
    }
    (&packet[hash + 1..], Some(crc as u32))
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], ProtocolError> {
    bytes.try_into().map_err(|_| ProtocolError::Truncated)
}

pub fn parse_request(line: &[u8]) -> Result<Request, ProtocolError> {
    let line = trim_line(line);
    if line == b"quit" {
        return Ok(Request::Quit);
    }
    if let Some(rest) = line.strip_prefix(b"set ") {
        if rest.len() != KEY_LEN + 1 + VAL_LEN || rest[KEY_LEN] != b' ' {
            return Err(ProtocolError::Truncated);
        }
        return Ok(Request::Set {
            key: Key(fixed(&rest[..KEY_LEN])?),
            val: Val(fixed(&rest[KEY_LEN + 1..])?),
        });
    }
    if let Some(rest) = line.strip_prefix(b"get ") {
        return Ok(Request::Get {
            key: Key(fixed(rest)?),
        });
    }
    if let Some(rest) = line.strip_prefix(b"del ") {
        return Ok(Request::Del {
            key: Key(fixed(rest)?),
        });
    }
    Err(ProtocolError::UnknownCommand)
}

pub const CRLF: &[u8] = b"\r\n";

pub fn ret_text(code: RetCode) -> &'static [u8] {
    match code {
        RetCode::Error => b"ERROR\r\n",
        RetCode::Deleted => b"DELETED\r\n",
        RetCode::NotFound => b"NOT_FOUND\r\n",
        RetCode::Stored => b"STORED\r\n",
        RetCode::Created => b"CREATED\r\n",
        RetCode::End => b"END\r\n",
        RetCode::Value => b"VALUE ",
    }
}

pub fn encode_value_reply(out: &mut Vec<u8>, val: &Val) {
    out.extend_from_slice(ret_text(RetCode::Value));
    out.extend_from_slice(&val.0);
    out.extend_from_slice(CRLF);
}
