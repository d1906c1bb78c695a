//! Header prepended to every encoded frame.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::EncodeError;
use crate::EncodeResult;

/// Length of the encoded frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 17;

/// Kind of encoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Uncompressed pixels.
    Raw = 0,
    /// Full pixels that reset the reference.
    Key = 1,
    /// Run-length coded XOR against the reference.
    Delta = 2,
}

impl TryFrom<u8> for FrameKind {
    type Error = EncodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Key),
            2 => Ok(Self::Delta),
            other => Err(EncodeError::InvalidInput(format!(
                "unknown frame kind {other:#04x}"
            ))),
        }
    }
}

/// `kind u8 | width u32 | height u32 | frame_index u64`, big endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub width: u32,
    pub height: u32,
    pub frame_index: u64,
}

impl FrameHeader {
    /// Append the header to `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.width);
        buf.put_u32(self.height);
        buf.put_u64(self.frame_index);
    }

    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> EncodeResult<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(EncodeError::InvalidInput(format!(
                "encoded frame is {} bytes, shorter than its header",
                data.len()
            )));
        }

        let mut buf = &data[..FRAME_HEADER_LEN];
        let kind = FrameKind::try_from(buf.get_u8())?;
        Ok(Self {
            kind,
            width: buf.get_u32(),
            height: buf.get_u32(),
            frame_index: buf.get_u64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader {
            kind: FrameKind::Delta,
            width: 640,
            height: 480,
            frame_index: 7,
        };
        let mut buf = BytesMut::new();
        header.write(&mut buf);

        assert_eq!(buf.len(), FRAME_HEADER_LEN);
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..5], &640u32.to_be_bytes());
        assert_eq!(FrameHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_parse_rejects_short_and_unknown() {
        assert!(FrameHeader::parse(&[1, 2, 3]).is_err());

        let mut data = [0u8; FRAME_HEADER_LEN];
        data[0] = 9;
        assert!(matches!(
            FrameHeader::parse(&data),
            Err(EncodeError::InvalidInput(_))
        ));
    }
}
