use super::Emulator;
use byteorder::{LittleEndian, ReadBytesExt};

/// Upper bound for strings read out of emulator memory.
pub const MAX_STRING_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    /// Single-byte encoding used by the game's debug strings.
    Latin1,
}

/// Typed little-endian reads on top of [`Emulator::read_memory`].
pub trait MemoryExt {
    fn read_bytes(&self, address: u32, len: usize) -> anyhow::Result<Vec<u8>>;

    fn read_u8(&self, address: u32) -> anyhow::Result<u8> {
        Ok(self.read_bytes(address, 1)?[0])
    }

    fn read_u16(&self, address: u32) -> anyhow::Result<u16> {
        Ok(self.read_bytes(address, 2)?.as_slice().read_u16::<LittleEndian>()?)
    }

    fn read_i16(&self, address: u32) -> anyhow::Result<i16> {
        Ok(self.read_bytes(address, 2)?.as_slice().read_i16::<LittleEndian>()?)
    }

    fn read_u32(&self, address: u32) -> anyhow::Result<u32> {
        Ok(self.read_bytes(address, 4)?.as_slice().read_u32::<LittleEndian>()?)
    }

    fn read_i32(&self, address: u32) -> anyhow::Result<i32> {
        Ok(self.read_bytes(address, 4)?.as_slice().read_i32::<LittleEndian>()?)
    }

    /// NUL-terminated string, cut off after [`MAX_STRING_LEN`] bytes.
    fn read_string(&self, address: u32, encoding: StringEncoding) -> anyhow::Result<String> {
        let mut raw = Vec::new();
        let mut cursor = address;
        // Read in small chunks; strings may end right before unmapped memory.
        while raw.len() < MAX_STRING_LEN {
            let chunk = self.read_bytes(cursor, 16)?;
            match chunk.iter().position(|&b| b == 0) {
                Some(end) => {
                    raw.extend_from_slice(&chunk[..end]);
                    break;
                }
                None => raw.extend_from_slice(&chunk),
            }
            cursor = cursor.wrapping_add(16);
        }
        raw.truncate(MAX_STRING_LEN);
        Ok(decode(&raw, encoding))
    }
}

impl<E: Emulator + ?Sized> MemoryExt for E {
    fn read_bytes(&self, address: u32, len: usize) -> anyhow::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_memory(address, &mut buf)?;
        Ok(buf)
    }
}

pub fn decode(raw: &[u8], encoding: StringEncoding) -> String {
    match encoding {
        StringEncoding::Utf8 => String::from_utf8_lossy(raw).into_owned(),
        StringEncoding::Latin1 => raw.iter().map(|&b| b as char).collect(),
    }
}
