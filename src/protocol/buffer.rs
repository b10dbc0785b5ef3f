use anyhow::{anyhow, ensure, Result};
use bytes::{Buf, BufMut, Bytes};
use uuid::Uuid;

use crate::error::ProtocolError;

pub const MAX_VARINT_LENGTH: usize = 5;

pub trait BufExt: Buf {
    fn get_varint(&mut self) -> Result<i32> {
        let mut i = 0;

        for j in 0..MAX_VARINT_LENGTH {
            let b = self.try_get_u8()?;
            i |= ((b & 0x7F) as i32) << (j * 7);

            if (b & 0x80) != 128 {
                return Ok(i);
            }
        }

        Err(ProtocolError::VarintTooLong.into())
    }

    fn get_bool(&mut self) -> Result<bool> {
        match self.try_get_u8()? {
            0x00 => Ok(false),
            0x01 => Ok(true),
            byte => Err(anyhow!("Could not get bool value from byte: {}", byte)),
        }
    }

    /// Reads a string of at most `cap` characters.
    fn get_string(&mut self, cap: usize) -> Result<String> {
        let len = self.get_varint()?;

        ensure!(len >= 0, "String length is negative");
        let len = len as usize;
        ensure!(len <= 4 * cap, "String is too long");
        ensure!(len <= self.remaining(), "String length exceeds packet");

        let bytes = self.copy_to_bytes(len);
        let string = String::from_utf8(bytes.to_vec())?;
        ensure!(string.chars().count() <= cap, "String is too long");
        Ok(string)
    }

    fn get_identifier(&mut self) -> Result<String> {
        self.get_string(32767)
    }

    fn get_uuid(&mut self) -> Result<Uuid> {
        let mut bytes = [0; 16];
        self.try_copy_to_slice(&mut bytes)?;
        Ok(Uuid::from_bytes(bytes))
    }

    /// Hyphenated text form used by the login success packet before 1.16.
    fn get_uuid_str(&mut self) -> Result<Uuid> {
        Ok(Uuid::parse_str(&self.get_string(36)?)?)
    }

    fn get_byte_array(&mut self) -> Result<Bytes> {
        let len = self.get_varint()?;
        ensure!(len >= 0, "Byte array length is negative");
        let len = len as usize;
        ensure!(len <= self.remaining(), "Invalid byte array length");
        Ok(self.copy_to_bytes(len))
    }
}

impl<T: Buf> BufExt for T {}

pub trait BufMutExt: BufMut {
    fn put_varint(&mut self, value: i32) {
        let value = value as u32;
        if (value & (0xFFFFFFFF << 7)) == 0 {
            self.put_u8(value as u8);
        } else if (value & (0xFFFFFFFF << 14)) == 0 {
            let w = (value & 0x7F | 0x80) << 8 | (value >> 7);
            self.put_u16(w as u16);
        } else if (value & (0xFFFFFFFF << 21)) == 0 {
            self.put_slice(&[(value & 0x7F | 0x80) as u8, ((value >> 7) & 0x7F | 0x80) as u8, (value >> 14) as u8]);
        } else if (value & (0xFFFFFFFF << 28)) == 0 {
            self.put_u32((value & 0x7F | 0x80) << 24 | (((value >> 7) & 0x7F | 0x80) << 16) | ((value >> 14) & 0x7F | 0x80) << 8 | (value >> 21));
        } else {
            self.put_slice(&[
                (value & 0x7F | 0x80) as u8,
                ((value >> 7) & 0x7F | 0x80) as u8,
                ((value >> 14) & 0x7F | 0x80) as u8,
                ((value >> 21) & 0x7F | 0x80) as u8,
                (value >> 28) as u8
            ]);
        }
    }

    fn put_bool(&mut self, bool: bool) {
        self.put_u8(if bool { 0x01 } else { 0x00 })
    }

    fn put_string(&mut self, str: &str) {
        let str = str.as_bytes();
        self.put_varint(str.len() as i32);
        self.put_slice(str);
    }

    fn put_uuid(&mut self, uuid: Uuid) {
        self.put_slice(uuid.as_bytes());
    }

    fn put_uuid_str(&mut self, uuid: Uuid) {
        self.put_string(&uuid.hyphenated().to_string());
    }

    fn put_byte_array(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as i32);
        self.put_slice(bytes);
    }
}

impl<T: BufMut> BufMutExt for T {}

#[inline(always)]
pub const fn varint_length(value: i32) -> usize {
    match value as u32 {
        0..=127 => 1,
        128..=16383 => 2,
        16384..=2097151 => 3,
        2097152..=268435455 => 4,
        _ => 5,
    }
}
