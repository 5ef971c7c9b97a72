use super::{coils::Coils, registers::Registers};
use crate::{common, MAX_DATA_SIZE};

use smallvec::SmallVec;

/// Raw PDU payload bytes, exactly as they travel on the wire.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Data {
    buffer: SmallVec<[u8; MAX_DATA_SIZE]>,
}

impl Data {
    pub fn raw(bytes: &[u8]) -> Data {
        assert!(bytes.len() <= MAX_DATA_SIZE);
        let buffer = SmallVec::<[u8; MAX_DATA_SIZE]>::from(bytes);
        Data { buffer }
    }

    pub fn raw_empty(size: usize) -> Data {
        assert!(size <= MAX_DATA_SIZE);
        let mut buffer = SmallVec::<[u8; MAX_DATA_SIZE]>::new();
        buffer.resize(size, 0);
        Data { buffer }
    }

    pub fn coils(coils: impl Coils) -> Data {
        let nobjs = coils.coils_count();
        let mut data = Data::raw_empty(common::ncoils_len(nobjs));
        let written = coils.coils_write(data.get_mut());
        assert!(written == nobjs);
        data
    }

    pub fn registers(registers: impl Registers) -> Data {
        let nobjs = registers.registers_count();
        let mut data = Data::raw_empty(common::nregs_len(nobjs));
        let written = registers.registers_write(data.get_mut());
        assert!(written == nobjs);
        data
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn get(&self) -> &[u8] {
        &self.buffer[..]
    }

    pub fn get_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..]
    }

    pub fn get_u8(&self, idx: usize) -> Option<u8> {
        self.buffer.get(idx).copied()
    }

    pub fn get_bit(&self, idx: usize) -> Option<bool> {
        common::get_bit(self.get(), idx)
    }

    /// Register at `idx`, read as it sits on the wire (big-endian).
    pub fn get_u16(&self, idx: usize) -> Option<u16> {
        let start = idx * 2;
        let end = start + 2;
        if end <= self.len() {
            Some(u16::from_be_bytes(
                self.get()[start..end].try_into().unwrap(),
            ))
        } else {
            None
        }
    }
}
