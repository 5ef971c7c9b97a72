//! Register value encoding.
//!
//! Multi-register values are serialized as consecutive 16-bit words. The
//! endianness selects the byte order inside each word, the word order selects
//! which word travels first. Protocol fields (addresses, quantities, MBAP
//! header) are always big-endian and never go through these helpers.

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Endianness {
    Big,
    Little,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WordOrder {
    HighFirst,
    LowFirst,
}

pub fn u16_to_bytes(endianness: Endianness, value: u16) -> [u8; 2] {
    match endianness {
        Endianness::Big => value.to_be_bytes(),
        Endianness::Little => value.to_le_bytes(),
    }
}

pub fn u16_from_bytes(endianness: Endianness, bytes: &[u8]) -> u16 {
    let pair = [bytes[0], bytes[1]];
    match endianness {
        Endianness::Big => u16::from_be_bytes(pair),
        Endianness::Little => u16::from_le_bytes(pair),
    }
}

pub fn u16s_to_bytes(endianness: Endianness, values: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for value in values {
        out.extend_from_slice(&u16_to_bytes(endianness, *value));
    }
    out
}

pub fn u16s_from_bytes(endianness: Endianness, bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16_from_bytes(endianness, pair))
        .collect()
}

pub fn u32_to_bytes(endianness: Endianness, word_order: WordOrder, value: u32) -> [u8; 4] {
    let mut out = match endianness {
        Endianness::Big => value.to_be_bytes(),
        Endianness::Little => value.to_le_bytes(),
    };
    if word_swap(endianness, word_order) {
        out.swap(0, 2);
        out.swap(1, 3);
    }
    out
}

pub fn u32_from_bytes(endianness: Endianness, word_order: WordOrder, bytes: &[u8]) -> u32 {
    let mut quad: [u8; 4] = bytes[0..4].try_into().unwrap();
    if word_swap(endianness, word_order) {
        quad.swap(0, 2);
        quad.swap(1, 3);
    }
    match endianness {
        Endianness::Big => u32::from_be_bytes(quad),
        Endianness::Little => u32::from_le_bytes(quad),
    }
}

pub fn u32s_to_bytes(endianness: Endianness, word_order: WordOrder, values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&u32_to_bytes(endianness, word_order, *value));
    }
    out
}

pub fn u32s_from_bytes(endianness: Endianness, word_order: WordOrder, bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|quad| u32_from_bytes(endianness, word_order, quad))
        .collect()
}

pub fn u64_to_bytes(endianness: Endianness, word_order: WordOrder, value: u64) -> [u8; 8] {
    let mut out = match endianness {
        Endianness::Big => value.to_be_bytes(),
        Endianness::Little => value.to_le_bytes(),
    };
    if word_swap(endianness, word_order) {
        swap_words_u64(&mut out);
    }
    out
}

pub fn u64_from_bytes(endianness: Endianness, word_order: WordOrder, bytes: &[u8]) -> u64 {
    let mut oct: [u8; 8] = bytes[0..8].try_into().unwrap();
    if word_swap(endianness, word_order) {
        swap_words_u64(&mut oct);
    }
    match endianness {
        Endianness::Big => u64::from_be_bytes(oct),
        Endianness::Little => u64::from_le_bytes(oct),
    }
}

pub fn u64s_to_bytes(endianness: Endianness, word_order: WordOrder, values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for value in values {
        out.extend_from_slice(&u64_to_bytes(endianness, word_order, *value));
    }
    out
}

pub fn u64s_from_bytes(endianness: Endianness, word_order: WordOrder, bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|oct| u64_from_bytes(endianness, word_order, oct))
        .collect()
}

pub fn f32_to_bytes(endianness: Endianness, word_order: WordOrder, value: f32) -> [u8; 4] {
    u32_to_bytes(endianness, word_order, value.to_bits())
}

pub fn f32s_to_bytes(endianness: Endianness, word_order: WordOrder, values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&f32_to_bytes(endianness, word_order, *value));
    }
    out
}

pub fn f32s_from_bytes(endianness: Endianness, word_order: WordOrder, bytes: &[u8]) -> Vec<f32> {
    u32s_from_bytes(endianness, word_order, bytes)
        .into_iter()
        .map(f32::from_bits)
        .collect()
}

pub fn f64_to_bytes(endianness: Endianness, word_order: WordOrder, value: f64) -> [u8; 8] {
    u64_to_bytes(endianness, word_order, value.to_bits())
}

pub fn f64s_to_bytes(endianness: Endianness, word_order: WordOrder, values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for value in values {
        out.extend_from_slice(&f64_to_bytes(endianness, word_order, *value));
    }
    out
}

pub fn f64s_from_bytes(endianness: Endianness, word_order: WordOrder, bytes: &[u8]) -> Vec<f64> {
    u64s_from_bytes(endianness, word_order, bytes)
        .into_iter()
        .map(f64::from_bits)
        .collect()
}

/// Pack bools little-endian: bit i lands in byte i/8, position i%8.
/// Trailing bits of the last byte stay zero.
pub fn encode_bools(values: &[bool]) -> Vec<u8> {
    let mut nbytes = values.len() / 8;
    if values.len() % 8 != 0 {
        nbytes += 1;
    }

    let mut out = vec![0u8; nbytes];
    for (i, value) in values.iter().enumerate() {
        if *value {
            out[i / 8] |= 0x01 << (i % 8);
        }
    }
    out
}

/// Unpack `quantity` bools from packed bytes.
pub fn decode_bools(quantity: u16, bytes: &[u8]) -> Vec<bool> {
    let mut out = Vec::with_capacity(quantity as usize);
    for i in 0..quantity as usize {
        out.push((bytes[i / 8] >> (i % 8)) & 0x01 == 0x01);
    }
    out
}

// The serialized word order deviates from the plain integer byte order when
// the endianness writes the high word where the low word should travel.
fn word_swap(endianness: Endianness, word_order: WordOrder) -> bool {
    matches!(
        (endianness, word_order),
        (Endianness::Big, WordOrder::LowFirst) | (Endianness::Little, WordOrder::HighFirst)
    )
}

fn swap_words_u64(bytes: &mut [u8; 8]) {
    bytes.swap(0, 6);
    bytes.swap(1, 7);
    bytes.swap(2, 4);
    bytes.swap(3, 5);
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL_PAIRS: [(Endianness, WordOrder); 4] = [
        (Endianness::Big, WordOrder::HighFirst),
        (Endianness::Big, WordOrder::LowFirst),
        (Endianness::Little, WordOrder::HighFirst),
        (Endianness::Little, WordOrder::LowFirst),
    ];

    #[test]
    fn u16_layouts() {
        assert_eq!(u16_to_bytes(Endianness::Big, 0x1234), [0x12, 0x34]);
        assert_eq!(u16_to_bytes(Endianness::Little, 0x1234), [0x34, 0x12]);
        assert_eq!(u16_from_bytes(Endianness::Big, &[0x12, 0x34]), 0x1234);
        assert_eq!(u16_from_bytes(Endianness::Little, &[0x12, 0x34]), 0x3412);
    }

    #[test]
    fn u32_layouts() {
        let value = 0x11223344u32;
        assert_eq!(
            u32_to_bytes(Endianness::Big, WordOrder::HighFirst, value),
            [0x11, 0x22, 0x33, 0x44]
        );
        assert_eq!(
            u32_to_bytes(Endianness::Big, WordOrder::LowFirst, value),
            [0x33, 0x44, 0x11, 0x22]
        );
        assert_eq!(
            u32_to_bytes(Endianness::Little, WordOrder::LowFirst, value),
            [0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(
            u32_to_bytes(Endianness::Little, WordOrder::HighFirst, value),
            [0x22, 0x11, 0x44, 0x33]
        );
    }

    #[test]
    fn u64_layouts() {
        let value = 0x1122334455667788u64;
        assert_eq!(
            u64_to_bytes(Endianness::Big, WordOrder::HighFirst, value),
            [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
        assert_eq!(
            u64_to_bytes(Endianness::Big, WordOrder::LowFirst, value),
            [0x77, 0x88, 0x55, 0x66, 0x33, 0x44, 0x11, 0x22]
        );
        assert_eq!(
            u64_to_bytes(Endianness::Little, WordOrder::LowFirst, value),
            [0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(
            u64_to_bytes(Endianness::Little, WordOrder::HighFirst, value),
            [0x22, 0x11, 0x44, 0x33, 0x66, 0x55, 0x88, 0x77]
        );
    }

    #[test]
    fn round_trips_all_pairs() {
        for (e, w) in ALL_PAIRS {
            assert_eq!(u16_from_bytes(e, &u16_to_bytes(e, 0xABCD)), 0xABCD);
            assert_eq!(
                u32_from_bytes(e, w, &u32_to_bytes(e, w, 0xDEADBEEF)),
                0xDEADBEEF
            );
            assert_eq!(
                u64_from_bytes(e, w, &u64_to_bytes(e, w, 0x0123456789ABCDEF)),
                0x0123456789ABCDEF
            );
            assert_eq!(
                f32s_from_bytes(e, w, &f32_to_bytes(e, w, 1.234))[0],
                1.234f32
            );
            assert_eq!(
                f64s_from_bytes(e, w, &f64_to_bytes(e, w, -987.654))[0],
                -987.654f64
            );
        }
    }

    #[test]
    fn f32_reference_layouts() {
        // 1.234f32 has the bit pattern 0x3F9DF3B6
        assert_eq!(
            f32_to_bytes(Endianness::Big, WordOrder::HighFirst, 1.234),
            [0x3F, 0x9D, 0xF3, 0xB6]
        );
        assert_eq!(
            f32_to_bytes(Endianness::Little, WordOrder::LowFirst, 1.234),
            [0xB6, 0xF3, 0x9D, 0x3F]
        );
        assert_eq!(
            f32s_from_bytes(
                Endianness::Big,
                WordOrder::HighFirst,
                &[0x3F, 0x9D, 0xF3, 0xB6]
            )[0],
            1.234f32
        );
        assert_eq!(
            f32s_from_bytes(
                Endianness::Little,
                WordOrder::LowFirst,
                &[0xB6, 0xF3, 0x9D, 0x3F]
            )[0],
            1.234f32
        );
    }

    #[test]
    fn bools_round_trip() {
        let bits = [
            true, false, true, true, false, false, true, true, true, false,
        ];
        let packed = encode_bools(&bits);
        assert_eq!(packed, vec![0xCD, 0x01]);
        assert_eq!(decode_bools(10, &packed), bits.to_vec());
    }

    #[test]
    fn bools_byte_count() {
        assert_eq!(encode_bools(&[true]).len(), 1);
        assert_eq!(encode_bools(&[false; 8]).len(), 1);
        assert_eq!(encode_bools(&[false; 9]).len(), 2);
        assert_eq!(decode_bools(4, &[0x0D]), vec![true, false, true, true]);
    }

    #[test]
    fn vector_forms() {
        let values = [0x1234u16, 0x5678];
        let bytes = u16s_to_bytes(Endianness::Big, &values);
        assert_eq!(bytes, vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(u16s_from_bytes(Endianness::Big, &bytes), values.to_vec());

        let values = [0x11223344u32, 0x55667788];
        for (e, w) in ALL_PAIRS {
            let bytes = u32s_to_bytes(e, w, &values);
            assert_eq!(u32s_from_bytes(e, w, &bytes), values.to_vec());
        }
    }
}
