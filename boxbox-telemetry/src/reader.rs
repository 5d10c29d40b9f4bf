//! Offset-based little-endian reads over a datagram payload
//!
//! Every read is bounds-checked and yields zero past the end of the buffer,
//! so a short datagram decodes to default values instead of failing.
//! Non-finite floats read as zero.

#[derive(Debug, Clone, Copy)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reader over `len` bytes starting at `offset`, clipped to the buffer
    pub fn slice(&self, offset: usize, len: usize) -> PayloadReader<'a> {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(len).min(self.data.len());
        PayloadReader {
            data: &self.data[start..end],
        }
    }

    fn bytes<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.data.get(offset..end)?.try_into().ok()
    }

    #[inline]
    pub fn u8(&self, offset: usize) -> u8 {
        self.data.get(offset).copied().unwrap_or(0)
    }

    #[inline]
    pub fn i8(&self, offset: usize) -> i8 {
        self.data.get(offset).map_or(0, |b| *b as i8)
    }

    #[inline]
    pub fn u16(&self, offset: usize) -> u16 {
        self.bytes(offset).map_or(0, u16::from_le_bytes)
    }

    #[inline]
    pub fn u32(&self, offset: usize) -> u32 {
        self.bytes(offset).map_or(0, u32::from_le_bytes)
    }

    #[inline]
    pub fn u64(&self, offset: usize) -> u64 {
        self.bytes(offset).map_or(0, u64::from_le_bytes)
    }

    #[inline]
    pub fn f32(&self, offset: usize) -> f32 {
        self.bytes(offset)
            .map(f32::from_le_bytes)
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    pub fn u8_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        std::array::from_fn(|i| self.u8(offset + i))
    }

    pub fn f32_array<const N: usize>(&self, offset: usize) -> [f32; N] {
        std::array::from_fn(|i| self.f32(offset + i * 4))
    }

    /// NUL-terminated text field of at most `max_len` bytes
    pub fn text(&self, offset: usize, max_len: usize) -> String {
        let field = self.slice(offset, max_len).data;
        let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_past_end_are_zero() {
        let data = [0x01, 0x02, 0x03];
        let r = PayloadReader::new(&data);
        assert_eq!(r.u16(0), 0x0201);
        assert_eq!(r.u16(2), 0);
        assert_eq!(r.u32(0), 0);
        assert_eq!(r.u8(3), 0);
        assert_eq!(r.f32(usize::MAX - 1), 0.0);
    }

    #[test]
    fn test_non_finite_float_is_zero() {
        let data = f32::NAN.to_le_bytes();
        assert_eq!(PayloadReader::new(&data).f32(0), 0.0);
        let data = f32::INFINITY.to_le_bytes();
        assert_eq!(PayloadReader::new(&data).f32(0), 0.0);
    }

    #[test]
    fn test_slice_is_clipped() {
        let data = [1u8, 2, 3, 4];
        let r = PayloadReader::new(&data);
        assert_eq!(r.slice(2, 10).len(), 2);
        assert!(r.slice(9, 4).is_empty());
        assert_eq!(r.slice(1, 2).u8(1), 3);
    }

    #[test]
    fn test_text_stops_at_nul() {
        let mut data = [0u8; 8];
        data[..5].copy_from_slice(b"NORRI");
        let r = PayloadReader::new(&data);
        assert_eq!(r.text(0, 8), "NORRI");
        assert_eq!(r.text(0, 3), "NOR");
    }
}
