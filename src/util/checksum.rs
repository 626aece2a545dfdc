/// CRC-32C over `data`.
pub fn checksum(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

#[cfg(test)]
mod tests {
    use super::checksum;

    #[test]
    fn deterministic() {
        let data = b"flatfs integrity";
        assert_eq!(checksum(data), checksum(data));
        assert_ne!(checksum(data), checksum(b"flatfs integritY"));
        // standard CRC-32C check value
        assert_eq!(checksum(b"123456789"), 0xe306_9283);
    }
}
