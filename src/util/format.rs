const KIBI_BYTE: u64 = 1024;
const MEBI_BYTE: u64 = KIBI_BYTE * 1024;

pub fn pretty_size_from_bytes(bytes: u64) -> String {
    if bytes < KIBI_BYTE {
        format!("{} B", bytes)
    } else if bytes < MEBI_BYTE {
        format!("{:.2} KiB", bytes as f64 / KIBI_BYTE as f64)
    } else {
        format!("{:.2} MiB", bytes as f64 / MEBI_BYTE as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::pretty_size_from_bytes;

    #[test]
    fn sizes() {
        assert_eq!(pretty_size_from_bytes(512), "512 B");
        assert_eq!(pretty_size_from_bytes(460 * 1024), "460.00 KiB");
        assert_eq!(pretty_size_from_bytes(3 * 1024 * 1024), "3.00 MiB");
    }
}
