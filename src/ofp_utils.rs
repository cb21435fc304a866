use bytes::BufMut;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ofp_message::OfpSerializationError;

pub fn write_padding_bytes(bytes: &mut Vec<u8>, count: usize) {
    bytes.put_bytes(0, count);
}

/// Bytes left to read in `bytes`.
pub fn remaining(bytes: &Cursor<&[u8]>) -> usize {
    let len = bytes.get_ref().len();
    len.saturating_sub(bytes.position() as usize)
}

pub fn skip_bytes(bytes: &mut Cursor<&[u8]>, count: usize) -> Result<(), OfpSerializationError> {
    let available = remaining(bytes);
    if available < count {
        return Err(OfpSerializationError::Truncated {
            message: "padding".to_string(),
            expected: count,
            available,
        });
    }
    bytes.set_position(bytes.position() + count as u64);
    Ok(())
}

/// Read a NUL-padded string occupying exactly `max_capacity` bytes.
pub fn read_fixed_size_string(bytes: &mut Cursor<&[u8]>, max_capacity: usize)
    -> Result<String, OfpSerializationError> {
    let available = remaining(bytes);
    if available < max_capacity {
        return Err(OfpSerializationError::Truncated {
            message: "fixed size string".to_string(),
            expected: max_capacity,
            available,
        });
    }
    let start = bytes.position() as usize;
    let field = &bytes.get_ref()[start..start + max_capacity];
    let end = field.iter().position(|c| *c == 0).unwrap_or(max_capacity);
    let text = String::from_utf8_lossy(&field[..end]).into_owned();
    bytes.set_position((start + max_capacity) as u64);
    Ok(text)
}

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fixed_size_string_stops_at_nul() {
        let data = b"eth0\0\0\0\0rest";
        let mut bytes = Cursor::new(&data[..]);
        assert_eq!(read_fixed_size_string(&mut bytes, 8).unwrap(), "eth0");
        assert_eq!(bytes.position(), 8);
        assert_eq!(remaining(&bytes), 4);
    }

    #[test]
    fn test_read_fixed_size_string_truncated() {
        let data = b"abc";
        let mut bytes = Cursor::new(&data[..]);
        assert!(read_fixed_size_string(&mut bytes, 8).is_err());
    }

    #[test]
    fn test_padding_and_skip() {
        let mut bytes = vec![1];
        write_padding_bytes(&mut bytes, 3);
        assert_eq!(bytes, vec![1, 0, 0, 0]);

        let mut cursor = Cursor::new(&bytes[..]);
        skip_bytes(&mut cursor, 4).unwrap();
        assert!(skip_bytes(&mut cursor, 1).is_err());
    }
}
