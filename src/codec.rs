//! Low-level value encoding shared by the container and the index stores.
//!
//! Integers are LEB128 varints (zigzag for signed values), strings are a
//! varint byte length followed by UTF-8 bytes. Optional values carry a
//! leading presence byte: 0 = absent, 1 = present.

use std::io::{self, Read, Write};

pub fn write_uvarint<W: Write>(mut w: W, mut x: u64) -> io::Result<()> {
    while x >= 0x80 {
        w.write_all(&[(x as u8) | 0x80])?;
        x >>= 7;
    }
    w.write_all(&[x as u8])
}

pub fn read_uvarint<R: Read>(mut r: R) -> io::Result<u64> {
    let mut x: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let b = byte[0];
        if shift >= 64 || (shift == 63 && b > 1) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflow"));
        }
        if b < 0x80 {
            return Ok(x | (u64::from(b) << shift));
        }
        x |= u64::from(b & 0x7f) << shift;
        shift += 7;
    }
}

pub fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

pub fn write_str<W: Write>(mut w: W, s: &str) -> io::Result<()> {
    write_uvarint(&mut w, s.len() as u64)?;
    w.write_all(s.as_bytes())
}

pub fn read_str<R: Read>(mut r: R) -> io::Result<String> {
    let len = read_uvarint(&mut r)?;
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string length overflow"))?;
    let mut bytes = Vec::new();
    (&mut r).take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_presence<W: Write>(mut w: W, present: bool) -> io::Result<()> {
    w.write_all(&[u8::from(present)])
}

pub fn read_presence<R: Read>(mut r: R) -> io::Result<bool> {
    let mut byte = [0u8; 1];
    r.read_exact(&mut byte)?;
    match byte[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid presence byte {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uvarint_boundaries() {
        for v in [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_uvarint(&mut buf, v).unwrap();
            assert_eq!(read_uvarint(&buf[..]).unwrap(), v);
        }
    }

    #[test]
    fn uvarint_single_byte_below_128() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, 127).unwrap();
        assert_eq!(buf, vec![0x7f]);
    }

    #[test]
    fn uvarint_truncated_is_eof() {
        let err = read_uvarint(&[0x80u8, 0x80][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn uvarint_overflow_is_invalid() {
        let err = read_uvarint(&[0xffu8; 11][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn zigzag_handles_negative_namespaces() {
        for v in [0i64, -1, 1, -2, 14, i64::MIN, i64::MAX] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
    }

    #[test]
    fn str_truncated_is_eof() {
        let mut buf = Vec::new();
        write_str(&mut buf, "Hello").unwrap();
        buf.truncate(3);
        assert_eq!(
            read_str(&buf[..]).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn str_rejects_invalid_utf8() {
        let buf = vec![2u8, 0xff, 0xfe];
        assert_eq!(
            read_str(&buf[..]).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn presence_rejects_garbage() {
        assert!(read_presence(&[1u8][..]).unwrap());
        assert!(!read_presence(&[0u8][..]).unwrap());
        assert!(read_presence(&[7u8][..]).is_err());
    }
}
