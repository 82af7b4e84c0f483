//! Tests for the byte cursor.

use std::rc::Rc;

use crate::bytes::{Addr, TastyReader};

/// Encode a natural the way the pickler does: big-endian 7-bit groups,
/// high bit set on the last byte only.
pub(crate) fn write_nat(out: &mut Vec<u8>, mut x: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    loop {
        groups[n] = (x & 0x7f) as u8;
        x >>= 7;
        n += 1;
        if x == 0 {
            break;
        }
    }
    for i in (1..n).rev() {
        out.push(groups[i]);
    }
    out.push(groups[0] | 0x80);
}

pub(crate) fn write_int(out: &mut Vec<u8>, x: i64) {
    let zz = ((x << 1) ^ (x >> 63)) as u64;
    write_nat(out, zz);
}

fn reader(bytes: Vec<u8>) -> TastyReader {
    TastyReader::new(Rc::from(bytes))
}

#[test]
fn nat_roundtrip() {
    let values = [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX];
    let mut bytes = Vec::new();
    for &v in &values {
        write_nat(&mut bytes, v);
    }
    let mut r = reader(bytes);
    for &v in &values {
        assert_eq!(r.read_long_nat().unwrap(), v);
    }
    assert!(r.is_at_end());
}

#[test]
fn small_nat_is_one_byte() {
    let mut bytes = Vec::new();
    write_nat(&mut bytes, 5);
    assert_eq!(bytes, vec![0x85]);
}

#[test]
fn int_roundtrip_zigzag() {
    let values = [0i64, -1, 1, -2, 63, -64, 64, i32::MIN as i64, i32::MAX as i64, i64::MIN, i64::MAX];
    let mut bytes = Vec::new();
    for &v in &values {
        write_int(&mut bytes, v);
    }
    let mut r = reader(bytes);
    for &v in &values {
        assert_eq!(r.read_long_int().unwrap(), v);
    }
}

#[test]
fn nat_overflow_to_u32_is_an_error() {
    let mut bytes = Vec::new();
    write_nat(&mut bytes, u64::from(u32::MAX) + 1);
    let mut r = reader(bytes);
    assert!(r.read_nat().is_err());
}

#[test]
fn read_end_points_past_the_prefixed_region() {
    // Payload of 3 bytes after a 1-byte length prefix.
    let mut bytes = Vec::new();
    write_nat(&mut bytes, 3);
    bytes.extend_from_slice(&[10, 20, 30]);
    let mut r = reader(bytes);
    let end = r.read_end().unwrap();
    assert_eq!(end, Addr(4));
    assert_eq!(r.current_addr(), Addr(1));
    r.goto(end);
    assert!(r.is_at_end());
}

#[test]
fn fork_is_independent() {
    let mut r = reader(vec![0x81, 0x82, 0x83]);
    let mut f = r.fork();
    assert_eq!(r.read_nat().unwrap(), 1);
    assert_eq!(f.read_nat().unwrap(), 1);
    assert_eq!(f.read_nat().unwrap(), 2);
    assert_eq!(r.current_addr(), Addr(1));
}

#[test]
fn sub_reader_window() {
    let r = reader(vec![1, 2, 3, 4, 5]);
    let mut sub = r.sub_reader(Addr(1), Addr(3));
    assert_eq!(sub.current_addr(), Addr(1));
    assert_eq!(sub.read_byte().unwrap(), 2);
    assert_eq!(sub.read_byte().unwrap(), 3);
    assert!(sub.is_at_end());
    assert!(sub.read_byte().is_err());
}

#[test]
fn addresses_are_relative_to_the_window_base() {
    let data: Rc<[u8]> = Rc::from(vec![9, 9, 0x85, 7]);
    let mut r = TastyReader::over(data, 2, 4);
    assert_eq!(r.current_addr(), Addr(0));
    assert_eq!(r.read_nat().unwrap(), 5);
    assert_eq!(r.current_addr(), Addr(1));
}

#[test]
fn truncated_read_is_an_error() {
    let mut r = reader(vec![0x00]);
    // Continuation byte with no terminator.
    assert!(r.read_long_nat().is_err());
}

#[test]
fn peek_does_not_advance() {
    let mut r = reader(vec![0x85]);
    assert_eq!(r.next_byte().unwrap(), 0x85);
    assert_eq!(r.current_addr(), Addr(0));
    assert_eq!(r.read_byte().unwrap(), 0x85);
    assert!(r.next_byte().is_err());
}
