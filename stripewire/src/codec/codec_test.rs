use pretty_assertions::assert_eq;

use crate::codec::CodecError;
use crate::codec::WireBuffer;
use crate::codec::WireReader;

#[test]
fn test_primitive_roundtrip() -> anyhow::Result<()> {
    let mut b = WireBuffer::new();
    b.put_u8(7);
    b.put_bool(true);
    b.put_bool(false);
    b.put_u32(0xDEAD_BEEF);
    b.put_i32(-3);
    b.put_u64(u64::MAX - 1);
    b.put_i64(-9);
    b.put_str("host:9410");
    b.put_bytes(&[1, 2, 3]);

    let mut r = WireReader::new(b.as_slice());
    assert_eq!(7, r.get_u8()?);
    assert_eq!(true, r.get_bool()?);
    assert_eq!(false, r.get_bool()?);
    assert_eq!(0xDEAD_BEEF, r.get_u32()?);
    assert_eq!(-3, r.get_i32()?);
    assert_eq!(u64::MAX - 1, r.get_u64()?);
    assert_eq!(-9, r.get_i64()?);
    assert_eq!("host:9410", r.get_string()?);
    assert_eq!(vec![1, 2, 3], r.get_bytes()?);
    r.expect_end()?;
    Ok(())
}

#[test]
fn test_big_endian_layout() {
    let mut b = WireBuffer::new();
    b.put_u32(0x0102_0304);
    assert_eq!(&[1, 2, 3, 4], b.as_slice());

    let mut b = WireBuffer::new();
    b.put_u64(1);
    assert_eq!(&[0, 0, 0, 0, 0, 0, 0, 1], b.as_slice());
}

#[test]
fn test_reserve_then_patch() -> anyhow::Result<()> {
    let mut b = WireBuffer::new();
    b.put_u8(1);
    let count = b.reserve_u32();
    b.put_u64(42);
    b.put_u64(43);
    b.patch_u32(count, 2);

    let mut r = WireReader::new(b.as_slice());
    assert_eq!(1, r.get_u8()?);
    assert_eq!(2, r.get_u32()?);
    assert_eq!(42, r.get_u64()?);
    assert_eq!(43, r.get_u64()?);
    Ok(())
}

#[test]
fn test_truncated_read() {
    let mut b = WireBuffer::new();
    b.put_u32(5);

    let mut r = WireReader::new(b.as_slice());
    let err = r.get_u64().unwrap_err();
    assert_eq!(
        CodecError::Truncated {
            expected: 8,
            remaining: 4
        },
        err
    );
}

#[test]
fn test_string_length_prefix_overruns() {
    let mut b = WireBuffer::new();
    // Claims 100 bytes but carries 2.
    b.put_u32(100);
    b.put_u8(b'h');
    b.put_u8(b'i');

    let mut r = WireReader::new(b.as_slice());
    let err = r.get_string().unwrap_err();
    assert_eq!(
        CodecError::Truncated {
            expected: 100,
            remaining: 2
        },
        err
    );
}

#[test]
fn test_invalid_bool_tag() {
    let mut r = WireReader::new(&[9]);
    let err = r.get_bool().unwrap_err();
    assert_eq!(CodecError::InvalidTag { what: "bool", tag: 9 }, err);
}

#[test]
fn test_trailing_bytes_detected() {
    let mut b = WireBuffer::new();
    b.put_u8(1);
    b.put_u8(2);

    let mut r = WireReader::new(b.as_slice());
    r.get_u8().unwrap();
    let err = r.expect_end().unwrap_err();
    assert_eq!(CodecError::TrailingBytes { remaining: 1 }, err);
}

#[test]
fn test_release_drops_backing_storage() {
    let mut b = WireBuffer::with_capacity(128);
    b.put_u64(1);
    assert!(!b.is_empty());
    b.release();
    assert!(b.is_empty());
    assert_eq!(0, b.len());
}
