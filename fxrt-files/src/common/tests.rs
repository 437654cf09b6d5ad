use crate::ParserError;
use crate::common::reader::BoundedReader;

#[test]
fn read_advances_and_rejects_overrun() -> Result<(), anyhow::Error> {
    let data = [1u8, 0, 0, 0, 2, 0, 0, 0, 3];
    let mut rdr = BoundedReader::new(&data);

    assert_eq!(rdr.read_u32()?, 1);
    assert_eq!(rdr.read_u32()?, 2);
    assert_eq!(rdr.position(), 8);

    let err = rdr.read_u32().unwrap_err();
    assert!(matches!(
        err,
        ParserError::OutOfBounds {
            offset: 8,
            size: 4,
            len: 9
        }
    ));
    // a failed read leaves the position untouched
    assert_eq!(rdr.position(), 8);
    Ok(())
}

#[test]
fn read_at_overflow_is_out_of_bounds() {
    let data = [0u8; 16];
    let mut rdr = BoundedReader::new(&data);

    assert!(matches!(
        rdr.read_at(usize::MAX - 1, 4),
        Err(ParserError::OutOfBounds { .. })
    ));
    assert!(matches!(rdr.seek(17), Err(ParserError::OutOfBounds { .. })));
    assert!(rdr.seek(16).is_ok());
}

#[test]
fn read_string_requires_terminator() -> Result<(), anyhow::Error> {
    let data = b"\0Color\0Tail";
    let mut rdr = BoundedReader::new(data);

    assert_eq!(rdr.read_string(1)?, "Color");
    assert_eq!(rdr.position(), 7);
    assert_eq!(rdr.read_string(0)?, "");
    assert!(matches!(rdr.read_string(7), Err(ParserError::OutOfBounds { .. })));
    Ok(())
}

#[test]
fn read_records_checks_whole_range_first() -> Result<(), anyhow::Error> {
    let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
    let mut rdr = BoundedReader::new(&data);

    assert!(rdr.read_records::<u32>(3).is_err());
    assert_eq!(rdr.position(), 0);
    assert_eq!(rdr.read_records::<u32>(2)?, vec![1, 2]);
    assert!(rdr.read_records::<u32>(u32::MAX).is_err());
    Ok(())
}
