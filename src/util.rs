use std::ops::RangeFrom;

use nom::error::{make_error, ErrorKind, ParseError};
use nom::{Err, IResult, InputIter, InputLength, Slice};

pub fn be_u48<I, E: ParseError<I>>(input: I) -> IResult<I, u64, E>
where
    I: Slice<RangeFrom<usize>> + InputIter<Item = u8> + InputLength,
{
    let bound: usize = 6;

    if input.input_len() < bound {
        Err(Err::Error(make_error(input, ErrorKind::Eof)))
    } else {
        let mut res = 0u64;

        for byte in input.iter_elements().take(bound) {
            res = (res << 8) + byte as u64;
        }

        Ok((input.slice(bound..), res))
    }
}

/// Write the low 3 bytes of `value` big-endian.
pub fn put_u24(value: u32, output: &mut Vec<u8>) {
    output.extend_from_slice(&value.to_be_bytes()[1..]);
}

/// Write the low 6 bytes of `value` big-endian.
pub fn put_u48(value: u64, output: &mut Vec<u8>) {
    output.extend_from_slice(&value.to_be_bytes()[2..]);
}
