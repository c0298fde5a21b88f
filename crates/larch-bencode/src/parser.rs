//! Parse bencoded bytes back into [`Value`]s.
//!
//! The parser is strict where BEP-0003 is strict: integers may not be `-0`
//! or carry leading zeroes, byte string lengths may not carry leading
//! zeroes, and dictionary keys must be unique and sorted. Strictness
//! matters here because anything that round-trips through this parser may
//! be hashed again downstream; two spellings of the same structure must
//! not exist.
//!
//! [`Value::Raw`] is an encoder-only construct and is never produced.

use crate::{Dict, Value};
use nom::{
    branch::alt,
    bytes::complete::take,
    character::complete::{char, digit1},
    combinator::{map, map_res, opt, recognize, verify},
    error::{Error as NomError, ErrorKind},
    sequence::{delimited, pair},
    Err as NomErr, Finish, IResult,
};
use std::str;
use thiserror::Error;

/// Why a byte buffer failed to parse as bencode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The input is truncated or violates the grammar.
    #[error("malformed bencode at byte offset {0}")]
    Malformed(usize),
    /// A top-level value parsed but bytes were left over.
    #[error("trailing bytes after the bencoded value at byte offset {0}")]
    Trailing(usize),
}

/// Parse a complete buffer into a single [`Value`].
pub fn parse(input: &[u8]) -> Result<Value, ParseError> {
    let total = input.len();
    let (rest, parsed) = value(input)
        .finish()
        .map_err(|error: NomError<&[u8]>| ParseError::Malformed(total - error.input.len()))?;
    if rest.is_empty() {
        Ok(parsed)
    } else {
        Err(ParseError::Trailing(total - rest.len()))
    }
}

fn value(input: &[u8]) -> IResult<&[u8], Value> {
    alt((
        map(integer, Value::Int),
        map(byte_string, Value::Bytes),
        list,
        dict,
    ))(input)
}

/// `i…e` with the BEP-0003 exclusions: no `-0`, no leading zeroes.
fn integer(input: &[u8]) -> IResult<&[u8], i64> {
    delimited(
        char('i'),
        map_res(
            verify(
                recognize(pair(opt(char('-')), digit1)),
                |digits: &[u8]| !matches!(digits, [b'0', _, ..] | [b'-', b'0', ..]),
            ),
            |digits: &[u8]| str::from_utf8(digits).unwrap_or("").parse(),
        ),
        char('e'),
    )(input)
}

/// `<len>:<bytes>`. The length may not carry leading zeroes.
fn byte_string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (rest, length) = map_res(
        verify(digit1, |digits: &[u8]| !matches!(digits, [b'0', _, ..])),
        |digits: &[u8]| str::from_utf8(digits).unwrap_or("").parse::<usize>(),
    )(input)?;
    let (rest, _) = char(':')(rest)?;
    let (rest, bytes) = take(length)(rest)?;
    Ok((rest, bytes.to_vec()))
}

fn list(input: &[u8]) -> IResult<&[u8], Value> {
    let (mut rest, _) = char('l')(input)?;
    let mut items = Vec::new();
    loop {
        if let Ok((after, _)) = char::<_, NomError<&[u8]>>('e')(rest) {
            return Ok((after, Value::List(items)));
        }
        let (after, item) = value(rest)?;
        items.push(item);
        rest = after;
    }
}

/// `d…e` whose keys must be byte strings in strictly ascending order.
fn dict(input: &[u8]) -> IResult<&[u8], Value> {
    let (mut rest, _) = char('d')(input)?;
    let mut entries = Dict::new();
    let mut previous_key: Option<Vec<u8>> = None;
    loop {
        if let Ok((after, _)) = char::<_, NomError<&[u8]>>('e')(rest) {
            return Ok((after, Value::Dict(entries)));
        }
        let (after_key, key) = byte_string(rest)?;
        if previous_key.as_ref().is_some_and(|previous| previous >= &key) {
            return Err(NomErr::Failure(NomError::new(rest, ErrorKind::Verify)));
        }
        let (after_value, item) = value(after_key)?;
        entries.insert(key.clone(), item);
        previous_key = Some(key);
        rest = after_value;
    }
}
