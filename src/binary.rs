// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Decoding compiled terminfo files
//!
//! The compiled format starts with a header of six little-endian 16-bit
//! fields, followed by the names, boolean, number, string offset and string
//! table sections. Compiled entries are already resolved, so the result never
//! has pending `use` references.

use std::{
    fs::File,
    io::{self, Cursor, Read, Seek},
    path::Path,
};

use crate::terminfo::{Extended, TermInfo};

const MAGIC: i16 = 0x011a;
const HEADER_SIZE: usize = 12;
/// Size of a number or a string offset
const WORD_SIZE: usize = 2;

/// Errors reported when decoding a compiled terminfo file
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The buffer is shorter than the header or than the sizes it declares
    #[error("File too small")]
    SmallFile,
    /// The magic number is invalid or unsupported
    #[error("Wrong magic number for terminfo file")]
    BadMagic,
    /// A string is not terminated by the NUL byte
    #[error("String without final NUL")]
    BadString,
    /// The header declares a negative section size
    #[error("Invalid section size in header")]
    InvalidHeader,
    /// The extended capability section is inconsistent
    #[error("Malformed extended capabilities")]
    BadExtended,
    /// Input/output error
    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Section sizes from the header, all in bytes except the two counts
struct Header {
    names: usize,
    bools: usize,
    num_count: usize,
    str_count: usize,
    table: usize,
}

impl Header {
    fn read(buffer: &[u8]) -> Result<Self, Error> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::SmallFile);
        }
        let mut reader = Cursor::new(buffer);
        let magic = read_le16(&mut reader)?;
        let header = Self {
            names: read_size(&mut reader)?,
            bools: read_size(&mut reader)?,
            num_count: read_size(&mut reader)?,
            str_count: read_size(&mut reader)?,
            table: read_size(&mut reader)?,
        };
        if buffer.len() < header.file_size() {
            return Err(Error::SmallFile);
        }
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(header)
    }

    /// An extra byte follows the booleans if needed for word alignment
    const fn needs_padding(&self) -> bool {
        !(self.names + self.bools).is_multiple_of(2)
    }

    /// Size of the base entry, including the header and the padding byte
    const fn file_size(&self) -> usize {
        HEADER_SIZE
            + self.names
            + self.bools
            + self.needs_padding() as usize
            + WORD_SIZE * (self.num_count + self.str_count)
            + self.table
    }
}

/// Extended capabilities found after the string table
#[derive(Default)]
struct ExtendedCaps {
    bools: Extended<bool>,
    numbers: Extended<i32>,
    strings: Extended<Vec<u8>>,
}

fn read_le16(reader: &mut impl Read) -> Result<i16, Error> {
    let mut buffer = [0u8; 2];
    reader.read_exact(&mut buffer)?;
    Ok(i16::from_le_bytes(buffer))
}

fn read_size(reader: &mut impl Read) -> Result<usize, Error> {
    let size = read_le16(reader)?;
    usize::try_from(size).map_err(|_| Error::InvalidHeader)
}

fn read_slice<'a>(reader: &mut Cursor<&'a [u8]>, size: usize) -> Result<&'a [u8], Error> {
    let start = reader.position() as usize;
    let &buffer = reader.get_ref();
    let slice = buffer.get(start..start + size).ok_or(Error::SmallFile)?;
    reader.set_position((start + size) as u64);
    Ok(slice)
}

/// Skip a byte if needed to ensure 2-byte alignment
fn align_cursor(reader: &mut Cursor<&[u8]>) -> Result<(), Error> {
    if reader.position() & 1 == 1 {
        reader.seek_relative(1)?;
    }
    Ok(())
}

/// Split a section into little-endian 16-bit words
fn words(section: &[u8]) -> impl Iterator<Item = i16> + '_ {
    section
        .chunks_exact(WORD_SIZE)
        .map(|word| i16::from_le_bytes([word[0], word[1]]))
}

/// Convert absent and canceled values (anything negative) to None
fn check_value(value: i16) -> Option<i16> {
    (value > -1).then_some(value)
}

fn check_offset(offset: i16) -> Option<usize> {
    check_value(offset).map(|offset| offset as usize)
}

fn get_string(table: &[u8], offset: usize) -> Result<&[u8], Error> {
    let Some(string_slice) = table.get(offset..) else {
        return Err(Error::BadString);
    };
    match string_slice.iter().position(|c| *c == b'\0') {
        Some(length) => Ok(&string_slice[..length]),
        None => Err(Error::BadString),
    }
}

fn split_names(section: &[u8]) -> Vec<String> {
    if section.is_empty() {
        return vec![];
    }
    let names = match section.iter().position(|c| *c == b'\0') {
        Some(end) => &section[..end],
        None => section,
    };
    names
        .split(|c| *c == b'|')
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

/// Decode a compiled terminfo entry from the supplied buffer
///
/// Extended capabilities are decoded when present. A missing or malformed
/// extended section is not an error, the base capabilities are returned.
pub fn decode(buffer: &[u8]) -> Result<TermInfo, Error> {
    let header = Header::read(buffer)?;
    let mut reader = Cursor::new(buffer);
    reader.set_position(HEADER_SIZE as u64);

    let mut terminfo = TermInfo {
        names: split_names(read_slice(&mut reader, header.names)?),
        ..TermInfo::default()
    };

    let bools = read_slice(&mut reader, header.bools)?;
    terminfo.bools = bools
        .iter()
        .enumerate()
        .filter(|(_, value)| **value == 1)
        .map(|(index, _)| index)
        .collect();

    if header.needs_padding() {
        reader.seek_relative(1)?;
    }

    let numbers = read_slice(&mut reader, WORD_SIZE * header.num_count)?;
    for (index, value) in words(numbers).enumerate() {
        if let Some(value) = check_value(value) {
            terminfo.numbers.insert(index, i32::from(value));
        }
    }

    let str_offsets = read_slice(&mut reader, WORD_SIZE * header.str_count)?;
    let str_table = read_slice(&mut reader, header.table)?;
    for (index, offset) in words(str_offsets).enumerate() {
        let Some(offset) = check_offset(offset) else {
            continue;
        };
        let value = get_string(str_table, offset)?;
        terminfo.strings.insert(index, value.to_vec());
    }

    if (reader.position() as usize) < buffer.len() {
        match decode_extended(&mut reader) {
            Ok(ext) => {
                terminfo.ext_bools = ext.bools;
                terminfo.ext_numbers = ext.numbers;
                terminfo.ext_strings = ext.strings;
            }
            Err(err) => {
                tracing::debug!(
                    name = terminfo.name().unwrap_or_default(),
                    %err,
                    "ignoring extended capabilities"
                );
            }
        }
    }

    Ok(terminfo)
}

/// Read a compiled terminfo entry from a reader
pub fn read_from(mut reader: impl Read) -> Result<TermInfo, Error> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    decode(&buffer)
}

/// Read a compiled terminfo file
pub fn read_file(path: impl AsRef<Path>) -> Result<TermInfo, Error> {
    let file = File::open(path)?;
    read_from(file)
}

fn extended_name(names_table: &[u8], offset: Option<usize>) -> Result<String, Error> {
    let Some(offset) = offset else {
        return Err(Error::BadExtended);
    };
    let name = get_string(names_table, offset)?;
    Ok(String::from_utf8_lossy(name).into_owned())
}

fn decode_extended(reader: &mut Cursor<&[u8]>) -> Result<ExtendedCaps, Error> {
    align_cursor(reader)?;

    let bool_count = read_size(reader)?;
    let num_count = read_size(reader)?;
    let str_count = read_size(reader)?;
    let _str_usage = read_le16(reader)?;
    let table_size = read_size(reader)?;

    let bools = read_slice(reader, bool_count)?;
    align_cursor(reader)?;
    let numbers = read_slice(reader, WORD_SIZE * num_count)?;
    let str_offsets = read_slice(reader, WORD_SIZE * str_count)?;
    let name_count = bool_count + num_count + str_count;
    let name_offsets = read_slice(reader, WORD_SIZE * name_count)?;
    let table = read_slice(reader, table_size)?;

    // String values come first in the table, names follow them.
    let str_offsets: Vec<Option<usize>> = words(str_offsets).map(check_offset).collect();
    let mut names_base = 0;
    for offset in str_offsets.iter().flatten() {
        names_base += get_string(table, *offset)?.len() + 1;
    }
    let Some(names_table) = table.get(names_base..) else {
        return Err(Error::BadExtended);
    };

    let mut name_offsets = words(name_offsets).map(check_offset);
    let mut ext = ExtendedCaps::default();

    for value in bools {
        let name_offset = name_offsets.next().flatten();
        if *value == 1 {
            ext.bools.set(&extended_name(names_table, name_offset)?, true);
        }
    }

    for value in words(numbers) {
        let name_offset = name_offsets.next().flatten();
        if let Some(value) = check_value(value) {
            let name = extended_name(names_table, name_offset)?;
            ext.numbers.set(&name, i32::from(value));
        }
    }

    for offset in str_offsets {
        let name_offset = name_offsets.next().flatten();
        if let Some(offset) = offset {
            let name = extended_name(names_table, name_offset)?;
            ext.strings.set(&name, get_string(table, offset)?.to_vec());
        }
    }

    Ok(ext)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use collection_literals::collection;

    use super::*;

    #[derive(Clone, PartialEq)]
    enum StringValue {
        Present(Vec<u8>),
        Absent,
        Canceled,
    }

    // Allow iteration over `StringValue` by converting it to `Option`
    impl<'a> IntoIterator for &'a StringValue {
        type Item = &'a [u8];
        type IntoIter = std::option::IntoIter<Self::Item>;

        fn into_iter(self) -> Self::IntoIter {
            match self {
                StringValue::Present(value) => Some(value.as_slice()),
                _ => None,
            }
            .into_iter()
        }
    }

    impl<const N: usize> From<&[u8; N]> for StringValue {
        fn from(value: &[u8; N]) -> Self {
            Self::Present(value.to_vec())
        }
    }

    // Size of byte string in memory with terminating NUL
    fn memlen(byte_string: &[u8]) -> u16 {
        byte_string.len() as u16 + 1
    }

    fn push_word(buffer: &mut Vec<u8>, value: i16) {
        buffer.extend_from_slice(&i16::to_le_bytes(value));
    }

    fn push_offset(buffer: &mut Vec<u8>, string: &StringValue, offset: &mut u16) {
        match string {
            StringValue::Present(string) => {
                buffer.extend_from_slice(&u16::to_le_bytes(*offset));
                *offset += memlen(string);
            }
            StringValue::Absent => push_word(buffer, -1),
            StringValue::Canceled => push_word(buffer, -2),
        }
    }

    struct DataSet {
        term_names: Vec<u8>,
        base_booleans: Vec<u8>,
        base_numbers: Vec<i16>,
        base_strings: Vec<StringValue>,
        ext_booleans: Vec<(&'static [u8], u8)>,
        ext_numbers: Vec<(&'static [u8], i16)>,
        ext_strings: Vec<(&'static [u8], StringValue)>,
    }

    impl Default for DataSet {
        fn default() -> Self {
            Self {
                term_names: b"myterm|My Terminal".to_vec(),
                base_booleans: vec![1, 0, 0, 0, 1, 2],
                base_numbers: vec![80, -2, 25, -1, -10, 0],
                base_strings: vec![
                    StringValue::Absent,
                    StringValue::from(b"Hello"),
                    StringValue::Canceled,
                    StringValue::Absent,
                    StringValue::from(b"World!"),
                ],
                ext_booleans: vec![(b"Curly", 1), (b"Italic", 0), (b"Semi-bold", 1)],
                ext_numbers: vec![(b"Shades", 1100), (b"Variants", -1)],
                ext_strings: vec![
                    (b"Colors", StringValue::from(b"A lot")),
                    (b"Luminosity", StringValue::from(b"Positive")),
                    (b"Ideas", StringValue::Absent),
                ],
            }
        }
    }

    fn make_buffer(data_set: &DataSet, add_ext: bool) -> Vec<u8> {
        let str_size = data_set.base_strings.iter().flatten().map(memlen).sum::<u16>();

        let mut buffer = vec![];
        push_word(&mut buffer, MAGIC);
        push_word(&mut buffer, memlen(&data_set.term_names) as i16);
        push_word(&mut buffer, data_set.base_booleans.len() as i16);
        push_word(&mut buffer, data_set.base_numbers.len() as i16);
        push_word(&mut buffer, data_set.base_strings.len() as i16);
        push_word(&mut buffer, str_size as i16);
        buffer.extend_from_slice(&data_set.term_names);
        buffer.push(0);
        buffer.extend_from_slice(&data_set.base_booleans);
        if !buffer.len().is_multiple_of(2) {
            buffer.push(0);
        }
        for number in &data_set.base_numbers {
            push_word(&mut buffer, *number);
        }
        let mut offset = 0;
        for string in &data_set.base_strings {
            push_offset(&mut buffer, string, &mut offset);
        }
        for string in data_set.base_strings.iter().flatten() {
            buffer.extend_from_slice(string);
            buffer.push(0);
        }
        if add_ext {
            if !buffer.len().is_multiple_of(2) {
                buffer.push(0);
            }
            buffer.append(&mut make_ext_buffer(data_set));
        }
        buffer
    }

    fn make_ext_buffer(data_set: &DataSet) -> Vec<u8> {
        let booleans = &data_set.ext_booleans;
        let numbers = &data_set.ext_numbers;
        let strings = &data_set.ext_strings;

        let name_size: u16 = booleans.iter().map(|x| memlen(x.0)).sum::<u16>()
            + numbers.iter().map(|x| memlen(x.0)).sum::<u16>()
            + strings.iter().map(|x| memlen(x.0)).sum::<u16>();
        let string_value_size: u16 = strings.iter().flat_map(|x| &x.1).map(memlen).sum();

        let mut buffer = vec![];

        // extended header, boolean values, align(2), number values, string value offsets,
        // name offsets, string values, boolean names, number names, string names.
        push_word(&mut buffer, booleans.len() as i16);
        push_word(&mut buffer, numbers.len() as i16);
        push_word(&mut buffer, strings.len() as i16);
        push_word(&mut buffer, 0);
        push_word(&mut buffer, (name_size + string_value_size) as i16);

        for boolean in booleans {
            buffer.push(boolean.1);
        }
        if !buffer.len().is_multiple_of(2) {
            buffer.push(0);
        }
        for number in numbers {
            push_word(&mut buffer, number.1);
        }
        let mut offset = 0;
        for string in strings {
            push_offset(&mut buffer, &string.1, &mut offset);
        }

        offset = 0;
        let names = booleans
            .iter()
            .map(|x| x.0)
            .chain(numbers.iter().map(|x| x.0))
            .chain(strings.iter().map(|x| x.0));
        for name in names.clone() {
            buffer.extend_from_slice(&u16::to_le_bytes(offset));
            offset += memlen(name);
        }

        for string in strings.iter().flat_map(|x| &x.1) {
            buffer.extend_from_slice(string);
            buffer.push(0);
        }
        for name in names {
            buffer.extend_from_slice(name);
            buffer.push(0);
        }

        buffer
    }

    fn assert_base(terminfo: &TermInfo) {
        assert_eq!(terminfo.names, vec!["myterm", "My Terminal"]);
        assert_eq!(terminfo.bools, collection!(0, 4));
        assert_eq!(
            terminfo.numbers,
            collection!(
                0 => 80,
                2 => 25,
                5 => 0,
            )
        );
        assert_eq!(
            terminfo.strings,
            collection!(
                1 => b"Hello".to_vec(),
                4 => b"World!".to_vec(),
            )
        );
        assert!(terminfo.uses.is_empty());
    }

    #[test]
    fn empty_buffer() {
        assert!(matches!(decode(b"").unwrap_err(), Error::SmallFile));
    }

    #[test]
    fn truncated_header() {
        let buffer = make_buffer(&DataSet::default(), false);
        let terminfo = decode(&buffer[..HEADER_SIZE - 1]);
        assert!(matches!(terminfo.unwrap_err(), Error::SmallFile));
    }

    #[test]
    fn base() {
        let buffer = make_buffer(&DataSet::default(), false);
        let terminfo = decode(&buffer).unwrap();
        assert_base(&terminfo);
        assert!(terminfo.ext_bools.is_empty());
        assert!(terminfo.ext_numbers.is_empty());
        assert!(terminfo.ext_strings.is_empty());
    }

    #[test]
    fn base_without_padding() {
        let data_set = DataSet {
            base_booleans: vec![1, 0, 0, 0, 1],
            ..Default::default()
        };
        let buffer = make_buffer(&data_set, false);
        assert_eq!(buffer[2..4], [19, 0]);
        let terminfo = decode(&buffer).unwrap();
        assert_base(&terminfo);
    }

    #[test]
    fn empty_names() {
        let buffer = make_buffer(&DataSet::default(), false);
        // Make the names section hold only the NUL byte.
        let names_end = HEADER_SIZE + buffer[2] as usize;
        let mut buffer = [&buffer[..HEADER_SIZE], &buffer[names_end - 1..]].concat();
        buffer[2] = 1;
        let terminfo = decode(&buffer).unwrap();
        assert_eq!(terminfo.names, vec![String::new()]);
    }

    #[test]
    fn bad_magic() {
        let mut buffer = make_buffer(&DataSet::default(), false);
        buffer[1] = 3;
        assert!(matches!(decode(&buffer).unwrap_err(), Error::BadMagic));
    }

    #[test]
    fn size_checked_before_magic() {
        let mut buffer = [0u8; HEADER_SIZE];
        buffer[..2].copy_from_slice(&i16::to_le_bytes(0x021b));
        buffer[2] = 100;
        assert!(matches!(decode(&buffer).unwrap_err(), Error::SmallFile));

        buffer[..2].copy_from_slice(&MAGIC.to_le_bytes());
        assert!(matches!(decode(&buffer).unwrap_err(), Error::SmallFile));
    }

    #[test]
    fn base_truncated() {
        let mut buffer = make_buffer(&DataSet::default(), false);
        buffer.pop();
        assert!(matches!(decode(&buffer).unwrap_err(), Error::SmallFile));
    }

    #[test]
    fn negative_section_size() {
        let mut buffer = make_buffer(&DataSet::default(), false);
        buffer[8..10].copy_from_slice(&i16::to_le_bytes(-5));
        assert!(matches!(decode(&buffer).unwrap_err(), Error::InvalidHeader));
    }

    #[test]
    fn unterminated_string() {
        let mut buffer = make_buffer(&DataSet::default(), false);
        let buffer_size = buffer.len();
        buffer[buffer_size - 1] = b'!';
        assert!(matches!(decode(&buffer).unwrap_err(), Error::BadString));
    }

    #[test]
    fn string_offset_past_table() {
        let data_set = DataSet::default();
        let mut buffer = make_buffer(&data_set, false);
        let table_size = data_set.base_strings.iter().flatten().map(memlen).sum::<u16>();
        // Point the offset of the second string at the end of the table.
        let offsets_start = buffer.len() - table_size as usize - 2 * data_set.base_strings.len();
        buffer[offsets_start + 2..offsets_start + 4].copy_from_slice(&table_size.to_le_bytes());
        assert!(matches!(decode(&buffer).unwrap_err(), Error::BadString));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut buffer = make_buffer(&DataSet::default(), false);
        buffer.extend_from_slice(&[0xff; 3]);
        let terminfo = decode(&buffer).unwrap();
        assert_base(&terminfo);
        assert!(terminfo.ext_bools.is_empty());
    }

    #[test]
    fn extended() {
        let buffer = make_buffer(&DataSet::default(), true);
        let terminfo = decode(&buffer).unwrap();
        assert_base(&terminfo);
        assert_eq!(
            terminfo.ext_bools.iter().collect::<Vec<_>>(),
            vec![("Curly", &true), ("Semi-bold", &true)]
        );
        assert_eq!(
            terminfo.ext_numbers.iter().collect::<Vec<_>>(),
            vec![("Shades", &1100)]
        );
        assert_eq!(
            terminfo.ext_strings.iter().collect::<Vec<_>>(),
            vec![
                ("Colors", &b"A lot".to_vec()),
                ("Luminosity", &b"Positive".to_vec()),
            ]
        );
    }

    #[test]
    fn truncated_extended_keeps_base() {
        let mut buffer = make_buffer(&DataSet::default(), true);
        buffer.truncate(buffer.len() - 4);
        let terminfo = decode(&buffer).unwrap();
        assert_base(&terminfo);
        assert!(terminfo.ext_bools.is_empty());
        assert!(terminfo.ext_numbers.is_empty());
        assert!(terminfo.ext_strings.is_empty());
    }

    #[test]
    fn from_file() {
        let buffer = make_buffer(&DataSet::default(), true);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&buffer).unwrap();
        let terminfo = read_file(file.path()).unwrap();
        assert_base(&terminfo);
        assert_eq!(terminfo.ext_strings.len(), 2);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(dir.path().join("no-such-terminal")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn from_reader() {
        let buffer = make_buffer(&DataSet::default(), false);
        let terminfo = read_from(buffer.as_slice()).unwrap();
        assert_base(&terminfo);
    }
}
