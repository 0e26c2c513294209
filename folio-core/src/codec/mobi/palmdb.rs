//! PalmDB container and the MOBI record 0 layout

use super::exth::{self, TextEncoding};
use crate::error::{ParseError, WriteError};
use crate::types::ExthRecord;

const HEADER_LEN: usize = 78;
const NAME_LEN: usize = 32;
const ENTRY_LEN: usize = 8;

/// Offsets inside record 0 (PalmDOC header first, MOBI header at 16)
const MOBI_START: usize = 16;
const ENCODING: usize = 28;
const FULL_NAME_OFFSET: usize = 84;
const FULL_NAME_LENGTH: usize = 88;
const FIRST_IMAGE: usize = 108;
const EXTH_FLAGS: usize = 128;
const EXTH_PRESENT: u32 = 0x40;

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn write_u32(data: &mut [u8], at: usize, value: u32) {
    if let Some(slot) = data.get_mut(at..at + 4) {
        slot.copy_from_slice(&value.to_be_bytes());
    }
}

/// A PalmDB file split into its header, record list and records
#[derive(Debug, Clone)]
pub(crate) struct PalmDb {
    header: Vec<u8>,
    /// Attribute byte and unique id of each record entry
    entries: Vec<[u8; 4]>,
    /// Bytes between the record list and the first record
    gap: Vec<u8>,
    pub records: Vec<Vec<u8>>,
}

impl PalmDb {
    pub(crate) fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::InvalidMobi("file shorter than a PalmDB header".to_string()));
        }
        let count = u16::from_be_bytes([data[76], data[77]]) as usize;
        let list_end = HEADER_LEN + count * ENTRY_LEN;
        if count == 0 || data.len() < list_end {
            return Err(ParseError::InvalidMobi(format!("bad record count {}", count)));
        }

        let mut offsets = Vec::with_capacity(count);
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = HEADER_LEN + i * ENTRY_LEN;
            let offset = read_u32(data, at).unwrap_or_default() as usize;
            if offset > data.len() || offsets.last().map(|prev| offset < *prev).unwrap_or(false) {
                return Err(ParseError::InvalidMobi(format!("record {} has offset {}", i, offset)));
            }
            offsets.push(offset);
            entries.push([data[at + 4], data[at + 5], data[at + 6], data[at + 7]]);
        }

        let first = offsets[0];
        let gap = if first >= list_end {
            data[list_end..first].to_vec()
        } else {
            return Err(ParseError::InvalidMobi("record 0 overlaps the record list".to_string()));
        };

        let records = offsets
            .iter()
            .enumerate()
            .map(|(i, start)| {
                let end = offsets.get(i + 1).copied().unwrap_or(data.len());
                data[*start..end].to_vec()
            })
            .collect();

        Ok(Self {
            header: data[..HEADER_LEN].to_vec(),
            entries,
            gap,
            records,
        })
    }

    pub(crate) fn name(&self) -> String {
        let raw = &self.header[..NAME_LEN];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Type and creator, e.g. `BOOKMOBI`
    pub(crate) fn type_creator(&self) -> &[u8] {
        &self.header[60..68]
    }

    /// Whether the database is a MOBI book (`BOOKMOBI`) or a PalmDOC (`TEXtREAd`)
    pub(crate) fn is_book(&self) -> bool {
        matches!(self.type_creator(), b"BOOKMOBI" | b"TEXtREAd")
    }

    /// Store up to 31 bytes of `name`, NUL-padded
    pub(crate) fn set_name(&mut self, name: &str) {
        let mut bytes: Vec<u8> = name
            .chars()
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'_' })
            .take(NAME_LEN - 1)
            .collect();
        bytes.resize(NAME_LEN, 0);
        self.header[..NAME_LEN].copy_from_slice(&bytes);
    }

    /// Serialize, recomputing every record offset
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let total: usize = self.records.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(
            HEADER_LEN + self.records.len() * ENTRY_LEN + self.gap.len() + total,
        );
        out.extend_from_slice(&self.header);
        out[76..78].copy_from_slice(&(self.records.len() as u16).to_be_bytes());

        let mut offset = HEADER_LEN + self.records.len() * ENTRY_LEN + self.gap.len();
        for (record, entry) in self.records.iter().zip(&self.entries) {
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.extend_from_slice(entry);
            offset += record.len();
        }
        out.extend_from_slice(&self.gap);
        for record in &self.records {
            out.extend_from_slice(record);
        }
        out
    }
}

/// The parts of record 0 the metadata model needs
#[derive(Debug, Clone)]
pub(crate) struct MobiHeader {
    header_len: usize,
    pub encoding: TextEncoding,
    pub full_name: String,
    pub first_image: Option<u32>,
    pub exth: Vec<ExthRecord>,
}

impl MobiHeader {
    pub(crate) fn parse(record0: &[u8]) -> Result<Self, ParseError> {
        if record0.get(MOBI_START..MOBI_START + 4) != Some(b"MOBI".as_slice()) {
            return Err(ParseError::InvalidMobi("MOBI header not found".to_string()));
        }
        let header_len = read_u32(record0, MOBI_START + 4)
            .ok_or_else(|| ParseError::InvalidMobi("truncated MOBI header".to_string()))?
            as usize;
        let header_end = MOBI_START + header_len;
        if header_end > record0.len() {
            return Err(ParseError::InvalidMobi(format!(
                "MOBI header length {} exceeds record 0",
                header_len
            )));
        }

        // Only read fields the declared header length covers
        let field = |at: usize| if at + 4 <= header_end { read_u32(record0, at) } else { None };

        let encoding = TextEncoding::from_code(field(ENCODING).unwrap_or(1252));
        let full_name = match (field(FULL_NAME_OFFSET), field(FULL_NAME_LENGTH)) {
            (Some(offset), Some(len)) => record0
                .get(offset as usize..offset as usize + len as usize)
                .map(|bytes| encoding.decode(bytes))
                .unwrap_or_default(),
            _ => String::new(),
        };
        let first_image = field(FIRST_IMAGE).filter(|idx| *idx != u32::MAX);

        let has_exth = field(EXTH_FLAGS).map(|f| f & EXTH_PRESENT != 0).unwrap_or(false);
        let exth = if has_exth && record0[header_end..].starts_with(b"EXTH") {
            exth::parse_exth(&record0[header_end..])?
        } else {
            Vec::new()
        };

        Ok(Self {
            header_len,
            encoding,
            full_name,
            first_image,
            exth,
        })
    }

    /// Record index of the cover image
    pub(crate) fn cover_record(&self) -> Option<usize> {
        let offset = self
            .exth
            .iter()
            .find(|r| r.record_type == exth::COVER_OFFSET)
            .and_then(|r| read_u32(&r.data, 0))?;
        let first = self.first_image?;
        first.checked_add(offset).map(|idx| idx as usize)
    }

    /// Rebuild record 0 with a new EXTH list and full name
    ///
    /// The PalmDOC and MOBI headers are kept; everything after them is
    /// regenerated and the full name offset/length are updated. A header too
    /// short to hold the full name slots cannot be rebuilt.
    pub(crate) fn rebuild(
        &self,
        record0: &[u8],
        records: &[ExthRecord],
        full_name: &str,
    ) -> Result<Vec<u8>, WriteError> {
        let header_end = MOBI_START + self.header_len;
        if header_end < FULL_NAME_LENGTH + 4 || header_end > record0.len() {
            return Err(WriteError::EncodingFailed(format!(
                "MOBI header of {} bytes has no room for the full name",
                self.header_len
            )));
        }
        let mut out = record0[..header_end].to_vec();

        let mut flags = read_u32(&out, EXTH_FLAGS).unwrap_or_default();
        if records.is_empty() {
            flags &= !EXTH_PRESENT;
        } else {
            flags |= EXTH_PRESENT;
        }
        if EXTH_FLAGS + 4 <= header_end {
            write_u32(&mut out, EXTH_FLAGS, flags);
        }

        if !records.is_empty() {
            out.extend_from_slice(&exth::encode_exth(records));
        }

        let name = self.encoding.encode(full_name);
        let name_offset = out.len();
        out.extend_from_slice(&name);
        out.extend_from_slice(&[0, 0]);
        while out.len() % 4 != 0 {
            out.push(0);
        }

        write_u32(&mut out, FULL_NAME_OFFSET, name_offset as u32);
        write_u32(&mut out, FULL_NAME_LENGTH, name.len() as u32);
        Ok(out)
    }
}
