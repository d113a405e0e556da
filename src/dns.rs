//! DNS message parsing and construction.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub const HEADER_LEN: usize = 12;

const CLASS_IN: u16 = 1;
const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;

/// Upper bound on compression pointers followed while decoding one name.
const MAX_POINTER_HOPS: usize = 16;
const MAX_WIRE_NAME_LEN: usize = 255;

/// Errors produced while decoding a DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message ends before the {0} section is complete")]
    Truncated(&'static str),
    #[error("compression pointers loop or nest too deeply")]
    PointerLoop,
    #[error("invalid label length byte {0:#04x}")]
    BadLabel(u8),
    #[error("encoded name exceeds 255 bytes")]
    NameTooLong,
    #[error("label is not valid UTF-8")]
    InvalidUtf8,
    #[error("unsupported question type {0}")]
    UnsupportedType(u16),
    #[error("{rtype} record carries {len} bytes of rdata")]
    BadRdata { rtype: RecordType, len: usize },
}

/// Record types the tracer can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Mx,
    Txt,
    Aaaa,
}

impl RecordType {
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(RecordType::A),
            2 => Some(RecordType::Ns),
            5 => Some(RecordType::Cname),
            6 => Some(RecordType::Soa),
            15 => Some(RecordType::Mx),
            16 => Some(RecordType::Txt),
            28 => Some(RecordType::Aaaa),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Ns => "NS",
            RecordType::Cname => "CNAME",
            RecordType::Soa => "SOA",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported record type '{0}'")]
pub struct UnknownRecordType(pub String);

impl FromStr for RecordType {
    type Err = UnknownRecordType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::Ns),
            "CNAME" => Ok(RecordType::Cname),
            "SOA" => Ok(RecordType::Soa),
            "MX" => Ok(RecordType::Mx),
            "TXT" => Ok(RecordType::Txt),
            "AAAA" => Ok(RecordType::Aaaa),
            _ => Err(UnknownRecordType(s.to_string())),
        }
    }
}

/// Response code carried in the low four bits of the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl Rcode {
    pub fn code(self) -> u8 {
        match self {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::Other(code) => code,
        }
    }
}

impl From<u8> for Rcode {
    fn from(code: u8) -> Self {
        match code {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            other => Rcode::Other(other),
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => f.write_str("NOERROR"),
            Rcode::FormErr => f.write_str("FORMERR"),
            Rcode::ServFail => f.write_str("SERVFAIL"),
            Rcode::NxDomain => f.write_str("NXDOMAIN"),
            Rcode::NotImp => f.write_str("NOTIMP"),
            Rcode::Refused => f.write_str("REFUSED"),
            Rcode::Other(code) => write!(f, "RCODE{code}"),
        }
    }
}

/// Read the transaction ID of a raw message.
pub fn message_id(data: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*data.first()?, *data.get(1)?]))
}

/// Whether a raw message has the TC (truncated) bit set.
///
/// Checked before a full parse, since a truncated answer section may not
/// decode at all.
pub fn is_truncated(data: &[u8]) -> bool {
    data.len() >= HEADER_LEN && u16::from_be_bytes([data[2], data[3]]) & FLAG_TC != 0
}

/// A single-question DNS query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub id: u16,
    pub name: String,
    pub record_type: RecordType,
}

impl Query {
    /// Create a recursion-desired query for `name`.
    pub fn new(id: u16, name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            id,
            name: name.into(),
            record_type,
        }
    }

    /// Parse a query from raw bytes.
    ///
    /// Only the first question is read. Unknown question types are rejected.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::Truncated("header"));
        }

        let id = read_u16(data, 0, "header")?;
        let (name, pos) = read_name(data, HEADER_LEN)?;
        let qtype = read_u16(data, pos, "question")?;
        read_u16(data, pos + 2, "question")?;

        let record_type =
            RecordType::from_code(qtype).ok_or(ParseError::UnsupportedType(qtype))?;

        Ok(Self {
            id,
            name,
            record_type,
        })
    }

    /// Encode the query to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + self.name.len() + 6);

        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&FLAG_RD.to_be_bytes());
        data.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        data.extend_from_slice(&[0x00, 0x00]); // ANCOUNT
        data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
        data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

        encode_name(&mut data, &self.name);
        data.extend_from_slice(&self.record_type.code().to_be_bytes());
        data.extend_from_slice(&CLASS_IN.to_be_bytes());

        data
    }
}

/// A DNS question section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

/// Decoded record data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Ns(String),
    Mx { preference: u16, exchange: String },
    Txt(Vec<String>),
    Other(Vec<u8>),
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "{addr}"),
            RData::Aaaa(addr) => write!(f, "{addr}"),
            RData::Cname(name) | RData::Ns(name) => f.write_str(name),
            RData::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            RData::Txt(strings) => f.write_str(&strings.concat()),
            RData::Other(bytes) => {
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A DNS resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub data: RData,
}

impl Record {
    pub fn a(name: impl Into<String>, addr: Ipv4Addr, ttl: u32) -> Self {
        Self::new(name, RecordType::A, ttl, RData::A(addr))
    }

    pub fn new(name: impl Into<String>, rtype: RecordType, ttl: u32, data: RData) -> Self {
        Self {
            name: name.into(),
            rtype: rtype.code(),
            class: CLASS_IN,
            ttl,
            data,
        }
    }

    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_code(self.rtype)
    }
}

/// A DNS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
}

impl Response {
    /// Create an empty reply to `query` carrying `rcode`.
    pub fn reply_to(query: &Query, rcode: Rcode) -> Self {
        Self {
            id: query.id,
            flags: FLAG_QR | FLAG_RD | FLAG_RA | rcode.code() as u16,
            questions: vec![Question {
                name: query.name.clone(),
                qtype: query.record_type.code(),
                qclass: CLASS_IN,
            }],
            answers: Vec::new(),
        }
    }

    pub fn with_answer(mut self, record: Record) -> Self {
        self.answers.push(record);
        self
    }

    pub fn truncated(mut self) -> Self {
        self.flags |= FLAG_TC;
        self
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from((self.flags & 0x000F) as u8)
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    /// Parse a response from raw bytes.
    ///
    /// The authority and additional sections are not decoded.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::Truncated("header"));
        }

        let id = read_u16(data, 0, "header")?;
        let flags = read_u16(data, 2, "header")?;
        let qdcount = read_u16(data, 4, "header")? as usize;
        let ancount = read_u16(data, 6, "header")? as usize;

        let mut pos = HEADER_LEN;

        let mut questions = Vec::with_capacity(qdcount);
        for _ in 0..qdcount {
            let (name, next) = read_name(data, pos)?;
            let qtype = read_u16(data, next, "question")?;
            let qclass = read_u16(data, next + 2, "question")?;
            questions.push(Question {
                name,
                qtype,
                qclass,
            });
            pos = next + 4;
        }

        let mut answers = Vec::with_capacity(ancount);
        for _ in 0..ancount {
            let (name, next) = read_name(data, pos)?;
            let rtype = read_u16(data, next, "answer")?;
            let class = read_u16(data, next + 2, "answer")?;
            let ttl = read_u32(data, next + 4, "answer")?;
            let rdlength = read_u16(data, next + 8, "answer")? as usize;
            let rdata_start = next + 10;
            if rdata_start + rdlength > data.len() {
                return Err(ParseError::Truncated("answer"));
            }

            let rdata = decode_rdata(data, rdata_start, rdlength, rtype)?;
            answers.push(Record {
                name,
                rtype,
                class,
                ttl,
                data: rdata,
            });
            pos = rdata_start + rdlength;
        }

        Ok(Self {
            id,
            flags,
            questions,
            answers,
        })
    }

    /// Encode the response to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);

        // Header
        data.extend_from_slice(&self.id.to_be_bytes());
        data.extend_from_slice(&self.flags.to_be_bytes());
        data.extend_from_slice(&(self.questions.len() as u16).to_be_bytes());
        data.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
        data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

        for q in &self.questions {
            encode_name(&mut data, &q.name);
            data.extend_from_slice(&q.qtype.to_be_bytes());
            data.extend_from_slice(&q.qclass.to_be_bytes());
        }

        for a in &self.answers {
            // Use compression pointer if this is the first question's name
            if !self.questions.is_empty() && a.name == self.questions[0].name {
                data.extend_from_slice(&[0xC0, 0x0C]);
            } else {
                encode_name(&mut data, &a.name);
            }
            data.extend_from_slice(&a.rtype.to_be_bytes());
            data.extend_from_slice(&a.class.to_be_bytes());
            data.extend_from_slice(&a.ttl.to_be_bytes());

            let rdata = encode_rdata(&a.data);
            data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            data.extend_from_slice(&rdata);
        }

        data
    }
}

fn encode_name(buf: &mut Vec<u8>, name: &str) {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

fn encode_rdata(data: &RData) -> Vec<u8> {
    let mut buf = Vec::new();
    match data {
        RData::A(addr) => buf.extend_from_slice(&addr.octets()),
        RData::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
        RData::Cname(name) | RData::Ns(name) => encode_name(&mut buf, name),
        RData::Mx {
            preference,
            exchange,
        } => {
            buf.extend_from_slice(&preference.to_be_bytes());
            encode_name(&mut buf, exchange);
        }
        RData::Txt(strings) => {
            for s in strings {
                let bytes = &s.as_bytes()[..s.len().min(255)];
                buf.push(bytes.len() as u8);
                buf.extend_from_slice(bytes);
            }
        }
        RData::Other(bytes) => buf.extend_from_slice(bytes),
    }
    buf
}

fn decode_rdata(data: &[u8], start: usize, len: usize, rtype: u16) -> Result<RData, ParseError> {
    let rdata = &data[start..start + len];
    let bad = |rtype| ParseError::BadRdata { rtype, len };

    let decoded = match RecordType::from_code(rtype) {
        Some(RecordType::A) => {
            let octets: [u8; 4] = rdata.try_into().map_err(|_| bad(RecordType::A))?;
            RData::A(Ipv4Addr::from(octets))
        }
        Some(RecordType::Aaaa) => {
            let octets: [u8; 16] = rdata.try_into().map_err(|_| bad(RecordType::Aaaa))?;
            RData::Aaaa(Ipv6Addr::from(octets))
        }
        Some(RecordType::Cname) => RData::Cname(read_name(data, start)?.0),
        Some(RecordType::Ns) => RData::Ns(read_name(data, start)?.0),
        Some(RecordType::Mx) => {
            if len < 3 {
                return Err(bad(RecordType::Mx));
            }
            RData::Mx {
                preference: read_u16(data, start, "answer")?,
                exchange: read_name(data, start + 2)?.0,
            }
        }
        Some(RecordType::Txt) => {
            let mut strings = Vec::new();
            let mut pos = 0;
            while pos < rdata.len() {
                let slen = rdata[pos] as usize;
                let chunk = rdata
                    .get(pos + 1..pos + 1 + slen)
                    .ok_or_else(|| bad(RecordType::Txt))?;
                strings.push(String::from_utf8_lossy(chunk).into_owned());
                pos += 1 + slen;
            }
            RData::Txt(strings)
        }
        Some(RecordType::Soa) | None => RData::Other(rdata.to_vec()),
    };

    Ok(decoded)
}

/// Decode a possibly compressed name starting at `pos`.
///
/// Returns the lowercased dotted name and the offset just past the name in
/// the original byte stream.
fn read_name(data: &[u8], mut pos: usize) -> Result<(String, usize), ParseError> {
    let mut labels: Vec<String> = Vec::new();
    let mut end = None;
    let mut hops = 0;
    let mut wire_len = 0;

    loop {
        let len = *data.get(pos).ok_or(ParseError::Truncated("name"))?;
        match len {
            0 => {
                end.get_or_insert(pos + 1);
                break;
            }
            l if l & 0xC0 == 0xC0 => {
                let low = *data.get(pos + 1).ok_or(ParseError::Truncated("name"))?;
                end.get_or_insert(pos + 2);
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(ParseError::PointerLoop);
                }
                pos = (((l & 0x3F) as usize) << 8) | low as usize;
            }
            l if l > 63 => return Err(ParseError::BadLabel(l)),
            l => {
                let l = l as usize;
                let label = data
                    .get(pos + 1..pos + 1 + l)
                    .ok_or(ParseError::Truncated("name"))?;
                let label = std::str::from_utf8(label).map_err(|_| ParseError::InvalidUtf8)?;
                wire_len += l + 1;
                if wire_len > MAX_WIRE_NAME_LEN {
                    return Err(ParseError::NameTooLong);
                }
                labels.push(label.to_ascii_lowercase());
                pos += 1 + l;
            }
        }
    }

    Ok((labels.join("."), end.unwrap_or(pos)))
}

fn read_u16(data: &[u8], pos: usize, section: &'static str) -> Result<u16, ParseError> {
    match data.get(pos..pos + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(ParseError::Truncated(section)),
    }
}

fn read_u32(data: &[u8], pos: usize, section: &'static str) -> Result<u32, ParseError> {
    match data.get(pos..pos + 4) {
        Some(b) => Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ParseError::Truncated(section)),
    }
}
