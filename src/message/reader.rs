// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the [`Reader`] type to read on-the-wire DNS
//! messages, along with the decoding entry points used by the
//! forwarder.

use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::net::Ipv4Addr;

use super::constants::*;
use crate::name;
use crate::rr::{Class, Type};

////////////////////////////////////////////////////////////////////////
// DECODING ENTRY POINTS                                              //
////////////////////////////////////////////////////////////////////////

/// Decodes the question of a received query.
///
/// The QNAME is walked label by label starting right after the header.
/// On success, this returns the QNAME in presentation format along with
/// the raw octets of the whole question (QNAME, QTYPE, and QCLASS),
/// which are echoed back in synthesized responses.
pub fn decode_question(query: &[u8]) -> Result<(String, &[u8])> {
    let reader = Reader::try_from(query)?;
    if reader.qdcount() == 0 {
        return Err(Error::NoQuestion);
    }
    let (qname, qname_len) =
        name::decode_uncompressed(query, HEADER_SIZE).map_err(Error::InvalidName)?;
    let question_end = HEADER_SIZE + qname_len + 4;
    let question = query
        .get(HEADER_SIZE..question_end)
        .ok_or(Error::UnexpectedEomInField)?;
    Ok((qname, question))
}

/// Decodes a possibly compressed name at `offset` in `message`,
/// returning the name and the number of octets it occupies at `offset`.
pub fn decode_name_at(message: &[u8], offset: usize) -> Result<(String, usize)> {
    name::decode_compressed(message, offset).map_err(Error::InvalidName)
}

/// Extracts the records of the answer section of `response`.
///
/// The question section is skipped according to the header's QDCOUNT,
/// and then ANCOUNT records are read. Records of any type are returned;
/// see [`Record::ipv4_addr`] for picking out address records.
pub fn extract_answers(response: &[u8]) -> Result<Vec<Record<'_>>> {
    let mut reader = Reader::try_from(response)?;
    for _ in 0..reader.qdcount() {
        reader.read_question()?;
    }
    (0..reader.ancount()).map(|_| reader.read_rr()).collect()
}

////////////////////////////////////////////////////////////////////////
// READER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message that enables
/// reading the message data.
///
/// A `Reader` is constructed using its [`TryFrom`] implementation. Any
/// underlying buffer for a reader must contain at least a full DNS
/// message header of 12 octets; otherwise the construction will fail.
///
/// Header fields can be read at any time. Questions and records are
/// read using a cursor, which is initially set to the first octet after
/// the header; [`Reader::read_question`] and [`Reader::read_rr`] must be
/// called sequentially, in the order the sections appear.
#[derive(Eq, PartialEq)]
pub struct Reader<'a> {
    octets: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Returns the 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_END].try_into().unwrap())
    }

    /// Returns whether the QR (query response) bit is set.
    pub fn qr(&self) -> bool {
        (self.octets[QR_BYTE] & QR_MASK) != 0
    }

    /// Returns the RCODE of the message.
    pub fn rcode(&self) -> u8 {
        self.octets[RCODE_BYTE] & RCODE_MASK
    }

    /// Returns the number of questions in the message.
    pub fn qdcount(&self) -> u16 {
        u16::from_be_bytes(self.octets[QDCOUNT_START..QDCOUNT_END].try_into().unwrap())
    }

    /// Returns the number of answers in the message.
    pub fn ancount(&self) -> u16 {
        u16::from_be_bytes(self.octets[ANCOUNT_START..ANCOUNT_END].try_into().unwrap())
    }

    /// Reads a [`Question`] starting at the current cursor. The QNAME
    /// may be compressed.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_question(&mut self) -> Result<Question> {
        let (qname, qname_len) = decode_name_at(self.octets, self.cursor)?;
        let qname_end = self.cursor + qname_len;
        let qtype = read_u16(self.octets, qname_end)?.into();
        let qclass = read_u16(self.octets, qname_end + 2)?.into();
        self.cursor = qname_end + 4;
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    /// Reads a resource record at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_rr(&mut self) -> Result<Record<'a>> {
        let (owner, owner_len) = decode_name_at(self.octets, self.cursor)?;
        let owner_end = self.cursor + owner_len;
        let rr_type = read_u16(self.octets, owner_end)?.into();
        let class = read_u16(self.octets, owner_end + 2)?.into();
        let ttl = read_u32(self.octets, owner_end + 4)?;
        let rdlength = read_u16(self.octets, owner_end + 8)? as usize;
        let rdata_start = owner_end + 10;
        let rdata = self
            .octets
            .get(rdata_start..rdata_start + rdlength)
            .ok_or(Error::UnexpectedEomInField)?;
        self.cursor = rdata_start + rdlength;
        Ok(Record {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
        })
    }

    /// Returns whether the `Reader`'s cursor has reached the end of the
    /// message.
    pub fn at_eom(&self) -> bool {
        self.cursor >= self.octets.len()
    }
}

impl<'a> TryFrom<&'a [u8]> for Reader<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        if octets.len() >= HEADER_SIZE {
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
            })
        } else {
            Err(Error::HeaderTooShort)
        }
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id())
            .field("qr", &self.qr())
            .field("rcode", &self.rcode())
            .field("qdcount", &self.qdcount())
            .field("ancount", &self.ancount())
            .field("cursor", &self.cursor)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS FOR READING MULTI-BYTE INTEGERS                            //
////////////////////////////////////////////////////////////////////////

/// Reads a network-byte-order `u16` at `index` of `octets`.
fn read_u16(octets: &[u8], index: usize) -> Result<u16> {
    let array = octets
        .get(index..index + 2)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u16::from_be_bytes(array))
}

/// Reads a network-byte-order `u32` at `index` of `octets`.
fn read_u32(octets: &[u8], index: usize) -> Result<u32> {
    let array = octets
        .get(index..index + 4)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u32::from_be_bytes(array))
}

////////////////////////////////////////////////////////////////////////
// QUESTION AND RECORD STRUCTURES                                     //
////////////////////////////////////////////////////////////////////////

/// A question as returned by [`Reader::read_question`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Question {
    pub qname: String,
    pub qtype: Type,
    pub qclass: Class,
}

/// A resource record as returned by [`Reader::read_rr`]. The RDATA is
/// borrowed from the message and is not interpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record<'a> {
    pub owner: String,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: u32,
    pub rdata: &'a [u8],
}

impl Record<'_> {
    /// Returns the address of an IN A record, or `None` if this is not
    /// an address record (or its RDATA is not four octets long).
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        if self.rr_type == Type::A && self.class == Class::IN {
            let octets: [u8; 4] = self.rdata.try_into().ok()?;
            Some(Ipv4Addr::from(octets))
        } else {
            None
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a message is malformed: its question or one
/// of its records could not be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEomInField,
    InvalidName(name::Error),
    NoQuestion,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::HeaderTooShort => f.write_str("header too short"),
            Self::UnexpectedEomInField => f.write_str("unexpected end of message in field"),
            Self::InvalidName(err) => write!(f, "invalid name: {}", err),
            Self::NoQuestion => f.write_str("message has no question"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Reader`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    /// This is a reply to a query for example.com. IN NS to a recursive
    /// server, made on January 7, 2022.
    const EXAMPLE_COM_NS_MESSAGE: &[u8] =
        b"\xe2\xd7\x81\x80\x00\x01\x00\x02\x00\x00\x00\x01\x07\x65\x78\x61\
          \x6d\x70\x6c\x65\x03\x63\x6f\x6d\x00\x00\x02\x00\x01\xc0\x0c\x00\
          \x02\x00\x01\x00\x01\x50\xa2\x00\x14\x01\x61\x0c\x69\x61\x6e\x61\
          \x2d\x73\x65\x72\x76\x65\x72\x73\x03\x6e\x65\x74\x00\xc0\x0c\x00\
          \x02\x00\x01\x00\x01\x50\xa2\x00\x04\x01\x62\xc0\x2b\x00\x00\x29\
          \x10\x00\x00\x00\x00\x00\x00\x00";

    #[test]
    fn reader_works() {
        let mut reader = Reader::try_from(EXAMPLE_COM_NS_MESSAGE).unwrap();
        assert_eq!(reader.id(), 0xe2d7);
        assert!(reader.qr());
        assert_eq!(reader.rcode(), 0);
        assert_eq!(reader.qdcount(), 1);
        assert_eq!(reader.ancount(), 2);

        let question = reader.read_question().unwrap();
        assert_eq!(question.qname, "example.com.");
        assert_eq!(question.qtype, Type::NS);
        assert_eq!(question.qclass, Class::IN);

        let answer_1 = reader.read_rr().unwrap();
        assert_eq!(answer_1.owner, "example.com.");
        assert_eq!(answer_1.rr_type, Type::NS);
        assert_eq!(answer_1.ttl, 86178);
        assert_eq!(answer_1.rdata.len(), 20);
        let answer_2 = reader.read_rr().unwrap();
        assert_eq!(answer_2.rdata, b"\x01b\xc0\x2b");

        // The OPT record.
        let opt = reader.read_rr().unwrap();
        assert_eq!(opt.owner, ".");
        assert_eq!(opt.rr_type, Type::OPT);
        assert_eq!(opt.class, Class::from(4096));
        assert!(opt.rdata.is_empty());

        assert!(reader.at_eom());
    }

    #[test]
    fn reader_constructor_rejects_short_message() {
        for size in 0..HEADER_SIZE {
            let buf = vec![0; size];
            assert_eq!(Reader::try_from(buf.as_slice()), Err(Error::HeaderTooShort));
        }
    }

    #[test]
    fn read_rr_is_atomic() {
        let response = a_response(0x1234, EXAMPLE_COM_WIRE, &[(300, [192, 0, 2, 1])]);
        let truncated = &response[..response.len() - 2];
        let mut reader = Reader::try_from(truncated).unwrap();
        reader.read_question().unwrap();
        let before = reader.cursor;
        assert_eq!(reader.read_rr(), Err(Error::UnexpectedEomInField));
        assert_eq!(reader.cursor, before);
    }

    #[test]
    fn decode_question_works() {
        let query = a_query(0x1234, EXAMPLE_COM_WIRE);
        let (qname, question) = decode_question(&query).unwrap();
        assert_eq!(qname, "example.com.");
        assert_eq!(question, &query[HEADER_SIZE..]);
    }

    #[test]
    fn decode_question_preserves_case() {
        let query = a_query(0x1234, b"\x07ExAmPlE\x03COM\x00");
        assert_eq!(decode_question(&query).unwrap().0, "ExAmPlE.COM.");
    }

    #[test]
    fn decode_question_rejects_label_running_past_end() {
        let mut query = a_query(0x1234, EXAMPLE_COM_WIRE);
        query[HEADER_SIZE] = 40;
        assert_eq!(
            decode_question(&query),
            Err(Error::InvalidName(name::Error::UnexpectedEom))
        );
    }

    #[test]
    fn decode_question_rejects_missing_type_and_class() {
        let query = a_query(0x1234, EXAMPLE_COM_WIRE);
        assert_eq!(
            decode_question(&query[..query.len() - 1]),
            Err(Error::UnexpectedEomInField)
        );
    }

    #[test]
    fn decode_question_rejects_short_and_empty_messages() {
        assert_eq!(decode_question(b"\x12\x34"), Err(Error::HeaderTooShort));
        let mut query = a_query(0x1234, EXAMPLE_COM_WIRE);
        query[QDCOUNT_END - 1] = 0;
        assert_eq!(decode_question(&query), Err(Error::NoQuestion));
    }

    #[test]
    fn decode_name_at_reports_pointer_loops_as_malformed() {
        let mut message = a_query(0x1234, EXAMPLE_COM_WIRE);
        message.extend_from_slice(b"\xc0\x1d");
        assert_eq!(
            decode_name_at(&message, 29),
            Err(Error::InvalidName(name::Error::InvalidPointer))
        );
    }

    #[test]
    fn extract_answers_follows_compression_pointers() {
        let response = a_response(
            0x1234,
            EXAMPLE_COM_WIRE,
            &[(300, [93, 184, 216, 34]), (120, [93, 184, 216, 35])],
        );
        let answers = extract_answers(&response).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].owner, "example.com.");
        assert_eq!(answers[0].ttl, 300);
        assert_eq!(answers[0].ipv4_addr(), Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(answers[1].ttl, 120);
        assert_eq!(answers[1].ipv4_addr(), Some(Ipv4Addr::new(93, 184, 216, 35)));
    }

    #[test]
    fn extract_answers_passes_other_types_through() {
        let answers = extract_answers(EXAMPLE_COM_NS_MESSAGE).unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().all(|a| a.rr_type == Type::NS));
        assert!(answers.iter().all(|a| a.ipv4_addr().is_none()));
    }

    #[test]
    fn extract_answers_handles_empty_answer_section() {
        let response = a_response(0x1234, EXAMPLE_COM_WIRE, &[]);
        assert_eq!(extract_answers(&response), Ok(Vec::new()));
    }

    #[test]
    fn extract_answers_rejects_truncated_responses() {
        let response = a_response(0x1234, EXAMPLE_COM_WIRE, &[(300, [192, 0, 2, 1])]);
        assert!(extract_answers(&response[..response.len() - 5]).is_err());
    }

    #[test]
    fn ipv4_addr_requires_four_octets() {
        let record = Record {
            owner: "example.com.".to_owned(),
            rr_type: Type::A,
            class: Class::IN,
            ttl: 60,
            rdata: b"\x01\x02\x03",
        };
        assert_eq!(record.ipv4_addr(), None);
    }
}
