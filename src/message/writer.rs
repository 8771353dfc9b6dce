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

//! Synthesis of responses that the forwarder builds itself.

use super::constants::*;
use super::reader::{decode_question, Result};

/// Builds the failure response sent when `query` cannot be answered.
///
/// The response echoes the query's ID and its question, and has the
/// flags `0x8183`: QR, RD, and RA set, with 3 in the RCODE field. All
/// record counts other than QDCOUNT are zero. This fails only if the
/// query's question cannot be decoded.
pub fn build_failure(query: &[u8]) -> Result<Vec<u8>> {
    let (_, question) = decode_question(query)?;
    let mut response = Vec::with_capacity(HEADER_SIZE + question.len());
    response.extend_from_slice(&query[ID_START..ID_END]);
    response.extend_from_slice(&FAILURE_FLAGS.to_be_bytes());
    response.extend_from_slice(&1u16.to_be_bytes());
    response.extend_from_slice(&[0; 6]);
    response.extend_from_slice(question);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::reader::{Error, Reader};
    use crate::test_util::*;

    #[test]
    fn build_failure_echoes_id_and_question() {
        let query = a_query(0xbeef, EXAMPLE_COM_WIRE);
        let response = build_failure(&query).unwrap();
        assert_eq!(&response[0..2], b"\xbe\xef");
        assert_eq!(&response[2..4], b"\x81\x83");
        assert_eq!(&response[4..12], b"\x00\x01\x00\x00\x00\x00\x00\x00");
        assert_eq!(&response[12..], &query[12..]);

        let mut reader = Reader::try_from(response.as_slice()).unwrap();
        assert!(reader.qr());
        assert_eq!(reader.rcode(), 3);
        assert_eq!(reader.ancount(), 0);
        assert_eq!(reader.read_question().unwrap().qname, "example.com.");
        assert!(reader.at_eom());
    }

    #[test]
    fn build_failure_drops_trailing_sections() {
        // An OPT record in the additional section is not echoed.
        let mut query = a_query(0x0001, EXAMPLE_COM_WIRE);
        query[11] = 1;
        query.extend_from_slice(b"\x00\x00\x29\x10\x00\x00\x00\x00\x00\x00\x00");
        let response = build_failure(&query).unwrap();
        assert_eq!(response.len(), 12 + EXAMPLE_COM_WIRE.len() + 4);
        assert_eq!(&response[10..12], b"\x00\x00");
    }

    #[test]
    fn build_failure_rejects_malformed_queries() {
        assert_eq!(build_failure(b"\x00\x01\x01"), Err(Error::HeaderTooShort));
    }
}
