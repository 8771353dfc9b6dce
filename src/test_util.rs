// Copyright 2024 Matthew Ingwersen.
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

//! Message fixtures shared by the unit tests.

/// The on-the-wire form of `example.com.`.
pub const EXAMPLE_COM_WIRE: &[u8] = b"\x07example\x03com\x00";

/// Builds a recursion-desired IN A query for the on-the-wire name
/// `qname`.
pub fn a_query(id: u16, qname: &[u8]) -> Vec<u8> {
    let mut query = Vec::new();
    query.extend_from_slice(&id.to_be_bytes());
    query.extend_from_slice(b"\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00");
    query.extend_from_slice(qname);
    query.extend_from_slice(b"\x00\x01\x00\x01");
    query
}

/// Builds a response to [`a_query`] carrying one IN A record per entry
/// of `answers`. Each record's owner is a compression pointer to the
/// QNAME.
pub fn a_response(id: u16, qname: &[u8], answers: &[(u32, [u8; 4])]) -> Vec<u8> {
    let mut response = a_query(id, qname);
    response[2] = 0x81;
    response[3] = 0x80;
    response[6..8].copy_from_slice(&(answers.len() as u16).to_be_bytes());
    for (ttl, addr) in answers {
        response.extend_from_slice(b"\xc0\x0c\x00\x01\x00\x01");
        response.extend_from_slice(&ttl.to_be_bytes());
        response.extend_from_slice(b"\x00\x04");
        response.extend_from_slice(addr);
    }
    response
}

/// Builds a response to [`a_query`] whose single answer is a CNAME
/// record with the given TTL.
pub fn cname_response(id: u16, qname: &[u8], ttl: u32) -> Vec<u8> {
    let mut response = a_response(id, qname, &[]);
    response[7] = 1;
    response.extend_from_slice(b"\xc0\x0c\x00\x05\x00\x01");
    response.extend_from_slice(&ttl.to_be_bytes());
    response.extend_from_slice(b"\x00\x06\x03www\xc0\x0c");
    response
}
