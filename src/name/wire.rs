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

//! Implementation of decoding of on-the-wire names.

use arrayvec::ArrayVec;

use super::{finish, push_label, Error, MAX_LABEL_LEN, MAX_POINTER_HOPS, MAX_WIRE_LEN};

////////////////////////////////////////////////////////////////////////
// DECODING OF UNCOMPRESSED ON-THE-WIRE NAMES                         //
////////////////////////////////////////////////////////////////////////

/// Decodes an uncompressed name starting at index `start` of `octets`.
///
/// On success, returns the name in presentation format and the number
/// of octets the name occupies on the wire (including the terminating
/// null label). Compression pointers are not accepted here; a length
/// octet with either of its two high bits set is rejected as
/// [`Error::LabelTooLong`].
pub fn decode_uncompressed(octets: &[u8], start: usize) -> Result<(String, usize), Error> {
    let mut name = String::new();
    let mut index = start;

    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)? as usize;
        if len == 0 {
            return Ok((finish(name), index + 1 - start));
        } else if len > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }

        let end_of_label = index + len + 1;
        if end_of_label > octets.len() {
            return Err(Error::UnexpectedEom);
        } else if end_of_label - start >= MAX_WIRE_LEN {
            // There must still be room for the null label.
            return Err(Error::NameTooLong);
        }
        push_label(&mut name, &octets[index + 1..end_of_label]);
        index = end_of_label;
    }
}

////////////////////////////////////////////////////////////////////////
// DECODING OF COMPRESSED ON-THE-WIRE NAMES                           //
////////////////////////////////////////////////////////////////////////

/// Decodes a possibly compressed name starting at index `start` of
/// `octets`. Pointers are followed. Offsets given in pointers are
/// treated as indices of `octets`, so the intention is for an entire
/// DNS message to be passed in `octets`.
///
/// On success, returns the name in presentation format and the number
/// of octets the name occupies at `start` (that is, up to and including
/// the first pointer, if there is one).
///
/// At most [`MAX_POINTER_HOPS`] pointers are followed, and a pointer to
/// an offset already visited is rejected immediately, so a pointer loop
/// always results in an error.
pub fn decode_compressed(octets: &[u8], start: usize) -> Result<(String, usize), Error> {
    let mut name = String::new();
    let mut index = start;
    let mut wire_len = 0;
    let mut len_at_start = None;
    let mut visited = ArrayVec::<usize, MAX_POINTER_HOPS>::new();

    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
        if len & 0xc0 == 0xc0 {
            let low = *octets.get(index + 1).ok_or(Error::UnexpectedEom)?;
            len_at_start.get_or_insert_with(|| index + 2 - start);
            let target = u16::from_be_bytes([len & 0x3f, low]) as usize;
            if target >= octets.len() || visited.contains(&target) {
                return Err(Error::InvalidPointer);
            }
            visited
                .try_push(target)
                .or(Err(Error::TooManyPointers))?;
            index = target;
        } else if len as usize > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        } else if len == 0 {
            let len_at_start = len_at_start.unwrap_or_else(|| index + 1 - start);
            return Ok((finish(name), len_at_start));
        } else {
            let end_of_label = index + len as usize + 1;
            if end_of_label > octets.len() {
                return Err(Error::UnexpectedEom);
            }
            wire_len += len as usize + 1;
            if wire_len >= MAX_WIRE_LEN {
                return Err(Error::NameTooLong);
            }
            push_label(&mut name, &octets[index + 1..end_of_label]);
            index = end_of_label;
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
