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

//! Implementation of the [`Error`] type for name-related errors.

use std::fmt;

/// An error signaling that an on-the-wire name could not be decoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A compression pointer referred to an offset outside the message,
    /// or to an offset already visited while decoding this name.
    InvalidPointer,

    /// A label was longer than 63 octets, or its length octet used one
    /// of the reserved label types.
    LabelTooLong,

    /// The name is too long (longer than 255 octets on the wire).
    NameTooLong,

    /// More compression pointers were followed than allowed.
    TooManyPointers,

    /// We unexpectedly encountered the end of the message while
    /// decoding the name.
    UnexpectedEom,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::InvalidPointer => f.write_str("invalid pointer"),
            Self::LabelTooLong => f.write_str("label is longer than 63 bytes on the wire"),
            Self::NameTooLong => f.write_str("name is longer than 255 bytes on the wire"),
            Self::TooManyPointers => f.write_str("too many compression pointers"),
            Self::UnexpectedEom => f.write_str("unexpected end of message"),
        }
    }
}

impl std::error::Error for Error {}
