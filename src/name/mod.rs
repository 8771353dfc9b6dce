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

//! Decoding of on-the-wire domain names.
//!
//! Names are decoded into their presentation format: labels joined by
//! `.`, with a trailing dot, in the case they were received. The root
//! name is `.`. Label octets that are not printable ASCII, as well as
//! `.` and `\` themselves, are escaped in the style of RFC 1035 § 5.1,
//! so that distinct names always decode to distinct strings.

use std::fmt::Write;

mod error;
mod wire;

pub use error::Error;
pub use wire::{decode_compressed, decode_uncompressed};

/// The maximum length of a label, not including its length octet.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of an uncompressed name on the wire.
pub const MAX_WIRE_LEN: usize = 255;

/// The maximum number of compression pointers followed while decoding
/// a single name.
pub const MAX_POINTER_HOPS: usize = 16;

/// Appends a label in presentation format, followed by the `.`
/// separator, to `name`.
fn push_label(name: &mut String, octets: &[u8]) {
    for octet in octets {
        match *octet {
            b'.' => name.push_str("\\."),
            b'\\' => name.push_str("\\\\"),
            o if o.is_ascii_graphic() => name.push(o as char),
            o => write!(name, "\\{:03}", o).unwrap(),
        }
    }
    name.push('.');
}

/// Finishes a decoded name. A name without any non-null labels is the
/// root, which is written as a single dot.
fn finish(mut name: String) -> String {
    if name.is_empty() {
        name.push('.');
    }
    name
}
