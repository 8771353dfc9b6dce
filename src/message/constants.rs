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

//! Constants related to DNS messages.

pub const HEADER_SIZE: usize = 12;
pub const ID_START: usize = 0;
pub const ID_END: usize = 2;
pub const QR_BYTE: usize = 2;
pub const QR_MASK: u8 = 0x80;
pub const RCODE_BYTE: usize = 3;
pub const RCODE_MASK: u8 = 0x0f;
pub const QDCOUNT_START: usize = 4;
pub const QDCOUNT_END: usize = 6;
pub const ANCOUNT_START: usize = 6;
pub const ANCOUNT_END: usize = 8;

/// The flags of a synthesized failure response: QR, RD, and RA set,
/// with 3 in the RCODE field.
pub const FAILURE_FLAGS: u16 = 0x8183;

/// The size of the buffers used to receive DNS messages over UDP.
/// Larger messages (EDNS) are not supported.
pub const MAX_UDP_MESSAGE_SIZE: usize = 512;
