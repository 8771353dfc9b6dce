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

//! The [`Type`] and [`Class`] types for resource records.
//!
//! The forwarder only interprets IN A records; every other value
//! passes through as an opaque number.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

/// Represents the RR type of a DNS record.
///
/// An RR type is represented on the wire as an unsigned 16-bit integer,
/// so this is basically a wrapper around `u16` with nice
/// [`Debug`](fmt::Debug) and [`Display`](fmt::Display)
/// implementations.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

impl Type {
    pub const A: Type = Type(1);
    pub const NS: Type = Type(2);
    pub const OPT: Type = Type(41);
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::A => f.write_str("A"),
            Self::NS => f.write_str("NS"),
            Self::OPT => f.write_str("OPT"),
            Self(value) => write!(f, "TYPE{}", value), // RFC 3597 § 5
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

////////////////////////////////////////////////////////////////////////
// CLASSES                                                            //
////////////////////////////////////////////////////////////////////////

/// Represents a class in the DNS. The only class in common use is
/// [`IN`](Class::IN).
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Class(u16);

impl Class {
    pub const IN: Self = Self(1);
}

impl From<u16> for Class {
    fn from(value: u16) -> Self {
        Class(value)
    }
}

impl From<Class> for u16 {
    fn from(class: Class) -> Self {
        class.0
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IN => write!(f, "IN"),
            Self(value) => write!(f, "CLASS{}", value),
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", *self)
    }
}
